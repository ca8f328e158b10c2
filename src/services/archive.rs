use crate::db::{Database, MessageRecord};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a message was posted, as the archive names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// `DM_<author_id>` or `<name>_<id>`
    pub dir_name: String,
    /// `DM_<author_id>` or `<name> (<id>)`
    pub display: String,
    pub name: String,
}

impl ChannelInfo {
    pub fn direct(author_id: u64) -> Self {
        let label = format!("DM_{}", author_id);
        Self {
            dir_name: label.clone(),
            display: label,
            name: "DM".to_string(),
        }
    }

    pub fn guild(name: &str, channel_id: u64) -> Self {
        Self {
            dir_name: format!("{}_{}", name, channel_id),
            display: format!("{} ({})", name, channel_id),
            name: name.to_string(),
        }
    }
}

/// Text-log block for one message.
pub fn log_entry(
    author: &str,
    author_id: u64,
    created_at: DateTime<Utc>,
    channel: &ChannelInfo,
    content: &str,
) -> String {
    format!(
        "{} ({}) at {} in {}:\n{}\n{}\n",
        author,
        author_id,
        created_at.format(TIMESTAMP_FORMAT),
        channel.display,
        content,
        "-".repeat(40)
    )
}

/// Persists every human message to disk and SQLite.
pub struct MessageArchiver {
    log_dir: PathBuf,
    db: Database,
    http: reqwest::Client,
}

impl MessageArchiver {
    pub fn new(log_dir: impl Into<PathBuf>, db: Database, http: reqwest::Client) -> Self {
        Self {
            log_dir: log_dir.into(),
            db,
            http,
        }
    }

    /// `<log_dir>/<YYYY-MM-DD>/<channel dir>`
    pub fn channel_dir(&self, day: DateTime<Utc>, channel: &ChannelInfo) -> PathBuf {
        self.log_dir
            .join(day.format("%Y-%m-%d").to_string())
            .join(&channel.dir_name)
    }

    pub async fn archive(
        &self,
        ctx: &serenity::Context,
        message: &serenity::Message,
    ) -> anyhow::Result<()> {
        if message.author.bot {
            return Ok(());
        }

        let channel = resolve_channel(ctx, message).await;
        let created_at = DateTime::<Utc>::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);
        let dir = self.channel_dir(Utc::now(), &channel);
        tokio::fs::create_dir_all(&dir).await?;

        let entry = log_entry(
            &message.author.name,
            message.author.id.get(),
            created_at,
            &channel,
            &message.content,
        );
        append_log(&dir, &entry).await?;

        info!(
            author_id = message.author.id.get(),
            created_time = %created_at.format(TIMESTAMP_FORMAT),
            channel_name = %channel.name,
            channel_id = message.channel_id.get(),
            "{}: {}",
            message.author.name,
            message.content
        );

        let attachments = self.save_attachments(&dir, &message.attachments).await;
        let stickers = self.save_stickers(&dir, &message.sticker_items).await;

        let record = MessageRecord {
            discord_id: message.id.to_string(),
            guild_id: message.guild_id.map(|id| id.to_string()),
            channel_id: message.channel_id.to_string(),
            channel_name: channel.name.clone(),
            author: message.author.name.clone(),
            author_id: message.author.id.to_string(),
            content: message.content.clone(),
            created_at: created_at.format(TIMESTAMP_FORMAT).to_string(),
            attachments,
            stickers,
        };
        self.db
            .run_blocking(move |db| db.save_message(&record))
            .await
    }

    async fn save_attachments(&self, dir: &Path, attachments: &[serenity::Attachment]) -> Vec<String> {
        let mut saved = Vec::new();
        for attachment in attachments {
            let path = dir.join(sanitize_file_name(&attachment.filename));
            let result = async {
                let bytes = attachment.download().await?;
                tokio::fs::write(&path, bytes).await?;
                anyhow::Ok(())
            }
            .await;
            match result {
                Ok(()) => {
                    debug!("Saved attachment {}", path.display());
                    saved.push(path.display().to_string());
                }
                Err(e) => warn!(filename = %attachment.filename, "Failed to save attachment: {:#}", e),
            }
        }
        saved
    }

    async fn save_stickers(&self, dir: &Path, stickers: &[serenity::StickerItem]) -> Vec<String> {
        let mut saved = Vec::new();
        for sticker in stickers {
            let Some(url) = sticker.image_url() else {
                warn!(sticker_id = sticker.id.get(), "Sticker has no image");
                continue;
            };
            let path = dir.join(format!("sticker_{}.png", sticker.id));
            let result = async {
                let bytes = self.http.get(&url).send().await?.error_for_status()?.bytes().await?;
                tokio::fs::write(&path, &bytes).await?;
                anyhow::Ok(())
            }
            .await;
            match result {
                Ok(()) => saved.push(path.display().to_string()),
                Err(e) => warn!(sticker_id = sticker.id.get(), "Sticker is not found: {:#}", e),
            }
        }
        saved
    }
}

async fn resolve_channel(ctx: &serenity::Context, message: &serenity::Message) -> ChannelInfo {
    if message.guild_id.is_none() {
        return ChannelInfo::direct(message.author.id.get());
    }
    let name = match message.channel_id.name(ctx).await {
        Ok(name) => name,
        Err(e) => {
            debug!("Could not resolve channel name: {}", e);
            "unknown".to_string()
        }
    };
    ChannelInfo::guild(&name, message.channel_id.get())
}

async fn append_log(dir: &Path, entry: &str) -> anyhow::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("log.txt"))
        .await?;
    file.write_all(entry.as_bytes()).await?;
    Ok(())
}

/// Attachment names come from users; keep only the final path component.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");
    if base.is_empty() || base == ".." {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use chrono::TimeZone;

    fn archiver(root: &Path) -> MessageArchiver {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        MessageArchiver::new(root, db, reqwest::Client::new())
    }

    #[test]
    fn test_channel_naming() {
        let dm = ChannelInfo::direct(77);
        assert_eq!(dm.dir_name, "DM_77");
        assert_eq!(dm.display, "DM_77");

        let guild = ChannelInfo::guild("general", 1234);
        assert_eq!(guild.dir_name, "general_1234");
        assert_eq!(guild.display, "general (1234)");
    }

    #[test]
    fn test_channel_dir_is_dated() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = archiver(dir.path());
        let day = Utc.with_ymd_and_hms(2024, 11, 30, 23, 0, 0).unwrap();

        let path = archiver.channel_dir(day, &ChannelInfo::guild("general", 1));
        assert_eq!(path, dir.path().join("2024-11-30").join("general_1"));
    }

    #[test]
    fn test_log_entry_format() {
        let at = Utc.with_ymd_and_hms(2024, 11, 30, 9, 5, 7).unwrap();
        let entry = log_entry("wei", 5, at, &ChannelInfo::guild("general", 1), "hello");
        assert_eq!(
            entry,
            format!(
                "wei (5) at 2024-11-30 09:05:07 in general (1):\nhello\n{}\n",
                "-".repeat(40)
            )
        );
    }

    #[tokio::test]
    async fn test_append_log_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        append_log(dir.path(), "one\n").await.unwrap();
        append_log(dir.path(), "two\n").await.unwrap();

        let text = tokio::fs::read_to_string(dir.path().join("log.txt")).await.unwrap();
        assert_eq!(text, "one\ntwo\n");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("cat.png"), "cat.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(".."), "attachment");
        assert_eq!(sanitize_file_name(""), "attachment");
    }
}

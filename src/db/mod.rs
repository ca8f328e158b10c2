use crate::config::Config;
use rusqlite::{Connection, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One archived chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub discord_id: String,
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub channel_name: String,
    pub author: String,
    pub author_id: String,
    pub content: String,
    /// `YYYY-MM-DD HH:MM:SS`, UTC
    pub created_at: String,
    pub attachments: Vec<String>,
    pub stickers: Vec<String>,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self> {
        if config.database_url != ":memory:" {
            if let Some(parent) = Path::new(&config.database_url).parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("Database: could not create {}: {}", parent.display(), e);
                }
            }
        }
        let conn = Connection::open(&config.database_url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection mutex poisoned"))
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.lock()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Run synchronous database work on the blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn save_message(&self, record: &MessageRecord) -> anyhow::Result<()> {
        debug!(
            "Database: Saving message {} from user {} in channel {}",
            record.discord_id, record.author_id, record.channel_id
        );
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO messages
                (discord_id, guild_id, channel_id, channel_name, author, author_id, content, created_at, attachments, stickers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            (
                &record.discord_id,
                &record.guild_id,
                &record.channel_id,
                &record.channel_name,
                &record.author,
                &record.author_id,
                &record.content,
                &record.created_at,
                record.attachments.join(";"),
                record.stickers.join(";"),
            ),
        )?;
        Ok(())
    }

    /// Latest `limit` messages of a channel, oldest first.
    pub fn recent_messages(&self, channel_id: &str, limit: usize) -> anyhow::Result<Vec<MessageRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT discord_id, guild_id, channel_id, channel_name, author, author_id, content, created_at, attachments, stickers
             FROM messages
             WHERE channel_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map((channel_id, limit as i64), |row| {
            let attachments: String = row.get(8)?;
            let stickers: String = row.get(9)?;
            Ok(MessageRecord {
                discord_id: row.get(0)?,
                guild_id: row.get(1)?,
                channel_id: row.get(2)?,
                channel_name: row.get(3)?,
                author: row.get(4)?,
                author_id: row.get(5)?,
                content: row.get(6)?,
                created_at: row.get(7)?,
                attachments: split_paths(&attachments),
                stickers: split_paths(&stickers),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        results.reverse();
        Ok(results)
    }
}

fn split_paths(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

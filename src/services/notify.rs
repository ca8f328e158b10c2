use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_AVATAR_URL: &str = "https://i.imgur.com/QoOwyXJ.png";
const AUTHOR_ICON_URL: &str = "https://i.imgur.com/fKL31aD.jpg";
const HOMEPAGE_URL: &str = "https://mai0313.com";
const EMBED_COLOR: u32 = 14177041;

/// Fire-and-forget notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn try_send(&self) -> anyhow::Result<()>;

    /// Failures are logged, never returned.
    async fn send_notify(&self) {
        if let Err(e) = self.try_send().await {
            error!("Failed to send notification: {:#}", e);
        }
    }
}

pub enum NotifyImage {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

pub struct DiscordNotify {
    pub title: String,
    pub content: String,
    pub description: String,
    pub avatar_url: String,
    pub image: Option<NotifyImage>,
    pub webhook_url: String,
    http: reqwest::Client,
}

impl DiscordNotify {
    pub fn new(
        http: reqwest::Client,
        webhook_url: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            description: description.into(),
            avatar_url: DEFAULT_AVATAR_URL.to_string(),
            image: None,
            webhook_url: webhook_url.into(),
            http,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn image(mut self, image: NotifyImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn payload(&self, timestamp: DateTime<Utc>) -> Value {
        let timestamp = timestamp.to_rfc3339();
        let mut embed = json!({
            "author": {
                "name": "Notification Bot",
                "url": HOMEPAGE_URL,
                "icon_url": AUTHOR_ICON_URL,
            },
            "title": format!("📢 {}", self.title),
            "url": HOMEPAGE_URL,
            "description": self.description,
            "color": EMBED_COLOR,
            "fields": [
                { "name": "更多資訊", "value": format!("[點擊這裡]({})", HOMEPAGE_URL), "inline": true },
                { "name": "狀態更新", "value": "此通知為自動生成", "inline": true },
            ],
            "footer": {
                "text": format!("時間: {}", timestamp),
                "icon_url": AUTHOR_ICON_URL,
            },
            "timestamp": timestamp,
        });
        if self.image.is_some() {
            embed["image"] = json!({ "url": "attachment://image.jpg" });
        }

        json!({
            "avatar_url": self.avatar_url,
            "content": self.content,
            "embeds": [embed],
        })
    }

    async fn image_bytes(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match &self.image {
            None => Ok(None),
            Some(NotifyImage::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(NotifyImage::Path(path)) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    anyhow::anyhow!("Image file not found: {}: {}", path.display(), e)
                })?;
                Ok(Some(bytes))
            }
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotify {
    async fn try_send(&self) -> anyhow::Result<()> {
        let payload = self.payload(Utc::now());

        let request = match self.image_bytes().await? {
            Some(bytes) => {
                let file = reqwest::multipart::Part::bytes(bytes)
                    .file_name("image.jpg")
                    .mime_str("image/jpeg")?;
                let form = reqwest::multipart::Form::new()
                    .text("payload_json", serde_json::to_string(&payload)?)
                    .part("file", file);
                self.http.post(&self.webhook_url).multipart(form)
            }
            None => self.http.post(&self.webhook_url).json(&payload),
        };

        request.send().await?.error_for_status()?;
        info!(title = %self.title, "Webhook notification sent");
        Ok(())
    }
}

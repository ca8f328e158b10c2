use base64::{engine::general_purpose::STANDARD, Engine as _};
use poise::serenity_prelude as serenity;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// MIME type from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

pub fn data_url_from_bytes(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Read a local file into a `data:` URL a vision model can consume.
pub async fn data_url(path: impl AsRef<Path>) -> anyhow::Result<String> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    Ok(data_url_from_bytes(&bytes, mime_for_path(path)))
}

/// Download a remote image and return it as a `data:` URL.
pub async fn inline_image(http: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let response = http.get(url).send().await?.error_for_status()?;
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|m| m.starts_with("image/"))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let path = url.split('?').next().unwrap_or(url);
            mime_for_path(Path::new(path)).to_string()
        });
    let bytes = response.bytes().await?;
    Ok(data_url_from_bytes(&bytes, &mime))
}

fn is_image_attachment(attachment: &serenity::Attachment) -> bool {
    if let Some(content_type) = &attachment.content_type {
        return content_type.starts_with("image/");
    }
    Path::new(&attachment.filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image URLs carried by a message: attachments, then stickers, then embeds.
pub fn collect_image_inputs(message: &serenity::Message) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !urls.contains(&url) {
            urls.push(url);
        }
    };

    for attachment in message.attachments.iter().filter(|a| is_image_attachment(a)) {
        push(attachment.url.clone());
    }

    for sticker in &message.sticker_items {
        if let Some(url) = sticker.image_url() {
            push(url);
        }
    }

    for embed in &message.embeds {
        if let Some(image) = &embed.image {
            push(image.url.clone());
        }
        if let Some(thumbnail) = &embed.thumbnail {
            push(thumbnail.url.clone());
        }
    }

    urls
}

use crate::ascii::{image_to_ascii, AsciiMode, DEFAULT_COLUMNS};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::CreateReply;
use tracing::{info, warn};

/// Turn an image into ASCII art
#[poise::command(prefix_command, slash_command)]
pub async fn ascii(
    ctx: Context<'_>,
    #[description = "Image to convert"] image: serenity::Attachment,
    #[description = "Character set"] mode: Option<AsciiMode>,
    #[description = "Output width in characters"]
    #[min = 10]
    #[max = 300]
    columns: Option<u32>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let bytes = image.download().await?;
    let mode = mode.unwrap_or(AsciiMode::Complex);
    let columns = columns.unwrap_or(DEFAULT_COLUMNS);
    info!(?mode, columns, "Converting {} to ASCII", image.filename);

    let art = tokio::task::spawn_blocking(move || image_to_ascii(&bytes, mode, columns)).await?;
    match art {
        Ok(art) => {
            ctx.send(
                CreateReply::default()
                    .attachment(serenity::CreateAttachment::bytes(art.into_bytes(), "ascii.txt")),
            )
            .await?;
        }
        Err(e) => {
            warn!("ASCII conversion failed: {:#}", e);
            ctx.say(format!("❌ 無法讀取圖片: {}", e)).await?;
        }
    }
    Ok(())
}

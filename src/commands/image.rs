use crate::services::image::{progress_bar, to_png, ImageGenerator};
use crate::services::notify::{DiscordNotify, Notifier, NotifyImage};
use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, Mentionable};
use poise::CreateReply;
use std::time::Duration;
use tracing::{error, info, warn};

const PROGRESS_STEPS: u32 = 5;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Generate an image from a prompt
#[poise::command(prefix_command, slash_command)]
pub async fn gen(
    ctx: Context<'_>,
    #[description = "What to draw"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let mention = ctx.author().mention().to_string();
    let handle = ctx
        .say(format!(
            "{} 圖片正在生成中...\n{}",
            mention,
            progress_bar(0, PROGRESS_STEPS)
        ))
        .await?;

    info!("{} requested an image: {}", ctx.author().name, prompt);
    let generator = ImageGenerator::new(data.http_client.clone(), &data.config);
    let generation = generator.generate(&prompt);
    tokio::pin!(generation);

    // The bar never reaches 100% before the image actually arrives.
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    let mut step = 0;
    let result = loop {
        tokio::select! {
            result = &mut generation => break result,
            _ = ticker.tick(), if step + 1 < PROGRESS_STEPS => {
                step += 1;
                let content = format!(
                    "{} 圖片正在生成中...\n{}",
                    mention,
                    progress_bar(step, PROGRESS_STEPS)
                );
                if let Err(e) = handle.edit(ctx, CreateReply::default().content(content)).await {
                    warn!("Failed to update progress bar: {}", e);
                }
            }
        }
    };

    let png = match result.map_err(anyhow::Error::from).and_then(|bytes| to_png(&bytes)) {
        Ok(png) => png,
        Err(e) => {
            error!("Image generation failed: {:#}", e);
            handle
                .edit(
                    ctx,
                    CreateReply::default().content(format!("{} 圖片生成失敗\n錯誤: {}", mention, e)),
                )
                .await?;
            return Ok(());
        }
    };

    handle
        .edit(
            ctx,
            CreateReply::default().content(format!(
                "{} 圖片生成完成\nPrompt: `{}`",
                mention, prompt
            )),
        )
        .await?;
    if let Some(webhook_url) = &data.config.webhook_url {
        DiscordNotify::new(
            data.http_client.clone(),
            webhook_url.clone(),
            "圖片生成完成",
            format!("Prompt: `{}`", prompt),
        )
        .content(format!("來自 {}", ctx.author().name))
        .image(NotifyImage::Bytes(png.clone()))
        .send_notify()
        .await;
    }

    ctx.send(
        CreateReply::default()
            .attachment(serenity::CreateAttachment::bytes(png, "generated_image.png")),
    )
    .await?;

    Ok(())
}

use crate::commands::chat::image_inputs;
use crate::llm::Provider;
use crate::render::{DiscordMessage, RenderOutcome, StreamRenderer};
use crate::{Context, Error};
use poise::serenity_prelude::Mentionable;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Longest a single streamed reply may keep editing its message.
const RENDER_DEADLINE: Duration = Duration::from_secs(14 * 60);

/// Stream an OpenAI reply into one live-updating message
#[poise::command(prefix_command, slash_command)]
pub async fn oais(
    ctx: Context<'_>,
    #[description = "Your prompt"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    stream_reply(ctx, Provider::OpenAi, &prompt).await
}

/// Stream a Grok reply into one live-updating message
#[poise::command(prefix_command, slash_command)]
pub async fn xais(
    ctx: Context<'_>,
    #[description = "Your prompt"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    stream_reply(ctx, Provider::XAi, &prompt).await
}

async fn stream_reply(
    ctx: Context<'_>,
    provider: Provider,
    prompt: &str,
) -> Result<(), Error> {
    let data = ctx.data();
    let handle = ctx.say("生成中...").await?;
    let sent = handle.message().await?;
    let target = DiscordMessage::new(
        ctx.serenity_context().http.clone(),
        sent.channel_id,
        sent.id,
    );

    let images = image_inputs(ctx).await;
    let renderer = StreamRenderer::new(
        ctx.author().mention().to_string(),
        data.config.stream_update_interval,
    );

    let cancel = CancellationToken::new();
    let watchdog = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RENDER_DEADLINE).await;
            cancel.cancel();
        })
    };

    let report = match data.llm.reply_stream(provider, prompt, &images).await {
        Ok(fragments) => renderer.render(fragments, &target, &cancel).await,
        Err(e) => {
            // Surface the failed request through the same notice path.
            let failed = futures::stream::once(async move { Err::<String, _>(e) });
            renderer.render(failed, &target, &cancel).await
        }
    };
    watchdog.abort();

    if report.outcome == RenderOutcome::Cancelled {
        warn!(%provider, "Stream render hit its deadline");
    }
    info!(
        %provider,
        outcome = ?report.outcome,
        edits = report.edits,
        chars = report.reply.chars().count(),
        "Streamed reply for {}",
        ctx.author().name
    );

    Ok(())
}

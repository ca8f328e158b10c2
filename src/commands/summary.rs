use crate::commands::chat::send_response;
use crate::summary::{
    archived_history, format_history, parse_history_count, summary_prompt, HistoryEntry,
};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

/// Summarize the latest messages in this channel, grouped by sender
#[poise::command(prefix_command, slash_command, rename = "sum")]
pub async fn summarize(
    ctx: Context<'_>,
    #[description = "How many messages to read (default 20, max 100)"] count: Option<String>,
) -> Result<(), Error> {
    ctx.defer().await?;
    let history_count = parse_history_count(count.as_deref());

    if let Err(e) = run_summary(ctx, history_count).await {
        error!("Summary failed: {:#}", e);
        ctx.say(format!("發生錯誤：{}", e)).await?;
    }
    Ok(())
}

async fn run_summary(ctx: Context<'_>, history_count: usize) -> anyhow::Result<()> {
    let channel_id = ctx.channel_id();
    let entries: Vec<HistoryEntry> = match channel_id
        .messages(ctx, serenity::GetMessages::new().limit(history_count as u8))
        .await
    {
        Ok(messages) => messages.iter().map(HistoryEntry::from).collect(),
        Err(e) => {
            warn!("Channel history unavailable, reading the archive: {}", e);
            let channel = channel_id.to_string();
            let records = ctx
                .data()
                .db
                .run_blocking(move |db| db.recent_messages(&channel, history_count))
                .await?;
            archived_history(&records)
        }
    };

    if entries.is_empty() {
        ctx.say("此頻道沒有任何消息。").await?;
        return Ok(());
    }

    let history = format_history(&entries, &ctx.data().config.command_prefix);
    info!(
        "Summarizing {} message(s) in channel {}",
        entries.len(),
        ctx.channel_id()
    );

    let llm = &ctx.data().llm;
    let summary = llm
        .reply(llm.preferred_provider(), &summary_prompt(history_count, &history), &[])
        .await?;

    send_response(ctx, &summary)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

use crate::commands::chat::send_response;
use crate::{Context, Error};
use tracing::{error, info};

/// Search the web and answer with sources
#[poise::command(prefix_command, slash_command)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Search query"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    info!("Search requested by {}: {}", ctx.author().name, prompt);

    match ctx.data().llm.search(&prompt).await {
        Ok(answer) => send_response(ctx, &answer).await?,
        Err(e) => {
            error!("Search failed: {:#}", e);
            ctx.say(format!("搜尋時發生錯誤: {}", e)).await?;
        }
    }
    Ok(())
}

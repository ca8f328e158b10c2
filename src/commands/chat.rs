use crate::attach::{collect_image_inputs, inline_image};
use crate::config::{DISCORD_EMBED_LIMIT, DISCORD_MESSAGE_LIMIT};
use crate::llm::Provider;
use crate::{Context, Error};
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter, Mentionable};
use tracing::{error, info, warn};

/// Ask OpenAI; images on the message are included
#[poise::command(prefix_command, slash_command)]
pub async fn oai(
    ctx: Context<'_>,
    #[description = "Your prompt"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    reply(ctx, Provider::OpenAi, &prompt).await
}

/// Ask Grok; images on the message are included
#[poise::command(prefix_command, slash_command)]
pub async fn xai(
    ctx: Context<'_>,
    #[description = "Your prompt"]
    #[rest]
    prompt: String,
) -> Result<(), Error> {
    reply(ctx, Provider::XAi, &prompt).await
}

async fn reply(
    ctx: Context<'_>,
    provider: Provider,
    prompt: &str,
) -> Result<(), Error> {
    ctx.defer().await?;

    let images = image_inputs(ctx).await;
    info!(
        "{} asked {} ({} image(s)): {}",
        ctx.author().name,
        provider,
        images.len(),
        prompt
    );

    let mention = ctx.author().mention().to_string();
    let response = match ctx.data().llm.reply(provider, prompt, &images).await {
        Ok(r) => r,
        Err(e) => {
            error!("LLM error for {}: {:#}", provider, e);
            ctx.say(format!("{} ❌ LLM Error: {}", mention, e)).await?;
            return Ok(());
        }
    };

    send_response(ctx, &format!("{} {}", mention, response)).await
}

/// Images on the invoking message, inlined as data URLs where the download
/// succeeds. Slash invocations carry none.
pub(crate) async fn image_inputs(ctx: Context<'_>) -> Vec<String> {
    let poise::Context::Prefix(prefix) = ctx else {
        return Vec::new();
    };
    let http = &ctx.data().http_client;
    let mut images = Vec::new();
    for url in collect_image_inputs(prefix.msg) {
        match inline_image(http, &url).await {
            Ok(data_url) => images.push(data_url),
            Err(e) => {
                warn!("Could not inline {}, passing the URL: {:#}", url, e);
                images.push(url);
            }
        }
    }
    images
}

/// Send response, using embeds for long messages
pub(crate) async fn send_response(ctx: Context<'_>, content: &str) -> Result<(), Error> {
    let length = content.chars().count();
    if length <= DISCORD_MESSAGE_LIMIT {
        ctx.say(content).await?;
    } else if length <= DISCORD_EMBED_LIMIT {
        // Use embed for longer content (up to 4096 chars)
        let embed = CreateEmbed::new()
            .title("🤖 llmbot Response")
            .description(content)
            .color(0x5865F2)
            .footer(CreateEmbedFooter::new(format!("Requested by {}", ctx.author().name)));

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
    } else {
        // Split into multiple embeds if extremely long
        let chunks = split_chars(content, DISCORD_EMBED_LIMIT - 100);

        for (i, chunk) in chunks.iter().enumerate() {
            let embed = CreateEmbed::new()
                .title(format!("🤖 Response (Part {}/{})", i + 1, chunks.len()))
                .description(chunk.as_str())
                .color(0x5865F2);

            ctx.send(poise::CreateReply::default().embed(embed)).await?;
        }
    }
    Ok(())
}

/// Split on character boundaries into pieces of at most `max_chars`.
fn split_chars(content: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chars_respects_multibyte() {
        let text = "生成".repeat(5);
        let parts = split_chars(&text, 3);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "生成生");
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_split_chars_short_input() {
        assert_eq!(split_chars("hi", 10), vec!["hi".to_string()]);
        assert!(split_chars("", 10).is_empty());
    }
}

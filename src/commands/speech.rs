use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, Mentionable};
use poise::CreateReply;
use tracing::{error, info};

/// Read text aloud as an MP3 attachment
#[poise::command(prefix_command, slash_command)]
pub async fn tts(
    ctx: Context<'_>,
    #[description = "Text to speak"]
    #[rest]
    text: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    info!("{} requested speech ({} chars)", ctx.author().name, text.chars().count());

    let mention = ctx.author().mention().to_string();
    match ctx.data().llm.speech(&text).await {
        Ok(audio) => {
            ctx.send(
                CreateReply::default()
                    .content(mention)
                    .attachment(serenity::CreateAttachment::bytes(audio, "speech.mp3")),
            )
            .await?;
        }
        Err(e) => {
            error!("Speech synthesis failed: {:#}", e);
            ctx.say(format!("{} 語音生成失敗\n錯誤: {}", mention, e)).await?;
        }
    }
    Ok(())
}

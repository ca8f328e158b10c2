use crate::services::notify::{DiscordNotify, Notifier};
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

pub fn invite_url(application_id: u64) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={}&permissions=8&scope=bot",
        application_id
    )
}

fn is_debug_trigger(content: &str) -> bool {
    content.eq_ignore_ascii_case("debug")
}

pub async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Logged in as {}", data_about_bot.user.name);
            let invite = invite_url(data_about_bot.application.id.get());
            info!("邀請連結: {}", invite);

            if let Some(webhook_url) = &data.config.webhook_url {
                DiscordNotify::new(
                    data.http_client.clone(),
                    webhook_url.clone(),
                    "llmbot 已上線",
                    format!("{} 已連線，開始接收指令。", data_about_bot.user.name),
                )
                .content(format!("邀請連結: {}", invite))
                .send_notify()
                .await;
            }
        }
        serenity::FullEvent::Message { new_message } => {
            if new_message.author.bot {
                return Ok(());
            }

            if let Err(e) = data.archiver.archive(ctx, new_message).await {
                warn!("Failed to archive message {}: {:#}", new_message.id, e);
            }

            if is_debug_trigger(&new_message.content) {
                new_message.react(ctx, '🤬').await?;
            }
        }
        _ => {}
    }
    Ok(())
}

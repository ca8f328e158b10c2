use llmbot::services::archive::MessageArchiver;
use llmbot::{commands, config::Config, events, Data};
use poise::serenity_prelude as serenity;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    let prefix = config.command_prefix.clone();

    let db = llmbot::db::Database::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
    db.execute_init()?;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(events::handle_event(ctx, event, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                match config.test_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!("Registered commands in test guild {}", guild_id);
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                    }
                }

                let http_client = reqwest::Client::new();
                let llm = llmbot::llm::LlmServices::new(&config);
                let archiver =
                    MessageArchiver::new(&config.log_dir, db.clone(), http_client.clone());

                Ok(Data {
                    config,
                    http_client,
                    llm,
                    db,
                    archiver,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub test_guild_id: Option<u64>,
    pub command_prefix: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub xai_api_key: Option<String>,
    pub xai_model: String,
    pub pplx_api_key: Option<String>,
    pub search_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub huggingface_api_token: Option<String>,
    pub image_model_url: String,
    pub webhook_url: Option<String>,
    pub system_prompt: String,
    pub stream_update_interval: Duration,
    pub database_url: String,
    pub log_dir: String,
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Grok, a chatbot inspired by the Hitchhikers Guide to the Galaxy.";

const DEFAULT_IMAGE_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/strangerzonehf/Flux-Animex-v2-LoRA";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let stream_update_interval = match env::var("STREAM_UPDATE_INTERVAL") {
            Ok(raw) => humantime::parse_duration(&raw).map_err(|e| {
                anyhow::anyhow!("STREAM_UPDATE_INTERVAL must be a duration like `1s`: {}", e)
            })?,
            Err(_) => Duration::from_secs(1),
        };

        Ok(Config {
            discord_token: env::var("DISCORD_BOT_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_BOT_TOKEN must be set"))?,
            test_guild_id: env::var("DISCORD_TEST_SERVER_ID")
                .ok()
                .and_then(|id| id.parse().ok()),
            command_prefix: env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY must be set"))?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            xai_api_key: env::var("XAI_API_KEY").ok(),
            xai_model: env::var("XAI_MODEL").unwrap_or_else(|_| "grok-beta".to_string()),
            pplx_api_key: env::var("PERPLEXITY_API_KEY").ok(),
            search_model: env::var("SEARCH_MODEL")
                .unwrap_or_else(|_| "llama-3.1-sonar-large-128k-online".to_string()),
            tts_model: env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            tts_voice: env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            huggingface_api_token: env::var("HUGGINGFACE_API_TOKEN").ok(),
            image_model_url: env::var("IMAGE_MODEL_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_MODEL_URL.to_string()),
            webhook_url: env::var("DISCORD_WEBHOOK_URL").ok(),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            stream_update_interval,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/llmbot.db".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("test_guild_id", &self.test_guild_id)
            .field("command_prefix", &self.command_prefix)
            .field("openai_api_key", &"[REDACTED]")
            .field("openai_model", &self.openai_model)
            .field("xai_api_key", &self.xai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("xai_model", &self.xai_model)
            .field("pplx_api_key", &self.pplx_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("search_model", &self.search_model)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field(
                "huggingface_api_token",
                &self.huggingface_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("image_model_url", &self.image_model_url)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .field("system_prompt", &self.system_prompt)
            .field("stream_update_interval", &self.stream_update_interval)
            .field("database_url", &self.database_url)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        test_guild_id: None,
        command_prefix: "!".to_string(),
        openai_api_key: "sk-test".to_string(),
        openai_model: "gpt-4o".to_string(),
        xai_api_key: None,
        xai_model: "grok-beta".to_string(),
        pplx_api_key: None,
        search_model: "sonar".to_string(),
        tts_model: "tts-1".to_string(),
        tts_voice: "alloy".to_string(),
        huggingface_api_token: None,
        image_model_url: "http://localhost/model".to_string(),
        webhook_url: None,
        system_prompt: "test".to_string(),
        stream_update_interval: Duration::from_secs(1),
        database_url: ":memory:".to_string(),
        log_dir: "logs".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_BOT_TOKEN");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("STREAM_UPDATE_INTERVAL");
        let result = Config::build();
        assert!(
            result.is_err(),
            "Should fail when required vars are missing"
        );

        // 2. Test defaults
        env::set_var("DISCORD_BOT_TOKEN", "test_token");
        env::set_var("OPENAI_API_KEY", "sk-secret");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.stream_update_interval, Duration::from_secs(1));

        // 3. Test interval parsing
        env::set_var("STREAM_UPDATE_INTERVAL", "1500ms");
        let config = Config::build().unwrap();
        assert_eq!(config.stream_update_interval, Duration::from_millis(1500));

        env::set_var("STREAM_UPDATE_INTERVAL", "soon");
        assert!(Config::build().is_err());
        env::remove_var("STREAM_UPDATE_INTERVAL");

        // 4. Test debug redaction
        env::set_var("XAI_API_KEY", "xai-secret");
        let config_redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", config_redacted);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("sk-secret"));
        assert!(!debug_output.contains("xai-secret"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_BOT_TOKEN");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("XAI_API_KEY");
    }
}

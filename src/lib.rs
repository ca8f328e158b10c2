pub mod ascii;
pub mod attach;
pub mod commands;
pub mod config;
pub mod db;
pub mod events;
pub mod llm;
pub mod render;
pub mod services;
pub mod summary;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub http_client: reqwest::Client,
    pub llm: llm::LlmServices,
    pub db: db::Database,
    pub archiver: services::archive::MessageArchiver,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub mod commands;
pub mod config;
pub mod db;
pub mod events;
pub mod retention;
pub mod sampler;
pub mod voice;
pub mod web;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub voice: voice::VoiceTracker,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

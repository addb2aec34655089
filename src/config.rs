use dotenvy::dotenv;
use std::env;
use std::time::Duration;

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_SESSION_SECRET: &str = "dev-session-secret-change-in-production";
/// The cookie key is derived from the session secret, which requires
/// at least 32 bytes of material.
const MIN_SESSION_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub session_secret: String,
    pub database_url: String,
    pub sample_interval: Duration,
    pub retention_days: u64,
    pub web_bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let session_secret =
            env::var("SESSION_SECRET").unwrap_or_else(|_| DEFAULT_SESSION_SECRET.to_string());
        if session_secret.len() < MIN_SESSION_SECRET_BYTES {
            anyhow::bail!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            );
        }

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            client_id: env::var("DISCORD_CLIENT_ID").ok().filter(|v| !v.is_empty()),
            client_secret: env::var("DISCORD_CLIENT_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            redirect_uri: env::var("DISCORD_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8080/callback".to_string()),
            session_secret,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "data/tally.db".to_string()),
            sample_interval: env::var("SAMPLE_INTERVAL")
                .ok()
                .and_then(|v| humantime::parse_duration(v.trim()).ok())
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
            retention_days: env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            web_bind_addr: env::var("WEB_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("session_secret", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("sample_interval", &self.sample_interval)
            .field("retention_days", &self.retention_days)
            .field("web_bind_addr", &self.web_bind_addr)
            .finish()
    }
}

use crate::config::Config;
use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord OAuth2 client for the dashboard login flow.
#[derive(Clone)]
pub struct DiscordOAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until expiration, typically 604800 (7 days).
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.expires_in as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
}

impl DiscordUser {
    /// Display name, falling back to the unique username.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordGuild {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: Option<bool>,
    #[serde(default)]
    pub permissions: Option<String>,
}

impl DiscordOAuth {
    /// Returns None when the OAuth client id/secret are not configured;
    /// the dashboard then degrades to an error page on /login.
    pub fn from_config(config: &Config) -> Option<Self> {
        let client_id = config.client_id.clone()?;
        let client_secret = config.client_secret.clone()?;
        Some(Self {
            client_id,
            client_secret,
            redirect_uri: config.redirect_uri.clone(),
            http: reqwest::Client::new(),
        })
    }

    pub fn authorize_url(&self) -> String {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/oauth2/authorize", DISCORD_API_BASE),
            [
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "identify guilds"),
            ],
        )
        .expect("authorize URL is statically valid");
        url.to_string()
    }

    /// Exchanges an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<TokenResponse> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let res = self
            .http
            .post(format!("{}/oauth2/token", DISCORD_API_BASE))
            .form(&params)
            .send()
            .await
            .context("while exchanging authorization code")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".into());
            anyhow::bail!("Discord token endpoint returned {}: {}", status, body);
        }

        res.json::<TokenResponse>()
            .await
            .context("while decoding token response")
    }

    pub async fn fetch_user(&self, access_token: &str) -> anyhow::Result<DiscordUser> {
        let res = self
            .http
            .get(format!("{}/users/@me", DISCORD_API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .context("while fetching user profile")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".into());
            anyhow::bail!("Discord user endpoint returned {}: {}", status, body);
        }

        res.json::<DiscordUser>()
            .await
            .context("while decoding user profile")
    }

    pub async fn fetch_guilds(&self, access_token: &str) -> anyhow::Result<Vec<DiscordGuild>> {
        let res = self
            .http
            .get(format!("{}/users/@me/guilds", DISCORD_API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .context("while fetching user guilds")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".into());
            anyhow::bail!("Discord guilds endpoint returned {}: {}", status, body);
        }

        res.json::<Vec<DiscordGuild>>()
            .await
            .context("while decoding guild list")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> DiscordOAuth {
        DiscordOAuth {
            client_id: "1234".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_authorize_url() {
        let url = test_client().authorize_url();
        assert!(url.starts_with("https://discord.com/api/v10/oauth2/authorize?"));
        assert!(url.contains("client_id=1234"));
        assert!(url.contains("response_type=code"));
        // `identify guilds` must survive URL encoding as a single scope param.
        assert!(url.contains("scope=identify+guilds") || url.contains("scope=identify%20guilds"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = crate::config::Config {
            discord_token: "t".to_string(),
            client_id: Some("1234".to_string()),
            client_secret: None,
            redirect_uri: "http://localhost:8080/callback".to_string(),
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            database_url: ":memory:".to_string(),
            sample_interval: std::time::Duration::from_secs(300),
            retention_days: 30,
            web_bind_addr: "127.0.0.1:0".to_string(),
        };
        assert!(DiscordOAuth::from_config(&config).is_none());

        config.client_secret = Some("secret".to_string());
        assert!(DiscordOAuth::from_config(&config).is_some());
    }

    #[test]
    fn test_token_expiry_is_in_the_future() {
        let token = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: "identify guilds".to_string(),
        };
        assert!(token.expires_at() > Utc::now());
    }

    #[test]
    fn test_display_name_fallback() {
        let mut user = DiscordUser {
            id: "1".to_string(),
            username: "someone".to_string(),
            global_name: None,
            avatar: None,
        };
        assert_eq!(user.display_name(), "someone");
        user.global_name = Some("Someone Nice".to_string());
        assert_eq!(user.display_name(), "Someone Nice");
    }
}

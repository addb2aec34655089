pub mod oauth;
pub mod pages;
pub mod routes;
pub mod session;

use crate::config::Config;
use crate::db::Database;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_cookies::{CookieManagerLayer, Key};
use tracing::info;

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: session::SessionStore,
    pub oauth: Option<oauth::DiscordOAuth>,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: &Config, db: Database) -> Self {
        Self {
            db,
            sessions: session::SessionStore::new(),
            oauth: oauth::DiscordOAuth::from_config(config),
            cookie_key: Key::derive_from(config.session_secret.as_bytes()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/login", get(routes::login))
        .route("/callback", get(routes::callback))
        .route("/logout", get(routes::logout))
        .route("/dashboard", get(routes::dashboard))
        .route("/analytics/:guild_id", get(routes::analytics_page))
        .route("/api/analytics/:guild_id", get(routes::api_analytics))
        .fallback(routes::not_found)
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

/// Starts the Axum HTTP server for the dashboard.
pub async fn serve(config: Config, db: Database) -> anyhow::Result<()> {
    let addr: SocketAddr = config.web_bind_addr.parse()?;
    let state = AppState::new(&config, db);
    let app = router(state);

    info!("Dashboard HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

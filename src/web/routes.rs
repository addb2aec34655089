use crate::db::{ActivityRollup, ChannelRollup, SnapshotRow};
use crate::web::pages;
use crate::web::session::{ApiSession, RequireSession, WebSession, SESSION_COOKIE};
use crate::web::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_cookies::{Cookie, Cookies};
use tracing::{error, info, warn};

/// Window shown on the server analytics page.
const PAGE_WINDOW_DAYS: u32 = 30;
const API_DEFAULT_DAYS: u32 = 7;
const API_MAX_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("access denied")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Forbidden => (
                StatusCode::FORBIDDEN,
                Html(pages::error_page(
                    "Access Denied",
                    "You do not have access to this server.",
                )),
            )
                .into_response(),
            WebError::Internal(e) => {
                error!("Dashboard request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(pages::error_page(
                        "Server Error",
                        "Something went wrong while handling the request.",
                    )),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("access denied")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Access denied" })),
            )
                .into_response(),
            ApiError::Internal(e) => {
                error!("API request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to fetch analytics data" })),
                )
                    .into_response()
            }
        }
    }
}

pub async fn index(session: Option<RequireSession>) -> Html<String> {
    let session = session.map(|RequireSession(session)| session);
    Html(pages::index(session.as_deref()))
}

pub async fn login(State(state): State<AppState>) -> Response {
    match &state.oauth {
        Some(oauth) => Redirect::to(&oauth.authorize_url()).into_response(),
        None => Html(pages::error_page(
            "Discord OAuth not configured",
            "Set DISCORD_CLIENT_ID and DISCORD_CLIENT_SECRET to enable the dashboard login.",
        ))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(oauth) = state.oauth.clone() else {
        return Html(pages::error_page(
            "Discord OAuth not configured",
            "Set DISCORD_CLIENT_ID and DISCORD_CLIENT_SECRET to enable the dashboard login.",
        ))
        .into_response();
    };

    // A missing code means the user cancelled the flow on Discord's side.
    let Some(code) = query.code else {
        return Html(pages::error_page(
            "OAuth Error",
            "No authorization code received from Discord.",
        ))
        .into_response();
    };

    let token = match oauth.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            warn!("OAuth code exchange failed: {:#}", e);
            return Html(pages::error_page(
                "Token Exchange Failed",
                "Failed to exchange authorization code for access token.",
            ))
            .into_response();
        }
    };

    let user = match oauth.fetch_user(&token.access_token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Fetching user profile failed: {:#}", e);
            return Html(pages::error_page(
                "User Info Failed",
                "Failed to fetch user information from Discord.",
            ))
            .into_response();
        }
    };

    // A failing guild fetch still lets the user in, with an empty list.
    let guilds = match oauth.fetch_guilds(&token.access_token).await {
        Ok(guilds) => guilds,
        Err(e) => {
            warn!("Fetching guild list failed: {:#}", e);
            Vec::new()
        }
    };

    let expires_at = token.expires_at();
    let store_result = state
        .db
        .run_blocking({
            let user_id = user.id.clone();
            let access_token = token.access_token.clone();
            let refresh_token = token.refresh_token.clone();
            move |db| {
                db.store_oauth_session(
                    &user_id,
                    &access_token,
                    refresh_token.as_deref(),
                    Some(expires_at),
                )
            }
        })
        .await;
    if let Err(e) = store_result {
        warn!("Persisting OAuth session failed: {:#}", e);
    }

    info!("Dashboard login for user {}", user.id);
    let session_id = state.sessions.insert(WebSession {
        user,
        guilds,
        access_token: token.access_token,
        created_at: Utc::now(),
    });

    let mut cookie = Cookie::new(SESSION_COOKIE, session_id);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.private(&state.cookie_key).add(cookie);

    Redirect::to("/dashboard").into_response()
}

pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Redirect {
    let private = cookies.private(&state.cookie_key);
    if let Some(cookie) = private.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    private.remove(removal);

    Redirect::to("/")
}

pub async fn dashboard(RequireSession(session): RequireSession) -> Html<String> {
    Html(pages::dashboard(&session))
}

pub async fn analytics_page(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    Path(guild_id): Path<String>,
) -> Result<Html<String>, WebError> {
    let Some(guild) = session.guilds.iter().find(|g| g.id == guild_id).cloned() else {
        return Err(WebError::Forbidden);
    };

    let snapshots = state
        .db
        .run_blocking({
            let gid = guild_id.clone();
            move |db| db.get_snapshots(&gid, PAGE_WINDOW_DAYS)
        })
        .await?;
    let messages = state
        .db
        .run_blocking({
            let gid = guild_id.clone();
            move |db| db.get_message_rollup(&gid, PAGE_WINDOW_DAYS)
        })
        .await?;
    let activity = state
        .db
        .run_blocking(move |db| db.get_activity_rollup(&guild_id, PAGE_WINDOW_DAYS))
        .await?;

    Ok(Html(pages::analytics(&guild, &snapshots, &messages, &activity)))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsPayload {
    pub server_analytics: Vec<SnapshotRow>,
    pub message_analytics: Vec<ChannelRollup>,
    pub user_activity: Vec<ActivityRollup>,
}

pub async fn api_analytics(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(guild_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsPayload>, ApiError> {
    if !session.can_view(&guild_id) {
        return Err(ApiError::Forbidden);
    }

    let days = query.days.unwrap_or(API_DEFAULT_DAYS).clamp(1, API_MAX_DAYS);

    let server_analytics = state
        .db
        .run_blocking({
            let gid = guild_id.clone();
            move |db| db.get_snapshots(&gid, days)
        })
        .await?;
    let message_analytics = state
        .db
        .run_blocking({
            let gid = guild_id.clone();
            move |db| db.get_message_rollup(&gid, days)
        })
        .await?;
    let user_activity = state
        .db
        .run_blocking(move |db| db.get_activity_rollup(&guild_id, days))
        .await?;

    Ok(Json(AnalyticsPayload {
        server_analytics,
        message_analytics,
        user_activity,
    }))
}

pub async fn not_found() -> (StatusCode, Html<String>) {
    (StatusCode::NOT_FOUND, Html(pages::not_found()))
}

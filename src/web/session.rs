use crate::web::oauth::{DiscordGuild, DiscordUser};
use crate::web::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tower_cookies::Cookies;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "tally_session";

/// Server-side login session, created on a successful OAuth callback.
#[derive(Debug, Clone)]
pub struct WebSession {
    pub user: DiscordUser,
    pub guilds: Vec<DiscordGuild>,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

impl WebSession {
    /// Analytics pages are gated on membership of the requested guild.
    pub fn can_view(&self, guild_id: &str) -> bool {
        self.guilds.iter().any(|guild| guild.id == guild_id)
    }
}

/// In-memory session store keyed by the cookie's random id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Arc<WebSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: WebSession) -> String {
        let id = Uuid::new_v4().to_string();
        self.inner
            .write()
            .unwrap()
            .insert(id.clone(), Arc::new(session));
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<WebSession>> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.inner.write().unwrap().remove(id);
    }
}

async fn load_session(parts: &mut Parts, state: &AppState) -> Option<Arc<WebSession>> {
    let cookies = Cookies::from_request_parts(parts, state).await.ok()?;
    let cookie = cookies.private(&state.cookie_key).get(SESSION_COOKIE)?;
    state.sessions.get(cookie.value())
}

/// Session-gated page access; unauthenticated browsers are sent to /login.
pub struct RequireSession(pub Arc<WebSession>);

#[async_trait]
impl FromRequestParts<AppState> for RequireSession {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match load_session(parts, state).await {
            Some(session) => Ok(RequireSession(session)),
            None => Err(Redirect::to("/login")),
        }
    }
}

/// Session-gated API access; unauthenticated callers get a JSON 401.
pub struct ApiSession(pub Arc<WebSession>);

#[async_trait]
impl FromRequestParts<AppState> for ApiSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match load_session(parts, state).await {
            Some(session) => Ok(ApiSession(session)),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(guild_ids: &[&str]) -> WebSession {
        WebSession {
            user: DiscordUser {
                id: "1".to_string(),
                username: "someone".to_string(),
                global_name: None,
                avatar: None,
            },
            guilds: guild_ids
                .iter()
                .map(|id| DiscordGuild {
                    id: id.to_string(),
                    name: format!("guild {}", id),
                    icon: None,
                    owner: None,
                    permissions: None,
                })
                .collect(),
            access_token: "token".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_store_roundtrip() {
        let store = SessionStore::new();
        let id = store.insert(test_session(&["10"]));

        let session = store.get(&id).unwrap();
        assert_eq!(session.user.username, "someone");

        store.remove(&id);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let store = SessionStore::new();
        let a = store.insert(test_session(&[]));
        let b = store.insert(test_session(&[]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_guild_membership_check() {
        let session = test_session(&["10", "20"]);
        assert!(session.can_view("10"));
        assert!(session.can_view("20"));
        assert!(!session.can_view("30"));
    }
}

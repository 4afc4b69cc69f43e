//! Session and token access for request handlers.
//!
//! The session is a signed cookie. [`SessionAccessor`] is the seam the proxy
//! handlers use to read it, so tests and dummy mode can swap in their own.

use async_trait::async_trait;
use axum::http::request::Parts;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::callbacks::{ensure_api_access_token, session_callback};
use super::helpers::read_session_cookie;
use super::AuthContext;
pub use super::jwt::Token;

/// Marker set on the session when the API token could not be refreshed.
pub const REFRESH_ACCESS_TOKEN_ERROR: &str = "RefreshAccessTokenError";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Client-facing view of the session, derived from the [`Token`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: SessionUser,
    /// RFC 3339 timestamp
    pub expires: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_access_token_expires_at: Option<i64>,
}

impl Session {
    pub fn has_refresh_error(&self) -> bool {
        self.error.as_deref() == Some(REFRESH_ACCESS_TOKEN_ERROR)
    }
}

#[async_trait]
pub trait SessionAccessor: Send + Sync {
    /// Session for the request, with the API token refreshed if needed.
    async fn get_server_session(&self, parts: &Parts) -> anyhow::Result<Option<Session>>;

    /// Verified claims of the session cookie.
    async fn get_token(&self, parts: &Parts) -> anyhow::Result<Option<Token>>;
}

/// Accessor used when auth runs in dummy mode: nobody is signed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummySessionAccessor;

#[async_trait]
impl SessionAccessor for DummySessionAccessor {
    async fn get_server_session(&self, _parts: &Parts) -> anyhow::Result<Option<Session>> {
        Ok(None)
    }

    async fn get_token(&self, _parts: &Parts) -> anyhow::Result<Option<Token>> {
        Ok(None)
    }
}

/// Reads the signed session cookie.
///
/// An invalid or expired cookie counts as signed out. The API token refreshed
/// by [`SessionAccessor::get_server_session`] lives only for the request;
/// `/api/auth/session` is what writes it back to the cookie. Until then every
/// proxied call with an expired API token redeems the refresh token again.
pub struct CookieSessionAccessor {
    auth: AuthContext,
}

impl CookieSessionAccessor {
    pub fn new(auth: AuthContext) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl SessionAccessor for CookieSessionAccessor {
    async fn get_server_session(&self, parts: &Parts) -> anyhow::Result<Option<Session>> {
        let Some(mut token) = self.get_token(parts).await? else {
            return Ok(None);
        };

        let status = ensure_api_access_token(
            &mut token,
            self.auth.api_tokens.as_ref(),
            Utc::now().timestamp(),
        )
        .await;
        tracing::debug!(sub = %token.sub, status = ?status, "Session resolved");

        Ok(Some(session_callback(&token)))
    }

    async fn get_token(&self, parts: &Parts) -> anyhow::Result<Option<Token>> {
        let Some(raw) = read_session_cookie(&parts.headers) else {
            return Ok(None);
        };

        // Rejections are logged by the codec
        Ok(self.auth.codec.decode(&raw).ok())
    }
}

/// Pick the accessor for the configured auth mode.
pub fn session_accessor(auth: Option<&AuthContext>) -> Arc<dyn SessionAccessor> {
    match auth {
        Some(auth) => Arc::new(CookieSessionAccessor::new(auth.clone())),
        None => Arc::new(DummySessionAccessor),
    }
}

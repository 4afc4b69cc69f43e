//! Token and session callbacks.
//!
//! `jwt_callback` builds the cookie claims at sign-in, `session_callback`
//! projects them into the client-facing [`Session`], and
//! `ensure_api_access_token` keeps the downstream API token current.

use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;

use super::api_token::ApiTokenSource;
use super::jwt::Token;
use super::session::{Session, SessionUser, REFRESH_ACCESS_TOKEN_ERROR};

/// Tokens returned by the authorization code exchange.
#[derive(Debug, Clone, Default)]
pub struct SignInAccount {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// Profile claims read from the Azure AD id token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

pub fn jwt_callback(
    account: SignInAccount,
    profile: IdTokenProfile,
    now: i64,
    max_age_secs: u64,
) -> Token {
    Token {
        sub: profile.sub.or(profile.oid).unwrap_or_default(),
        email: profile.email.or(profile.preferred_username),
        name: profile.name,
        roles: profile.roles,
        access_token: Some(account.access_token),
        refresh_token: account.refresh_token,
        id_token: account.id_token,
        api_access_token: None,
        api_access_token_expires_at: None,
        error: None,
        iat: now,
        exp: now.saturating_add(i64::try_from(max_age_secs).unwrap_or(i64::MAX)),
    }
}

pub fn session_callback(token: &Token) -> Session {
    let expires = DateTime::from_timestamp(token.exp, 0)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();

    Session {
        user: SessionUser {
            name: token.name.clone(),
            email: token.email.clone(),
            roles: (!token.roles.is_empty()).then(|| token.roles.clone()),
        },
        expires,
        error: token.error.clone(),
        access_token: token.access_token.clone(),
        id_token: token.id_token.clone(),
        api_access_token: token.api_access_token.clone(),
        api_access_token_expires_at: token.api_access_token_expires_at,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiTokenStatus {
    /// Stored token still valid
    Valid,
    /// New token written into the claims
    Refreshed,
    /// Refresh failed for this request; the error marker is set
    Failed,
    /// No refresh token to redeem
    Unavailable,
}

impl ApiTokenStatus {
    /// Whether the claims changed and the cookie should be re-issued
    pub fn changed(self) -> bool {
        matches!(self, ApiTokenStatus::Refreshed | ApiTokenStatus::Failed)
    }
}

/// Refresh the API access token when it is missing or expired.
///
/// The error marker only reflects the latest attempt: a token that still
/// needs refreshing is retried even if an earlier refresh failed.
pub async fn ensure_api_access_token(
    token: &mut Token,
    source: &dyn ApiTokenSource,
    now: i64,
) -> ApiTokenStatus {
    if token.api_access_token.is_some()
        && token.api_access_token_expires_at.is_some_and(|exp| now < exp)
    {
        return ApiTokenStatus::Valid;
    }

    token.error = None;

    let Some(refresh_token) = token.refresh_token.clone() else {
        tracing::debug!(sub = %token.sub, "No refresh token, skipping API token refresh");
        return ApiTokenStatus::Unavailable;
    };

    match source.get_api_access_token(&refresh_token).await {
        Ok(api_token) => {
            token.api_access_token = Some(api_token.access_token);
            token.api_access_token_expires_at = Some(api_token.expires_at);
            if !api_token.roles.is_empty() {
                token.roles = api_token.roles;
            }
            ApiTokenStatus::Refreshed
        }
        Err(e) => {
            tracing::warn!(sub = %token.sub, error = %e, "API access token refresh failed");
            token.error = Some(REFRESH_ACCESS_TOKEN_ERROR.to_string());
            ApiTokenStatus::Failed
        }
    }
}

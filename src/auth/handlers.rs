//! Authentication handlers for the `/api/auth` endpoints
//!
//! - `signin_handler`: Initiates the Azure AD authorization code flow
//! - `callback_handler`: Handles the callback, token exchange and session cookie
//! - `session_handler`: Returns the current session as JSON
//! - `signout_handler`: Clears the session cookies
//! - `dummy_auth_handler`: Placeholder for every auth path in dummy mode

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointSet,
    ExtraTokenFields, RedirectUrl, Scope, StandardErrorResponse, StandardRevocableToken,
    StandardTokenIntrospectionResponse, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::callbacks::{
    ensure_api_access_token, jwt_callback, session_callback, IdTokenProfile, SignInAccount,
};
use super::helpers::{
    build_cookie, clear_cookie, decode_claims_unverified, extract_cookie, header_value,
    read_session_cookie, safe_callback_url, session_cookies, CALLBACK_URL_COOKIE, STATE_COOKIE,
};
use super::AuthContext;
use crate::config::Config;
use crate::AppState;

// =============================================================================
// Types
// =============================================================================

/// Custom extra fields to capture id_token from OIDC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

/// Type alias for our configured OAuth client with OIDC support
type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<OidcTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    EndpointSet,            // HasAuthUrl
    oauth2::EndpointNotSet, // HasDeviceAuthUrl
    oauth2::EndpointNotSet, // HasIntrospectionUrl
    oauth2::EndpointNotSet, // HasRevocationUrl
    EndpointSet,            // HasTokenUrl
>;

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Lifetime of the CSRF state and callback URL cookies
const FLOW_COOKIE_MAX_AGE_SECS: u64 = 600;

// =============================================================================
// Internal Helpers
// =============================================================================

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn auth_context(state: &AppState) -> Result<&AuthContext, Response> {
    state.auth.as_ref().ok_or_else(dummy_response)
}

/// Append Set-Cookie headers; fails on the first value that is not a valid header.
fn append_cookies(response: &mut Response, cookies: &[String]) -> Result<(), Response> {
    for cookie in cookies {
        let value = header_value(cookie).map_err(|e| *e)?;
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(())
}

/// Initialize OAuth2 client for the configured tenant
fn create_oauth_client(config: &Config) -> Result<ConfiguredOAuthClient, String> {
    let client_id = ClientId::new(config.azure_ad_client_id.clone());
    let client_secret = ClientSecret::new(config.azure_ad_client_secret.clone());

    let auth_url = AuthUrl::new(config.authorize_endpoint())
        .map_err(|e| format!("Invalid auth URL: {}", e))?;

    let token_url = TokenUrl::new(config.token_endpoint())
        .map_err(|e| format!("Invalid token URL: {}", e))?;

    let redirect_url = RedirectUrl::new(config.callback_url())
        .map_err(|e| format!("Invalid redirect URL: {}", e))?;

    // Azure AD takes the client credentials in the form body
    let client = oauth2::Client::new(client_id)
        .set_client_secret(client_secret)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
        .set_auth_type(AuthType::RequestBody);

    Ok(client)
}

fn dummy_response() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        "Not Implemented - Dummy Auth Handler",
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Sign-in handler - initiates the OAuth2 authorization code flow
pub async fn signin_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SignInQuery>,
) -> Result<Response, Response> {
    tracing::info!("Sign-in requested");
    auth_context(&state)?;

    let oauth_client = create_oauth_client(&state.config).map_err(|e| {
        tracing::error!(error = %e, "Failed to create OAuth client");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "OAuth configuration error")
    })?;

    // Generate authorization URL with CSRF protection
    let (auth_url, csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(state.config.sign_in_scopes().into_iter().map(Scope::new))
        .url();

    tracing::info!(
        tenant = %state.config.azure_ad_tenant_id,
        "Redirecting to Azure AD for authentication"
    );

    let secure = state.config.cookie_secure_flag();
    let mut cookies = vec![build_cookie(
        STATE_COOKIE,
        csrf_token.secret(),
        "/api/auth",
        FLOW_COOKIE_MAX_AGE_SECS,
        secure,
    )];
    if let Some(target) = query
        .callback_url
        .as_deref()
        .and_then(|raw| safe_callback_url(raw, &state.config.auth_origin))
    {
        cookies.push(build_cookie(
            CALLBACK_URL_COOKIE,
            &urlencoding::encode(&target),
            "/api/auth",
            FLOW_COOKIE_MAX_AGE_SECS,
            secure,
        ));
    }

    let mut response = Redirect::to(auth_url.as_str()).into_response();
    append_cookies(&mut response, &cookies)?;

    Ok(response)
}

/// Callback handler - handles OAuth2 callback, token exchange and session cookie
pub async fn callback_handler(
    Query(params): Query<CallbackParams>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    tracing::info!("OAuth callback received");

    let auth = match auth_context(&state) {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = ?params.error_description,
            "OAuth authorization failed"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": error,
                "error_description": params.error_description
            })),
        )
            .into_response();
    }

    // CSRF Protection: Validate state parameter matches stored cookie
    let Some(state_from_callback) = params.state.as_deref() else {
        tracing::warn!("CSRF validation failed: No state parameter in callback");
        return json_error(StatusCode::BAD_REQUEST, "Missing state parameter");
    };

    let Some(stored_state) = extract_cookie(&headers, STATE_COOKIE) else {
        tracing::warn!(
            has_cookie_header = headers.get("cookie").is_some(),
            "CSRF validation failed: No state cookie found"
        );
        return json_error(
            StatusCode::UNAUTHORIZED,
            "CSRF validation failed: missing state cookie",
        );
    };

    if state_from_callback != stored_state {
        tracing::warn!("CSRF validation failed: State mismatch (callback vs cookie)");
        return json_error(StatusCode::UNAUTHORIZED, "CSRF validation failed: state mismatch");
    }

    let Some(code) = params.code else {
        tracing::warn!("No authorization code received");
        return json_error(StatusCode::BAD_REQUEST, "Missing authorization code");
    };

    tracing::debug!(code_length = code.len(), "Authorization code received");

    let oauth_client = match create_oauth_client(&state.config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create OAuth client");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "OAuth configuration error");
        }
    };

    tracing::info!("Exchanging authorization code for tokens");

    let token_response = match oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .request_async(&state.http_client)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange code for tokens");
            return json_error(StatusCode::UNAUTHORIZED, "Token exchange failed");
        }
    };

    let account = SignInAccount {
        access_token: token_response.access_token().secret().clone(),
        refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
        id_token: token_response.extra_fields().id_token.clone(),
    };

    tracing::info!(
        has_id_token = account.id_token.is_some(),
        has_refresh_token = account.refresh_token.is_some(),
        "Successfully obtained tokens"
    );

    let profile = match account.id_token.as_deref() {
        Some(id_token) => decode_claims_unverified::<IdTokenProfile>(id_token).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read profile from id_token");
            IdTokenProfile::default()
        }),
        None => {
            tracing::warn!("No id_token received from Azure AD - profile will be empty");
            IdTokenProfile::default()
        }
    };

    let now = Utc::now().timestamp();
    let mut token = jwt_callback(account, profile, now, auth.codec.max_age_secs());
    let api_status = ensure_api_access_token(&mut token, auth.api_tokens.as_ref(), now).await;

    let encoded = match auth.codec.encode(&token) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::error!(error = %e, "Failed to sign session token");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let redirect_to = extract_cookie(&headers, CALLBACK_URL_COOKIE)
        .and_then(|raw| urlencoding::decode(&raw).ok().map(|s| s.into_owned()))
        .and_then(|raw| safe_callback_url(&raw, &state.config.auth_origin))
        .unwrap_or_else(|| "/".to_string());

    let secure = state.config.cookie_secure_flag();
    let mut cookies = session_cookies(
        Some(&encoded),
        auth.codec.max_age_secs(),
        secure,
        &headers,
    );
    cookies.push(clear_cookie(STATE_COOKIE, "/api/auth", secure));
    cookies.push(clear_cookie(CALLBACK_URL_COOKIE, "/api/auth", secure));

    let mut response = Redirect::to(&redirect_to).into_response();
    if let Err(response) = append_cookies(&mut response, &cookies) {
        return response;
    }

    tracing::info!(
        user = %token.sub,
        api_token = ?api_status,
        redirect_to = %redirect_to,
        "Authentication successful"
    );
    response
}

/// Session handler - current session as JSON, `{}` when signed out
///
/// Runs the session callback; when the API token changed the cookie is
/// re-issued so the next request reuses it.
pub async fn session_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let auth = match auth_context(&state) {
        Ok(auth) => auth,
        Err(response) => return response,
    };
    let secure = state.config.cookie_secure_flag();

    let Some(raw) = read_session_cookie(&headers) else {
        return Json(serde_json::json!({})).into_response();
    };

    let Ok(mut token) = auth.codec.decode(&raw) else {
        let mut response = Json(serde_json::json!({})).into_response();
        let _ = append_cookies(&mut response, &session_cookies(None, 0, secure, &headers));
        return response;
    };

    let now = Utc::now().timestamp();
    let status = ensure_api_access_token(&mut token, auth.api_tokens.as_ref(), now).await;
    let mut response = Json(session_callback(&token)).into_response();

    if status.changed() {
        let encoded = match auth.codec.encode(&token) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to re-sign session token");
                return response;
            }
        };
        let cookies = session_cookies(Some(&encoded), auth.codec.max_age_secs(), secure, &headers);
        if let Err(response) = append_cookies(&mut response, &cookies) {
            return response;
        }
        tracing::debug!(user = %token.sub, status = ?status, "Session cookie re-issued");
    }

    response
}

/// Sign-out handler - clears the session cookies and returns to the sign-in page
pub async fn signout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = auth_context(&state) {
        return response;
    }

    let cookies = session_cookies(None, 0, state.config.cookie_secure_flag(), &headers);

    let mut response = Redirect::to("/auth/signin").into_response();
    // Clearing is best-effort, never block the sign-out
    let _ = append_cookies(&mut response, &cookies);

    tracing::info!(
        event = "session_cleared",
        cleared_cookies = cookies.len(),
        "Signed out"
    );
    response
}

/// Handler mounted on every `/api/auth/*` path in dummy mode
pub async fn dummy_auth_handler() -> Response {
    tracing::debug!("Dummy auth handler called");
    dummy_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "AZURE_AD_TENANT_ID" => Some("tenant".to_string()),
            "AZURE_AD_CLIENT_ID" => Some("client".to_string()),
            "AZURE_AD_CLIENT_SECRET" => Some("secret".to_string()),
            "AZURE_AD_API_CLIENT_ID" => Some("api-client".to_string()),
            "AUTH_SECRET" => Some("signing".to_string()),
            "AUTH_ORIGIN" => Some("https://app.example.com".to_string()),
            "API_URL" => Some("https://api.example.com".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url_targets_tenant_with_api_scope() {
        let client = create_oauth_client(&config()).unwrap();
        let (url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(config().sign_in_scopes().into_iter().map(Scope::new))
            .url();

        assert!(url
            .as_str()
            .starts_with("https://login.microsoftonline.com/tenant/oauth2/v2.0/authorize?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("client_id").as_deref(), Some("client"));
        assert_eq!(
            get("redirect_uri").as_deref(),
            Some("https://app.example.com/api/auth/callback/azure-ad")
        );
        assert_eq!(
            get("scope").as_deref(),
            Some("openid profile email offline_access api://api-client/user_impersonation")
        );
        assert_eq!(get("state").as_deref(), Some(csrf.secret().as_str()));
    }

    #[tokio::test]
    async fn test_dummy_handler_is_not_implemented() {
        let response = dummy_auth_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}

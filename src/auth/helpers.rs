//! Helper functions for authentication
//!
//! Cookie reading and writing, HTTP client construction and unverified JWT
//! payload decoding.

use anyhow::Context;
use axum::{
    http::{header::InvalidHeaderValue, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "auth.session-token";
pub const STATE_COOKIE: &str = "auth.state";
pub const CALLBACK_URL_COOKIE: &str = "auth.callback-url";

/// Browsers cap a cookie at 4096 bytes including name and attributes.
pub const COOKIE_CHUNK_SIZE: usize = 3800;

// =============================================================================
// HTTP Client Builders
// =============================================================================

/// Create the shared reqwest client using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

// =============================================================================
// JWT Helpers
// =============================================================================

/// Decode the payload segment of a JWT without checking its signature.
///
/// Only for tokens received directly from the token endpoint.
pub fn decode_claims_unverified<T: DeserializeOwned>(token: &str) -> anyhow::Result<T> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => anyhow::bail!("Malformed JWT: expected three segments"),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("JWT payload is not base64url")?;
    serde_json::from_slice(&bytes).context("JWT payload is not valid JSON")
}

// =============================================================================
// Cookie Extraction
// =============================================================================

/// Extract a cookie value from headers
///
/// Handles multiple Cookie headers (some proxies fold/duplicate headers).
/// Uses `get_all` to collect all Cookie header values.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);

    // Iterate over all Cookie headers (proxies may send multiple)
    for header_value in headers.get_all("cookie") {
        if let Ok(cookie_str) = header_value.to_str() {
            if let Some(value) = cookie_str
                .split(';')
                .map(|c| c.trim())
                .find(|c| c.starts_with(&prefix))
                .and_then(|c| c.strip_prefix(&prefix))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Names of all cookies on the request that start with `prefix`
fn cookie_names_with_prefix(headers: &HeaderMap, prefix: &str) -> Vec<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().split_once('=').map(|(name, _)| name.to_string()))
        .filter(|name| name.starts_with(prefix))
        .collect()
}

/// Read the session cookie, joining `auth.session-token.N` chunks in order.
pub fn read_session_cookie(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = extract_cookie(headers, SESSION_COOKIE) {
        return Some(value);
    }

    let mut value = String::new();
    for index in 0.. {
        match extract_cookie(headers, &format!("{}.{}", SESSION_COOKIE, index)) {
            Some(chunk) => value.push_str(&chunk),
            None => break,
        }
    }
    (!value.is_empty()).then_some(value)
}

// =============================================================================
// Cookie Builders
// =============================================================================

pub fn build_cookie(name: &str, value: &str, path: &str, max_age_secs: u64, secure_flag: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path={}; Max-Age={}; SameSite=Lax{}",
        name, value, path, max_age_secs, secure_flag
    )
}

pub fn clear_cookie(name: &str, path: &str, secure_flag: &str) -> String {
    build_cookie(name, "", path, 0, secure_flag)
}

/// Set-Cookie values that store `value` as the session, splitting it into
/// chunks when it is too large for one cookie. Session cookies on the request
/// that the new layout does not overwrite are cleared. `None` clears them all.
pub fn session_cookies(
    value: Option<&str>,
    max_age_secs: u64,
    secure_flag: &str,
    request_headers: &HeaderMap,
) -> Vec<String> {
    let mut written: Vec<String> = Vec::new();
    let mut cookies = Vec::new();

    if let Some(value) = value {
        if value.len() <= COOKIE_CHUNK_SIZE {
            written.push(SESSION_COOKIE.to_string());
            cookies.push(build_cookie(SESSION_COOKIE, value, "/", max_age_secs, secure_flag));
        } else {
            // Session JWTs are ASCII, so byte chunks are valid UTF-8
            for (index, chunk) in value.as_bytes().chunks(COOKIE_CHUNK_SIZE).enumerate() {
                let name = format!("{}.{}", SESSION_COOKIE, index);
                let chunk = std::str::from_utf8(chunk).unwrap_or_default();
                cookies.push(build_cookie(&name, chunk, "/", max_age_secs, secure_flag));
                written.push(name);
            }
        }
    }

    for stale in cookie_names_with_prefix(request_headers, SESSION_COOKIE) {
        if !written.contains(&stale) {
            cookies.push(clear_cookie(&stale, "/", secure_flag));
        }
    }

    cookies
}

// =============================================================================
// Redirect Targets
// =============================================================================

/// Accept a post-sign-in redirect only if it stays on this origin.
///
/// Relative paths pass through; absolute URLs on `auth_origin` are reduced to
/// their path and query. Anything else yields `None`.
pub fn safe_callback_url(raw: &str, auth_origin: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with('/') && !raw.starts_with("//") && !raw.starts_with("/\\") {
        return Some(raw.to_string());
    }

    let target = url::Url::parse(raw).ok()?;
    let origin = url::Url::parse(auth_origin).ok()?;
    if target.origin() != origin.origin() {
        return None;
    }

    let mut relative = target.path().to_string();
    if let Some(query) = target.query() {
        relative.push('?');
        relative.push_str(query);
    }
    Some(relative)
}

// =============================================================================
// Response Helpers
// =============================================================================

/// Create a HeaderValue from a string, returning an error response if invalid.
/// This prevents panics from malformed cookie values.
pub fn header_value(s: &str) -> Result<HeaderValue, Box<Response>> {
    HeaderValue::from_str(s).map_err(|e: InvalidHeaderValue| {
        tracing::error!(
            error = %e,
            value_len = s.len(),
            "Failed to create header value - possible malformed token"
        );
        Box::new(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error setting response headers"})),
            )
                .into_response(),
        )
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_extract_cookie_finds_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("foo=bar; auth.state=abc123; baz=qux"),
        );

        let result = extract_cookie(&headers, "auth.state");
        assert_eq!(result, Some("abc123".to_string()));
    }

    #[test]
    fn test_extract_cookie_missing_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("foo=bar; baz=qux"));

        assert_eq!(extract_cookie(&headers, "auth.state"), None);
    }

    #[test]
    fn test_extract_cookie_no_cookie_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_cookie(&headers, "auth.state"), None);
    }

    #[test]
    fn test_extract_cookie_multiple_headers() {
        // Some proxies send multiple Cookie headers instead of one combined header
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_static("foo=bar"));
        headers.append(
            "cookie",
            HeaderValue::from_static("auth.state=secret123; baz=qux"),
        );

        assert_eq!(
            extract_cookie(&headers, "auth.state"),
            Some("secret123".to_string())
        );
    }

    #[test]
    fn test_read_session_cookie_prefers_whole_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("auth.session-token.0=aa; auth.session-token=whole"),
        );
        assert_eq!(read_session_cookie(&headers), Some("whole".to_string()));
    }

    #[test]
    fn test_read_session_cookie_joins_chunks_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(
            "cookie",
            HeaderValue::from_static("auth.session-token.1=bb; other=x"),
        );
        headers.append("cookie", HeaderValue::from_static("auth.session-token.0=aa"));
        assert_eq!(read_session_cookie(&headers), Some("aabb".to_string()));
    }

    #[test]
    fn test_session_cookies_single() {
        let cookies = session_cookies(Some("jwt"), 60, "", &HeaderMap::new());
        assert_eq!(
            cookies,
            vec!["auth.session-token=jwt; HttpOnly; Path=/; Max-Age=60; SameSite=Lax"]
        );
    }

    #[test]
    fn test_session_cookies_chunked_and_stale_cleared() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("auth.session-token=old; auth.session-token.5=old"),
        );
        let value = "x".repeat(COOKIE_CHUNK_SIZE * 2 + 1);

        let cookies = session_cookies(Some(&value), 60, "; Secure", &headers);

        assert_eq!(cookies.len(), 5);
        assert!(cookies[0].starts_with("auth.session-token.0=xxx"));
        assert!(cookies[2].starts_with("auth.session-token.2=x;"));
        assert!(cookies.iter().all(|c| c.ends_with("; Secure")));
        assert!(cookies[3].starts_with("auth.session-token=; "));
        assert!(cookies[3].contains("Max-Age=0"));
        assert!(cookies[4].starts_with("auth.session-token.5=; "));
    }

    #[test]
    fn test_session_cookies_none_clears_everything() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("auth.session-token.0=a; auth.session-token.1=b; keep=me"),
        );
        let cookies = session_cookies(None, 60, "", &headers);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn test_safe_callback_url() {
        let origin = "https://app.example.com";
        assert_eq!(safe_callback_url("/docs?x=1", origin), Some("/docs?x=1".to_string()));
        assert_eq!(
            safe_callback_url("https://app.example.com/docs", origin),
            Some("/docs".to_string())
        );
        assert_eq!(safe_callback_url("https://evil.example.com/", origin), None);
        assert_eq!(safe_callback_url("//evil.example.com", origin), None);
        assert_eq!(safe_callback_url("javascript:alert(1)", origin), None);
    }

    #[derive(Debug, Deserialize)]
    struct Claims {
        exp: i64,
    }

    #[test]
    fn test_decode_claims_unverified() {
        // Payload: {"exp":4102444800}
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJleHAiOjQxMDI0NDQ4MDB9.sig";
        let claims: Claims = decode_claims_unverified(token).unwrap();
        assert_eq!(claims.exp, 4102444800);
    }

    #[test]
    fn test_decode_claims_unverified_rejects_malformed() {
        assert!(decode_claims_unverified::<Claims>("not-a-jwt").is_err());
        assert!(decode_claims_unverified::<Claims>("a.b").is_err());
        assert!(decode_claims_unverified::<Claims>("a.!!!.c").is_err());
    }
}

use super::templates::SignInTemplate;
use crate::{auth::extractors::OptionalToken, i18n, AppState};
use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header::ACCEPT_LANGUAGE, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SignInPageQuery {
    pub locale: Option<String>,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe
///
/// State is only built once configuration and the route descriptor loaded,
/// so a running router is ready. Reports the mode and proxied route count.
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mode = match (state.config.auth_enabled, state.auth.is_some()) {
        (false, _) => "auth disabled",
        (true, true) => "azure-ad",
        (true, false) => "dummy",
    };
    (
        StatusCode::OK,
        format!("ready ({}, {} proxy routes)", mode, state.routes.routes.len()),
    )
}

/// Sign-in page, only for callers without a session
pub async fn signin_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SignInPageQuery>,
    headers: HeaderMap,
    OptionalToken(token): OptionalToken,
) -> Response {
    if let Some(token) = token {
        tracing::debug!(user = %token.sub, "Already signed in, leaving sign-in page");
        return Redirect::to("/").into_response();
    }

    let locale = i18n::negotiate_locale(
        query.locale.as_deref(),
        headers.get(ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok()),
        &state.config.default_locale,
    );

    let signin_url = match query.callback_url.as_deref() {
        Some(callback) => format!(
            "/api/auth/signin/azure-ad?callbackUrl={}",
            urlencoding::encode(callback)
        ),
        None => "/api/auth/signin/azure-ad".to_string(),
    };

    let template = SignInTemplate::localized(&i18n::Translator::new(locale), signin_url);
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render sign-in page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

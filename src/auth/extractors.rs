use crate::auth::session::Token;
use crate::backend::HandlerError;
use crate::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// Session token of the caller, if signed in.
///
/// Never rejects for a missing or invalid cookie; only an accessor failure
/// turns into an error response.
///
/// Usage:
/// ```rust,ignore
/// async fn handler(OptionalToken(token): OptionalToken) {
///     if let Some(token) = token {
///         println!("Signed in as {}", token.sub);
///     }
/// }
/// ```
pub struct OptionalToken(pub Option<Token>);

impl FromRequestParts<Arc<AppState>> for OptionalToken {
    type Rejection = HandlerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = state
            .sessions
            .get_token(parts)
            .await
            .map_err(HandlerError::from_anyhow)?;

        match &token {
            Some(token) => tracing::debug!(user = %token.sub, "Caller is signed in"),
            None => tracing::debug!("Caller is not signed in"),
        }

        Ok(OptionalToken(token))
    }
}

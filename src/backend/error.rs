use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub const UNAUTHORIZED: &str = "Unauthorized";
pub const TOKEN_REFRESH_FAILED: &str = "Token Refresh Failed";
pub const BACKEND_COMMUNICATION_ERROR: &str = "Backend Communication Error";

/// Error surfaced by a proxied route, carrying the status the client receives.
///
/// Errors that already carry a status pass through the proxy untouched; any
/// other failure is wrapped as a 500 with the original error kept alongside.
#[derive(Debug, Error)]
#[error("{status_message}: {message}")]
pub struct HandlerError {
    pub status_code: StatusCode,
    pub status_message: String,
    pub message: String,
    original_error: Option<anyhow::Error>,
}

impl HandlerError {
    pub fn new(
        status_code: StatusCode,
        status_message: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            status_message: status_message.into(),
            message: message.into(),
            original_error: None,
        }
    }

    pub fn with_original(mut self, err: anyhow::Error) -> Self {
        self.original_error = Some(err);
        self
    }

    pub fn original_error(&self) -> Option<&anyhow::Error> {
        self.original_error.as_ref()
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            UNAUTHORIZED,
            "You must be logged in to access this resource.",
        )
    }

    pub fn token_refresh_failed() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            TOKEN_REFRESH_FAILED,
            "Authentication tokens have expired and could not be refreshed. Please sign in again.",
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request body", message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Payload Too Large",
            format!("Request body exceeds {} bytes", limit),
        )
    }

    /// Wrap an unclassified failure as a 500, keeping the cause.
    pub fn backend_communication(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            BACKEND_COMMUNICATION_ERROR,
            err.to_string(),
        )
        .with_original(err)
    }

    /// Classify an error raised anywhere in the proxy pipeline.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<HandlerError>() {
            Ok(handler_error) => handler_error,
            Err(other) => Self::backend_communication(other),
        }
    }

    /// Log once at the HTTP boundary, severity by status class.
    pub fn log(&self, route: &str) {
        if self.status_code.is_server_error() {
            tracing::error!(
                route = %route,
                status = self.status_code.as_u16(),
                status_message = %self.status_message,
                message = %self.message,
                original_error = ?self.original_error,
                "Backend route failed"
            );
        } else {
            tracing::warn!(
                route = %route,
                status = self.status_code.as_u16(),
                status_message = %self.status_message,
                "Backend route rejected request"
            );
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "statusCode": self.status_code.as_u16(),
            "statusMessage": self.status_message,
            "message": self.message,
        });
        if let Some(original) = &self.original_error {
            body["data"] = json!({ "originalError": format!("{:#}", original) });
        }
        (self.status_code, Json(body)).into_response()
    }
}

//! Request body extraction strategies.

use async_trait::async_trait;
use axum::{body::Body, http::request::Parts};
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::error::Error as _;
use std::sync::Arc;

use super::error::HandlerError;
use super::method::HttpMethod;

/// Largest inbound payload `ExtractBody` will buffer.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Decides whether and how to read the payload of an inbound request.
#[async_trait]
pub trait BodyProvider: Send + Sync {
    async fn provide(&self, parts: &Parts, body: Body) -> anyhow::Result<Option<Value>>;
}

/// Never reads the body stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

#[async_trait]
impl BodyProvider for NoBody {
    async fn provide(&self, _parts: &Parts, _body: Body) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}

/// Buffers the payload and parses it as JSON. An empty payload is `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractBody;

#[async_trait]
impl BodyProvider for ExtractBody {
    async fn provide(&self, _parts: &Parts, body: Body) -> anyhow::Result<Option<Value>> {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| {
                if exceeds_limit(&e) {
                    HandlerError::payload_too_large(MAX_BODY_BYTES)
                } else {
                    HandlerError::bad_request(format!("Failed to read request body: {}", e))
                }
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value = serde_json::from_slice(&bytes)
            .map_err(|e| HandlerError::bad_request(format!("Request body is not valid JSON: {}", e)))?;
        Ok(Some(value))
    }
}

fn exceeds_limit(err: &axum::Error) -> bool {
    std::iter::successors(err.source(), |e: &&(dyn std::error::Error + 'static)| (*e).source()).any(|e| e.is::<LengthLimitError>())
}

/// Body provider used when a route does not supply its own.
///
/// Methods without a payload (or no method at all) never touch the body.
pub fn default_body_provider(method: Option<HttpMethod>) -> Arc<dyn BodyProvider> {
    match method {
        None | Some(HttpMethod::Get) | Some(HttpMethod::Delete) => Arc::new(NoBody),
        Some(HttpMethod::Post) | Some(HttpMethod::Put) => Arc::new(ExtractBody),
    }
}

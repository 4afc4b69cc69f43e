//! Outbound calls to the backend API.

use anyhow::Context;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::HandlerError;
use super::method::HttpMethod;

/// Fully resolved outbound request handed to a [`Fetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    /// JSON text sent on the wire, `None` when there is no body.
    pub fn serialized_body(&self) -> anyhow::Result<Option<String>> {
        self.body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize backend request body")
    }
}

/// Performs the HTTP call to the backend.
#[async_trait]
pub trait Fetcher<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<T>;
}

/// Default fetcher backed by the shared reqwest client.
///
/// No retries. A non-2xx backend status is reported as a [`HandlerError`]
/// with that status so it reaches the client unchanged. Dropping the future
/// (client disconnect) drops the in-flight request.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<T> Fetcher<T> for ReqwestFetcher
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<T> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.serialized_body()? {
            builder = builder.body(body);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            has_body = request.body.is_some(),
            "Calling backend"
        );

        let response = builder
            .send()
            .await
            .with_context(|| format!("[{}] \"{}\": request failed", request.method, request.url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let mut err = HandlerError::new(
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                status.canonical_reason().unwrap_or("Backend Error"),
                format!("[{}] \"{}\": {}", request.method, request.url, status),
            );
            if !detail.is_empty() {
                err = err.with_original(anyhow::anyhow!(detail));
            }
            return Err(err.into());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read backend response")?;
        let payload: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(payload).context("Backend response is not valid JSON")
    }
}

//! Authenticated backend proxy routes.
//!
//! A [`BackendRoute`] describes one proxied endpoint: the backend path, the
//! method, and optional strategies for reading the inbound body, calling the
//! backend, and shaping the response. Every invocation runs the same
//! pipeline:
//!
//! 1. read the body (per method, unless a provider is supplied)
//! 2. look up session and token for the request
//! 3. reject with 401 on a refresh error or when neither is present
//! 4. call the backend with `Authorization: Bearer <api access token>`
//! 5. run the response handler on the backend result
//!
//! Errors that already carry a status pass through unchanged, everything
//! else becomes a 500 "Backend Communication Error".

use axum::{
    extract::{Request, State},
    routing::MethodRouter,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::body::{default_body_provider, BodyProvider};
use super::error::HandlerError;
use super::fetcher::{FetchRequest, Fetcher, ReqwestFetcher};
use super::method::HttpMethod;
use super::response::{DefaultHandler, ResponseHandler};
use crate::auth::session::Session;
use crate::AppState;

type DefaultFetcherFn<T> = fn(&reqwest::Client) -> Arc<dyn Fetcher<T>>;

enum FetchStrategy<T: Send + 'static> {
    Default(DefaultFetcherFn<T>),
    Custom(Arc<dyn Fetcher<T>>),
}

fn reqwest_fetcher<T>(client: &reqwest::Client) -> Arc<dyn Fetcher<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    Arc::new(ReqwestFetcher::new(client.clone()))
}

/// Strategies in effect for one invocation, after defaults are applied.
pub struct EffectiveStrategies<T: Send + 'static, D: Send + 'static> {
    pub body_provider: Arc<dyn BodyProvider>,
    pub handler: Arc<dyn ResponseHandler<T, D>>,
    pub fetcher: Arc<dyn Fetcher<T>>,
}

pub struct BackendRoute<T = Value, D = T>
where
    T: Send + 'static,
    D: Send + 'static,
{
    url: String,
    method: HttpMethod,
    body_provider: Option<Arc<dyn BodyProvider>>,
    handler: Arc<dyn ResponseHandler<T, D>>,
    fetcher: FetchStrategy<T>,
}

impl<T> BackendRoute<T, T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Route to `url` (relative to the configured API base) using GET and the
    /// default strategies.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            body_provider: None,
            handler: Arc::new(DefaultHandler),
            fetcher: FetchStrategy::Default(reqwest_fetcher::<T>),
        }
    }
}

impl<T> BackendRoute<T, T>
where
    T: Send + 'static,
{
    /// Route whose backend call is made by `fetcher` instead of HTTP.
    pub fn with_fetcher(url: impl Into<String>, fetcher: impl Fetcher<T> + 'static) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            body_provider: None,
            handler: Arc::new(DefaultHandler),
            fetcher: FetchStrategy::Custom(Arc::new(fetcher)),
        }
    }
}

impl<T, D> BackendRoute<T, D>
where
    T: Send + 'static,
    D: Send + 'static,
{
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn body_provider(mut self, provider: impl BodyProvider + 'static) -> Self {
        self.body_provider = Some(Arc::new(provider));
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher<T> + 'static) -> Self {
        self.fetcher = FetchStrategy::Custom(Arc::new(fetcher));
        self
    }

    pub fn handler<D2>(self, handler: impl ResponseHandler<T, D2> + 'static) -> BackendRoute<T, D2>
    where
        D2: Send + 'static,
    {
        BackendRoute {
            url: self.url,
            method: self.method,
            body_provider: self.body_provider,
            handler: Arc::new(handler),
            fetcher: self.fetcher,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn http_method(&self) -> HttpMethod {
        self.method
    }

    /// Apply defaults for every strategy the route did not override.
    pub fn resolve(&self, client: &reqwest::Client) -> EffectiveStrategies<T, D> {
        let body_provider = self
            .body_provider
            .clone()
            .unwrap_or_else(|| default_body_provider(Some(self.method)));
        let fetcher = match &self.fetcher {
            FetchStrategy::Default(make) => make(client),
            FetchStrategy::Custom(fetcher) => Arc::clone(fetcher),
        };
        EffectiveStrategies {
            body_provider,
            handler: Arc::clone(&self.handler),
            fetcher,
        }
    }

    /// Run the proxy pipeline for one inbound request.
    pub async fn handle(&self, state: &AppState, request: Request) -> Result<D, HandlerError> {
        self.run(state, request).await.map_err(|err| {
            let err = HandlerError::from_anyhow(err);
            err.log(&self.url);
            err
        })
    }

    async fn run(&self, state: &AppState, request: Request) -> anyhow::Result<D> {
        let strategies = self.resolve(&state.http_client);
        let api_url = state.config.api_url.as_str();

        let (parts, body) = request.into_parts();
        let body = strategies.body_provider.provide(&parts, body).await?;

        let session = state.sessions.get_server_session(&parts).await?;
        let token = state.sessions.get_token(&parts).await?;

        if session.as_ref().is_some_and(Session::has_refresh_error) {
            return Err(HandlerError::token_refresh_failed().into());
        }

        if session.is_none() && token.is_none() {
            return Err(HandlerError::unauthorized().into());
        }

        let credential = session
            .as_ref()
            .and_then(|s| s.api_access_token.as_deref());

        let fetch_request = FetchRequest {
            url: join_url(api_url, &self.url),
            method: self.method,
            body,
            headers: backend_headers(credential),
        };

        let response = strategies.fetcher.fetch(fetch_request).await?;
        strategies.handler.handle(response).await
    }
}

impl<T, D> BackendRoute<T, D>
where
    T: Send + 'static,
    D: Serialize + Send + 'static,
{
    /// Mount the route as an axum method router for its method.
    pub fn into_method_router(self) -> MethodRouter<Arc<AppState>> {
        let filter = self.method.method_filter();
        let route = Arc::new(self);
        axum::routing::on(
            filter,
            move |State(state): State<Arc<AppState>>, request: Request| {
                let route = Arc::clone(&route);
                async move { route.handle(&state, request).await.map(Json) }
            },
        )
    }
}

/// Join the API base URL and a route path with exactly one slash. A path
/// that is only a query or fragment is appended as is.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with(['?', '#']) {
        return format!("{}{}", base, path);
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Headers attached to every backend call. The bearer value is empty when no
/// API access token is available.
pub fn backend_headers(credential: Option<&str>) -> BTreeMap<String, String> {
    let authorization = credential
        .map(|token| format!("Bearer {}", token))
        .unwrap_or_default();

    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("Authorization".to_string(), authorization);
    headers
}

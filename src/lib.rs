//! Azure AD session layer and authenticated backend proxy
//!
//! Signs users in against Azure AD, keeps the session in a signed cookie and
//! forwards `/api/*` calls to the backend API with the user's API access
//! token attached.

#![deny(dead_code)]

pub mod auth;
pub mod backend;
pub mod config;
pub mod i18n;
pub mod routes;
pub mod web;

use anyhow::Context;
use auth::api_token::ApiTokenClient;
use auth::helpers::create_http_client;
use auth::jwt::SessionCodec;
use auth::session::session_accessor;
use auth::{AuthContext, SessionAccessor};
use config::Config;
use routes::RouteDescriptor;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionAccessor>,
    /// Shared client for token endpoint and backend calls
    pub http_client: reqwest::Client,
    pub routes: Arc<RouteDescriptor>,
    /// `None` in dummy mode or when auth is disabled
    pub auth: Option<AuthContext>,
}

impl AppState {
    /// Wire up clients and the session accessor for the configured mode.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http_client = create_http_client(
            config.http_connect_timeout_secs,
            config.http_request_timeout_secs,
        )
        .context("Failed to build HTTP client")?;

        let routes = routes::load_routes(config.routes.as_ref())?;

        let auth = config.uses_azure_ad().then(|| AuthContext {
            codec: Arc::new(SessionCodec::new(
                &config.auth_secret,
                config.session_max_age_secs,
            )),
            api_tokens: Arc::new(ApiTokenClient::new(&config, http_client.clone())),
        });

        Ok(Self {
            config: Arc::new(config),
            sessions: session_accessor(auth.as_ref()),
            http_client,
            routes: Arc::new(routes),
            auth,
        })
    }
}

use super::handlers::{healthz_handler, readyz_handler, signin_page_handler};
use crate::{
    auth::{callback_handler, dummy_auth_handler, session_handler, signin_handler, signout_handler},
    AppState,
};
use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler));

    if state.config.auth_enabled {
        router = router.route("/auth/signin", get(signin_page_handler));

        router = if state.auth.is_some() {
            router
                .route("/api/auth/signin", get(signin_handler))
                .route("/api/auth/signin/azure-ad", get(signin_handler))
                .route("/api/auth/callback/azure-ad", get(callback_handler))
                .route("/api/auth/session", get(session_handler))
                // POST for form submission, GET for plain links
                .route("/api/auth/signout", get(signout_handler).post(signout_handler))
        } else {
            router
                .route("/api/auth", any(dummy_auth_handler))
                .route("/api/auth/{*rest}", any(dummy_auth_handler))
        };
    }

    state
        .routes
        .mount(router)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

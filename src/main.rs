use anyhow::Result;
use auth_bridge::{config::Config, web, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting auth bridge");

    // Load configuration from environment
    let config = Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        auth_enabled = config.auth_enabled,
        use_dummy = config.use_dummy,
        api_url = %config.api_url,
        "Configuration loaded"
    );

    if config.auth_enabled && config.use_dummy {
        tracing::warn!("Dummy auth mode: nobody can sign in and every proxied call is rejected");
    }

    // Route descriptor is loaded and validated here (logs summary internally)
    let bind_address = config.bind_address();
    let state = Arc::new(AppState::from_config(config)?);

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Auth bridge listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Rules Hub - Main Application Entry Point
//!
//! Backend of the visual rule editor: rule files, rule statuses and the
//! device catalog over HTTP.

use rules_hub_api::{ApiConfig, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rules_hub=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    tracing::info!("Starting Rules Hub server on {}", config.bind_address());

    let app_state = Arc::new(AppState::from_config(&config).await?);
    let app = rules_hub_api::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

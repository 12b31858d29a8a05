use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use assignbot_server::config::Config;
use assignbot_server::github::GitHubClient;
use assignbot_server::webhook::webhook_router;
use assignbot_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "assignbot"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting auto-assign bot");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let github_client = GitHubClient::new(config.github_app_id, config.github_private_key);

    let app_state = Arc::new(AppState {
        github_client,
        webhook_secret: config.github_webhook_secret,
        policy_path: config.policy_path,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

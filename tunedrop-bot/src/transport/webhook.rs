//! Webhook update delivery
//!
//! Receives Bot API updates as HTTP posts on a local listener and fans them
//! out to the shared per-update handling path. Also serves a health probe.

use crate::config::WebhookConfig;
use crate::orchestrator::Orchestrator;
use crate::transport::spawn_update_handling;
use crate::transport::telegram::{TelegramApi, Update};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tunedrop_common::Result;

#[derive(Clone)]
struct WebhookState {
    api: Arc<TelegramApi>,
    orchestrator: Arc<Orchestrator>,
}

pub fn build_router(api: Arc<TelegramApi>, orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/webhook", post(receive_update))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(WebhookState { api, orchestrator })
}

pub async fn run(
    api: Arc<TelegramApi>,
    orchestrator: Arc<Orchestrator>,
    config: &WebhookConfig,
) -> Result<()> {
    if let Some(public_url) = &config.public_url {
        api.set_webhook(public_url)
            .await
            .map_err(tunedrop_common::Error::from)?;
    }

    let app = build_router(api, orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "Webhook transport listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn receive_update(
    State(state): State<WebhookState>,
    Json(update): Json<Update>,
) -> StatusCode {
    spawn_update_handling(update, Arc::clone(&state.api), Arc::clone(&state.orchestrator));
    StatusCode::OK
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "tunedrop-bot",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

//! Main HTTP gateway server and routing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use sonicdesk_config::{ModelConfig, SonicDeskConfig};
use sonicdesk_core::event::InferenceParams;
use sonicdesk_core::ToolRegistry;
use sonicdesk_model::{ModelConnector, ModelSettings, DEFAULT_SYSTEM_PROMPT};
use sonicdesk_storage::SharedSink;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::health_api;
use crate::orchestrator::{OrchestratorDeps, OrchestratorSettings};
use crate::session_registry::SessionRegistry;
use crate::ws_server;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub deps: OrchestratorDeps,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            started_at: Instant::now(),
        }
    }

    /// Wire the state from a loaded config and the process-wide collaborators.
    pub fn from_config(
        config: &SonicDeskConfig,
        tools: Arc<ToolRegistry>,
        connector: Arc<dyn ModelConnector>,
        sink: SharedSink,
    ) -> Self {
        Self::new(OrchestratorDeps {
            tools,
            connector,
            sink,
            sessions: SessionRegistry::new(),
            model_settings: model_settings_from_config(&config.model),
            settings: OrchestratorSettings::from_config(&config.session, &config.audio),
        })
    }
}

pub fn model_settings_from_config(model: &ModelConfig) -> ModelSettings {
    ModelSettings {
        endpoint: model.endpoint.clone(),
        api_key: model.api_key.clone(),
        model_id: model.model_id.clone(),
        voice_id: model.voice_id.clone(),
        inference: InferenceParams {
            max_tokens: model.max_tokens,
            top_p: model.top_p,
            temperature: model.temperature,
        },
        system_prompt: model
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        receive_poll: Duration::from_millis(model.receive_poll_ms),
    }
}

pub fn build_router(state: GatewayState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_server::ws_handler))
        .route("/api/health", get(health_api::get_health))
        .route("/api/tools", get(health_api::list_tools))
        .route("/api/roles", get(health_api::role_table))
        .route("/api/apps/echo", post(health_api::echo))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Starts the Axum server and runs until Ctrl-C.
#[instrument(skip_all)]
pub async fn start_server(config: &SonicDeskConfig, state: GatewayState) -> Result<()> {
    let addr = config.server.addr();
    let app = build_router(state, config.server.cors_permissive);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

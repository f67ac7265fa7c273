//! Gateway REST endpoints: health, tool catalog, role table and the echo app.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sonicdesk_core::{ClassificationStats, RoleClassifier, ToolSpec};

use crate::server::GatewayState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub session_ids: Vec<String>,
    pub tools: usize,
    pub storage: String,
    pub timestamp: DateTime<Utc>,
}

/// Handler for `GET /api/health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy".into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_sessions: state.deps.sessions.active_count().await,
        session_ids: state.deps.sessions.active_ids().await,
        tools: state.deps.tools.len(),
        storage: state.deps.sink.name().to_string(),
        timestamp: Utc::now(),
    })
}

/// Handler for `GET /api/tools`
pub async fn list_tools(State(state): State<GatewayState>) -> Json<Vec<ToolSpec>> {
    Json(state.deps.tools.describe_all())
}

/// Handler for `GET /api/roles`: the role classification table.
pub async fn role_table() -> Json<ClassificationStats> {
    Json(RoleClassifier::new().stats())
}

#[derive(Debug, Deserialize)]
pub struct EchoRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EchoResponse {
    pub echoed: String,
}

/// Handler for `POST /api/apps/echo`: the text back with a random 5-char salt.
pub async fn echo(Json(req): Json<EchoRequest>) -> Json<EchoResponse> {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    Json(EchoResponse {
        echoed: format!("{} [{salt}]", req.text),
    })
}

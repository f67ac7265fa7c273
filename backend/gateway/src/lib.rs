//! SonicDesk gateway
//!
//! Serves the `/ws` voice/text endpoint and the small REST surface, and runs
//! one [`SessionOrchestrator`] per connected client.

pub mod debug_audio;
pub mod health_api;
pub mod orchestrator;
pub mod rate_limit;
pub mod server;
pub mod session_registry;
pub mod ws_protocol;
pub mod ws_server;

pub use orchestrator::{OrchestratorDeps, OrchestratorSettings, SessionOrchestrator};
pub use server::{build_router, model_settings_from_config, start_server, GatewayState};
pub use session_registry::SessionRegistry;

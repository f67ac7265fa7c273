//! `sonicdesk serve`: load config, wire the gateway and run it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sonicdesk_config::{default_config_path, load_and_prepare, redact, validate};
use sonicdesk_gateway::{start_server, GatewayState};
use sonicdesk_logging::init_logger;
use sonicdesk_model::WsConnector;
use sonicdesk_storage::open_sink;
use sonicdesk_tools::default_registry;
use tracing::{info, warn};

pub async fn run(port: Option<u16>, config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);
    let mut config = load_and_prepare(&path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_logger(&config.logging.dir, &config.logging.level)?;

    // The load-time report ran before the subscriber existed.
    for warning in validate(&config).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    info!(
        path = %path.display(),
        config = %redact(&serde_json::to_value(&config)?),
        "Loaded configuration"
    );

    let tools = Arc::new(default_registry());
    let sink = open_sink(
        config.storage.enabled,
        &config.storage.backend,
        Path::new(&config.storage.path),
        &config.storage.prefix,
    )
    .context("Failed to open conversation storage")?;

    info!(
        addr = %config.server.addr(),
        model = %config.model.endpoint,
        storage = sink.name(),
        tools = tools.len(),
        "Starting SonicDesk gateway"
    );

    let state = GatewayState::from_config(&config, tools, Arc::new(WsConnector), sink);
    start_server(&config, state).await
}

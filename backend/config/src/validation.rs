//! Config validation: field-level checks with user-friendly messages.

use crate::schema::SonicDeskConfig;
use thiserror::Error;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &SonicDeskConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_model(config, &mut report);
    validate_session(config, &mut report);
    validate_storage(config, &mut report);
    report
}

fn validate_server(config: &SonicDeskConfig, report: &mut ValidationReport) {
    let port = config.server.port;
    if port == 0 {
        report.error("server.port", "port must be > 0");
    } else if port < 1024 && port != 80 && port != 443 {
        report.warn(
            "server.port",
            format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
        );
    }
}

fn validate_model(config: &SonicDeskConfig, report: &mut ValidationReport) {
    let model = &config.model;
    if model.endpoint.trim().is_empty() {
        report.error("model.endpoint", "Model endpoint is required");
    }
    if !(0.0..=1.0).contains(&model.temperature) {
        report.warn(
            "model.temperature",
            format!("temperature {} is outside [0, 1]", model.temperature),
        );
    }
}

fn validate_session(config: &SonicDeskConfig, report: &mut ValidationReport) {
    if config.session.max_history == 0 {
        report.error("session.maxHistory", "maxHistory must be >= 1");
    }
    if config.session.output_chunk_bytes == 0 {
        report.error("session.outputChunkBytes", "outputChunkBytes must be >= 1");
    }
}

fn validate_storage(config: &SonicDeskConfig, report: &mut ValidationReport) {
    let storage = &config.storage;
    if !storage.enabled {
        return;
    }
    match storage.backend.as_str() {
        "file" | "none" => {}
        "sqlite" => {
            if storage.path.trim().is_empty() {
                report.warn("storage.path", "sqlite backend has no database path");
            }
        }
        other => report.error(
            "storage.backend",
            format!("Unknown storage backend '{other}'. Use 'file', 'sqlite', or 'none'"),
        ),
    }
}

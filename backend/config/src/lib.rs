//! `sonicdesk-config` is the runtime configuration for the SonicDesk gateway.
//!
//! Provides:
//! - Typed config schema (server, model, session, audio, storage, logging)
//! - YAML loading from `$SONICDESK_CONFIG` or `<config_dir>/config.yaml`
//! - `${ENV_VAR}` substitution and fixed environment overrides
//! - Default value normalisation
//! - Validation with errors and warnings
//! - Config redaction for safe logging

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides, apply_env_overrides_with, collect_referenced_vars, resolve_env_vars,
    resolve_env_vars_with, MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, default_config_path, load_raw_config, parse_raw};
pub use redact::redact;
pub use schema::{
    AudioConfig, LoggingConfig, ModelConfig, ServerConfig, SessionConfig, SonicDeskConfig,
    StorageConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Load, substitute env vars, apply defaults and overrides, then validate.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<SonicDeskConfig> {
    let raw = load_raw_config(path).await?;
    prepare(raw, &std::env::vars().collect())
}

/// The load pipeline after reading, against an explicit environment.
///
/// Validation warnings are logged; validation errors are logged and fail
/// the load.
pub fn prepare(raw: Value, env: &HashMap<String, String>) -> Result<SonicDeskConfig> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;

    let config: SonicDeskConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);
    let config = apply_env_overrides_with(config, env);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.into_iter().next() {
        bail!(first);
    }

    Ok(config)
}

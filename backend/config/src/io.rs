//! Config file location and reading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Explicit config file path.
pub const ENV_CONFIG_FILE: &str = "SONICDESK_CONFIG";
/// Config directory override.
pub const ENV_CONFIG_DIR: &str = "SONICDESK_CONFIG_DIR";

/// Resolve the SonicDesk config directory.
/// Priority: `SONICDESK_CONFIG_DIR` env > `~/.sonicdesk/` > `./.sonicdesk`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".sonicdesk"),
        None => PathBuf::from(".sonicdesk"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// The config file to load: `SONICDESK_CONFIG` if set, else `<config_dir>/config.yaml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var(ENV_CONFIG_FILE) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => config_file_path(&config_dir()),
    }
}

/// Parse YAML text into a JSON value tree. An empty document is an empty map.
pub fn parse_raw(raw: &str) -> Result<Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("Failed to parse config YAML")?;
    if yaml.is_null() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::to_value(yaml).context("Config YAML must use string keys")
}

/// Read the config file as an untyped tree, before env substitution.
///
/// Returns an empty map if the file doesn't exist (first run).
pub async fn load_raw_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let value = parse_raw(&raw).with_context(|| format!("Invalid config at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_empty_map() {
        assert_eq!(parse_raw("").unwrap(), serde_json::json!({}));
        assert_eq!(parse_raw("# only a comment\n").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn yaml_becomes_json_tree() {
        let value = parse_raw("server:\n  port: 9000\nmodel:\n  topP: 0.5\n").unwrap();
        assert_eq!(value["server"]["port"], 9000);
        assert_eq!(value["model"]["topP"], 0.5);
    }

    #[test]
    fn malformed_yaml_errors() {
        assert!(parse_raw("server: [unclosed").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let value = load_raw_config(&dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn config_file_lives_in_dir() {
        let path = config_file_path(Path::new("/etc/sonicdesk"));
        assert_eq!(path, PathBuf::from("/etc/sonicdesk/config.yaml"));
    }
}

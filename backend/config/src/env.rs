//! Environment handling for config values.
//!
//! Two passes run at load time:
//! - `${VAR_NAME}` substitution inside string values of the raw YAML tree.
//!   Only uppercase `[A-Z_][A-Z0-9_]*` names are matched and `$${VAR}`
//!   escapes to a literal `${VAR}`.
//! - Fixed overrides (`SONICDESK_PORT`, `SAVE_DEBUG_AUDIO`, ...) applied to
//!   the typed config after defaults.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::schema::SonicDeskConfig;

pub const ENV_PORT: &str = "SONICDESK_PORT";
pub const ENV_BIND: &str = "SONICDESK_BIND";
pub const ENV_MODEL_ENDPOINT: &str = "SONICDESK_MODEL_ENDPOINT";
pub const ENV_SAVE_DEBUG_AUDIO: &str = "SAVE_DEBUG_AUDIO";
pub const ENV_STORAGE_ENABLED: &str = "CONVERSATION_STORAGE_ENABLED";

/// Matches `${VAR}` and its escaped form `$${VAR}`.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var regex"));

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Substitute env vars using a provided map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let whole = &caps[0];
        let var_name = &caps[1];
        if whole.starts_with("$$") {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Env var names referenced anywhere in a raw config tree, sorted.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = Vec::new();
    collect_vars_recursive(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_vars_recursive(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in ENV_VAR_PATTERN.captures_iter(s) {
                if !caps[0].starts_with("$$") {
                    out.push(caps[1].to_string());
                }
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_vars_recursive(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_vars_recursive(v, out)),
        _ => {}
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply the fixed environment overrides from the process environment.
pub fn apply_env_overrides(config: SonicDeskConfig) -> SonicDeskConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply the fixed environment overrides from a provided map.
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_overrides_with(
    mut config: SonicDeskConfig,
    env: &HashMap<String, String>,
) -> SonicDeskConfig {
    let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(raw) = get(ENV_PORT) {
        match raw.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(var = ENV_PORT, value = raw, "Ignoring invalid port override"),
        }
    }
    if let Some(bind) = get(ENV_BIND) {
        config.server.bind = bind.to_string();
    }
    if let Some(endpoint) = get(ENV_MODEL_ENDPOINT) {
        config.model.endpoint = endpoint.to_string();
    }
    for (var, target) in [
        (ENV_SAVE_DEBUG_AUDIO, &mut config.audio.save_debug_audio),
        (ENV_STORAGE_ENABLED, &mut config.storage.enabled),
    ] {
        if let Some(raw) = get(var) {
            match parse_flag(raw) {
                Some(flag) => *target = flag,
                None => warn!(var, value = raw, "Ignoring invalid boolean override"),
            }
        }
    }

    debug!("Applied environment overrides");
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"model": {"apiKey": "${RELAY_KEY}", "endpoint": "wss://${HOST}/model"}});
        let env = env(&[("RELAY_KEY", "k-123"), ("HOST", "relay.local")]);
        let result = resolve_env_vars_with(&v, &env).unwrap();
        assert_eq!(result["model"]["apiKey"], "k-123");
        assert_eq!(result["model"]["endpoint"], "wss://relay.local/model");
    }

    #[test]
    fn error_on_missing_var_names_path() {
        let v = json!({"model": {"apiKey": "${MISSING_VAR}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err().to_string();
        assert!(err.contains("MISSING_VAR"));
        assert!(err.contains("model.apiKey"));
    }

    #[test]
    fn escaped_reference_stays_literal() {
        let v = json!({"systemPrompt": "say $${NAME} to ${WHO}"});
        let result = resolve_env_vars_with(&v, &env(&[("WHO", "guests")])).unwrap();
        assert_eq!(result["systemPrompt"], "say ${NAME} to guests");
        assert_eq!(collect_referenced_vars(&v), vec!["WHO".to_string()]);
    }

    #[test]
    fn lowercase_names_are_not_substituted() {
        let v = json!({"k": "${lower}", "n": 3});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result["k"], "${lower}");
        assert_eq!(result["n"], 3);
    }

    #[test]
    fn overrides_apply() {
        let cfg = apply_env_overrides_with(
            SonicDeskConfig::default(),
            &env(&[
                (ENV_PORT, "9100"),
                (ENV_BIND, "127.0.0.1"),
                (ENV_MODEL_ENDPOINT, "wss://relay/model"),
                (ENV_SAVE_DEBUG_AUDIO, "true"),
                (ENV_STORAGE_ENABLED, "0"),
            ]),
        );
        assert_eq!(cfg.server.addr(), "127.0.0.1:9100");
        assert_eq!(cfg.model.endpoint, "wss://relay/model");
        assert!(cfg.audio.save_debug_audio);
        assert!(!cfg.storage.enabled);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let cfg = apply_env_overrides_with(
            SonicDeskConfig::default(),
            &env(&[(ENV_PORT, "not-a-port"), (ENV_SAVE_DEBUG_AUDIO, "maybe")]),
        );
        assert_eq!(cfg.server.port, 8000);
        assert!(!cfg.audio.save_debug_audio);
    }
}

//! Safe-to-log config snapshots with secrets masked.

use serde_json::Value;

/// Keys whose string values are masked.
static SENSITIVE_KEYS: &[&str] = &["apiKey", "api_key", "token", "secret", "password"];

/// Redact a config JSON value, replacing sensitive strings with a short hint.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if is_sensitive_key(key) && !s.is_empty() => {
            let hint: String = s.chars().take(4).collect();
            if s.chars().count() > 4 {
                Value::String(format!("{hint}***"))
            } else {
                Value::String("***".to_string())
            }
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_model_api_key() {
        let v = json!({"model": {"apiKey": "relay-abcdef123456", "voiceId": "matthew"}});
        let redacted = redact(&v);
        assert_eq!(redacted["model"]["apiKey"], "rela***");
        assert_eq!(redacted["model"]["voiceId"], "matthew");
    }

    #[test]
    fn short_secrets_are_fully_masked() {
        let redacted = redact(&json!({"token": "abc"}));
        assert_eq!(redacted["token"], "***");
    }
}

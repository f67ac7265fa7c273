//! CLI Status Command
//!
//! Reports uptime, active sessions and storage of a running gateway.

use anyhow::Result;
use serde_json::Value;

use crate::terminal_output::{note_error, note_success};

pub async fn run(base_url: &str) -> Result<()> {
    let url = format!("{}/api/health", base_url.trim_end_matches('/'));
    let resp = match reqwest::Client::new().get(&url).send().await {
        Ok(resp) => resp,
        Err(_) => {
            note_error(&format!("SonicDesk is not running at {base_url}"));
            return Ok(());
        }
    };

    let body: Value = resp.json().await?;
    note_success(&summary(&body));
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn summary(health: &Value) -> String {
    format!(
        "SonicDesk {}: {} active session(s), up {}s, storage {}",
        health["status"].as_str().unwrap_or("unknown"),
        health["activeSessions"].as_u64().unwrap_or(0),
        health["uptimeSeconds"].as_u64().unwrap_or(0),
        health["storage"].as_str().unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarises_health() {
        let health = json!({"status": "healthy", "activeSessions": 2, "uptimeSeconds": 40, "storage": "file"});
        assert_eq!(
            summary(&health),
            "SonicDesk healthy: 2 active session(s), up 40s, storage file"
        );
        assert!(summary(&json!({})).starts_with("SonicDesk unknown"));
    }
}

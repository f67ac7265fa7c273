//! Log Redaction
//!
//! Scrubs phone numbers, API keys and bearer tokens from free text before
//! it reaches the conversation event log.

use regex::Regex;
use std::sync::LazyLock;

static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").expect("phone regex")
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").expect("token regex")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = TELEPHONE_RE.replace_all(input, "[REDACTED_PHONE]");
    TOKEN_RE.replace_all(&redacted, "[REDACTED_TOKEN]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_phone_and_bearer() {
        let raw = "Call me at (555) 123-4567, auth Bearer eyJhbGciOiJIUzI1NiJ9.abc";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("123-4567"));
        assert!(!clean.contains("eyJhbGci"));
        assert!(clean.contains("[REDACTED_PHONE]"));
        assert!(clean.contains("[REDACTED_TOKEN]"));
    }

    #[test]
    fn order_ids_survive() {
        assert_eq!(redact_sensitive_data("order 12345 shipped"), "order 12345 shipped");
    }
}

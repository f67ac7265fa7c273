//! Telemetry and structured logging for SonicDesk.
//!
//! Handles subscriber setup with daily NDJSON files, log redaction, and
//! per-session conversation event records.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{ConversationEvent, EventLogEntry, EventLogger, EVENT_TARGET};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;

//! Built-in tool set for SonicDesk sessions.

pub mod datetime;
pub mod media;
pub mod order;

use std::sync::Arc;

use sonicdesk_core::ToolRegistry;

pub use datetime::DateAndTimeTool;
pub use media::{SampleImageTool, SamplePdfTool, SampleVideoTool};
pub use order::TrackOrderTool;

/// Registry holding every built-in tool, in advertisement order.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DateAndTimeTool));
    registry.register(Arc::new(TrackOrderTool));
    registry.register(Arc::new(SampleImageTool));
    registry.register(Arc::new(SamplePdfTool));
    registry.register(Arc::new(SampleVideoTool));
    tracing::info!(tools = ?registry.list(), "Tool registry initialised");
    registry
}

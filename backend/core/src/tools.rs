use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::CoreError;
use crate::traits::{Tool, ToolOutput, ToolSpec};

/// Name-keyed tool catalog, built once at startup and read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    // Registration order, so catalogs are advertised deterministically.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Insert a tool. A later registration under the same name overwrites.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool re-registered; previous definition replaced");
        } else {
            self.order.push(name);
        }
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool.
    ///
    /// Returns `ToolNotFound` for unknown names. Failures inside the tool body,
    /// including panics, come back as an `{"error": ...}` model result.
    pub async fn execute(&self, name: &str, content: Value) -> Result<ToolOutput, CoreError> {
        let tool = self
            .get(name)
            .ok_or_else(|| CoreError::ToolNotFound(name.to_string()))?;

        info!(tool = name, "Executing tool");
        match AssertUnwindSafe(tool.execute(content)).catch_unwind().await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                error!(tool = name, error = %e, "Tool execution failed");
                Ok(ToolOutput::error(e.to_string()))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                error!(tool = name, %message, "Tool panicked");
                Ok(ToolOutput::error(message))
            }
        }
    }

    /// Descriptors for every registered tool, in registration order.
    pub fn describe_all(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec::of(tool.as_ref()))
            .collect()
    }

    /// The catalog in the model's `toolSpec` wire form.
    pub fn model_tool_configs(&self) -> Vec<Value> {
        self.describe_all()
            .iter()
            .map(ToolSpec::to_model_config)
            .collect()
    }

    pub fn short_description(&self, name: &str) -> Option<String> {
        self.tools
            .get(name)
            .map(|tool| tool.short_description().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            self.0
        }
        fn short_description(&self) -> &str {
            "Echoing"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, content: Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::new(content.clone(), json!({"type": "text", "content": content})))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn short_description(&self) -> &str {
            "Failing"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _content: Value) -> anyhow::Result<ToolOutput> {
            anyhow::bail!("database unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Tool for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn description(&self) -> &str {
            "panics"
        }
        fn short_description(&self) -> &str {
            "Panicking"
        }
        fn input_schema(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _content: Value) -> anyhow::Result<ToolOutput> {
            panic!("index out of range")
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("first")));
        let out = registry.execute("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(out.model_result, json!({"a": 1}));
        assert!(out.ui_result.is_some());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn tool_errors_and_panics_become_error_results() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Panicking));

        let failed = registry.execute("failing", json!({})).await.unwrap();
        assert_eq!(failed.error_message().as_deref(), Some("database unavailable"));

        let panicked = registry.execute("panicking", json!({})).await.unwrap();
        assert_eq!(panicked.error_message().as_deref(), Some("index out of range"));
    }

    #[test]
    fn later_registration_overwrites() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("first")));
        registry.register(Arc::new(Echo("second")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list(), vec!["echo".to_string()]);
        assert_eq!(registry.describe_all()[0].description, "second");
    }

    #[test]
    fn catalog_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Echo("e")));
        let names: Vec<_> = registry.describe_all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["failing", "echo"]);
        assert_eq!(registry.model_tool_configs().len(), 2);
        assert_eq!(registry.short_description("echo").as_deref(), Some("Echoing"));
    }
}

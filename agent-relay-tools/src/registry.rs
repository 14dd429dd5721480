//! Tools offered to the model during one run

use super::base::Tool;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tools keyed by name; iteration order is the name order
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Function schemas for the provider request
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(|tool| tool.to_schema()).collect()
    }

    /// Run the named tool. The outcome is always text for the model,
    /// including unknown names and bad arguments.
    pub async fn execute(&self, name: &str, params: Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: Tool '{}' not found", name);
        };

        let errors = tool.validate_params(&params);
        if !errors.is_empty() {
            return format!("Error: Invalid parameters for tool '{}': {}", name, errors.join("; "));
        }

        tool.execute(params)
            .await
            .unwrap_or_else(|e| format!("Error executing {}: {}", name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Result, ToolError};
    use async_trait::async_trait;

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn description(&self) -> &str {
            "A mock tool"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "input": { "type": "string" } },
                "required": ["input"]
            })
        }

        async fn execute(&self, args: Value) -> Result<String> {
            match args["input"].as_str() {
                Some("fail") => Err(ToolError::ExecutionFailed("boom".to_string())),
                Some(input) => Ok(format!("mock result: {}", input)),
                None => Err(ToolError::InvalidParams("input must be a string".to_string())),
            }
        }
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool));
        registry.register(Arc::new(MockTool));
        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0]["function"]["name"], "mock");
    }

    #[tokio::test]
    async fn test_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool));
        let result = registry
            .execute("mock", serde_json::json!({ "input": "x" }))
            .await;
        assert_eq!(result, "mock result: x");
    }

    #[tokio::test]
    async fn test_execute_reports_errors_as_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool));

        let missing = registry.execute("nope", serde_json::json!({})).await;
        assert!(missing.starts_with("Error: Tool 'nope' not found"));

        let invalid = registry.execute("mock", serde_json::json!({})).await;
        assert!(invalid.contains("Missing required field: input"));

        let failed = registry
            .execute("mock", serde_json::json!({ "input": "fail" }))
            .await;
        assert!(failed.starts_with("Error executing mock"));
    }
}

//! Base trait for tools

use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the tool parameters schema (JSON Schema format)
    fn parameters(&self) -> Value;

    /// Execute the tool with arguments
    async fn execute(&self, args: Value) -> Result<String>;

    /// Check required fields of the schema against `params`
    fn validate_params(&self, params: &Value) -> Vec<String> {
        let Some(params_obj) = params.as_object() else {
            return vec!["Parameters must be an object".to_string()];
        };

        let schema = self.parameters();
        schema
            .get("required")
            .and_then(|r| r.as_array())
            .into_iter()
            .flatten()
            .filter_map(|field| field.as_str())
            .filter(|field| !params_obj.contains_key(*field))
            .map(|field| format!("Missing required field: {}", field))
            .collect()
    }

    /// Convert tool to OpenAI function schema format
    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

/// Tool errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool error: {0}")]
    Error(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

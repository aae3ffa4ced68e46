//! Tool trait, registry, and the request/observation pair

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use klaro_ai::Message;

/// Prefix of every observation produced from a failed tool call
pub const ERROR_MARKER: &str = "Error:";

/// Why a tool call produced no result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// The model asked for a tool that is not registered
    #[error("Tool '{name}' not found. Available tools: {}", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    /// Arguments did not match the tool's parameter schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and reported a failure
    #[error("{0}")]
    Failed(String),

    #[error("Tool timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Tool execution cancelled")]
    Cancelled,
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, ToolError>;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to a klaro_ai::Tool for API calls
pub fn to_api_tool(tool: &dyn Tool) -> klaro_ai::Tool {
    klaro_ai::Tool::new(tool.name(), tool.description(), tool.parameters_schema())
}

/// One tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Correlation id echoed by the observation
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Requests carried by an assistant message, in the order the model issued them.
    pub fn from_message(message: &Message) -> Vec<Self> {
        message
            .tool_calls()
            .into_iter()
            .map(|(id, name, args)| Self::new(id, name, args.clone()))
            .collect()
    }
}

/// The answer to one [`ToolRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct ToolObservation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolObservation {
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Render a failure as observation text the model can read and replan from.
    pub fn failure(request: &ToolRequest, error: &ToolError) -> Self {
        Self {
            tool_call_id: request.id.clone(),
            tool_name: request.name.clone(),
            content: format!("{} {}", ERROR_MARKER, error),
            is_error: true,
        }
    }

    pub fn from_result(request: &ToolRequest, result: Result<String, ToolError>) -> Self {
        match result {
            Ok(content) => Self::success(&request.id, &request.name, content),
            Err(e) => Self::failure(request, &e),
        }
    }

    pub fn into_message(self) -> Message {
        Message::tool_result(self.tool_call_id, self.tool_name, self.content, self.is_error)
    }
}

/// Name-keyed tool table with a compiled argument validator per tool.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    by_name: HashMap<String, usize>,
    validators: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: BoxedTool) {
        let name = tool.name().to_string();
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.validators.insert(name.clone(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    name,
                    e
                );
                self.validators.remove(&name);
            }
        }

        match self.by_name.get(&name) {
            Some(&idx) => self.tools[idx] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn with_tool(mut self, tool: BoxedTool) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions sent to the model
    pub fn api_tools(&self) -> Vec<klaro_ai::Tool> {
        self.tools.iter().map(|t| to_api_tool(t.as_ref())).collect()
    }

    /// Check arguments against the tool's schema.
    pub fn validate(&self, name: &str, arguments: &serde_json::Value) -> Result<(), ToolError> {
        match self.validators.get(name) {
            Some(validator) => validate_with_validator(arguments, validator),
            None => Ok(()),
        }
    }

    /// Resolve a request to its tool, or a `NotFound` error listing what exists.
    pub fn resolve(&self, name: &str) -> Result<BoxedTool, ToolError> {
        self.get(name).cloned().ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
            available: self.names(),
        })
    }
}

fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Result<(), ToolError> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, ToolError> {
            arguments
                .get("text")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ToolError::Failed("no text".into()))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(Arc::new(EchoTool))
    }

    #[test]
    fn test_resolve_unknown_lists_available() {
        let err = registry().resolve("nope").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Tool 'nope' not found. Available tools: echo"
        );
    }

    #[test]
    fn test_validate_missing_required() {
        let err = registry()
            .validate("echo", &serde_json::json!({}))
            .unwrap_err();
        match err {
            ToolError::InvalidArguments(msg) => assert!(msg.contains("text"), "got: {}", msg),
            other => panic!("expected InvalidArguments, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_wrong_type() {
        assert!(
            registry()
                .validate("echo", &serde_json::json!({"text": 5}))
                .is_err()
        );
        assert!(
            registry()
                .validate("echo", &serde_json::json!({"text": "hi"}))
                .is_ok()
        );
    }

    #[test]
    fn test_register_same_name_replaces() {
        let mut reg = registry();
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.api_tools()[0].name, "echo");
    }

    #[test]
    fn test_failure_observation_carries_marker() {
        let request = ToolRequest::new("c1", "echo", serde_json::json!({}));
        let obs = ToolObservation::failure(&request, &ToolError::Timeout(Duration::from_secs(30)));
        assert!(obs.is_error);
        assert_eq!(obs.content, "Error: Tool timed out after 30s");
        match obs.into_message() {
            Message::ToolResult {
                tool_call_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_call_id, "c1");
                assert!(is_error);
            }
            other => panic!("expected ToolResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_executes() {
        let out = EchoTool
            .execute(serde_json::json!({"text": "hello"}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }
}

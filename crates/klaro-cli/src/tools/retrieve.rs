//! Style-guide retrieval from the session knowledge base

use async_trait::async_trait;
use klaro_agent::{Tool, ToolError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::knowledge::KnowledgeBase;

pub struct RetrieveTool {
    knowledge: KnowledgeBase,
}

impl RetrieveTool {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve"
    }

    fn description(&self) -> &str {
        "Retrieve README style guidelines and conventions from the knowledge base. \
         Must be called before writing the final README."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to retrieve, e.g. 'README style guidelines'"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        self.knowledge
            .retrieve(super::str_arg(&arguments, "query"))
            .map_err(ToolError::Failed)
    }
}

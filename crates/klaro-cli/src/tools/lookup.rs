//! Simulated external lookup

use async_trait::async_trait;
use klaro_agent::{Tool, ToolError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Canned answers keyed by a lowercase term the query must mention.
const ANSWERS: &[(&str, &str)] = &[
    ("fastapi", "FastAPI is a modern, high-performance Python web framework for building APIs based on standard type hints."),
    ("uvicorn", "Uvicorn is an ASGI server."),
    ("flask", "Flask is a lightweight WSGI web application framework for Python."),
    ("django", "Django is a batteries-included Python web framework."),
    ("pydantic", "Pydantic is a data validation library for Python driven by type hints."),
    ("pytest", "pytest is a Python testing framework; run the suite with `pytest`."),
    ("langchain", "LangChain is a framework for building applications with large language models."),
    ("tokio", "Tokio is an asynchronous runtime for the Rust programming language."),
    ("serde", "Serde is a framework for serializing and deserializing Rust data structures."),
];

/// Answers general questions about libraries and frameworks.
pub struct LookupTool;

impl LookupTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LookupTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Look up general information about a library, framework or concept used by the project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up, e.g. 'What is FastAPI?'"
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
        Ok(lookup(super::str_arg(&arguments, "query")))
    }
}

pub fn lookup(query: &str) -> String {
    let lowered = query.to_lowercase();
    match ANSWERS.iter().find(|(term, _)| lowered.contains(term)) {
        Some((_, answer)) => format!("Search Result: {}", answer),
        None => format!(
            "Search result found for '{}': (Example Answer: The requested information is here.)",
            query
        ),
    }
}

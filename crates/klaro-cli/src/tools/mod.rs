//! Tools the agent can call while documenting a project

mod analyze;
mod explore;
mod lookup;
mod read;
mod retrieve;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use klaro_agent::ToolRegistry;

use crate::knowledge::KnowledgeBase;

pub use analyze::AnalyzeTool;
pub use explore::ExploreTool;
pub use lookup::LookupTool;
pub use read::ReadTool;
pub use retrieve::RetrieveTool;

/// Registry with every tool, rooted at the project being documented.
pub fn registry(root: &Path, knowledge: KnowledgeBase) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(ExploreTool::new(root)))
        .with_tool(Arc::new(ReadTool::new(root)))
        .with_tool(Arc::new(AnalyzeTool::new()))
        .with_tool(Arc::new(LookupTool::new()))
        .with_tool(Arc::new(RetrieveTool::new(knowledge)))
}

/// Relative paths are taken from the project root; absolute ones pass through.
pub(crate) fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Required string argument; schema validation has already run.
pub(crate) fn str_arg<'a>(arguments: &'a serde_json::Value, key: &str) -> &'a str {
    arguments.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

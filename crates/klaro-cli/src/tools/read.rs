//! File reading tool

use async_trait::async_trait;
use klaro_agent::{Tool, ToolError};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::utils::truncate_chars;

const MAX_LINES: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;
const MAX_BYTES: usize = 100_000;

/// Tool for reading file contents
pub struct ReadTool {
    root: PathBuf,
}

impl ReadTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the full text of a file (UTF-8). Very large files are truncated with a notice."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file, relative to the project root"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let file_path = super::str_arg(&arguments, "file_path");
        let path = super::resolve_path(&self.root, file_path);

        if path.is_dir() {
            return Err(ToolError::Failed(format!(
                "Path '{}' is a directory, not a file. Please use 'explore'.",
                file_path
            )));
        }
        if !path.is_file() {
            return Err(ToolError::Failed(format!(
                "File path not found or is not a file: '{}'",
                file_path
            )));
        }

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| ToolError::Failed(format!("Error reading file: {}", e)))?;
        let content = String::from_utf8(bytes).map_err(|e| {
            ToolError::Failed(format!(
                "Error reading file: '{}' is not valid UTF-8 text ({})",
                file_path,
                e.utf8_error()
            ))
        })?;

        Ok(bound(&content))
    }
}

/// Apply the line, line-length and byte limits, noting what was cut.
fn bound(content: &str) -> String {
    let total_lines = content.lines().count();

    let mut output = String::new();
    let mut had_long_lines = false;
    let mut shown = 0;
    for line in content.lines().take(MAX_LINES) {
        let line = if line.chars().count() > MAX_LINE_LENGTH {
            had_long_lines = true;
            truncate_chars(line, MAX_LINE_LENGTH)
        } else {
            line.to_string()
        };
        if output.len() + line.len() + 1 > MAX_BYTES {
            break;
        }
        if shown > 0 {
            output.push('\n');
        }
        output.push_str(&line);
        shown += 1;
    }

    let mut notices = Vec::new();
    if had_long_lines {
        notices.push(format!(
            "Some lines were truncated to {} characters",
            MAX_LINE_LENGTH
        ));
    }
    if shown < total_lines {
        notices.push(format!(
            "File truncated: showing {} of {} lines",
            shown, total_lines
        ));
    }

    if !notices.is_empty() {
        output.push_str(&format!("\n\n... ({})", notices.join(". ")));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(root: &std::path::Path, path: &str) -> Result<String, ToolError> {
        ReadTool::new(root)
            .execute(json!({"file_path": path}), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_reads_file_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.py"), "import os\nprint('hi')\n").unwrap();

        let output = read(dir.path(), "src/main.py").await.unwrap();
        assert_eq!(output, "import os\nprint('hi')");
    }

    #[tokio::test]
    async fn test_missing_file_and_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let err = read(dir.path(), "nonexistent.txt").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "File path not found or is not a file: 'nonexistent.txt'"
        );

        let err = read(dir.path(), "src").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Path 'src' is a directory, not a file. Please use 'explore'."
        );
    }

    #[tokio::test]
    async fn test_binary_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x81]).unwrap();
        let err = read(dir.path(), "blob.bin").await.unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_long_files_are_bounded() {
        let content = (0..2500).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let output = bound(&content);
        assert!(output.contains("line 1999\n"));
        assert!(!output.contains("line 2000"));
        assert!(output.ends_with("(File truncated: showing 2000 of 2500 lines)"));
    }

    #[test]
    fn test_long_lines_are_cut() {
        let content = format!("short\n{}", "x".repeat(3000));
        let output = bound(&content);
        assert!(output.contains("Some lines were truncated to 2000 characters"));
        assert!(!output.contains(&"x".repeat(2001)));
    }

    #[test]
    fn test_byte_budget_applies() {
        let line = "y".repeat(1999);
        let content = vec![line.as_str(); 100].join("\n");
        let output = bound(&content);
        assert!(output.len() < MAX_BYTES + 200);
        assert!(output.contains("File truncated"));
    }
}

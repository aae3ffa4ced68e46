//! Directory tree tool

use async_trait::async_trait;
use klaro_agent::{Tool, ToolError};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::ignore::IgnoreRules;

/// Entries shown before the tree is cut off
const MAX_ENTRIES: usize = 500;

/// Renders the project layout as an indented tree, skipping ignored paths.
pub struct ExploreTool {
    root: PathBuf,
}

impl ExploreTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ExploreTool {
    fn name(&self) -> &str {
        "explore"
    }

    fn description(&self) -> &str {
        "List the files and subdirectories of a project directory as a tree. \
         Build artifacts, caches, virtual environments and .gitignore'd paths are hidden. \
         Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to list, relative to the project root (default: '.')"
                }
            },
            "required": []
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let directory = arguments
            .get("directory")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let path = super::resolve_path(&self.root, directory);

        if !path.is_dir() {
            return Err(ToolError::Failed(format!(
                "Directory not found or is not a directory: '{}'",
                directory
            )));
        }

        let rules = IgnoreRules::for_root(&self.root);
        // Ignore rules are written relative to the project root
        let base = path.strip_prefix(&self.root).unwrap_or(Path::new("")).to_path_buf();

        let mut tree = Tree {
            rules: &rules,
            cancel: &cancel,
            lines: vec![format!("{}/", display_name(&path))],
            entries: 0,
            truncated: false,
        };
        tree.walk(&path, &base, 0);

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let mut output = tree.lines.join("\n");
        if tree.truncated {
            output.push_str(&format!(
                "\n\n(showing first {} entries; explore a subdirectory to see more)",
                MAX_ENTRIES
            ));
        }
        Ok(output)
    }
}

struct Tree<'a> {
    rules: &'a IgnoreRules,
    cancel: &'a CancellationToken,
    lines: Vec<String>,
    entries: usize,
    truncated: bool,
}

impl Tree<'_> {
    /// Files of a directory first, then each subdirectory followed by its contents.
    fn walk(&mut self, dir: &Path, rel: &Path, depth: usize) {
        if self.truncated || self.cancel.is_cancelled() {
            return;
        }

        let read_dir = match fs::read_dir(dir) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), "skipping unreadable directory: {}", e);
                return;
            }
        };

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if self.rules.is_ignored(&rel.join(&name), is_dir) {
                continue;
            }
            if is_dir {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        files.sort();
        dirs.sort();

        let indent = "|   ".repeat(depth);
        for file in files {
            if !self.push(format!("{}├── {}", indent, file)) {
                return;
            }
        }
        for name in dirs {
            if !self.push(format!("{}├── {}/", indent, name)) {
                return;
            }
            self.walk(&dir.join(&name), &rel.join(&name), depth + 1);
        }
    }

    fn push(&mut self, line: String) -> bool {
        if self.entries >= MAX_ENTRIES {
            self.truncated = true;
            return false;
        }
        self.lines.push(line);
        self.entries += 1;
        true
    }
}

fn display_name(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| absolute.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/pkg")).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(root.join("README.md"), "# x").unwrap();
        fs::write(root.join("main.py"), "print()").unwrap();
        fs::write(root.join("src/app.py"), "").unwrap();
        fs::write(root.join("src/pkg/util.py"), "").unwrap();
        fs::write(root.join("__pycache__/main.cpython-312.pyc"), "").unwrap();
        fs::write(root.join("data/dump.csv"), "").unwrap();
        fs::write(root.join(".gitignore"), "data/\n").unwrap();
        dir
    }

    async fn explore(root: &Path, args: serde_json::Value) -> Result<String, ToolError> {
        ExploreTool::new(root)
            .execute(args, CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_tree_lists_files_before_directories() {
        let dir = project();
        let output = explore(dir.path(), json!({})).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].ends_with('/'));
        assert_eq!(
            &lines[1..],
            &[
                "├── .gitignore",
                "├── README.md",
                "├── main.py",
                "├── src/",
                "|   ├── app.py",
                "|   ├── pkg/",
                "|   |   ├── util.py",
            ]
        );
    }

    #[tokio::test]
    async fn test_ignored_paths_are_hidden() {
        let dir = project();
        let output = explore(dir.path(), json!({"directory": "."})).await.unwrap();
        assert!(!output.contains("__pycache__"));
        assert!(!output.contains("data"));
    }

    #[tokio::test]
    async fn test_subdirectory_is_relative_to_root() {
        let dir = project();
        let output = explore(dir.path(), json!({"directory": "src"})).await.unwrap();
        assert!(output.starts_with("src/\n├── app.py\n├── pkg/\n|   ├── util.py"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = project();
        let err = explore(dir.path(), json!({"directory": "nope"})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Directory not found or is not a directory: 'nope'"
        );

        let err = explore(dir.path(), json!({"directory": "main.py"})).await.unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[tokio::test]
    async fn test_large_trees_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_ENTRIES + 10) {
            fs::write(dir.path().join(format!("f{:04}.txt", i)), "").unwrap();
        }
        let output = explore(dir.path(), json!({})).await.unwrap();
        assert_eq!(output.matches("├── ").count(), MAX_ENTRIES);
        assert!(output.contains("(showing first 500 entries"));
    }
}

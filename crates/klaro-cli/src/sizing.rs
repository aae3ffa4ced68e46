//! Pre-flight project sizing and model tier selection

use std::{fs, io, path::Path};

use crate::ignore::IgnoreRules;

/// Upper bounds (inclusive) for the small tier
pub const SMALL_MAX_FILES: usize = 25;
pub const SMALL_MAX_LINES: usize = 3_000;
/// Upper bounds (inclusive) for the medium tier
pub const MEDIUM_MAX_FILES: usize = 150;
pub const MEDIUM_MAX_LINES: usize = 30_000;

/// Files larger than this are counted but their lines are not
const MAX_COUNTED_FILE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkspaceSize {
    /// Non-ignored regular files
    pub files: usize,
    /// Lines across the text files among them
    pub lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Small => write!(f, "small"),
            ModelTier::Medium => write!(f, "medium"),
            ModelTier::Large => write!(f, "large"),
        }
    }
}

pub fn select_tier(size: WorkspaceSize) -> ModelTier {
    if size.files <= SMALL_MAX_FILES && size.lines <= SMALL_MAX_LINES {
        ModelTier::Small
    } else if size.files <= MEDIUM_MAX_FILES && size.lines <= MEDIUM_MAX_LINES {
        ModelTier::Medium
    } else {
        ModelTier::Large
    }
}

/// Count files and lines under `root`, skipping ignored paths. Unreadable
/// entries below the root are skipped; an unreadable root is an error.
pub fn measure(root: &Path, rules: &IgnoreRules) -> io::Result<WorkspaceSize> {
    let mut size = WorkspaceSize::default();
    let mut pending = vec![root.to_path_buf()];
    let mut first = true;

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if first => return Err(e),
            Err(_) => continue,
        };
        first = false;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if rules.is_ignored(rel, file_type.is_dir()) {
                continue;
            }

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                size.files += 1;
                size.lines += count_lines(&path);
            }
        }
    }

    Ok(size)
}

/// Lines in a text file; binary, oversized or unreadable files count zero.
fn count_lines(path: &Path) -> usize {
    let too_big = fs::metadata(path)
        .map(|m| m.len() > MAX_COUNTED_FILE_BYTES)
        .unwrap_or(true);
    if too_big {
        return 0;
    }
    match fs::read(path) {
        Ok(bytes) if !bytes.contains(&0) => match std::str::from_utf8(&bytes) {
            Ok(text) => text.lines().count(),
            Err(_) => 0,
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        let size = |files, lines| WorkspaceSize { files, lines };
        assert_eq!(select_tier(size(0, 0)), ModelTier::Small);
        assert_eq!(select_tier(size(25, 3_000)), ModelTier::Small);
        assert_eq!(select_tier(size(26, 10)), ModelTier::Medium);
        assert_eq!(select_tier(size(5, 3_001)), ModelTier::Medium);
        assert_eq!(select_tier(size(150, 30_000)), ModelTier::Medium);
        assert_eq!(select_tier(size(151, 10)), ModelTier::Large);
        assert_eq!(select_tier(size(10, 30_001)), ModelTier::Large);
    }

    #[test]
    fn test_measure_counts_text_and_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".venv/lib")).unwrap();
        fs::write(root.join("main.py"), "a\nb\nc\n").unwrap();
        fs::write(root.join("src/util.py"), "x\ny").unwrap();
        fs::write(root.join("logo.png"), [0x89, 0x50, 0x00, 0x47]).unwrap();
        fs::write(root.join(".venv/lib/site.py"), "ignored\n".repeat(100)).unwrap();

        let size = measure(root, &IgnoreRules::for_root(root)).unwrap();
        assert_eq!(size, WorkspaceSize { files: 3, lines: 5 });
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(measure(&dir.path().join("gone"), &IgnoreRules::builtin()).is_err());
    }
}

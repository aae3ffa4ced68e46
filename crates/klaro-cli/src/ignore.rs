//! Path filtering for exploration and sizing: a built-in ignore list plus
//! the target's own `.gitignore`.

use std::path::{Component, Path};

use glob::Pattern;

/// Patterns every exploration skips, in `.gitignore` syntax.
const BUILTIN_PATTERNS: &[&str] = &[
    // Byte-compiled files and native extensions
    "__pycache__/",
    "*.py[cod]",
    "*$py.class",
    "*.so",
    // Packaging and build output
    "build/",
    "dist/",
    "develop-eggs/",
    "eggs/",
    ".eggs/",
    "sdist/",
    "wheels/",
    "*.egg-info/",
    "*.egg",
    "target/",
    "node_modules/",
    // Environments
    ".venv/",
    "venv/",
    "env/",
    ".env",
    // Caches and test output
    ".cache/",
    ".pytest_cache/",
    ".mypy_cache/",
    ".ruff_cache/",
    ".tox/",
    ".nox/",
    ".hypothesis/",
    "htmlcov/",
    ".coverage",
    ".ipynb_checkpoints/",
    "*.log",
    // Tooling
    ".git/",
    ".idea/",
    ".vscode/",
    ".DS_Store",
];

#[derive(Debug, Clone)]
struct IgnorePattern {
    pattern: Pattern,
    /// Trailing `/`: only directories match
    dir_only: bool,
    /// Contains a `/`: matched against the whole relative path
    anchored: bool,
}

impl IgnorePattern {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        // Negations are not supported; skipping them errs on the side of showing files.
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            return None;
        }
        let dir_only = line.ends_with('/');
        let body = line.trim_end_matches('/');
        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return None;
        }
        let pattern = Pattern::new(body).ok()?;
        Some(Self {
            pattern,
            dir_only,
            anchored,
        })
    }
}

/// Compiled ignore rules
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreRules {
    /// The built-in list only.
    pub fn builtin() -> Self {
        let mut rules = Self::default();
        rules.extend(BUILTIN_PATTERNS.iter().copied());
        rules
    }

    /// Built-in list plus `<root>/.gitignore` when one exists.
    pub fn for_root(root: &Path) -> Self {
        let mut rules = Self::builtin();
        if let Ok(content) = std::fs::read_to_string(root.join(".gitignore")) {
            rules.extend(content.lines());
        }
        rules
    }

    pub fn extend<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        self.patterns
            .extend(lines.into_iter().filter_map(IgnorePattern::parse));
    }

    /// Whether `rel` (relative to the root) should be hidden. Any ignored
    /// ancestor directory hides everything below it.
    pub fn is_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        let components: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        for (i, component) in components.iter().enumerate() {
            let component_is_dir = i + 1 < components.len() || is_dir;
            let prefix = components[..=i].join("/");
            for p in &self.patterns {
                if p.dir_only && !component_is_dir {
                    continue;
                }
                let target = if p.anchored { &prefix } else { component };
                if p.pattern.matches(target) {
                    return true;
                }
            }
        }
        false
    }
}

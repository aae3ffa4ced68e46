//! Static declaration summary for Python sources

use async_trait::async_trait;
use klaro_agent::{Tool, ToolError};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<kw>(?:async[ \t]+)?def|class)[ \t]+(?P<name>[A-Za-z_]\w*)")
        .unwrap()
});

/// Summarises the classes and functions of a Python source file.
pub struct AnalyzeTool;

impl AnalyzeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnalyzeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AnalyzeTool {
    fn name(&self) -> &str {
        "analyze"
    }

    fn description(&self) -> &str {
        "Analyze Python source code and return a JSON summary of its classes, methods and \
         functions (parameters, return annotations, docstrings, line numbers). \
         Pass the file content obtained from 'read'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code_content": {
                    "type": "string",
                    "description": "The full source text to analyze"
                }
            },
            "required": ["code_content"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let code = super::str_arg(&arguments, "code_content");
        let analysis = analyze(code).map_err(failure)?;
        serde_json::to_string_pretty(&analysis)
            .map_err(|e| failure(format!("Unexpected error during code analysis: {}", e)))
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Analysis {
    pub analysis_summary: String,
    pub components: Vec<Component>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Component {
    Function {
        name: String,
        parameters: Vec<String>,
        returns: String,
        docstring: String,
        lineno: usize,
    },
    Class {
        name: String,
        docstring: String,
        methods: Vec<Method>,
        lineno: usize,
    },
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<String>,
    pub returns: String,
    pub docstring: String,
}

/// An open `def` or `class` block while scanning
struct Block {
    indent: usize,
    class_index: Option<usize>,
}

/// Errors go back to the model as a JSON object, like successful output.
fn failure(message: String) -> ToolError {
    ToolError::Failed(json!({ "error": message }).to_string())
}

/// Extract declarations in source order. Every `def` is reported as a
/// function; those directly inside a class body are also listed as methods.
pub fn analyze(code: &str) -> Result<Analysis, String> {
    if code.trim().is_empty() {
        return Err("Code content to analyze is empty.".to_string());
    }

    let lines: Vec<&str> = code.lines().collect();
    let mut components = Vec::new();
    let mut blocks: Vec<Block> = Vec::new();
    let mut open_string: Option<&str> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(delim) = open_string {
            if line.contains(delim) {
                open_string = None;
            }
            i += 1;
            continue;
        }

        let Some(caps) = DECLARATION.captures(line) else {
            open_string = unclosed_triple_quote(line);
            i += 1;
            continue;
        };

        let indent = indent_width(&caps["indent"]);
        let is_class = &caps["kw"] == "class";
        let name = caps["name"].to_string();
        let lineno = i + 1;

        let (header, end) = read_header(&lines, i, is_class).ok_or_else(|| {
            format!(
                "Code parsing error: unterminated declaration of '{}' at line {}",
                name, lineno
            )
        })?;
        let docstring = docstring_after(&lines, end + 1).unwrap_or_else(|| "None".to_string());

        while blocks.last().is_some_and(|b| b.indent >= indent) {
            blocks.pop();
        }
        let enclosing_class = blocks.last().and_then(|b| b.class_index);

        if is_class {
            blocks.push(Block {
                indent,
                class_index: Some(components.len()),
            });
            components.push(Component::Class {
                name,
                docstring,
                methods: Vec::new(),
                lineno,
            });
        } else {
            let (parameters, returns) = signature(&header);
            if let Some(Component::Class { methods, .. }) =
                enclosing_class.and_then(|idx| components.get_mut(idx))
            {
                methods.push(Method {
                    name: name.clone(),
                    parameters: parameters.clone(),
                    returns: returns.clone(),
                    docstring: docstring.clone(),
                });
            }
            blocks.push(Block {
                indent,
                class_index: None,
            });
            components.push(Component::Function {
                name,
                parameters,
                returns,
                docstring,
                lineno,
            });
        }

        i = end + 1;
    }

    let classes = components
        .iter()
        .filter(|c| matches!(c, Component::Class { .. }))
        .count();
    let functions = components.len() - classes;

    Ok(Analysis {
        analysis_summary: format!(
            "This Python file contains {} classes and {} functions.",
            classes, functions
        ),
        components,
    })
}

fn indent_width(indent: &str) -> usize {
    indent.chars().map(|c| if c == '\t' { 8 } else { 1 }).sum()
}

/// Join lines from `start` until the header's closing `:`. Returns the
/// header text up to that colon and the index of its last line.
fn read_header(lines: &[&str], start: usize, is_class: bool) -> Option<(String, usize)> {
    let mut header = String::new();
    let mut depth: i32 = 0;
    let mut seen_params = is_class;

    for (offset, line) in lines[start..].iter().enumerate() {
        if offset > 0 {
            header.push(' ');
        }
        for c in line.chars() {
            match c {
                '(' | '[' | '{' => {
                    depth += 1;
                    seen_params = true;
                }
                ')' | ']' | '}' => depth -= 1,
                ':' if depth == 0 && seen_params => return Some((header, start + offset)),
                '#' if depth == 0 => break,
                _ => {}
            }
            header.push(c);
        }
    }
    None
}

/// Positional parameter names and the return annotation of a `def` header.
fn signature(header: &str) -> (Vec<String>, String) {
    let Some(open) = header.find('(') else {
        return (Vec::new(), "None".to_string());
    };

    let mut depth = 0;
    let mut close = header.len();
    let mut pieces = Vec::new();
    let mut current = String::new();
    for (idx, c) in header[open + 1..].char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => {
                close = open + 1 + idx;
                break;
            }
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    pieces.push(current);

    let mut parameters = Vec::new();
    for piece in &pieces {
        let piece = piece.trim();
        if piece.is_empty() || piece == "/" {
            continue;
        }
        // Keyword-only and variadic parameters are not positional
        if piece.starts_with('*') {
            break;
        }
        let name = piece
            .split([':', '='])
            .next()
            .unwrap_or_default()
            .trim();
        if !name.is_empty() {
            parameters.push(name.to_string());
        }
    }

    let returns = header
        .get(close + 1..)
        .and_then(|rest| rest.split_once("->"))
        .map(|(_, ret)| ret.trim().to_string())
        .filter(|ret| !ret.is_empty())
        .unwrap_or_else(|| "None".to_string());

    (parameters, returns)
}

/// First line of a docstring starting at the first non-blank line from `from`.
fn docstring_after(lines: &[&str], from: usize) -> Option<String> {
    let idx = (from..lines.len()).find(|&i| !lines[i].trim().is_empty())?;
    let first = lines[idx].trim();
    let body = first
        .strip_prefix(['r', 'R', 'u', 'U'])
        .filter(|rest| rest.starts_with(['"', '\'']))
        .unwrap_or(first);

    let delim = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|d| body.starts_with(d))?;
    let rest = &body[delim.len()..];
    let text = rest.split(delim).next().unwrap_or_default().trim();
    if !text.is_empty() {
        return Some(text.to_string());
    }

    // Text starts on the line after the opening quotes
    if delim.len() == 3 && !rest.contains(delim) {
        let next = lines.get(idx + 1)?.trim();
        let next = next.split(delim).next().unwrap_or_default().trim();
        if !next.is_empty() {
            return Some(next.to_string());
        }
    }
    None
}

/// The triple-quote delimiter left open at the end of `line`, if any.
fn unclosed_triple_quote(line: &str) -> Option<&'static str> {
    ["\"\"\"", "'''"]
        .into_iter()
        .find(|d| line.matches(d).count() % 2 == 1)
}

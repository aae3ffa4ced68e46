//! Fixed prompt text and the default style guide

use crate::knowledge::Document;

/// Literal the model must put in front of the finished README
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

pub const SYSTEM_PROMPT: &str = r#"You are Klaro, an autonomous technical writer. Your job is to study a codebase and produce a complete, accurate README.md for it.

USING TOOLS
Tools are available through function calling. Call them directly.
Never write "Action: tool_name[...]", "Thought:" or "Observation:" as plain text; text like that does nothing.

Tools:
- explore(directory): show the project tree. Start here with directory=".".
- read(file_path): return the text of a file, e.g. the entry point or the dependency manifest.
- analyze(code_content): summarise the classes and functions of Python source obtained with read.
- lookup(query): general information about a library or concept the project uses.
- retrieve(query): README style guidelines. You MUST call this before your final answer.

Every response either calls at least one tool or delivers the final answer. Do not reply with commentary alone.

FINAL ANSWER
When you have gathered enough information, reply with the exact prefix "Final Answer:" followed directly by the README in markdown, for example:

Final Answer: # Project Name

What the project does...

## Setup
...

Without the "Final Answer:" prefix the task is not considered finished.
Do not wrap the README in code fences (```) and do not add remarks after it."#;

/// Source label of the built-in style guide
pub const DEFAULT_GUIDE_SOURCE: &str = "Klaro_Style_Guide";

pub const DEFAULT_STYLE_GUIDE: &str = r#"# Klaro Project Documentation Style Guide
Every README.md produced with this guide follows these rules:
1. Heading structure: headings use # for the title and ## for sections.
2. Sections: every README includes `# Project Name`, `## Setup`, `## Usage` and `## Components`.
3. Tone and language: technical, professional and clear. Code examples are always fenced with triple backticks and a language tag (```python).
"#;

pub fn default_guide() -> Document {
    Document::new(DEFAULT_STYLE_GUIDE, DEFAULT_GUIDE_SOURCE)
}

/// The user task for documenting `target`. Tool paths are relative to the
/// project root, which the model sees as '.'.
pub fn task_description(target: &str) -> String {
    format!(
        "Analyze the codebase in '{target}' and write a README.md for it. \
         Tool paths are relative to the project root, '.'. \
         Steps: 1. Explore the project with 'explore'. \
         2. Read the key files with 'read' and analyze source code with 'analyze'. \
         3. Gather background on the libraries it uses with 'lookup'. \
         4. You MUST call 'retrieve' to fetch the 'README style guidelines' before writing the final answer. \
         5. Reply with 'Final Answer:' followed by the README."
    )
}

/// First message of the conversation: operating instructions plus the task.
pub fn seed_message(task: &str) -> String {
    format!("{}\n\nUSER'S TASK: {}", SYSTEM_PROMPT, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_contains_instructions_and_target() {
        let seed = seed_message(&task_description("../shop"));
        assert!(seed.starts_with("You are Klaro"));
        assert!(seed.contains("USER'S TASK: Analyze the codebase in '../shop'"));
        assert!(seed.contains(FINAL_ANSWER_MARKER));
    }

    #[test]
    fn test_task_names_tools_in_order() {
        let task = task_description(".");
        let expected = [
            "'explore'",
            "'read'",
            "'analyze'",
            "'lookup'",
            "'retrieve'",
            "'Final Answer:'",
        ];
        let positions: Vec<usize> = expected
            .iter()
            .map(|t| task.find(t).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_default_guide_lists_required_sections() {
        let guide = default_guide();
        assert_eq!(guide.source, "Klaro_Style_Guide");
        for section in ["# Project Name", "## Setup", "## Usage", "## Components"] {
            assert!(guide.text.contains(section));
        }
    }
}

//! Agent event types

use klaro_ai::{ErrorKind, Message, Usage};
use serde::{Deserialize, Serialize};

use crate::agent::{AbortReason, CompletionKind};

/// Which kind of step the loop is about to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Reasoning,
    Acting,
}

/// Events emitted during a loop run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Loop started
    LoopStart { max_iterations: u32 },

    /// A step is about to run; `step` counts reasoning and acting steps together
    StepStart { step: u32, kind: StepKind },

    /// Model response streaming started
    MessageStart,

    /// Model text delta
    MessageDelta { delta: String },

    /// A model response was appended to the history
    ThoughtEnd { message: Message },

    /// Tool execution started
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: String,
        is_error: bool,
    },

    /// A failure was recorded and the loop is replanning
    Recovering { error: String },

    /// The step counter crossed the soft warning threshold
    NearIterationLimit { steps: u32, max_iterations: u32 },

    /// Terminal success
    Completed { kind: CompletionKind },

    /// Terminal failure
    Aborted { reason: AbortReason },

    /// Loop finished (always the last event of a run)
    LoopEnd {
        reasoning_steps: u32,
        acting_steps: u32,
        total_usage: Usage,
    },

    /// Transport-level error for one model attempt
    Error {
        message: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

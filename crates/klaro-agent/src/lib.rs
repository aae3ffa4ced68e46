//! klaro-agent: the reason/act loop
//!
//! An [`AgentLoop`] alternates model calls (through a [`ModelGateway`]) with
//! tool execution (through a [`ToolExecutor`]) over a single
//! [`ConversationState`], until the model signals completion or a budget
//! (iterations, wall clock, model failures) runs out.

pub mod agent;
pub mod conversation;
pub mod error;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod handle;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;
pub mod transport;

pub use agent::{
    AbortReason, AgentLoop, CompletionKind, CompletionPolicy, LoopConfig, LoopOutcome, LoopStatus,
    Route, decide_next_step,
};
pub use conversation::ConversationState;
pub use error::{Error, Result};
pub use events::{AgentEvent, StepKind};
pub use executor::ToolExecutor;
pub use gateway::{GatewayConfig, ModelGateway, RetryConfig};
pub use handle::AgentHandle;
pub use tool::{BoxedTool, Tool, ToolError, ToolObservation, ToolRegistry, ToolRequest};
pub use transport::{ProviderTransport, Transport, TurnConfig};

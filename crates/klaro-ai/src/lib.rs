//! klaro-ai: LLM message types and a streaming chat-completions client
//!
//! The agent runtime only depends on the types here plus the
//! [`providers::LlmProvider`] trait; the OpenAI-compatible provider is the
//! one concrete backend.

pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use stream::MessageEventStream;
pub use types::*;

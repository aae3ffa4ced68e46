//! Error types for klaro-agent

use std::time::Duration;

use thiserror::Error;

/// Result type alias using klaro-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the model gateway and the loop around it
#[derive(Error, Debug)]
pub enum Error {
    /// The provider reported a failure that retrying cannot fix (bad
    /// credentials, misconfiguration)
    #[error("{0}")]
    Fatal(String),

    /// Every attempt exceeded the per-call timeout
    #[error("Model call timed out after {}s ({attempts} attempts)", .timeout.as_secs_f32())]
    ModelTimeout { timeout: Duration, attempts: u32 },

    /// Every attempt failed; `message` is the last failure
    #[error("Model invocation failed after {attempts} attempts: {message}")]
    ModelInvocation { attempts: u32, message: String },

    /// The run was cancelled through its handle
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the loop may feed this failure back to the model and keep going.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ModelTimeout { .. } | Error::ModelInvocation { .. } => true,
            Error::Fatal(_) | Error::Cancelled => false,
        }
    }
}

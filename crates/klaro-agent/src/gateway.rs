//! Model gateway: one bounded, retried model call per reasoning step

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use klaro_ai::{ErrorKind, Message};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    events::AgentEvent,
    transport::{Transport, TurnConfig},
};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier applied per attempt (1.0 = fixed delay)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Gateway bounds
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Limit on a single attempt, streaming included
    pub call_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}

enum AttemptFailure {
    TimedOut,
    Failed { message: String, kind: ErrorKind },
}

/// Produces exactly one assistant message from the full history.
pub struct ModelGateway {
    transport: Arc<dyn Transport>,
    turn: TurnConfig,
    config: GatewayConfig,
}

impl ModelGateway {
    pub fn new(transport: Arc<dyn Transport>, turn: TurnConfig, config: GatewayConfig) -> Self {
        Self {
            transport,
            turn,
            config,
        }
    }

    /// Invoke the model. Each attempt is bounded by `call_timeout`; timeouts
    /// and transient failures are retried `max_retries` times before
    /// surfacing as [`Error::ModelTimeout`] or [`Error::ModelInvocation`].
    /// A rejected request is not retried, and a fatal one (bad credentials)
    /// comes back as [`Error::Fatal`].
    pub async fn invoke(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
        events: &broadcast::Sender<AgentEvent>,
    ) -> Result<Message> {
        let retry = &self.config.retry;
        let total_attempts = retry.max_retries + 1;
        let mut last_failure = AttemptFailure::TimedOut;

        for attempt in 0..total_attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = tokio::time::timeout(
                self.config.call_timeout,
                self.attempt(history, cancel, events),
            )
            .await
            .unwrap_or(Err(AttemptFailure::TimedOut));

            let failure = match outcome {
                Ok(message) => return Ok(message),
                Err(failure) => failure,
            };

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let reason = match &failure {
                AttemptFailure::TimedOut => {
                    format!("timed out after {:?}", self.config.call_timeout)
                }
                AttemptFailure::Failed {
                    message,
                    kind: ErrorKind::Fatal,
                } => {
                    tracing::error!("Model call failed and cannot succeed: {}", message);
                    return Err(Error::Fatal(message.clone()));
                }
                AttemptFailure::Failed {
                    message,
                    kind: ErrorKind::Rejected,
                } => {
                    tracing::warn!("Model call rejected, not retrying: {}", message);
                    return Err(Error::ModelInvocation {
                        attempts: attempt + 1,
                        message: message.clone(),
                    });
                }
                AttemptFailure::Failed { message, .. } => message.clone(),
            };
            last_failure = failure;

            if attempt + 1 < total_attempts {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    "Model call failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    total_attempts,
                    reason,
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }

        Err(match last_failure {
            AttemptFailure::TimedOut => Error::ModelTimeout {
                timeout: self.config.call_timeout,
                attempts: total_attempts,
            },
            AttemptFailure::Failed { message, .. } => Error::ModelInvocation {
                attempts: total_attempts,
                message,
            },
        })
    }

    async fn attempt(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
        events: &broadcast::Sender<AgentEvent>,
    ) -> std::result::Result<Message, AttemptFailure> {
        let mut stream = self
            .transport
            .run(history.to_vec(), &self.turn, cancel.clone())
            .await
            .map_err(|e| AttemptFailure::Failed {
                message: e.to_string(),
                kind: e.kind(),
            })?;

        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::ThoughtEnd { message } => return Ok(message),
                AgentEvent::Error { message, kind } => {
                    let _ = events.send(AgentEvent::Error {
                        message: message.clone(),
                        kind,
                    });
                    return Err(AttemptFailure::Failed { message, kind });
                }
                other => {
                    let _ = events.send(other);
                }
            }
        }

        Err(AttemptFailure::Failed {
            message: "Model stream ended without a response".to_string(),
            kind: ErrorKind::Transient,
        })
    }
}

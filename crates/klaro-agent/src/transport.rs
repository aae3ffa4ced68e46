//! Transport abstraction between the gateway and an LLM provider

use std::{pin::Pin, sync::Arc};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use klaro_ai::{
    Context, ErrorKind, Message, Model, Result, StreamOptions,
    providers::LlmProvider,
    stream::{MessageBuilder, MessageEvent},
};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::events::AgentEvent;

/// Everything about a model turn that does not change between turns
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// System prompt
    pub system_prompt: Option<String>,
    /// Available tools (as API definitions)
    pub tools: Vec<klaro_ai::Tool>,
    /// Model to use
    pub model: Model,
    /// Sampling options
    pub options: StreamOptions,
}

/// A stream of agent events
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// Transport for one model turn
///
/// A successful turn ends its stream with [`AgentEvent::ThoughtEnd`]; a failed
/// one with [`AgentEvent::Error`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a model turn over the full history, streaming events
    async fn run(
        &self,
        messages: Vec<Message>,
        config: &TurnConfig,
        cancel: CancellationToken,
    ) -> Result<AgentEventStream>;
}

/// Direct provider transport - calls the LLM API directly
pub struct ProviderTransport {
    provider: Arc<dyn LlmProvider>,
}

impl ProviderTransport {
    /// Create a new provider transport
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Transport for ProviderTransport {
    async fn run(
        &self,
        messages: Vec<Message>,
        config: &TurnConfig,
        cancel: CancellationToken,
    ) -> Result<AgentEventStream> {
        let context = Context {
            system_prompt: config.system_prompt.clone(),
            messages,
            tools: config.tools.clone(),
        };

        let mut message_stream = self
            .provider
            .stream(&config.model, &context, &config.options)
            .await?;

        let event_stream: AgentEventStream = Box::pin(stream! {
            let mut builder = MessageBuilder::new();
            let mut finished = false;

            while let Some(event) = message_stream.next().await {
                if cancel.is_cancelled() {
                    yield AgentEvent::Error {
                        message: "Cancelled".to_string(),
                        kind: ErrorKind::Transient,
                    };
                    return;
                }

                builder.process_event(&event);

                match event {
                    MessageEvent::Start { .. } => {
                        yield AgentEvent::MessageStart;
                    }
                    MessageEvent::TextDelta { delta, .. } => {
                        yield AgentEvent::MessageDelta { delta };
                    }
                    MessageEvent::Done { message, .. } => {
                        finished = true;
                        yield AgentEvent::ThoughtEnd { message };
                        break;
                    }
                    MessageEvent::Error { message, kind } => {
                        yield AgentEvent::Error { message, kind };
                        return;
                    }
                    MessageEvent::ToolCallStart { .. } | MessageEvent::ToolCallDelta { .. } => {}
                }
            }

            if !finished {
                // Stream closed without a completion event; keep whatever arrived.
                let partial = builder.build();
                if partial.content().is_empty() {
                    yield AgentEvent::Error {
                        message: "Model stream ended without a response".to_string(),
                        kind: ErrorKind::Transient,
                    };
                } else {
                    yield AgentEvent::ThoughtEnd { message: partial };
                }
            }
        });

        Ok(event_stream)
    }
}

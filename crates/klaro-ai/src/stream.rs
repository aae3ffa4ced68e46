//! Streaming event types and utilities

use crate::{
    error::ErrorKind,
    types::{Content, Message, StopReason, Usage},
};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted during message streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Tool call started
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial JSON)
    ToolCallDelta { content_index: usize, delta: String },
    /// Message completed successfully
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred; `kind` tells the caller whether to retry
    Error {
        message: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

impl MessageEvent {
    /// Error event for a typed provider error
    pub fn failure(error: &crate::Error) -> Self {
        MessageEvent::Error {
            message: error.to_string(),
            kind: error.kind(),
        }
    }
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Builder for constructing an assistant message from streaming events
///
/// Used to keep a partial message around when a stream is cut short.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    content_buffers: Vec<ContentBuffer>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

#[derive(Debug)]
enum ContentBuffer {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
    },
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the message state
    pub fn process_event(&mut self, event: &MessageEvent) {
        match event {
            MessageEvent::TextDelta {
                content_index,
                delta,
            } => {
                if !matches!(
                    self.content_buffers.get(*content_index),
                    Some(ContentBuffer::Text(_))
                ) {
                    self.ensure_buffer(*content_index, ContentBuffer::Text(String::new()));
                }
                if let Some(ContentBuffer::Text(text)) =
                    self.content_buffers.get_mut(*content_index)
                {
                    text.push_str(delta);
                }
            }
            MessageEvent::ToolCallStart {
                content_index,
                id,
                name,
            } => {
                self.ensure_buffer(
                    *content_index,
                    ContentBuffer::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments_json: String::new(),
                    },
                );
            }
            MessageEvent::ToolCallDelta {
                content_index,
                delta,
            } => {
                if let Some(ContentBuffer::ToolCall { arguments_json, .. }) =
                    self.content_buffers.get_mut(*content_index)
                {
                    arguments_json.push_str(delta);
                }
            }
            MessageEvent::Done {
                stop_reason, usage, ..
            } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = usage.clone();
            }
            _ => {}
        }
    }

    /// Build the final message
    pub fn build(self) -> Message {
        let content: Vec<Content> = self
            .content_buffers
            .into_iter()
            .filter_map(|buf| match buf {
                ContentBuffer::Text(text) if text.is_empty() => None,
                ContentBuffer::Text(text) => Some(Content::Text { text }),
                ContentBuffer::ToolCall {
                    id,
                    name,
                    arguments_json,
                } => {
                    let arguments =
                        serde_json::from_str(&arguments_json).unwrap_or(serde_json::json!({}));
                    Some(Content::ToolCall {
                        id,
                        name,
                        arguments,
                    })
                }
            })
            .collect();

        Message::Assistant {
            content,
            metadata: crate::types::AssistantMetadata {
                usage: self.usage,
                stop_reason: self.stop_reason,
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    fn ensure_buffer(&mut self, index: usize, default: ContentBuffer) {
        while self.content_buffers.len() <= index {
            self.content_buffers.push(ContentBuffer::Text(String::new()));
        }
        self.content_buffers[index] = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_text_and_tool_calls() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "Let me ".into(),
        });
        builder.process_event(&MessageEvent::TextDelta {
            content_index: 0,
            delta: "look.".into(),
        });
        builder.process_event(&MessageEvent::ToolCallStart {
            content_index: 1,
            id: "call_1".into(),
            name: "explore".into(),
        });
        builder.process_event(&MessageEvent::ToolCallDelta {
            content_index: 1,
            delta: "{\"directory\":".into(),
        });
        builder.process_event(&MessageEvent::ToolCallDelta {
            content_index: 1,
            delta: "\".\"}".into(),
        });

        let msg = builder.build();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2["directory"], ".");
        assert_eq!(msg.text(), "Let me look.");
    }

    #[test]
    fn test_builder_bad_arguments_become_empty_object() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&MessageEvent::ToolCallStart {
            content_index: 0,
            id: "c".into(),
            name: "read".into(),
        });
        builder.process_event(&MessageEvent::ToolCallDelta {
            content_index: 0,
            delta: "{\"file_pa".into(),
        });
        let msg = builder.build();
        assert_eq!(msg.tool_calls()[0].2, &serde_json::json!({}));
    }

    #[test]
    fn test_failure_event_carries_error_kind() {
        let error = crate::Error::from_status(401, "Incorrect API key provided");
        let event = MessageEvent::failure(&error);
        match event {
            MessageEvent::Error { message, kind } => {
                assert_eq!(message, "Authentication failed: Incorrect API key provided");
                assert_eq!(kind, ErrorKind::Fatal);
            }
            other => panic!("expected Error, got {:?}", other),
        }

        let untyped: MessageEvent =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert!(matches!(untyped, MessageEvent::Error { kind: ErrorKind::Transient, .. }));
    }
}

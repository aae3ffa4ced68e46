//! Scripted transport for exercising the loop without a network.

use std::{collections::VecDeque, sync::atomic::AtomicU32, sync::atomic::Ordering, time::Duration};

use async_trait::async_trait;
use klaro_ai::{Content, ErrorKind, Message};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    events::AgentEvent,
    transport::{AgentEventStream, Transport, TurnConfig},
};

/// One canned model turn
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with this message
    Message(Message),
    /// Fail the attempt with this error text
    Error { message: String, kind: ErrorKind },
    /// Sleep before producing the inner reply
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Message(Message::assistant_text(text))
    }

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::Message(Message::assistant(vec![Content::tool_call(id, name, arguments)]))
    }

    /// Several tool calls in one response
    pub fn tool_calls(calls: Vec<(&str, &str, serde_json::Value)>) -> Self {
        Self::Message(Message::assistant(
            calls
                .into_iter()
                .map(|(id, name, args)| Content::tool_call(id, name, args))
                .collect(),
        ))
    }

    /// A failure worth retrying (network, overload)
    pub fn error(message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::Transient, message)
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind,
        }
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A transport that replays a queue of canned replies.
///
/// Once the queue is empty it keeps returning the fallback reply (a short
/// "done" text unless one is set).
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    calls: AtomicU32,
    seen_history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: ScriptedReply::text("done"),
            calls: AtomicU32::new(0),
            seen_history_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Return `reply` on every call.
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self::new(vec![]).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Number of transport runs so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Acquire)
    }

    /// History length passed to each run
    pub fn seen_history_lengths(&self) -> Vec<usize> {
        self.seen_history_lengths.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn run(
        &self,
        messages: Vec<Message>,
        _config: &TurnConfig,
        cancel: CancellationToken,
    ) -> klaro_ai::Result<AgentEventStream> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.seen_history_lengths.lock().push(messages.len());

        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let stream: AgentEventStream = Box::pin(async_stream::stream! {
            let mut reply = reply;
            while let ScriptedReply::Delayed(delay, inner) = reply {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        yield AgentEvent::Error {
                            message: "Cancelled".to_string(),
                            kind: ErrorKind::Transient,
                        };
                        return;
                    }
                }
                reply = *inner;
            }

            yield AgentEvent::MessageStart;
            match reply {
                ScriptedReply::Message(message) => {
                    let text = message.text();
                    if !text.is_empty() {
                        yield AgentEvent::MessageDelta { delta: text };
                    }
                    yield AgentEvent::ThoughtEnd { message };
                }
                ScriptedReply::Error { message, kind } => {
                    yield AgentEvent::Error { message, kind };
                }
                ScriptedReply::Delayed(..) => {}
            }
        });

        Ok(stream)
    }
}

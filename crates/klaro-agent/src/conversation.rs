//! Conversation state threaded through the loop.

use std::collections::HashSet;

use klaro_ai::Message;

use crate::tool::{ToolObservation, ToolRequest};

/// The history the model sees, plus the most recent failure.
///
/// `history` is append-only: the loop never reorders or prunes it.
/// `last_error` is a routing projection and is not part of the history.
#[derive(Debug, Clone)]
pub struct ConversationState {
    history: Vec<Message>,
    last_error: Option<String>,
}

impl ConversationState {
    /// Seed a conversation with the task message.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            history: vec![Message::user(task)],
            last_error: None,
        }
    }

    /// Full ordered history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Most recent failure, if one is outstanding.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref().filter(|e| !e.is_empty())
    }

    /// Record a failure. Overwrites any earlier one.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Append a model response.
    pub fn push_thought(&mut self, thought: Message) {
        debug_assert!(thought.is_assistant());
        self.history.push(thought);
    }

    /// Append observations in the order given.
    pub fn push_observations(&mut self, observations: Vec<ToolObservation>) {
        for observation in observations {
            debug_assert!(self.has_request(&observation.tool_call_id));
            self.history.push(observation.into_message());
        }
    }

    /// Append a loop-generated notice the model should read before its next
    /// step (used for failures that do not answer a tool request).
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.history.push(Message::user(text));
    }

    /// The newest model response.
    pub fn latest_thought(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.is_assistant())
    }

    /// Tool requests carried by the newest model response.
    pub fn pending_requests(&self) -> Vec<ToolRequest> {
        match self.history.last() {
            Some(last) if last.is_assistant() => ToolRequest::from_message(last),
            _ => Vec::new(),
        }
    }

    /// Text of the newest model response that said anything.
    pub fn latest_text(&self) -> Option<String> {
        self.history
            .iter()
            .rev()
            .filter(|m| m.is_assistant())
            .map(|m| m.text())
            .find(|t| !t.trim().is_empty())
    }

    /// Every observation answers exactly one earlier request, and no request
    /// is answered twice.
    pub fn observations_well_formed(&self) -> bool {
        let mut requested = HashSet::new();
        let mut answered = HashSet::new();
        for message in &self.history {
            match message {
                Message::Assistant { .. } => {
                    for (id, _, _) in message.tool_calls() {
                        requested.insert(id.to_string());
                    }
                }
                Message::ToolResult { tool_call_id, .. } => {
                    if !requested.contains(tool_call_id) || !answered.insert(tool_call_id.clone())
                    {
                        return false;
                    }
                }
                Message::User { .. } => {}
            }
        }
        true
    }

    fn has_request(&self, id: &str) -> bool {
        self.history
            .iter()
            .any(|m| m.tool_calls().iter().any(|(call_id, _, _)| *call_id == id))
    }
}

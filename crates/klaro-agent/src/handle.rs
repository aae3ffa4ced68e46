//! A cloneable handle for observing and stopping a loop from outside.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for poking the loop from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap. The session driver
/// keeps one so it can stop a run that outlives its deadline and still
/// report what the model had written so far.
#[derive(Clone)]
pub struct AgentHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) is_running: Arc<AtomicBool>,
    pub(crate) last_thought: Arc<Mutex<Option<String>>>,
}

impl AgentHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_running: Arc::new(AtomicBool::new(false)),
            last_thought: Arc::new(Mutex::new(None)),
        }
    }

    /// Request cooperative cancellation. In-flight model and tool calls
    /// observe the token; the loop stops at the next step boundary.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Get the cancellation token (for external callers that need direct access).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }

    /// Text of the newest non-empty model response, for best-effort partial output.
    pub fn last_thought(&self) -> Option<String> {
        self.last_thought.lock().clone()
    }

    pub(crate) fn record_thought(&self, text: &str) {
        if !text.trim().is_empty() {
            *self.last_thought.lock() = Some(text.to_string());
        }
    }

    pub(crate) fn mark_running(&self) {
        self.is_running.store(true, Ordering::Release);
    }

    pub(crate) fn mark_idle(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}

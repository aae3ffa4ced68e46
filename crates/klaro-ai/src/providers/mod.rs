//! Chat-completions backends

pub mod openai;

use crate::{Context, Error, MessageEventStream, Model, Result, StreamOptions};
use async_trait::async_trait;

/// A backend that turns one request into a stream of [`MessageEvent`]s.
///
/// Failures that happen before the stream opens come back as `Err`. Once
/// the stream is open, a failure is its last item: a
/// [`MessageEvent::Error`] whose `kind` says whether resending can help.
///
/// [`MessageEvent`]: crate::stream::MessageEvent
/// [`MessageEvent::Error`]: crate::stream::MessageEvent::Error
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream>;
}

/// The configured key, or `env_var` when none is configured. Blank values
/// count as missing.
pub fn get_api_key(configured: Option<&str>, env_var: &str) -> Result<String> {
    let present = |key: &str| !key.trim().is_empty();
    if let Some(key) = configured.filter(|k| present(k)) {
        return Ok(key.to_string());
    }
    std::env::var(env_var)
        .ok()
        .filter(|k| present(k))
        .ok_or(Error::InvalidApiKey)
}

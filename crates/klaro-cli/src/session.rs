//! Session driver: prepares one documentation run and reports its result

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use klaro_agent::{
    AbortReason, AgentEvent, AgentLoop, CompletionKind, CompletionPolicy, ConversationState,
    GatewayConfig, LoopConfig, LoopOutcome, LoopStatus, ModelGateway, RetryConfig, ToolExecutor,
    Transport, TurnConfig,
};
use klaro_ai::{Model, StreamOptions, Usage};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    config::Settings,
    ignore::IgnoreRules,
    knowledge::{Document, KnowledgeBase},
    prompts::{self, FINAL_ANSWER_MARKER},
    sizing::{self, ModelTier},
    tools,
    utils::format_elapsed,
};

/// How a session failed. Aborted runs carry whatever text the model had
/// produced so far.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session timed out after {}", format_elapsed(.elapsed.to_owned()))]
    Timeout {
        elapsed: Duration,
        partial: Option<String>,
    },

    #[error("iteration limit reached after {steps} steps ({})", format_elapsed(.elapsed.to_owned()))]
    IterationLimit {
        steps: u32,
        elapsed: Duration,
        partial: Option<String>,
    },

    #[error("model API failure after {}: {message}", format_elapsed(.elapsed.to_owned()))]
    ModelFailure {
        message: String,
        elapsed: Duration,
        partial: Option<String>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("agent worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    /// Best-effort document text from an aborted run
    pub fn partial(&self) -> Option<&str> {
        match self {
            SessionError::Timeout { partial, .. }
            | SessionError::IterationLimit { partial, .. }
            | SessionError::ModelFailure { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

/// The finished document and how it was produced
#[derive(Debug, Clone)]
pub struct Artifact {
    pub text: String,
    pub completion: CompletionKind,
    pub model: String,
    pub tier: Option<ModelTier>,
    pub reasoning_steps: u32,
    pub acting_steps: u32,
    pub elapsed: Duration,
    pub usage: Usage,
    /// Estimated spend in dollars from the model's list prices
    pub cost: f64,
}

/// A prepared run over one project directory.
pub struct Session {
    agent: Arc<AgentLoop>,
    seed: ConversationState,
    model: String,
    pricing: Model,
    tier: Option<ModelTier>,
    timeout: Duration,
}

impl Session {
    /// Validate the target, pick a model, index the style guides and wire
    /// the loop together. Nothing talks to the model yet.
    pub fn prepare(
        target: &Path,
        settings: &Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SessionError> {
        let root = resolve_target(target)?;

        let (model, tier) = choose_model(&root, settings);
        tracing::info!(root = %root.display(), %model, ?tier, "preparing session");

        let knowledge = KnowledgeBase::new();
        let status = knowledge.init(style_guides(&settings.guides)?);
        tracing::info!("{}", status);

        let registry = Arc::new(tools::registry(&root, knowledge));
        let pricing = klaro_ai::models::resolve_model(&model, &settings.base_url);
        let turn = TurnConfig {
            system_prompt: None,
            tools: registry.api_tools(),
            model: pricing.clone(),
            options: StreamOptions {
                temperature: Some(settings.temperature),
                ..Default::default()
            },
        };
        let gateway = ModelGateway::new(
            transport,
            turn,
            GatewayConfig {
                call_timeout: settings.model_timeout,
                retry: RetryConfig {
                    max_retries: settings.model_retries,
                    ..Default::default()
                },
            },
        );
        let executor = ToolExecutor::new(registry, settings.tool_timeout);
        let agent = AgentLoop::new(
            gateway,
            executor,
            LoopConfig {
                max_iterations: settings.max_iterations,
                deadline: Some(settings.session_timeout),
                completion: CompletionPolicy {
                    marker: FINAL_ANSWER_MARKER.to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let task = prompts::task_description(&target.display().to_string());
        Ok(Self {
            agent: Arc::new(agent),
            seed: ConversationState::new(prompts::seed_message(&task)),
            model,
            pricing,
            tier,
            timeout: settings.session_timeout,
        })
    }

    /// Subscribe to progress events. Call before [`Session::run`].
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.agent.subscribe()
    }

    pub fn model_id(&self) -> &str {
        &self.model
    }

    pub fn tier(&self) -> Option<ModelTier> {
        self.tier
    }

    /// Run the loop on its own task under the session deadline. On timeout
    /// the loop is told to stop and left to wind down in the background.
    pub async fn run(self) -> Result<Artifact, SessionError> {
        let started = Instant::now();
        let handle = self.agent.handle();
        let agent = self.agent.clone();
        let seed = self.seed;
        let worker = tokio::spawn(async move { agent.run(seed).await });

        let outcome = match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => return Err(SessionError::Worker(join_error.to_string())),
            Err(_) => {
                handle.abort();
                tracing::warn!("session deadline of {:?} passed; abandoning the run", self.timeout);
                return Err(SessionError::Timeout {
                    elapsed: started.elapsed(),
                    partial: handle.last_thought().map(|t| extract_artifact(&t, FINAL_ANSWER_MARKER)),
                });
            }
        };

        finish(outcome, self.model, &self.pricing, self.tier, started.elapsed())
    }
}

fn finish(
    outcome: LoopOutcome,
    model: String,
    pricing: &Model,
    tier: Option<ModelTier>,
    elapsed: Duration,
) -> Result<Artifact, SessionError> {
    let text = outcome
        .final_text()
        .map(|t| extract_artifact(&t, FINAL_ANSWER_MARKER));

    match outcome.status {
        LoopStatus::Done(completion) => Ok(Artifact {
            text: text.unwrap_or_default(),
            completion,
            model,
            tier,
            reasoning_steps: outcome.reasoning_steps,
            acting_steps: outcome.acting_steps,
            elapsed,
            cost: outcome.usage.calculate_cost(pricing).total,
            usage: outcome.usage,
        }),
        LoopStatus::Aborted(AbortReason::IterationLimit) => Err(SessionError::IterationLimit {
            steps: outcome.steps(),
            elapsed,
            partial: text,
        }),
        LoopStatus::Aborted(AbortReason::ModelFailure) => Err(SessionError::ModelFailure {
            message: outcome
                .failure
                .unwrap_or_else(|| "the model call failed".to_string()),
            elapsed,
            partial: text,
        }),
        LoopStatus::Aborted(AbortReason::Deadline | AbortReason::Cancelled) => {
            Err(SessionError::Timeout {
                elapsed,
                partial: text,
            })
        }
    }
}

fn resolve_target(target: &Path) -> Result<PathBuf, SessionError> {
    match std::fs::canonicalize(target) {
        Ok(root) if root.is_dir() => Ok(root),
        _ => Err(SessionError::Configuration(format!(
            "target '{}' is not a directory",
            target.display()
        ))),
    }
}

/// Tier model from the project size, or the default model when tier
/// selection is off or the project cannot be measured.
fn choose_model(root: &Path, settings: &Settings) -> (String, Option<ModelTier>) {
    if !settings.auto_tier {
        return (settings.model.clone(), None);
    }
    match sizing::measure(root, &IgnoreRules::for_root(root)) {
        Ok(size) => {
            let tier = sizing::select_tier(size);
            tracing::debug!(files = size.files, lines = size.lines, %tier, "measured project");
            (settings.tiers.model_for(tier).to_string(), Some(tier))
        }
        Err(e) => {
            tracing::warn!("could not measure project, using default model: {}", e);
            (settings.model.clone(), None)
        }
    }
}

fn style_guides(extra: &[PathBuf]) -> Result<Vec<Document>, SessionError> {
    let mut documents = vec![prompts::default_guide()];
    for path in extra {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Configuration(format!(
                "cannot read style guide '{}': {}",
                path.display(),
                e
            ))
        })?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(Document::new(text, source));
    }
    Ok(documents)
}

/// The document after the completion marker, trimmed, without a wrapping
/// code fence. Text without the marker is returned trimmed.
pub fn extract_artifact(text: &str, marker: &str) -> String {
    let body = match text.find(marker) {
        Some(idx) => &text[idx + marker.len()..],
        None => text,
    };
    strip_fence(body.trim()).to_string()
}

fn strip_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return body;
    };
    // Opening line may carry a language tag
    match inner.split_once('\n') {
        Some((tag, content)) if !tag.trim().contains(' ') => content.trim(),
        _ => body,
    }
}

//! The reason/act state machine

use std::time::{Duration, Instant};

use klaro_ai::{Message, Usage};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    conversation::ConversationState,
    error::Error,
    events::{AgentEvent, StepKind},
    executor::ToolExecutor,
    gateway::ModelGateway,
    handle::AgentHandle,
};

/// How a run reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// The response contained the completion marker
    Explicit,
    /// The response looked like a finished document but had no marker
    Heuristic,
}

/// Why a run ended in `Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    IterationLimit,
    Deadline,
    ModelFailure,
    Cancelled,
}

/// Where the loop goes after a reasoning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Reasoning,
    Acting,
    Done(CompletionKind),
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Done(CompletionKind),
    Aborted(AbortReason),
}

/// Rules for recognising a final answer.
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    /// Literal that marks the final answer
    pub marker: String,
    /// Accept marker-less responses that look like a finished document
    pub heuristic: bool,
    /// Minimum length for heuristic completion
    pub min_chars: usize,
    /// Minimum number of `## ` section headings for heuristic completion
    pub min_sections: usize,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            marker: "Final Answer:".to_string(),
            heuristic: true,
            min_chars: 300,
            min_sections: 2,
        }
    }
}

impl CompletionPolicy {
    /// Classify a model response. Tool requests always mean "not done yet"
    /// for the heuristic path; the explicit marker is checked first.
    pub fn detect(&self, thought: &Message) -> Option<CompletionKind> {
        let text = thought.text();
        if text.contains(&self.marker) {
            return Some(CompletionKind::Explicit);
        }
        if self.heuristic && thought.tool_calls().is_empty() && self.looks_finished(&text) {
            return Some(CompletionKind::Heuristic);
        }
        None
    }

    fn looks_finished(&self, text: &str) -> bool {
        if text.trim().chars().count() < self.min_chars {
            return false;
        }
        let mut has_title = false;
        let mut sections = 0;
        for line in text.lines().map(str::trim_start) {
            if line.starts_with("# ") {
                has_title = true;
            } else if line.starts_with("## ") {
                sections += 1;
            }
        }
        has_title && sections >= self.min_sections
    }
}

/// Routing after a reasoning step, in priority order: an outstanding error
/// sends the loop back to reasoning, then completion, then tool requests,
/// otherwise the model is still thinking.
pub fn decide_next_step(state: &ConversationState, policy: &CompletionPolicy) -> Route {
    if state.last_error().is_some() {
        return Route::Reasoning;
    }

    let Some(thought) = state.history().last().filter(|m| m.is_assistant()) else {
        return Route::Reasoning;
    };

    if let Some(kind) = policy.detect(thought) {
        return Route::Done(kind);
    }

    if !thought.tool_calls().is_empty() {
        return Route::Acting;
    }

    Route::Reasoning
}

/// Loop bounds
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Reasoning plus acting steps allowed
    pub max_iterations: u32,
    /// Wall-clock budget measured from loop start
    pub deadline: Option<Duration>,
    /// Gateway failures the loop feeds back to the model before aborting
    pub model_failure_budget: u32,
    /// Percentage of `max_iterations` at which a warning is raised
    pub warn_at_percent: u32,
    pub completion: CompletionPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            deadline: Some(Duration::from_secs(600)),
            model_failure_budget: 1,
            warn_at_percent: 95,
            completion: CompletionPolicy::default(),
        }
    }
}

/// Result of one run
#[derive(Debug)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    pub state: ConversationState,
    pub reasoning_steps: u32,
    pub acting_steps: u32,
    pub elapsed: Duration,
    pub usage: Usage,
    /// The failure behind `AbortReason::ModelFailure`
    pub failure: Option<String>,
}

impl LoopOutcome {
    pub fn steps(&self) -> u32 {
        self.reasoning_steps + self.acting_steps
    }

    /// Text of the final response when done, otherwise the newest text the
    /// model produced (best effort).
    pub fn final_text(&self) -> Option<String> {
        match self.status {
            LoopStatus::Done(_) => self.state.latest_thought().map(|m| m.text()),
            LoopStatus::Aborted(_) => self.state.latest_text(),
        }
    }
}

enum LoopState {
    Reasoning,
    Acting,
}

/// Drives one conversation from its seed to `Done` or `Aborted`.
pub struct AgentLoop {
    gateway: ModelGateway,
    executor: ToolExecutor,
    config: LoopConfig,
    event_tx: broadcast::Sender<AgentEvent>,
    handle: AgentHandle,
}

impl AgentLoop {
    pub fn new(gateway: ModelGateway, executor: ToolExecutor, config: LoopConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            gateway,
            executor,
            config,
            event_tx,
            handle: AgentHandle::new(),
        }
    }

    /// Subscribe to loop events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for stopping or inspecting the run from outside.
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Run until a terminal state. Never fails: every failure ends up either
    /// in the history or in the returned status.
    pub async fn run(&self, mut state: ConversationState) -> LoopOutcome {
        let started = Instant::now();
        let cancel = self.handle.cancel_token();
        self.handle.mark_running();
        let _ = self.event_tx.send(AgentEvent::LoopStart {
            max_iterations: self.config.max_iterations,
        });
        tracing::info!(
            max_iterations = self.config.max_iterations,
            deadline = ?self.config.deadline,
            "agent loop started"
        );

        let mut current = LoopState::Reasoning;
        let mut reasoning_steps = 0u32;
        let mut acting_steps = 0u32;
        let mut model_failures = 0u32;
        let mut warned = false;
        let mut usage = Usage::default();
        let mut failure = None;

        let status = loop {
            let steps = reasoning_steps + acting_steps;
            if steps >= self.config.max_iterations {
                tracing::warn!("iteration limit of {} reached", self.config.max_iterations);
                break LoopStatus::Aborted(AbortReason::IterationLimit);
            }
            if !warned && near_limit(&self.config, steps) {
                warned = true;
                tracing::warn!(
                    "{} of {} steps used; the run is close to its iteration limit",
                    steps,
                    self.config.max_iterations
                );
                let _ = self.event_tx.send(AgentEvent::NearIterationLimit {
                    steps,
                    max_iterations: self.config.max_iterations,
                });
            }
            if self
                .config
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
            {
                tracing::warn!("deadline of {:?} exceeded", self.config.deadline);
                break LoopStatus::Aborted(AbortReason::Deadline);
            }
            if cancel.is_cancelled() {
                break LoopStatus::Aborted(AbortReason::Cancelled);
            }

            match current {
                LoopState::Reasoning => {
                    reasoning_steps += 1;
                    self.emit_step(steps + 1, StepKind::Reasoning);

                    let invoked = self
                        .gateway
                        .invoke(state.history(), &cancel, &self.event_tx)
                        .await;
                    match invoked {
                        Ok(thought) => {
                            let route = record_thought_and_route(
                                &mut state,
                                thought,
                                &self.config.completion,
                            );
                            if let Some(thought) = state.latest_thought() {
                                if let Message::Assistant { metadata, .. } = thought {
                                    usage.accumulate(&metadata.usage);
                                }
                                self.handle.record_thought(&thought.text());
                                let _ = self.event_tx.send(AgentEvent::ThoughtEnd {
                                    message: thought.clone(),
                                });
                            }

                            match route {
                                Route::Done(kind) => {
                                    if kind == CompletionKind::Heuristic {
                                        tracing::warn!(
                                            marker = %self.config.completion.marker,
                                            "accepting an unmarked response that looks finished"
                                        );
                                    }
                                    let _ = self.event_tx.send(AgentEvent::Completed { kind });
                                    break LoopStatus::Done(kind);
                                }
                                Route::Acting => current = LoopState::Acting,
                                Route::Reasoning => {
                                    tracing::debug!("no action requested; reasoning again");
                                    current = LoopState::Reasoning;
                                }
                            }
                        }
                        Err(Error::Cancelled) => {
                            break LoopStatus::Aborted(AbortReason::Cancelled);
                        }
                        Err(e) => {
                            model_failures += 1;
                            let message = e.to_string();
                            if !e.is_recoverable()
                                || model_failures > self.config.model_failure_budget
                            {
                                tracing::error!("model failure is terminal: {}", message);
                                failure = Some(message);
                                break LoopStatus::Aborted(AbortReason::ModelFailure);
                            }

                            tracing::warn!(
                                "model failure, asking the model to replan: {}",
                                message
                            );
                            state.set_error(message.clone());
                            state.push_notice(failure_notice(&message));
                            let _ = self.event_tx.send(AgentEvent::Recovering { error: message });
                            current = LoopState::Reasoning;
                        }
                    }
                }
                LoopState::Acting => {
                    acting_steps += 1;
                    self.emit_step(steps + 1, StepKind::Acting);

                    let requests = state.pending_requests();
                    let observations = self
                        .executor
                        .execute(&requests, &cancel, &self.event_tx)
                        .await;

                    for failed in observations.iter().filter(|o| o.is_error) {
                        state.set_error(failed.content.clone());
                    }
                    if let Some(error) = state.last_error() {
                        let _ = self.event_tx.send(AgentEvent::Recovering {
                            error: error.to_string(),
                        });
                    }
                    state.push_observations(observations);

                    current = LoopState::Reasoning;
                }
            }
        };

        if let LoopStatus::Aborted(reason) = status {
            let _ = self.event_tx.send(AgentEvent::Aborted { reason });
        }

        let elapsed = started.elapsed();
        tracing::info!(
            ?status,
            reasoning_steps,
            acting_steps,
            elapsed_ms = elapsed.as_millis() as u64,
            "agent loop finished"
        );
        let _ = self.event_tx.send(AgentEvent::LoopEnd {
            reasoning_steps,
            acting_steps,
            total_usage: usage.clone(),
        });
        self.handle.mark_idle();

        LoopOutcome {
            status,
            state,
            reasoning_steps,
            acting_steps,
            elapsed,
            usage,
            failure,
        }
    }

    fn emit_step(&self, step: u32, kind: StepKind) {
        tracing::debug!(step, ?kind, "step");
        let _ = self.event_tx.send(AgentEvent::StepStart { step, kind });
    }
}

/// User-role notice telling the model its previous call failed
fn failure_notice(message: &str) -> String {
    format!(
        "Error: the previous model call failed ({}). Continue the task from where you left off.",
        message
    )
}

/// Whether the step about to start crosses the soft warning threshold.
fn near_limit(config: &LoopConfig, steps: u32) -> bool {
    (u64::from(steps) + 1) * 100
        >= u64::from(config.max_iterations) * u64::from(config.warn_at_percent)
}

/// Append a successful response and route on it. The error that routed the
/// loop here is cleared first: the model has now seen it.
fn record_thought_and_route(
    state: &mut ConversationState,
    thought: Message,
    policy: &CompletionPolicy,
) -> Route {
    state.clear_error();
    state.push_thought(thought);
    decide_next_step(state, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::{GatewayConfig, RetryConfig},
        testing::{ScriptedReply, ScriptedTransport},
        tool::{Tool, ToolError, ToolRegistry},
        transport::TurnConfig,
    };
    use async_trait::async_trait;
    use klaro_ai::{Content, ErrorKind, StreamOptions};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const README: &str = "# Demo\n\nA tiny demo.\n\n## Setup\n\npip install demo\n";

    struct EchoPathTool(&'static str, &'static str);

    #[async_trait]
    impl Tool for EchoPathTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { self.1: { "type": "string" } }
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, ToolError> {
            Ok(format!("{} -> {}", self.0, arguments))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(Arc::new(EchoPathTool("explore", "directory")))
            .with_tool(Arc::new(EchoPathTool("read", "file_path")))
    }

    fn build_loop(
        transport: Arc<ScriptedTransport>,
        config: LoopConfig,
        call_timeout: Duration,
    ) -> AgentLoop {
        let registry = Arc::new(registry());
        let turn = TurnConfig {
            system_prompt: None,
            tools: registry.api_tools(),
            model: klaro_ai::models::resolve_model("test", "http://localhost"),
            options: StreamOptions::default(),
        };
        let gateway = ModelGateway::new(
            transport,
            turn,
            GatewayConfig {
                call_timeout,
                retry: RetryConfig {
                    max_retries: 1,
                    initial_delay: Duration::ZERO,
                    max_delay: Duration::ZERO,
                    backoff_multiplier: 1.0,
                },
            },
        );
        let executor = ToolExecutor::new(registry, Duration::from_secs(5));
        AgentLoop::new(gateway, executor, config)
    }

    fn drain(rx: &mut broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn long_document() -> String {
        let mut doc = String::from("# Widget\n\nWidget renders widgets.\n\n## Setup\n\n");
        doc.push_str(&"Install the package and its dependencies. ".repeat(5));
        doc.push_str("\n\n## Usage\n\n");
        doc.push_str(&"Run the widget command against a directory. ".repeat(5));
        doc
    }

    // ===== Routing =====

    #[test]
    fn test_error_takes_priority_over_completion_marker() {
        let mut state = ConversationState::new("task");
        state.push_thought(Message::assistant_text(format!("Final Answer:\n{}", README)));
        state.set_error("Error: Tool 'read' timed out");
        assert_eq!(
            decide_next_step(&state, &CompletionPolicy::default()),
            Route::Reasoning
        );

        state.clear_error();
        assert_eq!(
            decide_next_step(&state, &CompletionPolicy::default()),
            Route::Done(CompletionKind::Explicit)
        );
    }

    #[test]
    fn test_error_takes_priority_over_tool_requests() {
        let mut state = ConversationState::new("task");
        state.push_thought(Message::assistant(vec![Content::tool_call(
            "c1",
            "explore",
            serde_json::json!({}),
        )]));
        state.set_error("boom");
        assert_eq!(
            decide_next_step(&state, &CompletionPolicy::default()),
            Route::Reasoning
        );
    }

    #[test]
    fn test_marker_beats_tool_requests() {
        let mut state = ConversationState::new("task");
        state.push_thought(Message::assistant(vec![
            Content::text("Final Answer:\n# Done"),
            Content::tool_call("c1", "explore", serde_json::json!({})),
        ]));
        assert_eq!(
            decide_next_step(&state, &CompletionPolicy::default()),
            Route::Done(CompletionKind::Explicit)
        );
    }

    #[test]
    fn test_plain_thought_routes_back_to_reasoning() {
        let mut state = ConversationState::new("task");
        state.push_thought(Message::assistant_text("I should look at main.py next."));
        assert_eq!(
            decide_next_step(&state, &CompletionPolicy::default()),
            Route::Reasoning
        );
    }

    #[test]
    fn test_heuristic_completion_needs_shape_and_length() {
        let policy = CompletionPolicy::default();
        assert_eq!(
            policy.detect(&Message::assistant_text(long_document())),
            Some(CompletionKind::Heuristic)
        );
        // Too short
        assert_eq!(policy.detect(&Message::assistant_text(README)), None);
        // No title
        let untitled = long_document().replacen("# Widget", "Widget", 1);
        assert_eq!(policy.detect(&Message::assistant_text(untitled)), None);

        let disabled = CompletionPolicy {
            heuristic: false,
            ..CompletionPolicy::default()
        };
        assert_eq!(disabled.detect(&Message::assistant_text(long_document())), None);
    }

    #[test]
    fn test_heuristic_ignored_when_tools_requested() {
        let thought = Message::assistant(vec![
            Content::text(long_document()),
            Content::tool_call("c1", "read", serde_json::json!({})),
        ]);
        assert_eq!(CompletionPolicy::default().detect(&thought), None);
    }

    // ===== Loop scenarios =====

    #[tokio::test]
    async fn test_explore_read_then_final_answer() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedReply::tool_call("c1", "explore", serde_json::json!({"directory": "."})),
            ScriptedReply::tool_call("c2", "read", serde_json::json!({"file_path": "main.py"})),
            ScriptedReply::text(format!("Final Answer:\n{}", README)),
        ]));
        let agent = build_loop(transport.clone(), LoopConfig::default(), Duration::from_secs(5));
        let mut rx = agent.subscribe();

        let outcome = agent.run(ConversationState::new("document it")).await;

        assert_eq!(outcome.status, LoopStatus::Done(CompletionKind::Explicit));
        assert_eq!(outcome.reasoning_steps, 3);
        assert_eq!(outcome.acting_steps, 2);
        assert!(outcome.final_text().unwrap().ends_with(README));
        assert!(outcome.state.observations_well_formed());
        // seed, thought, observation, thought, observation, final thought
        assert_eq!(outcome.state.history().len(), 6);
        assert_eq!(transport.seen_history_lengths(), vec![1, 3, 5]);

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(AgentEvent::LoopStart { .. })));
        assert!(matches!(events.last(), Some(AgentEvent::LoopEnd { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::Completed { kind: CompletionKind::Explicit }
        )));
        assert!(!agent.handle().is_running());
    }

    #[tokio::test]
    async fn test_multiple_requests_observed_in_order() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedReply::tool_calls(vec![
                ("c1", "read", serde_json::json!({"file_path": "a.py"})),
                ("c2", "explore", serde_json::json!({"directory": "src"})),
                ("c3", "read", serde_json::json!({"file_path": "b.py"})),
            ]),
            ScriptedReply::text("Final Answer:\n# X"),
        ]));
        let agent = build_loop(transport, LoopConfig::default(), Duration::from_secs(5));
        let outcome = agent.run(ConversationState::new("task")).await;

        let ids: Vec<String> = outcome
            .state
            .history()
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_never_finishing_model_stops_at_iteration_limit() {
        let transport = Arc::new(ScriptedTransport::repeating(ScriptedReply::text(
            "Still thinking about it.",
        )));
        let config = LoopConfig {
            max_iterations: 7,
            ..LoopConfig::default()
        };
        let agent = build_loop(transport.clone(), config, Duration::from_secs(5));
        let mut rx = agent.subscribe();

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::IterationLimit));
        assert_eq!(outcome.steps(), 7);
        assert_eq!(transport.calls(), 7);
        assert_eq!(outcome.final_text().as_deref(), Some("Still thinking about it."));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, AgentEvent::NearIterationLimit { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::Aborted { reason: AbortReason::IterationLimit }
        )));
    }

    #[tokio::test]
    async fn test_unknown_tool_every_turn_still_terminates() {
        let transport = Arc::new(ScriptedTransport::repeating(ScriptedReply::tool_call(
            "c1",
            "summon_docs",
            serde_json::json!({}),
        )));
        let config = LoopConfig {
            max_iterations: 10,
            ..LoopConfig::default()
        };
        let agent = build_loop(transport, config, Duration::from_secs(5));
        let mut rx = agent.subscribe();

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::IterationLimit));
        assert_eq!(outcome.reasoning_steps, 5);
        assert_eq!(outcome.acting_steps, 5);

        let recoveries = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, AgentEvent::Recovering { .. }))
            .count();
        assert_eq!(recoveries, 5);

        let observations: Vec<String> = outcome
            .state
            .history()
            .iter()
            .filter(|m| matches!(m, Message::ToolResult { .. }))
            .map(|m| m.text())
            .collect();
        assert_eq!(observations.len(), 5);
        assert!(observations.iter().all(|o| o.starts_with("Error:") && o.contains("summon_docs")));
    }

    #[tokio::test]
    async fn test_slow_model_aborts_with_model_failure() {
        let transport = Arc::new(ScriptedTransport::repeating(
            ScriptedReply::text("Final Answer:\n# late").delayed(Duration::from_secs(5)),
        ));
        let config = LoopConfig {
            model_failure_budget: 0,
            ..LoopConfig::default()
        };
        let agent = build_loop(transport, config, Duration::from_millis(20));

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::ModelFailure));
        assert!(outcome.failure.as_deref().unwrap().contains("timed out"));
        assert!(outcome.final_text().is_none());
    }

    #[tokio::test]
    async fn test_model_failure_within_budget_is_replanned() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedReply::error("API error: overloaded"),
            ScriptedReply::error("API error: overloaded"),
            ScriptedReply::text("Final Answer:\n# Recovered"),
        ]));
        let agent = build_loop(transport, LoopConfig::default(), Duration::from_secs(5));
        let mut rx = agent.subscribe();

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Done(CompletionKind::Explicit));
        assert_eq!(outcome.reasoning_steps, 2);
        assert!(outcome.state.last_error().is_none());
        // seed, failure notice, final thought
        let roles: Vec<_> = outcome.state.history().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["user", "user", "assistant"]);
        assert!(outcome.state.history()[1].text().starts_with("Error:"));
        assert!(drain(&mut rx).iter().any(|e| matches!(e, AgentEvent::Recovering { .. })));
    }

    #[tokio::test]
    async fn test_rejected_credentials_abort_without_replanning() {
        let transport = Arc::new(ScriptedTransport::repeating(ScriptedReply::failure(
            ErrorKind::Fatal,
            "Authentication failed: Incorrect API key provided",
        )));
        let agent = build_loop(transport.clone(), LoopConfig::default(), Duration::from_secs(5));

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::ModelFailure));
        assert_eq!(outcome.reasoning_steps, 1);
        assert_eq!(transport.calls(), 1);
        assert!(outcome.failure.as_deref().unwrap().contains("Incorrect API key"));
        assert_eq!(outcome.state.history().len(), 1);
    }

    #[test]
    fn test_warning_threshold_survives_huge_limits() {
        let config = LoopConfig {
            max_iterations: u32::MAX,
            ..LoopConfig::default()
        };
        assert!(!near_limit(&config, 0));
        assert!(near_limit(&config, u32::MAX - 1));
    }

    #[tokio::test]
    async fn test_heuristic_completion_is_reported_distinctly() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedReply::text(
            long_document(),
        )]));
        let agent = build_loop(transport, LoopConfig::default(), Duration::from_secs(5));
        let mut rx = agent.subscribe();

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Done(CompletionKind::Heuristic));
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            AgentEvent::Completed { kind: CompletionKind::Heuristic }
        )));
    }

    #[tokio::test]
    async fn test_deadline_aborts_between_steps() {
        let transport = Arc::new(ScriptedTransport::repeating(
            ScriptedReply::text("thinking").delayed(Duration::from_millis(30)),
        ));
        let config = LoopConfig {
            deadline: Some(Duration::from_millis(50)),
            ..LoopConfig::default()
        };
        let agent = build_loop(transport, config, Duration::from_secs(5));

        let outcome = agent.run(ConversationState::new("task")).await;

        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::Deadline));
        assert!(outcome.reasoning_steps >= 2);
        assert_eq!(outcome.final_text().as_deref(), Some("thinking"));
    }

    #[tokio::test]
    async fn test_abort_through_handle() {
        let transport = Arc::new(ScriptedTransport::repeating(
            ScriptedReply::text("thinking").delayed(Duration::from_secs(10)),
        ));
        let agent = Arc::new(build_loop(transport, LoopConfig::default(), Duration::from_secs(30)));
        let handle = agent.handle();

        let runner = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.run(ConversationState::new("task")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        let outcome = runner.await.unwrap();
        assert_eq!(outcome.status, LoopStatus::Aborted(AbortReason::Cancelled));
        assert!(!handle.is_running());
    }
}

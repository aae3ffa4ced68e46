//! Tool executor: turns tool requests into observations, never into errors

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    events::AgentEvent,
    tool::{ToolError, ToolObservation, ToolRegistry, ToolRequest},
};

/// Runs the tool requests of one model response.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, tool_timeout: Duration) -> Self {
        Self {
            registry,
            tool_timeout,
        }
    }

    /// Execute every request concurrently. Returns one observation per
    /// request, in request order.
    pub async fn execute(
        &self,
        requests: &[ToolRequest],
        cancel: &CancellationToken,
        events: &broadcast::Sender<AgentEvent>,
    ) -> Vec<ToolObservation> {
        let runs = requests.iter().map(|request| async move {
            let _ = events.send(AgentEvent::ToolExecutionStart {
                tool_call_id: request.id.clone(),
                tool_name: request.name.clone(),
                arguments: request.arguments.clone(),
            });

            let result = self.run_one(request, cancel).await;
            if let Err(ref e) = result {
                tracing::warn!(tool = %request.name, "tool call failed: {}", e);
            }
            let observation = ToolObservation::from_result(request, result);

            let _ = events.send(AgentEvent::ToolExecutionEnd {
                tool_call_id: observation.tool_call_id.clone(),
                tool_name: observation.tool_name.clone(),
                result: observation.content.clone(),
                is_error: observation.is_error,
            });
            observation
        });

        join_all(runs).await
    }

    async fn run_one(
        &self,
        request: &ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let tool = self.registry.resolve(&request.name)?;
        self.registry.validate(&request.name, &request.arguments)?;

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        // Spawned so a panicking tool becomes an observation instead of
        // taking the loop down with it.
        let arguments = request.arguments.clone();
        let token = cancel.child_token();
        let task = tokio::spawn(async move { tool.execute(arguments, token).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.tool_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_cancelled() => Err(ToolError::Cancelled),
            Ok(Err(join_error)) => Err(ToolError::Failed(format!(
                "Tool '{}' crashed: {}",
                request.name, join_error
            ))),
            Err(_) => {
                abort.abort();
                Err(ToolError::Timeout(self.tool_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ERROR_MARKER, Tool};
    use async_trait::async_trait;

    /// Sleeps for `millis` then echoes its tag.
    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Sleeps then echoes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tag": { "type": "string" },
                    "millis": { "type": "integer" }
                },
                "required": ["tag", "millis"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, ToolError> {
            let millis = arguments["millis"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(arguments["tag"].as_str().unwrap_or_default().to_string())
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<String, ToolError> {
            panic!("boom")
        }
    }

    fn executor(timeout: Duration) -> ToolExecutor {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(SleepyTool))
            .with_tool(Arc::new(PanickyTool));
        ToolExecutor::new(Arc::new(registry), timeout)
    }

    fn sleepy(id: &str, tag: &str, millis: u64) -> ToolRequest {
        ToolRequest::new(id, "sleepy", serde_json::json!({"tag": tag, "millis": millis}))
    }

    async fn run(executor: &ToolExecutor, requests: &[ToolRequest]) -> Vec<ToolObservation> {
        let (tx, _rx) = broadcast::channel(64);
        executor
            .execute(requests, &CancellationToken::new(), &tx)
            .await
    }

    #[tokio::test]
    async fn test_observations_keep_request_order() {
        // The first request finishes last.
        let requests = vec![
            sleepy("a", "first", 60),
            sleepy("b", "second", 0),
            sleepy("c", "third", 20),
        ];
        let observations = run(&executor(Duration::from_secs(5)), &requests).await;

        let ids: Vec<_> = observations.iter().map(|o| o.tool_call_id.as_str()).collect();
        let contents: Vec<_> = observations.iter().map(|o| o.content.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_observation() {
        let requests = vec![ToolRequest::new("x", "teleport", serde_json::json!({}))];
        let observations = run(&executor(Duration::from_secs(5)), &requests).await;

        assert_eq!(observations.len(), 1);
        assert!(observations[0].is_error);
        assert!(observations[0].content.starts_with(ERROR_MARKER));
        assert!(observations[0].content.contains("'teleport' not found"));
        assert!(observations[0].content.contains("sleepy"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_execution() {
        let requests = vec![ToolRequest::new("x", "sleepy", serde_json::json!({"tag": 1}))];
        let observations = run(&executor(Duration::from_secs(5)), &requests).await;
        assert!(observations[0].content.starts_with("Error: Invalid arguments"));
    }

    #[tokio::test]
    async fn test_slow_tool_times_out() {
        let requests = vec![sleepy("slow", "never", 5_000), sleepy("fast", "ok", 0)];
        let observations = run(&executor(Duration::from_millis(50)), &requests).await;

        assert!(observations[0].is_error);
        assert!(observations[0].content.contains("timed out"));
        assert!(!observations[1].is_error);
        assert_eq!(observations[1].content, "ok");
    }

    #[tokio::test]
    async fn test_panicking_tool_is_contained() {
        let requests = vec![ToolRequest::new("p", "panicky", serde_json::json!({}))];
        let observations = run(&executor(Duration::from_secs(5)), &requests).await;
        assert!(observations[0].is_error);
        assert!(observations[0].content.contains("crashed"));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancellation() {
        let (tx, _rx) = broadcast::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let observations = executor(Duration::from_secs(5))
            .execute(&[sleepy("a", "x", 0)], &cancel, &tx)
            .await;
        assert_eq!(observations[0].content, "Error: Tool execution cancelled");
    }

    #[tokio::test]
    async fn test_events_bracket_each_call() {
        let (tx, mut rx) = broadcast::channel(16);
        executor(Duration::from_secs(5))
            .execute(&[sleepy("a", "x", 0)], &CancellationToken::new(), &tx)
            .await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::ToolExecutionStart { ref tool_name, .. } if tool_name == "sleepy"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::ToolExecutionEnd { is_error: false, .. }
        ));
    }
}

use crate::config::Settings;
use crate::error::{StepFailure, WorkflowError};
use crate::executor::StepExecutor;
use chainflow_protocol::{WorkflowRequest, WorkflowResult};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs workflows: steps in order, each step's text feeding the next
#[derive(Clone)]
pub struct WorkflowEngine {
    executor: StepExecutor,
}

impl WorkflowEngine {
    /// Create an engine over `executor`
    pub fn new(executor: StepExecutor) -> Self {
        Self { executor }
    }

    /// Create an engine over the real backend clients
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self, StepFailure> {
        Ok(Self::new(StepExecutor::new(settings)?))
    }

    /// The executor steps are dispatched through
    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    /// Execute `request` to completion.
    ///
    /// Either every step succeeds and one result per step is returned, or
    /// the first failing step is reported and nothing else is.
    pub async fn run(&self, request: &WorkflowRequest) -> Result<WorkflowResult, WorkflowError> {
        self.run_until(request, std::future::pending::<()>()).await
    }

    /// Execute `request`, aborting the in-flight step once `signal` resolves.
    ///
    /// The aborted step's future is dropped, which releases its connection.
    #[instrument(skip(self, request, signal), fields(steps = request.steps.len()))]
    pub async fn run_until<S>(
        &self,
        request: &WorkflowRequest,
        signal: S,
    ) -> Result<WorkflowResult, WorkflowError>
    where
        S: Future<Output = ()>,
    {
        validate(request)?;
        tokio::pin!(signal);

        let mut context = request.input.clone();
        let mut results = Vec::with_capacity(request.steps.len());

        for (step_index, step) in request.steps.iter().enumerate() {
            info!(step_index, step = %step.name, "Executing step");

            let outcome = tokio::select! {
                biased;
                _ = &mut signal => {
                    warn!(step_index, step = %step.name, "Workflow cancelled");
                    return Err(WorkflowError::Cancelled {
                        step_index,
                        step_name: step.name.clone(),
                    });
                }
                outcome = self.executor.execute(step, &context) => outcome,
            };

            let result = outcome.map_err(|source| {
                error!(step_index, step = %step.name, kind = source.source.kind(), "Step failed: {}", source.source);
                WorkflowError::Step {
                    step_index,
                    step_name: step.name.clone(),
                    source,
                }
            })?;

            context = result.continuation();
            results.push(result);
        }

        info!(steps = results.len(), "Workflow completed");
        Ok(WorkflowResult { results })
    }
}

/// Reject requests that cannot run before anything is sent
pub fn validate(request: &WorkflowRequest) -> Result<(), WorkflowError> {
    if request.steps.is_empty() {
        return Err(WorkflowError::InvalidRequest(
            "workflow has no steps".to_string(),
        ));
    }

    for (index, step) in request.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest(format!(
                "step {index} has no name"
            )));
        }
        if step.remote_agent.is_some() && step.explicit_target().is_some() {
            return Err(WorkflowError::InvalidRequest(format!(
                "step '{}' sets both target and remote_agent",
                step.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingAgents, RecordingChat};
    use chainflow_protocol::{Role, SeedMessage, StepDefinition};
    use pretty_assertions::assert_eq;

    fn engine(chat: Arc<RecordingChat>) -> WorkflowEngine {
        let executor = StepExecutor::with_backends(
            Arc::new(Settings::default()),
            chat,
            Arc::new(RecordingAgents::default()),
        );
        WorkflowEngine::new(executor)
    }

    fn request(names: &[&str], input: &str) -> WorkflowRequest {
        WorkflowRequest {
            steps: names.iter().map(|n| StepDefinition::new(*n)).collect(),
            input: input.to_string(),
        }
    }

    #[tokio::test]
    async fn every_step_yields_one_result_in_order() -> anyhow::Result<()> {
        let chat = Arc::new(RecordingChat::tagging());
        let result = engine(chat.clone())
            .run(&request(&["draft", "review", "polish"], "start"))
            .await?;

        let names: Vec<&str> = result.results.iter().map(|r| r.step_name.as_str()).collect();
        assert_eq!(names, vec!["draft", "review", "polish"]);
        assert_eq!(result.final_text().as_deref(), Some("start->0->1->2"));
        assert_eq!(chat.calls().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn failing_step_aborts_the_run() {
        let chat = Arc::new(RecordingChat::failing_at(1));
        let err = engine(chat.clone())
            .run(&request(&["a", "b", "c"], "in"))
            .await
            .err();

        match err {
            Some(WorkflowError::Step {
                step_index,
                step_name,
                source,
            }) => {
                assert_eq!(step_index, 1);
                assert_eq!(step_name, "b");
                assert_eq!(source.step_name, "b");
                assert!(matches!(source.source, StepFailure::Backend { status: 500, .. }));
            }
            other => panic!("expected step failure, got {other:?}"),
        }
        // Step "c" never ran
        assert_eq!(chat.calls().len(), 2);
    }

    #[tokio::test]
    async fn context_threads_without_leaking_seeds() -> anyhow::Result<()> {
        let chat = Arc::new(RecordingChat::replying("T"));
        let request = WorkflowRequest {
            steps: vec![
                StepDefinition::new("s1").with_seed(SeedMessage::new(Role::System, "first seed")),
                StepDefinition::new("s2").with_seed(SeedMessage::new(Role::System, "second seed")),
            ],
            input: "go".to_string(),
        };
        engine(chat.clone()).run(&request).await?;

        let calls = chat.calls();
        let second: Vec<String> = calls[1].request.messages.iter().map(|m| m.text()).collect();
        assert_eq!(second, vec!["second seed", "T"]);
        assert_eq!(calls[1].request.messages[1].role, Role::User);
        Ok(())
    }

    #[tokio::test]
    async fn empty_response_becomes_empty_context() -> anyhow::Result<()> {
        let chat = Arc::new(RecordingChat::replying(""));
        let result = engine(chat.clone()).run(&request(&["a", "b"], "x")).await?;

        assert_eq!(result.results.len(), 2);
        assert_eq!(chat.calls()[1].request.messages[0].text(), "");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_execution() {
        let chat = Arc::new(RecordingChat::replying("unused"));
        let engine = engine(chat.clone());

        let empty = request(&[], "x");
        assert!(matches!(
            engine.run(&empty).await,
            Err(WorkflowError::InvalidRequest(_))
        ));

        let unnamed = request(&["ok", " "], "x");
        assert!(matches!(
            engine.run(&unnamed).await,
            Err(WorkflowError::InvalidRequest(msg)) if msg == "step 1 has no name"
        ));

        let both = WorkflowRequest {
            steps: vec![StepDefinition::remote_agent("mixed", "a/b").with_target("http://x")],
            input: "x".to_string(),
        };
        assert!(matches!(
            engine.run(&both).await,
            Err(WorkflowError::InvalidRequest(msg)) if msg.contains("both")
        ));

        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_step() {
        let chat = Arc::new(RecordingChat::hanging());
        let err = engine(chat.clone())
            .run_until(
                &request(&["slow", "never"], "x"),
                tokio::time::sleep(std::time::Duration::from_millis(50)),
            )
            .await
            .err();

        assert!(matches!(
            err,
            Some(WorkflowError::Cancelled { step_index: 0, ref step_name }) if step_name == "slow"
        ));
        assert_eq!(chat.calls().len(), 1);
    }
}

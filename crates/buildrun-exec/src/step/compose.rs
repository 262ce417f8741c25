use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use buildrun_core::Outcome;

use super::{Step, StepResult};
use crate::BackendError;

/// Runs `a` to completion, then `b` against `a`'s result.
///
/// Composition never gates: `b` runs whatever `a` reported. Gating is the
/// job of a conditional step in `b`'s position. The composed outcome is the
/// more severe of the two.
pub struct ComposeStep {
    a: Box<dyn Step>,
    b: Box<dyn Step>,
    result: Option<StepResult>,
}

impl ComposeStep {
    pub fn new(a: Box<dyn Step>, b: Box<dyn Step>) -> Self {
        Self { a, b, result: None }
    }
}

#[async_trait]
impl Step for ComposeStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let a_outcome = self.a.run(upstream, cancel).await;
        let a_result = self
            .a
            .result()
            .cloned()
            .unwrap_or_else(|| StepResult::new(a_outcome.clone(), upstream.artifacts.clone()));

        let b_outcome = self.b.run(&a_result, cancel).await;
        let artifacts = self
            .b
            .result()
            .map(|r| r.artifacts.clone())
            .unwrap_or(a_result.artifacts);

        let outcome = a_outcome.worst(b_outcome);
        self.result = Some(StepResult::new(outcome.clone(), artifacts));
        outcome
    }

    async fn release(&mut self) -> Result<(), BackendError> {
        let a = self.a.release().await;
        let b = self.b.release().await;

        if let Err(e) = &a {
            warn!(error = %e, "failed to release first composed step");
        }
        b.and(a)
    }

    fn result(&self) -> Option<&StepResult> {
        self.result.as_ref()
    }

    fn kind(&self) -> &'static str {
        "compose"
    }

    fn children(&self) -> Vec<&dyn Step> {
        vec![self.a.as_ref(), self.b.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, FakeBackend, RecordingDelegate, TaskScript};
    use crate::{BuildDelegate, ConfigSource, ExecuteStep, IdentityStep};
    use buildrun_core::{SessionKey, StepRole, TaskConfig};
    use std::sync::Arc;
    use tracing::Span;

    fn task(backend: &Arc<FakeBackend>, path: &str) -> Box<dyn Step> {
        Box::new(ExecuteStep::new(
            SessionKey::derive("build", &"1".into(), &StepRole::Execute),
            RecordingDelegate::new().execution_delegate(),
            false,
            ConfigSource::Static(TaskConfig::new(path).with_output(path.trim_start_matches("./"))),
            backend.clone(),
            Span::none(),
        ))
    }

    #[tokio::test]
    async fn test_b_starts_after_a_returns() {
        let backend = FakeBackend::new_shared();
        let mut step = ComposeStep::new(task(&backend, "./a"), task(&backend, "./b"));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Succeeded);

        let calls = backend.calls();
        let a_done = calls
            .iter()
            .position(|c| matches!(c, BackendCall::TaskFinished { path, .. } if path == "./a"))
            .unwrap();
        let b_started = calls
            .iter()
            .position(|c| matches!(c, BackendCall::TaskStarted { path, .. } if path == "./b"))
            .unwrap();
        assert!(a_done < b_started);
    }

    #[tokio::test]
    async fn test_b_runs_after_a_fails() {
        let backend = FakeBackend::new_shared();
        backend.script_task("./a", TaskScript::Exit(2));
        let mut step = ComposeStep::new(task(&backend, "./a"), task(&backend, "./b"));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Failed("exit status 2".into()));
        assert_eq!(backend.tasks_started(), 2);
    }

    #[tokio::test]
    async fn test_b_sees_a_artifacts() {
        let backend = FakeBackend::new_shared();
        let mut step = ComposeStep::new(task(&backend, "./a"), Box::new(IdentityStep::new()));

        step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert!(step.result().unwrap().artifacts.contains("a"));
    }

    #[tokio::test]
    async fn test_release_releases_both() {
        let backend = FakeBackend::new_shared();
        backend.fail_release("build-1-execute");
        let mut step = ComposeStep::new(task(&backend, "./a"), task(&backend, "./b"));
        step.run(&StepResult::initial(), &CancellationToken::new()).await;

        assert!(step.release().await.is_err());
        assert_eq!(backend.releases().len(), 2);
    }
}

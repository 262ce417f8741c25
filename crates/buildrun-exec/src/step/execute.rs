use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use buildrun_core::{Outcome, SessionKey};

use super::{Step, StepResult};
use crate::{Backend, BackendError, ConfigSource, ExecutionDelegate, TaskRequest};

/// Runs a task in the build's container.
///
/// A non-zero exit status is a failure; anything that keeps the task from
/// running (config, worker, backend) is an error.
pub struct ExecuteStep {
    session: SessionKey,
    delegate: Arc<dyn ExecutionDelegate>,
    privileged: bool,
    config_source: ConfigSource,
    backend: Arc<dyn Backend>,
    span: Span,
    acquired: bool,
    result: Option<StepResult>,
}

impl ExecuteStep {
    pub fn new(
        session: SessionKey,
        delegate: Arc<dyn ExecutionDelegate>,
        privileged: bool,
        config_source: ConfigSource,
        backend: Arc<dyn Backend>,
        span: Span,
    ) -> Self {
        Self {
            session,
            delegate,
            privileged,
            config_source,
            backend,
            span,
            acquired: false,
            result: None,
        }
    }

    async fn execute(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let mut artifacts = upstream.artifacts.clone();

        let config = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Aborted,
            config = self.config_source.fetch(self.backend.as_ref(), &artifacts) => config,
        };
        let config = match config.and_then(|c| c.validate().map(|_| c).map_err(BackendError::from)) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load task config");
                self.delegate.failed(&e);
                return Outcome::Errored(e.to_string());
            }
        };

        self.delegate.initializing(&config);

        let request = TaskRequest {
            config,
            privileged: self.privileged,
            inputs: artifacts.clone(),
        };

        self.acquired = true;
        self.delegate.started();
        info!(session = %self.session, privileged = self.privileged, "running task");

        let exit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(session = %self.session, "task interrupted");
                return Outcome::Aborted;
            }
            exit = self.backend.run_task(&self.session, request) => exit,
        };

        match exit {
            Ok(exit) => {
                info!(exit_status = exit.status, "task exited");
                self.delegate.finished(exit.status);
                for output in exit.outputs {
                    artifacts.insert(output);
                }
                let outcome = if exit.status == 0 {
                    Outcome::Succeeded
                } else {
                    Outcome::Failed(format!("exit status {}", exit.status))
                };
                self.result = Some(StepResult::new(outcome.clone(), artifacts));
                outcome
            }
            Err(e) => {
                warn!(error = %e, "task errored");
                self.delegate.failed(&e);
                Outcome::Errored(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Step for ExecuteStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let span = self.span.clone();
        let outcome = self.execute(upstream, cancel).instrument(span).await;
        if self.result.is_none() {
            self.result = Some(StepResult::new(outcome.clone(), upstream.artifacts.clone()));
        }
        outcome
    }

    async fn release(&mut self) -> Result<(), BackendError> {
        if !std::mem::take(&mut self.acquired) {
            return Ok(());
        }
        self.backend.release(&self.session).await
    }

    fn result(&self) -> Option<&StepResult> {
        self.result.as_ref()
    }

    fn kind(&self) -> &'static str {
        "execute"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DelegateEvent, FakeBackend, RecordingDelegate, TaskScript};
    use crate::BuildDelegate;
    use buildrun_core::{StepRole, TaskConfig};

    fn step(backend: &Arc<FakeBackend>, delegate: &RecordingDelegate, source: ConfigSource) -> ExecuteStep {
        ExecuteStep::new(
            SessionKey::derive("build", &"9".into(), &StepRole::Execute),
            delegate.execution_delegate(),
            true,
            source,
            backend.clone(),
            Span::none(),
        )
    }

    #[tokio::test]
    async fn test_exit_status_maps_to_outcome() {
        let backend = FakeBackend::new_shared();
        backend.script_task("./test.sh", TaskScript::Exit(3));
        let delegate = RecordingDelegate::new();
        let mut step = step(&backend, &delegate, ConfigSource::Static(TaskConfig::new("./test.sh")));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Failed("exit status 3".into()));
        assert!(delegate.events().contains(&DelegateEvent::TaskFinished(3)));
        assert_eq!(backend.privileged_runs(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_errored() {
        let backend = FakeBackend::new_shared();
        backend.script_task("./test.sh", TaskScript::Error("worker stalled".into()));
        let delegate = RecordingDelegate::new();
        let mut step = step(&backend, &delegate, ConfigSource::Static(TaskConfig::new("./test.sh")));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Errored(ref msg) if msg.contains("worker stalled")));
        assert!(matches!(delegate.events().last(), Some(DelegateEvent::TaskFailed(_))));

        // the container may exist even though the run failed
        step.release().await.unwrap();
        assert_eq!(backend.releases(), vec!["build-9-execute".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_config_is_errored_without_acquiring() {
        let backend = FakeBackend::new_shared();
        let delegate = RecordingDelegate::new();
        let mut step = step(&backend, &delegate, ConfigSource::Static(TaskConfig::default()));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Errored(ref msg) if msg.contains("run.path")));
        assert_eq!(backend.tasks_started(), 0);

        step.release().await.unwrap();
        assert!(backend.releases().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_task() {
        let backend = FakeBackend::new_shared();
        backend.script_task("./forever", TaskScript::Block);
        let delegate = RecordingDelegate::new();
        let mut step = step(&backend, &delegate, ConfigSource::Static(TaskConfig::new("./forever")));

        let cancel = CancellationToken::new();
        let (waiter, canceller) = (backend.clone(), cancel.clone());
        tokio::spawn(async move {
            waiter.wait_for_tasks_started(1).await;
            canceller.cancel();
        });

        let outcome = step.run(&StepResult::initial(), &cancel).await;
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(step.result().unwrap().outcome, Outcome::Aborted);

        step.release().await.unwrap();
        step.release().await.unwrap();
        assert_eq!(backend.releases().len(), 1);
    }

    #[tokio::test]
    async fn test_delegate_sees_lifecycle() {
        let backend = FakeBackend::new_shared();
        let delegate = RecordingDelegate::new();
        let mut step = step(&backend, &delegate, ConfigSource::Static(TaskConfig::new("./ok")));

        step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(
            delegate.events(),
            vec![
                DelegateEvent::TaskInitializing("./ok".into()),
                DelegateEvent::TaskStarted,
                DelegateEvent::TaskFinished(0),
            ]
        );
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use buildrun_core::{Outcome, Params, SessionKey, Version};

use super::{Step, StepResult};
use crate::{Backend, BackendError, FetchRequest, InputDelegate, ResourceConfig};

/// Fetches a resource version into an artifact named after the get.
pub struct GetStep {
    session: SessionKey,
    delegate: Arc<dyn InputDelegate>,
    name: String,
    resource: ResourceConfig,
    params: Params,
    version: Option<Version>,
    backend: Arc<dyn Backend>,
    span: Span,
    acquired: bool,
    result: Option<StepResult>,
}

impl GetStep {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: SessionKey,
        delegate: Arc<dyn InputDelegate>,
        name: impl Into<String>,
        resource: ResourceConfig,
        params: Params,
        version: Option<Version>,
        backend: Arc<dyn Backend>,
        span: Span,
    ) -> Self {
        Self {
            session,
            delegate,
            name: name.into(),
            resource,
            params,
            version,
            backend,
            span,
            acquired: false,
            result: None,
        }
    }

    async fn fetch(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Aborted;
        }

        let request = FetchRequest {
            name: self.name.clone(),
            resource: self.resource.clone(),
            params: self.params.clone(),
            version: self.version.clone(),
        };

        self.acquired = true;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Aborted,
            fetched = self.backend.fetch(&self.session, request) => fetched,
        };

        match fetched {
            Ok(fetched) => {
                info!(version = ?fetched.info.version, "fetched");
                self.delegate.completed(&fetched.info);

                let mut artifacts = upstream.artifacts.clone();
                artifacts.insert(fetched.artifact);
                self.result = Some(StepResult::new(Outcome::Succeeded, artifacts));
                Outcome::Succeeded
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch");
                self.delegate.failed(&e);
                Outcome::Errored(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Step for GetStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let span = self.span.clone();
        let outcome = self.fetch(upstream, cancel).instrument(span).await;
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
        "get"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, DelegateEvent, FakeBackend, RecordingDelegate};
    use crate::BuildDelegate;
    use buildrun_core::{GetPlan, StepRole};

    fn get_step(backend: &Arc<FakeBackend>, delegate: &RecordingDelegate, version: Option<Version>) -> GetStep {
        let plan = GetPlan::new("repo", "git");
        GetStep::new(
            SessionKey::derive("build", &"3".into(), &StepRole::Input("repo".into())),
            delegate.input_delegate(&plan),
            "repo",
            ResourceConfig {
                name: "repo".into(),
                resource_type: "git".into(),
                ..Default::default()
            },
            Params::new(),
            version,
            backend.clone(),
            Span::none(),
        )
    }

    #[tokio::test]
    async fn test_fetch_adds_artifact() {
        let backend = FakeBackend::new_shared();
        let delegate = RecordingDelegate::new();
        let pinned = Version::from([("ref".to_string(), "abc".to_string())]);
        let mut step = get_step(&backend, &delegate, Some(pinned.clone()));

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Succeeded);

        let artifact = step.result().unwrap().artifacts.get("repo").unwrap().clone();
        assert_eq!(artifact.version, Some(pinned.clone()));
        assert_eq!(
            backend.calls()[0],
            BackendCall::Fetch {
                session: "build-3-input-repo".into(),
                resource: "repo".into(),
                version: Some(pinned),
            }
        );
        assert_eq!(delegate.events(), vec![DelegateEvent::InputCompleted("repo".into())]);
    }

    #[tokio::test]
    async fn test_fetch_error_is_errored() {
        let backend = FakeBackend::new_shared();
        backend.fail_resource("repo", "no route to worker");
        let delegate = RecordingDelegate::new();
        let mut step = get_step(&backend, &delegate, None);

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Errored(_)));
        assert!(matches!(delegate.events()[0], DelegateEvent::InputFailed(_)));
        assert!(!step.result().unwrap().artifacts.contains("repo"));
    }

    #[tokio::test]
    async fn test_cancelled_before_run_acquires_nothing() {
        let backend = FakeBackend::new_shared();
        let delegate = RecordingDelegate::new();
        let mut step = get_step(&backend, &delegate, None);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(step.run(&StepResult::initial(), &cancel).await, Outcome::Aborted);

        step.release().await.unwrap();
        assert!(backend.calls().is_empty());
    }
}

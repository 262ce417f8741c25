use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use buildrun_core::{Outcome, Params, SessionKey};

use super::{Step, StepResult};
use crate::{Artifact, Backend, BackendError, OutputDelegate, PublishRequest, ResourceConfig};

/// Publishes params to a resource and reports the created version as an
/// artifact named after the resource.
pub struct PutStep {
    session: SessionKey,
    delegate: Arc<dyn OutputDelegate>,
    resource: ResourceConfig,
    params: Params,
    backend: Arc<dyn Backend>,
    span: Span,
    acquired: bool,
    result: Option<StepResult>,
}

impl PutStep {
    pub fn new(
        session: SessionKey,
        delegate: Arc<dyn OutputDelegate>,
        resource: ResourceConfig,
        params: Params,
        backend: Arc<dyn Backend>,
        span: Span,
    ) -> Self {
        Self {
            session,
            delegate,
            resource,
            params,
            backend,
            span,
            acquired: false,
            result: None,
        }
    }

    async fn publish(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Aborted;
        }

        let request = PublishRequest {
            resource: self.resource.clone(),
            params: self.params.clone(),
            inputs: upstream.artifacts.clone(),
        };

        self.acquired = true;
        let published = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Aborted,
            published = self.backend.publish(&self.session, request) => published,
        };

        match published {
            Ok(info) => {
                info!(version = ?info.version, "published");
                self.delegate.completed(&info);

                let mut artifacts = upstream.artifacts.clone();
                artifacts.insert(
                    Artifact::new(self.resource.name.clone()).with_version(info.version),
                );
                self.result = Some(StepResult::new(Outcome::Succeeded, artifacts));
                Outcome::Succeeded
            }
            Err(e) => {
                warn!(error = %e, "failed to publish");
                self.delegate.failed(&e);
                Outcome::Errored(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Step for PutStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let span = self.span.clone();
        let outcome = self.publish(upstream, cancel).instrument(span).await;
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
        "put"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, DelegateEvent, FakeBackend, RecordingDelegate};
    use crate::BuildDelegate;
    use buildrun_core::{PutPlan, StepRole};

    #[tokio::test]
    async fn test_publish_reports_version_artifact() {
        let backend = FakeBackend::new_shared();
        let delegate = RecordingDelegate::new();
        let mut step = PutStep::new(
            SessionKey::derive("build", &"5".into(), &StepRole::Output("release".into())),
            delegate.output_delegate(&PutPlan::new("release", "s3")),
            ResourceConfig {
                name: "release".into(),
                resource_type: "s3".into(),
                ..Default::default()
            },
            Params::new(),
            backend.clone(),
            Span::none(),
        );

        let outcome = step.run(&StepResult::initial(), &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Succeeded);

        let artifact = step.result().unwrap().artifacts.get("release").unwrap();
        assert!(artifact.version.is_some());
        assert_eq!(
            backend.calls()[0],
            BackendCall::Publish {
                session: "build-5-output-release".into(),
                resource: "release".into(),
            }
        );
        assert_eq!(delegate.events(), vec![DelegateEvent::OutputCompleted("release".into())]);

        step.release().await.unwrap();
        assert_eq!(backend.releases(), vec!["build-5-output-release".to_string()]);
    }
}

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use buildrun_core::Outcome;

use super::{Step, StepResult};
use crate::BackendError;

/// A step that does nothing and succeeds, passing its upstream artifacts on.
#[derive(Debug, Default)]
pub struct IdentityStep {
    result: Option<StepResult>,
}

impl IdentityStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step for IdentityStep {
    async fn run(&mut self, upstream: &StepResult, _cancel: &CancellationToken) -> Outcome {
        self.result = Some(StepResult::new(
            Outcome::Succeeded,
            upstream.artifacts.clone(),
        ));
        Outcome::Succeeded
    }

    async fn release(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn result(&self) -> Option<&StepResult> {
        self.result.as_ref()
    }

    fn kind(&self) -> &'static str {
        "identity"
    }
}

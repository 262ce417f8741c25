use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument, Span};

use buildrun_core::{Outcome, OutcomeKind};

use super::{Step, StepResult};
use crate::BackendError;

/// Runs its inner step only if the preceding outcome is accepted.
///
/// When skipped it reports [`Outcome::Skipped`], which composes as success,
/// and passes its upstream artifacts through.
pub struct ConditionalStep {
    conditions: Vec<OutcomeKind>,
    step: Box<dyn Step>,
    span: Span,
    result: Option<StepResult>,
}

impl ConditionalStep {
    pub fn new(conditions: Vec<OutcomeKind>, step: Box<dyn Step>, span: Span) -> Self {
        Self {
            conditions,
            step,
            span,
            result: None,
        }
    }

    fn accepts(&self, outcome: &Outcome) -> bool {
        self.conditions.contains(&outcome.kind())
    }
}

#[async_trait]
impl Step for ConditionalStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        if !self.accepts(&upstream.outcome) {
            info!(parent: &self.span, upstream = %upstream.outcome, "conditions not met, skipping");
            self.result = Some(StepResult::new(
                Outcome::Skipped,
                upstream.artifacts.clone(),
            ));
            return Outcome::Skipped;
        }

        let span = self.span.clone();
        let outcome = self.step.run(upstream, cancel).instrument(span).await;
        self.result = Some(
            self.step
                .result()
                .cloned()
                .unwrap_or_else(|| StepResult::new(outcome.clone(), upstream.artifacts.clone())),
        );
        outcome
    }

    async fn release(&mut self) -> Result<(), BackendError> {
        self.step.release().await
    }

    fn result(&self) -> Option<&StepResult> {
        self.result.as_ref()
    }

    fn kind(&self) -> &'static str {
        "conditional"
    }

    fn children(&self) -> Vec<&dyn Step> {
        vec![self.step.as_ref()]
    }
}

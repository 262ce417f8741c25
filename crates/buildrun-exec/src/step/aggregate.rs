use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use buildrun_core::Outcome;

use super::{Step, StepResult};
use crate::BackendError;

/// Runs every child concurrently and waits for all of them.
///
/// The aggregate's outcome is the most severe of its children's; its
/// artifacts are the union of theirs.
pub struct AggregateStep {
    children: BTreeMap<String, Box<dyn Step>>,
    span: Span,
    result: Option<StepResult>,
}

impl AggregateStep {
    pub fn new(children: BTreeMap<String, Box<dyn Step>>, span: Span) -> Self {
        Self {
            children,
            span,
            result: None,
        }
    }

    /// Names of the children, in run order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

#[async_trait]
impl Step for AggregateStep {
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome {
        let span = self.span.clone();

        let runs = self.children.iter_mut().map(|(name, step)| async move {
            let outcome = step.run(upstream, cancel).await;
            debug!(child = %name, outcome = %outcome, "aggregate child finished");
            outcome
        });
        let outcomes = join_all(runs).instrument(span).await;

        let outcome = outcomes
            .into_iter()
            .fold(Outcome::Succeeded, |acc, outcome| acc.worst(outcome));

        let mut artifacts = upstream.artifacts.clone();
        for step in self.children.values() {
            if let Some(result) = step.result() {
                artifacts.merge(&result.artifacts);
            }
        }

        self.result = Some(StepResult::new(outcome.clone(), artifacts));
        outcome
    }

    async fn release(&mut self) -> Result<(), BackendError> {
        let span = self.span.clone();
        let mut last_err = None;
        for (name, step) in self.children.iter_mut() {
            if let Err(e) = step.release().await {
                warn!(parent: &span, child = %name, error = %e, "failed to release aggregate child");
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn result(&self) -> Option<&StepResult> {
        self.result.as_ref()
    }

    fn kind(&self) -> &'static str {
        "aggregate"
    }

    fn children(&self) -> Vec<&dyn Step> {
        self.children.values().map(|s| s.as_ref()).collect()
    }
}

//! The step abstraction and its variants.

mod aggregate;
mod compose;
mod conditional;
mod execute;
mod get;
mod identity;
mod put;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use buildrun_core::Outcome;

use crate::{ArtifactSet, BackendError};

pub use aggregate::AggregateStep;
pub use compose::ComposeStep;
pub use conditional::ConditionalStep;
pub use execute::ExecuteStep;
pub use get::GetStep;
pub use identity::IdentityStep;
pub use put::PutStep;

/// What a step left behind: its outcome and every artifact visible after it
/// ran (its upstream's plus its own).
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub outcome: Outcome,
    pub artifacts: ArtifactSet,
}

impl StepResult {
    pub fn new(outcome: Outcome, artifacts: ArtifactSet) -> Self {
        Self { outcome, artifacts }
    }

    /// Upstream of the root step: nothing produced, nothing failed.
    pub fn initial() -> Self {
        Self::new(Outcome::Succeeded, ArtifactSet::new())
    }
}

/// A runnable node of a step tree.
///
/// A step is run once and released once, whatever the outcome of the run.
/// Cancellation is cooperative: a step checks `cancel` at each blocking
/// operation and reports [`Outcome::Aborted`] when it fires.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step against the result of the step before it.
    async fn run(&mut self, upstream: &StepResult, cancel: &CancellationToken) -> Outcome;

    /// Release everything the step acquired. A no-op if nothing was.
    async fn release(&mut self) -> Result<(), BackendError>;

    /// Result of the run, once it has returned.
    fn result(&self) -> Option<&StepResult>;

    /// Short name of the variant, e.g. `compose`.
    fn kind(&self) -> &'static str;

    /// Children in run order, for composite steps.
    fn children(&self) -> Vec<&dyn Step> {
        Vec::new()
    }
}

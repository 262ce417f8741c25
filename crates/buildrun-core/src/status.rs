//! Outcomes of steps and statuses of builds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a step (or a whole step tree) completed.
///
/// `Failed` is a business-level failure (a task exited non-zero), `Errored` is
/// infrastructural (a worker could not be reached, a config could not be
/// loaded). Conditional steps gate on that distinction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The step's work completed successfully.
    Succeeded,
    /// A conditional step whose predecessor did not satisfy it.
    Skipped,
    /// The step's work completed with a failure.
    Failed(String),
    /// The step could not do its work.
    Errored(String),
    /// The step observed cancellation and unwound.
    Aborted,
}

impl Outcome {
    /// Class of this outcome, as matched by conditional steps.
    ///
    /// A skipped step counts as succeeded.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Succeeded | Self::Skipped => OutcomeKind::Succeeded,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::Errored(_) => OutcomeKind::Errored,
            Self::Aborted => OutcomeKind::Aborted,
        }
    }

    /// Returns true if the outcome counts as success for composition.
    pub fn is_success(&self) -> bool {
        self.kind() == OutcomeKind::Succeeded
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Succeeded | Self::Skipped => 0,
            Self::Failed(_) => 1,
            Self::Errored(_) => 2,
            Self::Aborted => 3,
        }
    }

    /// Combine two outcomes, keeping the more severe one.
    ///
    /// On a tie the left-hand outcome wins, except that a real success
    /// replaces a skip.
    pub fn worst(self, other: Outcome) -> Outcome {
        if other.severity() > self.severity()
            || (self == Self::Skipped && other == Self::Succeeded)
        {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Errored(reason) => write!(f, "errored: {}", reason),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome class without detail, used as a conditional's accepted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Errored,
    Aborted,
}

/// Status of a build driven by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Build constructed but not yet resumed.
    #[default]
    Created,
    /// Step tree is running.
    Running,
    /// Step tree completed successfully.
    Succeeded,
    /// A task in the tree failed.
    Failed,
    /// The tree hit an infrastructural error.
    Errored,
    /// The build was aborted.
    Aborted,
}

impl BuildStatus {
    /// Terminal status for a finished step tree.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome.kind() {
            OutcomeKind::Succeeded => Self::Succeeded,
            OutcomeKind::Failed => Self::Failed,
            OutcomeKind::Errored => Self::Errored,
            OutcomeKind::Aborted => Self::Aborted,
        }
    }

    /// Returns true if the build is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }
}

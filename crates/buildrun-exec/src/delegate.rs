//! Delegates observe a build's lifecycle.
//!
//! Steps report to the delegate handed to them at compile time instead of
//! talking to a concrete logger or event sink. The implementations live with
//! whoever runs the engine.

use std::sync::Arc;

use buildrun_core::{BuildId, GetPlan, Outcome, PutPlan, TaskConfig};

use crate::{BackendError, VersionInfo};

/// Observes an Execute step.
pub trait ExecutionDelegate: Send + Sync {
    /// The task's configuration was loaded.
    fn initializing(&self, config: &TaskConfig);

    /// The task is being handed to the backend.
    fn started(&self);

    /// The task exited.
    fn finished(&self, exit_status: i32);

    /// The task could not be run.
    fn failed(&self, error: &BackendError);
}

/// Observes a Get step.
pub trait InputDelegate: Send + Sync {
    fn completed(&self, info: &VersionInfo);
    fn failed(&self, error: &BackendError);
}

/// Observes a Put step.
pub trait OutputDelegate: Send + Sync {
    fn completed(&self, info: &VersionInfo);
    fn failed(&self, error: &BackendError);
}

/// Per-build delegate.
pub trait BuildDelegate: Send + Sync {
    fn execution_delegate(&self) -> Arc<dyn ExecutionDelegate>;
    fn input_delegate(&self, plan: &GetPlan) -> Arc<dyn InputDelegate>;
    fn output_delegate(&self, plan: &PutPlan) -> Arc<dyn OutputDelegate>;

    /// The step tree finished with `outcome`.
    fn finish(&self, outcome: &Outcome);

    /// The build was killed. Called at most once per resume.
    fn aborted(&self);
}

/// Hands out the delegate for a build.
pub trait BuildDelegateFactory: Send + Sync {
    fn delegate(&self, build_id: &BuildId) -> Arc<dyn BuildDelegate>;
}

//! Executable steps for buildrun.
//!
//! A [`Step`] is the runtime counterpart of one plan node. It is run once
//! against the result of the step before it, released once, and then
//! discarded. Leaf steps (Execute, Get, Put) reach workers through a
//! [`Backend`]; composite steps (Aggregate, Compose, Conditional) only
//! arrange their children.

pub mod artifact;
pub mod backend;
pub mod config_source;
pub mod delegate;
pub mod step;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use artifact::{Artifact, ArtifactSet};
pub use backend::{
    Backend, BackendError, FetchRequest, FetchedResource, HijackIo, HijackProcessSpec,
    HijackedProcess, MetadataField, PublishRequest, ResourceConfig, TaskExit, TaskRequest,
    TtySpec, VersionInfo,
};
pub use config_source::ConfigSource;
pub use delegate::{
    BuildDelegate, BuildDelegateFactory, ExecutionDelegate, InputDelegate, OutputDelegate,
};
pub use step::{
    AggregateStep, ComposeStep, ConditionalStep, ExecuteStep, GetStep, IdentityStep, PutStep,
    Step, StepResult,
};

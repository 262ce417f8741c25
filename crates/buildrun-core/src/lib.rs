//! buildrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/transport
//! - Storage
//! - Runtime specifics
//!
//! All types here describe what a build is made of: the plan tree that is
//! handed to the engine, the outcomes steps report, the worker records the
//! transport consults, and the session keys that scope resource caches.

pub mod error;
pub mod ids;
pub mod plan;
pub mod session;
pub mod status;
pub mod task_config;
pub mod worker;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{BuildId, PlanId};
pub use plan::{
    AggregatePlan, ComposePlan, ConditionalPlan, ExecutePlan, GetPlan, Params, Plan, PlanStep,
    PutPlan, Source, Version,
};
pub use session::{SessionKey, StepRole};
pub use status::{BuildStatus, Outcome, OutcomeKind};
pub use task_config::{TaskConfig, TaskInputConfig, TaskOutputConfig, TaskRunConfig};
pub use worker::{WorkerRecord, WorkerState};

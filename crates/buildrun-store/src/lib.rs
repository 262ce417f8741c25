//! Storage contracts consulted by the engine and the worker transport.
//!
//! The persistent store itself lives outside of buildrun; this crate only
//! defines the narrow reads and writes the core needs, plus `MemoryStore`,
//! an in-process implementation for tests and single-node embedders.

mod error;
mod memory;

use async_trait::async_trait;
use buildrun_core::{BuildId, WorkerRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::StoreError;
pub use memory::MemoryStore;

/// A build as persisted: the engine that owns it and that engine's opaque
/// metadata blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBuild {
    pub id: BuildId,

    /// Name of the engine that wrote `engine_metadata`.
    pub engine: String,

    /// Serialized engine state, only meaningful to `engine`.
    pub engine_metadata: String,

    /// When the metadata was last written.
    pub updated_at: DateTime<Utc>,
}

/// Read access to worker registrations.
#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// Look up a worker by name. `Ok(None)` if it is not registered.
    async fn get_worker(&self, name: &str) -> Result<Option<WorkerRecord>, StoreError>;
}

/// Read/write access to build records.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Look up a build. `Ok(None)` if it does not exist.
    async fn get_build(&self, id: &BuildId) -> Result<Option<StoredBuild>, StoreError>;

    /// Replace the engine metadata of a build, creating the record if needed.
    async fn put_build_metadata(
        &self,
        id: &BuildId,
        engine: &str,
        metadata: String,
    ) -> Result<(), StoreError>;
}

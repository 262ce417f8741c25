use thiserror::Error;

use buildrun_core::BuildId;
use buildrun_exec::BackendError;
use buildrun_store::StoreError;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Stored metadata does not parse. The build must not be resumed.
    #[error("Corrupt build metadata: {0}")]
    CorruptMetadata(#[source] serde_json::Error),

    #[error("Build {build_id} was written by engine {found}, expected {expected}")]
    EngineMismatch {
        build_id: BuildId,
        found: String,
        expected: String,
    },

    #[error("Build not found: {0}")]
    BuildNotFound(BuildId),

    #[error("Build {0} has already been resumed")]
    AlreadyResumed(BuildId),

    #[error("Hijack failed: {0}")]
    Hijack(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

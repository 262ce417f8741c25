//! Engine: creates builds and rebuilds them from stored metadata.

use std::sync::Arc;

use tracing::{debug, info};

use buildrun_core::{BuildId, Plan};
use buildrun_exec::{Backend, BuildDelegateFactory};
use buildrun_store::BuildStore;

use crate::{Build, BuildMetadata, EngineConfig, EngineError};

/// Name of this engine's metadata format. Stored next to the metadata so a
/// future format is never fed old blobs.
pub const ENGINE_NAME: &str = "exec.v1";

/// Build factory.
pub struct Engine {
    backend: Arc<dyn Backend>,
    delegates: Arc<dyn BuildDelegateFactory>,
    config: EngineConfig,
}

impl Engine {
    /// Create a new Engine.
    pub fn new(
        backend: Arc<dyn Backend>,
        delegates: Arc<dyn BuildDelegateFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            delegates,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    /// Create a build for `plan`. Nothing runs until [`Build::resume`].
    pub fn create_build(&self, build_id: BuildId, plan: Plan) -> Build {
        debug!(build_id = %build_id, "creating build");
        self.build(build_id, BuildMetadata::new(plan))
    }

    /// Rebuild a build from the metadata it was persisted with.
    pub fn lookup_build(&self, build_id: BuildId, metadata: &str) -> Result<Build, EngineError> {
        let metadata: BuildMetadata =
            serde_json::from_str(metadata).map_err(EngineError::CorruptMetadata)?;
        Ok(self.build(build_id, metadata))
    }

    /// Write `build`'s metadata to `store`.
    pub async fn persist<S>(&self, store: &S, build: &Build) -> Result<(), EngineError>
    where
        S: BuildStore + ?Sized,
    {
        store
            .put_build_metadata(build.id(), ENGINE_NAME, build.metadata())
            .await?;
        debug!(build_id = %build.id(), "persisted build metadata");
        Ok(())
    }

    /// Load a stored build, e.g. after a restart, ready to be resumed.
    pub async fn restore<S>(&self, store: &S, build_id: &BuildId) -> Result<Build, EngineError>
    where
        S: BuildStore + ?Sized,
    {
        let stored = store
            .get_build(build_id)
            .await?
            .ok_or_else(|| EngineError::BuildNotFound(build_id.clone()))?;

        if stored.engine != ENGINE_NAME {
            return Err(EngineError::EngineMismatch {
                build_id: build_id.clone(),
                found: stored.engine,
                expected: ENGINE_NAME.to_string(),
            });
        }

        info!(build_id = %build_id, updated_at = %stored.updated_at, "restoring build");
        self.lookup_build(stored.id, &stored.engine_metadata)
    }

    fn build(&self, build_id: BuildId, metadata: BuildMetadata) -> Build {
        let delegate = self.delegates.delegate(&build_id);
        Build::new(
            build_id,
            metadata,
            &self.config.session_prefix,
            self.backend.clone(),
            delegate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrun_core::{ExecutePlan, Outcome, TaskConfig};
    use buildrun_exec::testing::{FakeBackend, RecordingDelegateFactory};
    use buildrun_store::MemoryStore;
    use tracing::Span;

    fn engine() -> Engine {
        Engine::new(
            FakeBackend::new_shared(),
            RecordingDelegateFactory::new(),
            EngineConfig::default(),
        )
    }

    fn plan() -> Plan {
        Plan::execute(ExecutePlan::inline(TaskConfig::new("./test.sh")))
    }

    #[test]
    fn test_name_is_stable() {
        assert_eq!(engine().name(), "exec.v1");
    }

    #[test]
    fn test_lookup_corrupt_metadata() {
        let err = engine()
            .lookup_build(BuildId::from(1), "{\"plan\": 42")
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::CorruptMetadata(_)));

        let err = engine()
            .lookup_build(BuildId::from(1), "{\"plan\":{\"id\":\"x\",\"step\":{\"teleport\":{}}}}")
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::CorruptMetadata(_)));
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let engine = engine();
        let store = MemoryStore::new();
        let build = engine.create_build(BuildId::from(2), plan());

        engine.persist(store.as_ref(), &build).await.unwrap();
        let restored = engine.restore(store.as_ref(), &BuildId::from(2)).await.unwrap();

        assert_eq!(restored.id(), &BuildId::from(2));
        assert_eq!(restored.metadata(), build.metadata());
        assert_eq!(
            restored.resume(&Span::none()).await.unwrap(),
            Outcome::Succeeded
        );
    }

    #[tokio::test]
    async fn test_restore_rejects_other_engine() {
        let engine = engine();
        let store = MemoryStore::new();
        let build = engine.create_build(BuildId::from(3), plan());
        store
            .put_build_metadata(build.id(), "exec.v0", build.metadata())
            .await
            .unwrap();

        let err = engine
            .restore(store.as_ref(), &BuildId::from(3))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::EngineMismatch { found, .. } if found == "exec.v0"));
    }

    #[tokio::test]
    async fn test_restore_missing_build() {
        let err = engine()
            .restore(MemoryStore::new().as_ref(), &BuildId::from(4))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::BuildNotFound(_)));
    }
}

//! In-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use buildrun_core::{BuildId, WorkerRecord};

use crate::{BuildStore, StoreError, StoredBuild, WorkerStore};

/// Store keeping workers and builds in process memory.
#[derive(Default)]
pub struct MemoryStore {
    /// Workers indexed by name.
    workers: RwLock<HashMap<String, WorkerRecord>>,

    /// Builds indexed by BuildId.
    builds: RwLock<HashMap<BuildId, StoredBuild>>,
}

impl MemoryStore {
    /// Create a new MemoryStore wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register or replace a worker.
    pub async fn save_worker(&self, worker: WorkerRecord) {
        self.workers
            .write()
            .await
            .insert(worker.name.clone(), worker);
    }

    /// Remove a worker registration.
    pub async fn remove_worker(&self, name: &str) -> Option<WorkerRecord> {
        self.workers.write().await.remove(name)
    }

    /// Get the number of stored builds.
    pub async fn build_count(&self) -> usize {
        self.builds.read().await.len()
    }
}

#[async_trait]
impl WorkerStore for MemoryStore {
    async fn get_worker(&self, name: &str) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.workers.read().await.get(name).cloned())
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn get_build(&self, id: &BuildId) -> Result<Option<StoredBuild>, StoreError> {
        Ok(self.builds.read().await.get(id).cloned())
    }

    async fn put_build_metadata(
        &self,
        id: &BuildId,
        engine: &str,
        metadata: String,
    ) -> Result<(), StoreError> {
        let record = StoredBuild {
            id: id.clone(),
            engine: engine.to_string(),
            engine_metadata: metadata,
            updated_at: Utc::now(),
        };
        self.builds.write().await.insert(id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrun_core::WorkerState;

    #[tokio::test]
    async fn test_worker_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_worker("w1").await.unwrap().is_none());

        store
            .save_worker(WorkerRecord::new("w1", "10.0.0.1:7777").with_state(WorkerState::Stalled))
            .await;

        let worker = store.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.addr.as_deref(), Some("10.0.0.1:7777"));
        assert!(worker.state.is_stalled());

        store.remove_worker("w1").await;
        assert!(store.get_worker("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_build_metadata_replaces() {
        let store = MemoryStore::new();
        let id = BuildId::from(1u64);

        store.put_build_metadata(&id, "exec.v1", "{}".into()).await.unwrap();
        store
            .put_build_metadata(&id, "exec.v1", r#"{"plan":1}"#.into())
            .await
            .unwrap();

        let build = store.get_build(&id).await.unwrap().unwrap();
        assert_eq!(build.engine, "exec.v1");
        assert_eq!(build.engine_metadata, r#"{"plan":1}"#);
        assert_eq!(store.build_count().await, 1);
    }
}

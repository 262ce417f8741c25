//! Transport errors.

use buildrun_store::StoreError;
use thiserror::Error;

/// Errors raised while routing a request to a worker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No worker is registered under the name.
    #[error("Worker not found: {0}")]
    MissingWorker(String),

    /// The worker stopped heartbeating. Not retried here.
    #[error("Worker is stalled: {0}")]
    WorkerStalled(String),

    /// The worker is registered but has not reported an address yet.
    #[error("Worker has no address: {0}")]
    WorkerAddressMissing(String),

    #[error("Invalid address {addr} for worker {worker}")]
    InvalidWorkerAddress { worker: String, addr: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    /// Failure of a transport other than reqwest.
    #[error("connection failed: {0}")]
    Connection(String),
}

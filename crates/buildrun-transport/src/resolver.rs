use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response, Url};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use buildrun_store::WorkerStore;

use crate::{Transport, TransportError};

/// Transport that sends every request to the current address of one worker.
///
/// The address is read from the store on first use and cached until a
/// request fails at the transport level. Stalled workers and workers without
/// an address are rejected without calling `inner`.
pub struct WorkerRoundTripper<S: ?Sized, T> {
    worker_name: String,
    store: Arc<S>,
    inner: T,
    cached_addr: Mutex<Option<String>>,
}

impl<S, T> WorkerRoundTripper<S, T>
where
    S: WorkerStore + ?Sized,
    T: Transport,
{
    /// Create a round tripper for `worker_name`.
    ///
    /// `initial_addr` is the address the worker registered with, if known;
    /// it saves the first store read.
    pub fn new(
        worker_name: impl Into<String>,
        initial_addr: Option<String>,
        store: Arc<S>,
        inner: T,
    ) -> Self {
        Self {
            worker_name: worker_name.into(),
            store,
            inner,
            cached_addr: Mutex::new(initial_addr),
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// The address the next request will go to without a store read.
    pub async fn cached_addr(&self) -> Option<String> {
        self.cached_addr.lock().await.clone()
    }

    /// Forget the cached address.
    pub async fn invalidate(&self) {
        self.cached_addr.lock().await.take();
    }

    async fn resolve(&self) -> Result<String, TransportError> {
        let mut cached = self.cached_addr.lock().await;
        if let Some(addr) = cached.as_ref() {
            return Ok(addr.clone());
        }

        let worker = self
            .store
            .get_worker(&self.worker_name)
            .await?
            .ok_or_else(|| TransportError::MissingWorker(self.worker_name.clone()))?;

        if worker.state.is_stalled() {
            return Err(TransportError::WorkerStalled(self.worker_name.clone()));
        }

        let addr = worker
            .addr
            .ok_or_else(|| TransportError::WorkerAddressMissing(self.worker_name.clone()))?;

        debug!(worker = %self.worker_name, addr = %addr, "resolved worker address");
        *cached = Some(addr.clone());
        Ok(addr)
    }

    /// Point `request` at the worker and send it through the inner transport.
    pub async fn round_trip(&self, mut request: Request) -> Result<Response, TransportError> {
        let addr = self.resolve().await?;

        if let Err(e) = self.rewrite(request.url_mut(), &addr) {
            self.forget(&addr).await;
            return Err(e);
        }

        match self.inner.round_trip(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(worker = %self.worker_name, addr = %addr, error = %e, "worker request failed");
                self.forget(&addr).await;
                Err(e)
            }
        }
    }

    /// Forget `addr` unless another call already cached a newer address.
    async fn forget(&self, addr: &str) {
        let mut cached = self.cached_addr.lock().await;
        if cached.as_deref() == Some(addr) {
            cached.take();
        }
    }

    /// Replace host and port of `url` with `addr`, keeping everything else.
    fn rewrite(&self, url: &mut Url, addr: &str) -> Result<(), TransportError> {
        let invalid = || TransportError::InvalidWorkerAddress {
            worker: self.worker_name.clone(),
            addr: addr.to_string(),
        };

        let target = Url::parse(&format!("{}://{}", url.scheme(), addr)).map_err(|_| invalid())?;
        let host = target.host_str().ok_or_else(invalid)?;
        url.set_host(Some(host)).map_err(|_| invalid())?;
        url.set_port(target.port()).map_err(|_| invalid())?;
        Ok(())
    }
}

#[async_trait]
impl<S, T> Transport for WorkerRoundTripper<S, T>
where
    S: WorkerStore + ?Sized,
    T: Transport,
{
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        WorkerRoundTripper::round_trip(self, request).await
    }
}

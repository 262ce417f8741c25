//! Routes backend requests to the worker that holds a build's containers.
//!
//! Workers come and go: they restart, move, or stall. A
//! [`WorkerRoundTripper`] looks a worker's address up by name, remembers it
//! while calls succeed, and forgets it after the first transport failure so
//! the next call looks it up again.

mod error;
mod resolver;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

pub use error::TransportError;
pub use resolver::WorkerRoundTripper;

/// Sends one HTTP request and returns the response.
///
/// Only failures to get a response are errors; any HTTP status is a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.execute(request).await?)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        (**self).round_trip(request).await
    }
}

//! The execution backend contract.
//!
//! A backend owns containers and volumes on workers. Steps call it to run a
//! task, fetch or publish a resource, read a file out of an artifact, and to
//! release whatever was acquired under a session key. Dialing the right
//! worker (see `buildrun-transport`) happens behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use buildrun_core::{CoreError, Params, SessionKey, Source, TaskConfig, Version};

use crate::{Artifact, ArtifactSet};

/// Errors raised by a backend.
///
/// Every backend error turns the calling step `errored`.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The worker holding the session could not be reached.
    #[error("Worker unreachable: {0}")]
    Unreachable(String),

    /// No container or process is registered under the session key.
    #[error("No session found for {0}")]
    SessionNotFound(SessionKey),

    /// A step referenced an artifact that no upstream step produced.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// A task configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Any other backend failure, e.g. a worker resolution error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A resource as configured in the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: Source,
}

/// A task to run in the build's container.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub config: TaskConfig,
    pub privileged: bool,
    /// Artifacts to mount as task inputs.
    pub inputs: ArtifactSet,
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskExit {
    pub status: i32,
    /// Artifacts produced from the task's declared outputs.
    pub outputs: Vec<Artifact>,
}

/// A resource version to fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Name to give the fetched artifact.
    pub name: String,
    pub resource: ResourceConfig,
    pub params: Params,
    /// Pinned version; the backend picks the latest when absent.
    pub version: Option<Version>,
}

/// A fetched resource.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    pub artifact: Artifact,
    pub info: VersionInfo,
}

/// Params to publish to a resource.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub resource: ResourceConfig,
    pub params: Params,
    /// Artifacts the publish may read from.
    pub inputs: ArtifactSet,
}

/// A version together with the metadata the resource reported for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: Version,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

/// Process to start inside a running build container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HijackProcessSpec {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub tty: Option<TtySpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtySpec {
    pub columns: u16,
    pub rows: u16,
}

/// Streams wired to a hijacked process.
pub struct HijackIo {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

/// An interactive process attached to a build container.
#[async_trait]
pub trait HijackedProcess: Send {
    /// Backend identifier of the process.
    fn id(&self) -> &str;

    /// Wait for the process to exit and return its exit status.
    async fn wait(&mut self) -> Result<i32, BackendError>;

    /// Resize the process's terminal.
    async fn resize(&mut self, tty: TtySpec) -> Result<(), BackendError>;
}

/// Operations a backend offers to steps.
///
/// Every acquiring operation is keyed by a session key; the backend reuses
/// whatever it already holds under that key and keeps it until `release`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run a task to completion.
    async fn run_task(
        &self,
        session: &SessionKey,
        request: TaskRequest,
    ) -> Result<TaskExit, BackendError>;

    /// Fetch a resource version into a volume.
    async fn fetch(
        &self,
        session: &SessionKey,
        request: FetchRequest,
    ) -> Result<FetchedResource, BackendError>;

    /// Publish to a resource, returning the version it created.
    async fn publish(
        &self,
        session: &SessionKey,
        request: PublishRequest,
    ) -> Result<VersionInfo, BackendError>;

    /// Read a file out of an artifact's volume.
    async fn read_file(&self, artifact: &Artifact, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Give up everything held under `session`.
    async fn release(&self, session: &SessionKey) -> Result<(), BackendError>;

    /// Start an interactive process in the container held under `session`.
    async fn hijack(
        &self,
        session: &SessionKey,
        spec: HijackProcessSpec,
        io: HijackIo,
    ) -> Result<Box<dyn HijackedProcess>, BackendError>;
}

//! Scripted backend and recording delegates for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for crates that build on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use buildrun_core::{BuildId, GetPlan, Outcome, PutPlan, SessionKey, TaskConfig, Version};

use crate::{
    Artifact, Backend, BackendError, BuildDelegate, BuildDelegateFactory, ExecutionDelegate,
    FetchRequest, FetchedResource, HijackIo, HijackProcessSpec, HijackedProcess, InputDelegate,
    OutputDelegate, PublishRequest, TaskExit, TaskRequest, TtySpec, VersionInfo,
};

/// How the fake backend runs a task, keyed by the task's `run.path`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskScript {
    /// Exit with the given status.
    Exit(i32),
    /// Fail with a backend error.
    Error(String),
    /// Never return; only cancellation ends the step.
    Block,
}

/// A call made against the fake backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    TaskStarted { session: String, path: String },
    TaskFinished { session: String, path: String },
    Fetch { session: String, resource: String, version: Option<Version> },
    Publish { session: String, resource: String },
    Release { session: String },
    Hijack { session: String },
}

#[derive(Default)]
struct FakeState {
    task_scripts: HashMap<String, TaskScript>,
    failing_resources: HashMap<String, String>,
    failing_releases: HashSet<String>,
    files: HashMap<(String, String), Vec<u8>>,
    live_sessions: HashSet<String>,
    calls: Vec<BackendCall>,
    privileged_runs: usize,
}

/// Backend that runs nothing and records everything.
pub struct FakeBackend {
    state: Mutex<FakeState>,
    started: watch::Sender<usize>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        let (started, _) = watch::channel(0);
        Self {
            state: Mutex::new(FakeState::default()),
            started,
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Script the task whose `run.path` is `path`. Unscripted tasks exit 0.
    pub fn script_task(&self, path: impl Into<String>, script: TaskScript) {
        self.state().task_scripts.insert(path.into(), script);
    }

    /// Make every fetch or publish of `resource` fail.
    pub fn fail_resource(&self, resource: impl Into<String>, message: impl Into<String>) {
        self.state()
            .failing_resources
            .insert(resource.into(), message.into());
    }

    /// Make releasing `session` fail.
    pub fn fail_release(&self, session: impl Into<String>) {
        self.state().failing_releases.insert(session.into());
    }

    /// Put a file into the volume with the given handle.
    pub fn add_file(&self, handle: &str, path: &str, contents: impl Into<Vec<u8>>) {
        self.state()
            .files
            .insert((handle.to_string(), path.to_string()), contents.into());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Sessions released, in order.
    pub fn releases(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Release { session } => Some(session.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn tasks_started(&self) -> usize {
        *self.started.borrow()
    }

    pub fn privileged_runs(&self) -> usize {
        self.state().privileged_runs
    }

    /// Wait until at least `count` tasks have been handed to the backend.
    pub async fn wait_for_tasks_started(&self, count: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn run_task(
        &self,
        session: &SessionKey,
        request: TaskRequest,
    ) -> Result<TaskExit, BackendError> {
        let path = request.config.run.path.clone();
        let script = {
            let mut state = self.state();
            state.calls.push(BackendCall::TaskStarted {
                session: session.to_string(),
                path: path.clone(),
            });
            state.live_sessions.insert(session.to_string());
            if request.privileged {
                state.privileged_runs += 1;
            }
            state
                .task_scripts
                .get(&path)
                .cloned()
                .unwrap_or(TaskScript::Exit(0))
        };
        self.started.send_modify(|n| *n += 1);

        match script {
            TaskScript::Exit(status) => {
                self.state().calls.push(BackendCall::TaskFinished {
                    session: session.to_string(),
                    path,
                });
                Ok(TaskExit {
                    status,
                    outputs: outputs(session, &request.config),
                })
            }
            TaskScript::Error(message) => Err(BackendError::Unreachable(message)),
            TaskScript::Block => std::future::pending().await,
        }
    }

    async fn fetch(
        &self,
        session: &SessionKey,
        request: FetchRequest,
    ) -> Result<FetchedResource, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Fetch {
            session: session.to_string(),
            resource: request.resource.name.clone(),
            version: request.version.clone(),
        });
        if let Some(message) = state.failing_resources.get(&request.resource.name) {
            return Err(BackendError::Unreachable(message.clone()));
        }
        state.live_sessions.insert(session.to_string());

        let version = request
            .version
            .unwrap_or_else(|| Version::from([("ref".to_string(), "latest".to_string())]));
        Ok(FetchedResource {
            artifact: Artifact::new(request.name)
                .with_handle(format!("{}-volume", session))
                .with_version(version.clone()),
            info: VersionInfo {
                version,
                metadata: Vec::new(),
            },
        })
    }

    async fn publish(
        &self,
        session: &SessionKey,
        request: PublishRequest,
    ) -> Result<VersionInfo, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Publish {
            session: session.to_string(),
            resource: request.resource.name.clone(),
        });
        if let Some(message) = state.failing_resources.get(&request.resource.name) {
            return Err(BackendError::Unreachable(message.clone()));
        }
        state.live_sessions.insert(session.to_string());

        Ok(VersionInfo {
            version: Version::from([("version".to_string(), "1".to_string())]),
            metadata: Vec::new(),
        })
    }

    async fn read_file(&self, artifact: &Artifact, path: &str) -> Result<Vec<u8>, BackendError> {
        let handle = artifact
            .handle
            .clone()
            .ok_or_else(|| BackendError::ArtifactNotFound(artifact.name.clone()))?;
        self.state()
            .files
            .get(&(handle, path.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::Other(format!("file not found: {}", path).into()))
    }

    async fn release(&self, session: &SessionKey) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Release {
            session: session.to_string(),
        });
        state.live_sessions.remove(session.as_str());
        if state.failing_releases.contains(session.as_str()) {
            return Err(BackendError::Unreachable(format!(
                "could not release {}",
                session
            )));
        }
        Ok(())
    }

    async fn hijack(
        &self,
        session: &SessionKey,
        spec: HijackProcessSpec,
        _io: HijackIo,
    ) -> Result<Box<dyn HijackedProcess>, BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Hijack {
            session: session.to_string(),
        });
        if !state.live_sessions.contains(session.as_str()) {
            return Err(BackendError::SessionNotFound(session.clone()));
        }
        Ok(Box::new(FakeProcess {
            id: format!("{}-{}", session, spec.path),
            tty: spec.tty,
        }))
    }
}

fn outputs(session: &SessionKey, config: &TaskConfig) -> Vec<Artifact> {
    config
        .outputs
        .iter()
        .map(|o| Artifact::new(o.name.clone()).with_handle(format!("{}-{}", session, o.name)))
        .collect()
}

/// Hijacked process that exits 0 as soon as it is waited on.
pub struct FakeProcess {
    id: String,
    tty: Option<TtySpec>,
}

impl FakeProcess {
    pub fn tty(&self) -> Option<TtySpec> {
        self.tty
    }
}

#[async_trait]
impl HijackedProcess for FakeProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait(&mut self) -> Result<i32, BackendError> {
        Ok(0)
    }

    async fn resize(&mut self, tty: TtySpec) -> Result<(), BackendError> {
        self.tty = Some(tty);
        Ok(())
    }
}

/// Something a delegate was told.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    TaskInitializing(String),
    TaskStarted,
    TaskFinished(i32),
    TaskFailed(String),
    InputCompleted(String),
    InputFailed(String),
    OutputCompleted(String),
    OutputFailed(String),
    Finish(Outcome),
    Aborted,
}

type EventLog = Arc<Mutex<Vec<DelegateEvent>>>;

fn record(log: &EventLog, event: DelegateEvent) {
    log.lock().unwrap().push(event);
}

/// Build delegate that records every notification, including those of the
/// step delegates it hands out.
#[derive(Default)]
pub struct RecordingDelegate {
    events: EventLog,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn aborted_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == DelegateEvent::Aborted)
            .count()
    }

    pub fn finishes(&self) -> Vec<Outcome> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DelegateEvent::Finish(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }
}

impl BuildDelegate for RecordingDelegate {
    fn execution_delegate(&self) -> Arc<dyn ExecutionDelegate> {
        Arc::new(RecordingExecution {
            events: self.events.clone(),
        })
    }

    fn input_delegate(&self, plan: &GetPlan) -> Arc<dyn InputDelegate> {
        Arc::new(RecordingResource {
            name: plan.name.clone(),
            input: true,
            events: self.events.clone(),
        })
    }

    fn output_delegate(&self, plan: &PutPlan) -> Arc<dyn OutputDelegate> {
        Arc::new(RecordingResource {
            name: plan.resource.clone(),
            input: false,
            events: self.events.clone(),
        })
    }

    fn finish(&self, outcome: &Outcome) {
        record(&self.events, DelegateEvent::Finish(outcome.clone()));
    }

    fn aborted(&self) {
        record(&self.events, DelegateEvent::Aborted);
    }
}

struct RecordingExecution {
    events: EventLog,
}

impl ExecutionDelegate for RecordingExecution {
    fn initializing(&self, config: &TaskConfig) {
        record(
            &self.events,
            DelegateEvent::TaskInitializing(config.run.path.clone()),
        );
    }

    fn started(&self) {
        record(&self.events, DelegateEvent::TaskStarted);
    }

    fn finished(&self, exit_status: i32) {
        record(&self.events, DelegateEvent::TaskFinished(exit_status));
    }

    fn failed(&self, error: &BackendError) {
        record(&self.events, DelegateEvent::TaskFailed(error.to_string()));
    }
}

struct RecordingResource {
    name: String,
    input: bool,
    events: EventLog,
}

impl RecordingResource {
    fn completed(&self) {
        let event = if self.input {
            DelegateEvent::InputCompleted(self.name.clone())
        } else {
            DelegateEvent::OutputCompleted(self.name.clone())
        };
        record(&self.events, event);
    }

    fn failed(&self, error: &BackendError) {
        let event = if self.input {
            DelegateEvent::InputFailed(error.to_string())
        } else {
            DelegateEvent::OutputFailed(error.to_string())
        };
        record(&self.events, event);
    }
}

impl InputDelegate for RecordingResource {
    fn completed(&self, _info: &VersionInfo) {
        RecordingResource::completed(self);
    }

    fn failed(&self, error: &BackendError) {
        RecordingResource::failed(self, error);
    }
}

impl OutputDelegate for RecordingResource {
    fn completed(&self, _info: &VersionInfo) {
        RecordingResource::completed(self);
    }

    fn failed(&self, error: &BackendError) {
        RecordingResource::failed(self, error);
    }
}

/// Factory handing out one `RecordingDelegate` per build.
#[derive(Default)]
pub struct RecordingDelegateFactory {
    delegates: Mutex<HashMap<BuildId, Arc<RecordingDelegate>>>,
}

impl RecordingDelegateFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The delegate of `build_id`, created on first use.
    pub fn delegate_for(&self, build_id: &BuildId) -> Arc<RecordingDelegate> {
        self.delegates
            .lock()
            .unwrap()
            .entry(build_id.clone())
            .or_insert_with(RecordingDelegate::new)
            .clone()
    }
}

impl BuildDelegateFactory for RecordingDelegateFactory {
    fn delegate(&self, build_id: &BuildId) -> Arc<dyn BuildDelegate> {
        self.delegate_for(build_id)
    }
}

//! The execution driver of a single build.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument, Span};

use buildrun_core::{BuildId, BuildStatus, Outcome, StepRole};
use buildrun_exec::{
    Backend, BuildDelegate, HijackIo, HijackProcessSpec, HijackedProcess, StepResult,
};

use crate::{BuildMetadata, Compiler, EngineError};

/// Why a build is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Stop the running steps; the build is not reported as aborted.
    Interrupt,
    /// Stop the running steps and report the build aborted.
    Kill,
}

/// One build: a plan, the means to run it, and the signals that stop it.
pub struct Build {
    build_id: BuildId,
    metadata: BuildMetadata,
    compiler: Compiler,
    backend: Arc<dyn Backend>,
    delegate: Arc<dyn BuildDelegate>,
    signals: mpsc::UnboundedSender<AbortReason>,
    pending_signals: Mutex<Option<mpsc::UnboundedReceiver<AbortReason>>>,
    status: watch::Sender<BuildStatus>,
}

impl Build {
    pub(crate) fn new(
        build_id: BuildId,
        metadata: BuildMetadata,
        session_prefix: &str,
        backend: Arc<dyn Backend>,
        delegate: Arc<dyn BuildDelegate>,
    ) -> Self {
        let compiler = Compiler::new(
            build_id.clone(),
            session_prefix,
            backend.clone(),
            delegate.clone(),
        );
        let (signals, pending) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(BuildStatus::Created);

        Self {
            build_id,
            metadata,
            compiler,
            backend,
            delegate,
            signals,
            pending_signals: Mutex::new(Some(pending)),
            status,
        }
    }

    pub fn id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn status(&self) -> BuildStatus {
        *self.status.borrow()
    }

    /// Watch the build's status change.
    pub fn subscribe_status(&self) -> watch::Receiver<BuildStatus> {
        self.status.subscribe()
    }

    /// Serialized metadata to persist for this build.
    pub fn metadata(&self) -> String {
        serde_json::to_string(&self.metadata).expect("build metadata is always serializable")
    }

    /// Kill the build. Never blocks; a signal sent before `resume` is picked
    /// up when it starts, one sent after the build finished is ignored.
    pub fn abort(&self) {
        self.signal(AbortReason::Kill);
    }

    pub fn signal(&self, reason: AbortReason) {
        // Fails when no resume is listening, i.e. after it returned.
        let _ = self.signals.send(reason);
    }

    /// Compile the plan, run it to an outcome, release everything it
    /// acquired and report the outcome to the delegate.
    ///
    /// Every abort signal received meanwhile cancels the step tree; the first
    /// `Kill` also tells the delegate the build was aborted.
    pub async fn resume(&self, parent: &Span) -> Result<Outcome, EngineError> {
        let Some(mut signals) = self.pending_signals.lock().await.take() else {
            return Err(EngineError::AlreadyResumed(self.build_id.clone()));
        };

        let span = info_span!(parent: parent, "build", build_id = %self.build_id);
        let mut root = self.compiler.compile(&self.metadata.plan, &span);
        let cancel = CancellationToken::new();
        let upstream = StepResult::initial();

        self.status.send_replace(BuildStatus::Running);
        info!(parent: &span, "build started");

        let mut killed = false;
        let outcome = {
            let mut run = root.run(&upstream, &cancel).instrument(span.clone());
            loop {
                tokio::select! {
                    biased;
                    Some(reason) = signals.recv() => {
                        info!(parent: &span, ?reason, "abort signal received");
                        cancel.cancel();
                        if reason == AbortReason::Kill && !killed {
                            killed = true;
                            self.delegate.aborted();
                        }
                    }
                    outcome = &mut run => break outcome,
                }
            }
        };

        if let Err(e) = root.release().instrument(span.clone()).await {
            warn!(parent: &span, error = %e, "failed to release build resources");
        }

        info!(parent: &span, outcome = %outcome, "build finished");
        self.status.send_replace(BuildStatus::from_outcome(&outcome));
        self.delegate.finish(&outcome);
        Ok(outcome)
    }

    /// Attach a process to the container of the build's Execute step.
    pub async fn hijack(
        &self,
        spec: HijackProcessSpec,
        io: HijackIo,
    ) -> Result<Box<dyn HijackedProcess>, EngineError> {
        let session = self.compiler.session(&StepRole::Execute);
        info!(build_id = %self.build_id, session = %session, path = %spec.path, "hijacking build");
        Ok(self.backend.hijack(&session, spec, io).await?)
    }
}

//! Single-job execution task.
//!
//! An [`ExecutionWorker`] owns write access to exactly one job for the
//! job's whole life. It runs the fetch engine, forwards the engine's
//! progress events into the job store and the broadcaster, resolves the
//! produced artifact, and finally records `done` or `error`. Nothing it
//! encounters escapes the task: every failure ends up in the job record.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use reelfetch_core::job::{InvalidTransition, Job, JobStatus};
use reelfetch_core::progress::normalize_percent;
use reelfetch_core::types::JobId;
use reelfetch_events::ProgressBroadcaster;
use reelfetch_fetcher::{EngineError, EngineEvent, FetchEngine, FetchOptions, ProgressSink};
use reelfetch_store::JobStore;

use crate::artifact::{ArtifactError, ArtifactPolicy, ResolvedArtifact};

/// Why a job ended in `error`, by pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    /// The fetch engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine succeeded but the artifact could not be resolved.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl JobFailure {
    /// Short diagnostic tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(_) => "engine_failure",
            Self::Artifact(ArtifactError::Missing { .. }) => "artifact_missing",
            Self::Artifact(ArtifactError::Io { .. }) => "artifact_io",
        }
    }
}

/// Everything a worker needs to run one job.
pub struct ExecutionWorker {
    job_id: JobId,
    url: String,
    store: Arc<JobStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    engine: Arc<dyn FetchEngine>,
    options: FetchOptions,
    artifacts: Arc<ArtifactPolicy>,
}

impl ExecutionWorker {
    pub fn new(
        job_id: JobId,
        url: String,
        store: Arc<JobStore>,
        broadcaster: Arc<ProgressBroadcaster>,
        engine: Arc<dyn FetchEngine>,
        options: FetchOptions,
        artifacts: Arc<ArtifactPolicy>,
    ) -> Self {
        Self {
            job_id,
            url,
            store,
            broadcaster,
            engine,
            options,
            artifacts,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Drive the job to a terminal state.
    pub async fn run(self) {
        if !self.apply(Job::start) {
            tracing::warn!(job_id = %self.job_id, "Job could not be started");
            return;
        }
        tracing::info!(job_id = %self.job_id, url = %self.url, "Job started");

        match self.execute().await {
            Ok(artifact) => {
                self.apply(|job| job.complete(artifact.relative.as_str()));
                tracing::info!(
                    job_id = %self.job_id,
                    artifact = %artifact.relative,
                    "Job completed",
                );
            }
            Err(failure) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    kind = failure.kind(),
                    error = %failure,
                    "Job failed",
                );
                let message = failure_message(&failure);
                self.apply(|job| job.fail(message));
            }
        }
    }

    /// Fetch, pass through `processing`, then resolve the artifact.
    async fn execute(&self) -> Result<ResolvedArtifact, JobFailure> {
        let reported = self.fetch().await?;

        // The engine may finish without ever reporting completion; the job
        // still passes through `processing` before `done`.
        let processing = self
            .store
            .get(&self.job_id)
            .is_some_and(|job| job.status() == JobStatus::Processing);
        if !processing {
            self.apply(Job::begin_processing);
        }

        let artifact = self.artifacts.resolve(&reported).await?;
        Ok(artifact)
    }

    /// Run the engine while draining its progress channel.
    async fn fetch(&self) -> Result<PathBuf, EngineError> {
        let (sink, mut events) = ProgressSink::channel();
        let fetch =
            AssertUnwindSafe(self.engine.fetch(&self.url, &self.options, sink)).catch_unwind();
        tokio::pin!(fetch);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.on_engine_event(event),
                outcome = &mut fetch => break outcome,
            }
        };

        // Events the engine emitted right before returning.
        while let Ok(event) = events.try_recv() {
            self.on_engine_event(event);
        }

        outcome.unwrap_or_else(|_| Err(EngineError::Other("fetch engine panicked".to_string())))
    }

    fn on_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Downloading {
                percent,
                speed,
                eta,
            } => {
                let percent = normalize_percent(&percent);
                self.apply(|job| job.record_download(percent, speed, eta));
            }
            EngineEvent::Finished => {
                self.apply(Job::begin_processing);
            }
            EngineEvent::Other(status) => {
                tracing::trace!(job_id = %self.job_id, status = %status, "Engine status ignored");
            }
        }
    }

    /// Mutate the job and broadcast the resulting snapshot. Returns whether
    /// the mutation was applied.
    fn apply<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Job) -> Result<(), InvalidTransition>,
    {
        match self.store.mutate(&self.job_id, f) {
            Ok(snapshot) => {
                self.broadcaster.publish(&self.job_id, snapshot);
                true
            }
            Err(e) => {
                tracing::debug!(job_id = %self.job_id, error = %e, "Job update skipped");
                false
            }
        }
    }
}

/// User-facing message for a failed job; never empty.
fn failure_message(failure: &JobFailure) -> String {
    let message = failure.to_string();
    if message.trim().is_empty() {
        format!("Job failed ({})", failure.kind())
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_distinguish_stages() {
        let engine = JobFailure::from(EngineError::NoOutput);
        let missing = JobFailure::from(ArtifactError::Missing {
            reported: PathBuf::from("x.mp4"),
        });
        assert_eq!(engine.kind(), "engine_failure");
        assert_eq!(missing.kind(), "artifact_missing");
        assert_eq!(missing.to_string(), "Download finished but file not found");
    }

    #[test]
    fn empty_engine_message_gets_a_fallback() {
        let failure = JobFailure::from(EngineError::Other(String::new()));
        assert_eq!(failure_message(&failure), "Job failed (engine_failure)");

        let failure = JobFailure::from(EngineError::Other("403 Forbidden".into()));
        assert_eq!(failure_message(&failure), "403 Forbidden");
    }
}

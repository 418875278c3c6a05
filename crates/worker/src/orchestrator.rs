//! Submission façade over the store, the broadcaster and the workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use reelfetch_core::error::CoreError;
use reelfetch_core::job::JobSnapshot;
use reelfetch_core::source::SourcePolicy;
use reelfetch_core::types::JobId;
use reelfetch_events::{ProgressBroadcaster, SnapshotStream};
use reelfetch_fetcher::FetchEngine;
use reelfetch_store::JobStore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::artifact::ArtifactPolicy;
use crate::config::FetchConfig;
use crate::worker::ExecutionWorker;

/// Accepts submissions and runs one [`ExecutionWorker`] task per job.
///
/// `submit` returns as soon as the job exists and its worker is spawned;
/// callers follow the job through [`status`](Self::status) or
/// [`subscribe`](Self::subscribe).
pub struct JobOrchestrator {
    store: Arc<JobStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    engine: Arc<dyn FetchEngine>,
    config: Arc<FetchConfig>,
    sources: SourcePolicy,
    artifacts: Arc<ArtifactPolicy>,
    tracker: TaskTracker,
    handles: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl JobOrchestrator {
    pub fn new(config: FetchConfig, engine: Arc<dyn FetchEngine>) -> Self {
        Self {
            store: Arc::new(JobStore::new()),
            broadcaster: Arc::new(ProgressBroadcaster::default()),
            engine,
            sources: config.source_policy(),
            artifacts: Arc::new(config.artifact_policy()),
            config: Arc::new(config),
            tracker: TaskTracker::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Validate `url`, create a queued job and spawn its worker.
    ///
    /// Invalid input is rejected with [`CoreError::Validation`] and no job
    /// is created.
    pub fn submit(&self, url: &str) -> Result<JobId, CoreError> {
        let url = self.sources.validate(url)?;

        let id = self.store.create();
        self.broadcaster.open(&id);

        let worker = ExecutionWorker::new(
            id.clone(),
            url,
            Arc::clone(&self.store),
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.engine),
            self.config.fetch_options(Utc::now()),
            Arc::clone(&self.artifacts),
        );
        let handle = self.tracker.spawn(worker.run());

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|_, h| !h.is_finished());
        handles.insert(id.clone(), handle);

        tracing::info!(job_id = %id, "Job submitted");
        Ok(id)
    }

    /// Current snapshot of a job.
    pub fn status(&self, id: &JobId) -> Result<JobSnapshot, CoreError> {
        self.store.snapshot(id)
    }

    /// Current snapshot followed by live updates until the job is terminal.
    ///
    /// The live feed is attached before the snapshot is read, so no
    /// transition falls between the two. Live snapshots at or below the
    /// first item's revision are dropped, so revisions strictly increase
    /// along the stream. For a job that is already terminal the stream
    /// holds exactly one item.
    pub fn subscribe(&self, id: &JobId) -> Result<SnapshotStream, CoreError> {
        let live = self.broadcaster.subscribe(id);
        let current = self.store.snapshot(id)?;

        if current.is_terminal() {
            return Ok(Box::pin(stream::once(async move { current })));
        }

        match live {
            Some(live) => {
                let seen = current.revision;
                let newer = live.skip_while(move |s| future::ready(s.revision <= seen));
                Ok(Box::pin(stream::once(async move { current }).chain(newer)))
            }
            // The channel closed between the two reads; the store now has
            // the terminal state.
            None => {
                let latest = self.store.snapshot(id)?;
                Ok(Box::pin(stream::once(async move { latest })))
            }
        }
    }

    /// Wait for a job's worker to finish. Returns `false` when no running
    /// worker is known for `id`.
    pub async fn wait(&self, id: &JobId) -> bool {
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::error!(job_id = %id, error = %e, "Worker task aborted");
                }
                true
            }
            None => false,
        }
    }

    /// Number of worker tasks that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `timeout` for every in-flight worker to finish. Returns
    /// whether they all did. New submissions are still accepted afterwards.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        if !finished {
            tracing::warn!(
                active = self.tracker.len(),
                "Workers still running after drain timeout",
            );
        }
        finished
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

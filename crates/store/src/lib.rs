//! In-memory job store.
//!
//! [`JobStore`] is the single canonical copy of every job. Readers only
//! ever receive clones; the owning worker changes a job through
//! [`JobStore::mutate`], which runs under that job's own lock so unrelated
//! jobs never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use reelfetch_core::error::CoreError;
use reelfetch_core::job::{Job, JobSnapshot};
use reelfetch_core::types::JobId;

type JobCell = Arc<Mutex<Job>>;

/// Concurrency-safe mapping from job id to job state.
///
/// The outer `RwLock` guards only the id map and is held just long enough
/// to clone the per-job cell out of it. Designed to be shared as
/// `Arc<JobStore>`.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobCell>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new `queued` job and return its id.
    pub fn create(&self) -> JobId {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut id = JobId::generate();
        while jobs.contains_key(&id) {
            id = JobId::generate();
        }
        jobs.insert(id.clone(), Arc::new(Mutex::new(Job::new(id.clone()))));
        tracing::debug!(job_id = %id, "Job created");
        id
    }

    /// Copy of the job, or `None` if no job has this id.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        let cell = self.cell(id)?;
        let job = lock(&cell).clone();
        Some(job)
    }

    /// Snapshot of the job, or [`CoreError::NotFound`].
    pub fn snapshot(&self, id: &JobId) -> Result<JobSnapshot, CoreError> {
        self.cell(id)
            .map(|cell| lock(&cell).snapshot())
            .ok_or_else(|| not_found(id))
    }

    pub fn exists(&self, id: &JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Atomically apply `f` to the job and return the resulting snapshot.
    ///
    /// Fails with [`CoreError::NotFound`] for unknown ids and with
    /// [`CoreError::Conflict`] once the job is terminal; `f` is not called
    /// in either case. Any error `f` returns is passed through, and the
    /// closure is expected to leave the job untouched when it errs.
    pub fn mutate<F, E>(&self, id: &JobId, f: F) -> Result<JobSnapshot, CoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let cell = self.cell(id).ok_or_else(|| not_found(id))?;
        let mut job = lock(&cell);

        if job.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "job {id} is already {}",
                job.status()
            )));
        }

        f(&mut job).map_err(|e| CoreError::Conflict(e.to_string()))?;
        Ok(job.snapshot())
    }

    /// Drop a job from the store. Used by an external retention sweep;
    /// returns whether the job existed.
    pub fn remove(&self, id: &JobId) -> bool {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, id: &JobId) -> Option<JobCell> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}

fn lock(cell: &Mutex<Job>) -> MutexGuard<'_, Job> {
    cell.lock().unwrap_or_else(|e| e.into_inner())
}

fn not_found(id: &JobId) -> CoreError {
    CoreError::NotFound {
        entity: "job",
        id: id.clone(),
    }
}

//! The job record, its status state machine, and the snapshot wire shape.

use serde::{Deserialize, Serialize};

use crate::progress::{format_percent, MAX_PERCENT, MIN_PERCENT};
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Downloading,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// `done` and `error` accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// ```text
    /// queued      -> starting
    /// starting    -> downloading | processing
    /// downloading -> downloading | processing
    /// processing  -> done
    /// non-terminal -> error
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Error) => true,
            (Queued, Starting) => true,
            (Starting, Downloading | Processing) => true,
            (Downloading, Downloading | Processing) => true,
            (Processing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Canonical job record held by the job store.
///
/// Fields are private to the state machine: every change goes through one
/// of the transition methods, which refuse moves the state machine does not
/// allow and keep `artifact_path`/`error` consistent with `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    progress: f64,
    speed: String,
    eta: String,
    artifact_path: Option<String>,
    error: Option<String>,
    revision: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    /// A freshly submitted job: `queued`, zero progress, no outcome.
    pub fn new(id: JobId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: MIN_PERCENT,
            speed: String::new(),
            eta: String::new(),
            artifact_path: None,
            error: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn speed(&self) -> &str {
        &self.speed
    }

    pub fn eta(&self) -> &str {
        &self.eta
    }

    pub fn artifact_path(&self) -> Option<&str> {
        self.artifact_path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of applied transitions; starts at 0 and goes up by one on
    /// every accepted change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn enter(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.revision += 1;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `queued -> starting`; progress restarts at zero.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.enter(JobStatus::Starting)?;
        self.progress = MIN_PERCENT;
        Ok(())
    }

    /// Record a transfer update. Progress never moves backwards while the
    /// job is downloading.
    pub fn record_download(
        &mut self,
        percent: f64,
        speed: impl Into<String>,
        eta: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        let continuing = self.status == JobStatus::Downloading;
        self.enter(JobStatus::Downloading)?;
        let percent = percent.clamp(MIN_PERCENT, MAX_PERCENT);
        self.progress = if continuing {
            self.progress.max(percent)
        } else {
            percent
        };
        self.speed = speed.into();
        self.eta = eta.into();
        Ok(())
    }

    /// The engine finished transferring; progress is forced to 100%.
    pub fn begin_processing(&mut self) -> Result<(), InvalidTransition> {
        self.enter(JobStatus::Processing)?;
        self.progress = MAX_PERCENT;
        self.eta.clear();
        Ok(())
    }

    /// Terminal success with the artifact path relative to the output root.
    pub fn complete(&mut self, artifact_path: impl Into<String>) -> Result<(), InvalidTransition> {
        self.enter(JobStatus::Done)?;
        self.progress = MAX_PERCENT;
        self.artifact_path = Some(artifact_path.into());
        Ok(())
    }

    /// Terminal failure with a human-readable message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.enter(JobStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Copy the current state into its wire representation.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            progress: format_percent(self.progress),
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            artifact_path: self.artifact_path.clone(),
            error: self.error.clone(),
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// JobSnapshot
// ---------------------------------------------------------------------------

/// Immutable point-in-time copy of a job, as handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    /// Two decimals and a percent sign, e.g. `"45.50%"`.
    pub progress: String,
    pub speed: String,
    pub eta: String,
    pub artifact_path: Option<String>,
    pub error: Option<String>,
    /// Orders snapshots of the same job; a higher revision is newer.
    pub revision: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId::from("job-1"))
    }

    #[test]
    fn new_job_is_queued_with_no_outcome() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.progress(), 0.0);
        assert!(job.artifact_path().is_none());
        assert!(job.error().is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = job();
        job.start().unwrap();
        job.record_download(10.0, "1MiB/s", "00:10").unwrap();
        job.record_download(55.5, "2MiB/s", "00:04").unwrap();
        job.begin_processing().unwrap();
        assert_eq!(job.progress(), 100.0);
        job.complete("clip.mp4").unwrap();

        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.artifact_path(), Some("clip.mp4"));
        assert!(job.error().is_none());
    }

    #[test]
    fn download_progress_never_decreases() {
        let mut job = job();
        job.start().unwrap();
        job.record_download(60.0, "", "").unwrap();
        job.record_download(20.0, "", "").unwrap();
        assert_eq!(job.progress(), 60.0);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut job = job();
        assert_eq!(
            job.complete("x.mp4"),
            Err(InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Done,
            })
        );
        assert!(job.record_download(1.0, "", "").is_err());
    }

    #[test]
    fn completion_without_transfer_passes_through_processing() {
        let mut job = job();
        job.start().unwrap();
        job.begin_processing().unwrap();
        job.complete("photo.jpg").unwrap();
        assert_eq!(job.status(), JobStatus::Done);
    }

    #[test]
    fn processing_ignores_late_download_updates() {
        let mut job = job();
        job.start().unwrap();
        job.begin_processing().unwrap();
        assert!(job.record_download(5.0, "", "").is_err());
        assert_eq!(job.status(), JobStatus::Processing);
        assert_eq!(job.progress(), 100.0);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.fail("boom").unwrap();

        assert!(job.start().is_err());
        assert!(job.fail("again").is_err());
        assert!(job.begin_processing().is_err());
        assert_eq!(job.error(), Some("boom"));
        assert!(job.artifact_path().is_none());
    }

    #[test]
    fn any_live_state_can_fail() {
        for prepare in [
            (|_: &mut Job| {}) as fn(&mut Job),
            |j| j.start().unwrap(),
            |j| {
                j.start().unwrap();
                j.record_download(3.0, "", "").unwrap();
            },
            |j| {
                j.start().unwrap();
                j.begin_processing().unwrap();
            },
        ] {
            let mut job = job();
            prepare(&mut job);
            assert!(job.fail("engine exploded").is_ok());
            assert_eq!(job.status(), JobStatus::Error);
        }
    }

    #[test]
    fn snapshot_wire_shape() {
        let mut job = job();
        job.start().unwrap();
        job.record_download(45.5, "3.1MiB/s", "00:02").unwrap();

        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["id"], "job-1");
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["progress"], "45.50%");
        assert_eq!(json["speed"], "3.1MiB/s");
        assert_eq!(json["eta"], "00:02");
        assert!(json["artifactPath"].is_null());
        assert!(json["error"].is_null());
        assert_eq!(json["revision"], 2);
    }

    #[test]
    fn revision_counts_accepted_transitions_only() {
        let mut job = job();
        assert_eq!(job.revision(), 0);
        job.start().unwrap();
        job.record_download(10.0, "", "").unwrap();
        job.record_download(5.0, "", "").unwrap();
        assert_eq!(job.revision(), 3);

        job.begin_processing().unwrap();
        assert!(job.record_download(50.0, "", "").is_err());
        assert!(job.begin_processing().is_err());
        assert_eq!(job.revision(), 4);

        job.complete("a.mp4").unwrap();
        assert!(job.fail("late").is_err());
        assert_eq!(job.snapshot().revision, 5);
    }

    #[test]
    fn done_snapshot_reports_full_progress() {
        let mut job = job();
        job.start().unwrap();
        job.begin_processing().unwrap();
        job.complete("a.mp4").unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.progress, "100.00%");
        assert!(snapshot.is_terminal());
    }
}

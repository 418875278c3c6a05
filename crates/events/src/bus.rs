//! In-process progress bus backed by one `tokio::sync::broadcast` channel
//! per job.
//!
//! [`ProgressBroadcaster`] is designed to be shared via
//! `Arc<ProgressBroadcaster>` between the orchestrator, the workers, and
//! whatever transport streams updates to viewers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::RwLock;

use futures::stream::{self, Stream};
use reelfetch_core::job::JobSnapshot;
use reelfetch_core::types::JobId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default buffer capacity of each job's channel.
const DEFAULT_CAPACITY: usize = 64;

/// Boxed stream of snapshots for a single job.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = JobSnapshot> + Send>>;

// ---------------------------------------------------------------------------
// ProgressBroadcaster
// ---------------------------------------------------------------------------

/// Fan-out of job snapshots to every subscriber of that job.
///
/// Publishing never waits: when a subscriber falls more than the channel
/// capacity behind, it skips the oldest snapshots (`RecvError::Lagged`)
/// instead of holding up the worker or other subscribers. There is no
/// replay; late subscribers read the current state from the job store.
pub struct ProgressBroadcaster {
    channels: RwLock<HashMap<JobId, broadcast::Sender<JobSnapshot>>>,
    capacity: usize,
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose per-job channels hold `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Open the channel for a job. Called once, when the job is created.
    pub fn open(&self, id: &JobId) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.entry(id.clone()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            sender
        });
    }

    /// Deliver a snapshot to all current subscribers of `id`.
    ///
    /// Publishing a terminal snapshot closes the job's channel, so every
    /// subscriber stream ends right after yielding it. Snapshots for jobs
    /// without an open channel are dropped.
    pub fn publish(&self, id: &JobId, snapshot: JobSnapshot) {
        let terminal = snapshot.is_terminal();

        if terminal {
            let sender = self
                .channels
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(id);
            if let Some(sender) = sender {
                // Zero receivers is the only failure and is not an error here.
                let _ = sender.send(snapshot);
            }
            return;
        }

        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        match channels.get(id) {
            Some(sender) => {
                let _ = sender.send(snapshot);
            }
            None => {
                tracing::trace!(job_id = %id, "No open channel, snapshot dropped");
            }
        }
    }

    /// Subscribe to future snapshots of a job.
    ///
    /// Returns `None` when the job has no open channel: it is unknown or
    /// has already reached a terminal state.
    pub fn subscribe(&self, id: &JobId) -> Option<SnapshotStream> {
        let receiver = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(broadcast::Sender::subscribe)?;
        Some(receiver_stream(id.clone(), receiver))
    }

    /// Number of jobs with an open channel.
    pub fn open_channels(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Current number of subscribers for a job.
    pub fn subscriber_count(&self, id: &JobId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Adapt a broadcast receiver into a stream that skips over lag and stops
/// after the terminal snapshot or when the channel closes.
fn receiver_stream(id: JobId, receiver: broadcast::Receiver<JobSnapshot>) -> SnapshotStream {
    Box::pin(stream::unfold(
        Some(receiver),
        move |state| {
            let id = id.clone();
            async move {
                let mut receiver = state?;
                loop {
                    match receiver.recv().await {
                        Ok(snapshot) => {
                            let next = if snapshot.is_terminal() {
                                None
                            } else {
                                Some(receiver)
                            };
                            return Some((snapshot, next));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(job_id = %id, skipped, "Subscriber lagged behind");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        },
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

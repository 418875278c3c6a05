//! The engine trait, its progress events, and its error type.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::options::FetchOptions;

/// A progress notification from the engine.
///
/// Values are passed through as the engine printed them; percentages are
/// normalized by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Transfer in progress.
    Downloading {
        percent: String,
        speed: String,
        eta: String,
    },
    /// The engine finished transferring a file.
    Finished,
    /// Any other status tag the engine reported.
    Other(String),
}

impl EngineEvent {
    /// Build an event from a raw status tag and its transfer fields.
    pub fn from_status(status: &str, percent: &str, speed: &str, eta: &str) -> Self {
        match status {
            "downloading" => Self::Downloading {
                percent: percent.to_string(),
                speed: clean_metric(speed),
                eta: clean_metric(eta),
            },
            "finished" => Self::Finished,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Engines print `NA`/`Unknown` placeholders for metrics they cannot
/// compute yet; those become empty strings.
fn clean_metric(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "NA" | "N/A" | "Unknown" | "None" => String::new(),
        _ => trimmed.to_string(),
    }
}

/// Write side of the progress channel handed to an engine.
///
/// Emitting never blocks and never fails; once the consumer is gone the
/// events are simply discarded.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ProgressSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

/// Errors raised by a fetch engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch fetch engine: {0}")]
    Spawn(std::io::Error),

    #[error("fetch engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("fetch engine did not report an output file")]
    NoOutput,

    #[error("{0}")]
    Other(String),
}

/// Retrieves (and possibly transcodes) remote media.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Fetch `url` according to `options`, reporting progress on `progress`.
    ///
    /// Returns the filename the engine produced. Post-processing may have
    /// changed its extension, so callers should treat it as a hint.
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        progress: ProgressSink,
    ) -> Result<PathBuf, EngineError>;
}

//! Fetch engine boundary.
//!
//! The job engine treats media retrieval as a black box behind
//! [`FetchEngine`]: it hands over a URL plus [`FetchOptions`], receives
//! [`EngineEvent`]s through a [`ProgressSink`], and gets back the path the
//! engine says it produced. [`YtDlpEngine`] is the production
//! implementation, driving the `yt-dlp` binary as a subprocess.

pub mod engine;
pub mod options;
pub mod ytdlp;

pub use engine::{EngineError, EngineEvent, FetchEngine, ProgressSink};
pub use options::FetchOptions;
pub use ytdlp::YtDlpEngine;

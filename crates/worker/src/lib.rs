//! Job execution: one isolated task per submitted URL.
//!
//! - [`JobOrchestrator`]: validates submissions, allocates jobs, spawns
//!   workers and answers status/subscription queries.
//! - [`ExecutionWorker`]: drives a single job through fetch, artifact
//!   resolution and its terminal state.
//! - [`artifact`]: locating, sanitizing and relocating the produced file.
//! - [`FetchConfig`]: environment-driven settings for all of the above.

pub mod artifact;
pub mod config;
pub mod orchestrator;
pub mod worker;

pub use artifact::{ArtifactError, ArtifactPolicy, ResolvedArtifact};
pub use config::{ConfigError, FetchConfig};
pub use orchestrator::JobOrchestrator;
pub use worker::{ExecutionWorker, JobFailure};

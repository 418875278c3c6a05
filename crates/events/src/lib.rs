//! Job progress fan-out.
//!
//! - [`ProgressBroadcaster`]: per-job publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`SnapshotStream`]: the subscriber side, a stream of
//!   [`JobSnapshot`](reelfetch_core::job::JobSnapshot)s that ends with the
//!   job's terminal snapshot.

pub mod bus;

pub use bus::{ProgressBroadcaster, SnapshotStream};

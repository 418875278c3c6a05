//! Per-job WebSocket progress streams.
//!
//! A client connects to one job and receives every snapshot as a JSON text
//! frame, starting with the current state. The server closes the socket
//! after the terminal snapshot.

mod handler;

pub use handler::job_stream_handler;

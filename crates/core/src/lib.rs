//! Domain types and pure helpers shared by every reelfetch crate.
//!
//! Nothing in here performs I/O: the job model, the progress normalizer,
//! filename sanitization and source-URL policy are all plain functions
//! over owned data so they can be tested in isolation.

pub mod error;
pub mod job;
pub mod naming;
pub mod progress;
pub mod source;
pub mod types;

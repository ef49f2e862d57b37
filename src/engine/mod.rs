//! Engine module: runs external tools and schedules triples.
//!
//! # Architecture
//!
//! - **Runner**: launches one child command with a log file and reports its exit
//!   status (`CommandRunner`). Every flow step goes through it.
//! - **Pool**: bounded set of worker threads, one triple per worker at a time
//!   (`WorkerPool`).
//! - **Workflow**: the per-triple state machine composing the step wrappers in
//!   `crate::tools` (`TripleFlow`).
//!
//! A single `CancelToken` is shared by all three so SIGINT stops admitting
//! triples and interrupts children already running.

pub mod cancel;
pub mod pool;
pub mod runner;
pub mod workflow;

// Re-export key types for convenience
pub use cancel::CancelToken;
pub use pool::WorkerPool;
pub use runner::{CommandOutcome, CommandRunner};
pub use workflow::{STATUS_FILE, StepRecord, TripleFlow, TripleReport, VPR_LOG};

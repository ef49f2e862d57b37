//! Storage layer for parse results.
//!
//! Result tables are persisted tab-separated, with a CSV export alongside.

pub mod results;

// Re-export key types
pub use results::{KEY_COLUMNS, ResultRow, ResultTable};

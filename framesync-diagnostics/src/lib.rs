//! # framesync diagnostics
//!
//! Logging setup and A/V synchronization diagnostics for framesync.
//! Provides the `tracing` subscriber installation and drift analysis of
//! session teardown reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod error;
pub mod sync_analyzer;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use error::DiagnosticsError;
pub use sync_analyzer::{SyncAnalyzer, SyncAssessment, SyncHealth, SyncThresholds};

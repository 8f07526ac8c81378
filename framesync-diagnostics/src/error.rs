//! Diagnostics error types

use thiserror::Error;

/// Errors from logging setup and report export
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    /// Filter directive could not be parsed
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// Filter as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// Report could not be serialized
    #[error("Serialization error: {source}")]
    Serialization {
        /// Underlying serde error
        #[from]
        source: serde_json::Error,
    },
}

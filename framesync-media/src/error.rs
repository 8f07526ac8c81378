//! Media pipeline error types and handling
//!
//! Every failure on the ingest path maps to one [`MediaError`] variant. Most
//! of them only cost the current unit: the session counts the drop and keeps
//! going. Sink failures are handed back verbatim so the caller can decide
//! whether to shut the session down.

use framesync_core::{DecodeError, ProtocolError};
use thiserror::Error;

/// Main error type for media pipeline operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// Malformed or out-of-sequence fragment, or unknown unit tag
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// Truncated or invalid frame header or payload
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Video frame arrived before any format metadata
    #[error("Not ready: video frame received before format metadata")]
    NotReady,

    /// Failure reported by the sink adapter
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Allocation failure or configured resource limit hit
    #[error("Resource error: {reason}")]
    Resource {
        /// Failure reason
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },
}

impl From<ProtocolError> for MediaError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Reassembly(inner) if inner.is_resource_exhaustion() => {
                MediaError::Resource {
                    reason: inner.to_string(),
                }
            }
            other => MediaError::Protocol(other),
        }
    }
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Protocol(_) => true,
            MediaError::Decode(_) => true,
            MediaError::NotReady => true,
            MediaError::Sink(_) => true,
            MediaError::Resource { .. } => true,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::InvalidState { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Protocol(_) => ErrorCategory::Protocol,
            MediaError::Decode(_) => ErrorCategory::Decode,
            MediaError::NotReady => ErrorCategory::NotReady,
            MediaError::Sink(_) => ErrorCategory::Sink,
            MediaError::Resource { .. } => ErrorCategory::Resource,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidState { .. } => ErrorCategory::State,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Framing protocol violations
    Protocol,
    /// Header and payload decoding errors
    Decode,
    /// Unit arrived before the session could interpret it
    NotReady,
    /// Sink adapter failures
    Sink,
    /// Memory and size limit errors
    Resource,
    /// Configuration and parameter errors
    Configuration,
    /// State management errors
    State,
}

/// Errors reported by a [`crate::sink::MediaSink`]
#[derive(Error, Debug)]
pub enum SinkError {
    /// Sink could not be opened
    #[error("Failed to open sink at {path}: {reason}")]
    Open {
        /// Output path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Packet could not be written
    #[error("Write failed on {stream} stream: {reason}")]
    Write {
        /// Stream the packet belonged to
        stream: &'static str,
        /// Failure reason
        reason: String,
    },

    /// Sink was already closed
    #[error("Sink already closed")]
    Closed,

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesync_core::ReassemblyError;

    #[test]
    fn test_error_categories() {
        let not_ready = MediaError::NotReady;
        assert_eq!(not_ready.category(), ErrorCategory::NotReady);
        assert!(not_ready.is_recoverable());

        let config_error = MediaError::InvalidConfiguration {
            message: "fps must be positive".to_string(),
        };
        assert_eq!(config_error.category(), ErrorCategory::Configuration);
        assert!(!config_error.is_recoverable());
    }

    #[test]
    fn test_resource_exhaustion_maps_to_resource() {
        let error = MediaError::from(ProtocolError::Reassembly(ReassemblyError::UnitTooLarge {
            size: 100,
            limit: 10,
        }));
        assert_eq!(error.category(), ErrorCategory::Resource);

        let error = MediaError::from(ProtocolError::Reassembly(ReassemblyError::NoActiveBuffer {
            fragment_index: 3,
        }));
        assert_eq!(error.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::Sink(SinkError::Write {
            stream: "video",
            reason: "disk full".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Sink error: Write failed on video stream: disk full"
        );
    }

    #[test]
    fn test_sink_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let sink_error = SinkError::from(io_error);

        match sink_error {
            SinkError::Io { .. } => (),
            _ => panic!("Expected Io error variant"),
        }
    }
}

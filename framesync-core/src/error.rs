//! Error types for framesync wire handling

use thiserror::Error;

/// Errors raised while reassembling fragmented logical units
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// Fragment is shorter than the fixed fragment header
    #[error("Truncated fragment header: need {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Header size in bytes
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// Continuation fragment arrived with no reassembly in progress
    #[error("No active reassembly buffer for fragment {fragment_index}")]
    NoActiveBuffer {
        /// Index of the offending fragment
        fragment_index: u8,
    },

    /// Continuation fragment does not follow the previous one of its unit
    #[error("Out-of-sequence fragment: expected index {expected}, got {got}")]
    OutOfSequence {
        /// Index the in-progress unit was waiting for
        expected: u8,
        /// Index that actually arrived
        got: u8,
    },

    /// Fragment payload does not fit into the declared logical unit
    #[error("Fragment out of bounds: offset {offset} + {len} bytes exceeds unit size {total_size}")]
    FragmentOutOfBounds {
        /// Offset of the fragment payload
        offset: u32,
        /// Length of the fragment payload
        len: usize,
        /// Declared logical unit size
        total_size: u32,
    },

    /// Fragment index lies beyond the declared last fragment
    #[error("Fragment index {fragment_index} beyond last fragment {last_index}")]
    IndexBeyondLast {
        /// Index of the offending fragment
        fragment_index: u8,
        /// Declared index of the last fragment
        last_index: u8,
    },

    /// Declared logical unit size exceeds the configured limit
    #[error("Logical unit too large: {size} bytes exceeds limit {limit}")]
    UnitTooLarge {
        /// Declared size
        size: u32,
        /// Configured limit
        limit: usize,
    },

    /// Reassembly buffer could not be allocated
    #[error("Reassembly buffer allocation failed: {size} bytes")]
    AllocationFailed {
        /// Requested size
        size: usize,
    },
}

impl ReassemblyError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ReassemblyError::TruncatedHeader { .. } => "TRUNCATED_FRAGMENT_HEADER",
            ReassemblyError::NoActiveBuffer { .. } => "NO_ACTIVE_BUFFER",
            ReassemblyError::OutOfSequence { .. } => "FRAGMENT_OUT_OF_SEQUENCE",
            ReassemblyError::FragmentOutOfBounds { .. } => "FRAGMENT_OUT_OF_BOUNDS",
            ReassemblyError::IndexBeyondLast { .. } => "FRAGMENT_INDEX_BEYOND_LAST",
            ReassemblyError::UnitTooLarge { .. } => "UNIT_TOO_LARGE",
            ReassemblyError::AllocationFailed { .. } => "ALLOCATION_FAILED",
        }
    }

    /// Whether the failure is caused by resource limits rather than a malformed stream
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            ReassemblyError::UnitTooLarge { .. } | ReassemblyError::AllocationFailed { .. }
        )
    }
}

/// Protocol violations on the framing layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed or out-of-sequence fragment
    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// Leading type tag is neither format metadata nor a video frame
    #[error("Unknown unit type tag: {tag:#04x}")]
    UnknownUnitType {
        /// Tag byte found on the wire
        tag: u8,
    },

    /// Logical unit carries no bytes at all
    #[error("Empty logical unit")]
    EmptyUnit,

    /// Unit cannot be expressed within the fragment index space
    #[error("Unit needs {needed} fragments, at most {max} allowed")]
    TooManyFragments {
        /// Fragments required
        needed: usize,
        /// Fragments addressable by the header
        max: usize,
    },
}

impl ProtocolError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::Reassembly(inner) => inner.error_code(),
            ProtocolError::UnknownUnitType { .. } => "UNKNOWN_UNIT_TYPE",
            ProtocolError::EmptyUnit => "EMPTY_UNIT",
            ProtocolError::TooManyFragments { .. } => "TOO_MANY_FRAGMENTS",
        }
    }
}

/// Errors raised while decoding frame headers and payload structures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes for the declared structure
    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        /// Structure being decoded
        what: &'static str,
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Presentation timescale is zero or negative
    #[error("Invalid timescale: {timescale}")]
    InvalidTimescale {
        /// Timescale found in the header
        timescale: i32,
    },

    /// Presentation time rescales to a negative or overflowing value
    #[error("Timestamp out of range: {value}/{timescale}")]
    TimestampOutOfRange {
        /// Timestamp value
        value: i64,
        /// Timestamp timescale
        timescale: i32,
    },

    /// Payload does not follow the expected structure
    #[error("Malformed payload: {reason}")]
    MalformedPayload {
        /// Reason for rejection
        reason: String,
    },
}

impl DecodeError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            DecodeError::Truncated { .. } => "TRUNCATED",
            DecodeError::InvalidTimescale { .. } => "INVALID_TIMESCALE",
            DecodeError::TimestampOutOfRange { .. } => "TIMESTAMP_OUT_OF_RANGE",
            DecodeError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ReassemblyError::FragmentOutOfBounds {
            offset: 10,
            len: 8,
            total_size: 12,
        };
        assert_eq!(
            error.to_string(),
            "Fragment out of bounds: offset 10 + 8 bytes exceeds unit size 12"
        );

        let error = ProtocolError::UnknownUnitType { tag: 7 };
        assert_eq!(error.to_string(), "Unknown unit type tag: 0x07");
    }

    #[test]
    fn test_resource_classification() {
        assert!(ReassemblyError::AllocationFailed { size: 1 }.is_resource_exhaustion());
        assert!(ReassemblyError::UnitTooLarge { size: 2, limit: 1 }.is_resource_exhaustion());
        assert!(!ReassemblyError::NoActiveBuffer { fragment_index: 2 }.is_resource_exhaustion());
    }

    #[test]
    fn test_protocol_error_code_passthrough() {
        let error = ProtocolError::from(ReassemblyError::NoActiveBuffer { fragment_index: 1 });
        assert_eq!(error.error_code(), "NO_ACTIVE_BUFFER");
    }
}

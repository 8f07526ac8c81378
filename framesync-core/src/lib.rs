//! # framesync core
//!
//! Wire framing, fragment reassembly and clock utilities for the framesync
//! audio/video pipeline. This crate knows nothing about codecs or sinks; it
//! turns fragmented byte buffers into type-tagged logical units and decodes
//! their headers.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod reassembly;
pub mod wire_format;

// Re-export main types
pub use clock::{
    format_duration_ms, format_timestamp, monotonic_ms, monotonic_ns, system_ms, Clock,
    ManualClock, MonotonicClock,
};
pub use error::{DecodeError, ProtocolError, ReassemblyError};
pub use reassembly::{
    DiscardedUnit, FragmentReassembler, ReassemblerConfig, ReassemblyStats,
};
pub use wire_format::{
    rescale, FragmentHeader, FrameHeader, LogicalFrame, PresentationTime, UnitKind, WireFormat,
    WireFragment, FORMAT_METADATA_TAG, FRAGMENT_HEADER_LEN, MAX_FRAGMENTS, VIDEO_FRAME_TAG,
};

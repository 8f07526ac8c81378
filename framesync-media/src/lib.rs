//! # framesync media
//!
//! Format metadata, A/V timeline synchronization and the sink contract.
//! This crate turns the logical units produced by `framesync-core` into
//! timestamped, self-contained packets and hands them to a [`MediaSink`].

#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod h264;
pub mod pacing;
pub mod params;
pub mod session;
pub mod sink;
pub mod timeline;
pub mod tracks;

// Re-export main types
pub use error::{ErrorCategory, MediaError, MediaResult, SinkError};
pub use format::{FormatMetadata, FormatMetadataCache};
pub use h264::{is_key_frame, nal_units, NalFraming};
pub use pacing::{AudioPacer, NoPacing, VideoClockPacer};
pub use params::{AudioParams, MediaStreamParams, VideoParams};
pub use session::{
    AudioOutcome, DropEvent, DropObserver, DropReason, DropStats, MediaStreamSession,
    SessionOptions, TracingDropObserver, VideoOutcome,
};
pub use sink::{MediaSink, MemorySink, SinkRecording};
pub use timeline::{
    AudioMode, StreamTimeline, SyncReport, TimelineConfig, TimelinePhase, TimelineSynchronizer,
    TimestampPolicy,
};
pub use tracks::{AudioUnit, MediaPacket, VideoPacket};

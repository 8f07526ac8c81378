//! # framesync - fragment reassembly and A/V timeline synchronization
//!
//! framesync sits between a capture or network source delivering encoded
//! media as (possibly fragmented) byte buffers and a muxer writing a
//! container. It reconstructs logical units from wire fragments, caches
//! H.264 parameter sets so every video packet is self-contained, and keeps
//! audio in step with video by inserting silence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framesync::{FrameSync, MemorySink, SessionConfig};
//!
//! # fn main() -> Result<(), framesync::MediaError> {
//! let framesync = FrameSync::init()?;
//! let session = framesync.open_session::<MemorySink>("out.mp4", SessionConfig::default())?;
//!
//! # let metadata_unit: &[u8] = &[];
//! # let video_fragment: &[u8] = &[];
//! # let audio_chunk: &[u8] = &[];
//! session.write_video(metadata_unit, false)?;
//! session.write_video(video_fragment, true)?;
//! session.write_audio(audio_chunk)?;
//!
//! let report = session.close()?;
//! println!("wrote {} video frames", report.video_frame_count);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use framesync_core::{
    rescale, Clock, DecodeError, FragmentReassembler, FrameHeader, LogicalFrame, ManualClock,
    MonotonicClock, PresentationTime, ProtocolError, ReassemblyError, UnitKind, WireFormat,
};

pub use framesync_media::{
    AudioOutcome, AudioParams, AudioUnit, DropObserver, DropReason, DropStats, FormatMetadata,
    MediaError, MediaResult, MediaSink, MediaStreamParams, MediaStreamSession, MemorySink,
    SessionOptions, SinkError, SinkRecording, StreamTimeline, SyncReport, TimelinePhase,
    TimestampPolicy, VideoOutcome, VideoPacket, VideoParams,
};

#[cfg(feature = "diagnostics")]
pub use framesync_diagnostics::{DebugLogger, SyncAnalyzer, SyncAssessment, SyncHealth};

// Public API modules
pub mod config;
pub mod handle;

// Re-export main API types
pub use config::{GlobalConfig, SessionConfig};
pub use handle::{SessionState, SharedSession};

use std::path::Path;

/// Main entry point for framesync
#[derive(Debug, Clone)]
pub struct FrameSync {
    inner: std::sync::Arc<FrameSyncInner>,
}

#[derive(Debug)]
struct FrameSyncInner {
    config: GlobalConfig,
}

impl FrameSync {
    /// Initialize framesync with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use framesync::FrameSync;
    ///
    /// let framesync = FrameSync::init()?;
    /// # Ok::<(), framesync::MediaError>(())
    /// ```
    pub fn init() -> MediaResult<Self> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration
    pub fn init_with(config: GlobalConfig) -> MediaResult<Self> {
        config.validate()?;

        if config.debug_logging {
            Self::init_logging(&config.log_filter)?;
        }
        tracing::debug!(
            "framesync initialized (default video {}x{}@{}fps)",
            config.default_params.video.width,
            config.default_params.video.height,
            config.default_params.video.fps
        );

        Ok(Self {
            inner: std::sync::Arc::new(FrameSyncInner { config }),
        })
    }

    #[cfg(feature = "diagnostics")]
    fn init_logging(filter: &str) -> MediaResult<()> {
        DebugLogger::init_logging(filter)
            .map(|_| ())
            .map_err(|e| MediaError::InvalidConfiguration {
                message: e.to_string(),
            })
    }

    #[cfg(not(feature = "diagnostics"))]
    fn init_logging(_filter: &str) -> MediaResult<()> {
        Ok(())
    }

    /// Global configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Session config seeded with the global default parameters
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.inner.config.default_params.clone())
    }

    /// Open a session, opening a sink of type `S` at `path`
    pub fn open_session<S: MediaSink>(
        &self,
        path: impl AsRef<Path>,
        config: SessionConfig,
    ) -> MediaResult<SharedSession<S>> {
        self.open_session_with(path, config, |options| options)
    }

    /// Open a session, adjusting the derived options (clock, pacer, observer) first
    pub fn open_session_with<S: MediaSink>(
        &self,
        path: impl AsRef<Path>,
        config: SessionConfig,
        customize: impl FnOnce(SessionOptions) -> SessionOptions,
    ) -> MediaResult<SharedSession<S>> {
        config.validate()?;
        let options = customize(config.to_options());
        let session = MediaStreamSession::open_with(path, config.params, options)?;
        Ok(SharedSession::new(session))
    }
}

//! Recording session pipeline
//!
//! A [`MediaStreamSession`] owns everything one recording needs: the fragment
//! reassembler, the format metadata cache, the timeline synchronizer and the
//! sink. Each call runs to completion on the calling thread.
//!
//! Video path: fragment -> reassembler -> unit dispatch -> header decode ->
//! metadata check -> access unit -> key frame detection -> timestamp -> sink.
//! Audio path: chunk -> synchronizer (accumulation, pacing) -> sink.
//!
//! Units that cannot be used are dropped, counted in [`DropStats`] and
//! reported to the session's [`DropObserver`]; the session keeps going.

use crate::error::{MediaError, MediaResult};
use crate::format::{FormatMetadata, FormatMetadataCache};
use crate::h264;
use crate::pacing::{AudioPacer, NoPacing, VideoClockPacer};
use crate::params::MediaStreamParams;
use crate::sink::MediaSink;
use crate::timeline::{
    AudioMode, StreamTimeline, SyncReport, TimelineConfig, TimelineSynchronizer, TimestampPolicy,
};
use bytes::Bytes;
use framesync_core::{
    Clock, FragmentReassembler, FrameHeader, LogicalFrame, MonotonicClock, ReassemblerConfig,
    ReassemblyStats, UnitKind,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Why a unit was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Fragment protocol violation or unknown unit tag
    Protocol,
    /// Unit exceeded size limits or could not be allocated
    Resource,
    /// Frame header or payload could not be decoded
    Decode,
    /// Video frame before any format metadata
    NotReady,
    /// Sink refused the packet
    SinkWrite,
    /// Partially reassembled unit replaced by a new one
    DiscardedPartial,
}

impl DropReason {
    /// Drop reason for an error on the ingest path
    pub fn for_error(error: &MediaError) -> Option<Self> {
        match error {
            MediaError::Protocol(_) => Some(DropReason::Protocol),
            MediaError::Resource { .. } => Some(DropReason::Resource),
            MediaError::Decode(_) => Some(DropReason::Decode),
            MediaError::NotReady => Some(DropReason::NotReady),
            MediaError::Sink(_) => Some(DropReason::SinkWrite),
            MediaError::InvalidConfiguration { .. } | MediaError::InvalidState { .. } => None,
        }
    }
}

/// Dropped unit counts by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    /// Protocol violations
    pub protocol: u64,
    /// Resource limit or allocation failures
    pub resource: u64,
    /// Decode failures
    pub decode: u64,
    /// Video frames before format metadata
    pub not_ready: u64,
    /// Packets the sink refused
    pub sink_write: u64,
    /// Partial units replaced before completion
    pub discarded_partial: u64,
}

impl DropStats {
    /// Count `count` drops for `reason`
    pub fn record(&mut self, reason: DropReason, count: u64) {
        let counter = match reason {
            DropReason::Protocol => &mut self.protocol,
            DropReason::Resource => &mut self.resource,
            DropReason::Decode => &mut self.decode,
            DropReason::NotReady => &mut self.not_ready,
            DropReason::SinkWrite => &mut self.sink_write,
            DropReason::DiscardedPartial => &mut self.discarded_partial,
        };
        *counter += count;
    }

    /// Count for one reason
    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::Protocol => self.protocol,
            DropReason::Resource => self.resource,
            DropReason::Decode => self.decode,
            DropReason::NotReady => self.not_ready,
            DropReason::SinkWrite => self.sink_write,
            DropReason::DiscardedPartial => self.discarded_partial,
        }
    }

    /// Total drops across all reasons
    pub fn total(&self) -> u64 {
        self.protocol
            + self.resource
            + self.decode
            + self.not_ready
            + self.sink_write
            + self.discarded_partial
    }
}

/// One drop, as reported to a [`DropObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEvent {
    /// Session the drop happened in
    pub session_id: Uuid,
    /// Drop reason
    pub reason: DropReason,
    /// Number of units lost
    pub count: u64,
    /// Human readable cause
    pub detail: String,
}

/// Receives every drop of a session
pub trait DropObserver: Send + std::fmt::Debug {
    /// Called once per drop path taken
    fn on_drop(&self, event: &DropEvent);
}

/// Logs drops as `tracing` warnings
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDropObserver;

impl DropObserver for TracingDropObserver {
    fn on_drop(&self, event: &DropEvent) {
        tracing::warn!(
            "Dropped {} unit(s) ({:?}): {}",
            event.count,
            event.reason,
            event.detail
        );
    }
}

/// Per-session tuning beyond the stream parameters
#[derive(Debug)]
pub struct SessionOptions {
    /// Video timestamp source
    pub policy: TimestampPolicy,
    /// Duration of one audio unit in milliseconds
    pub audio_unit_ms: u64,
    /// Bytes per raw audio unit in encode mode
    pub audio_unit_bytes: usize,
    /// Reassembly limits
    pub reassembler: ReassemblerConfig,
    /// Clock used for the local anchors
    pub clock: Arc<dyn Clock>,
    /// Audio pacer; chosen from the audio mode when unset
    pub pacer: Option<Box<dyn AudioPacer>>,
    /// Drop observer; logs through `tracing` when unset
    pub drop_observer: Option<Box<dyn DropObserver>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: TimestampPolicy::default(),
            audio_unit_ms: VideoClockPacer::DEFAULT_UNIT_MS,
            // 1024 samples x 2 bytes
            audio_unit_bytes: 2048,
            reassembler: ReassemblerConfig::default(),
            clock: Arc::new(MonotonicClock),
            pacer: None,
            drop_observer: None,
        }
    }
}

impl SessionOptions {
    /// Set the video timestamp source
    pub fn with_policy(mut self, policy: TimestampPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the audio unit duration
    pub fn with_audio_unit_ms(mut self, audio_unit_ms: u64) -> Self {
        self.audio_unit_ms = audio_unit_ms;
        self
    }

    /// Set the raw audio unit size
    pub fn with_audio_unit_bytes(mut self, audio_unit_bytes: usize) -> Self {
        self.audio_unit_bytes = audio_unit_bytes;
        self
    }

    /// Set the largest logical unit the reassembler accepts
    pub fn with_max_unit_size(mut self, max_unit_size: usize) -> Self {
        self.reassembler.max_unit_size = max_unit_size;
        self
    }

    /// Use a specific clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Use a specific audio pacer
    pub fn with_pacer(mut self, pacer: impl AudioPacer + 'static) -> Self {
        self.pacer = Some(Box::new(pacer));
        self
    }

    /// Report drops to a specific observer
    pub fn with_drop_observer(mut self, observer: impl DropObserver + 'static) -> Self {
        self.drop_observer = Some(Box::new(observer));
        self
    }

    fn validate(&self) -> MediaResult<()> {
        if self.audio_unit_ms == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "audio_unit_ms must be positive".to_string(),
            });
        }
        if self.audio_unit_bytes == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "audio_unit_bytes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of one video-path call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    /// Fragment accepted, unit not complete yet
    Pending,
    /// Format metadata replaced
    FormatUpdated {
        /// Total metadata updates so far
        update_count: u64,
    },
    /// Video packet written to the sink
    Written {
        /// Timestamp written on the packet
        timestamp_ms: u64,
        /// Whether the packet was flagged as a key frame
        is_key_frame: bool,
        /// Position in the video track
        frame_index: u64,
    },
}

/// Result of one audio-path call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioOutcome {
    /// Units written, silence included
    pub units_written: usize,
    /// Silence units among them
    pub silence_units: usize,
}

/// One recording session writing into a sink
pub struct MediaStreamSession<S: MediaSink> {
    id: Uuid,
    path: PathBuf,
    params: MediaStreamParams,
    sink: S,
    reassembler: FragmentReassembler,
    format: FormatMetadataCache,
    sync: TimelineSynchronizer,
    drops: DropStats,
    observer: Box<dyn DropObserver>,
    span: tracing::Span,
}

impl<S: MediaSink> MediaStreamSession<S> {
    /// Open a session with default options
    pub fn open(path: impl AsRef<Path>, params: MediaStreamParams) -> MediaResult<Self> {
        Self::open_with(path, params, SessionOptions::default())
    }

    /// Open a session, opening its sink at `path`
    pub fn open_with(
        path: impl AsRef<Path>,
        params: MediaStreamParams,
        options: SessionOptions,
    ) -> MediaResult<Self> {
        params.validate()?;
        options.validate()?;
        let path = path.as_ref();
        let sink = S::open(path, &params.video, &params.audio_out)?;
        Self::with_sink(sink, path, params, options)
    }

    /// Build a session around an already opened sink
    pub fn with_sink(
        sink: S,
        path: impl AsRef<Path>,
        params: MediaStreamParams,
        options: SessionOptions,
    ) -> MediaResult<Self> {
        params.validate()?;
        options.validate()?;

        let id = Uuid::new_v4();
        let path = path.as_ref().to_path_buf();
        let span = tracing::info_span!("session", id = %id, path = %path.display());

        let audio_mode = if params.need_encode {
            AudioMode::Encode {
                unit_bytes: options.audio_unit_bytes,
            }
        } else {
            AudioMode::PassThrough
        };
        let pacer = options.pacer.unwrap_or_else(|| -> Box<dyn AudioPacer> {
            match audio_mode {
                AudioMode::Encode { .. } => Box::new(VideoClockPacer::new(options.audio_unit_ms)),
                AudioMode::PassThrough => Box::new(NoPacing),
            }
        });
        let sync = TimelineSynchronizer::new(
            TimelineConfig {
                policy: options.policy,
                fps: params.video.fps,
                audio_unit_ms: options.audio_unit_ms,
                audio_mode,
            },
            options.clock,
            pacer,
        );

        span.in_scope(|| {
            tracing::info!(
                "Opened session {}x{}@{}fps, audio {} ({:?} timestamps)",
                params.video.width,
                params.video.height,
                params.video.fps,
                if params.need_encode { "encode" } else { "pass-through" },
                options.policy
            );
        });

        Ok(Self {
            id,
            path,
            params,
            sink,
            reassembler: FragmentReassembler::with_config(options.reassembler),
            format: FormatMetadataCache::new(),
            sync,
            drops: DropStats::default(),
            observer: options
                .drop_observer
                .unwrap_or_else(|| -> Box<dyn DropObserver> { Box::new(TracingDropObserver) }),
            span,
        })
    }

    /// Submit one video-path buffer, fragmented or self-contained
    pub fn write_video(&mut self, data: &[u8], fragmented: bool) -> MediaResult<VideoOutcome> {
        if fragmented {
            self.submit_fragment(data)
        } else {
            self.submit_unit(data)
        }
    }

    /// Submit one wire fragment
    pub fn submit_fragment(&mut self, data: &[u8]) -> MediaResult<VideoOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        let result = self.reassembler.submit(data);
        if let Some(discarded) = self.reassembler.take_discarded() {
            self.record_drop(
                DropReason::DiscardedPartial,
                1,
                format!(
                    "{} of {} fragments of a {} byte unit",
                    discarded.fragments_received, discarded.fragments_expected, discarded.total_size
                ),
            );
        }

        match result {
            Ok(None) => Ok(VideoOutcome::Pending),
            Ok(Some(frame)) => self.dispatch(frame),
            Err(error) => Err(self.reject(error.into())),
        }
    }

    /// Submit one self-contained, tagged unit
    pub fn submit_unit(&mut self, data: &[u8]) -> MediaResult<VideoOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        match LogicalFrame::from_tagged(Bytes::copy_from_slice(data)) {
            Ok(frame) => self.dispatch(frame),
            Err(error) => Err(self.reject(error.into())),
        }
    }

    fn dispatch(&mut self, frame: LogicalFrame) -> MediaResult<VideoOutcome> {
        match frame.kind {
            UnitKind::FormatMetadata => {
                let metadata = match FormatMetadata::parse(&frame.payload) {
                    Ok(metadata) => metadata,
                    Err(error) => return Err(self.reject(error.into())),
                };
                let update_count = self.format.update(metadata);
                self.sync.record_format_update();
                tracing::debug!("Format metadata update #{}", update_count);
                Ok(VideoOutcome::FormatUpdated { update_count })
            }
            UnitKind::VideoFrame => self.handle_video(&frame.payload),
        }
    }

    fn handle_video(&mut self, payload: &[u8]) -> MediaResult<VideoOutcome> {
        let header = match FrameHeader::decode(payload) {
            Ok(header) => header,
            Err(error) => return Err(self.reject(error.into())),
        };

        let built = self
            .format
            .current()
            .map(|metadata| metadata.build_access_unit(header.frame_data));
        let access_unit = match built {
            None => return Err(self.reject(MediaError::NotReady)),
            Some(Err(error)) => return Err(self.reject(error.into())),
            Some(Ok(access_unit)) => access_unit,
        };

        let is_key_frame = h264::is_key_frame(header.frame_data);
        let packet = match self
            .sync
            .stamp_video(header.presentation_time, access_unit, is_key_frame)
        {
            Ok(packet) => packet,
            Err(error) => return Err(self.reject(error.into())),
        };

        if let Err(error) = self.sink.write_video_packet(&packet) {
            return Err(self.reject(error.into()));
        }

        tracing::debug!(
            "Video frame {} at {}ms{}",
            packet.frame_index,
            packet.timestamp_ms,
            if packet.is_key_frame { " (key)" } else { "" }
        );
        Ok(VideoOutcome::Written {
            timestamp_ms: packet.timestamp_ms,
            is_key_frame: packet.is_key_frame,
            frame_index: packet.frame_index,
        })
    }

    /// Submit one raw or encoded audio chunk
    ///
    /// On a sink failure the remaining units of this call are lost and
    /// counted; the error is returned and the session stays open.
    pub fn write_audio(&mut self, data: &[u8]) -> MediaResult<AudioOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        let units = self.sync.push_audio(data);
        let mut outcome = AudioOutcome::default();
        for (written, unit) in units.iter().enumerate() {
            if let Err(error) = self.sink.write_audio_unit(unit) {
                let lost = (units.len() - written) as u64;
                self.record_drop(DropReason::SinkWrite, lost, error.to_string());
                return Err(error.into());
            }
            outcome.units_written += 1;
            if unit.is_silence {
                outcome.silence_units += 1;
            }
        }

        if outcome.units_written > 0 {
            tracing::debug!(
                "Wrote {} audio unit(s), {} silence",
                outcome.units_written,
                outcome.silence_units
            );
        }
        Ok(outcome)
    }

    /// Close the session, finishing the sink
    pub fn close(mut self) -> MediaResult<SyncReport> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.reassembler.is_assembling() {
            self.record_drop(
                DropReason::DiscardedPartial,
                1,
                "unit incomplete at close".to_string(),
            );
            self.reassembler.reset();
        }

        let report = self.sync.report();
        tracing::info!(
            "Closing session: video {}/{} frames (drift {}), audio {}/{} units (drift {}, {} silence), {} dropped",
            report.video_frame_count,
            report.expected_video_frames,
            report.video_drift(),
            report.audio_sample_count,
            report.expected_audio_samples,
            report.audio_drift(),
            report.silence_unit_count,
            self.drops.total()
        );

        self.sink.close()?;
        Ok(report)
    }

    /// Session identifier
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream parameters
    pub fn params(&self) -> &MediaStreamParams {
        &self.params
    }

    /// Drop counts by reason
    pub fn stats(&self) -> &DropStats {
        &self.drops
    }

    /// Reassembler counters
    pub fn reassembly_stats(&self) -> &ReassemblyStats {
        self.reassembler.stats()
    }

    /// Timeline state
    pub fn timeline(&self) -> &StreamTimeline {
        self.sync.timeline()
    }

    /// Current format metadata
    pub fn format_metadata(&self) -> Option<&FormatMetadata> {
        self.format.current()
    }

    /// Report of the session so far
    pub fn report(&self) -> SyncReport {
        self.sync.report()
    }

    /// Underlying sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn reject(&mut self, error: MediaError) -> MediaError {
        if let Some(reason) = DropReason::for_error(&error) {
            self.record_drop(reason, 1, error.to_string());
        }
        error
    }

    fn record_drop(&mut self, reason: DropReason, count: u64, detail: String) {
        self.drops.record(reason, count);
        self.observer.on_drop(&DropEvent {
            session_id: self.id,
            reason,
            count,
            detail,
        });
    }
}

impl<S: MediaSink> std::fmt::Debug for MediaStreamSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStreamSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("phase", &self.sync.timeline().phase())
            .field("drops", &self.drops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use framesync_core::{ManualClock, PresentationTime, WireFormat};
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Default)]
    struct CollectingObserver {
        events: Arc<Mutex<Vec<DropEvent>>>,
    }

    impl DropObserver for CollectingObserver {
        fn on_drop(&self, event: &DropEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn metadata_unit() -> Bytes {
        FormatMetadata::new(vec![0x67, 0x42, 0x00, 0x1E], vec![0x68, 0xCE, 0x38, 0x80]).to_unit()
    }

    fn idr_unit(ms: i64) -> Bytes {
        WireFormat::encode_video_unit(PresentationTime::new(ms, 1000), &[0, 0, 0, 2, 0x65, 0x88])
    }

    fn session(observer: &CollectingObserver) -> MediaStreamSession<MemorySink> {
        MediaStreamSession::open_with(
            "test.mp4",
            MediaStreamParams::default(),
            SessionOptions::default()
                .with_clock(ManualClock::new(0))
                .with_drop_observer(observer.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_tag_is_counted() {
        let observer = CollectingObserver::default();
        let mut session = session(&observer);

        let err = session.submit_unit(&[0x09, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, MediaError::Protocol(_)));
        assert_eq!(session.stats().protocol, 1);

        let events = observer.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, DropReason::Protocol);
        assert_eq!(events[0].session_id, session.session_id());
    }

    #[test]
    fn test_discarded_partial_is_reported() {
        let observer = CollectingObserver::default();
        let mut session = session(&observer);
        session.submit_unit(&metadata_unit()).unwrap();

        let big = WireFormat::encode_video_unit(PresentationTime::new(0, 1000), &[0x41; 64]);
        let fragments = WireFormat::fragment_unit(&big, 32).unwrap();
        assert_eq!(
            session.submit_fragment(&fragments[0]).unwrap(),
            VideoOutcome::Pending
        );

        let single = WireFormat::fragment_unit(&idr_unit(0), 1024).unwrap();
        let outcome = session.submit_fragment(&single[0]).unwrap();
        assert!(matches!(outcome, VideoOutcome::Written { .. }));
        assert_eq!(session.stats().get(DropReason::DiscardedPartial), 1);
        assert_eq!(observer.events.lock()[0].reason, DropReason::DiscardedPartial);
    }

    #[test]
    fn test_incomplete_unit_at_close_is_counted() {
        let observer = CollectingObserver::default();
        let mut session = session(&observer);

        let unit = idr_unit(0);
        let fragments = WireFormat::fragment_unit(&unit, 8).unwrap();
        session.submit_fragment(&fragments[0]).unwrap();
        session.close().unwrap();

        let events = observer.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detail, "unit incomplete at close");
    }

    #[test]
    fn test_invalid_options_rejected() {
        let result = MediaStreamSession::<MemorySink>::open_with(
            "x.mp4",
            MediaStreamParams::default(),
            SessionOptions::default().with_audio_unit_ms(0),
        );
        assert!(matches!(
            result,
            Err(MediaError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_drop_stats_totals() {
        let mut stats = DropStats::default();
        stats.record(DropReason::Decode, 2);
        stats.record(DropReason::SinkWrite, 3);
        assert_eq!(stats.get(DropReason::Decode), 2);
        assert_eq!(stats.total(), 5);
    }
}

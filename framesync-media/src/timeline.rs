//! A/V timeline synchronization
//!
//! The synchronizer turns decoded video frames into timestamped packets and
//! raw audio chunks into indexed audio units. Video and audio keep separate
//! anchors: each is fixed on the first unit of its track and never moves
//! until the session closes. Audio is paced against the video presentation
//! clock by inserting silence units; audio is never dropped.

use crate::pacing::AudioPacer;
use crate::tracks::{AudioUnit, VideoPacket};
use bytes::{Bytes, BytesMut};
use framesync_core::{Clock, DecodeError, PresentationTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which clock drives the timestamp written on video packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Presentation time carried by the frame header
    #[default]
    RemoteClock,
    /// Local arrival time relative to the first video frame
    LocalClock,
    /// `frame_index * 1000 / fps`
    FrameIndex,
}

/// Progress of the session timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelinePhase {
    /// No video frame yet
    AwaitingVideo,
    /// Video anchored, audio not yet
    VideoStarted,
    /// Both tracks anchored
    Synchronized,
}

/// How incoming audio chunks become audio units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Raw audio is cut into fixed-size units for the encoder
    Encode {
        /// Bytes per unit
        unit_bytes: usize,
    },
    /// Every chunk is already one encoded unit
    PassThrough,
}

/// Per-session timeline state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTimeline {
    video_stream_start_ms: Option<u64>,
    audio_stream_start_ms: Option<u64>,
    last_video_remote_ms: u64,
    last_video_local_ms: u64,
    video_frame_count: u64,
    audio_sample_count: u64,
    silence_unit_count: u64,
    audio_chunk_count: u64,
    format_update_count: u64,
}

impl StreamTimeline {
    /// Local time of the first video frame
    pub fn video_stream_start_ms(&self) -> Option<u64> {
        self.video_stream_start_ms
    }

    /// Local time of the first audio chunk
    pub fn audio_stream_start_ms(&self) -> Option<u64> {
        self.audio_stream_start_ms
    }

    /// Presentation time of the most recent video frame
    pub fn last_video_remote_ms(&self) -> u64 {
        self.last_video_remote_ms
    }

    /// Arrival time of the most recent video frame, relative to the video anchor
    pub fn last_video_local_ms(&self) -> u64 {
        self.last_video_local_ms
    }

    /// Video packets emitted
    pub fn video_frame_count(&self) -> u64 {
        self.video_frame_count
    }

    /// Audio units emitted, silence included
    pub fn audio_sample_count(&self) -> u64 {
        self.audio_sample_count
    }

    /// Silence units emitted
    pub fn silence_unit_count(&self) -> u64 {
        self.silence_unit_count
    }

    /// Raw audio chunks received
    pub fn audio_chunk_count(&self) -> u64 {
        self.audio_chunk_count
    }

    /// Format metadata updates seen
    pub fn format_update_count(&self) -> u64 {
        self.format_update_count
    }

    /// Current phase
    pub fn phase(&self) -> TimelinePhase {
        match (self.video_stream_start_ms, self.audio_stream_start_ms) {
            (None, _) => TimelinePhase::AwaitingVideo,
            (Some(_), None) => TimelinePhase::VideoStarted,
            (Some(_), Some(_)) => TimelinePhase::Synchronized,
        }
    }
}

/// Fixed parameters of a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Video timestamp source
    pub policy: TimestampPolicy,
    /// Nominal video frame rate
    pub fps: u32,
    /// Duration of one audio unit in milliseconds
    pub audio_unit_ms: u64,
    /// Audio unit production mode
    pub audio_mode: AudioMode,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            policy: TimestampPolicy::RemoteClock,
            fps: 30,
            audio_unit_ms: 125,
            // 1024 samples x 2 bytes
            audio_mode: AudioMode::Encode { unit_bytes: 2048 },
        }
    }
}

/// Stamps video frames and paces audio units for one session
#[derive(Debug)]
pub struct TimelineSynchronizer {
    config: TimelineConfig,
    clock: Arc<dyn Clock>,
    pacer: Box<dyn AudioPacer>,
    pending_audio: BytesMut,
    timeline: StreamTimeline,
}

impl TimelineSynchronizer {
    /// Create a synchronizer
    pub fn new(config: TimelineConfig, clock: Arc<dyn Clock>, pacer: Box<dyn AudioPacer>) -> Self {
        Self {
            config,
            clock,
            pacer,
            pending_audio: BytesMut::new(),
            timeline: StreamTimeline::default(),
        }
    }

    /// Stamp one video access unit
    ///
    /// The video anchor is fixed on the first successfully stamped frame.
    /// A frame whose presentation time cannot be converted leaves the
    /// timeline untouched.
    pub fn stamp_video(
        &mut self,
        presentation_time: PresentationTime,
        access_unit: Bytes,
        is_key_frame: bool,
    ) -> Result<VideoPacket, DecodeError> {
        let remote_ms = presentation_time.to_millis()?;

        let now = self.clock.now_ms();
        let start = *self.timeline.video_stream_start_ms.get_or_insert(now);
        let local_ms = now.saturating_sub(start);

        let frame_index = self.timeline.video_frame_count;
        let timestamp_ms = match self.config.policy {
            TimestampPolicy::RemoteClock => remote_ms,
            TimestampPolicy::LocalClock => local_ms,
            TimestampPolicy::FrameIndex => {
                frame_index.saturating_mul(1000) / u64::from(self.config.fps.max(1))
            }
        };

        self.timeline.last_video_remote_ms = remote_ms;
        self.timeline.last_video_local_ms = local_ms;
        self.timeline.video_frame_count += 1;

        tracing::trace!(
            "Video frame {} remote={}ms local={}ms key={}",
            frame_index,
            remote_ms,
            local_ms,
            is_key_frame
        );

        Ok(VideoPacket {
            data: access_unit,
            timestamp_ms,
            is_key_frame,
            frame_index,
        })
    }

    /// Accept one raw audio chunk, returning the units ready for the sink
    pub fn push_audio(&mut self, chunk: &[u8]) -> Vec<AudioUnit> {
        let now = self.clock.now_ms();
        self.timeline.audio_stream_start_ms.get_or_insert(now);
        self.timeline.audio_chunk_count += 1;

        let mut units = Vec::new();
        match self.config.audio_mode {
            AudioMode::Encode { unit_bytes } => {
                let unit_bytes = unit_bytes.max(1);
                self.pending_audio.extend_from_slice(chunk);
                while self.pending_audio.len() >= unit_bytes {
                    let real = self.pending_audio.split_to(unit_bytes).freeze();
                    self.emit_paced(real, &mut units);
                }
            }
            AudioMode::PassThrough => {
                if !chunk.is_empty() {
                    self.emit_paced(Bytes::copy_from_slice(chunk), &mut units);
                }
            }
        }
        units
    }

    fn emit_paced(&mut self, real: Bytes, units: &mut Vec<AudioUnit>) {
        let silence = self
            .pacer
            .silence_units(self.timeline.last_video_remote_ms, self.timeline.audio_sample_count);

        if silence > 0 {
            tracing::debug!(
                "Inserting {} silence units at sample {} (video at {}ms)",
                silence,
                self.timeline.audio_sample_count,
                self.timeline.last_video_remote_ms
            );
            let zeros = Bytes::from(vec![0u8; real.len()]);
            for _ in 0..silence {
                units.push(AudioUnit::silence(zeros.clone(), self.next_sample_index()));
                self.timeline.silence_unit_count += 1;
            }
        }

        let sample_index = self.next_sample_index();
        units.push(AudioUnit::real(real, sample_index));
    }

    fn next_sample_index(&mut self) -> u64 {
        let index = self.timeline.audio_sample_count;
        self.timeline.audio_sample_count += 1;
        index
    }

    /// Record that new format metadata arrived
    pub fn record_format_update(&mut self) {
        self.timeline.format_update_count += 1;
    }

    /// Current timeline state
    pub fn timeline(&self) -> &StreamTimeline {
        &self.timeline
    }

    /// Synchronizer configuration
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Raw audio bytes waiting for a complete unit
    pub fn pending_audio_bytes(&self) -> usize {
        self.pending_audio.len()
    }

    /// Build the teardown report
    pub fn report(&self) -> SyncReport {
        let t = &self.timeline;
        let elapsed_secs = t.last_video_remote_ms / 1000;
        let expected_video_frames = elapsed_secs * u64::from(self.config.fps);
        let expected_audio_samples = elapsed_secs * 1000 / self.config.audio_unit_ms.max(1);

        SyncReport {
            elapsed_secs,
            fps: self.config.fps,
            audio_unit_ms: self.config.audio_unit_ms,
            video_frame_count: t.video_frame_count,
            expected_video_frames,
            audio_sample_count: t.audio_sample_count,
            expected_audio_samples,
            silence_unit_count: t.silence_unit_count,
            audio_chunk_count: t.audio_chunk_count,
            format_update_count: t.format_update_count,
            video_stream_start_ms: t.video_stream_start_ms,
            audio_stream_start_ms: t.audio_stream_start_ms,
            last_video_remote_ms: t.last_video_remote_ms,
            last_video_local_ms: t.last_video_local_ms,
            pending_audio_bytes: self.pending_audio.len(),
        }
    }
}

/// Final counts of a session, compared against what the video clock implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Whole seconds of video presentation time
    pub elapsed_secs: u64,
    /// Nominal video frame rate
    pub fps: u32,
    /// Duration of one audio unit in milliseconds
    pub audio_unit_ms: u64,
    /// Video packets emitted
    pub video_frame_count: u64,
    /// `elapsed_secs * fps`
    pub expected_video_frames: u64,
    /// Audio units emitted, silence included
    pub audio_sample_count: u64,
    /// `elapsed_secs * 1000 / audio_unit_ms`
    pub expected_audio_samples: u64,
    /// Silence units among the audio units
    pub silence_unit_count: u64,
    /// Raw audio chunks received
    pub audio_chunk_count: u64,
    /// Format metadata updates seen
    pub format_update_count: u64,
    /// Video anchor
    pub video_stream_start_ms: Option<u64>,
    /// Audio anchor
    pub audio_stream_start_ms: Option<u64>,
    /// Presentation time of the last video frame
    pub last_video_remote_ms: u64,
    /// Arrival time of the last video frame relative to the video anchor
    pub last_video_local_ms: u64,
    /// Raw audio left over that never filled a unit
    pub pending_audio_bytes: usize,
}

impl SyncReport {
    /// Emitted minus expected video frames
    pub fn video_drift(&self) -> i64 {
        signed_diff(self.video_frame_count, self.expected_video_frames)
    }

    /// Emitted minus expected audio units
    pub fn audio_drift(&self) -> i64 {
        signed_diff(self.audio_sample_count, self.expected_audio_samples)
    }

    /// Gap between remote and local video clocks in milliseconds (remote minus local)
    pub fn clock_skew_ms(&self) -> i64 {
        signed_diff(self.last_video_remote_ms, self.last_video_local_ms)
    }
}

fn signed_diff(actual: u64, expected: u64) -> i64 {
    (i128::from(actual) - i128::from(expected)).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::{NoPacing, VideoClockPacer};
    use framesync_core::ManualClock;

    fn synchronizer(config: TimelineConfig, clock: &ManualClock) -> TimelineSynchronizer {
        let pacer: Box<dyn AudioPacer> = match config.audio_mode {
            AudioMode::Encode { .. } => Box::new(VideoClockPacer::new(config.audio_unit_ms)),
            AudioMode::PassThrough => Box::new(NoPacing),
        };
        TimelineSynchronizer::new(config, Arc::new(clock.clone()), pacer)
    }

    fn encode_config(unit_bytes: usize) -> TimelineConfig {
        TimelineConfig {
            audio_mode: AudioMode::Encode { unit_bytes },
            ..Default::default()
        }
    }

    #[test]
    fn test_remote_timestamps_and_anchor() {
        let clock = ManualClock::new(5_000);
        let mut sync = synchronizer(TimelineConfig::default(), &clock);
        assert_eq!(sync.timeline().phase(), TimelinePhase::AwaitingVideo);

        let first = sync
            .stamp_video(PresentationTime::new(0, 1000), Bytes::from_static(b"a"), true)
            .unwrap();
        clock.advance(40);
        let second = sync
            .stamp_video(PresentationTime::new(3000, 90000), Bytes::from_static(b"b"), false)
            .unwrap();

        assert_eq!(first.timestamp_ms, 0);
        assert!(first.is_key_frame);
        assert_eq!(second.timestamp_ms, 33);
        assert_eq!(second.frame_index, 1);
        assert!(!second.is_key_frame);

        let timeline = sync.timeline();
        assert_eq!(timeline.video_stream_start_ms(), Some(5_000));
        assert_eq!(timeline.last_video_local_ms(), 40);
        assert_eq!(timeline.phase(), TimelinePhase::VideoStarted);
    }

    #[test]
    fn test_invalid_timescale_leaves_timeline_untouched() {
        let clock = ManualClock::new(0);
        let mut sync = synchronizer(TimelineConfig::default(), &clock);

        let err = sync
            .stamp_video(PresentationTime::new(10, 0), Bytes::new(), false)
            .unwrap_err();
        assert_eq!(err, DecodeError::InvalidTimescale { timescale: 0 });
        assert_eq!(sync.timeline(), &StreamTimeline::default());
    }

    #[test]
    fn test_alternate_timestamp_policies() {
        let clock = ManualClock::new(100);
        let mut local = synchronizer(
            TimelineConfig {
                policy: TimestampPolicy::LocalClock,
                ..Default::default()
            },
            &clock,
        );
        let mut indexed = synchronizer(
            TimelineConfig {
                policy: TimestampPolicy::FrameIndex,
                fps: 25,
                ..Default::default()
            },
            &clock,
        );

        for _ in 0..3 {
            local
                .stamp_video(PresentationTime::new(0, 1000), Bytes::new(), false)
                .unwrap();
            indexed
                .stamp_video(PresentationTime::new(0, 1000), Bytes::new(), false)
                .unwrap();
            clock.advance(50);
        }

        clock.advance(7);
        let local_packet = local
            .stamp_video(PresentationTime::new(0, 1000), Bytes::new(), false)
            .unwrap();
        let indexed_packet = indexed
            .stamp_video(PresentationTime::new(0, 1000), Bytes::new(), false)
            .unwrap();

        assert_eq!(local_packet.timestamp_ms, 157);
        assert_eq!(indexed_packet.timestamp_ms, 120);
    }

    #[test]
    fn test_silence_insertion_catches_up_with_video() {
        let clock = ManualClock::new(0);
        let mut sync = synchronizer(encode_config(4), &clock);

        assert_eq!(sync.push_audio(&[1; 8]).len(), 2);
        assert_eq!(sync.timeline().audio_sample_count(), 2);

        sync.stamp_video(PresentationTime::new(1000, 1000), Bytes::new(), true)
            .unwrap();

        let units = sync.push_audio(&[7; 4]);
        assert_eq!(units.len(), 7);
        assert!(units[..6].iter().all(|u| u.is_silence && u.data.len() == 4));
        assert!(units[..6].iter().all(|u| u.data.iter().all(|&b| b == 0)));
        assert!(!units[6].is_silence);
        assert_eq!(&units[6].data[..], &[7; 4]);

        let indices: Vec<u64> = units.iter().map(|u| u.sample_index).collect();
        assert_eq!(indices, (2..9).collect::<Vec<_>>());
        assert_eq!(sync.timeline().audio_sample_count(), 9);
        assert_eq!(sync.timeline().silence_unit_count(), 6);
        assert_eq!(sync.timeline().phase(), TimelinePhase::Synchronized);
    }

    #[test]
    fn test_partial_audio_accumulates() {
        let clock = ManualClock::new(0);
        let mut sync = synchronizer(encode_config(2048), &clock);

        assert!(sync.push_audio(&[1; 1000]).is_empty());
        assert_eq!(sync.pending_audio_bytes(), 1000);

        let units = sync.push_audio(&[2; 5000]);
        assert_eq!(units.len(), 2);
        assert_eq!(sync.pending_audio_bytes(), 6000 - 4096);
        assert_eq!(units[0].data[999], 1);
        assert_eq!(units[0].data[1000], 2);
        assert_eq!(sync.timeline().audio_chunk_count(), 2);
    }

    #[test]
    fn test_pass_through_forwards_chunks() {
        let clock = ManualClock::new(0);
        let mut sync = synchronizer(
            TimelineConfig {
                audio_mode: AudioMode::PassThrough,
                ..Default::default()
            },
            &clock,
        );
        sync.stamp_video(PresentationTime::new(5000, 1000), Bytes::new(), true)
            .unwrap();

        let units = sync.push_audio(b"aac-frame");
        assert_eq!(units.len(), 1);
        assert_eq!(&units[0].data[..], b"aac-frame");
        assert!(sync.push_audio(&[]).is_empty());
        assert_eq!(sync.timeline().audio_chunk_count(), 2);
    }

    #[test]
    fn test_report_counts_and_drift() {
        let clock = ManualClock::new(0);
        let mut sync = synchronizer(encode_config(2), &clock);

        for i in 0..61 {
            sync.stamp_video(PresentationTime::new(i * 1000 / 30, 1000), Bytes::new(), i == 0)
                .unwrap();
        }
        sync.push_audio(&[1; 2]);
        sync.record_format_update();

        let report = sync.report();
        assert_eq!(report.elapsed_secs, 2);
        assert_eq!(report.expected_video_frames, 60);
        assert_eq!(report.video_frame_count, 61);
        assert_eq!(report.video_drift(), 1);
        assert_eq!(report.expected_audio_samples, 16);
        assert_eq!(report.audio_sample_count, 17);
        assert_eq!(report.audio_drift(), 1);
        assert_eq!(report.silence_unit_count, 16);
        assert_eq!(report.format_update_count, 1);
    }
}

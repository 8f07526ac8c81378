//! Sink contract
//!
//! A sink receives finished packets with explicit timestamps and flags and
//! writes them into some container. The pipeline depends only on
//! [`MediaSink`]; muxing and encoding live behind it.

use crate::error::SinkError;
use crate::params::{AudioParams, VideoParams};
use crate::tracks::{AudioUnit, MediaPacket, VideoPacket};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Destination of finished audio and video packets
pub trait MediaSink: Send {
    /// Open the sink for one video and one audio stream
    fn open(path: &Path, video: &VideoParams, audio: &AudioParams) -> Result<Self, SinkError>
    where
        Self: Sized;

    /// Write one video packet
    fn write_video_packet(&mut self, packet: &VideoPacket) -> Result<(), SinkError>;

    /// Write one audio unit
    fn write_audio_unit(&mut self, unit: &AudioUnit) -> Result<(), SinkError>;

    /// Finish the container (write trailer, release resources)
    fn close(&mut self) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct RecordingState {
    path: Option<PathBuf>,
    video: Option<VideoParams>,
    audio: Option<AudioParams>,
    packets: Vec<MediaPacket>,
    fail_writes: bool,
    closed: bool,
}

/// Shared view of everything a [`MemorySink`] received
///
/// Clones share state, so a handle taken before the session closes can be
/// inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct SinkRecording {
    state: Arc<Mutex<RecordingState>>,
}

impl SinkRecording {
    /// Create an empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// All packets in write order
    pub fn packets(&self) -> Vec<MediaPacket> {
        self.state.lock().packets.clone()
    }

    /// Video packets in write order
    pub fn video_packets(&self) -> Vec<VideoPacket> {
        self.state
            .lock()
            .packets
            .iter()
            .filter_map(|packet| match packet {
                MediaPacket::Video(video) => Some(video.clone()),
                MediaPacket::Audio(_) => None,
            })
            .collect()
    }

    /// Audio units in write order
    pub fn audio_units(&self) -> Vec<AudioUnit> {
        self.state
            .lock()
            .packets
            .iter()
            .filter_map(|packet| match packet {
                MediaPacket::Audio(unit) => Some(unit.clone()),
                MediaPacket::Video(_) => None,
            })
            .collect()
    }

    /// Path the sink was opened with
    pub fn path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    /// Stream parameters the sink was opened with
    pub fn params(&self) -> Option<(VideoParams, AudioParams)> {
        let state = self.state.lock();
        Some((state.video.clone()?, state.audio.clone()?))
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

/// In-memory sink recording every packet
#[derive(Debug, Default)]
pub struct MemorySink {
    recording: SinkRecording,
}

impl MemorySink {
    /// Create a sink writing into an existing recording
    pub fn with_recording(recording: SinkRecording) -> Self {
        Self { recording }
    }

    /// Handle to the recorded packets
    pub fn recording(&self) -> SinkRecording {
        self.recording.clone()
    }

    fn push(&mut self, stream: &'static str, packet: MediaPacket) -> Result<(), SinkError> {
        let mut state = self.recording.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        if state.fail_writes {
            return Err(SinkError::Write {
                stream,
                reason: "write failure injected".to_string(),
            });
        }
        state.packets.push(packet);
        Ok(())
    }
}

impl MediaSink for MemorySink {
    fn open(path: &Path, video: &VideoParams, audio: &AudioParams) -> Result<Self, SinkError> {
        let sink = Self::default();
        {
            let mut state = sink.recording.state.lock();
            state.path = Some(path.to_path_buf());
            state.video = Some(video.clone());
            state.audio = Some(audio.clone());
        }
        Ok(sink)
    }

    fn write_video_packet(&mut self, packet: &VideoPacket) -> Result<(), SinkError> {
        self.push("video", MediaPacket::Video(packet.clone()))
    }

    fn write_audio_unit(&mut self, unit: &AudioUnit) -> Result<(), SinkError> {
        self.push("audio", MediaPacket::Audio(unit.clone()))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut state = self.recording.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}

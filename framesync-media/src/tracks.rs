//! Output packet types handed to the sink

use bytes::Bytes;

/// Timestamped, self-contained video access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPacket {
    /// Annex-B access unit (parameter sets followed by the frame's NAL units)
    pub data: Bytes,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u64,
    /// Whether this is a keyframe
    pub is_key_frame: bool,
    /// Zero-based position in the video track
    pub frame_index: u64,
}

/// One unit of audio, real or inserted silence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUnit {
    /// Audio bytes (zero-filled for silence)
    pub data: Bytes,
    /// Zero-based position in the audio track
    pub sample_index: u64,
    /// Whether this unit was synthesized to keep audio up with video
    pub is_silence: bool,
}

impl AudioUnit {
    /// Create a real audio unit
    pub fn real(data: Bytes, sample_index: u64) -> Self {
        Self {
            data,
            sample_index,
            is_silence: false,
        }
    }

    /// Create a silence unit around an already zero-filled buffer
    pub fn silence(zeros: Bytes, sample_index: u64) -> Self {
        debug_assert!(zeros.iter().all(|&b| b == 0));
        Self {
            data: zeros,
            sample_index,
            is_silence: true,
        }
    }
}

/// Packet types accepted by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPacket {
    /// Video packet
    Video(VideoPacket),
    /// Audio unit
    Audio(AudioUnit),
}

impl MediaPacket {
    /// Payload bytes of either packet kind
    pub fn data(&self) -> &Bytes {
        match self {
            MediaPacket::Video(packet) => &packet.data,
            MediaPacket::Audio(unit) => &unit.data,
        }
    }

    /// Whether this is a video packet
    pub fn is_video(&self) -> bool {
        matches!(self, MediaPacket::Video(_))
    }
}

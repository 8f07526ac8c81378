//! Wire format for fragmented and unfragmented media units
//!
//! Every logical unit starts with a one-byte type tag:
//!
//! ```text
//! 0x01 format metadata   [tag][metadata payload...]
//! 0x02 video frame       [tag][i64 pts value][i32 pts timescale][u32 len][payload]
//! ```
//!
//! Units larger than the transport MTU are split into fragments, each
//! carrying a 9-byte big-endian header:
//!
//! ```text
//! [u32 total_logical_size][u32 fragment_offset][u8 last_index << 4 | fragment_index][payload...]
//! ```

use crate::error::{DecodeError, ProtocolError, ReassemblyError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// Tag byte of a format metadata unit
pub const FORMAT_METADATA_TAG: u8 = 0x01;

/// Tag byte of a video frame unit
pub const VIDEO_FRAME_TAG: u8 = 0x02;

/// Size of the fixed fragment header in bytes
pub const FRAGMENT_HEADER_LEN: usize = 9;

/// Maximum number of fragments one logical unit can be split into
pub const MAX_FRAGMENTS: usize = 16;

/// Kind of a logical unit, discriminated by its leading tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Codec configuration record (parameter sets)
    FormatMetadata,
    /// Timestamped encoded video frame
    VideoFrame,
}

impl UnitKind {
    /// Resolve a tag byte
    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            FORMAT_METADATA_TAG => Ok(UnitKind::FormatMetadata),
            VIDEO_FRAME_TAG => Ok(UnitKind::VideoFrame),
            other => Err(ProtocolError::UnknownUnitType { tag: other }),
        }
    }

    /// Tag byte written on the wire
    pub fn tag(self) -> u8 {
        match self {
            UnitKind::FormatMetadata => FORMAT_METADATA_TAG,
            UnitKind::VideoFrame => VIDEO_FRAME_TAG,
        }
    }
}

/// A fully reassembled, type-tagged unit of media data
///
/// The payload excludes the tag byte. Ownership of the payload moves with
/// the frame; nothing else keeps a handle to the reassembly buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFrame {
    /// Unit kind
    pub kind: UnitKind,
    /// Payload following the tag byte
    pub payload: Bytes,
}

impl LogicalFrame {
    /// Create a logical frame from its parts
    pub fn new(kind: UnitKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Split a tagged buffer into kind and payload
    pub fn from_tagged(buf: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let mut buf: Bytes = buf.into();
        if buf.is_empty() {
            return Err(ProtocolError::EmptyUnit);
        }
        let kind = UnitKind::from_tag(buf.get_u8())?;
        Ok(Self { kind, payload: buf })
    }

    /// Encode as a tagged buffer
    pub fn encode_tagged(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.kind.tag());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Total size on the wire, tag included
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// Take the payload, consuming the frame
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Fixed header carried by every wire fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Size of the fully reassembled logical unit
    pub total_size: u32,
    /// Offset of this fragment's payload within the logical unit
    pub offset: u32,
    /// Position of this fragment (low nibble)
    pub fragment_index: u8,
    /// Index of the final fragment, i.e. fragment count minus one (high nibble)
    pub last_index: u8,
}

impl FragmentHeader {
    /// Whether this fragment starts a new logical unit
    pub fn is_first(&self) -> bool {
        self.fragment_index == 0
    }

    /// Whether this fragment completes its logical unit
    pub fn is_last(&self) -> bool {
        self.fragment_index == self.last_index
    }

    /// Number of fragments in the logical unit
    pub fn fragment_count(&self) -> usize {
        self.last_index as usize + 1
    }
}

/// One physically delivered chunk of a logical unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFragment {
    /// Fragment header
    pub header: FragmentHeader,
    /// Fragment payload
    pub payload: Bytes,
}

/// Presentation timestamp as a rational `value / timescale` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PresentationTime {
    /// Timestamp value in timescale units
    pub value: i64,
    /// Units per second
    pub timescale: i32,
}

impl PresentationTime {
    /// Create a presentation time
    pub fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// Convert to whole milliseconds, truncating
    pub fn to_millis(&self) -> Result<u64, DecodeError> {
        if self.timescale <= 0 {
            return Err(DecodeError::InvalidTimescale {
                timescale: self.timescale,
            });
        }
        rescale(self.value, 1000, self.timescale as i64)
            .and_then(|ms| u64::try_from(ms).ok())
            .ok_or(DecodeError::TimestampOutOfRange {
                value: self.value,
                timescale: self.timescale,
            })
    }
}

/// Integer rescale of `value` from `timescale` units to `target_scale` units
///
/// Computes `value * target_scale / timescale` with truncation toward zero.
/// Returns `None` for a zero timescale or when the result does not fit `i64`.
pub fn rescale(value: i64, target_scale: i64, timescale: i64) -> Option<i64> {
    if timescale == 0 {
        return None;
    }
    let scaled = (value as i128) * (target_scale as i128) / (timescale as i128);
    i64::try_from(scaled).ok()
}

/// Header of a video frame unit, borrowing its payload from the decoded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader<'a> {
    /// Presentation timestamp
    pub presentation_time: PresentationTime,
    /// Encoded frame bytes
    pub frame_data: &'a [u8],
}

impl<'a> FrameHeader<'a> {
    /// Size of the fixed part: pts value, pts timescale, payload length
    pub const FIXED_LEN: usize = 8 + 4 + 4;

    /// Decode a frame header from a video frame payload (tag byte stripped)
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let mut buf = Cursor::new(bytes);
        if buf.remaining() < Self::FIXED_LEN {
            return Err(DecodeError::Truncated {
                what: "frame header",
                needed: Self::FIXED_LEN,
                available: buf.remaining(),
            });
        }

        let value = buf.get_i64();
        let timescale = buf.get_i32();
        let payload_len = buf.get_u32() as usize;

        if buf.remaining() < payload_len {
            return Err(DecodeError::Truncated {
                what: "frame payload",
                needed: payload_len,
                available: buf.remaining(),
            });
        }

        let start = buf.position() as usize;
        Ok(Self {
            presentation_time: PresentationTime { value, timescale },
            frame_data: &bytes[start..start + payload_len],
        })
    }

    /// Encode the header and payload (without tag byte)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(Self::FIXED_LEN + self.frame_data.len());
        buf.put_i64(self.presentation_time.value);
        buf.put_i32(self.presentation_time.timescale);
        buf.put_u32(self.frame_data.len() as u32);
        buf.extend_from_slice(self.frame_data);
    }
}

/// Wire format encoder/decoder
#[derive(Debug)]
pub struct WireFormat;

/// Fragment framing
impl WireFormat {
    /// Decode a fragment header, returning it with the remaining payload
    pub fn decode_fragment_header(data: &[u8]) -> Result<(FragmentHeader, &[u8]), ReassemblyError> {
        if data.len() < FRAGMENT_HEADER_LEN {
            return Err(ReassemblyError::TruncatedHeader {
                expected: FRAGMENT_HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut buf = Cursor::new(data);
        let total_size = buf.get_u32();
        let offset = buf.get_u32();
        let position = buf.get_u8();

        let header = FragmentHeader {
            total_size,
            offset,
            fragment_index: position & 0x0F,
            last_index: (position >> 4) & 0x0F,
        };
        Ok((header, &data[FRAGMENT_HEADER_LEN..]))
    }

    /// Encode a fragment header
    pub fn encode_fragment_header(header: &FragmentHeader, buf: &mut BytesMut) {
        buf.put_u32(header.total_size);
        buf.put_u32(header.offset);
        buf.put_u8(((header.last_index & 0x0F) << 4) | (header.fragment_index & 0x0F));
    }

    /// Encode a complete fragment
    pub fn encode_fragment(fragment: &WireFragment) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAGMENT_HEADER_LEN + fragment.payload.len());
        Self::encode_fragment_header(&fragment.header, &mut buf);
        buf.extend_from_slice(&fragment.payload);
        buf.freeze()
    }

    /// Split an encoded unit into wire fragments of at most `max_payload` bytes each
    pub fn fragment_unit(unit: &[u8], max_payload: usize) -> Result<Vec<Bytes>, ProtocolError> {
        let max_payload = max_payload.max(1);
        let needed = unit.len().div_ceil(max_payload).max(1);
        if needed > MAX_FRAGMENTS || u32::try_from(unit.len()).is_err() {
            return Err(ProtocolError::TooManyFragments {
                needed,
                max: MAX_FRAGMENTS,
            });
        }

        let last_index = (needed - 1) as u8;
        let fragments = (0..needed)
            .map(|i| {
                let start = i * max_payload;
                let end = (start + max_payload).min(unit.len());
                Self::encode_fragment(&WireFragment {
                    header: FragmentHeader {
                        total_size: unit.len() as u32,
                        offset: start as u32,
                        fragment_index: i as u8,
                        last_index,
                    },
                    payload: Bytes::copy_from_slice(&unit[start..end]),
                })
            })
            .collect();
        Ok(fragments)
    }
}

/// Unit encoding
impl WireFormat {
    /// Encode a tagged video frame unit
    pub fn encode_video_unit(presentation_time: PresentationTime, frame_data: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + FrameHeader::FIXED_LEN + frame_data.len());
        buf.put_u8(VIDEO_FRAME_TAG);
        FrameHeader {
            presentation_time,
            frame_data,
        }
        .encode(&mut buf);
        buf.freeze()
    }

    /// Encode a tagged format metadata unit around an already encoded payload
    pub fn encode_format_unit(payload: &[u8]) -> Bytes {
        LogicalFrame::new(UnitKind::FormatMetadata, Bytes::copy_from_slice(payload)).encode_tagged()
    }
}

//! Format metadata (H.264 parameter sets) and its per-session cache
//!
//! Wire layout of a format metadata payload, after the unit tag byte:
//!
//! ```text
//! [u32 sps_len][sps][u32 pps_len][pps]
//! ```

use crate::h264::{self, nal_unit_type};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use framesync_core::{DecodeError, WireFormat};

/// Most recent codec configuration record of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatMetadata {
    sps: Bytes,
    pps: Bytes,
}

impl FormatMetadata {
    /// Create format metadata from raw SPS and PPS NAL units (without start codes)
    pub fn new(sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        Self {
            sps: sps.into(),
            pps: pps.into(),
        }
    }

    /// Parse a format metadata payload (tag byte stripped)
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = payload;
        let sps = Self::read_parameter_set(&mut buf, "SPS")?;
        let pps = Self::read_parameter_set(&mut buf, "PPS")?;

        if h264::nal_type(&sps) != Some(nal_unit_type::SPS) {
            return Err(DecodeError::MalformedPayload {
                reason: format!("expected SPS NAL, found type {:?}", h264::nal_type(&sps)),
            });
        }
        if h264::nal_type(&pps) != Some(nal_unit_type::PPS) {
            return Err(DecodeError::MalformedPayload {
                reason: format!("expected PPS NAL, found type {:?}", h264::nal_type(&pps)),
            });
        }

        Ok(Self { sps, pps })
    }

    /// Encode as a format metadata payload (without tag byte)
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + self.sps.len() + self.pps.len());
        buf.put_u32(self.sps.len() as u32);
        buf.extend_from_slice(&self.sps);
        buf.put_u32(self.pps.len() as u32);
        buf.extend_from_slice(&self.pps);
        buf.freeze()
    }

    /// Encode as a complete tagged unit ready for framing
    pub fn to_unit(&self) -> Bytes {
        WireFormat::encode_format_unit(&self.encode())
    }

    /// Sequence parameter set
    pub fn sps(&self) -> &[u8] {
        &self.sps
    }

    /// Picture parameter set
    pub fn pps(&self) -> &[u8] {
        &self.pps
    }

    /// Build a self-contained Annex-B access unit from a frame payload
    ///
    /// The parameter sets are prepended to every access unit so that each
    /// packet can be decoded on its own.
    pub fn build_access_unit(&self, frame_payload: &[u8]) -> Result<Bytes, DecodeError> {
        let (_, nals) = h264::nal_units(frame_payload)?;

        let mut out = BytesMut::with_capacity(
            2 * h264::START_CODE.len()
                + self.sps.len()
                + self.pps.len()
                + frame_payload.len()
                + nals.len() * h264::START_CODE.len(),
        );
        h264::put_annex_b(&self.sps, &mut out);
        h264::put_annex_b(&self.pps, &mut out);
        for nal in nals {
            h264::put_annex_b(nal, &mut out);
        }
        Ok(out.freeze())
    }

    fn read_parameter_set(buf: &mut &[u8], what: &'static str) -> Result<Bytes, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError::Truncated {
                what,
                needed: 4,
                available: buf.remaining(),
            });
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(DecodeError::Truncated {
                what,
                needed: len,
                available: buf.remaining(),
            });
        }
        Ok(buf.copy_to_bytes(len))
    }
}

/// Holds the most recent format metadata of a session
#[derive(Debug, Default)]
pub struct FormatMetadataCache {
    current: Option<FormatMetadata>,
    update_count: u64,
}

impl FormatMetadataCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held metadata unconditionally, returning the total number of updates
    pub fn update(&mut self, metadata: FormatMetadata) -> u64 {
        if self.current.as_ref() == Some(&metadata) {
            tracing::debug!("Format metadata repeated unchanged");
        }
        self.current = Some(metadata);
        self.update_count += 1;
        self.update_count
    }

    /// Borrow the current metadata, if any has arrived
    pub fn current(&self) -> Option<&FormatMetadata> {
        self.current.as_ref()
    }

    /// Whether video frames can be interpreted yet
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    /// Number of metadata updates seen
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Drop the held metadata
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesync_core::{LogicalFrame, UnitKind};

    fn metadata() -> FormatMetadata {
        FormatMetadata::new(vec![0x67, 0x42, 0x00, 0x1E], vec![0x68, 0xCE, 0x38, 0x80])
    }

    #[test]
    fn test_parse_encoded_metadata() {
        let unit = metadata().to_unit();
        let frame = LogicalFrame::from_tagged(unit).unwrap();
        assert_eq!(frame.kind, UnitKind::FormatMetadata);

        let parsed = FormatMetadata::parse(&frame.payload).unwrap();
        assert_eq!(parsed, metadata());
    }

    #[test]
    fn test_parse_rejects_truncated_and_wrong_types() {
        assert!(matches!(
            FormatMetadata::parse(&[0, 0, 0, 8, 0x67]),
            Err(DecodeError::Truncated { what: "SPS", .. })
        ));

        let swapped = FormatMetadata::new(vec![0x68, 0xCE], vec![0x67, 0x42]).encode();
        assert!(matches!(
            FormatMetadata::parse(&swapped),
            Err(DecodeError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_access_unit_from_avcc() {
        let frame = [0, 0, 0, 2, 0x65, 0x88];
        let au = metadata().build_access_unit(&frame).unwrap();
        assert_eq!(
            &au[..],
            &[
                0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, 0, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80, 0, 0, 0,
                1, 0x65, 0x88
            ]
        );
    }

    #[test]
    fn test_access_unit_rejects_garbage() {
        assert!(metadata().build_access_unit(&[0xFF, 0x01]).is_err());
    }

    #[test]
    fn test_cache_replaces_wholesale() {
        let mut cache = FormatMetadataCache::new();
        assert!(cache.current().is_none());
        assert!(!cache.is_ready());

        assert_eq!(cache.update(metadata()), 1);
        let replacement = FormatMetadata::new(vec![0x67, 0x64], vec![0x68, 0xEB]);
        assert_eq!(cache.update(replacement.clone()), 2);

        assert_eq!(cache.current(), Some(&replacement));
        assert_eq!(cache.update_count(), 2);

        cache.clear();
        assert!(!cache.is_ready());
    }
}

//! Fragment reassembly
//!
//! Rebuilds one logical unit at a time from sequential wire fragments. The
//! framing is strictly sequential per stream: a fragment with index 0 always
//! starts a new unit, and a unit completes when the fragment whose index
//! equals the declared last index arrives.

use crate::error::{ProtocolError, ReassemblyError};
use crate::wire_format::{FragmentHeader, LogicalFrame, WireFormat};
use bytes::Bytes;

/// Configuration for the fragment reassembler
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Largest logical unit the reassembler will allocate a buffer for
    pub max_unit_size: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_unit_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

/// Reassembly counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Fragments accepted into a buffer
    pub fragments_received: u64,
    /// Logical units completed and handed off
    pub units_completed: u64,
    /// In-progress units discarded because a new unit started
    pub discarded_partial_units: u64,
    /// Fragments rejected with an error
    pub rejected_fragments: u64,
}

/// Buffer for the unit currently being assembled
#[derive(Debug)]
struct PartialUnit {
    buffer: Vec<u8>,
    last_index: u8,
    // Fragments stored so far, which is also the next index accepted
    next_index: u8,
}

/// Outcome of a discarded partial unit, reported once through [`FragmentReassembler::take_discarded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscardedUnit {
    /// Declared size of the dropped unit
    pub total_size: usize,
    /// Fragments that had arrived for it
    pub fragments_received: u8,
    /// Fragments it was declared to have
    pub fragments_expected: u8,
}

/// Reassembles fragmented logical units for a single input stream
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    config: ReassemblerConfig,
    current: Option<PartialUnit>,
    stats: ReassemblyStats,
    discarded: Option<DiscardedUnit>,
}

impl FragmentReassembler {
    /// Create a reassembler with default configuration
    pub fn new() -> Self {
        Self::with_config(ReassemblerConfig::default())
    }

    /// Create a reassembler with custom configuration
    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            config,
            current: None,
            stats: ReassemblyStats::default(),
            discarded: None,
        }
    }

    /// Submit one wire fragment
    ///
    /// Returns `Some(LogicalFrame)` once the final fragment of a unit has
    /// arrived, `None` while more fragments are needed.
    pub fn submit(&mut self, fragment: &[u8]) -> Result<Option<LogicalFrame>, ProtocolError> {
        let (header, payload) = WireFormat::decode_fragment_header(fragment).map_err(|e| {
            self.stats.rejected_fragments += 1;
            e
        })?;

        match self.accept(&header, payload) {
            Ok(true) => self.complete().map(Some),
            Ok(false) => Ok(None),
            Err(e) => {
                self.stats.rejected_fragments += 1;
                Err(e.into())
            }
        }
    }

    /// Whether a unit is currently being assembled
    pub fn is_assembling(&self) -> bool {
        self.current.is_some()
    }

    /// Reassembly counters
    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    /// Take the most recent silently superseded unit, if any
    ///
    /// A new first fragment discards whatever was in progress. That loss is
    /// not an error of the new fragment, so it is surfaced here instead.
    pub fn take_discarded(&mut self) -> Option<DiscardedUnit> {
        self.discarded.take()
    }

    /// Drop any in-progress unit
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn accept(&mut self, header: &FragmentHeader, payload: &[u8]) -> Result<bool, ReassemblyError> {
        if header.fragment_index > header.last_index {
            return Err(ReassemblyError::IndexBeyondLast {
                fragment_index: header.fragment_index,
                last_index: header.last_index,
            });
        }

        if header.is_first() {
            if let Some(previous) = self.current.take() {
                self.stats.discarded_partial_units += 1;
                let dropped = DiscardedUnit {
                    total_size: previous.buffer.len(),
                    fragments_received: previous.next_index,
                    fragments_expected: previous.last_index + 1,
                };
                tracing::warn!(
                    "Discarding partial unit: {} of {} fragments received, {} bytes",
                    dropped.fragments_received,
                    dropped.fragments_expected,
                    dropped.total_size
                );
                self.discarded = Some(dropped);
            }
            self.current = Some(self.allocate(header)?);
        }

        let unit = self
            .current
            .as_mut()
            .ok_or(ReassemblyError::NoActiveBuffer {
                fragment_index: header.fragment_index,
            })?;

        if unit.next_index != header.fragment_index {
            let expected = unit.next_index;
            self.current = None;
            tracing::warn!(
                "Dropping unit: expected fragment {}, got {}",
                expected,
                header.fragment_index
            );
            return Err(ReassemblyError::OutOfSequence {
                expected,
                got: header.fragment_index,
            });
        }

        let start = header.offset as usize;
        let end = start.checked_add(payload.len()).filter(|end| *end <= unit.buffer.len());
        let Some(end) = end else {
            self.current = None;
            return Err(ReassemblyError::FragmentOutOfBounds {
                offset: header.offset,
                len: payload.len(),
                total_size: header.total_size,
            });
        };

        unit.buffer[start..end].copy_from_slice(payload);
        unit.next_index = header.fragment_index.saturating_add(1);
        self.stats.fragments_received += 1;

        tracing::trace!(
            "Fragment {}/{} stored at offset {} ({} bytes)",
            header.fragment_index,
            header.last_index,
            header.offset,
            payload.len()
        );

        Ok(header.is_last())
    }

    fn allocate(&self, header: &FragmentHeader) -> Result<PartialUnit, ReassemblyError> {
        let size = header.total_size as usize;
        if size > self.config.max_unit_size {
            return Err(ReassemblyError::UnitTooLarge {
                size: header.total_size,
                limit: self.config.max_unit_size,
            });
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| ReassemblyError::AllocationFailed { size })?;
        buffer.resize(size, 0);

        Ok(PartialUnit {
            buffer,
            last_index: header.last_index,
            next_index: 0,
        })
    }

    fn complete(&mut self) -> Result<LogicalFrame, ProtocolError> {
        let unit = self.current.take().ok_or(ReassemblyError::NoActiveBuffer {
            fragment_index: 0,
        })?;
        self.stats.units_completed += 1;
        tracing::debug!(
            "Reassembled unit of {} fragments, {} bytes",
            unit.last_index as usize + 1,
            unit.buffer.len()
        );
        LogicalFrame::from_tagged(Bytes::from(unit.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire_format::{PresentationTime, UnitKind, WireFragment};

    fn fragment(total: u32, offset: u32, index: u8, last: u8, payload: &[u8]) -> Bytes {
        WireFormat::encode_fragment(&WireFragment {
            header: FragmentHeader {
                total_size: total,
                offset,
                fragment_index: index,
                last_index: last,
            },
            payload: Bytes::copy_from_slice(payload),
        })
    }

    #[test]
    fn test_in_order_reassembly() {
        let unit = WireFormat::encode_video_unit(PresentationTime::new(40, 1000), &[7u8; 50]);
        let fragments = WireFormat::fragment_unit(&unit, 16).unwrap();
        assert!(fragments.len() > 1);

        let mut reassembler = FragmentReassembler::new();
        let (last, head) = fragments.split_last().unwrap();
        for f in head {
            assert_eq!(reassembler.submit(f).unwrap(), None);
            assert!(reassembler.is_assembling());
        }

        let frame = reassembler.submit(last).unwrap().unwrap();
        assert_eq!(frame.kind, UnitKind::VideoFrame);
        assert_eq!(frame.encode_tagged(), unit);
        assert!(!reassembler.is_assembling());
        assert_eq!(reassembler.stats().units_completed, 1);
    }

    #[test]
    fn test_single_fragment_unit_completes() {
        let unit = WireFormat::encode_format_unit(b"cfg");
        let fragments = WireFormat::fragment_unit(&unit, 1024).unwrap();
        assert_eq!(fragments.len(), 1);

        let mut reassembler = FragmentReassembler::new();
        let frame = reassembler.submit(&fragments[0]).unwrap().unwrap();
        assert_eq!(frame.kind, UnitKind::FormatMetadata);
        assert_eq!(&frame.payload[..], b"cfg");
    }

    #[test]
    fn test_continuation_without_start_is_rejected() {
        let mut reassembler = FragmentReassembler::new();
        let err = reassembler
            .submit(&fragment(4, 2, 2, 3, &[1, 2]))
            .unwrap_err();

        assert_eq!(
            err,
            ProtocolError::Reassembly(ReassemblyError::NoActiveBuffer { fragment_index: 2 })
        );
        assert!(!reassembler.is_assembling());
        assert_eq!(reassembler.stats().rejected_fragments, 1);
    }

    #[test]
    fn test_new_start_discards_partial_unit() {
        let mut reassembler = FragmentReassembler::new();
        reassembler.submit(&fragment(4, 0, 0, 1, &[0x02, 0])).unwrap();
        assert!(reassembler.take_discarded().is_none());

        let unit = WireFormat::encode_format_unit(b"ab");
        assert_eq!(reassembler.submit(&fragment(3, 0, 0, 1, &unit[..2])).unwrap(), None);

        let discarded = reassembler.take_discarded().unwrap();
        assert_eq!(discarded.total_size, 4);
        assert_eq!(discarded.fragments_received, 1);
        assert_eq!(discarded.fragments_expected, 2);
        assert_eq!(reassembler.stats().discarded_partial_units, 1);

        let frame = reassembler.submit(&fragment(3, 2, 1, 1, &unit[2..])).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"ab");
    }

    #[test]
    fn test_skipped_fragment_drops_unit() {
        let mut reassembler = FragmentReassembler::new();
        reassembler.submit(&fragment(6, 0, 0, 2, &[0x01, 0])).unwrap();

        let err = reassembler.submit(&fragment(6, 4, 2, 2, &[5, 6])).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Reassembly(ReassemblyError::OutOfSequence { expected: 1, got: 2 })
        );
        assert_eq!(err.error_code(), "FRAGMENT_OUT_OF_SEQUENCE");
        assert!(!reassembler.is_assembling());
        assert_eq!(reassembler.stats().units_completed, 0);
    }

    #[test]
    fn test_out_of_bounds_fragment_drops_unit() {
        let mut reassembler = FragmentReassembler::new();
        reassembler.submit(&fragment(4, 0, 0, 1, &[0x02, 0])).unwrap();

        let err = reassembler.submit(&fragment(4, 3, 1, 1, &[1, 2])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Reassembly(ReassemblyError::FragmentOutOfBounds { .. })
        ));
        assert!(!reassembler.is_assembling());
    }

    #[test]
    fn test_unit_size_limit() {
        let mut reassembler = FragmentReassembler::with_config(ReassemblerConfig { max_unit_size: 8 });
        let err = reassembler.submit(&fragment(9, 0, 0, 1, &[1])).unwrap_err();
        match err {
            ProtocolError::Reassembly(inner) => assert!(inner.is_resource_exhaustion()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_index_beyond_last() {
        let mut reassembler = FragmentReassembler::new();
        let err = reassembler.submit(&fragment(4, 0, 3, 1, &[1])).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Reassembly(ReassemblyError::IndexBeyondLast {
                fragment_index: 3,
                last_index: 1
            })
        );
    }

    #[test]
    fn test_unknown_tag_after_reassembly() {
        let mut reassembler = FragmentReassembler::new();
        let err = reassembler.submit(&fragment(2, 0, 0, 0, &[0x55, 1])).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownUnitType { tag: 0x55 });
        assert!(!reassembler.is_assembling());
    }
}

//! H.264 NAL unit helpers
//!
//! Frame payloads normally arrive in AVCC framing (each NAL prefixed by a
//! 4-byte big-endian length). Payloads that are already Annex-B (start-code
//! delimited) are accepted as well.

use bytes::{BufMut, BytesMut};
use framesync_core::DecodeError;

/// H.264 NAL unit type constants
pub mod nal_unit_type {
    /// Non-IDR slice (P/B frame)
    pub const NON_IDR_SLICE: u8 = 1;
    /// IDR slice (key frame)
    pub const IDR_SLICE: u8 = 5;
    /// Supplemental enhancement information
    pub const SEI: u8 = 6;
    /// Sequence parameter set
    pub const SPS: u8 = 7;
    /// Picture parameter set
    pub const PPS: u8 = 8;
}

/// Four-byte Annex-B start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL framing of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalFraming {
    /// 4-byte big-endian length prefixes
    Avcc,
    /// Start-code delimited
    AnnexB,
}

/// NAL unit type of a NAL (header byte & 0x1F)
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & 0x1F)
}

/// Split a payload into NAL units, detecting its framing
///
/// AVCC is tried first and accepted only when the length prefixes tile the
/// whole payload exactly; otherwise a leading start code selects Annex-B.
pub fn nal_units(payload: &[u8]) -> Result<(NalFraming, Vec<&[u8]>), DecodeError> {
    if let Some(nals) = split_avcc(payload) {
        return Ok((NalFraming::Avcc, nals));
    }
    if starts_with_start_code(payload) {
        return Ok((NalFraming::AnnexB, split_annex_b(payload)));
    }
    Err(DecodeError::MalformedPayload {
        reason: format!(
            "{} byte payload is neither AVCC nor Annex-B framed",
            payload.len()
        ),
    })
}

/// Whether the payload contains an IDR slice
///
/// Malformed payloads are never key frames.
pub fn is_key_frame(payload: &[u8]) -> bool {
    nal_units(payload)
        .map(|(_, nals)| {
            nals.iter()
                .any(|nal| nal_type(nal) == Some(nal_unit_type::IDR_SLICE))
        })
        .unwrap_or(false)
}

/// Append one NAL with a start code
pub fn put_annex_b(nal: &[u8], out: &mut BytesMut) {
    out.reserve(START_CODE.len() + nal.len());
    out.put_slice(&START_CODE);
    out.put_slice(nal);
}

fn starts_with_start_code(payload: &[u8]) -> bool {
    payload.starts_with(&START_CODE) || payload.starts_with(&START_CODE[1..])
}

fn split_avcc(payload: &[u8]) -> Option<Vec<&[u8]>> {
    let mut nals = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let (prefix, tail) = rest.split_first_chunk::<4>()?;
        let len = u32::from_be_bytes(*prefix) as usize;
        if len == 0 || len > tail.len() {
            return None;
        }
        let (nal, tail) = tail.split_at(len);
        nals.push(nal);
        rest = tail;
    }
    if nals.is_empty() {
        None
    } else {
        Some(nals)
    }
}

fn split_annex_b(payload: &[u8]) -> Vec<&[u8]> {
    // (position of start code, length of start code)
    let mut marks = Vec::new();
    let mut i = 0;
    while i + 3 <= payload.len() {
        if payload[i..].starts_with(&START_CODE) {
            marks.push((i, 4));
            i += 4;
        } else if payload[i..].starts_with(&START_CODE[1..]) {
            marks.push((i, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    marks
        .iter()
        .enumerate()
        .filter_map(|(idx, &(pos, len))| {
            let start = pos + len;
            let end = marks.get(idx + 1).map_or(payload.len(), |&(next, _)| next);
            (start < end).then(|| &payload[start..end])
        })
        .collect()
}

//! Transport-stream scanner for PES headers and presentation timestamps.
//!
//! Read-only; the pipeline uses it for timestamp diagnostics.
//!
//! ```text
//! TS packet (188 bytes)
//!   0      sync 0x47
//!   1      flags, bit 0x40 = payload unit start
//!   3      bit 0x20 = adaptation field present
//!   4      adaptation field length (if present)
//! PES header at the payload offset
//!   0..3   start code 00 00 01
//!   3      stream id
//!   6      '10' marker bits, scrambling bits
//!   7      bit 0x80 = PTS present
//!   9..14  33-bit PTS
//! ```

use crate::error::{Result, VdrError};

pub const TS_PACKET_LEN: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;

const PRIVATE_STREAM_1: u8 = 0xBD;
const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
/// Bytes of PES header needed to read a PTS.
const PES_PTS_END: usize = 14;

// ── StreamKind ───────────────────────────────────────────────────

/// Classification of a PES stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// `0xE0..=0xEF`
    Video,
    /// `0xC0..=0xDF`
    Audio,
    /// `0xBD`, carries AC-3/DTS/subtitles; treated as audio.
    PrivateStream1,
    Other(u8),
}

impl StreamKind {
    pub fn from_stream_id(id: u8) -> Self {
        if id & 0xF0 == 0xE0 {
            Self::Video
        } else if id & 0xE0 == 0xC0 {
            Self::Audio
        } else if id == PRIVATE_STREAM_1 {
            Self::PrivateStream1
        } else {
            Self::Other(id)
        }
    }

    /// Whether PES packets of this kind carry timestamps we decode.
    pub fn is_audio_or_video(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

// ── PesInfo ──────────────────────────────────────────────────────

/// One PES header found at the start of a TS packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesInfo {
    /// Index of the 188-byte packet within the scanned payload.
    pub packet_index: usize,
    pub stream_id: u8,
    pub kind: StreamKind,
    /// 90 kHz presentation timestamp, when present.
    pub pts: Option<u64>,
}

// ── Scanning ─────────────────────────────────────────────────────

/// Scan a payload made of whole TS packets.
///
/// Packets without the sync byte, without the payload-unit-start bit or
/// without a PES start code are skipped.
pub fn scan(payload: &[u8]) -> Result<Vec<PesInfo>> {
    if payload.len() % TS_PACKET_LEN != 0 {
        return Err(VdrError::NotTransportStream(payload.len()));
    }

    Ok(payload
        .chunks_exact(TS_PACKET_LEN)
        .enumerate()
        .filter_map(|(index, packet)| scan_packet(index, packet))
        .collect())
}

fn scan_packet(packet_index: usize, packet: &[u8]) -> Option<PesInfo> {
    if packet[0] != TS_SYNC_BYTE || packet[1] & 0x40 == 0 {
        return None;
    }

    let offset = if packet[3] & 0x20 != 0 {
        5 + packet[4] as usize
    } else {
        4
    };
    let pes = packet.get(offset..)?;
    if pes.get(..3)? != PES_START_CODE {
        return None;
    }

    let stream_id = *pes.get(3)?;
    let kind = StreamKind::from_stream_id(stream_id);
    let pts = if kind.is_audio_or_video() {
        parse_pts(pes)
    } else {
        None
    };

    Some(PesInfo {
        packet_index,
        stream_id,
        kind,
        pts,
    })
}

fn parse_pts(pes: &[u8]) -> Option<u64> {
    if pes.len() < PES_PTS_END {
        return None;
    }
    if pes[6] & 0xC0 != 0x80 || pes[6] & 0x30 != 0 || pes[7] & 0x80 == 0 {
        return None;
    }
    Some(decode_timestamp(&pes[9..PES_PTS_END]))
}

/// Decode a 5-byte PES timestamp field into its 33-bit value.
pub fn decode_timestamp(b: &[u8]) -> u64 {
    ((b[0] as u64 & 0x0E) << 29)
        | ((b[1] as u64) << 22)
        | ((b[2] as u64 & 0xFE) << 14)
        | ((b[3] as u64) << 7)
        | ((b[4] as u64 & 0xFE) >> 1)
}

// ── Tests ────────────────────────────────────────────────────────

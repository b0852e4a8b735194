//! Data-channel frame types.
//!
//! ## Wire format
//!
//! ```text
//! position:   u64  (8, big-endian)
//! length:     u32  (4, big-endian)
//! stream_id:  u8   (1)
//! payload:    [u8] (length bytes)
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::error::{Result, VdrError};

/// Size of the fixed frame header on the wire.
pub const FRAME_HEADER_LEN: usize = 13;

/// Stream id reserved for textual side-channel info (`DISCARD`, `BLANK`, ...).
pub const INFO_STREAM_ID: u8 = 255;

// ── FrameHeader ──────────────────────────────────────────────────

/// The fixed 13-byte header preceding every data-channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub position: u64,
    pub length: u32,
    pub stream_id: u8,
}

impl FrameHeader {
    /// Serialize to bytes (big-endian, no padding).
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        let mut dst = &mut buf[..];
        dst.put_u64(self.position);
        dst.put_u32(self.length);
        dst.put_u8(self.stream_id);
        buf
    }

    /// Deserialize from the first 13 bytes of `data`.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(VdrError::TruncatedHeader { got: data.len() });
        }
        Ok(Self {
            position: data.get_u64(),
            length: data.get_u32(),
            stream_id: data.get_u8(),
        })
    }
}

// ── StreamFrame ──────────────────────────────────────────────────

/// One unit read from the data channel.
///
/// The payload length is never stored separately, so `length()` always
/// matches the bytes actually owned by the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    position: u64,
    stream_id: u8,
    payload: Bytes,
}

impl StreamFrame {
    pub fn new(position: u64, stream_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            position,
            stream_id,
            payload: payload.into(),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Whether this frame carries side-channel info text rather than A/V data.
    pub fn is_info(&self) -> bool {
        self.stream_id == INFO_STREAM_ID
    }

    /// Payload decoded as trimmed text (lossy), for info frames.
    pub fn info_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).trim().to_string()
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            position: self.position,
            length: self.length(),
            stream_id: self.stream_id,
        }
    }
}

impl std::fmt::Display for StreamFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame(position: {}, len: {}, stream: {})",
            self.position,
            self.payload.len(),
            self.stream_id
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VdrError;
use crate::frame::{FRAME_HEADER_LEN, FrameHeader, StreamFrame};

/// Default upper bound for a single data-channel payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frames the continuous data-channel byte stream into [`StreamFrame`]s.
#[derive(Debug, Clone)]
pub struct StreamFrameCodec {
    max_frame_len: usize,
}

impl StreamFrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for StreamFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamFrameCodec {
    type Item = StreamFrame;
    type Error = VdrError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let header = FrameHeader::decode(&src[..FRAME_HEADER_LEN])?;
        let length = header.length as usize;
        if length > self.max_frame_len {
            return Err(VdrError::FrameTooLarge {
                size: length,
                max: self.max_frame_len,
            });
        }

        let total = FRAME_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Ok(Some(StreamFrame::new(header.position, header.stream_id, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        if src.len() < FRAME_HEADER_LEN {
            return Err(VdrError::TruncatedHeader { got: src.len() });
        }
        let header = FrameHeader::decode(&src[..FRAME_HEADER_LEN])?;
        Err(VdrError::TruncatedPayload {
            expected: header.length as usize,
            got: src.len() - FRAME_HEADER_LEN,
        })
    }
}

impl Encoder<StreamFrame> for StreamFrameCodec {
    type Error = VdrError;

    fn encode(&mut self, item: StreamFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload().len() > self.max_frame_len {
            return Err(VdrError::FrameTooLarge {
                size: item.payload().len(),
                max: self.max_frame_len,
            });
        }
        dst.reserve(FRAME_HEADER_LEN + item.payload().len());
        dst.extend_from_slice(&item.header().encode());
        dst.extend_from_slice(item.payload());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

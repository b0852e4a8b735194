//! Control-channel codec.
//!
//! Inbound, the control connection is a sequence of `\n`-terminated text
//! lines (`\r` is ignored). A line starting with `OSDCMD` switches the codec
//! into binary mode for exactly one OSD command:
//!
//! ```text
//! OSDCMD\r\n
//! size:u8, header[size-1]       fixed header, size >= 62
//! palette[colors_count * 4]
//! data[data_len]
//! ```
//!
//! after which line mode resumes. Outbound, every request is one
//! `\r\n`-terminated line.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VdrError;
use crate::osd::command::{OSD_HEADER_LEN, OsdCommand, OsdHeader};

/// Longest accepted text line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Largest accepted palette + data trailer of one OSD command.
pub const MAX_OSD_TRAILER_LEN: usize = 64 * 1024 * 1024;

const OSD_MARKER: &str = "OSDCMD";

// ── Items ────────────────────────────────────────────────────────

/// One unit read from the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// A text line with all `\r` removed.
    Line(String),
    /// A complete binary OSD command.
    Osd(OsdCommand),
}

/// One line sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// `CONTROL`, opens the control session.
    Hello,
    /// Any preformatted line (announcements, `CONFIG`, ...).
    Line(String),
    /// `KEY <keymap> <name>`, or `KEY <name>` with an empty keymap.
    Key { keymap: String, name: String },
}

impl ControlRequest {
    pub fn key(keymap: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Key {
            keymap: keymap.into(),
            name: name.into(),
        }
    }
}

// ── ControlCodec ─────────────────────────────────────────────────

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Line,
    OsdHeader,
    OsdTrailers(OsdHeader),
}

/// Line/OSD demultiplexer for the control connection.
#[derive(Debug)]
pub struct ControlCodec {
    state: DecodeState,
    /// Bytes already searched for `\n` in line mode.
    scanned: usize,
    max_line_len: usize,
    max_trailer_len: usize,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Line,
            scanned: 0,
            max_line_len: MAX_LINE_LEN,
            max_trailer_len: MAX_OSD_TRAILER_LEN,
        }
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<String>, VdrError> {
        let Some(found) = src[self.scanned..].iter().position(|&b| b == b'\n') else {
            if src.len() > self.max_line_len {
                return Err(VdrError::FrameTooLarge {
                    size: src.len(),
                    max: self.max_line_len,
                });
            }
            self.scanned = src.len();
            return Ok(None);
        };

        let end = self.scanned + found;
        self.scanned = 0;
        if end > self.max_line_len {
            return Err(VdrError::FrameTooLarge {
                size: end,
                max: self.max_line_len,
            });
        }

        let raw = src.split_to(end + 1);
        let line = String::from_utf8_lossy(&raw[..end])
            .chars()
            .filter(|&c| c != '\r')
            .collect();
        Ok(Some(line))
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = ControlFrame;
    type Error = VdrError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                DecodeState::Line => {
                    let Some(line) = self.decode_line(src)? else {
                        return Ok(None);
                    };
                    if line.starts_with(OSD_MARKER) {
                        self.state = DecodeState::OsdHeader;
                        continue;
                    }
                    return Ok(Some(ControlFrame::Line(line)));
                }

                DecodeState::OsdHeader => {
                    let Some(&size) = src.first() else {
                        self.state = DecodeState::OsdHeader;
                        return Ok(None);
                    };
                    let size = size as usize;
                    if size < OSD_HEADER_LEN {
                        return Err(VdrError::InvalidOsdHeader {
                            size,
                            actual: src.len().min(size),
                            min: OSD_HEADER_LEN,
                        });
                    }
                    if src.len() < size {
                        src.reserve(size - src.len());
                        self.state = DecodeState::OsdHeader;
                        return Ok(None);
                    }

                    let header = OsdHeader::decode(&src[..size])?;
                    src.advance(size);

                    let trailers = header.palette_len() + header.data_len();
                    if trailers > self.max_trailer_len {
                        return Err(VdrError::FrameTooLarge {
                            size: trailers,
                            max: self.max_trailer_len,
                        });
                    }
                    self.state = DecodeState::OsdTrailers(header);
                }

                DecodeState::OsdTrailers(header) => {
                    let (palette_len, data_len) = (header.palette_len(), header.data_len());
                    if src.len() < palette_len + data_len {
                        src.reserve(palette_len + data_len - src.len());
                        self.state = DecodeState::OsdTrailers(header);
                        return Ok(None);
                    }

                    let palette = src.split_to(palette_len).freeze();
                    let data = src.split_to(data_len).freeze();
                    return Ok(Some(ControlFrame::Osd(OsdCommand {
                        header,
                        palette,
                        data,
                    })));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match std::mem::take(&mut self.state) {
            DecodeState::Line => {
                // an unterminated trailing line is dropped
                src.clear();
                self.scanned = 0;
                Ok(None)
            }
            DecodeState::OsdHeader => Err(VdrError::InvalidOsdHeader {
                size: src.first().map_or(0, |&b| b as usize),
                actual: src.len(),
                min: OSD_HEADER_LEN,
            }),
            DecodeState::OsdTrailers(header) => Err(VdrError::TruncatedPayload {
                expected: header.palette_len() + header.data_len(),
                got: src.len(),
            }),
        }
    }
}

impl Encoder<ControlRequest> for ControlCodec {
    type Error = VdrError;

    fn encode(&mut self, item: ControlRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            ControlRequest::Hello => dst.put_slice(b"CONTROL"),
            ControlRequest::Line(line) => dst.put_slice(line.as_bytes()),
            ControlRequest::Key { keymap, name } if keymap.is_empty() => {
                dst.put_slice(format!("KEY {name}").as_bytes());
            }
            ControlRequest::Key { keymap, name } => {
                dst.put_slice(format!("KEY {keymap} {name}").as_bytes());
            }
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

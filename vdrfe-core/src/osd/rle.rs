//! OSD pixel-data decoders.
//!
//! ## Run-length grammar
//!
//! ```text
//! literal         non-zero first byte: one pixel (4-byte ARGB, or 1-byte
//!                 palette index for HDMV)
//! 00 0LLLLLL       transparent run, 6-bit length
//! 00 01LLLLLL LL   transparent run, 14-bit length
//! 00 1xLLLLLL ..C  opaque run of colour C (same length forms)
//! 00 00            end of line
//! ```
//!
//! Decoding is best-effort: positions outside the window are clipped and
//! reported through [`RleDiagnostics`] rather than failing the command.

use crate::error::{Result, VdrError};
use crate::osd::surface::{Palette, rgba_from_argb_bytes};

const OPAQUE_RUN: u8 = 0x80;
const LONG_RUN: u8 = 0x40;
const RUN_LEN_MASK: u8 = 0x3F;

// ── RleDiagnostics ───────────────────────────────────────────────

/// Non-fatal anomalies observed while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RleDiagnostics {
    /// Literals and runs consumed.
    pub elements: u32,
    /// First cursor position found beyond the window (`x > w` or `y > h`).
    pub overflow: Option<(u32, u32)>,
    /// Byte offset at which the input ended inside an element.
    pub truncated_at: Option<usize>,
}

impl RleDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.overflow.is_none() && self.truncated_at.is_none()
    }
}

// ── DecodedRect ──────────────────────────────────────────────────

/// A decoded `width×height` block of RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRect {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
    pub diagnostics: RleDiagnostics,
}

// ── RleDecoder ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Literal<'a> {
    Argb,
    Indexed(&'a Palette),
}

impl Literal<'_> {
    fn len(self) -> usize {
        match self {
            Literal::Argb => 4,
            Literal::Indexed(_) => 1,
        }
    }

    fn color(self, bytes: &[u8]) -> u32 {
        match self {
            Literal::Argb => rgba_from_argb_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Literal::Indexed(palette) => palette.color(bytes[0]),
        }
    }

    /// What a transparent run writes: nothing for ARGB, entry 0 for HDMV.
    fn transparent_fill(self) -> Option<u32> {
        match self {
            Literal::Argb => None,
            Literal::Indexed(palette) => Some(palette.color(0)),
        }
    }
}

/// Element-at-a-time decoder over one run-length encoded window.
#[derive(Debug)]
pub struct RleDecoder<'a> {
    data: &'a [u8],
    literal: Literal<'a>,
    offset: usize,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    diagnostics: RleDiagnostics,
}

impl<'a> RleDecoder<'a> {
    /// Decoder for ARGB RLE (`SetARGBRLE`).
    pub fn argb(data: &'a [u8], width: u32, height: u32) -> Self {
        Self::with_literal(data, width, height, Literal::Argb)
    }

    /// Decoder for palette-indexed HDMV RLE (`SetHDMV`).
    pub fn hdmv(data: &'a [u8], width: u32, height: u32, palette: &'a Palette) -> Self {
        Self::with_literal(data, width, height, Literal::Indexed(palette))
    }

    fn with_literal(data: &'a [u8], width: u32, height: u32, literal: Literal<'a>) -> Self {
        Self {
            data,
            literal,
            offset: 0,
            x: 0,
            y: 0,
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            diagnostics: RleDiagnostics::default(),
        }
    }

    /// Byte cursor into the encoded input.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pixel cursor `(x, y)` inside the window.
    pub fn cursor(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    pub fn is_done(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Decode one literal or run. Returns `false` once the input is exhausted.
    pub fn step(&mut self) -> bool {
        if self.is_done() {
            return false;
        }

        if self.data[self.offset] != 0 {
            let Some(color) = self.read_literal(self.offset) else {
                return self.truncate();
            };
            self.offset += self.literal.len();
            self.fill(Some(color), 1);
        } else {
            let Some((len, opaque, next)) = self.read_run_length(self.offset + 1) else {
                return self.truncate();
            };
            self.offset = next;

            if opaque {
                let Some(color) = self.read_literal(self.offset) else {
                    return self.truncate();
                };
                self.offset += self.literal.len();
                self.fill(Some(color), len);
            } else if len == 0 {
                self.y = self.y.saturating_add(1);
                self.x = 0;
            } else {
                self.fill(self.literal.transparent_fill(), len);
            }
        }

        self.diagnostics.elements += 1;
        self.check_geometry();
        true
    }

    /// Run to the end of the input and return the decoded window.
    pub fn finish(mut self) -> DecodedRect {
        while self.step() {}
        DecodedRect {
            width: self.width,
            height: self.height,
            pixels: self.pixels,
            diagnostics: self.diagnostics,
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn read_literal(&self, at: usize) -> Option<u32> {
        let bytes = self.data.get(at..at + self.literal.len())?;
        Some(self.literal.color(bytes))
    }

    /// Returns `(length, opaque, offset after the length bytes)`.
    fn read_run_length(&self, at: usize) -> Option<(u32, bool, usize)> {
        let b0 = *self.data.get(at)?;
        let opaque = b0 & OPAQUE_RUN != 0;
        let mut len = (b0 & RUN_LEN_MASK) as u32;
        if b0 & LONG_RUN != 0 {
            let b1 = *self.data.get(at + 1)?;
            len = (len << 8) | b1 as u32;
            return Some((len, opaque, at + 2));
        }
        Some((len, opaque, at + 1))
    }

    fn fill(&mut self, color: Option<u32>, len: u32) {
        if let Some(color) = color {
            if self.y < self.height && self.x < self.width {
                let row = self.y as usize * self.width as usize;
                let start = row + self.x as usize;
                let end = row + self.x.saturating_add(len).min(self.width) as usize;
                self.pixels[start..end].fill(color);
            }
        }
        self.x = self.x.saturating_add(len);
    }

    fn check_geometry(&mut self) {
        if self.diagnostics.overflow.is_none() && (self.x > self.width || self.y > self.height) {
            self.diagnostics.overflow = Some((self.x, self.y));
        }
    }

    fn truncate(&mut self) -> bool {
        self.diagnostics.truncated_at = Some(self.offset);
        self.offset = self.data.len();
        false
    }
}

// ── One-shot helpers ─────────────────────────────────────────────

/// Decode an ARGB RLE window.
pub fn decode_argb_rle(data: &[u8], width: u32, height: u32) -> DecodedRect {
    RleDecoder::argb(data, width, height).finish()
}

/// Decode an HDMV (palette) RLE window.
pub fn decode_hdmv_rle(data: &[u8], width: u32, height: u32, palette: &Palette) -> DecodedRect {
    RleDecoder::hdmv(data, width, height, palette).finish()
}

/// Decode an uncompressed window of 8-bit palette indices.
pub fn decode_lut8(data: &[u8], width: u32, height: u32, palette: &Palette) -> Result<DecodedRect> {
    let count = width as usize * height as usize;
    let indices = data.get(..count).ok_or_else(|| {
        VdrError::MalformedRleStream(format!(
            "LUT8 data has {} bytes, {width}x{height} needs {count}",
            data.len()
        ))
    })?;
    Ok(DecodedRect {
        width,
        height,
        pixels: indices.iter().map(|&i| palette.color(i)).collect(),
        diagnostics: RleDiagnostics::default(),
    })
}

/// Decode an uncompressed window of big-endian ARGB pixels.
pub fn decode_argb(data: &[u8], width: u32, height: u32) -> Result<DecodedRect> {
    let count = width as usize * height as usize;
    let raw = data.get(..count * 4).ok_or_else(|| {
        VdrError::MalformedRleStream(format!(
            "ARGB data has {} bytes, {width}x{height} needs {}",
            data.len(),
            count * 4
        ))
    })?;
    Ok(DecodedRect {
        width,
        height,
        pixels: raw
            .chunks_exact(4)
            .map(|p| rgba_from_argb_bytes([p[0], p[1], p[2], p[3]]))
            .collect(),
        diagnostics: RleDiagnostics::default(),
    })
}

// ── Tests ────────────────────────────────────────────────────────

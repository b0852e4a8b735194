//! OSD rendering target and palette types.
//!
//! Pixels are stored as `0xRRGGBBAA` words, i.e. the renderer-native RGBA
//! channel order. Wire pixels arrive as big-endian ARGB and are rotated
//! once at write time by [`argb_to_rgba`].

use crate::error::{Result, VdrError};

/// Convert a big-endian ARGB word into the surface's RGBA order.
#[inline]
pub const fn argb_to_rgba(argb: u32) -> u32 {
    argb.rotate_left(8)
}

/// Read a 4-byte big-endian ARGB literal and return it as RGBA.
#[inline]
pub fn rgba_from_argb_bytes(bytes: [u8; 4]) -> u32 {
    argb_to_rgba(u32::from_be_bytes(bytes))
}

// ── Palette ──────────────────────────────────────────────────────

/// Colour lookup table for palette-indexed OSD data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<u32>,
}

impl Palette {
    /// Parse `colors_count` 4-byte entries laid out as
    /// `[g|cb, b|cr, r|y, alpha]`. With `yuv` set the entries are
    /// Y'CbCr (BT.601 studio range) and are converted to RGB.
    pub fn from_wire(bytes: &[u8], yuv: bool) -> Self {
        let entries = bytes
            .chunks_exact(4)
            .map(|e| {
                let (r, g, b) = if yuv {
                    ycbcr_to_rgb(e[2], e[0], e[1])
                } else {
                    (e[2], e[1], e[0])
                };
                u32::from_be_bytes([r, g, b, e[3]])
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// RGBA colour for `index`; out-of-range indices are transparent.
    pub fn color(&self, index: u8) -> u32 {
        self.entries.get(index as usize).copied().unwrap_or(0)
    }
}

fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let c = (y as i32 - 16) * 298;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;
    let clamp = |v: i32| ((v + 128) >> 8).clamp(0, 255) as u8;
    (
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    )
}

// ── OsdSurface ───────────────────────────────────────────────────

/// The full OSD canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdSurface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl OsdSurface {
    /// A fully transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA pixels.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Replace the surface with a transparent one of the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    /// Make every pixel transparent, keeping the dimensions.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Number of pixels with a non-zero alpha channel.
    pub fn opaque_pixels(&self) -> usize {
        self.pixels.iter().filter(|&&p| p & 0xFF != 0).count()
    }

    /// Pixels as tightly packed R, G, B, A bytes.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_be_bytes()).collect()
    }

    /// Whether the `w×h` rectangle at `(x, y)` lies inside the surface.
    pub fn contains(&self, x: u32, y: u32, w: u32, h: u32) -> bool {
        x.checked_add(w).is_some_and(|r| r <= self.width)
            && y.checked_add(h).is_some_and(|b| b <= self.height)
    }

    /// Overwrite the `w×h` rectangle at `(x, y)` with `src` (row-major,
    /// `w*h` pixels). The rectangle must lie inside the surface.
    pub fn blit(&mut self, x: u32, y: u32, w: u32, h: u32, src: &[u32]) -> Result<()> {
        if !self.contains(x, y, w, h) {
            return Err(VdrError::MalformedRleStream(format!(
                "rectangle ({x},{y} {w}x{h}) outside {}x{} surface",
                self.width, self.height
            )));
        }
        let row_len = w as usize;
        if src.len() != row_len * h as usize {
            return Err(VdrError::MalformedRleStream(format!(
                "{} source pixels for a {w}x{h} rectangle",
                src.len()
            )));
        }
        if row_len == 0 {
            return Ok(());
        }

        let stride = self.width as usize;
        for (row, line) in src.chunks_exact(row_len).enumerate() {
            let start = (y as usize + row) * stride + x as usize;
            self.pixels[start..start + row_len].copy_from_slice(line);
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! OSD command header, command ids and flags.
//!
//! ## Wire format (62 bytes, big-endian)
//!
//! ```text
//! size:          u8     command id:   u8
//! window:        u8     layer:        u8
//! pts:           i64    delay_ms:     u32
//! x, y, w, h:    u16 ×4
//! data_len:      u32    num_rle:      u32
//! (data slot):   u64    colors_count: u32
//! (palette slot):u64
//! dirty x1,y1,x2,y2: u16 ×4
//! flags:         u8     scaling:      u8
//! ```
//!
//! The header is followed by `colors_count * 4` palette bytes and then
//! `data_len` data bytes. The two slots carry server-side pointers and are
//! ignored.

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes};

use crate::error::{Result, VdrError};

/// Length of the fixed OSD command header.
pub const OSD_HEADER_LEN: usize = 62;

// ── OsdCommandId ─────────────────────────────────────────────────

/// The closed set of OSD commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsdCommandId {
    /// Do nothing; initialises the delay counter.
    Nop = 0,
    /// Set the size of the OSD area.
    Size = 1,
    /// Create/update a window with xine-style RLE data.
    SetRle = 2,
    /// Close the OSD window.
    Close = 5,
    /// All areas updated; show them.
    Commit = 7,
    /// Flush all pending OSD operations.
    Flush = 8,
    /// Set the video window inside the OSD.
    VideoWindow = 9,
    /// Create/update a window with HDMV (palette) RLE data.
    SetHdmv = 10,
    /// Create/update a window with uncompressed 8-bit palette indices.
    SetLut8 = 11,
    /// Create/update a window with uncompressed ARGB pixels.
    SetArgb = 12,
    /// Create/update a window with ARGB RLE data.
    SetArgbRle = 13,
}

impl TryFrom<u8> for OsdCommandId {
    type Error = VdrError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Nop),
            1 => Ok(Self::Size),
            2 => Ok(Self::SetRle),
            5 => Ok(Self::Close),
            7 => Ok(Self::Commit),
            8 => Ok(Self::Flush),
            9 => Ok(Self::VideoWindow),
            10 => Ok(Self::SetHdmv),
            11 => Ok(Self::SetLut8),
            12 => Ok(Self::SetArgb),
            13 => Ok(Self::SetArgbRle),
            other => Err(VdrError::InvalidCommandId(other)),
        }
    }
}

impl fmt::Display for OsdCommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nop => "Nop",
            Self::Size => "Size",
            Self::SetRle => "SetRLE",
            Self::Close => "Close",
            Self::Commit => "Commit",
            Self::Flush => "Flush",
            Self::VideoWindow => "VideoWindow",
            Self::SetHdmv => "SetHDMV",
            Self::SetLut8 => "SetLUT8",
            Self::SetArgb => "SetARGB",
            Self::SetArgbRle => "SetARGBRLE",
        };
        f.write_str(name)
    }
}

// ── OsdFlags ─────────────────────────────────────────────────────

bitflags! {
    /// Per-command OSD flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OsdFlags: u8 {
        /// Palette entries are Y'CbCr rather than RGB.
        const YUV_CLUT = 0x01;
        /// Window content must be redrawn completely.
        const REFRESH = 0x02;
        /// Do not scale with the video.
        const UNSCALED = 0x04;
        /// Unscaled, low-resolution variant.
        const UNSCALED_LOWRES = 0x08;
        /// Draw above every other layer.
        const TOP_LAYER = 0x10;

        const _ = !0;
    }
}

// ── DirtyArea ────────────────────────────────────────────────────

/// The region the server reports as modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyArea {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

// ── OsdHeader ────────────────────────────────────────────────────

/// The fixed-layout part of an OSD command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsdHeader {
    /// On-wire header size (the length prefix).
    pub size: u8,
    pub id: OsdCommandId,
    pub window: u8,
    pub layer: u8,
    pub pts: i64,
    pub delay_ms: u32,
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub data_len: u32,
    pub num_rle: u32,
    pub colors_count: u32,
    pub dirty: DirtyArea,
    pub flags: OsdFlags,
    pub scaling: u8,
}

impl OsdHeader {
    /// A header with every field zeroed except `size` and `id`.
    pub fn new(id: OsdCommandId) -> Self {
        Self {
            size: OSD_HEADER_LEN as u8,
            id,
            window: 0,
            layer: 0,
            pts: 0,
            delay_ms: 0,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            data_len: 0,
            num_rle: 0,
            colors_count: 0,
            dirty: DirtyArea::default(),
            flags: OsdFlags::empty(),
            scaling: 0,
        }
    }

    /// Decode a header from `data`, which must hold exactly the `size`
    /// bytes announced by its first byte.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let size = data.first().copied().unwrap_or(0) as usize;
        if data.len() != size || size < OSD_HEADER_LEN {
            return Err(VdrError::InvalidOsdHeader {
                size,
                actual: data.len(),
                min: OSD_HEADER_LEN,
            });
        }

        let mut buf = data;
        let size = buf.get_u8();
        let id = OsdCommandId::try_from(buf.get_u8())?;
        let window = buf.get_u8();
        let layer = buf.get_u8();
        let pts = buf.get_i64();
        let delay_ms = buf.get_u32();
        let x = buf.get_u16();
        let y = buf.get_u16();
        let w = buf.get_u16();
        let h = buf.get_u16();
        let data_len = buf.get_u32();
        let num_rle = buf.get_u32();
        buf.advance(8);
        let colors_count = buf.get_u32();
        buf.advance(8);
        let dirty = DirtyArea {
            x1: buf.get_u16(),
            y1: buf.get_u16(),
            x2: buf.get_u16(),
            y2: buf.get_u16(),
        };
        let flags = OsdFlags::from_bits_retain(buf.get_u8());
        let scaling = buf.get_u8();

        Ok(Self {
            size,
            id,
            window,
            layer,
            pts,
            delay_ms,
            x,
            y,
            w,
            h,
            data_len,
            num_rle,
            colors_count,
            dirty,
            flags,
            scaling,
        })
    }

    /// Serialize the fixed header (always [`OSD_HEADER_LEN`] bytes).
    pub fn encode(&self) -> [u8; OSD_HEADER_LEN] {
        let mut out = [0u8; OSD_HEADER_LEN];
        let mut buf = &mut out[..];
        buf.put_u8(OSD_HEADER_LEN as u8);
        buf.put_u8(self.id as u8);
        buf.put_u8(self.window);
        buf.put_u8(self.layer);
        buf.put_i64(self.pts);
        buf.put_u32(self.delay_ms);
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.w);
        buf.put_u16(self.h);
        buf.put_u32(self.data_len);
        buf.put_u32(self.num_rle);
        buf.put_u64(0);
        buf.put_u32(self.colors_count);
        buf.put_u64(0);
        buf.put_u16(self.dirty.x1);
        buf.put_u16(self.dirty.y1);
        buf.put_u16(self.dirty.x2);
        buf.put_u16(self.dirty.y2);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.scaling);
        out
    }

    /// Number of palette bytes that follow the header.
    pub fn palette_len(&self) -> usize {
        self.colors_count as usize * 4
    }

    /// Number of data bytes that follow the palette.
    pub fn data_len(&self) -> usize {
        self.data_len as usize
    }
}

impl fmt::Display for OsdHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} wnd={} layer={} pts={} delay={} rect=({},{} {}x{}) data_len={} num_rle={} \
             colors={} dirty=({},{})-({},{}) flags={:05b} scaling={}",
            self.id,
            self.window,
            self.layer,
            self.pts,
            self.delay_ms,
            self.x,
            self.y,
            self.w,
            self.h,
            self.data_len,
            self.num_rle,
            self.colors_count,
            self.dirty.x1,
            self.dirty.y1,
            self.dirty.x2,
            self.dirty.y2,
            self.flags.bits(),
            self.scaling,
        )
    }
}

// ── OsdCommand ───────────────────────────────────────────────────

/// A complete OSD command: header plus its palette and data trailers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsdCommand {
    pub header: OsdHeader,
    pub palette: Bytes,
    pub data: Bytes,
}

impl OsdCommand {
    /// Build a command, fixing up the header's trailer lengths.
    pub fn new(mut header: OsdHeader, palette: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        let palette = palette.into();
        let data = data.into();
        header.colors_count = (palette.len() / 4) as u32;
        header.data_len = data.len() as u32;
        Self {
            header,
            palette,
            data,
        }
    }

    pub fn id(&self) -> OsdCommandId {
        self.header.id
    }

    /// Full wire encoding: header, palette, data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(OSD_HEADER_LEN + self.palette.len() + self.data.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.palette);
        out.extend_from_slice(&self.data);
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────

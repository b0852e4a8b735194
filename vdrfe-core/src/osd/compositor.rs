//! Applies OSD commands to the surface and drives the renderer.

use tracing::{debug, trace, warn};

use crate::error::{Result, VdrError};
use crate::osd::command::{OsdCommand, OsdCommandId, OsdFlags};
use crate::osd::rle;
use crate::osd::surface::{OsdSurface, Palette};
use crate::render::Renderer;

/// Largest surface a `Size` command may request (4096×4096).
pub const MAX_SURFACE_PIXELS: usize = 4096 * 4096;

// ── OsdConfig ────────────────────────────────────────────────────

/// Configuration for [`OsdCompositor`].
#[derive(Debug, Clone)]
pub struct OsdConfig {
    /// Render only on `Commit` instead of after every set command.
    pub render_on_commit: bool,
}

impl Default for OsdConfig {
    fn default() -> Self {
        Self {
            render_on_commit: false,
        }
    }
}

// ── OsdCompositor ────────────────────────────────────────────────

/// Owns the OSD surface for one control connection.
pub struct OsdCompositor {
    surface: OsdSurface,
    renderer: Box<dyn Renderer>,
    config: OsdConfig,
    applied: u64,
}

impl OsdCompositor {
    pub fn new(renderer: Box<dyn Renderer>, config: OsdConfig) -> Self {
        Self {
            surface: OsdSurface::default(),
            renderer,
            config,
            applied: 0,
        }
    }

    pub fn surface(&self) -> &OsdSurface {
        &self.surface
    }

    /// Apply one command.
    ///
    /// Rectangles outside the surface and short uncompressed data are
    /// errors; RLE geometry anomalies are only logged.
    pub fn apply(&mut self, cmd: &OsdCommand) -> Result<()> {
        let header = &cmd.header;
        debug!("osd: {header}");
        self.applied += 1;

        match header.id {
            OsdCommandId::Nop => trace!("osd: nop"),
            OsdCommandId::Size => {
                let pixels = header.w as usize * header.h as usize;
                if pixels > MAX_SURFACE_PIXELS {
                    return Err(VdrError::FrameTooLarge {
                        size: pixels,
                        max: MAX_SURFACE_PIXELS,
                    });
                }
                self.surface.resize(header.w as u32, header.h as u32);
            }
            OsdCommandId::SetArgbRle
            | OsdCommandId::SetHdmv
            | OsdCommandId::SetLut8
            | OsdCommandId::SetArgb => {
                self.set_window(cmd)?;
                if !self.config.render_on_commit {
                    self.render();
                }
            }
            OsdCommandId::Commit => {
                if self.config.render_on_commit {
                    self.render();
                }
            }
            OsdCommandId::Flush => self.surface.clear(),
            OsdCommandId::Close => self.close(),
            OsdCommandId::SetRle | OsdCommandId::VideoWindow => {
                debug!("osd: unhandled command {}", header.id);
            }
        }
        Ok(())
    }

    /// Blank the surface and take the OSD off the display. Called once
    /// when the control connection ends, however it ends.
    pub fn shutdown(&mut self) {
        debug!("osd: shutting down after {} commands", self.applied);
        self.close();
    }

    fn close(&mut self) {
        self.surface.clear();
        if let Err(e) = self.renderer.clear() {
            warn!("osd: renderer clear failed: {e}");
        }
    }

    fn set_window(&mut self, cmd: &OsdCommand) -> Result<()> {
        let h = &cmd.header;
        let (x, y, w, hgt) = (h.x as u32, h.y as u32, h.w as u32, h.h as u32);
        if !self.surface.contains(x, y, w, hgt) {
            return Err(VdrError::MalformedRleStream(format!(
                "{} window ({x},{y} {w}x{hgt}) outside {}x{} surface",
                h.id,
                self.surface.width(),
                self.surface.height()
            )));
        }

        let palette = Palette::from_wire(&cmd.palette, h.flags.contains(OsdFlags::YUV_CLUT));
        let rect = match h.id {
            OsdCommandId::SetArgbRle => rle::decode_argb_rle(&cmd.data, w, hgt),
            OsdCommandId::SetHdmv => rle::decode_hdmv_rle(&cmd.data, w, hgt, &palette),
            OsdCommandId::SetLut8 => rle::decode_lut8(&cmd.data, w, hgt, &palette)?,
            _ => rle::decode_argb(&cmd.data, w, hgt)?,
        };

        let diag = &rect.diagnostics;
        if let Some((ox, oy)) = diag.overflow {
            warn!("osd: {} overflowed {w}x{hgt} window at ({ox},{oy})", h.id);
        }
        if let Some(at) = diag.truncated_at {
            warn!("osd: {} data truncated at byte {at}", h.id);
        }
        if h.id == OsdCommandId::SetArgbRle && diag.elements != h.num_rle {
            trace!("osd: decoded {} rle elements, header says {}", diag.elements, h.num_rle);
        }

        self.surface.blit(x, y, w, hgt, &rect.pixels)
    }

    fn render(&mut self) {
        if let Err(e) = self.renderer.render(&self.surface) {
            warn!("osd: render failed: {e}");
        }
    }
}

impl std::fmt::Debug for OsdCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsdCompositor")
            .field("width", &self.surface.width())
            .field("height", &self.surface.height())
            .field("config", &self.config)
            .field("applied", &self.applied)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

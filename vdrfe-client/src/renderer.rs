//! OSD renderers available from the command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};
use vdrfe_core::osd::OsdSurface;
use vdrfe_core::{Renderer, Result, VdrError};

/// Which renderer `--osd` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RendererKind {
    /// Drop OSD commands without decoding them.
    None,
    /// Log a summary of every rendered frame.
    Log,
    /// Write every rendered frame to a PAM image.
    Pam,
}

impl FromStr for RendererKind {
    type Err = VdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "log" => Ok(Self::Log),
            "pam" => Ok(Self::Pam),
            other => Err(VdrError::Other(format!("unknown OSD renderer {other:?}"))),
        }
    }
}

/// Build the renderer for `kind`; `None` means no OSD display at all.
pub fn build(kind: RendererKind, snapshot_path: &Path) -> Option<Box<dyn Renderer>> {
    match kind {
        RendererKind::None => None,
        RendererKind::Log => Some(Box::new(LogRenderer::default())),
        RendererKind::Pam => Some(Box::new(PamRenderer::new(snapshot_path))),
    }
}

// ── LogRenderer ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: u64,
}

impl Renderer for LogRenderer {
    fn render(&mut self, surface: &OsdSurface) -> Result<()> {
        self.frames += 1;
        info!(
            "osd frame {}: {}x{}, {} opaque pixels",
            self.frames,
            surface.width(),
            surface.height(),
            surface.opaque_pixels()
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        info!("osd closed");
        Ok(())
    }
}

// ── PamRenderer ──────────────────────────────────────────────────

/// Writes the surface as a `P7` RGB_ALPHA image, replacing the file on
/// every render. `clear` removes it.
#[derive(Debug)]
pub struct PamRenderer {
    path: PathBuf,
}

impl PamRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Encode `surface` as PAM.
pub fn encode_pam(surface: &OsdSurface) -> Vec<u8> {
    let header = format!(
        "P7\nWIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
        surface.width(),
        surface.height()
    );
    let mut out = Vec::with_capacity(header.len() + surface.pixels().len() * 4);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&surface.to_rgba_bytes());
    out
}

impl Renderer for PamRenderer {
    fn render(&mut self, surface: &OsdSurface) -> Result<()> {
        // Readers only ever see complete images.
        let tmp = self.path.with_extension("pam.tmp");
        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| VdrError::Render(format!("{}: {e}", tmp.display())))?;
        file.write_all(&encode_pam(surface))
            .map_err(|e| VdrError::Render(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| VdrError::Render(format!("{}: {e}", self.path.display())))?;
        debug!("osd: wrote {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VdrError::Render(format!("{}: {e}", self.path.display()))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

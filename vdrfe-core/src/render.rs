//! OSD renderer collaborator.

use crate::error::Result;
use crate::osd::OsdSurface;

/// Presents the OSD surface.
///
/// Failures are reported back to the compositor, which logs them and keeps
/// going; a broken display never ends the control channel.
pub trait Renderer: Send {
    /// Show the current contents of `surface`.
    fn render(&mut self, surface: &OsdSurface) -> Result<()>;

    /// Remove the OSD from the display.
    fn clear(&mut self) -> Result<()>;
}

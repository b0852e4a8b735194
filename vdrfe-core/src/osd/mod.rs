//! On-screen display: command wire format, pixel decoders, the surface and
//! the compositor that ties them to a renderer.

pub mod command;
pub mod compositor;
pub mod rle;
pub mod surface;

pub use command::{DirtyArea, OSD_HEADER_LEN, OsdCommand, OsdCommandId, OsdFlags, OsdHeader};
pub use compositor::{OsdCompositor, OsdConfig};
pub use rle::{DecodedRect, RleDecoder, RleDiagnostics};
pub use surface::{OsdSurface, Palette};

//! `tokio_util` codecs for both server connections.

pub mod control;
pub mod data;

pub use control::{ControlCodec, ControlFrame, ControlRequest};
pub use data::{DEFAULT_MAX_FRAME_LEN, StreamFrameCodec};

//! # vdrfe-core
//!
//! Protocol engine for a remote A/V playback front-end talking to a VDR
//! style streaming server.
//!
//! This crate contains:
//! - **Frames**: `FrameHeader`, `StreamFrame` and `StreamFrameCodec` for the data channel
//! - **Control codec**: `ControlCodec` demultiplexing text lines and binary OSD commands
//! - **OSD**: command headers, RLE/ARGB/palette decoders, `OsdSurface` and `OsdCompositor`
//! - **PES**: transport-stream scanner for presentation timestamps
//! - **Channels**: `ControlChannel` / `DataChannel` with handshake and run loops
//! - **Pipeline**: `PlaybackPipeline`, the bounded queue between data channel and player
//! - **Collaborators**: the `Player` and `Renderer` traits
//! - **Error**: `VdrError`, a typed, `thiserror`-based error hierarchy

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;
pub mod osd;
pub mod pes;
pub mod pipeline;
pub mod player;
pub mod render;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{
    ControlChannel, ControlConfig, ControlContext, ControlPhase, DataChannel, DataLogin,
};
pub use codec::{ControlCodec, ControlFrame, ControlRequest, StreamFrameCodec};
pub use error::{Result, VdrError};
pub use frame::{FRAME_HEADER_LEN, FrameHeader, INFO_STREAM_ID, StreamFrame};
pub use osd::{OsdCommand, OsdCommandId, OsdCompositor, OsdConfig, OsdFlags, OsdHeader, OsdSurface};
pub use pipeline::{
    FrameSubmitter, PipelineConfig, PipelineHandle, PipelineStats, PlaybackPipeline,
};
pub use player::{Player, PlayerCommand};
pub use render::Renderer;

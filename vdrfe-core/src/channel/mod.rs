//! The two server connections.
//!
//! The control channel logs in first; its [`DataLogin`] is what the data
//! channel sends to attach to the same session.

pub mod control;
pub mod data;
pub mod phase;

pub use control::{
    ControlChannel, ControlConfig, ControlContext, DEFAULT_ANNOUNCEMENTS, DEFAULT_KEYMAP,
    DEFAULT_PORT, DataLogin, ServerLine,
};
pub use data::{DATA_ACK, DataChannel};
pub use phase::ControlPhase;

//! # vdrfe-client: playback front-end
//!
//! Connects to a VDR-style streaming server, pipes the received stream
//! into an external player process, renders the OSD and forwards local
//! key presses back to the server.

pub mod config;
pub mod input;
pub mod player;
pub mod renderer;
pub mod session;

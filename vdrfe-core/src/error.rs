//! Domain-specific error types for the vdrfe protocol engine.
//!
//! All fallible operations return `Result<T, VdrError>`.
//! Every variant except the RLE geometry diagnostics ends the channel loop
//! that produced it; nothing in the core retries.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the vdrfe protocol engine.
#[derive(Debug, Error)]
pub enum VdrError {
    // ── Framing Errors ───────────────────────────────────────────
    /// The stream ended (or the buffer was short) inside a frame header.
    #[error("truncated frame header: got {got} of 13 bytes")]
    TruncatedHeader { got: usize },

    /// The stream ended before the announced payload was complete.
    #[error("truncated payload: expected {expected} bytes, got {got}")]
    TruncatedPayload { expected: usize, got: usize },

    /// A frame or OSD trailer exceeded the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── OSD Errors ───────────────────────────────────────────────
    /// The OSD command id is outside the known command set.
    #[error("invalid OSD command id: {0}")]
    InvalidCommandId(u8),

    /// The OSD header length prefix does not match the fixed layout.
    #[error("invalid OSD header: size byte {size}, buffer {actual} bytes (min {min})")]
    InvalidOsdHeader { size: usize, actual: usize, min: usize },

    /// OSD pixel data does not fit the target surface.
    #[error("malformed OSD data: {0}")]
    MalformedRleStream(String),

    // ── Transport-stream Diagnostics ─────────────────────────────
    /// Payload length is not a multiple of the 188-byte TS packet size.
    #[error("not a transport stream: {0} bytes is not a multiple of 188")]
    NotTransportStream(usize),

    // ── Connection Errors ────────────────────────────────────────
    /// The server answered the handshake with something unexpected.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The peer closed the connection, or a pipeline role went away.
    #[error("channel closed")]
    ChannelClosed,

    /// The local address cannot be expressed in the data login.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A state-machine transition or message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The player collaborator failed.
    #[error("player error: {0}")]
    Player(String),

    /// The OSD renderer collaborator failed.
    #[error("render error: {0}")]
    Render(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VdrError>;

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VdrError {
    fn from(s: String) -> Self {
        VdrError::Other(s)
    }
}

impl From<&str> for VdrError {
    fn from(s: &str) -> Self {
        VdrError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VdrError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VdrError::ChannelClosed
    }
}

//! Control-channel session state machine.
//!
//! Transitions are validated and return `Result` instead of panicking.

use std::fmt;

use crate::error::VdrError;

/// The current phase of a control session.
///
/// ```text
///  Connecting ──► AwaitingReady ──► LoggedIn ──► Streaming
///                   (CONTROL sent)   (banner +    (announcements
///                                     client id)   sent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPhase {
    /// TCP connection being established. Initial state.
    #[default]
    Connecting,

    /// `CONTROL` sent; waiting for the banner and client id.
    AwaitingReady,

    /// Handshake complete; the data channel may log in.
    LoggedIn {
        /// Id assigned by the server, echoed in the data login.
        client_id: u32,
    },

    /// Announcements sent; lines and OSD commands are processed.
    Streaming {
        client_id: u32,
    },
}

impl fmt::Display for ControlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingReady => write!(f, "AwaitingReady"),
            Self::LoggedIn { client_id } => write!(f, "LoggedIn({client_id})"),
            Self::Streaming { client_id } => write!(f, "Streaming({client_id})"),
        }
    }
}

impl ControlPhase {
    pub fn client_id(&self) -> Option<u32> {
        match self {
            Self::LoggedIn { client_id } | Self::Streaming { client_id } => Some(*client_id),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `AwaitingReady`.
    ///
    /// Valid from: `Connecting`.
    pub fn hello_sent(&mut self) -> Result<(), VdrError> {
        match self {
            Self::Connecting => {
                *self = Self::AwaitingReady;
                Ok(())
            }
            _ => Err(VdrError::ProtocolViolation(
                "cannot send CONTROL: not in Connecting state",
            )),
        }
    }

    /// Transition to `LoggedIn`.
    ///
    /// Valid from: `AwaitingReady`.
    pub fn logged_in(&mut self, client_id: u32) -> Result<(), VdrError> {
        match self {
            Self::AwaitingReady => {
                *self = Self::LoggedIn { client_id };
                Ok(())
            }
            _ => Err(VdrError::ProtocolViolation(
                "cannot log in: not in AwaitingReady state",
            )),
        }
    }

    /// Transition to `Streaming`.
    ///
    /// Valid from: `LoggedIn`.
    pub fn start_streaming(&mut self) -> Result<(), VdrError> {
        match *self {
            Self::LoggedIn { client_id } => {
                *self = Self::Streaming { client_id };
                Ok(())
            }
            _ => Err(VdrError::ProtocolViolation(
                "cannot stream: not in LoggedIn state",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

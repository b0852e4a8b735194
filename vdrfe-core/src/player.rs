//! Downstream player collaborator.
//!
//! The pipeline consumer is the only caller, so implementations never see
//! concurrent calls.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

// ── PlayerCommand ────────────────────────────────────────────────

/// Remote-control commands understood by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerCommand {
    Play,
    Pause,
    /// Skip whatever the player has buffered.
    Next,
    Stop,
}

impl PlayerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Stop => "stop",
        }
    }

    /// Map a `TRICKSPEED <mode>` value to a command. Only pause (0) and
    /// normal play (1) are supported.
    pub fn from_trick_speed(mode: i32) -> Option<Self> {
        match mode {
            0 => Some(Self::Pause),
            1 => Some(Self::Play),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Player ───────────────────────────────────────────────────────

/// Sink for elementary-stream payloads.
#[async_trait]
pub trait Player: Send {
    /// Prepare the player. Called once, before the first payload.
    async fn start(&mut self) -> Result<()>;

    /// Feed one frame payload.
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()>;

    async fn send_control(&mut self, command: PlayerCommand) -> Result<()>;

    /// Stop and release the player.
    async fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trick_speed_modes() {
        assert_eq!(PlayerCommand::from_trick_speed(0), Some(PlayerCommand::Pause));
        assert_eq!(PlayerCommand::from_trick_speed(1), Some(PlayerCommand::Play));
        assert_eq!(PlayerCommand::from_trick_speed(-2), None);
        assert_eq!(PlayerCommand::from_trick_speed(8), None);
    }

    #[test]
    fn command_names() {
        assert_eq!(PlayerCommand::Next.to_string(), "next");
        assert_eq!(PlayerCommand::Stop.as_str(), "stop");
    }
}

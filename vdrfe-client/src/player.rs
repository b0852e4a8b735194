//! External player process fed through its stdin.
//!
//! Playback commands go to the player's line-based remote-control socket,
//! one short-lived TCP connection per command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};
use vdrfe_core::{Player, PlayerCommand, Result, VdrError};

use crate::config::PlayerConfig;

const RC_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A player running as a child process.
#[derive(Debug)]
pub struct ProcessPlayer {
    config: PlayerConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl ProcessPlayer {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            child: None,
            stdin: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.config.stop_timeout_ms)
    }
}

#[async_trait]
impl Player for ProcessPlayer {
    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VdrError::Player(format!("cannot start {}: {e}", self.config.command)))?;

        self.stdin = child.stdin.take();
        info!(
            "player: started {} (pid {})",
            self.config.command,
            child.id().unwrap_or_default()
        );
        self.child = Some(child);
        Ok(())
    }

    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VdrError::Player("player is not running".into()))?;
        stdin
            .write_all(payload)
            .await
            .map_err(|e| VdrError::Player(format!("write to player failed: {e}")))
    }

    async fn send_control(&mut self, command: PlayerCommand) -> Result<()> {
        if self.config.rc_address.is_empty() {
            debug!("player: no rc address, dropping {command}");
            return Ok(());
        }

        let connect = TcpStream::connect(self.config.rc_address.as_str());
        let mut rc = tokio::time::timeout(RC_CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| VdrError::Timeout(RC_CONNECT_TIMEOUT))?
            .map_err(|e| {
                VdrError::Player(format!("rc {} unreachable: {e}", self.config.rc_address))
            })?;
        rc.write_all(format!("{command}\n").as_bytes()).await?;
        rc.shutdown().await?;
        debug!("player: rc {command}");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // Closing stdin signals end of stream.
        self.stdin = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        interrupt(&child);

        let timeout = self.stop_timeout();
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => info!("player: exited with {status}"),
            Ok(Err(e)) => return Err(VdrError::Player(format!("wait for player failed: {e}"))),
            Err(_) => {
                warn!("player: still running after {timeout:?}, killing");
                child
                    .kill()
                    .await
                    .map_err(|e| VdrError::Player(format!("kill failed: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Send SIGINT; players with a remote-control interface often ignore the
/// end of stdin.
#[cfg(unix)]
fn interrupt(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    // None once the child has been reaped
    let Some(pid) = child.id() else {
        return;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        Ok(()) => debug!("player: sent SIGINT to pid {pid}"),
        Err(e) => warn!("player: SIGINT to pid {pid} failed: {e}"),
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    fn config(command: &str, args: &[&str]) -> PlayerConfig {
        PlayerConfig {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            rc_address: String::new(),
            stop_timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn write_before_start_fails() {
        let mut player = ProcessPlayer::new(config("cat", &[]));
        let err = player.write_payload(b"x").await.unwrap_err();
        assert!(matches!(err, VdrError::Player(_)));
    }

    #[tokio::test]
    async fn missing_program_is_a_player_error() {
        let mut player = ProcessPlayer::new(config("/nonexistent/player", &[]));
        assert!(matches!(player.start().await, Err(VdrError::Player(_))));
        assert!(!player.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn feeds_stdin_and_stops() {
        let mut player = ProcessPlayer::new(config("sh", &["-c", "cat > /dev/null"]));
        player.start().await.unwrap();
        assert!(player.is_running());
        player.write_payload(&[0x47; 188]).await.unwrap();
        player.stop().await.unwrap();
        assert!(!player.is_running());
        // stopping twice is harmless
        player.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupt_stops_a_player_that_ignores_stdin() {
        let mut cfg = config("sleep", &["30"]);
        cfg.stop_timeout_ms = 10_000;
        let mut player = ProcessPlayer::new(cfg);
        player.start().await.unwrap();

        let started = std::time::Instant::now();
        player.stop().await.unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "stop took {:?}",
            started.elapsed()
        );
        assert!(!player.is_running());
    }

    #[tokio::test]
    async fn rc_command_is_one_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut line = String::new();
            stream.read_to_string(&mut line).await.unwrap();
            line
        });

        let mut cfg = config("cat", &[]);
        cfg.rc_address = addr.to_string();
        let mut player = ProcessPlayer::new(cfg);
        player.send_control(PlayerCommand::Pause).await.unwrap();
        assert_eq!(server.await.unwrap(), "pause\n");
    }

    #[tokio::test]
    async fn rc_disabled_is_a_no_op() {
        let mut player = ProcessPlayer::new(config("cat", &[]));
        player.send_control(PlayerCommand::Next).await.unwrap();
    }
}

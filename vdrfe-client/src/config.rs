//! Configuration for the front-end, loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vdrfe_core::channel::{DEFAULT_ANNOUNCEMENTS, DEFAULT_KEYMAP, DEFAULT_PORT};
use vdrfe_core::codec::DEFAULT_MAX_FRAME_LEN;
use vdrfe_core::pipeline::DEFAULT_QUEUE_DEPTH;
use vdrfe_core::{ControlConfig, OsdConfig, PipelineConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub control: ControlSection,
    pub playback: PlaybackConfig,
    pub player: PlayerConfig,
    pub osd: OsdSection,
    pub input: InputConfig,
    pub logging: LoggingConfig,
}

/// Where the server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    /// Port shared by the control and data connections.
    pub port: u16,
    /// Budget for TCP connect plus handshake, per connection.
    pub connect_timeout_ms: u64,
}

/// Control-channel behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    /// Lines sent after login.
    pub announce: Vec<String>,
    /// Keymap name in `KEY` lines; empty sends `KEY <name>`.
    pub key_map: String,
}

/// Queue and data-stream limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub queue_depth: usize,
    /// Largest accepted data frame payload in bytes.
    pub max_frame_len: usize,
    /// Log PES timestamps of every forwarded payload.
    pub pts_diagnostics: bool,
}

/// External player process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Program that reads the stream on stdin.
    pub command: String,
    pub args: Vec<String>,
    /// TCP address of the player's remote-control interface; empty
    /// disables play/pause/next commands.
    pub rc_address: String,
    /// How long to wait for the player to exit before killing it.
    pub stop_timeout_ms: u64,
}

/// OSD display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OsdSection {
    /// "none", "log" or "pam".
    pub renderer: String,
    /// File the "pam" renderer writes.
    pub snapshot_path: String,
    pub render_on_commit: bool,
}

/// Local key input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Read key names from stdin, one per line.
    pub keys_from_stdin: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            announce: DEFAULT_ANNOUNCEMENTS.iter().map(|s| s.to_string()).collect(),
            key_map: DEFAULT_KEYMAP.into(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            pts_diagnostics: false,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "vlc".into(),
            args: ["-", "--intf", "rc", "--rc-host", "localhost:23456"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rc_address: "localhost:23456".into(),
            stop_timeout_ms: 3000,
        }
    }
}

impl Default for OsdSection {
    fn default() -> Self {
        Self {
            renderer: "log".into(),
            snapshot_path: "osd.pam".into(),
            render_on_commit: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `host:port` of the server.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms.max(1))
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_depth: self.playback.queue_depth.max(1),
            pts_diagnostics: self.playback.pts_diagnostics,
        }
    }

    pub fn to_control_config(&self) -> ControlConfig {
        ControlConfig {
            announcements: self.control.announce.clone(),
            keymap: self.control.key_map.clone(),
        }
    }

    pub fn to_osd_config(&self) -> OsdConfig {
        OsdConfig {
            render_on_commit: self.osd.render_on_commit,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

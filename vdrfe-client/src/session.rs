//! One playback session: both connections, the pipeline and the OSD.
//!
//! ```text
//!  connect control ─► connect data ─► announce ─► spawn pipeline
//!        │                                          │
//!        └── control task ◄── keys     data task ───┘
//!                 (first to end, or the shutdown signal, stops the rest)
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vdrfe_core::{
    ControlChannel, ControlContext, DataChannel, OsdCompositor, PipelineStats, PlaybackPipeline,
    Player, Renderer, Result, VdrError,
};

use crate::config::ClientConfig;

/// How long a cancelled control loop gets to shut the OSD down.
const CONTROL_STOP_TIMEOUT: Duration = Duration::from_secs(2);

// ── SessionEnd ───────────────────────────────────────────────────

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The shutdown signal fired (Ctrl-C).
    Interrupted,
    /// The server closed one of the connections.
    ServerClosed,
    /// A channel, the player or the pipeline failed.
    Failed(VdrError),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::ServerClosed => write!(f, "closed by server"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Outcome of [`Session::run`].
#[derive(Debug)]
pub struct SessionReport {
    pub end: SessionEnd,
    /// `None` when the pipeline itself failed.
    pub stats: Option<PipelineStats>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.end, SessionEnd::Failed(_))
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Everything a session needs besides the server.
pub struct Session {
    config: ClientConfig,
    player: Box<dyn Player>,
    renderer: Option<Box<dyn Renderer>>,
    keys: Option<mpsc::Receiver<String>>,
}

enum Stopped {
    Signal,
    Channel(&'static str, Result<()>),
}

impl Session {
    pub fn new(config: ClientConfig, player: Box<dyn Player>) -> Self {
        Self {
            config,
            player,
            renderer: None,
            keys: None,
        }
    }

    /// Show the OSD through `renderer`; without one OSD commands are dropped.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Forward key names from `keys` to the server.
    pub fn with_keys(mut self, keys: mpsc::Receiver<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Connect, stream until a channel ends or `shutdown` resolves, then
    /// stop the pipeline.
    ///
    /// `shutdown` drains the frames already queued. A server close or a
    /// failure discards them. Either way the control loop is stopped
    /// through its cancel token, so the OSD is cleared before returning.
    ///
    /// Connection and handshake failures are returned as `Err`; anything
    /// after that is described by the report.
    pub async fn run<F>(self, shutdown: F) -> Result<SessionReport>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            player,
            renderer,
            keys,
        } = self;

        let addr = config.server_address();
        let timeout = config.connect_timeout();
        info!("connecting to {addr}");

        let (mut control, login) =
            ControlChannel::connect(addr.as_str(), timeout, config.to_control_config()).await?;
        let mut data =
            DataChannel::connect(addr.as_str(), &login, timeout, config.playback.max_frame_len)
                .await?;
        control.announce().await?;
        info!("session {} streaming", login.client_id);

        let pipeline = PlaybackPipeline::spawn(player, config.to_pipeline_config());
        let cancel = CancellationToken::new();
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: renderer.map(|r| OsdCompositor::new(r, config.to_osd_config())),
            keys,
            cancel: cancel.clone(),
        };
        let submitter = pipeline.submitter();

        let mut control_task = tokio::spawn(async move { control.run(ctx).await });
        let mut data_task = tokio::spawn(async move { data.run(submitter).await });

        let stopped = tokio::select! {
            result = &mut control_task => Stopped::Channel("control", flatten(result)),
            result = &mut data_task => Stopped::Channel("data", flatten(result)),
            _ = shutdown => Stopped::Signal,
        };
        cancel.cancel();
        data_task.abort();
        if !control_task.is_finished() {
            stop_control(control_task).await;
        }

        let (mut end, stats) = match stopped {
            Stopped::Signal => {
                info!("shutdown requested, draining queued frames");
                (SessionEnd::Interrupted, pipeline.shutdown().await)
            }
            Stopped::Channel(name, Ok(())) | Stopped::Channel(name, Err(VdrError::ChannelClosed)) => {
                info!("{name} channel closed, discarding queued frames");
                (SessionEnd::ServerClosed, pipeline.abort().await)
            }
            Stopped::Channel(name, Err(e)) => {
                error!("{name} channel failed: {e}");
                (SessionEnd::Failed(e), pipeline.abort().await)
            }
        };

        let stats = match stats {
            Ok(stats) => {
                info!("playback: {stats}");
                Some(stats)
            }
            Err(e) => {
                error!("pipeline failed: {e}");
                if matches!(end, SessionEnd::Failed(_)) {
                    warn!("session already failed; keeping the channel error");
                } else {
                    end = SessionEnd::Failed(e);
                }
                None
            }
        };

        Ok(SessionReport { end, stats })
    }
}

/// Wait for a cancelled control loop to finish; it clears the OSD on its
/// way out.
async fn stop_control(mut task: JoinHandle<Result<()>>) {
    match tokio::time::timeout(CONTROL_STOP_TIMEOUT, &mut task).await {
        Ok(result) => {
            if let Err(e) = flatten(result) {
                debug!("control channel stopped with: {e}");
            }
        }
        Err(_) => {
            warn!("control channel still busy after {CONTROL_STOP_TIMEOUT:?}, aborting");
            task.abort();
        }
    }
}

fn flatten(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| VdrError::Other(format!("channel task failed: {e}")))?
}

// ── Tests ────────────────────────────────────────────────────────

//! Bounded producer/consumer pipeline between the data channel and the
//! player.
//!
//! ```text
//!  DataChannel ──submit()──► [ bounded queue ] ──► consumer ──► Player
//!  ControlChannel ──handle()──► [ control signals ] ──┘ (polled first)
//! ```
//!
//! The consumer task owns the player, the discard threshold and the
//! `player_started` flag. Producers only ever suspend in
//! [`FrameSubmitter::submit`] when the queue is full.

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, VdrError};
use crate::frame::StreamFrame;
use crate::pes;
use crate::player::{Player, PlayerCommand};

/// Default number of frames buffered between the two roles.
pub const DEFAULT_QUEUE_DEPTH: usize = 50;

// ── PipelineConfig ───────────────────────────────────────────────

/// Configuration for [`PlaybackPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the frame queue (at least 1).
    pub queue_depth: usize,
    /// Scan forwarded payloads for PES timestamps and log them.
    pub pts_diagnostics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            pts_diagnostics: false,
        }
    }
}

// ── PipelineStats ────────────────────────────────────────────────

/// Counters reported when the consumer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames written to the player.
    pub forwarded: u64,
    /// Frames dropped by the discard threshold or an abort.
    pub discarded: u64,
    /// Side-channel info frames (stream 255).
    pub info_frames: u64,
    pub bytes_forwarded: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forwarded {} frames ({} bytes), discarded {}, info {}",
            self.forwarded, self.bytes_forwarded, self.discarded, self.info_frames
        )
    }
}

// ── Queue and control messages ───────────────────────────────────

#[derive(Debug)]
enum QueueItem {
    Frame(StreamFrame),
    /// Sentinel: everything before it is consumed, then the consumer stops.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    DiscardUntil(u64),
    TrickSpeed(i32),
    Abort,
}

// ── Producer side ────────────────────────────────────────────────

/// Producer handle used by the data channel.
#[derive(Debug, Clone)]
pub struct FrameSubmitter {
    queue: mpsc::Sender<QueueItem>,
}

impl FrameSubmitter {
    /// Enqueue a frame, waiting while the queue is full.
    ///
    /// Fails with [`VdrError::ChannelClosed`] once the consumer has ended.
    pub async fn submit(&self, frame: StreamFrame) -> Result<()> {
        self.queue
            .send(QueueItem::Frame(frame))
            .await
            .map_err(|_| VdrError::ChannelClosed)
    }
}

/// Non-blocking control handle used by the control channel.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    control: mpsc::UnboundedSender<Signal>,
}

impl PipelineHandle {
    /// Drop every frame positioned before `position` that has not been
    /// dequeued yet.
    pub fn discard_until(&self, position: u64) -> Result<()> {
        self.signal(Signal::DiscardUntil(position))
    }

    /// Apply a `TRICKSPEED` mode to the player.
    pub fn trick_speed(&self, mode: i32) -> Result<()> {
        self.signal(Signal::TrickSpeed(mode))
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        self.control
            .send(signal)
            .map_err(|_| VdrError::ChannelClosed)
    }
}

// ── PlaybackPipeline ─────────────────────────────────────────────

/// Owns the consumer task and the channels feeding it.
pub struct PlaybackPipeline {
    queue: mpsc::Sender<QueueItem>,
    control: mpsc::UnboundedSender<Signal>,
    consumer: JoinHandle<Result<PipelineStats>>,
}

impl PlaybackPipeline {
    /// Spawn the consumer task on the current runtime.
    pub fn spawn(player: Box<dyn Player>, config: PipelineConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_depth.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let consumer = Consumer {
            player,
            config,
            discard_until: 0,
            player_started: false,
            stats: PipelineStats::default(),
        };
        let consumer = tokio::spawn(consumer.run(queue_rx, control_rx));

        Self {
            queue: queue_tx,
            control: control_tx,
            consumer,
        }
    }

    pub fn submitter(&self) -> FrameSubmitter {
        FrameSubmitter {
            queue: self.queue.clone(),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            control: self.control.clone(),
        }
    }

    /// Let the consumer drain everything queued so far, stop the player and
    /// report the stats.
    pub async fn shutdown(self) -> Result<PipelineStats> {
        let _ = self.queue.send(QueueItem::Shutdown).await;
        Self::join(self.consumer).await
    }

    /// Stop as soon as the current frame is written; frames still queued
    /// are discarded.
    pub async fn abort(self) -> Result<PipelineStats> {
        let _ = self.control.send(Signal::Abort);
        Self::join(self.consumer).await
    }

    async fn join(consumer: JoinHandle<Result<PipelineStats>>) -> Result<PipelineStats> {
        consumer
            .await
            .map_err(|e| VdrError::Other(format!("pipeline consumer failed: {e}")))?
    }
}

impl fmt::Debug for PlaybackPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackPipeline")
            .field("queued", &(self.queue.max_capacity() - self.queue.capacity()))
            .field("finished", &self.consumer.is_finished())
            .finish()
    }
}

// ── Consumer ─────────────────────────────────────────────────────

struct Consumer {
    player: Box<dyn Player>,
    config: PipelineConfig,
    discard_until: u64,
    player_started: bool,
    stats: PipelineStats,
}

impl Consumer {
    async fn run(
        mut self,
        mut queue: mpsc::Receiver<QueueItem>,
        mut control: mpsc::UnboundedReceiver<Signal>,
    ) -> Result<PipelineStats> {
        let result = self.process(&mut queue, &mut control).await;
        // producers see ChannelClosed from here on
        queue.close();

        if let Err(e) = &result {
            warn!("pipeline: consumer stopped: {e}");
        }
        if self.player_started {
            if let Err(e) = self.player.stop().await {
                warn!("pipeline: player stop failed: {e}");
                if result.is_ok() {
                    return Err(e);
                }
            }
        }
        debug!("pipeline: {}", self.stats);
        result.map(|()| self.stats)
    }

    async fn process(
        &mut self,
        queue: &mut mpsc::Receiver<QueueItem>,
        control: &mut mpsc::UnboundedReceiver<Signal>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                Some(signal) = control.recv() => match signal {
                    Signal::DiscardUntil(position) => {
                        debug!("pipeline: discard until {position}");
                        self.discard_until = position;
                    }
                    Signal::TrickSpeed(mode) => self.trick_speed(mode).await,
                    Signal::Abort => {
                        queue.close();
                        while let Ok(item) = queue.try_recv() {
                            if let QueueItem::Frame(_) = item {
                                self.stats.discarded += 1;
                            }
                        }
                        info!("pipeline: aborted");
                        return Ok(());
                    }
                },

                item = queue.recv() => match item {
                    Some(QueueItem::Frame(frame)) => self.handle_frame(frame).await?,
                    Some(QueueItem::Shutdown) | None => {
                        debug!("pipeline: queue drained");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: StreamFrame) -> Result<()> {
        trace!("pipeline: {frame}");

        if frame.is_info() {
            self.stats.info_frames += 1;
            let info = frame.info_text();
            if info.starts_with("DISCARD") {
                debug!("pipeline: stream info DISCARD at {}", frame.position());
                if self.player_started {
                    self.control_player(PlayerCommand::Next).await;
                }
            } else if info.starts_with("BLANK") {
                debug!("pipeline: stream info BLANK at {}", frame.position());
            } else {
                debug!("pipeline: stream info {info:?} at {}", frame.position());
            }
            return Ok(());
        }

        if frame.position() < self.discard_until {
            trace!(
                "pipeline: dropping frame at {} (< {})",
                frame.position(),
                self.discard_until
            );
            self.stats.discarded += 1;
            return Ok(());
        }

        if !self.player_started {
            self.player.start().await?;
            self.player_started = true;
            info!("pipeline: player started at position {}", frame.position());
        }

        if self.config.pts_diagnostics {
            log_timestamps(&frame);
        }

        self.player.write_payload(frame.payload()).await?;
        self.stats.forwarded += 1;
        self.stats.bytes_forwarded += frame.payload().len() as u64;
        Ok(())
    }

    async fn trick_speed(&mut self, mode: i32) {
        if !self.player_started {
            debug!("pipeline: trick speed {mode} ignored, player not started");
            return;
        }
        match PlayerCommand::from_trick_speed(mode) {
            Some(command) => self.control_player(command).await,
            None => warn!("pipeline: unsupported trick speed {mode}"),
        }
    }

    /// Remote-control failures are logged; the stream keeps flowing.
    async fn control_player(&mut self, command: PlayerCommand) {
        if let Err(e) = self.player.send_control(command).await {
            warn!("pipeline: player control {command} failed: {e}");
        }
    }
}

fn log_timestamps(frame: &StreamFrame) {
    match pes::scan(frame.payload()) {
        Ok(headers) => {
            for pes in headers.iter().filter(|h| h.pts.is_some()) {
                debug!(
                    "pts: position={} stream={:#04x} kind={:?} pts={:?}",
                    frame.position(),
                    pes.stream_id,
                    pes.kind,
                    pes.pts
                );
            }
        }
        Err(e) => trace!("pts: {e}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────

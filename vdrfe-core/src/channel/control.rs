//! The control connection: handshake, announcements, then a loop that
//! dispatches server lines and OSD commands and forwards key presses.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::phase::ControlPhase;
use crate::codec::control::{ControlCodec, ControlFrame, ControlRequest};
use crate::error::{Result, VdrError};
use crate::osd::OsdCompositor;
use crate::pipeline::PipelineHandle;

/// TCP port the server listens on for both connections.
pub const DEFAULT_PORT: u16 = 37890;

/// Keymap name sent with every `KEY` line by default.
pub const DEFAULT_KEYMAP: &str = "XKeySym";

/// Lines sent once the session is logged in.
pub const DEFAULT_ANNOUNCEMENTS: [&str; 3] = ["INFO WINDOWS 1280x720", "INFO ARGBOSD RLE", "CONFIG"];

const BANNER_PREFIX: &str = "VDR";

// ── ControlConfig ────────────────────────────────────────────────

/// Configuration for [`ControlChannel`].
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub announcements: Vec<String>,
    /// Empty sends bare `KEY <name>` lines.
    pub keymap: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            announcements: DEFAULT_ANNOUNCEMENTS.iter().map(|s| s.to_string()).collect(),
            keymap: DEFAULT_KEYMAP.to_string(),
        }
    }
}

// ── DataLogin ────────────────────────────────────────────────────

/// The line that logs the data connection into an existing control session.
///
/// `DATA <client-id> 0x<ip as 8 hex digits>:<port> <dotted ip>`, built from
/// the control socket's local address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLogin {
    pub client_id: u32,
    pub local: SocketAddrV4,
}

impl DataLogin {
    pub fn new(client_id: u32, local: SocketAddr) -> Result<Self> {
        match local {
            SocketAddr::V4(local) => Ok(Self { client_id, local }),
            SocketAddr::V6(v6) => Err(VdrError::InvalidAddress(format!(
                "data login needs an IPv4 control socket, got {v6}"
            ))),
        }
    }
}

impl fmt::Display for DataLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self.local.ip();
        write!(
            f,
            "DATA {} 0x{:08x}:{} {}",
            self.client_id,
            u32::from(*ip),
            self.local.port(),
            ip
        )
    }
}

// ── ServerLine ───────────────────────────────────────────────────

/// A text line from the server, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// `DISCARD <position> <frame-position>`
    Discard { position: u64, frame_position: u64 },
    /// `TRICKSPEED <mode>`
    TrickSpeed(i32),
    /// A known command whose arguments did not parse.
    Malformed(&'static str),
    Empty,
    Other,
}

impl ServerLine {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("DISCARD") => {
                let mut next = || parts.next().and_then(|p| p.parse::<u64>().ok());
                match (next(), next()) {
                    (Some(position), Some(frame_position)) => Self::Discard {
                        position,
                        frame_position,
                    },
                    _ => Self::Malformed("DISCARD"),
                }
            }
            Some("TRICKSPEED") => match parts.next().and_then(|p| p.parse().ok()) {
                Some(mode) => Self::TrickSpeed(mode),
                None => Self::Malformed("TRICKSPEED"),
            },
            Some(_) => Self::Other,
            None => Self::Empty,
        }
    }
}

// ── ControlContext ───────────────────────────────────────────────

/// Collaborators the control loop drives.
pub struct ControlContext {
    pub pipeline: PipelineHandle,
    /// `None` when no OSD display is configured; OSD commands are then
    /// parsed and dropped.
    pub osd: Option<OsdCompositor>,
    /// Key names to send to the server.
    pub keys: Option<mpsc::Receiver<String>>,
    /// Stops the loop from outside without dropping the connection state.
    pub cancel: CancellationToken,
}

// ── ControlChannel ───────────────────────────────────────────────

/// A control connection over any byte stream.
#[derive(Debug)]
pub struct ControlChannel<S> {
    framed: Framed<S, ControlCodec>,
    phase: ControlPhase,
    config: ControlConfig,
}

impl ControlChannel<TcpStream> {
    /// Connect and perform the handshake within `timeout`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
        config: ControlConfig,
    ) -> Result<(Self, DataLogin)> {
        tokio::time::timeout(timeout, async {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            let local = stream.local_addr()?;
            Self::handshake(stream, local, config).await
        })
        .await
        .map_err(|_| VdrError::Timeout(timeout))?
    }
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send `CONTROL`, check the banner and read the client id.
    ///
    /// `local` is the address the data login advertises.
    pub async fn handshake(
        stream: S,
        local: SocketAddr,
        config: ControlConfig,
    ) -> Result<(Self, DataLogin)> {
        let mut channel = Self {
            framed: Framed::new(stream, ControlCodec::new()),
            phase: ControlPhase::Connecting,
            config,
        };

        channel.framed.send(ControlRequest::Hello).await?;
        channel.phase.hello_sent()?;

        let banner = channel.next_line().await?;
        if !banner.starts_with(BANNER_PREFIX) {
            return Err(VdrError::HandshakeRejected(format!(
                "unexpected banner {banner:?}"
            )));
        }
        debug!("control: banner {banner:?}");

        let id_line = channel.next_line().await?;
        let client_id = parse_client_id(&id_line)?;
        channel.phase.logged_in(client_id)?;

        let login = DataLogin::new(client_id, local)?;
        info!("control: logged in as client {client_id}");
        Ok((channel, login))
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    /// Send the configured announcement lines and enter `Streaming`.
    pub async fn announce(&mut self) -> Result<()> {
        self.phase.start_streaming()?;
        for line in self.config.announcements.clone() {
            debug!("control: > {line}");
            self.framed.feed(ControlRequest::Line(line)).await?;
        }
        self.framed.flush().await
    }

    /// Send one `KEY` line.
    pub async fn send_key(&mut self, name: &str) -> Result<()> {
        debug!("control: key {name}");
        self.framed
            .send(ControlRequest::key(self.config.keymap.as_str(), name))
            .await
    }

    /// Process server traffic until the connection ends or `ctx.cancel`
    /// fires.
    ///
    /// Returns `Ok(())` when cancelled, [`VdrError::ChannelClosed`] when the
    /// server closes the connection, otherwise the decode or collaborator
    /// failure that stopped the loop. The OSD is shut down on every exit.
    pub async fn run(&mut self, ctx: ControlContext) -> Result<()> {
        let ControlContext {
            pipeline,
            mut osd,
            keys,
            cancel,
        } = ctx;

        let result = if self.phase.is_streaming() {
            self.dispatch(&pipeline, &mut osd, keys, &cancel).await
        } else {
            Err(VdrError::ProtocolViolation(
                "control loop started before announcing",
            ))
        };
        if let Some(compositor) = osd.as_mut() {
            compositor.shutdown();
        }
        result
    }

    async fn dispatch(
        &mut self,
        pipeline: &PipelineHandle,
        osd: &mut Option<OsdCompositor>,
        mut keys: Option<mpsc::Receiver<String>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("control: cancelled");
                    return Ok(());
                }

                frame = self.framed.next() => match frame {
                    Some(Ok(ControlFrame::Line(line))) => self.handle_line(&line, pipeline)?,
                    Some(Ok(ControlFrame::Osd(cmd))) => match osd.as_mut() {
                        Some(compositor) => compositor.apply(&cmd)?,
                        None => trace!("control: {} dropped, no OSD display", cmd.id()),
                    },
                    Some(Err(e)) => return Err(e),
                    None => {
                        info!("control: connection closed by server");
                        return Err(VdrError::ChannelClosed);
                    }
                },

                key = next_key(&mut keys), if keys.is_some() => match key {
                    Some(name) => self.send_key(&name).await?,
                    None => {
                        debug!("control: key source closed");
                        keys = None;
                    }
                },
            }
        }
    }

    fn handle_line(&self, line: &str, pipeline: &PipelineHandle) -> Result<()> {
        match ServerLine::parse(line) {
            ServerLine::Discard {
                position,
                frame_position,
            } => {
                debug!("control: DISCARD {position} (frame {frame_position})");
                pipeline.discard_until(position)
            }
            ServerLine::TrickSpeed(mode) => {
                debug!("control: TRICKSPEED {mode}");
                pipeline.trick_speed(mode)
            }
            ServerLine::Malformed(command) => {
                warn!("control: malformed {command} line {line:?}");
                Ok(())
            }
            ServerLine::Empty => Ok(()),
            ServerLine::Other => {
                warn!("control: unhandled line {line:?}");
                Ok(())
            }
        }
    }

    async fn next_line(&mut self) -> Result<String> {
        match self.framed.next().await {
            Some(Ok(ControlFrame::Line(line))) => Ok(line),
            Some(Ok(ControlFrame::Osd(_))) => Err(VdrError::ProtocolViolation(
                "OSD command during handshake",
            )),
            Some(Err(e)) => Err(e),
            None => Err(VdrError::ChannelClosed),
        }
    }
}

async fn next_key(keys: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match keys {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn parse_client_id(line: &str) -> Result<u32> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next().map(str::parse::<u32>)) {
        (Some("CLIENT-ID"), Some(Ok(id))) => Ok(id),
        _ => Err(VdrError::HandshakeRejected(format!(
            "expected CLIENT-ID line, got {line:?}"
        ))),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::osd::command::{OsdCommand, OsdCommandId, OsdHeader};
    use crate::osd::{OsdConfig, OsdSurface};
    use crate::pipeline::{PipelineConfig, PlaybackPipeline};
    use crate::player::{Player, PlayerCommand};
    use crate::render::Renderer;

    struct IdlePlayer;

    #[async_trait]
    impl Player for IdlePlayer {
        async fn start(&mut self) -> Result<()> {
            Ok(())
        }
        async fn write_payload(&mut self, _payload: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn send_control(&mut self, _command: PlayerCommand) -> Result<()> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Counts `clear` calls.
    struct ClearCounter(Arc<AtomicUsize>);

    impl Renderer for ClearCounter {
        fn render(&mut self, _surface: &OsdSurface) -> Result<()> {
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted_osd() -> (OsdCompositor, Arc<AtomicUsize>) {
        let clears = Arc::new(AtomicUsize::new(0));
        let osd = OsdCompositor::new(
            Box::new(ClearCounter(clears.clone())),
            OsdConfig::default(),
        );
        (osd, clears)
    }

    fn local() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::new(192, 168, 1, 20), 40000))
    }

    /// A logged-in, announced channel plus the server end of the stream.
    async fn streaming_channel() -> (ControlChannel<DuplexStream>, DuplexStream) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        server
            .write_all(b"VDR-1.7.27 READY\r\nCLIENT-ID 4\r\n")
            .await
            .unwrap();
        let (mut channel, _) = ControlChannel::handshake(client, local(), ControlConfig::default())
            .await
            .unwrap();
        channel.announce().await.unwrap();

        let expected = b"CONTROL\r\nINFO WINDOWS 1280x720\r\nINFO ARGBOSD RLE\r\nCONFIG\r\n";
        let mut sent = vec![0u8; expected.len()];
        server.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent[..], &expected[..]);
        (channel, server)
    }

    #[test]
    fn data_login_format() {
        let login = DataLogin::new(3, local()).unwrap();
        assert_eq!(
            login.to_string(),
            "DATA 3 0xc0a80114:40000 192.168.1.20"
        );
    }

    #[test]
    fn data_login_rejects_ipv6() {
        let v6: SocketAddr = "[::1]:4000".parse().unwrap();
        assert!(matches!(
            DataLogin::new(1, v6),
            Err(VdrError::InvalidAddress(_))
        ));
    }

    #[test]
    fn server_line_parsing() {
        assert_eq!(
            ServerLine::parse("DISCARD 1000 17"),
            ServerLine::Discard {
                position: 1000,
                frame_position: 17
            }
        );
        assert_eq!(ServerLine::parse("TRICKSPEED 0"), ServerLine::TrickSpeed(0));
        assert_eq!(ServerLine::parse("TRICKSPEED -2"), ServerLine::TrickSpeed(-2));
        assert_eq!(ServerLine::parse("DISCARD x"), ServerLine::Malformed("DISCARD"));
        assert_eq!(ServerLine::parse("TRICKSPEED"), ServerLine::Malformed("TRICKSPEED"));
        assert_eq!(ServerLine::parse("CLEAR"), ServerLine::Other);
        assert_eq!(ServerLine::parse("   "), ServerLine::Empty);
    }

    #[test]
    fn client_id_line() {
        assert_eq!(parse_client_id("CLIENT-ID 12").unwrap(), 12);
        assert!(parse_client_id("CLIENT-ID abc").is_err());
        assert!(parse_client_id("HELLO 1").is_err());
    }

    #[tokio::test]
    async fn handshake_with_mock_server() {
        let stream = tokio_test::io::Builder::new()
            .write(b"CONTROL\r\n")
            .read(b"VDR-1.7.27 READY\r\nCLIENT-ID 9\r\n")
            .build();
        let (channel, login) = ControlChannel::handshake(stream, local(), ControlConfig::default())
            .await
            .unwrap();
        assert_eq!(channel.phase(), ControlPhase::LoggedIn { client_id: 9 });
        assert_eq!(login.client_id, 9);
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_banner() {
        let stream = tokio_test::io::Builder::new()
            .write(b"CONTROL\r\n")
            .read(b"HTTP/1.1 400 Bad Request\r\n")
            .build();
        let err = ControlChannel::handshake(stream, local(), ControlConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VdrError::HandshakeRejected(_)));
    }

    #[tokio::test]
    async fn handshake_eof_is_channel_closed() {
        let stream = tokio_test::io::Builder::new()
            .write(b"CONTROL\r\n")
            .read(b"VDR READY\r\n")
            .build();
        let err = ControlChannel::handshake(stream, local(), ControlConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VdrError::ChannelClosed));
    }

    #[tokio::test]
    async fn run_requires_announcement() {
        let stream = tokio_test::io::Builder::new()
            .write(b"CONTROL\r\n")
            .read(b"VDR READY\r\nCLIENT-ID 1\r\n")
            .build();
        let (mut channel, _) = ControlChannel::handshake(stream, local(), ControlConfig::default())
            .await
            .unwrap();
        let pipeline = PlaybackPipeline::spawn(Box::new(IdlePlayer), PipelineConfig::default());
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: None,
            keys: None,
            cancel: CancellationToken::new(),
        };
        assert!(matches!(
            channel.run(ctx).await,
            Err(VdrError::ProtocolViolation(_))
        ));
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn forwards_keys_and_ends_on_close() {
        let (mut channel, mut server) = streaming_channel().await;
        let pipeline = PlaybackPipeline::spawn(Box::new(IdlePlayer), PipelineConfig::default());
        let (key_tx, key_rx) = mpsc::channel(4);
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: None,
            keys: Some(key_rx),
            cancel: CancellationToken::new(),
        };
        let run = tokio::spawn(async move { channel.run(ctx).await });

        key_tx.send("Up".into()).await.unwrap();
        key_tx.send("Return".into()).await.unwrap();
        drop(key_tx);

        let expected = b"KEY XKeySym Up\r\nKEY XKeySym Return\r\n";
        let mut sent = vec![0u8; expected.len()];
        server.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent[..], &expected[..]);

        server.write_all(b"SOMETHING ELSE\r\n").await.unwrap();
        drop(server);
        let result = run.await.unwrap();
        assert!(matches!(result, Err(VdrError::ChannelClosed)));
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn osd_commands_reach_the_compositor() {
        let (mut channel, mut server) = streaming_channel().await;
        let pipeline = PlaybackPipeline::spawn(Box::new(IdlePlayer), PipelineConfig::default());
        let (osd, clears) = counted_osd();
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: Some(osd),
            keys: None,
            cancel: CancellationToken::new(),
        };
        let run = tokio::spawn(async move { channel.run(ctx).await });

        let size = OsdHeader {
            w: 4,
            h: 4,
            ..OsdHeader::new(OsdCommandId::Size)
        };
        // window outside the 4x4 surface ends the loop
        let set = OsdHeader {
            x: 3,
            y: 0,
            w: 2,
            h: 1,
            ..OsdHeader::new(OsdCommandId::SetArgbRle)
        };
        let mut wire = b"OSDCMD\r\n".to_vec();
        wire.extend_from_slice(&OsdCommand::new(size, Vec::new(), Vec::new()).to_bytes());
        wire.extend_from_slice(b"OSDCMD\r\n");
        wire.extend_from_slice(&OsdCommand::new(set, Vec::new(), vec![0xFF, 0, 0, 0]).to_bytes());
        server.write_all(&wire).await.unwrap();

        let result = run.await.unwrap();
        assert!(matches!(result, Err(VdrError::MalformedRleStream(_))));
        assert_eq!(clears.load(Ordering::SeqCst), 1);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn server_close_clears_the_osd_once() {
        let (mut channel, mut server) = streaming_channel().await;
        let pipeline = PlaybackPipeline::spawn(Box::new(IdlePlayer), PipelineConfig::default());
        let (osd, clears) = counted_osd();
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: Some(osd),
            keys: None,
            cancel: CancellationToken::new(),
        };
        let run = tokio::spawn(async move { channel.run(ctx).await });

        let size = OsdHeader {
            w: 2,
            h: 2,
            ..OsdHeader::new(OsdCommandId::Size)
        };
        let mut wire = b"OSDCMD\r\n".to_vec();
        wire.extend_from_slice(&OsdCommand::new(size, Vec::new(), Vec::new()).to_bytes());
        server.write_all(&wire).await.unwrap();
        server.shutdown().await.unwrap();

        let result = run.await.unwrap();
        assert!(matches!(result, Err(VdrError::ChannelClosed)));
        assert_eq!(clears.load(Ordering::SeqCst), 1);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_ends_the_loop_cleanly() {
        let (mut channel, _server) = streaming_channel().await;
        let pipeline = PlaybackPipeline::spawn(Box::new(IdlePlayer), PipelineConfig::default());
        let (osd, clears) = counted_osd();
        let cancel = CancellationToken::new();
        let ctx = ControlContext {
            pipeline: pipeline.handle(),
            osd: Some(osd),
            keys: None,
            cancel: cancel.clone(),
        };
        let run = tokio::spawn(async move { channel.run(ctx).await });

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(clears.load(Ordering::SeqCst), 1);
        pipeline.shutdown().await.unwrap();
    }
}

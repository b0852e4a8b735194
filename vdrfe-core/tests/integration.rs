//! Integration tests: both channels against a fake server on localhost,
//! feeding a recording player through the pipeline.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use vdrfe_core::osd::{OsdCommand, OsdCommandId, OsdHeader, OsdSurface};
use vdrfe_core::{
    ControlChannel, ControlConfig, ControlContext, ControlPhase, DataChannel, DataLogin,
    FrameHeader, OsdCompositor, OsdConfig, PipelineConfig, PlaybackPipeline, Player,
    PlayerCommand, Renderer, Result, VdrError,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FRAME_LEN: usize = 1024 * 1024;

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a listener on an OS-assigned port.
async fn ephemeral_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[derive(Debug, Default)]
struct PlayerLog {
    starts: u32,
    writes: Vec<Vec<u8>>,
    commands: Vec<PlayerCommand>,
    stopped: bool,
}

#[derive(Clone, Default)]
struct RecordingPlayer(Arc<Mutex<PlayerLog>>);

#[async_trait]
impl Player for RecordingPlayer {
    async fn start(&mut self) -> Result<()> {
        self.0.lock().unwrap().starts += 1;
        Ok(())
    }

    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.0.lock().unwrap().writes.push(payload.to_vec());
        Ok(())
    }

    async fn send_control(&mut self, command: PlayerCommand) -> Result<()> {
        self.0.lock().unwrap().commands.push(command);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.0.lock().unwrap().stopped = true;
        Ok(())
    }
}

/// Records every rendered frame; a clear is recorded as an empty frame.
#[derive(Clone, Default)]
struct SnapshotRenderer(Arc<Mutex<Vec<Vec<u8>>>>);

impl Renderer for SnapshotRenderer {
    fn render(&mut self, surface: &OsdSurface) -> Result<()> {
        self.0.lock().unwrap().push(surface.to_rgba_bytes());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.0.lock().unwrap().push(Vec::new());
        Ok(())
    }
}

fn wire_frame(position: u64, stream_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = FrameHeader {
        position,
        length: payload.len() as u32,
        stream_id,
    }
    .encode()
    .to_vec();
    out.extend_from_slice(payload);
    out
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

/// Server side of both handshakes. Returns the control and data sockets
/// once the announcements have been read.
async fn serve_login(
    listener: &TcpListener,
    client_id: u32,
) -> (BufReader<TcpStream>, BufReader<TcpStream>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut control = BufReader::new(stream);
    assert_eq!(read_line(&mut control).await, "CONTROL");
    control
        .write_all(format!("VDR-1.7.27 READY\r\nCLIENT-ID {client_id}\r\n").as_bytes())
        .await
        .unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut data = BufReader::new(stream);
    let login = read_line(&mut data).await;
    assert!(
        login.starts_with(&format!("DATA {client_id} 0x7f000001:")),
        "unexpected login {login:?}"
    );
    assert!(login.ends_with(" 127.0.0.1"));
    data.write_all(b"DATA\r\n").await.unwrap();

    for expected in ["INFO WINDOWS 1280x720", "INFO ARGBOSD RLE", "CONFIG"] {
        assert_eq!(read_line(&mut control).await, expected);
    }
    (control, data)
}

/// Client side of both handshakes plus the announcements.
async fn client_login(addr: SocketAddr) -> (ControlChannel<TcpStream>, DataChannel<TcpStream>) {
    let (mut control, login) = ControlChannel::connect(addr, TIMEOUT, ControlConfig::default())
        .await
        .unwrap();
    let data = DataChannel::connect(addr, &login, TIMEOUT, MAX_FRAME_LEN)
        .await
        .unwrap();
    control.announce().await.unwrap();
    (control, data)
}

// ── Session lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn test_full_handshake() {
    let (listener, addr) = ephemeral_listener().await;
    let server = tokio::spawn(async move { serve_login(&listener, 5).await });

    let (control, data) = tokio::time::timeout(TIMEOUT, client_login(addr))
        .await
        .expect("timeout");
    assert_eq!(control.phase(), ControlPhase::Streaming { client_id: 5 });
    assert_eq!(data.received(), 0);
    server.await.unwrap();
}

#[tokio::test]
async fn test_discard_and_info_frames_end_to_end() {
    let (listener, addr) = ephemeral_listener().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut control, mut data) = serve_login(&listener, 1).await;
        control.write_all(b"DISCARD 1000 12\r\n").await.unwrap();
        control.shutdown().await.unwrap();

        // Frames go out only once the client has processed DISCARD.
        go_rx.await.unwrap();
        let mut frames = wire_frame(500, 7, &[0x05; 100]);
        frames.extend_from_slice(&wire_frame(1500, 7, &[0x15; 100]));
        frames.extend_from_slice(&wire_frame(1600, 255, b"BLANK"));
        data.write_all(&frames).await.unwrap();
        data.shutdown().await.unwrap();
    });

    let (mut control, mut data) = client_login(addr).await;
    let player = RecordingPlayer::default();
    let pipeline = PlaybackPipeline::spawn(Box::new(player.clone()), PipelineConfig::default());

    let ctx = ControlContext {
        pipeline: pipeline.handle(),
        osd: None,
        keys: None,
        cancel: CancellationToken::new(),
    };
    let result = tokio::time::timeout(TIMEOUT, control.run(ctx))
        .await
        .expect("timeout");
    assert!(matches!(result, Err(VdrError::ChannelClosed)));

    go_tx.send(()).unwrap();
    let result = tokio::time::timeout(TIMEOUT, data.run(pipeline.submitter()))
        .await
        .expect("timeout");
    assert!(matches!(result, Err(VdrError::ChannelClosed)));
    assert_eq!(data.received(), 3);

    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.info_frames, 1);

    let log = player.0.lock().unwrap();
    assert_eq!(log.starts, 1);
    assert_eq!(log.writes, vec![vec![0x15; 100]]);
    assert!(log.commands.is_empty());
    assert!(log.stopped);
    server.await.unwrap();
}

#[tokio::test]
async fn test_hundred_byte_frame_reaches_player() {
    let (listener, addr) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (_control, mut data) = serve_login(&listener, 2).await;
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x64, 0x07]);
        bytes.extend((0..100u8).collect::<Vec<_>>());
        data.write_all(&bytes).await.unwrap();
        data.shutdown().await.unwrap();
    });

    let (_control, mut data) = client_login(addr).await;
    let player = RecordingPlayer::default();
    let pipeline = PlaybackPipeline::spawn(Box::new(player.clone()), PipelineConfig::default());

    let result = tokio::time::timeout(TIMEOUT, data.run(pipeline.submitter()))
        .await
        .expect("timeout");
    assert!(matches!(result, Err(VdrError::ChannelClosed)));
    server.await.unwrap();

    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.bytes_forwarded, 100);

    let log = player.0.lock().unwrap();
    assert_eq!(log.starts, 1);
    assert_eq!(log.writes.len(), 1);
    assert_eq!(log.writes[0], (0..100u8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_osd_command_renders_over_control() {
    let (listener, addr) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut control, _data) = serve_login(&listener, 3).await;
        let size = OsdHeader {
            w: 2,
            h: 1,
            ..OsdHeader::new(OsdCommandId::Size)
        };
        let set = OsdHeader {
            x: 0,
            y: 0,
            w: 2,
            h: 1,
            ..OsdHeader::new(OsdCommandId::SetArgbRle)
        };
        let mut wire = b"OSDCMD\r\n".to_vec();
        wire.extend_from_slice(&OsdCommand::new(size, Vec::new(), Vec::new()).to_bytes());
        wire.extend_from_slice(b"OSDCMD\r\n");
        // one red pixel, then a transparent run of 1
        let rle = vec![0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01];
        wire.extend_from_slice(&OsdCommand::new(set, Vec::new(), rle).to_bytes());
        control.write_all(&wire).await.unwrap();
        control.shutdown().await.unwrap();
    });

    let (mut control, _data) = client_login(addr).await;
    let pipeline = PlaybackPipeline::spawn(
        Box::new(RecordingPlayer::default()),
        PipelineConfig::default(),
    );
    let renderer = SnapshotRenderer::default();
    let ctx = ControlContext {
        pipeline: pipeline.handle(),
        osd: Some(OsdCompositor::new(
            Box::new(renderer.clone()),
            OsdConfig::default(),
        )),
        keys: None,
        cancel: CancellationToken::new(),
    };
    let result = tokio::time::timeout(TIMEOUT, control.run(ctx))
        .await
        .expect("timeout");
    assert!(matches!(result, Err(VdrError::ChannelClosed)));
    server.await.unwrap();

    let frames = renderer.0.lock().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], vec![0xFF, 0x00, 0x00, 0xFF, 0, 0, 0, 0]);
    // the closed connection took the OSD off the display
    assert!(frames[1].is_empty());
    pipeline.shutdown().await.unwrap();
}

// ── Error scenarios ──────────────────────────────────────────────

#[tokio::test]
async fn test_truncated_header_then_close() {
    let (listener, addr) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (_control, mut data) = serve_login(&listener, 4).await;
        data.write_all(&[0u8; 6]).await.unwrap();
        data.shutdown().await.unwrap();
    });

    let (_control, mut data) = client_login(addr).await;
    let err = tokio::time::timeout(TIMEOUT, data.next_frame())
        .await
        .expect("timeout")
        .unwrap_err();
    assert!(matches!(err, VdrError::TruncatedHeader { got: 6 }));
    assert_eq!(data.received(), 0);
    server.await.unwrap();
}

#[tokio::test]
async fn test_wrong_banner_is_rejected() {
    let (listener, addr) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut hello = [0u8; 9];
        stream.read_exact(&mut hello).await.unwrap();
        assert_eq!(&hello, b"CONTROL\r\n");
        stream.write_all(b"SSH-2.0-OpenSSH\r\n").await.unwrap();
    });

    let err = ControlChannel::connect(addr, TIMEOUT, ControlConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::HandshakeRejected(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let (listener, addr) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(stream);
    });

    let timeout = Duration::from_millis(200);
    let err = ControlChannel::connect(addr, timeout, ControlConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VdrError::Timeout(t) if t == timeout));
    server.abort();
}

#[test]
fn test_data_login_is_printable() {
    let login = DataLogin::new(7, "10.0.0.2:4711".parse().unwrap()).unwrap();
    assert_eq!(login.to_string(), "DATA 7 0x0a000002:4711 10.0.0.2");
}

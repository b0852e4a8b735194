//! The data connection: login, then a stream of framed payloads handed to
//! the pipeline.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::channel::control::DataLogin;
use crate::codec::data::StreamFrameCodec;
use crate::error::{Result, VdrError};
use crate::frame::StreamFrame;
use crate::pipeline::FrameSubmitter;

/// The server's literal acknowledgement of a data login.
pub const DATA_ACK: &[u8; 6] = b"DATA\r\n";

/// A logged-in data connection over any byte stream.
#[derive(Debug)]
pub struct DataChannel<S> {
    frames: FramedRead<S, StreamFrameCodec>,
    received: u64,
}

impl DataChannel<TcpStream> {
    /// Connect and log in within `timeout`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        login: &DataLogin,
        timeout: Duration,
        max_frame_len: usize,
    ) -> Result<Self> {
        tokio::time::timeout(timeout, async {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Self::handshake(stream, login, max_frame_len).await
        })
        .await
        .map_err(|_| VdrError::Timeout(timeout))?
    }
}

impl<S> DataChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the login line and wait for the `DATA` acknowledgement.
    pub async fn handshake(mut stream: S, login: &DataLogin, max_frame_len: usize) -> Result<Self> {
        stream.write_all(format!("{login}\r\n").as_bytes()).await?;
        stream.flush().await?;

        let mut ack = [0u8; DATA_ACK.len()];
        match stream.read_exact(&mut ack).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(VdrError::ChannelClosed);
            }
            Err(e) => return Err(e.into()),
        }
        if &ack != DATA_ACK {
            return Err(VdrError::HandshakeRejected(format!(
                "expected DATA acknowledgement, got {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }

        info!("data: logged in as client {}", login.client_id);
        Ok(Self {
            frames: FramedRead::new(stream, StreamFrameCodec::with_max_frame_len(max_frame_len)),
            received: 0,
        })
    }

    /// Frames read so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Read the next frame; `Ok(None)` on a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<StreamFrame>> {
        match self.frames.next().await {
            Some(Ok(frame)) => {
                self.received += 1;
                Ok(Some(frame))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Feed every frame to the pipeline until the stream ends.
    ///
    /// A clean end of stream is reported as [`VdrError::ChannelClosed`],
    /// like any other reason the loop stops.
    pub async fn run(&mut self, submitter: FrameSubmitter) -> Result<()> {
        while let Some(frame) = self.next_frame().await? {
            submitter.submit(frame).await?;
        }
        debug!("data: stream ended after {} frames", self.received);
        Err(VdrError::ChannelClosed)
    }
}

// ── Tests ────────────────────────────────────────────────────────

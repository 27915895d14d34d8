//! Controller transport
//!
//! A `TransportSession` owns the single stream between the agent and its
//! controller and moves length-prefixed frames over it. Streams are obtained
//! through a `Connector`; `TcpConnector` is the production one.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use emage_proto::{status, FrameCodec, FrameError};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Connection to {0} timed out")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("Send cancelled by shutdown")]
    Cancelled,
}

impl TransportError {
    /// Status code reported for this error
    pub fn status(&self) -> i32 {
        match self {
            TransportError::Timeout(_) => status::TIMED_OUT,
            TransportError::NotConnected => status::NOT_CONNECTED,
            TransportError::Frame(FrameError::FrameTooLarge { .. }) => status::INVALID,
            _ => status::IO,
        }
    }
}

/// Longest wait for pending data to drain when closing
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens streams towards a controller.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a stream to `addr:port`.
    async fn connect(&self, addr: &str, port: u16) -> Result<Self::Stream, TransportError>;
}

/// TCP connector with a connect timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector giving up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str, port: u16) -> Result<TcpStream, TransportError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect((addr, port)))
            .await
            .map_err(|_| TransportError::Timeout(format!("{addr}:{port}")))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{addr}:{port}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Framed connection to the controller.
pub struct TransportSession<S> {
    framed: Option<Framed<S, FrameCodec>>,
    peer: String,
}

impl<S> TransportSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Connects through `connector` and wraps the resulting stream.
    pub async fn connect<C>(
        connector: &C,
        addr: &str,
        port: u16,
        max_frame_size: usize,
    ) -> Result<Self, TransportError>
    where
        C: Connector<Stream = S>,
    {
        let peer = format!("{addr}:{port}");
        info!("Connecting to controller at {}", peer);
        let stream = connector.connect(addr, port).await?;
        info!("Connected to controller at {}", peer);
        Ok(Self::from_stream(stream, peer, max_frame_size))
    }

    /// Wraps an already established stream.
    pub fn from_stream(stream: S, peer: impl Into<String>, max_frame_size: usize) -> Self {
        Self {
            framed: Some(Framed::new(stream, FrameCodec::new(max_frame_size))),
            peer: peer.into(),
        }
    }

    /// Returns true until `disconnect` is called.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Controller endpoint description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends one frame.
    pub async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let framed = self.framed.as_mut().ok_or(TransportError::NotConnected)?;
        framed.send(frame).await?;
        Ok(())
    }

    /// Waits for the next frame. `None` means the stream has ended.
    ///
    /// Cancel-safe: a partially received frame stays buffered.
    pub async fn recv_frame(&mut self) -> Option<Result<BytesMut, TransportError>> {
        let framed = self.framed.as_mut()?;
        framed.next().await.map(|frame| frame.map_err(TransportError::from))
    }

    /// Flushes and closes the stream. Idempotent.
    ///
    /// A peer that does not drain pending data within `CLOSE_TIMEOUT` gets
    /// the stream dropped instead.
    pub async fn disconnect(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            match timeout(CLOSE_TIMEOUT, SinkExt::<Bytes>::close(&mut framed)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error closing connection to {}: {}", self.peer, e),
                Err(_) => warn!("Controller at {} is not reading, dropping connection", self.peer),
            }
            info!("Disconnected from controller at {}", self.peer);
        }
    }
}

//! Mock controller for integration testing
//!
//! Listens on an ephemeral local port, accepts agent connections and lets
//! tests exchange protocol messages with the agent.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use emage_common::EnbId;
use emage_proto::{codec, DecodeError, EmageMessage, FrameCodec, FrameError, MessageBody};

use crate::test_utils::DEFAULT_TEST_TIMEOUT;

/// Mock controller errors
#[derive(Debug, Error)]
pub enum MockControllerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Agent closed the connection")]
    Closed,
    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

type Result<T> = std::result::Result<T, MockControllerError>;

/// Mock controller listening on `127.0.0.1`
pub struct MockController {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockController {
    /// Binds to an ephemeral port
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tracing::info!("Mock controller listening on {}", addr);
        Ok(Self { listener, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Waits for the next agent connection
    pub async fn accept(&self) -> Result<MockConnection> {
        let (stream, peer) = timeout(DEFAULT_TEST_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| MockControllerError::Timeout("agent connection"))??;
        tracing::info!("Mock controller accepted agent from {}", peer);
        Ok(MockConnection {
            framed: Framed::new(stream, FrameCodec::default()),
            enb_id: 0,
            next_seq: 1,
        })
    }
}

/// One agent connection as seen by the controller
pub struct MockConnection {
    framed: Framed<TcpStream, FrameCodec>,
    enb_id: EnbId,
    next_seq: u32,
}

impl MockConnection {
    /// eNB id learned from the agent's `Hello`
    pub fn enb_id(&self) -> EnbId {
        self.enb_id
    }

    /// Receives the agent's `Hello` and remembers its eNB id
    pub async fn expect_hello(&mut self) -> Result<EmageMessage> {
        let msg = self.recv().await?;
        if msg.body != MessageBody::Hello {
            return Err(MockControllerError::Unexpected(format!("{:?}", msg.body)));
        }
        self.enb_id = msg.enb_id;
        Ok(msg)
    }

    /// Sends a request addressed to the agent and returns its sequence number
    pub async fn request(&mut self, body: MessageBody) -> Result<u32> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.send_message(EmageMessage::new(self.enb_id, seq, body)).await?;
        Ok(seq)
    }

    /// Sends a request and waits for the reply carrying the same sequence number
    pub async fn roundtrip(&mut self, body: MessageBody) -> Result<MessageBody> {
        let seq = self.request(body).await?;
        let reply = self.recv().await?;
        if reply.seq != seq {
            return Err(MockControllerError::Unexpected(format!(
                "reply seq {} for request seq {}",
                reply.seq, seq
            )));
        }
        Ok(reply.body)
    }

    pub async fn send_message(&mut self, msg: EmageMessage) -> Result<()> {
        self.framed.send(codec::encode(&msg)).await?;
        Ok(())
    }

    /// Sends an arbitrary frame payload
    pub async fn send_raw(&mut self, payload: Bytes) -> Result<()> {
        self.framed.send(payload).await?;
        Ok(())
    }

    /// Receives and decodes the next message
    pub async fn recv(&mut self) -> Result<EmageMessage> {
        let frame = timeout(DEFAULT_TEST_TIMEOUT, self.framed.next())
            .await
            .map_err(|_| MockControllerError::Timeout("agent message"))?
            .ok_or(MockControllerError::Closed)??;
        Ok(codec::decode(&frame)?)
    }

    /// Returns true if nothing arrives within `wait`
    pub async fn is_silent(&mut self, wait: Duration) -> bool {
        timeout(wait, self.framed.next()).await.is_err()
    }

    /// Waits until the agent closes its side
    pub async fn expect_closed(&mut self) -> Result<()> {
        loop {
            match timeout(DEFAULT_TEST_TIMEOUT, self.framed.next()).await {
                Err(_) => return Err(MockControllerError::Timeout("connection close")),
                Ok(None) | Ok(Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(frame))) => {
                    tracing::debug!("Ignoring {} byte frame while waiting for close", frame.len());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let ctrl = MockController::bind().await.unwrap();
        assert_ne!(ctrl.port(), 0);
        assert!(ctrl.addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_accept_and_exchange() {
        let ctrl = MockController::bind().await.unwrap();
        let addr = ctrl.addr();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::default());
            let hello = EmageMessage::new(3, 1, MessageBody::Hello);
            framed.send(codec::encode(&hello)).await.unwrap();
            framed
        });

        let mut conn = ctrl.accept().await.unwrap();
        conn.expect_hello().await.unwrap();
        assert_eq!(conn.enb_id(), 3);

        drop(client.await.unwrap());
        conn.expect_closed().await.unwrap();
    }
}

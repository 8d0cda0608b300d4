//! WebSocket transport using `tokio-tungstenite`.
//!
//! An accepted socket is split in two. The [`ConnectionReader`] stays
//! with the connection task and is polled inside its `select!` loop; the
//! [`ConnectionWriter`] queues outgoing frames for a small writer task,
//! so pushing a match update never waits on a pending read.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Errors raised by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer or the writer task went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tungstenite::Error),

    /// Binding or accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The TCP connection came in but the WebSocket upgrade didn't.
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailed(#[source] tungstenite::Error),
}

/// Identifies one accepted connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Accepts WebSocket connections on a TCP port.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds to `addr`. Port 0 picks a free one; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next client and completes the WebSocket upgrade.
    pub async fn accept(&self) -> Result<WebSocketConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(TransportError::UpgradeFailed)?;

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        Ok(WebSocketConnection::new(id, ws))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One accepted WebSocket, ready to be split.
pub struct WebSocketConnection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(id, sink, queue));

        Self {
            reader: ConnectionReader { id, stream },
            writer: ConnectionWriter { id, outbound },
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.reader.id
    }

    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

/// Receiving half of a connection.
pub struct ConnectionReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl ConnectionReader {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next data frame. `Ok(None)` once the peer closes. Binary and text
    /// frames are both accepted; control frames are skipped. Cancel-safe.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
    }
}

/// Sending half of a connection. Cheap to clone; every clone feeds the
/// same writer task, so frames go out in the order they were queued.
#[derive(Clone)]
pub struct ConnectionWriter {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ConnectionWriter {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `data` as a binary frame.
    pub fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(Message::Binary(data.into()))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    /// Queues a close frame. Anything queued after it is discarded.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

/// Drains the queue into the socket until a close frame goes out, the
/// peer fails, or every writer handle is dropped.
async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut queue: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = queue.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            tracing::debug!(%id, error = %e, "send failed, stopping writer");
            return;
        }
        if closing {
            return;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ConnectionClosed("conn-3".into());
        assert_eq!(err.to_string(), "connection closed: conn-3");
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(transport.local_addr().unwrap().port(), 0);
    }
}

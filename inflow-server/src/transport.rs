//! Connection I/O for the websocket transport.
//!
//! [`spawn_io`] splits an accepted websocket into a read loop and a write
//! loop, each owning its half of the stream, and hands back a [`ConnIo`] of
//! plain channels. The protocol handler above this module never touches
//! websocket types beyond [`Frame`] — control frames, deadlines, and close
//! sequencing all live here.
//!
//! Deadlines are per operation: a read or write that makes no progress for
//! the configured duration fails that operation, which the read loop treats
//! as terminal.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

// ---

use inflow_domain::{InflowError, Result};

/// How long a terminal read error is kept on offer for a consumer that is
/// momentarily busy elsewhere. After that the reader gives up and exits.
const ERROR_OFFER_WINDOW: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One application-visible frame. Control frames never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

// ---

struct WriteCmd {
    msg: Message,
    ret: oneshot::Sender<Result<()>>,
}

// ---------------------------------------------------------------------------
// ConnIo
// ---------------------------------------------------------------------------

/// Channel-based handle on one live connection.
///
/// Dropping it closes the write queue, which makes the write loop close the
/// websocket; the read loop then observes the closed stream and exits too.
pub struct ConnIo {
    read_rx: mpsc::Receiver<Result<Frame>>,
    write_tx: mpsc::Sender<WriteCmd>,
}

// ---

impl ConnIo {
    // ---
    /// Next frame from the peer. After a terminal error, every subsequent
    /// call keeps failing.
    pub async fn recv(&mut self) -> Result<Frame> {
        match self.read_rx.recv().await {
            Some(result) => result,
            None => Err(InflowError::Transport("connection reader is gone".into())),
        }
    }

    // ---

    /// Write one message, waiting for the write loop's verdict.
    pub async fn send(&self, msg: Message) -> Result<()> {
        let (ret_tx, ret_rx) = oneshot::channel();
        self.write_tx
            .send(WriteCmd { msg, ret: ret_tx })
            .await
            .map_err(|_| InflowError::Transport("connection writer is gone".into()))?;
        ret_rx
            .await
            .map_err(|_| InflowError::Transport("connection writer dropped the reply".into()))?
    }

    // ---

    /// Best-effort close handshake. The actual stream teardown happens when
    /// the handle is dropped.
    pub async fn close(&self) {
        let _ = self.send(Message::Close(None)).await;
    }
}

// ---------------------------------------------------------------------------
// I/O loops
// ---------------------------------------------------------------------------

/// Spawn the read and write loops for an accepted websocket.
pub fn spawn_io(ws: WebSocketStream<TcpStream>, deadline: Duration) -> ConnIo {
    let (mut sink, mut stream) = ws.split();
    let (read_tx, read_rx) = mpsc::channel::<Result<Frame>>(8);
    let (write_tx, mut write_rx) = mpsc::channel::<WriteCmd>(8);

    // ---
    // Read loop: deliver frames until a terminal condition, then offer that
    // condition once and exit.
    tokio::spawn(async move {
        loop {
            let result = match tokio::time::timeout(deadline, stream.next()).await {
                Err(_) => Err(InflowError::Transport("read deadline exceeded".into())),
                Ok(None) => Err(InflowError::Transport("connection closed".into())),
                Ok(Some(Err(e))) => Err(InflowError::Transport(format!("websocket read: {e}"))),
                Ok(Some(Ok(msg))) => match msg {
                    Message::Text(text) => Ok(Frame::Text(text)),
                    Message::Binary(data) => Ok(Frame::Binary(data)),
                    Message::Close(_) => {
                        Err(InflowError::Transport("peer closed the connection".into()))
                    }
                    // Ping/pong are answered by the stream itself.
                    _ => continue,
                },
            };

            if result.is_err() {
                let _ = tokio::time::timeout(ERROR_OFFER_WINDOW, read_tx.send(result)).await;
                break;
            }
            if read_tx.send(result).await.is_err() {
                break;
            }
        }
        tracing::trace!("connection read loop exits");
    });

    // ---
    // Write loop: serialize writes, report each verdict, close the stream
    // once the command queue is gone.
    tokio::spawn(async move {
        while let Some(WriteCmd { msg, ret }) = write_rx.recv().await {
            let verdict = match tokio::time::timeout(deadline, sink.send(msg)).await {
                Err(_) => Err(InflowError::Transport("write deadline exceeded".into())),
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(InflowError::Transport(format!("websocket write: {e}"))),
            };
            let _ = ret.send(verdict);
        }
        let _ = sink.close().await;
        tracing::trace!("connection write loop exits");
    });

    ConnIo { read_rx, write_tx }
}

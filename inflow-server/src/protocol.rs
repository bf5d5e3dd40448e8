//! Connection handler: the chunked-transfer protocol over one websocket.
//!
//! Flow, in order: the client identifies its upload and declares (or
//! re-declares) the total size, the broker answers with transfer parameters
//! and a resume offset, the client acks, chunks stream in with one
//! [`WireMsg::ChunkAck`] per chunk, and once the cursor reaches the declared
//! size the handler kicks off the backend handover and reports the outcome
//! as [`WireMsg::AllDone`] or [`WireMsg::Error`].
//!
//! The handler never owns the session's fate: a dropped connection leaves
//! the session registered and resumable, and the idle-timeout supervisor is
//! what eventually reaps it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

// ---

use crate::broker::Broker;
use crate::session::UploadSession;
use crate::transport::{self, ConnIo, Frame};
use crate::wire::{self, WireMsg};
use inflow_domain::{InflowError, Result, UploadState};

/// Headroom over the advertised chunk size for envelope framing, so a
/// full-size chunk passes but nothing wildly larger does.
const FRAME_SLACK: usize = 4096;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Accept the websocket handshake on `stream` and run the upload protocol.
///
/// Inbound frames are capped at the advertised chunk size plus slack; a
/// client pushing bigger frames gets a terminal read error, not an ack.
pub async fn handle_connection(broker: Arc<Broker>, stream: TcpStream, peer: SocketAddr) {
    let limit = broker.config.chunk_size_kb as usize * 1024 + FRAME_SLACK;
    let ws_config = WebSocketConfig {
        max_message_size: Some(limit),
        max_frame_size: Some(limit),
        ..Default::default()
    };
    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, "websocket handshake failed: {e}");
            return;
        }
    };
    tracing::debug!(%peer, "upload connection accepted");

    let mut conn = transport::spawn_io(ws, broker.config.socket_timeout());
    if let Err(e) = run(&broker, &mut conn, peer).await {
        tracing::warn!(%peer, "connection handler: {e}");
    }
}

// ---

/// Greet, bind, drive, unbind.
async fn run(broker: &Broker, conn: &mut ConnIo, peer: SocketAddr) -> Result<()> {
    let (id, total_length) = match recv_msg(conn).await {
        Ok(WireMsg::UploadRequest { id, total_length }) => (id, total_length),
        Ok(_) => {
            fail(conn, "expected an upload request").await;
            conn.close().await;
            return Ok(());
        }
        Err(e) => {
            fail(conn, "couldn't read the upload request").await;
            conn.close().await;
            return Err(e);
        }
    };

    let Some(session) = broker.registry.get(&id) else {
        tracing::info!(%peer, %id, "upload request for unknown id");
        fail(conn, "unknown upload id - maybe the upload timed out?").await;
        conn.close().await;
        return Ok(());
    };

    if session.bind_handler().await.is_err() {
        fail(conn, "another connection already deals with this upload").await;
        conn.close().await;
        return Ok(());
    }
    tracing::info!(%peer, %id, total_length, "upload connection bound");

    let result = drive(broker, conn, &session, total_length).await;
    let _ = session.unbind_handler().await;
    result
}

// ---------------------------------------------------------------------------
// Protocol phases
// ---------------------------------------------------------------------------

async fn drive(
    broker: &Broker,
    conn: &mut ConnIo,
    session: &Arc<UploadSession>,
    total_length: u64,
) -> Result<()> {
    // Size declaration: fresh sessions take the client's word, resumed ones
    // hold it to its earlier word.
    if session.state() == UploadState::Init {
        if session.declare_size(total_length).await.is_err() {
            fail(conn, "file size rejected").await;
            conn.close().await;
            return Ok(());
        }
    } else if total_length != session.declared_size().await {
        fail(conn, "file size has changed between connections").await;
        conn.close().await;
        return Ok(());
    }

    if session.state() >= UploadState::Cancelled {
        fail(conn, "upload already finished or cancelled").await;
        conn.close().await;
        return Ok(());
    }

    // ---
    // Transfer parameters, then the client's go/no-go.
    let config = WireMsg::UploadConfig {
        chunk_size_kb: broker.config.chunk_size_kb,
        resume_from_offset: session.bytes_received().await,
        send_ahead_count: broker.config.send_ahead,
    };
    if let Err(e) = send_msg(conn, &config).await {
        tracing::debug!(id = %session.id(), "sending upload config: {e}");
        conn.close().await;
        return Ok(());
    }

    match recv_msg(conn).await {
        Ok(WireMsg::Ack { ack: true }) => {}
        Ok(WireMsg::Ack { ack: false }) => {
            fail(conn, "upload config not acknowledged").await;
            conn.close().await;
            return Ok(());
        }
        _ => {
            fail(conn, "expected an ack").await;
            conn.close().await;
            return Ok(());
        }
    }

    // ---
    // Chunk loop.
    while session.bytes_received().await != session.declared_size().await {
        let frame = match conn.recv().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(id = %session.id(), "receiving chunk: {e}");
                conn.close().await;
                return Ok(());
            }
        };

        match frame {
            Frame::Binary(chunk) => {
                if let Err(e) = consume(broker, conn, session, &chunk).await {
                    tracing::info!(id = %session.id(), "chunk refused: {e}");
                    return Ok(());
                }
            }
            Frame::Text(text) => {
                if !control(broker, conn, session, &text).await? {
                    return Ok(());
                }
            }
        }
    }

    // ---
    // Handover and verdict.
    let outcome = wait_for_handover(broker, conn, session).await;
    match outcome {
        Some(Ok(())) => {
            let _ = send_msg(conn, &WireMsg::AllDone { success: true }).await;
        }
        Some(Err(reason)) => {
            tracing::warn!(id = %session.id(), %reason, "handover did not finish");
            fail(conn, "couldn't hand the file over to the application").await;
        }
        // Connection died while waiting; the worker carries on without us.
        None => return Ok(()),
    }
    conn.close().await;
    let _ = session.clean_up().await;
    Ok(())
}

// ---

/// Feed one binary chunk to the session and ack it. An error here cancels
/// the upload (unless something else already did) and ends the connection.
async fn consume(
    broker: &Broker,
    conn: &ConnIo,
    session: &Arc<UploadSession>,
    chunk: &[u8],
) -> Result<()> {
    match session.consume_chunk(chunk).await {
        Ok(()) => {
            send_msg(
                conn,
                &WireMsg::ChunkAck {
                    size: chunk.len() as u64,
                },
            )
            .await
        }
        Err(e) => {
            let reason = format!("error while consuming a file chunk: {e}");
            fail(conn, &reason).await;
            conn.close().await;
            if session.state() != UploadState::Cancelled {
                let _ = session
                    .cancel(true, &reason, broker.config.handover_timeout())
                    .await;
                let _ = session.clean_up().await;
            }
            Err(e)
        }
    }
}

// ---

/// Handle a text message inside the chunk loop. Returns `Ok(true)` to keep
/// looping, `Ok(false)` when the connection is done.
async fn control(
    broker: &Broker,
    conn: &ConnIo,
    session: &Arc<UploadSession>,
    text: &str,
) -> Result<bool> {
    let msg = match wire::decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            fail(conn, "did not understand that text message").await;
            conn.close().await;
            return Err(e);
        }
    };

    match msg {
        WireMsg::Pause { pause } => {
            tracing::debug!(id = %session.id(), pause, "pause toggled by client");
            let _ = session.pause().await;
            Ok(true)
        }
        WireMsg::Cancel { reason } => {
            tracing::info!(id = %session.id(), %reason, "cancelled by client");
            let _ = session
                .cancel(true, &reason, broker.config.handover_timeout())
                .await;
            let _ = session.clean_up().await;
            conn.close().await;
            Ok(false)
        }
        WireMsg::Error { msg, .. } => {
            let reason = format!("error from client: {msg}");
            let _ = session
                .cancel(true, &reason, broker.config.handover_timeout())
                .await;
            let _ = session.clean_up().await;
            conn.close().await;
            Ok(false)
        }
        other => {
            fail(conn, "unexpected message during the chunk phase").await;
            conn.close().await;
            Err(InflowError::Protocol(format!(
                "unexpected message during chunk phase: {other:?}"
            )))
        }
    }
}

// ---

/// Kick off the handover and wait for its outcome while keeping the
/// connection drained. `None` means the connection died first.
async fn wait_for_handover(
    broker: &Broker,
    conn: &mut ConnIo,
    session: &Arc<UploadSession>,
) -> Option<crate::session::HandoverOutcome> {
    let mut outcome_rx = session.hand_over(
        broker.config.handover_timeout(),
        broker.config.handover_confirm_timeout(),
    );

    loop {
        if let Some(outcome) = outcome_rx.borrow_and_update().clone() {
            return Some(outcome);
        }
        tokio::select! {
            changed = outcome_rx.changed() => {
                if changed.is_err() {
                    return Some(Err("handover worker vanished".into()));
                }
            }
            frame = conn.recv() => {
                if frame.is_err() {
                    tracing::debug!(id = %session.id(), "connection lost while handing over");
                    return None;
                }
                // Late frames during handover are drained and ignored.
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Small senders
// ---------------------------------------------------------------------------

async fn send_msg(conn: &ConnIo, msg: &WireMsg) -> Result<()> {
    conn.send(Message::Text(wire::encode(msg)?)).await
}

// ---

/// Best-effort error report to the client.
async fn fail(conn: &ConnIo, msg: &str) {
    let _ = send_msg(
        conn,
        &WireMsg::Error {
            code: None,
            msg: msg.to_string(),
        },
    )
    .await;
}

// ---

async fn recv_msg(conn: &mut ConnIo) -> Result<WireMsg> {
    match conn.recv().await? {
        Frame::Text(text) => wire::decode(&text),
        Frame::Binary(_) => Err(InflowError::Protocol(
            "expected a text message, got binary".into(),
        )),
    }
}

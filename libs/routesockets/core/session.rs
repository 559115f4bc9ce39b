//! Session driver shared by server and client connections
//!
//! One task per connection reads frames and raises events; a second task
//! (the writer, see `pipeline`) owns the write half. The reader task is the
//! only caller of `ConnectionEvents` for its connection, which keeps
//! callbacks of one connection strictly sequential.

use crate::core::config::SessionConfig;
use crate::core::connection::Connection;
use crate::core::heartbeat::{spawn_heartbeat, Heartbeat};
use crate::core::pipeline::{run_writer, Outbound};
use crate::traits::{ConnectionEvents, FrameSink, Message, SocketError};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, error, info, warn};

/// Close status when the peer's close frame carried no code
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close status when the transport ended without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

/// Why the read loop stopped
enum Ending {
    /// Close handshake observed, or the session was torn down deliberately
    Closed { code: u16, reason: String },
    /// Fault already reported through `on_error`
    Faulted { code: u16 },
}

/// Await `future`, failing with `Timeout(what)` once `limit` elapses
pub(crate) async fn with_deadline<F: Future>(
    limit: Option<Duration>,
    what: &str,
    future: F,
) -> Result<F::Output, SocketError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| SocketError::Timeout(what.to_string())),
        None => Ok(future.await),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drive one connection from `Open` to `Closed`
///
/// Must be called with a connection still in `Connecting`. Returns after
/// `on_close` was raised and the writer resolved every pending send.
pub(crate) async fn run_session<R, W, E>(
    connection: Connection,
    outbound: UnboundedReceiver<Outbound>,
    mut reader: R,
    writer: W,
    events: Arc<E>,
    config: SessionConfig,
) where
    R: Stream<Item = Result<Frame, WsError>> + Unpin + Send,
    W: FrameSink,
    E: ConnectionEvents + ?Sized,
{
    let (faults_tx, mut faults_rx) = unbounded_channel::<SocketError>();
    let mut writer_task = tokio::spawn(run_writer(
        outbound,
        writer,
        connection.clone(),
        faults_tx.clone(),
    ));

    connection.mark_open();
    info!(
        "Connection {} open on {}",
        connection.id(),
        connection.endpoint().unwrap_or(connection.path())
    );
    events.on_open(&connection);

    let heartbeat: Option<Heartbeat> = config.ping_interval().map(|interval| {
        spawn_heartbeat(
            interval,
            config.pong_timeout(),
            connection.clone(),
            faults_tx.clone(),
        )
    });
    drop(faults_tx);

    let idle_timeout = config.timeout_idle();
    let mut idle_deadline = idle_timeout.map(|d| Instant::now() + d);
    let mut close_deadline: Option<Instant> = None;
    let mut close_armed = false;
    let mut received_close: Option<(u16, String)> = None;

    let ending = loop {
        if !close_armed && !connection.is_open() {
            close_armed = true;
            idle_deadline = None;
            close_deadline = config.close_timeout().map(|d| Instant::now() + d);
        }

        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame @ (Frame::Text(_) | Frame::Binary(_)))) => {
                    if let Some(message) = Message::from_frame(frame) {
                        connection.metrics().increment_received(message.len());
                        if !close_armed {
                            idle_deadline = idle_timeout.map(|d| Instant::now() + d);
                        }
                        events.on_message(&connection, message);
                    }
                }
                Some(Ok(Frame::Ping(_))) => {
                    // Pong is queued by the codec and flushed on the next read or write
                    debug!("Ping from {}", connection.id());
                }
                Some(Ok(Frame::Pong(_))) => {
                    if let Some(heartbeat) = &heartbeat {
                        heartbeat.record_pong();
                    }
                }
                Some(Ok(Frame::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    debug!("Close frame from {}: {} {}", connection.id(), code, reason);
                    connection.mark_remote_closed();
                    received_close = Some((code, reason));
                }
                Some(Ok(Frame::Frame(_))) => {}
                Some(Err(e)) => {
                    if let Some((code, reason)) = received_close.take() {
                        debug!("Read error after close frame on {}: {}", connection.id(), e);
                        break Ending::Closed { code, reason };
                    }
                    break read_failure(&connection, events.as_ref(), e);
                }
                None => {
                    match received_close.take() {
                        Some((code, reason)) => break Ending::Closed { code, reason },
                        None => {
                            let error = SocketError::Transport(
                                "connection ended without close frame".to_string(),
                            );
                            warn!("Connection {}: {}", connection.id(), error);
                            events.on_error(&connection, &error);
                            break Ending::Faulted { code: CLOSE_ABNORMAL };
                        }
                    }
                }
            },

            Some(error) = faults_rx.recv() => {
                if let Some((code, reason)) = received_close.take() {
                    break Ending::Closed { code, reason };
                }
                error!("Connection {} fault: {}", connection.id(), error);
                events.on_error(&connection, &error);
                break Ending::Faulted { code: CLOSE_ABNORMAL };
            }

            _ = sleep_until(idle_deadline) => {
                info!("Connection {} idle, closing", connection.id());
                idle_deadline = None;
                let _ = connection.close(1000, "idle timeout");
            }

            _ = sleep_until(close_deadline) => {
                if let Some((code, reason)) = received_close.take() {
                    break Ending::Closed { code, reason };
                }
                let error = SocketError::Timeout("close handshake".to_string());
                warn!("Connection {}: {}", connection.id(), error);
                events.on_error(&connection, &error);
                break Ending::Faulted { code: CLOSE_ABNORMAL };
            }

            _ = connection.closing() => {}
        }
    };

    connection.mark_closed();
    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
    }

    connection.queue().control(Outbound::Shutdown);
    let writer_done = match config.close_timeout() {
        Some(limit) => tokio::time::timeout(limit, &mut writer_task).await.is_ok(),
        None => {
            let _ = (&mut writer_task).await;
            true
        }
    };
    if !writer_done {
        // Aborting drops the queued sends, which reports them as closed
        warn!("Connection {} writer did not finish, aborting", connection.id());
        writer_task.abort();
    }

    let (code, reason) = match ending {
        Ending::Closed { code, reason } => (code, reason),
        Ending::Faulted { code } => (code, String::new()),
    };
    info!("Connection {} closed with {}", connection.id(), code);
    events.on_close(&connection, code, &reason);
}

/// Map a read error to the fault it represents, raising `on_error`
fn read_failure<E>(connection: &Connection, events: &E, e: WsError) -> Ending
where
    E: ConnectionEvents + ?Sized,
{
    let violation_code = match &e {
        WsError::Capacity(_) => Some(CLOSE_MESSAGE_TOO_BIG),
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => None,
        WsError::Protocol(_) | WsError::Utf8 => Some(CLOSE_PROTOCOL_ERROR),
        _ => None,
    };
    let closed_cleanly = matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed);
    let error = SocketError::from(e);

    if closed_cleanly {
        let error = SocketError::Transport("connection ended without close frame".to_string());
        events.on_error(connection, &error);
        return Ending::Faulted { code: CLOSE_ABNORMAL };
    }

    match violation_code {
        Some(code) => {
            warn!("Connection {} protocol violation: {}", connection.id(), error);
            events.on_error(connection, &error);
            connection.force_close(code, "");
            Ending::Faulted { code }
        }
        None => {
            error!("Connection {} transport error: {}", connection.id(), error);
            events.on_error(connection, &error);
            Ending::Faulted { code: CLOSE_ABNORMAL }
        }
    }
}

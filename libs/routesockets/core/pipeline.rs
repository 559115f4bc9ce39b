//! Per-connection send pipeline
//!
//! ```text
//! send() ──> PendingSend ──> Unbounded Channel ──> Writer Task ──> FrameSink
//!                                                      │
//!                                                      └──> completion(Result)
//! ```
//!
//! The writer owns the write half of the transport and drains the queue
//! strictly in submission order, awaiting each write before taking the
//! next item. Every `PendingSend` resolves its completion exactly once:
//! either the writer completes it, or dropping it reports
//! `ConnectionClosed`.

use crate::core::connection::Connection;
use crate::traits::{FrameSink, Message, Result, SocketError};
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, warn};

/// Continuation invoked once with the outcome of a send
pub type Completion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A queued send whose completion has not fired yet
pub(crate) struct PendingSend {
    completion: Option<Completion>,
}

impl PendingSend {
    pub(crate) fn new(completion: Option<Completion>) -> Self {
        Self { completion }
    }

    /// Resolve the send, consuming it
    pub(crate) fn complete(mut self, result: Result<()>) {
        if let Some(completion) = self.completion.take() {
            invoke(completion, result);
        }
    }
}

impl Drop for PendingSend {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            invoke(completion, Err(SocketError::ConnectionClosed));
        }
    }
}

fn invoke(completion: Completion, result: Result<()>) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(move || completion(result))) {
        warn!("Send completion panicked: {}", panic_message(panic.as_ref()));
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A send failed before reaching the queue, waiting for its completion to run
struct Rejection {
    item: Option<(PendingSend, SocketError)>,
}

impl Rejection {
    fn new(pending: PendingSend, error: SocketError) -> Self {
        Self {
            item: Some((pending, error)),
        }
    }

    fn finish(mut self) {
        if let Some((pending, error)) = self.item.take() {
            pending.complete(Err(error));
        }
    }
}

impl Drop for Rejection {
    /// Dropped unpolled, e.g. spawned onto a runtime that already shut down
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            completion_worker(item);
        }
    }
}

static COMPLETION_WORKER: OnceLock<Option<Sender<(PendingSend, SocketError)>>> = OnceLock::new();

/// Hand a rejected send to the process-wide completion thread
///
/// Used only when no runtime can take the completion. The thread is started
/// once on first use.
fn completion_worker(item: (PendingSend, SocketError)) {
    let worker = COMPLETION_WORKER.get_or_init(|| {
        let (tx, rx) = crossbeam_channel::unbounded::<(PendingSend, SocketError)>();
        let spawned = std::thread::Builder::new()
            .name("routesockets-completions".to_string())
            .spawn(move || {
                for (pending, error) in rx {
                    pending.complete(Err(error));
                }
            });
        match spawned {
            Ok(_) => Some(tx),
            Err(e) => {
                warn!("Failed to start completion thread: {}", e);
                None
            }
        }
    });

    match worker {
        Some(tx) => {
            if let Err(rejected) = tx.send(item) {
                // Worker gone; the completion runs as the item drops
                warn!("Completion thread stopped, completing inline");
                drop(rejected);
            }
        }
        None => drop(item),
    }
}

/// Fail a send off the caller's stack
///
/// Runs on `runtime` when given and still alive, otherwise on the
/// completion thread.
pub(crate) fn reject_later(runtime: Option<&Handle>, pending: PendingSend, error: SocketError) {
    let rejection = Rejection::new(pending, error);
    match runtime {
        Some(runtime) => {
            runtime.spawn(async move { rejection.finish() });
        }
        None => drop(rejection),
    }
}

/// Work items consumed by the writer task
pub(crate) enum Outbound {
    Data { message: Message, pending: PendingSend },
    Ping(Vec<u8>),
    Close { code: u16, reason: String },
    Shutdown,
}

/// Producer side of a connection's outbound queue
#[derive(Clone)]
pub(crate) struct SendQueue {
    tx: UnboundedSender<Outbound>,
    runtime: Handle,
}

impl SendQueue {
    pub(crate) fn channel(runtime: Handle) -> (Self, UnboundedReceiver<Outbound>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx, runtime }, rx)
    }

    /// Append a data message; never blocks and never runs the completion inline
    pub(crate) fn submit(&self, message: Message, completion: Option<Completion>) {
        let item = Outbound::Data {
            message,
            pending: PendingSend::new(completion),
        };
        if let Err(rejected) = self.tx.send(item) {
            if let Outbound::Data { pending, .. } = rejected.0 {
                self.reject(pending, SocketError::ConnectionClosed);
            }
        }
    }

    /// Fail a send without queueing it, off the caller's stack
    pub(crate) fn reject(&self, pending: PendingSend, error: SocketError) {
        reject_later(Some(&self.runtime), pending, error);
    }

    /// Queue a control item, returns false once the writer is gone
    pub(crate) fn control(&self, item: Outbound) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Drain the outbound queue into the sink until `Shutdown`
///
/// A write error that is not a send rejection marks the transport broken:
/// it is reported once on `faults` and every later data item fails with
/// the same error.
pub(crate) async fn run_writer<W: FrameSink>(
    mut rx: UnboundedReceiver<Outbound>,
    mut sink: W,
    connection: Connection,
    faults: UnboundedSender<SocketError>,
) {
    let mut broken: Option<SocketError> = None;
    let mut close_sent = false;

    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Data { message, pending } => {
                if let Some(error) = &broken {
                    pending.complete(Err(error.clone()));
                    continue;
                }
                if close_sent || connection.remote_closed() {
                    pending.complete(Err(SocketError::ConnectionClosing));
                    continue;
                }

                let bytes = message.len();
                match sink.write_frame(message.into()).await {
                    Ok(()) => {
                        connection.metrics().increment_sent(bytes);
                        pending.complete(Ok(()));
                    }
                    Err(e) => {
                        let error = SocketError::from(e);
                        if error.is_send_rejected() {
                            pending.complete(Err(error));
                        } else {
                            debug!("Connection {} write failed: {}", connection.id(), error);
                            broken = Some(error.clone());
                            pending.complete(Err(error.clone()));
                            let _ = faults.send(error);
                        }
                    }
                }
            }
            Outbound::Ping(payload) => {
                if broken.is_some() || close_sent || connection.remote_closed() {
                    continue;
                }
                if let Err(e) = sink.write_frame(Frame::Ping(payload)).await {
                    let error = SocketError::from(e);
                    if !error.is_send_rejected() {
                        broken = Some(error.clone());
                        let _ = faults.send(error);
                    }
                }
            }
            Outbound::Close { code, reason } => {
                if broken.is_some() || close_sent {
                    continue;
                }
                close_sent = true;
                let frame = Frame::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                }));
                if let Err(e) = sink.write_frame(frame).await {
                    // Peer may have closed first, in which case the codec already answered
                    debug!("Connection {} close frame not sent: {}", connection.id(), e);
                }
            }
            Outbound::Shutdown => break,
        }
    }

    rx.close();
    while let Ok(item) = rx.try_recv() {
        if let Outbound::Data { pending, .. } = item {
            pending.complete(Err(SocketError::ConnectionClosed));
        }
    }
    sink.close().await;
    debug!("Connection {} writer exiting", connection.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionParts;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_dropped_pending_send_reports_closed() {
        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        let pending = PendingSend::new(Some(Box::new(move |result| {
            *slot.lock().unwrap() = Some(result);
        })));
        drop(pending);
        assert_eq!(
            *outcome.lock().unwrap(),
            Some(Err(SocketError::ConnectionClosed))
        );
    }

    #[test]
    fn test_completion_fires_once() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let pending = PendingSend::new(Some(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
        })));
        pending.complete(Ok(()));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_panicking_completion_is_contained() {
        let pending = PendingSend::new(Some(Box::new(|_| panic!("boom"))));
        pending.complete(Ok(()));
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new("static text");
        assert_eq!(panic_message(payload.as_ref()), "static text");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }

    #[test]
    fn test_send_after_runtime_shutdown_completes_off_stack() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (connection, _outbound) =
            Connection::new(ConnectionParts::new(runtime.handle().clone()));
        drop(runtime);

        let (tx, rx) = crossbeam_channel::bounded(1);
        connection.send_with("late", move |result| {
            let _ = tx.send((result, std::thread::current().id()));
        });

        let (result, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(SocketError::NotConnected));
        assert_ne!(thread, std::thread::current().id());
    }

    #[test]
    fn test_rejections_without_runtime_share_one_thread() {
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..5 {
            let tx = tx.clone();
            let pending = PendingSend::new(Some(Box::new(move |result| {
                let _ = tx.send((result, std::thread::current().id()));
            })));
            reject_later(None, pending, SocketError::NotConnected);
        }

        let outcomes: Vec<_> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert!(outcomes.iter().all(|(r, _)| *r == Err(SocketError::NotConnected)));
        assert!(outcomes.iter().all(|(_, id)| *id == outcomes[0].1));
        assert_ne!(outcomes[0].1, std::thread::current().id());
    }
}

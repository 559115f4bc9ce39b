//! Keep-alive pings for a single connection
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │
//! │                     │
//! │  Every interval:    │
//! │  1. Check tracker ──┼──> fault channel (no pong) ──> session driver
//! │  2. Queue ping ─────┼──> send queue ──> writer task ──> transport
//! └─────────────────────┘
//! ```
//!
//! Pongs are recorded by the session driver as it reads frames. The task
//! stops on the shutdown signal, on a fault, or once the writer is gone.

use crate::core::connection::Connection;
use crate::core::pipeline::Outbound;
use crate::traits::SocketError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Tracks whether the last ping was answered in time
#[derive(Debug)]
pub struct PongTracker {
    /// When the oldest unanswered ping was sent
    outstanding: Mutex<Option<Instant>>,
    timeout: Option<Duration>,
}

impl PongTracker {
    /// `None` never reports the connection unhealthy
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            outstanding: Mutex::new(None),
            timeout,
        }
    }

    pub fn record_ping_sent(&self) {
        let mut outstanding = self.outstanding.lock();
        if outstanding.is_none() {
            *outstanding = Some(Instant::now());
        }
    }

    pub fn record_pong_received(&self) {
        *self.outstanding.lock() = None;
    }

    /// Time since the oldest unanswered ping
    pub fn waiting_for(&self) -> Option<Duration> {
        self.outstanding.lock().map(|sent| sent.elapsed())
    }

    pub fn is_healthy(&self) -> bool {
        match (self.timeout, self.waiting_for()) {
            (Some(timeout), Some(waited)) => waited < timeout,
            _ => true,
        }
    }
}

/// Running heartbeat of one connection
pub(crate) struct Heartbeat {
    handle: tokio::task::JoinHandle<()>,
    shutdown_tx: Sender<()>,
    tracker: Arc<PongTracker>,
}

impl Heartbeat {
    pub(crate) fn record_pong(&self) {
        self.tracker.record_pong_received();
    }

    /// Signal the task and stop waiting for its next tick
    pub(crate) fn stop(self) {
        let _ = self.shutdown_tx.send(());
        self.handle.abort();
    }
}

async fn heartbeat_task(
    interval: Duration,
    connection: Connection,
    tracker: Arc<PongTracker>,
    faults: UnboundedSender<SocketError>,
    shutdown_rx: Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("Heartbeat for {} started with interval {:?}", connection.id(), interval);

    loop {
        ticker.tick().await;

        match shutdown_rx.try_recv() {
            Ok(_) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if !tracker.is_healthy() {
            let waited = tracker.waiting_for().unwrap_or_default();
            warn!("No pong from {} for {:?}", connection.id(), waited);
            let _ = faults.send(SocketError::Transport(format!(
                "no pong received for {:?}",
                waited
            )));
            break;
        }

        if !connection.queue().control(Outbound::Ping(Vec::new())) {
            break;
        }
        tracker.record_ping_sent();
    }

    debug!("Heartbeat for {} exiting", connection.id());
}

/// Spawn the ping ticker for an open connection
pub(crate) fn spawn_heartbeat(
    interval: Duration,
    pong_timeout: Option<Duration>,
    connection: Connection,
    faults: UnboundedSender<SocketError>,
) -> Heartbeat {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let tracker = Arc::new(PongTracker::new(pong_timeout));

    let handle = tokio::spawn(heartbeat_task(
        interval,
        connection,
        Arc::clone(&tracker),
        faults,
        shutdown_rx,
    ));

    Heartbeat {
        handle,
        shutdown_tx,
        tracker,
    }
}

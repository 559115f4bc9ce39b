//! Common test utilities for RouteSockets integration tests
//!
//! Servers bind 127.0.0.1 on a free port and run on the test's runtime.

#![allow(dead_code)]

use parking_lot::Mutex;
use routesockets::{Result, WebSocketClient, WebSocketServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Server on a loopback port picked by the OS
pub fn local_server() -> WebSocketServer {
    WebSocketServer::builder()
        .port(0)
        .address("127.0.0.1")
        .build()
        .unwrap()
}

/// Client for `path` on a running server
pub fn client_for(addr: SocketAddr, path: &str) -> WebSocketClient {
    WebSocketClient::builder()
        .uri(format!("{}{}", addr, path))
        .build()
        .unwrap()
}

/// A running server and its accept task
pub struct RunningServer {
    pub server: WebSocketServer,
    pub addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub async fn start(server: WebSocketServer) -> Self {
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };
        let addr = wait_for(|| server.local_addr()).await;
        verbose_println!("  Server listening on {}", addr);
        Self { server, addr, task }
    }

    pub fn client(&self, path: &str) -> WebSocketClient {
        client_for(self.addr, path)
    }

    /// Stop and wait for the accept loop to finish
    pub async fn stop(self) {
        self.server.stop();
        tokio::time::timeout(TEST_TIMEOUT, self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Poll `probe` until it yields a value or the test timeout passes
pub async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + TEST_TIMEOUT;
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drive a client until its connection ends
pub async fn run_client(client: &WebSocketClient) -> Result<()> {
    tokio::time::timeout(TEST_TIMEOUT, client.run())
        .await
        .expect("client did not finish in time")
}

/// Thread-safe event log shared with callbacks
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        let entry = entry.into();
        verbose_println!("  event: {}", entry);
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub async fn wait_for_count(&self, prefix: &str, count: usize) {
        wait_for(|| (self.count(prefix) >= count).then_some(())).await;
    }
}

//! # RouteSockets
//!
//! An endpoint-routing WebSocket server and a matching client built on
//! tokio-tungstenite.
//!
//! ## Features
//!
//! - **Regex endpoints**: the first pattern (in registration order) matching the whole request path wins
//! - **Ordered sends**: one FIFO writer per connection, completions never run on the caller's stack
//! - **Serialized callbacks**: `on_open`/`on_message`/`on_close`/`on_error` never overlap for one connection
//! - **Close handshake**: RFC 6455 close codes, idle and close timeouts, keep-alive pings
//! - **Type-state builders**: port and URI are required at compile time
//!
//! ## Example
//!
//! ```rust,ignore
//! use routesockets::{WebSocketClient, WebSocketServer};
//!
//! let server = WebSocketServer::builder().port(8080).threads(4).build()?;
//! server.endpoint("^/echo/?$")?.on_message(|server, connection, message| {
//!     server.send(connection, message);
//! });
//! std::thread::spawn(move || server.start());
//!
//! let client = WebSocketClient::builder().uri("localhost:8080/echo").build()?;
//! client
//!     .on_open(|client, connection| client.send(connection, "Hello"))
//!     .on_message(|client, connection, _message| {
//!         let _ = client.send_close(connection, 1000, "");
//!     });
//! client.start()?;
//! ```

pub mod client;
pub mod core;
pub mod server;
pub mod traits;

// Re-export all traits
pub use traits::*;

pub use client::{ClientHandle, WebSocketClient};
pub use core::{
    builder::{states, ClientBuilder, ServerBuilder},
    config::{ClientConfig, ConfigError, ServerConfig, SessionConfig, TlsConfig},
    connection::{Connection, ConnectionId},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    pipeline::Completion,
};
pub use server::{EndpointHandle, ServerEvent, ServerHandle, WebSocketServer};

//! Connection lifecycle shared by server and client
//!
//! ```text
//! reader ──> session driver ──> ConnectionEvents (one callback at a time)
//!                 │
//! send() ──> send queue ──> writer task ──> transport
//! ```
//!
//! - **connection**: identity, state and the public send/close surface
//! - **pipeline**: FIFO writer with completion continuations
//! - **session**: read loop, timers and close-code bookkeeping
//! - **dispatcher**: callback slots and the panic boundary
//! - **heartbeat**: keep-alive pings and pong tracking
//! - **config** / **builder**: serde configuration and type-state builders

pub mod builder;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod dispatcher;
pub mod heartbeat;
pub mod pipeline;
pub mod session;
pub mod tls;

// Re-export main types
pub use builder::{states, ClientBuilder, ServerBuilder};
pub use config::{ClientConfig, ConfigError, ServerConfig, SessionConfig, TlsConfig};
pub use connection::{validate_close, Connection, ConnectionId, MAX_CLOSE_REASON_BYTES};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use dispatcher::{HandlerSlots, Handlers};
pub use heartbeat::PongTracker;
pub use pipeline::Completion;

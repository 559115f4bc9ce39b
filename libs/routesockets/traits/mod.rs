//! # RouteSockets Traits
//!
//! Core traits and types shared by the server and the client:
//!
//! - **SocketError**: Error taxonomy for handshake, protocol, transport and send failures
//! - **Message**: Text or binary payload delivered to callbacks
//! - **ConnectionEvents**: Event surface between a running session and its callbacks
//! - **FrameSink**: Write half of a transport, driven by the send pipeline

pub mod error;
pub mod events;
pub mod message;
pub mod sink;

// Re-export commonly used types
pub use error::{Result, SocketError};
pub use events::ConnectionEvents;
pub use message::{Message, MessageKind};
pub use sink::{FrameSink, WsSink};

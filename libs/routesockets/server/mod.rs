//! Endpoint-routing WebSocket server
//!
//! Incoming upgrades are routed by request path against the endpoint table;
//! unmatched paths are rejected with 404 before any callback runs.

pub mod endpoint;
pub mod registry;
pub mod server;

pub use endpoint::{EndpointHandle, EndpointTable};
pub use registry::ConnectionRegistry;
pub use server::{ServerEvent, ServerHandle, WebSocketServer, CLOSE_GOING_AWAY};

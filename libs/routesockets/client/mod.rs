//! Single-connection WebSocket client

pub mod client;

pub use client::{ClientHandle, WebSocketClient};

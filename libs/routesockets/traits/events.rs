use crate::core::connection::Connection;
use crate::traits::error::SocketError;
use crate::traits::message::Message;

/// Events raised by a running session towards whoever owns its callbacks
///
/// The session driver calls these from the single task that reads the
/// connection, so calls for one connection never overlap. Different
/// connections call in parallel from the worker pool.
///
/// For every connection that was opened, `on_close` is called exactly
/// once and always last. `on_error` precedes it when the connection
/// ended because of a fault.
pub trait ConnectionEvents: Send + Sync + 'static {
    /// Handshake completed, the connection is `Open`
    fn on_open(&self, connection: &Connection);

    /// A complete text or binary message arrived
    fn on_message(&self, connection: &Connection, message: Message);

    /// The transport was released
    fn on_close(&self, connection: &Connection, code: u16, reason: &str);

    /// A fault occurred on the connection
    fn on_error(&self, connection: &Connection, error: &SocketError);
}

//! Callback slots and the dispatch boundary
//!
//! Handlers are stored per endpoint (or per client) and receive the owner
//! handle explicitly. A panicking `on_open` or `on_message` handler is
//! converted into an `on_error` call; panics in `on_error` and `on_close`
//! are logged and dropped.

use crate::core::connection::Connection;
use crate::core::pipeline::panic_message;
use crate::traits::{ConnectionEvents, Message, SocketError};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

pub type OpenHandler<O> = Arc<dyn Fn(&O, &Connection) + Send + Sync>;
pub type MessageHandler<O> = Arc<dyn Fn(&O, &Connection, Message) + Send + Sync>;
pub type CloseHandler<O> = Arc<dyn Fn(&O, &Connection, u16, &str) + Send + Sync>;
pub type ErrorHandler<O> = Arc<dyn Fn(&O, &Connection, &SocketError) + Send + Sync>;

/// The four optional callbacks; unset slots are no-ops
pub struct Handlers<O> {
    pub on_open: Option<OpenHandler<O>>,
    pub on_message: Option<MessageHandler<O>>,
    pub on_close: Option<CloseHandler<O>>,
    pub on_error: Option<ErrorHandler<O>>,
}

impl<O> Default for Handlers<O> {
    fn default() -> Self {
        Self {
            on_open: None,
            on_message: None,
            on_close: None,
            on_error: None,
        }
    }
}

impl<O> Clone for Handlers<O> {
    fn clone(&self) -> Self {
        Self {
            on_open: self.on_open.clone(),
            on_message: self.on_message.clone(),
            on_close: self.on_close.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Handlers that may be replaced while connections are live
pub struct HandlerSlots<O> {
    handlers: RwLock<Handlers<O>>,
}

impl<O> Default for HandlerSlots<O> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Handlers::default()),
        }
    }
}

impl<O> HandlerSlots<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_open<F>(&self, handler: F)
    where
        F: Fn(&O, &Connection) + Send + Sync + 'static,
    {
        self.handlers.write().on_open = Some(Arc::new(handler));
    }

    pub fn set_on_message<F>(&self, handler: F)
    where
        F: Fn(&O, &Connection, Message) + Send + Sync + 'static,
    {
        self.handlers.write().on_message = Some(Arc::new(handler));
    }

    pub fn set_on_close<F>(&self, handler: F)
    where
        F: Fn(&O, &Connection, u16, &str) + Send + Sync + 'static,
    {
        self.handlers.write().on_close = Some(Arc::new(handler));
    }

    pub fn set_on_error<F>(&self, handler: F)
    where
        F: Fn(&O, &Connection, &SocketError) + Send + Sync + 'static,
    {
        self.handlers.write().on_error = Some(Arc::new(handler));
    }

    /// Copy of the current handlers; the lock is not held while they run
    pub fn snapshot(&self) -> Handlers<O> {
        self.handlers.read().clone()
    }
}

/// `ConnectionEvents` that forwards to handler slots with an owner handle
pub struct Dispatcher<O> {
    owner: O,
    slots: Arc<HandlerSlots<O>>,
}

impl<O> Dispatcher<O>
where
    O: Send + Sync + 'static,
{
    pub fn new(owner: O, slots: Arc<HandlerSlots<O>>) -> Self {
        Self { owner, slots }
    }

    fn raise_panic(&self, connection: &Connection, callback: &str, panic: &(dyn std::any::Any + Send)) {
        let error = SocketError::CallbackPanicked(format!("{}: {}", callback, panic_message(panic)));
        error!("Connection {} {}", connection.id(), error);
        self.on_error(connection, &error);
    }
}

impl<O> ConnectionEvents for Dispatcher<O>
where
    O: Send + Sync + 'static,
{
    fn on_open(&self, connection: &Connection) {
        if let Some(handler) = self.slots.snapshot().on_open {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&self.owner, connection))) {
                self.raise_panic(connection, "on_open", panic.as_ref());
            }
        }
    }

    fn on_message(&self, connection: &Connection, message: Message) {
        if let Some(handler) = self.slots.snapshot().on_message {
            if let Err(panic) =
                catch_unwind(AssertUnwindSafe(|| handler(&self.owner, connection, message)))
            {
                self.raise_panic(connection, "on_message", panic.as_ref());
            }
        }
    }

    fn on_close(&self, connection: &Connection, code: u16, reason: &str) {
        if let Some(handler) = self.slots.snapshot().on_close {
            if let Err(panic) =
                catch_unwind(AssertUnwindSafe(|| handler(&self.owner, connection, code, reason)))
            {
                error!(
                    "Connection {} on_close panicked: {}",
                    connection.id(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn on_error(&self, connection: &Connection, error: &SocketError) {
        if let Some(handler) = self.slots.snapshot().on_error {
            if let Err(panic) =
                catch_unwind(AssertUnwindSafe(|| handler(&self.owner, connection, error)))
            {
                error!(
                    "Connection {} on_error panicked: {}",
                    connection.id(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

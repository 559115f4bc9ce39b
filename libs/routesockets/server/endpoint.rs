use crate::core::connection::Connection;
use crate::core::dispatcher::HandlerSlots;
use crate::server::server::ServerHandle;
use crate::traits::{Message, Result, SocketError};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// A route pattern and its callback slots
pub struct Endpoint {
    pattern: String,
    matcher: Regex,
    slots: Arc<HandlerSlots<ServerHandle>>,
}

impl Endpoint {
    fn new(pattern: &str) -> Result<Self> {
        // Anchor on both ends so the pattern must cover the whole path
        let matcher = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            slots: Arc::new(HandlerSlots::new()),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub(crate) fn slots(&self) -> Arc<HandlerSlots<ServerHandle>> {
        Arc::clone(&self.slots)
    }

    fn captures(&self, path: &str) -> Option<Vec<Option<String>>> {
        self.matcher.captures(path).map(|caps| {
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect()
        })
    }
}

/// Handle for attaching callbacks to a registered endpoint
///
/// ```ignore
/// let echo = server.endpoint("^/echo/?$")?;
/// echo.on_message(|server, connection, message| {
///     server.send(connection, message);
/// });
/// ```
#[derive(Clone)]
pub struct EndpointHandle {
    endpoint: Arc<Endpoint>,
}

impl EndpointHandle {
    pub fn pattern(&self) -> &str {
        self.endpoint.pattern()
    }

    pub fn on_open<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ServerHandle, &Connection) + Send + Sync + 'static,
    {
        self.endpoint.slots.set_on_open(handler);
        self
    }

    pub fn on_message<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ServerHandle, &Connection, Message) + Send + Sync + 'static,
    {
        self.endpoint.slots.set_on_message(handler);
        self
    }

    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ServerHandle, &Connection, u16, &str) + Send + Sync + 'static,
    {
        self.endpoint.slots.set_on_close(handler);
        self
    }

    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ServerHandle, &Connection, &SocketError) + Send + Sync + 'static,
    {
        self.endpoint.slots.set_on_error(handler);
        self
    }
}

/// Result of routing a request path
pub(crate) struct Route {
    pub endpoint: Arc<Endpoint>,
    pub captures: Vec<Option<String>>,
}

/// Endpoints in registration order
#[derive(Default)]
pub struct EndpointTable {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pattern`, or return the endpoint already registered for it
    pub fn register(&self, pattern: &str) -> Result<EndpointHandle> {
        let mut endpoints = self.endpoints.write();
        if let Some(existing) = endpoints.iter().find(|e| e.pattern == pattern) {
            return Ok(EndpointHandle {
                endpoint: Arc::clone(existing),
            });
        }

        let endpoint = Arc::new(Endpoint::new(pattern)?);
        endpoints.push(Arc::clone(&endpoint));
        debug!("Registered endpoint {}", pattern);
        Ok(EndpointHandle { endpoint })
    }

    /// First endpoint, in registration order, whose pattern matches the whole path
    pub(crate) fn route(&self, path: &str) -> Option<Route> {
        self.endpoints.read().iter().find_map(|endpoint| {
            endpoint.captures(path).map(|captures| Route {
                endpoint: Arc::clone(endpoint),
                captures,
            })
        })
    }

    pub fn patterns(&self) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .map(|e| e.pattern.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

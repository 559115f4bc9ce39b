use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a single connection
///
/// Transitions only move forward: `Connecting -> Open -> Closing -> Closed`,
/// with `Closed` reachable from any state when the transport fails.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Upgrade handshake in progress
    Connecting = 0,
    /// Handshake done, data may flow both ways
    Open = 1,
    /// A close frame was sent or received
    Closing = 2,
    /// Transport released
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lock-free holder for a [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `current` to `new`, returns false if another thread moved first
    #[inline]
    pub fn compare_exchange(&self, current: ConnectionState, new: ConnectionState) -> bool {
        self.state
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.get() == ConnectionState::Connecting
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.get() == ConnectionState::Closing
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.get() == ConnectionState::Closed
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Connecting)
    }
}

/// Per-connection message counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one data message written to the transport
    #[inline]
    pub fn increment_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one data message read from the transport
    #[inline]
    pub fn increment_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_exchange_only_moves_from_expected_state() {
        let state = AtomicConnectionState::new(ConnectionState::Open);
        assert!(!state.compare_exchange(ConnectionState::Connecting, ConnectionState::Open));
        assert!(state.compare_exchange(ConnectionState::Open, ConnectionState::Closing));
        assert!(state.is_closing());
        assert!(!state.compare_exchange(ConnectionState::Open, ConnectionState::Closing));
    }

    #[test]
    fn test_metrics_count_messages_and_bytes() {
        let metrics = AtomicMetrics::new();
        metrics.increment_sent(5);
        metrics.increment_sent(3);
        metrics.increment_received(10);
        assert_eq!(metrics.messages_sent(), 2);
        assert_eq!(metrics.bytes_sent(), 8);
        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.bytes_received(), 10);
    }
}

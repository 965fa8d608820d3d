use std::fmt;

use crate::net::errors::{NetworkError, NetworkEvent};
use crate::net::tcp::server::ServerContext;
use crate::stream::StreamHandle;

/// Identifier assigned to an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application callbacks of a [`TransportServer`](crate::net::tcp::TransportServer).
///
/// Every callback runs inside `tick()` and receives a [`ServerContext`] so it
/// can reply, disconnect or broadcast without holding the server itself.
pub trait ServerHandler: 'static {
    /// Lifecycle notifications. Fired alongside the dedicated callbacks below.
    fn on_event(&self, ctx: &ServerContext, event: NetworkEvent) {
        let _ = (ctx, event);
    }

    /// A peer was accepted and registered under `conn_id`.
    fn on_connect(&self, ctx: &ServerContext, conn_id: ConnectionId) {
        let _ = (ctx, conn_id);
    }

    /// Called when data is received
    fn on_data(&self, ctx: &ServerContext, conn_id: ConnectionId, data: &[u8]);

    /// The connection is gone and its identifier no longer resolves.
    fn on_disconnect(&self, ctx: &ServerContext, conn_id: ConnectionId) {
        let _ = (ctx, conn_id);
    }

    /// Called on errors. `conn_id` is `None` for listener-level failures.
    fn on_error(&self, ctx: &ServerContext, conn_id: Option<ConnectionId>, error: NetworkError) {
        let _ = (ctx, conn_id, error);
    }
}

/// Application callbacks of a [`TransportClient`](crate::net::tcp::TransportClient).
pub trait ClientHandler: 'static {
    fn on_connected(&self, stream: &StreamHandle) {
        let _ = stream;
    }

    fn on_data(&self, stream: &StreamHandle, data: &[u8]);

    /// Connect failures and I/O errors. The stream is disposed afterwards.
    fn on_error(&self, error: NetworkError) {
        let _ = error;
    }

    /// The outbound stream is fully closed; the client can connect again.
    fn on_disconnected(&self) {}
}

/// Log levels for network events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger trait for network events
///
/// Passed to every component through
/// [`TransportConfig::logger`](crate::net::tcp::TransportConfig::logger).
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default no-op logger that discards all messages
#[derive(Default, Clone)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Forwards to the `tracing` macros under the `loop_bridge` target.
#[derive(Default, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "loop_bridge", "{}", message),
            LogLevel::Info => tracing::info!(target: "loop_bridge", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "loop_bridge", "{}", message),
            LogLevel::Error => tracing::error!(target: "loop_bridge", "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_orders_and_displays() {
        let a = ConnectionId::new(2);
        let b = ConnectionId(10);
        assert!(a < b);
        assert_eq!(a.as_u64(), 2);
        assert_eq!(b.to_string(), "10");
    }

    #[test_log::test]
    fn tracing_logger_accepts_every_level() {
        let logger = TracingLogger;
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            logger.log(level, "probe");
        }
    }
}

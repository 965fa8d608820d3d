use std::sync::Arc;

use crate::net::tcp::traits::{Logger, TracingLogger};
use crate::reactor::{
    DEFAULT_EVENTS_CAPACITY, DEFAULT_MAX_READS_PER_EVENT, DEFAULT_MAX_TICKS, DEFAULT_READ_BUFFER_SIZE,
};

pub const DEFAULT_PORT: u16 = 7777;

/// Configuration shared by the transport client and server.
///
/// ## Pumping
///
/// - max_ticks_per_frame: upper bound of pump iterations per `tick()`
/// - events_capacity: readiness events collected per poll
/// - max_reads_per_event: reads (or accepts) serviced per socket per pump
///   iteration; the rest carries over to the next iteration
///
/// ## Socket Options
///
/// - no_delay: disables Nagle's algorithm (default on)
/// - simultaneous_accepts: drain every pending accept per readiness event instead
///   of one per pump iteration (default on)
#[derive(Clone)]
pub struct TransportConfig {
    /// Port the server binds on and the client connects to
    pub port: u16,
    pub max_ticks_per_frame: usize,
    pub events_capacity: usize,
    pub max_reads_per_event: usize,
    /// Size of the loop's read buffer
    pub read_buffer_size: usize,
    /// Enable TCP_NODELAY
    pub no_delay: bool,
    pub simultaneous_accepts: bool,
    /// Logger for network events
    pub logger: Arc<dyn Logger>,
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_ticks_per_frame: DEFAULT_MAX_TICKS,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            max_reads_per_event: DEFAULT_MAX_READS_PER_EVENT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            no_delay: true,
            simultaneous_accepts: true,
            logger: Arc::new(TracingLogger),
        }
    }
}

/// Builder for [`TransportConfig`]. Unset fields fall back to the defaults.
#[derive(Default)]
pub struct TransportConfigBuilder {
    port: Option<u16>,
    max_ticks_per_frame: Option<usize>,
    events_capacity: Option<usize>,
    max_reads_per_event: Option<usize>,
    read_buffer_size: Option<usize>,
    no_delay: Option<bool>,
    simultaneous_accepts: Option<bool>,
    logger: Option<Arc<dyn Logger>>,
}

impl TransportConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port 0 lets the server pick an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn max_ticks_per_frame(mut self, max: usize) -> Self {
        self.max_ticks_per_frame = Some(max);
        self
    }

    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = Some(capacity);
        self
    }

    pub fn max_reads_per_event(mut self, max: usize) -> Self {
        self.max_reads_per_event = Some(max);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    pub fn simultaneous_accepts(mut self, enabled: bool) -> Self {
        self.simultaneous_accepts = Some(enabled);
        self
    }

    /// Set the logger implementation
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> TransportConfig {
        let default = TransportConfig::default();
        TransportConfig {
            port: self.port.unwrap_or(default.port),
            max_ticks_per_frame: self
                .max_ticks_per_frame
                .unwrap_or(default.max_ticks_per_frame),
            events_capacity: self.events_capacity.unwrap_or(default.events_capacity),
            max_reads_per_event: self
                .max_reads_per_event
                .unwrap_or(default.max_reads_per_event),
            read_buffer_size: self.read_buffer_size.unwrap_or(default.read_buffer_size),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
            simultaneous_accepts: self
                .simultaneous_accepts
                .unwrap_or(default.simultaneous_accepts),
            logger: self.logger.unwrap_or(default.logger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tcp::traits::NoOpLogger;

    #[test]
    fn builder_falls_back_to_defaults() {
        let config = TransportConfig::builder().port(0).no_delay(false).build();
        assert_eq!(config.port, 0);
        assert!(!config.no_delay);
        assert_eq!(config.max_ticks_per_frame, 100);
        assert_eq!(config.max_reads_per_event, 32);
        assert!(config.simultaneous_accepts);
    }

    #[test]
    fn builder_overrides_everything() {
        let config = TransportConfigBuilder::new()
            .port(9000)
            .max_ticks_per_frame(5)
            .events_capacity(8)
            .max_reads_per_event(4)
            .read_buffer_size(512)
            .simultaneous_accepts(false)
            .logger(Arc::new(NoOpLogger))
            .build();
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_ticks_per_frame, 5);
        assert_eq!(config.events_capacity, 8);
        assert_eq!(config.max_reads_per_event, 4);
        assert_eq!(config.read_buffer_size, 512);
        assert!(!config.simultaneous_accepts);
    }
}

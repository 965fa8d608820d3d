use std::{
    cell::RefCell,
    net::{IpAddr, SocketAddr},
    rc::Rc,
    sync::Arc,
};

use crate::{
    error::{NetworkError, Result},
    handler::StreamHandler,
    net::tcp::{
        config::TransportConfig,
        traits::{ClientHandler, LogLevel, Logger},
    },
    reactor::EventLoop,
    stream::{StreamHandle, StreamPhase},
};

/// Where a [`TransportClient`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No event loop yet.
    Uninitialized,
    /// Loop created, no stream.
    Ready,
    Connecting,
    Active,
    /// Disconnect requested, waiting for the close to complete.
    Closing,
}

struct ClientShared<H: ClientHandler> {
    handler: H,
    stream: RefCell<Option<StreamHandle>>,
    logger: Arc<dyn Logger>,
}

impl<H: ClientHandler> ClientShared<H> {
    fn current(&self) -> Option<StreamHandle> {
        self.stream.borrow().clone()
    }
}

impl<H: ClientHandler> StreamHandler for ClientShared<H> {
    fn on_connect(&self, stream: &StreamHandle, result: Result<()>) {
        match result {
            Ok(()) => {
                self.logger.log(
                    LogLevel::Info,
                    &format!("Client connected to {:?}", stream.peer_addr()),
                );
                self.handler.on_connected(stream);
            }
            Err(e) => {
                self.logger
                    .log(LogLevel::Warn, &format!("Client connect failed: {}", e));
                stream.dispose();
                self.handler.on_error(e);
            }
        }
    }

    fn on_message(&self, stream: &StreamHandle, data: &[u8]) {
        self.handler.on_data(stream, data);
    }

    fn on_error(&self, _stream: &StreamHandle, error: NetworkError) {
        self.logger
            .log(LogLevel::Warn, &format!("Client read error: {}", error));
        self.handler.on_error(error);
    }

    fn on_closed(&self, stream: &StreamHandle) {
        {
            let mut slot = self.stream.borrow_mut();
            if slot.as_ref() == Some(stream) {
                *slot = None;
            }
        }
        self.logger.log(LogLevel::Info, "Client closed connection");
        self.handler.on_disconnected();
    }
}

/// Connecting side of the bridge: one event loop and at most one outbound
/// stream.
pub struct TransportClient<H: ClientHandler> {
    config: TransportConfig,
    event_loop: Option<EventLoop>,
    shared: Rc<ClientShared<H>>,
    logger: Arc<dyn Logger>,
    shut_down: bool,
}

impl<H: ClientHandler> TransportClient<H> {
    pub fn new(config: TransportConfig, handler: H) -> Self {
        let logger = config.logger.clone();
        Self {
            shared: Rc::new(ClientShared {
                handler,
                stream: RefCell::new(None),
                logger: logger.clone(),
            }),
            config,
            event_loop: None,
            logger,
            shut_down: false,
        }
    }

    /// Creates the event loop. Repeated calls are no-ops; a shut down client
    /// cannot be initialized again.
    pub fn init(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(NetworkError::EventLoopGone);
        }
        if self.event_loop.is_none() {
            self.event_loop = Some(EventLoop::new(&self.config)?);
        }
        Ok(())
    }

    /// Connects to `ip` on the configured port. `ip` must be a numeric IPv4 or
    /// IPv6 literal; host names are not resolved. No-op while a stream exists,
    /// including one that is still closing.
    pub fn connect(&mut self, ip: &str) -> Result<()> {
        let event_loop = self.event_loop.as_ref().ok_or(NetworkError::NotInitialized)?;
        if self.shared.current().is_some() {
            return Ok(());
        }

        let ip: IpAddr = ip.trim().parse()?;
        let addr = SocketAddr::new(ip, self.config.port);
        self.logger
            .log(LogLevel::Info, &format!("Client connecting to {}", addr));

        let handler: Rc<dyn StreamHandler> = self.shared.clone();
        let stream = event_loop.connect(addr, None, handler)?;
        *self.shared.stream.borrow_mut() = Some(stream);
        Ok(())
    }

    /// Queues `data` on the current stream. `false` when there is none or it
    /// is closing.
    pub fn send(&self, data: &[u8]) -> bool {
        if self.event_loop.is_none() {
            return false;
        }
        match self.shared.current() {
            Some(stream) => stream.send(data).is_ok(),
            None => false,
        }
    }

    /// Requests a close. The stream reference is cleared once the close
    /// completes on a later tick. No-op without a stream.
    pub fn disconnect(&self) {
        if let Some(stream) = self.shared.current() {
            stream.dispose();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .current()
            .map(|stream| stream.is_active())
            .unwrap_or(false)
    }

    pub fn state(&self) -> ClientState {
        if self.event_loop.is_none() {
            return ClientState::Uninitialized;
        }
        match self.shared.current().map(|stream| stream.phase()) {
            None => ClientState::Ready,
            Some(StreamPhase::Connecting) => ClientState::Connecting,
            Some(StreamPhase::Open | StreamPhase::Listening) => ClientState::Active,
            Some(StreamPhase::Closing | StreamPhase::Closed) => ClientState::Closing,
        }
    }

    /// The current outbound stream, if any.
    pub fn stream(&self) -> Option<StreamHandle> {
        self.shared.current()
    }

    /// Pumps the loop up to `max_ticks_per_frame` iterations. Ok(0) before `init`.
    pub fn tick(&mut self) -> Result<usize> {
        match self.event_loop.as_mut() {
            Some(event_loop) => event_loop.tick(self.config.max_ticks_per_frame),
            None => Ok(0),
        }
    }

    /// Closes the stream, delivers its close callback and destroys the loop.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.event_loop.is_none() {
            return;
        }
        self.disconnect();
        if let Err(e) = self.tick() {
            self.logger
                .log(LogLevel::Warn, &format!("Final tick failed: {}", e));
        }
        if let Some(mut event_loop) = self.event_loop.take() {
            event_loop.shutdown();
        }
        self.shared.stream.borrow_mut().take();
        self.shut_down = true;
        self.logger.log(LogLevel::Info, "TCP client shut down");
    }

    pub fn handler(&self) -> &H {
        &self.shared.handler
    }
}

impl<H: ClientHandler> Drop for TransportClient<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

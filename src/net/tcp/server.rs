use std::{
    cell::{Cell, RefCell},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
    sync::Arc,
};

use crate::{
    error::{NetworkError, Result},
    handler::{Acceptor, StreamHandler},
    net::errors::NetworkEvent,
    net::tcp::{
        config::TransportConfig,
        registry::ConnectionRegistry,
        traits::{ConnectionId, LogLevel, Logger, ServerHandler},
    },
    reactor::EventLoop,
    stream::{Incoming, StreamHandle},
};

/// The registry-facing half of the server, handed to every [`ServerHandler`]
/// callback. Unknown identifiers are not errors: operations just report failure.
#[derive(Clone)]
pub struct ServerContext {
    registry: Rc<RefCell<ConnectionRegistry>>,
    listening: Rc<Cell<bool>>,
}

impl ServerContext {
    fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(ConnectionRegistry::new())),
            listening: Rc::new(Cell::new(false)),
        }
    }

    fn resolve(&self, conn_id: ConnectionId) -> Option<StreamHandle> {
        if !self.listening.get() {
            return None;
        }
        let handle = self.registry.borrow().lookup(conn_id);
        handle
    }

    /// Queues `data` for `conn_id`. `false` if the server is stopped, the
    /// identifier is unknown, or the stream is already closing.
    pub fn send_to(&self, conn_id: ConnectionId, data: &[u8]) -> bool {
        match self.resolve(conn_id) {
            Some(handle) => handle.send(data).is_ok(),
            None => false,
        }
    }

    /// Requests an asynchronous close; the identifier stays registered until
    /// the close completes.
    pub fn disconnect(&self, conn_id: ConnectionId) -> bool {
        match self.resolve(conn_id) {
            Some(handle) => {
                handle.dispose();
                true
            }
            None => false,
        }
    }

    /// Remote IP of `conn_id`, or an empty string.
    pub fn address(&self, conn_id: ConnectionId) -> String {
        self.resolve(conn_id)
            .and_then(|handle| handle.peer_addr())
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    /// Sends `data` to every registered connection; returns how many accepted it.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        if !self.listening.get() {
            return 0;
        }
        let handles: Vec<StreamHandle> = {
            let registry = self.registry.borrow();
            registry
                .ids()
                .into_iter()
                .filter_map(|id| registry.lookup(id))
                .collect()
        };
        handles
            .iter()
            .filter(|handle| handle.send(data).is_ok())
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.borrow().ids()
    }
}

/// State reachable from the loop's callbacks.
struct ServerShared<H: ServerHandler> {
    handler: H,
    ctx: ServerContext,
    logger: Arc<dyn Logger>,
}

impl<H: ServerHandler> ServerShared<H> {
    fn forget(&self, conn_id: ConnectionId) -> bool {
        let removed = self.ctx.registry.borrow_mut().remove(conn_id);
        removed.is_some()
    }
}

impl<H: ServerHandler> StreamHandler for ServerShared<H> {
    fn on_message(&self, stream: &StreamHandle, data: &[u8]) {
        let Some(conn_id) = stream.connection_id() else {
            return;
        };
        let registered = self.ctx.registry.borrow().contains(conn_id);
        if registered {
            self.logger.log(
                LogLevel::Debug,
                &format!("Received {} bytes from connection {}", data.len(), conn_id),
            );
            self.handler.on_data(&self.ctx, conn_id, data);
        }
    }

    fn on_error(&self, stream: &StreamHandle, error: NetworkError) {
        let conn_id = stream.connection_id();
        self.logger.log(
            LogLevel::Warn,
            &format!("Connection {:?} error: {}", conn_id, error),
        );
        if let Some(conn_id) = conn_id {
            self.forget(conn_id);
        }
        self.handler.on_error(&self.ctx, conn_id, error);
    }

    fn on_closed(&self, stream: &StreamHandle) {
        let Some(conn_id) = stream.connection_id() else {
            return;
        };
        self.forget(conn_id);
        self.logger.log(
            LogLevel::Info,
            &format!("Closed connection {}", conn_id),
        );
        self.handler.on_disconnect(&self.ctx, conn_id);
        self.handler
            .on_event(&self.ctx, NetworkEvent::ConnectionClosed(conn_id));
    }
}

struct ListenerEvents<H: ServerHandler> {
    shared: Rc<ServerShared<H>>,
}

impl<H: ServerHandler> Acceptor for ListenerEvents<H> {
    fn on_accept(&self, incoming: Result<Incoming>) {
        let shared = &self.shared;
        let incoming = match incoming {
            Ok(incoming) => incoming,
            Err(e) => {
                shared
                    .logger
                    .log(LogLevel::Warn, &format!("Client connection failed: {}", e));
                shared.handler.on_error(&shared.ctx, None, e);
                return;
            }
        };

        let peer_addr = incoming.peer_addr();
        let stream_handler: Rc<dyn StreamHandler> = shared.clone();
        let accepted = shared
            .ctx
            .registry
            .borrow_mut()
            .accept(|conn_id| incoming.bind(Some(conn_id), stream_handler));

        match accepted {
            Ok(conn_id) => {
                shared.logger.log(
                    LogLevel::Info,
                    &format!("Client {} connected with connection id {}", peer_addr, conn_id),
                );
                shared.handler.on_connect(&shared.ctx, conn_id);
                shared.handler.on_event(
                    &shared.ctx,
                    NetworkEvent::ConnectionEstablished(conn_id, peer_addr),
                );
            }
            Err(e) => {
                shared.logger.log(
                    LogLevel::Warn,
                    &format!("Failed to register client {}: {}", peer_addr, e),
                );
                shared.handler.on_error(&shared.ctx, None, e);
            }
        }
    }

    fn on_closed(&self, _listener: &StreamHandle) {
        self.shared
            .logger
            .log(LogLevel::Debug, "Listener closed");
    }
}

/// Listening side of the bridge: one event loop, one listener and the
/// connection registry.
///
/// ```text
/// new ──> init ──> start_server ──> (tick)* ──> stop_server ──> ... ──> shutdown
/// ```
///
/// `tick()` must keep being called after `stop_server()` so the close
/// callbacks of the dropped connections are delivered.
pub struct TransportServer<H: ServerHandler> {
    config: TransportConfig,
    event_loop: Option<EventLoop>,
    listener: Option<StreamHandle>,
    shared: Rc<ServerShared<H>>,
    logger: Arc<dyn Logger>,
    shut_down: bool,
}

impl<H: ServerHandler> TransportServer<H> {
    pub fn new(config: TransportConfig, handler: H) -> Self {
        let logger = config.logger.clone();
        Self {
            shared: Rc::new(ServerShared {
                handler,
                ctx: ServerContext::new(),
                logger: logger.clone(),
            }),
            config,
            event_loop: None,
            listener: None,
            logger,
            shut_down: false,
        }
    }

    /// Creates the event loop. Repeated calls are no-ops; a shut down server
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

    /// Listens on `0.0.0.0:<port>`. No-op while already listening.
    pub fn start_server(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let event_loop = self.event_loop.as_ref().ok_or(NetworkError::NotInitialized)?;

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.config.port);
        self.logger
            .log(LogLevel::Info, &format!("Starting TCP server on {}", addr));
        let acceptor = Rc::new(ListenerEvents {
            shared: self.shared.clone(),
        });
        let listener = event_loop.listen(addr, acceptor)?;
        let bound = listener.local_addr().unwrap_or(addr);
        self.listener = Some(listener);
        self.shared.ctx.listening.set(true);

        self.logger
            .log(LogLevel::Info, &format!("TCP server listening on {}", bound));
        self.shared
            .handler
            .on_event(&self.shared.ctx, NetworkEvent::Listening(bound));
        Ok(())
    }

    /// Disposes the listener and every registered connection. The registry is
    /// empty when this returns; close callbacks follow on later ticks.
    pub fn stop_server(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        listener.dispose();
        self.shared.ctx.listening.set(false);

        let dropped = self.shared.ctx.registry.borrow_mut().drain();
        for (_, handle) in &dropped {
            handle.dispose();
        }
        self.logger.log(
            LogLevel::Info,
            &format!("TCP server stopped, dropped {} connections", dropped.len()),
        );
    }

    pub fn send(&self, conn_id: ConnectionId, data: &[u8]) -> bool {
        self.shared.ctx.send_to(conn_id, data)
    }

    pub fn disconnect(&self, conn_id: ConnectionId) -> bool {
        self.shared.ctx.disconnect(conn_id)
    }

    pub fn address(&self, conn_id: ConnectionId) -> String {
        self.shared.ctx.address(conn_id)
    }

    pub fn broadcast(&self, data: &[u8]) -> usize {
        self.shared.ctx.broadcast(data)
    }

    /// Pumps the loop up to `max_ticks_per_frame` iterations. Ok(0) before `init`.
    pub fn tick(&mut self) -> Result<usize> {
        match self.event_loop.as_mut() {
            Some(event_loop) => event_loop.tick(self.config.max_ticks_per_frame),
            None => Ok(0),
        }
    }

    /// Stops the server, delivers the resulting close callbacks and destroys
    /// the loop. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.event_loop.is_none() {
            return;
        }
        self.stop_server();
        if let Err(e) = self.tick() {
            self.logger
                .log(LogLevel::Warn, &format!("Final tick failed: {}", e));
        }
        if let Some(mut event_loop) = self.event_loop.take() {
            event_loop.shutdown();
        }
        self.shut_down = true;
        self.logger.log(LogLevel::Info, "TCP server shut down");
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|listener| listener.local_addr())
    }

    pub fn connection_count(&self) -> usize {
        self.shared.ctx.connection_count()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.ctx.connection_ids()
    }

    pub fn context(&self) -> &ServerContext {
        &self.shared.ctx
    }

    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl<H: ServerHandler> Drop for TransportServer<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tcp::traits::NoOpLogger;

    struct Silent;

    impl ServerHandler for Silent {
        fn on_data(&self, _ctx: &ServerContext, _conn_id: ConnectionId, _data: &[u8]) {}
    }

    fn config() -> TransportConfig {
        TransportConfig::builder()
            .port(0)
            .logger(Arc::new(NoOpLogger))
            .build()
    }

    #[test]
    fn start_requires_init() {
        let mut server = TransportServer::new(config(), Silent);
        assert!(matches!(
            server.start_server(),
            Err(NetworkError::NotInitialized)
        ));
        assert_eq!(server.tick().unwrap(), 0);
    }

    #[test]
    fn operations_on_unknown_ids_fail_quietly() {
        let mut server = TransportServer::new(config(), Silent);
        server.init().unwrap();
        assert!(!server.send(ConnectionId(0), &[1]));

        server.start_server().unwrap();
        server.start_server().unwrap();
        assert!(server.is_active());
        assert!(server.local_addr().is_some());

        assert!(!server.send(ConnectionId(3), &[1]));
        assert!(!server.disconnect(ConnectionId(3)));
        assert_eq!(server.address(ConnectionId(3)), "");
        assert_eq!(server.broadcast(&[1]), 0);
    }

    #[test]
    fn shutdown_is_final() {
        let mut server = TransportServer::new(config(), Silent);
        server.init().unwrap();
        server.start_server().unwrap();

        server.shutdown();
        server.shutdown();
        assert!(!server.is_active());
        assert!(matches!(server.init(), Err(NetworkError::EventLoopGone)));
    }
}

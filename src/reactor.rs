use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io::{self, Read, Write},
    net::SocketAddr,
    rc::Rc,
    sync::Arc,
};

use mio::{
    net::{TcpListener, TcpStream},
    Events, Interest, Registry, Token,
};

use crate::{
    error::{NetworkError, Result},
    event::Readiness,
    handler::{Acceptor, Callbacks, StreamHandler},
    net::tcp::{
        config::TransportConfig,
        traits::{ConnectionId, LogLevel, Logger},
    },
    poll::PollHandle,
    stream::{Incoming, StreamHandle, StreamPhase},
};

pub const DEFAULT_MAX_TICKS: usize = 100;
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_MAX_READS_PER_EVENT: usize = 32;

/// One non-blocking turn of a reactor.
pub trait Pump {
    /// Runs a single iteration without waiting and reports whether work is
    /// still pending afterwards.
    fn run_nowait(&mut self) -> Result<bool>;
}

/// Runs `pump` at most `max_iterations` times, stopping after the first
/// iteration that reports no pending work. Returns the iterations performed.
///
/// The bound keeps the cost of one external tick predictable even when I/O is
/// continuously ready.
pub fn pump_bounded<P>(pump: &mut P, max_iterations: usize) -> Result<usize>
where
    P: Pump + ?Sized,
{
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        if !pump.run_nowait()? {
            break;
        }
    }
    Ok(iterations)
}

pub(crate) enum Socket {
    Stream(TcpStream),
    Listener(TcpListener),
    /// Closed; waiting for `on_closed` delivery.
    Detached,
}

pub(crate) struct StreamEntry {
    pub(crate) socket: Socket,
    pub(crate) phase: StreamPhase,
    pub(crate) interest: Interest,
    pub(crate) send_buf: Vec<u8>,
    pub(crate) flush_queued: bool,
    pub(crate) connection_id: Option<ConnectionId>,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) callbacks: Callbacks,
}

pub(crate) enum ConnectOutcome {
    Pending,
    Connected(SocketAddr),
    Failed(io::Error),
}

/// Everything stream handles need to reach: the sockets, the registry and the
/// queues drained by the next pump iteration.
pub(crate) struct LoopState {
    registry: Registry,
    streams: HashMap<Token, StreamEntry>,
    next_token: usize,
    pending_closes: VecDeque<Token>,
    pending_flush: VecDeque<Token>,
    /// Listeners and streams that hit the per-event cap; serviced again on
    /// the next iteration.
    carried: VecDeque<Token>,
    failed_connects: VecDeque<(Token, io::Error)>,
    alive: bool,
    no_delay: bool,
    simultaneous_accepts: bool,
    logger: Arc<dyn Logger>,
}

impl LoopState {
    pub(crate) fn live_entry(&self, token: Token) -> Option<&StreamEntry> {
        if !self.alive {
            return None;
        }
        self.streams.get(&token)
    }

    fn has_pending_work(&self) -> bool {
        !self.pending_closes.is_empty()
            || !self.pending_flush.is_empty()
            || !self.carried.is_empty()
            || !self.failed_connects.is_empty()
    }

    fn next_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1);
            if !self.streams.contains_key(&token) {
                return token;
            }
        }
    }

    pub(crate) fn insert_stream(
        &mut self,
        mut stream: TcpStream,
        phase: StreamPhase,
        peer_addr: Option<SocketAddr>,
        connection_id: Option<ConnectionId>,
        callbacks: Callbacks,
    ) -> Result<Token> {
        if !self.alive {
            return Err(NetworkError::EventLoopGone);
        }
        let token = self.next_token();
        let interest = match phase {
            StreamPhase::Connecting => Interest::READABLE | Interest::WRITABLE,
            _ => Interest::READABLE,
        };

        if self.no_delay {
            if let Err(e) = stream.set_nodelay(true) {
                self.logger.log(
                    LogLevel::Warn,
                    &format!("Failed to set TCP_NODELAY on {:?}: {}", token, e),
                );
            }
        }

        self.registry.register(&mut stream, token, interest)?;
        let local_addr = stream.local_addr().ok();
        self.streams.insert(
            token,
            StreamEntry {
                socket: Socket::Stream(stream),
                phase,
                interest,
                send_buf: Vec::new(),
                flush_queued: false,
                connection_id,
                local_addr,
                peer_addr,
                callbacks,
            },
        );
        Ok(token)
    }

    /// Records a connect the OS refused outright. The failure reaches
    /// `on_connect` on the next pump iteration, like an asynchronous one.
    fn insert_failed_connect(
        &mut self,
        peer_addr: SocketAddr,
        connection_id: Option<ConnectionId>,
        callbacks: Callbacks,
        error: io::Error,
    ) -> Result<Token> {
        if !self.alive {
            return Err(NetworkError::EventLoopGone);
        }
        let token = self.next_token();
        self.streams.insert(
            token,
            StreamEntry {
                socket: Socket::Detached,
                phase: StreamPhase::Connecting,
                interest: Interest::READABLE,
                send_buf: Vec::new(),
                flush_queued: false,
                connection_id,
                local_addr: None,
                peer_addr: Some(peer_addr),
                callbacks,
            },
        );
        self.failed_connects.push_back((token, error));
        Ok(token)
    }

    fn insert_listener(&mut self, mut listener: TcpListener, acceptor: Rc<dyn Acceptor>) -> Result<Token> {
        let token = self.next_token();
        self.registry
            .register(&mut listener, token, Interest::READABLE)?;
        let local_addr = listener.local_addr().ok();
        self.streams.insert(
            token,
            StreamEntry {
                socket: Socket::Listener(listener),
                phase: StreamPhase::Listening,
                interest: Interest::READABLE,
                send_buf: Vec::new(),
                flush_queued: false,
                connection_id: None,
                local_addr,
                peer_addr: None,
                callbacks: Callbacks::Listener(acceptor),
            },
        );
        Ok(token)
    }

    pub(crate) fn queue_send(&mut self, token: Token, data: &[u8]) -> Result<()> {
        if !self.alive {
            return Err(NetworkError::EventLoopGone);
        }
        let entry = self
            .streams
            .get_mut(&token)
            .ok_or(NetworkError::StreamClosed)?;

        match entry.phase {
            StreamPhase::Listening => Err(NetworkError::NotAStream),
            StreamPhase::Closing | StreamPhase::Closed => Err(NetworkError::StreamClosed),
            // flushed once the connect completes
            StreamPhase::Connecting => {
                entry.send_buf.extend_from_slice(data);
                Ok(())
            }
            StreamPhase::Open => {
                entry.send_buf.extend_from_slice(data);
                if !entry.flush_queued {
                    entry.flush_queued = true;
                    self.pending_flush.push_back(token);
                }
                Ok(())
            }
        }
    }

    /// Writes as much of the queued bytes as the socket takes, then keeps
    /// WRITABLE interest only while bytes remain.
    fn flush(&mut self, token: Token) -> io::Result<()> {
        let Some(entry) = self.streams.get_mut(&token) else {
            return Ok(());
        };
        entry.flush_queued = false;
        if entry.phase != StreamPhase::Open {
            return Ok(());
        }
        let Socket::Stream(stream) = &mut entry.socket else {
            return Ok(());
        };

        let mut written = 0;
        let mut outcome: io::Result<()> = Ok(());
        while written < entry.send_buf.len() {
            match stream.write(&entry.send_buf[written..]) {
                Ok(0) => {
                    outcome = Err(io::ErrorKind::WriteZero.into());
                    break;
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        entry.send_buf.drain(..written);
        outcome?;

        let wanted = if entry.send_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != entry.interest {
            self.registry.reregister(stream, token, wanted)?;
            entry.interest = wanted;
        }
        Ok(())
    }

    fn finish_connect(&mut self, token: Token, hangup: bool) -> ConnectOutcome {
        let Some(entry) = self.streams.get_mut(&token) else {
            return ConnectOutcome::Pending;
        };
        let Socket::Stream(stream) = &mut entry.socket else {
            return ConnectOutcome::Pending;
        };

        match stream.take_error() {
            Ok(Some(e)) | Err(e) => return ConnectOutcome::Failed(e),
            Ok(None) => {}
        }

        match stream.peer_addr() {
            Ok(peer) => {
                entry.phase = StreamPhase::Open;
                entry.peer_addr = Some(peer);
                entry.local_addr = stream.local_addr().ok();
                if let Err(e) = self
                    .registry
                    .reregister(stream, token, Interest::READABLE)
                {
                    return ConnectOutcome::Failed(e);
                }
                entry.interest = Interest::READABLE;
                if !entry.send_buf.is_empty() && !entry.flush_queued {
                    entry.flush_queued = true;
                    self.pending_flush.push_back(token);
                }
                ConnectOutcome::Connected(peer)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected && !hangup => ConnectOutcome::Pending,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                ConnectOutcome::Failed(io::ErrorKind::ConnectionRefused.into())
            }
            Err(e) => ConnectOutcome::Failed(e),
        }
    }

    /// Closes the socket now and queues `on_closed` for the next iteration.
    /// Returns `false` when the stream is unknown or already closing.
    pub(crate) fn dispose(&mut self, token: Token) -> bool {
        let Some(entry) = self.streams.get_mut(&token) else {
            return false;
        };
        if entry.phase == StreamPhase::Closing {
            return false;
        }

        let released = match &mut entry.socket {
            Socket::Stream(stream) => {
                if entry.phase == StreamPhase::Open && !entry.send_buf.is_empty() {
                    if let Err(e) = stream.write(&entry.send_buf) {
                        self.logger.log(
                            LogLevel::Debug,
                            &format!("Dropped unsent bytes on {:?}: {}", token, e),
                        );
                    }
                }
                self.registry.deregister(stream)
            }
            Socket::Listener(listener) => self.registry.deregister(listener),
            Socket::Detached => Ok(()),
        };
        if let Err(e) = released {
            self.logger.log(
                LogLevel::Debug,
                &format!("Failed to deregister {:?}: {}", token, e),
            );
        }

        entry.socket = Socket::Detached;
        entry.send_buf.clear();
        entry.phase = StreamPhase::Closing;
        self.pending_closes.push_back(token);
        self.logger
            .log(LogLevel::Debug, &format!("Closing stream {:?}", token));
        true
    }

    fn carry_over(&mut self, token: Token) {
        if !self.carried.contains(&token) {
            self.carried.push_back(token);
        }
    }
}

/// A single-threaded reactor advanced by explicit, bounded pumps.
///
/// Created once (`new`), pumped by [`tick`](Self::tick) as often as the host
/// likes, destroyed once ([`shutdown`](Self::shutdown) or drop). Callbacks only
/// ever see [`StreamHandle`]s, never the loop, so it cannot be destroyed or
/// re-entered from inside a pump.
pub struct EventLoop {
    poll: Option<PollHandle>,
    events: Events,
    ready: Vec<Readiness>,
    /// Tokens carried into the current iteration.
    carried: Vec<Token>,
    read_buf: Vec<u8>,
    max_reads: usize,
    state: Rc<RefCell<LoopState>>,
    logger: Arc<dyn Logger>,
}

impl EventLoop {
    /// Allocates the reactor. Failure is reported as
    /// [`NetworkError::ReactorAlloc`] and is not meant to be retried.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let poll = PollHandle::new()?;
        let registry = poll.try_clone_registry()?;
        let logger = config.logger.clone();

        let state = LoopState {
            registry,
            streams: HashMap::new(),
            next_token: 0,
            pending_closes: VecDeque::new(),
            pending_flush: VecDeque::new(),
            carried: VecDeque::new(),
            failed_connects: VecDeque::new(),
            alive: true,
            no_delay: config.no_delay,
            simultaneous_accepts: config.simultaneous_accepts,
            logger: logger.clone(),
        };

        Ok(Self {
            poll: Some(poll),
            events: Events::with_capacity(config.events_capacity.max(1)),
            ready: Vec::new(),
            carried: Vec::new(),
            read_buf: vec![0; config.read_buffer_size.max(1)],
            max_reads: config.max_reads_per_event.max(1),
            state: Rc::new(RefCell::new(state)),
            logger,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.poll.is_some()
    }

    /// Sockets still owned by the loop, including ones awaiting `on_closed`.
    pub fn stream_count(&self) -> usize {
        self.state.borrow().streams.len()
    }

    /// Starts a non-blocking connect to `addr` with `handler` attached.
    ///
    /// Every connect outcome, including one the OS rejects immediately, is
    /// reported through `on_connect` during a later pump.
    pub fn connect(
        &self,
        addr: SocketAddr,
        connection_id: Option<ConnectionId>,
        handler: Rc<dyn StreamHandler>,
    ) -> Result<StreamHandle> {
        self.ensure_alive()?;
        let callbacks = Callbacks::Stream(handler);
        let token = match TcpStream::connect(addr) {
            Ok(stream) => self.state.borrow_mut().insert_stream(
                stream,
                StreamPhase::Connecting,
                Some(addr),
                connection_id,
                callbacks,
            )?,
            Err(e) => self
                .state
                .borrow_mut()
                .insert_failed_connect(addr, connection_id, callbacks, e)?,
        };
        self.logger.log(
            LogLevel::Debug,
            &format!("Connecting {:?} to {}", token, addr),
        );
        Ok(self.handle(token, connection_id))
    }

    /// Binds a listener on `addr`; inbound connections go to `acceptor`.
    pub fn listen(&self, addr: SocketAddr, acceptor: Rc<dyn Acceptor>) -> Result<StreamHandle> {
        self.ensure_alive()?;
        let listener = TcpListener::bind(addr)?;
        let token = self.state.borrow_mut().insert_listener(listener, acceptor)?;
        self.logger.log(
            LogLevel::Debug,
            &format!("Listening {:?} on {}", token, addr),
        );
        Ok(self.handle(token, None))
    }

    /// Pumps the reactor at most `max_iterations` times. Must keep being called
    /// after streams are disposed: their `on_closed` is only delivered here.
    pub fn tick(&mut self, max_iterations: usize) -> Result<usize> {
        pump_bounded(self, max_iterations)
    }

    /// Destroys the reactor and every socket it owns. Pending `on_closed`
    /// callbacks are dropped. Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        let Some(poll) = self.poll.take() else {
            return;
        };
        {
            let mut state = self.state.borrow_mut();
            state.alive = false;
            state.streams.clear();
            state.pending_closes.clear();
            state.pending_flush.clear();
            state.carried.clear();
            state.failed_connects.clear();
        }
        drop(poll);
        self.logger.log(LogLevel::Debug, "Event loop shut down");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(NetworkError::EventLoopGone)
        }
    }

    fn handle(&self, token: Token, connection_id: Option<ConnectionId>) -> StreamHandle {
        StreamHandle::new(token, connection_id, Rc::downgrade(&self.state))
    }

    fn lookup(&self, token: Token) -> Option<(Callbacks, StreamHandle, StreamPhase)> {
        let state = self.state.borrow();
        let entry = state.streams.get(&token)?;
        Some((
            entry.callbacks.clone(),
            self.handle(token, entry.connection_id),
            entry.phase,
        ))
    }

    fn deliver_closes(&mut self) -> usize {
        let closing: Vec<Token> = self.state.borrow_mut().pending_closes.drain(..).collect();
        for token in &closing {
            let entry = self.state.borrow_mut().streams.remove(token);
            if let Some(entry) = entry {
                let handle = self.handle(*token, entry.connection_id);
                entry.callbacks.closed(&handle);
            }
        }
        closing.len()
    }

    fn flush_pending(&mut self) -> usize {
        let queued: Vec<Token> = self.state.borrow_mut().pending_flush.drain(..).collect();
        for token in &queued {
            let flushed = self.state.borrow_mut().flush(*token);
            if let Err(e) = flushed {
                self.fail_stream(*token, NetworkError::Io(e));
            }
        }
        queued.len()
    }

    fn deliver_failed_connects(&mut self) -> usize {
        let failed: Vec<(Token, io::Error)> =
            self.state.borrow_mut().failed_connects.drain(..).collect();
        let count = failed.len();
        for (token, error) in failed {
            // disposed before the failure was delivered
            if let Some((Callbacks::Stream(handler), handle, StreamPhase::Connecting)) =
                self.lookup(token)
            {
                self.connect_failed(token, &handler, &handle, error);
            }
        }
        count
    }

    /// Services listeners and streams that hit the per-event cap last
    /// iteration. Runs after the poll so no readiness edge is lost.
    fn retry_carried(&mut self) -> usize {
        let carried = std::mem::take(&mut self.carried);
        for token in &carried {
            match self.lookup(*token) {
                Some((Callbacks::Listener(acceptor), _, StreamPhase::Listening)) => {
                    self.accept_ready(*token, &acceptor);
                }
                Some((Callbacks::Stream(handler), handle, StreamPhase::Open)) => {
                    self.read_ready(*token, &handler, &handle);
                }
                _ => {}
            }
        }
        carried.len()
    }

    /// Reports `error` to the stream's handler, then disposes the stream.
    fn fail_stream(&mut self, token: Token, error: NetworkError) {
        let Some((callbacks, handle, _)) = self.lookup(token) else {
            return;
        };
        let level = if error.is_disconnect() {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        };
        self.logger
            .log(level, &format!("Stream {:?} failed: {}", token, error));
        if let Callbacks::Stream(handler) = &callbacks {
            handler.on_error(&handle, error);
        }
        self.state.borrow_mut().dispose(token);
    }

    fn dispatch(&mut self, ready: Readiness) {
        let token = ready.token();
        let Some((callbacks, handle, phase)) = self.lookup(token) else {
            return;
        };

        // serviced by retry_carried later in this iteration
        let carried = self.carried.contains(&token);

        match (phase, callbacks) {
            (StreamPhase::Listening, Callbacks::Listener(acceptor)) => {
                if !carried {
                    self.accept_ready(token, &acceptor);
                }
            }
            (StreamPhase::Connecting, Callbacks::Stream(handler)) => {
                let connected = self.complete_connect(token, &handler, &handle, &ready);
                if connected && (ready.is_readable() || ready.is_closed()) {
                    self.read_ready(token, &handler, &handle);
                }
            }
            (StreamPhase::Open, Callbacks::Stream(handler)) => {
                if ready.is_writable() {
                    let flushed = self.state.borrow_mut().flush(token);
                    if let Err(e) = flushed {
                        self.fail_stream(token, NetworkError::Io(e));
                        return;
                    }
                }
                if !carried && (ready.is_readable() || ready.is_closed() || ready.is_error()) {
                    self.read_ready(token, &handler, &handle);
                }
            }
            _ => {}
        }
    }

    fn complete_connect(
        &mut self,
        token: Token,
        handler: &Rc<dyn StreamHandler>,
        handle: &StreamHandle,
        ready: &Readiness,
    ) -> bool {
        let hangup = ready.is_error() || ready.is_closed();
        let outcome = self.state.borrow_mut().finish_connect(token, hangup);

        match outcome {
            ConnectOutcome::Pending => false,
            ConnectOutcome::Connected(peer) => {
                self.logger.log(
                    LogLevel::Info,
                    &format!("Connection established {:?} -> {}", token, peer),
                );
                handler.on_connect(handle, Ok(()));
                true
            }
            ConnectOutcome::Failed(e) => {
                self.connect_failed(token, handler, handle, e);
                false
            }
        }
    }

    fn connect_failed(
        &mut self,
        token: Token,
        handler: &Rc<dyn StreamHandler>,
        handle: &StreamHandle,
        error: io::Error,
    ) {
        self.logger.log(
            LogLevel::Warn,
            &format!("Connection failed {:?}: {}", token, error),
        );
        handler.on_connect(handle, Err(NetworkError::Connect(error)));
        self.state.borrow_mut().dispose(token);
    }

    /// Reads until the socket would block, or carries the stream over once
    /// `max_reads` reads were delivered.
    fn read_ready(&mut self, token: Token, handler: &Rc<dyn StreamHandler>, handle: &StreamHandle) {
        let mut reads = 0;
        loop {
            if reads == self.max_reads {
                self.state.borrow_mut().carry_over(token);
                return;
            }
            let result = {
                let mut state = self.state.borrow_mut();
                let read = match state.streams.get_mut(&token) {
                    Some(StreamEntry {
                        socket: Socket::Stream(stream),
                        phase: StreamPhase::Open,
                        ..
                    }) => stream.read(&mut self.read_buf),
                    _ => return,
                };
                read
            };

            match result {
                Ok(0) => {
                    self.logger.log(
                        LogLevel::Debug,
                        &format!("Peer closed {:?}", token),
                    );
                    self.state.borrow_mut().dispose(token);
                    return;
                }
                Ok(n) => {
                    reads += 1;
                    handler.on_message(handle, &self.read_buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fail_stream(token, NetworkError::Io(e));
                    return;
                }
            }
        }
    }

    /// Accepts up to `max_reads` sockets, or one when simultaneous accepts are
    /// off, and carries the listener over when that limit is reached.
    fn accept_ready(&mut self, token: Token, acceptor: &Rc<dyn Acceptor>) {
        let mut accepts = 0;
        loop {
            let (accepted, simultaneous) = {
                let mut state = self.state.borrow_mut();
                let simultaneous = state.simultaneous_accepts;
                let accepted = match state.streams.get_mut(&token) {
                    Some(StreamEntry {
                        socket: Socket::Listener(listener),
                        phase: StreamPhase::Listening,
                        ..
                    }) => listener.accept(),
                    _ => return,
                };
                (accepted, simultaneous)
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let incoming = Incoming::new(stream, peer_addr, Rc::downgrade(&self.state));
                    acceptor.on_accept(Ok(incoming));
                    accepts += 1;
                    let limit = if simultaneous { self.max_reads } else { 1 };
                    if accepts >= limit {
                        self.state.borrow_mut().carry_over(token);
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    acceptor.on_accept(Err(NetworkError::Accept(e)));
                }
                Err(e) => {
                    self.logger.log(
                        LogLevel::Error,
                        &format!("Accept error on {:?}: {}", token, e),
                    );
                    acceptor.on_accept(Err(NetworkError::Accept(e)));
                    return;
                }
            }
        }
    }
}

impl Pump for EventLoop {
    fn run_nowait(&mut self) -> Result<bool> {
        self.ensure_alive()?;

        let mut work = self.deliver_closes();
        work += self.deliver_failed_connects();
        work += self.flush_pending();
        let carried: Vec<Token> = self.state.borrow_mut().carried.drain(..).collect();
        self.carried = carried;

        let Some(poll) = self.poll.as_mut() else {
            return Err(NetworkError::EventLoopGone);
        };
        poll.poll_now(&mut self.events)?;
        self.ready.clear();
        self.ready.extend(self.events.iter().map(Readiness::from));

        for index in 0..self.ready.len() {
            let ready = self.ready[index];
            self.dispatch(ready);
            work += 1;
        }
        work += self.retry_carried();

        let pending = self.state.borrow().has_pending_work();
        Ok(work > 0 || pending)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::time::{Duration, Instant};

    /// Reports pending work for the first `busy` iterations.
    struct ScriptedPump {
        busy: usize,
        runs: usize,
    }

    impl Pump for ScriptedPump {
        fn run_nowait(&mut self) -> Result<bool> {
            self.runs += 1;
            Ok(self.runs <= self.busy)
        }
    }

    #[derive(Default)]
    struct RecordingAcceptor {
        accepted: RefCell<Vec<Incoming>>,
        closed: Cell<usize>,
    }

    impl Acceptor for RecordingAcceptor {
        fn on_accept(&self, incoming: Result<Incoming>) {
            if let Ok(incoming) = incoming {
                self.accepted.borrow_mut().push(incoming);
            }
        }

        fn on_closed(&self, _listener: &StreamHandle) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[derive(Default)]
    struct RecordingStream {
        connects: RefCell<Vec<bool>>,
        messages: RefCell<Vec<u8>>,
        closed: Cell<usize>,
    }

    impl StreamHandler for RecordingStream {
        fn on_connect(&self, _stream: &StreamHandle, result: Result<()>) {
            self.connects.borrow_mut().push(result.is_ok());
        }

        fn on_message(&self, _stream: &StreamHandle, data: &[u8]) {
            self.messages.borrow_mut().extend_from_slice(data);
        }

        fn on_closed(&self, _stream: &StreamHandle) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn tick_until(event_loop: &mut EventLoop, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            event_loop.tick(DEFAULT_MAX_TICKS).unwrap();
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_bounded_pump_stops_at_first_idle_iteration() {
        let mut pump = ScriptedPump { busy: 3, runs: 0 };
        assert_eq!(pump_bounded(&mut pump, 100).unwrap(), 4);
        assert_eq!(pump.runs, 4);
    }

    #[test]
    fn test_bounded_pump_respects_limit() {
        let mut pump = ScriptedPump {
            busy: usize::MAX,
            runs: 0,
        };
        assert_eq!(pump_bounded(&mut pump, 7).unwrap(), 7);
        assert_eq!(pump.runs, 7);

        let mut idle = ScriptedPump { busy: 0, runs: 0 };
        assert_eq!(pump_bounded(&mut idle, 0).unwrap(), 0);
        assert_eq!(pump_bounded(&mut idle, 10).unwrap(), 1);
    }

    #[test]
    fn test_idle_loop_ticks_once() {
        let mut event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        assert_eq!(event_loop.tick(DEFAULT_MAX_TICKS).unwrap(), 1);
    }

    #[test]
    fn test_close_callback_fires_on_later_pump() {
        let mut event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        let acceptor = Rc::new(RecordingAcceptor::default());
        let listener = event_loop.listen(localhost(), acceptor.clone()).unwrap();
        assert_eq!(listener.phase(), StreamPhase::Listening);

        listener.dispose();
        listener.dispose();
        assert_eq!(listener.phase(), StreamPhase::Closing);
        assert_eq!(acceptor.closed.get(), 0);

        event_loop.tick(DEFAULT_MAX_TICKS).unwrap();
        assert_eq!(acceptor.closed.get(), 1);
        assert_eq!(listener.phase(), StreamPhase::Closed);
        assert_eq!(event_loop.stream_count(), 0);
    }

    #[test]
    fn test_send_rejected_on_listener_and_after_dispose() {
        let event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        let acceptor = Rc::new(RecordingAcceptor::default());
        let listener = event_loop.listen(localhost(), acceptor).unwrap();

        assert!(matches!(listener.send(b"x"), Err(NetworkError::NotAStream)));
        listener.dispose();
        assert!(matches!(listener.send(b"x"), Err(NetworkError::StreamClosed)));
    }

    #[test]
    fn test_connect_accept_and_transfer() {
        let mut event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        let acceptor = Rc::new(RecordingAcceptor::default());
        let listener = event_loop.listen(localhost(), acceptor.clone()).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = Rc::new(RecordingStream::default());
        let outbound = event_loop.connect(addr, None, client.clone()).unwrap();
        // queued before the connect completes
        outbound.send(&[7, 8, 9]).unwrap();

        assert!(tick_until(&mut event_loop, || {
            !acceptor.accepted.borrow().is_empty() && !client.connects.borrow().is_empty()
        }));
        assert_eq!(*client.connects.borrow(), vec![true]);
        assert!(outbound.is_active());

        let server_side = Rc::new(RecordingStream::default());
        let incoming = acceptor.accepted.borrow_mut().remove(0);
        let inbound = incoming
            .bind(Some(ConnectionId(0)), server_side.clone())
            .unwrap();
        assert_eq!(inbound.connection_id(), Some(ConnectionId(0)));

        assert!(tick_until(&mut event_loop, || server_side.messages.borrow().len() == 3));
        assert_eq!(*server_side.messages.borrow(), vec![7, 8, 9]);

        inbound.dispose();
        assert!(tick_until(&mut event_loop, || {
            server_side.closed.get() == 1 && client.closed.get() == 1
        }));
        assert!(!outbound.is_active());
    }

    #[test]
    fn test_rejected_connect_reports_through_on_connect() {
        let mut event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        let client = Rc::new(RecordingStream::default());
        // the OS refuses TCP to a broadcast address before any packet is sent
        let addr: SocketAddr = "255.255.255.255:9".parse().unwrap();
        let outbound = event_loop.connect(addr, None, client.clone()).unwrap();
        assert_eq!(outbound.phase(), StreamPhase::Connecting);
        assert!(client.connects.borrow().is_empty());

        assert!(tick_until(&mut event_loop, || client.closed.get() == 1));
        assert_eq!(*client.connects.borrow(), vec![false]);
        assert_eq!(outbound.phase(), StreamPhase::Closed);
        assert_eq!(event_loop.stream_count(), 0);
    }

    #[test]
    fn test_reads_carry_over_past_the_per_event_cap() {
        let config = TransportConfig::builder()
            .read_buffer_size(8)
            .max_reads_per_event(2)
            .build();
        let mut event_loop = EventLoop::new(&config).unwrap();
        let acceptor = Rc::new(RecordingAcceptor::default());
        let listener = event_loop.listen(localhost(), acceptor.clone()).unwrap();

        let mut peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        assert!(tick_until(&mut event_loop, || !acceptor.accepted.borrow().is_empty()));
        let server_side = Rc::new(RecordingStream::default());
        let incoming = acceptor.accepted.borrow_mut().remove(0);
        incoming.bind(None, server_side.clone()).unwrap();

        std::io::Write::write_all(&mut peer, &[5u8; 64]).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        // at most two 8-byte reads per iteration
        let mut previous = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while server_side.messages.borrow().len() < 64 && Instant::now() < deadline {
            event_loop.tick(1).unwrap();
            let received = server_side.messages.borrow().len();
            assert!(received - previous <= 16);
            previous = received;
        }
        assert_eq!(*server_side.messages.borrow(), vec![5u8; 64]);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut event_loop = EventLoop::new(&TransportConfig::default()).unwrap();
        let acceptor = Rc::new(RecordingAcceptor::default());
        let listener = event_loop.listen(localhost(), acceptor).unwrap();

        event_loop.shutdown();
        event_loop.shutdown();
        assert!(!event_loop.is_alive());
        assert_eq!(listener.phase(), StreamPhase::Closed);
        assert!(matches!(listener.send(b"x"), Err(NetworkError::EventLoopGone)));
        assert!(matches!(
            event_loop.tick(DEFAULT_MAX_TICKS),
            Err(NetworkError::EventLoopGone)
        ));
    }
}

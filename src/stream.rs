//! Stream handles: cheap references to sockets owned by an [`EventLoop`](crate::EventLoop).
//!
//! A [`StreamHandle`] never owns its socket. The loop does, keyed by the handle's
//! token, so every operation on a handle resolves through the loop's state and
//! degrades to an error (or a no-op for [`StreamHandle::dispose`]) once the socket
//! is gone or the loop was shut down.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

use mio::{net::TcpStream, Token};

use crate::error::{NetworkError, Result};
use crate::handler::{Callbacks, StreamHandler};
use crate::net::tcp::ConnectionId;
use crate::reactor::LoopState;

/// Lifecycle of a loop-owned socket as seen through a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Outbound connect in flight.
    Connecting,
    /// Bound and accepting.
    Listening,
    /// Connected; reads and writes flow.
    Open,
    /// Disposal requested; `on_closed` is pending.
    Closing,
    /// `on_closed` has fired, or the loop is gone.
    Closed,
}

#[derive(Debug, Clone)]
pub struct StreamHandle {
    token: Token,
    connection_id: Option<ConnectionId>,
    state: Weak<RefCell<LoopState>>,
}

impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && Weak::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StreamHandle {}

impl StreamHandle {
    pub(crate) fn new(
        token: Token,
        connection_id: Option<ConnectionId>,
        state: Weak<RefCell<LoopState>>,
    ) -> Self {
        Self {
            token,
            connection_id,
            state,
        }
    }

    /// A handle bound to no loop; every query reports it closed.
    #[cfg(test)]
    pub(crate) fn detached(token: usize, connection_id: Option<ConnectionId>) -> Self {
        Self::new(Token(token), connection_id, Weak::new())
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// The identifier assigned when the stream was created, if any.
    /// Still available inside `on_closed`.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn phase(&self) -> StreamPhase {
        self.inspect(|state| {
            state
                .live_entry(self.token)
                .map(|entry| entry.phase)
                .unwrap_or(StreamPhase::Closed)
        })
        .unwrap_or(StreamPhase::Closed)
    }

    /// Connected or listening, and not yet disposed.
    pub fn is_active(&self) -> bool {
        matches!(self.phase(), StreamPhase::Open | StreamPhase::Listening)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inspect(|state| state.live_entry(self.token).and_then(|e| e.peer_addr))
            .flatten()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inspect(|state| state.live_entry(self.token).and_then(|e| e.local_addr))
            .flatten()
    }

    /// Queues `data` for transmission on a later pump. The bytes are copied, so
    /// the caller may reuse its buffer immediately.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let state = self.state.upgrade().ok_or(NetworkError::EventLoopGone)?;
        let mut state = state.borrow_mut();
        state.queue_send(self.token, data)
    }

    /// Requests an asynchronous close. `on_closed` fires on a later pump.
    /// Repeated calls are no-ops.
    pub fn dispose(&self) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().dispose(self.token);
        }
    }

    fn inspect<R>(&self, f: impl FnOnce(&LoopState) -> R) -> Option<R> {
        let state = self.state.upgrade()?;
        let state = state.borrow();
        Some(f(&state))
    }
}

/// An accepted socket that is not yet registered with the loop.
///
/// Nothing is read from it until [`bind`](Self::bind) attaches an identifier and
/// a handler. Dropping it closes the socket.
#[derive(Debug)]
pub struct Incoming {
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Weak<RefCell<LoopState>>,
}

impl Incoming {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        state: Weak<RefCell<LoopState>>,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            state,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Registers the socket for reads with `handler` attached. On failure the
    /// socket is closed and never reaches the handler.
    pub fn bind(
        self,
        connection_id: Option<ConnectionId>,
        handler: Rc<dyn StreamHandler>,
    ) -> Result<StreamHandle> {
        let state = self.state.upgrade().ok_or(NetworkError::EventLoopGone)?;
        let token = state.borrow_mut().insert_stream(
            self.stream,
            StreamPhase::Open,
            Some(self.peer_addr),
            connection_id,
            Callbacks::Stream(handler),
        )?;
        Ok(StreamHandle::new(
            token,
            connection_id,
            Rc::downgrade(&state),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_is_closed() {
        let handle = StreamHandle::detached(3, Some(ConnectionId(9)));
        assert_eq!(handle.phase(), StreamPhase::Closed);
        assert!(!handle.is_active());
        assert_eq!(handle.peer_addr(), None);
        assert_eq!(handle.connection_id(), Some(ConnectionId(9)));
        assert!(matches!(
            handle.send(&[1, 2, 3]),
            Err(NetworkError::EventLoopGone)
        ));
        handle.dispose();
        handle.dispose();
    }
}

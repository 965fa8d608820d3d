use std::rc::Rc;

use crate::error::{NetworkError, Result};
use crate::stream::{Incoming, StreamHandle};

/// The four callbacks a connected (or connecting) stream reports through.
///
/// A handler is bound when the stream is created, before any socket I/O is
/// started, so no event can reach a stream whose callbacks are unset.
///
/// Callbacks run inside [`EventLoop::tick`](crate::EventLoop::tick). They may
/// call [`StreamHandle::send`] and [`StreamHandle::dispose`] freely; disposal
/// completes on a later pump iteration with [`on_closed`](Self::on_closed).
pub trait StreamHandler {
    /// Outcome of an outbound connect. Fires exactly once per connect, during a
    /// pump, even when the OS rejected the connect immediately.
    /// On `Err` the stream is disposed right after this returns.
    fn on_connect(&self, stream: &StreamHandle, result: Result<()>) {
        let _ = (stream, result);
    }

    /// `data` is only valid for the duration of the call; copy what must be kept.
    fn on_message(&self, stream: &StreamHandle, data: &[u8]);

    /// A read or write failed. The stream is disposed right after this returns.
    fn on_error(&self, stream: &StreamHandle, error: NetworkError) {
        let _ = (stream, error);
    }

    /// The socket is fully torn down. Drop every external reference to `stream`.
    fn on_closed(&self, stream: &StreamHandle) {
        let _ = stream;
    }
}

/// Receives inbound connections from a listening stream.
pub trait Acceptor {
    /// Called once per accepted socket. Bind it with [`Incoming::bind`] to start
    /// reading; dropping it unbound closes the socket.
    fn on_accept(&self, incoming: Result<Incoming>);

    fn on_closed(&self, listener: &StreamHandle) {
        let _ = listener;
    }
}

/// The callbacks attached to one loop-owned socket.
#[derive(Clone)]
pub(crate) enum Callbacks {
    Stream(Rc<dyn StreamHandler>),
    Listener(Rc<dyn Acceptor>),
}

impl Callbacks {
    pub(crate) fn closed(&self, handle: &StreamHandle) {
        match self {
            Callbacks::Stream(handler) => handler.on_closed(handle),
            Callbacks::Listener(acceptor) => acceptor.on_closed(handle),
        }
    }
}

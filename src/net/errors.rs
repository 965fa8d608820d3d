use crate::net::tcp::ConnectionId;
use std::io;
use std::net::{AddrParseError, SocketAddr};

/// Errors surfaced by the event loop, stream handles and the transport wrappers.
///
/// Registry misses (an unknown [`ConnectionId`]) are deliberately absent: those
/// operations report `false` or an empty string instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Connect Error: {0}")]
    Connect(#[source] io::Error),

    #[error("Accept Error: {0}")]
    Accept(#[source] io::Error),

    /// The OS refused to allocate the reactor. Not recoverable.
    #[error("Reactor allocation failed: {0}")]
    ReactorAlloc(#[source] io::Error),

    #[error("Invalid IP literal: {0}")]
    AddressParse(#[from] AddrParseError),

    #[error("Stream is closed or closing")]
    StreamClosed,

    #[error("Operation requires a connected stream, not a listener")]
    NotAStream,

    #[error("EventLoop is gone")]
    EventLoopGone,

    #[error("Transport is not initialized")]
    NotInitialized,

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NetworkError {
    /// Whether the error reports the peer going away rather than a local fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            NetworkError::Io(e) | NetworkError::Connect(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            NetworkError::StreamClosed => true,
            _ => false,
        }
    }
}

/// Non-error notifications delivered to a [`ServerHandler`](crate::net::tcp::ServerHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    ConnectionEstablished(ConnectionId, SocketAddr),
    ConnectionClosed(ConnectionId),
    Listening(SocketAddr),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_counts_as_disconnect() {
        let err = NetworkError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(err.is_disconnect());
        assert!(NetworkError::StreamClosed.is_disconnect());
        assert!(!NetworkError::EventLoopGone.is_disconnect());
    }

    #[test]
    fn bad_literal_converts() {
        let err: NetworkError = "localhost".parse::<std::net::IpAddr>().unwrap_err().into();
        assert!(matches!(err, NetworkError::AddressParse(_)));
        assert!(err.to_string().starts_with("Invalid IP literal"));
    }
}

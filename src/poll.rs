use std::{io, time::Duration};

use mio::{Events, Poll, Registry};

use crate::error::{NetworkError, Result};

/// Owns the native reactor. Polling never blocks: every call uses a zero timeout.
pub struct PollHandle {
    poller: Poll,
}

impl PollHandle {
    pub fn new() -> Result<Self> {
        let poller = Poll::new().map_err(NetworkError::ReactorAlloc)?;
        Ok(PollHandle { poller })
    }

    /// A second handle onto the registry, kept by the loop state so stream
    /// handles can (de)register without borrowing the poller.
    pub fn try_clone_registry(&self) -> Result<Registry> {
        self.poller
            .registry()
            .try_clone()
            .map_err(NetworkError::ReactorAlloc)
    }

    /// Polls without waiting and returns how many events were collected.
    /// An interrupted poll counts as an empty one.
    pub fn poll_now(&mut self, events: &mut Events) -> Result<usize> {
        match self.poller.poll(events, Some(Duration::ZERO)) {
            Ok(()) => Ok(events.iter().count()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                events.clear();
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{net::TcpListener, Interest, Token};

    #[test]
    fn test_poll_now_returns_immediately() {
        let mut poller = PollHandle::new().unwrap();
        let mut events = Events::with_capacity(16);
        let start = std::time::Instant::now();
        let n = poller.poll_now(&mut events).unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_cloned_registry_reports_to_poller() {
        let mut poller = PollHandle::new().unwrap();
        let registry = poller.try_clone_registry().unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        registry
            .register(&mut listener, Token(7), Interest::READABLE)
            .unwrap();

        let _peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut events = Events::with_capacity(16);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while !seen && std::time::Instant::now() < deadline {
            poller.poll_now(&mut events).unwrap();
            seen = events.iter().any(|e| e.token() == Token(7) && e.is_readable());
        }
        assert!(seen);
        registry.deregister(&mut listener).unwrap();
    }
}

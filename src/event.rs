use mio::{event::Event, Token};
use std::fmt;

/// Copied readiness for one token, detached from the `mio::Events` buffer so the
/// buffer can be reused while callbacks run.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    token: Token,
    is_readable: bool,
    is_writable: bool,
    is_error: bool,
    is_closed: bool,
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("token", &self.token)
            .field("is_readable", &self.is_readable)
            .field("is_writable", &self.is_writable)
            .field("is_error", &self.is_error)
            .field("is_closed", &self.is_closed)
            .finish()
    }
}

impl Readiness {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.is_readable
    }

    pub fn is_writable(&self) -> bool {
        self.is_writable
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Either half of the connection was closed by the peer.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            token: event.token(),
            is_readable: event.is_readable(),
            is_writable: event.is_writable(),
            is_error: event.is_error(),
            is_closed: event.is_read_closed() || event.is_write_closed(),
        }
    }
}

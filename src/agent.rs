//! Signals from the hosting agent (the matchmaking side of a dedicated server).
//!
//! The agent itself lives outside this crate. Whatever receives its
//! notifications turns them into [`AgentSignal`]s and hands them to
//! [`SignalHub::emit`], which runs the callbacks registered for that kind.

use std::str::FromStr;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSignal {
    /// The server was allocated and should start accepting connections.
    ServerActive,
    Shutdown,
    /// Maintenance is scheduled at the given time.
    Maintenance(DateTime<Utc>),
    AgentError(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalParseError {
    #[error("unknown signal: {0}")]
    Unknown(String),
    #[error("maintenance time must be RFC 3339: {0}")]
    InvalidTime(String),
}

/// Text form used by the demo driver: `activate`, `shutdown`,
/// `maintenance <rfc3339>` and `error <message>`.
impl FromStr for AgentSignal {
    type Err = SignalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = match s.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (s, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "activate" | "active" => Ok(AgentSignal::ServerActive),
            "shutdown" => Ok(AgentSignal::Shutdown),
            "maintenance" => DateTime::parse_from_rfc3339(rest)
                .map(|t| AgentSignal::Maintenance(t.with_timezone(&Utc)))
                .map_err(|_| SignalParseError::InvalidTime(rest.to_string())),
            "error" => Ok(AgentSignal::AgentError(rest.to_string())),
            _ => Err(SignalParseError::Unknown(s.to_string())),
        }
    }
}

/// Callback registry for the four agent notifications.
#[derive(Default)]
pub struct SignalHub {
    server_active: Vec<Box<dyn FnMut()>>,
    shutdown: Vec<Box<dyn FnMut()>>,
    maintenance: Vec<Box<dyn FnMut(DateTime<Utc>)>>,
    agent_error: Vec<Box<dyn FnMut(&str)>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_server_active(&mut self, callback: impl FnMut() + 'static) {
        self.server_active.push(Box::new(callback));
    }

    pub fn on_shutdown(&mut self, callback: impl FnMut() + 'static) {
        self.shutdown.push(Box::new(callback));
    }

    pub fn on_maintenance(&mut self, callback: impl FnMut(DateTime<Utc>) + 'static) {
        self.maintenance.push(Box::new(callback));
    }

    pub fn on_agent_error(&mut self, callback: impl FnMut(&str) + 'static) {
        self.agent_error.push(Box::new(callback));
    }

    /// Runs every callback registered for `signal`, in registration order.
    /// Returns how many ran.
    pub fn emit(&mut self, signal: &AgentSignal) -> usize {
        match signal {
            AgentSignal::ServerActive => {
                self.server_active.iter_mut().for_each(|cb| cb());
                self.server_active.len()
            }
            AgentSignal::Shutdown => {
                self.shutdown.iter_mut().for_each(|cb| cb());
                self.shutdown.len()
            }
            AgentSignal::Maintenance(at) => {
                self.maintenance.iter_mut().for_each(|cb| cb(*at));
                self.maintenance.len()
            }
            AgentSignal::AgentError(message) => {
                self.agent_error.iter_mut().for_each(|cb| cb(message));
                self.agent_error.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn parses_driver_commands() {
        assert_eq!("activate".parse(), Ok(AgentSignal::ServerActive));
        assert_eq!(" Shutdown ".parse(), Ok(AgentSignal::Shutdown));
        assert_eq!(
            "maintenance 2030-01-02T03:04:05Z".parse(),
            Ok(AgentSignal::Maintenance(
                Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
            ))
        );
        assert_eq!(
            "error lost heartbeat".parse(),
            Ok(AgentSignal::AgentError("lost heartbeat".into()))
        );
        assert!(matches!(
            "maintenance tomorrow".parse::<AgentSignal>(),
            Err(SignalParseError::InvalidTime(_))
        ));
        assert!(matches!(
            "reboot".parse::<AgentSignal>(),
            Err(SignalParseError::Unknown(_))
        ));
    }

    #[test]
    fn emit_reaches_only_matching_callbacks() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hub = SignalHub::new();

        let log = seen.clone();
        hub.on_server_active(move || log.borrow_mut().push("active".to_string()));
        let log = seen.clone();
        hub.on_shutdown(move || log.borrow_mut().push("shutdown".to_string()));
        let log = seen.clone();
        hub.on_maintenance(move |at| log.borrow_mut().push(at.to_rfc3339()));
        let log = seen.clone();
        hub.on_agent_error(move |msg| log.borrow_mut().push(msg.to_string()));

        assert_eq!(hub.emit(&AgentSignal::Shutdown), 1);
        assert_eq!(hub.emit(&AgentSignal::AgentError("boom".into())), 1);
        assert_eq!(seen.borrow().as_slice(), ["shutdown", "boom"]);
    }

    #[test]
    fn emit_without_callbacks_is_noop() {
        let mut hub = SignalHub::new();
        assert_eq!(hub.emit(&AgentSignal::ServerActive), 0);
    }
}

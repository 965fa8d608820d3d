//! Dedicated-server host: drives a [`TransportServer`] from agent signals.
//!
//! Signals queue up in the host's inbox when the [`SignalHub`] emits them and
//! are applied on the next [`ServerHost::tick`], so agent callbacks never run
//! inside a pump of the server's event loop.

use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentSignal, SignalHub},
    error::Result,
    net::tcp::{LogLevel, Logger, ServerHandler, TransportServer},
};

pub const SHUTDOWN_MESSAGE: &str = "Server is Shutting Down";
pub const MAINTENANCE_MESSAGE: &str = "Server is Shutting Down for maintenance";

/// Notice broadcast to every connected peer, JSON encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Shutdown {
        message: String,
    },
    Maintenance {
        message: String,
        scheduled_utc: DateTime<Utc>,
    },
}

impl Notice {
    pub fn shutdown() -> Self {
        Notice::Shutdown {
            message: SHUTDOWN_MESSAGE.to_string(),
        }
    }

    pub fn maintenance(scheduled_utc: DateTime<Utc>) -> Self {
        Notice::Maintenance {
            message: MAINTENANCE_MESSAGE.to_string(),
            scheduled_utc,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Time between the shutdown broadcast and [`HostStatus::Terminate`].
    pub grace_period: Duration,
    /// Start shutting down this long after `init`.
    pub session_limit: Option<Duration>,
    /// Listen right away instead of waiting for [`AgentSignal::ServerActive`].
    pub activate_on_start: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            session_limit: None,
            activate_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Running,
    /// Shutdown notice sent; keep ticking so it flushes.
    ShuttingDown { remaining: Duration },
    /// Grace period over. The caller should shut the server down and exit.
    Terminate,
}

pub struct ServerHost<H: ServerHandler> {
    server: TransportServer<H>,
    config: HostConfig,
    inbox: Rc<RefCell<VecDeque<AgentSignal>>>,
    started_at: Option<Instant>,
    shutdown_deadline: Option<Instant>,
    logger: Arc<dyn Logger>,
}

impl<H: ServerHandler> ServerHost<H> {
    pub fn new(server: TransportServer<H>, config: HostConfig) -> Self {
        let logger = server.config().logger.clone();
        Self {
            server,
            config,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            started_at: None,
            shutdown_deadline: None,
            logger,
        }
    }

    /// Registers callbacks on `hub` that queue every signal for the next tick.
    pub fn attach(&self, hub: &mut SignalHub) {
        let inbox = self.inbox.clone();
        hub.on_server_active(move || inbox.borrow_mut().push_back(AgentSignal::ServerActive));
        let inbox = self.inbox.clone();
        hub.on_shutdown(move || inbox.borrow_mut().push_back(AgentSignal::Shutdown));
        let inbox = self.inbox.clone();
        hub.on_maintenance(move |at| inbox.borrow_mut().push_back(AgentSignal::Maintenance(at)));
        let inbox = self.inbox.clone();
        hub.on_agent_error(move |msg| {
            inbox
                .borrow_mut()
                .push_back(AgentSignal::AgentError(msg.to_string()))
        });
    }

    /// Queues a signal directly, bypassing any hub.
    pub fn signal(&self, signal: AgentSignal) {
        self.inbox.borrow_mut().push_back(signal);
    }

    pub fn init(&mut self, now: Instant) -> Result<()> {
        self.server.init()?;
        self.started_at = Some(now);
        if self.config.activate_on_start {
            self.server.start_server()?;
        }
        Ok(())
    }

    /// Applies queued signals, checks the session limit, pumps the server and
    /// reports where the shutdown process stands.
    pub fn tick(&mut self, now: Instant) -> Result<HostStatus> {
        let signals: Vec<AgentSignal> = self.inbox.borrow_mut().drain(..).collect();
        for signal in signals {
            self.apply(signal, now)?;
        }

        if let (Some(limit), Some(started)) = (self.config.session_limit, self.started_at) {
            if self.shutdown_deadline.is_none() && now.saturating_duration_since(started) >= limit {
                self.logger
                    .log(LogLevel::Info, "Session limit reached");
                self.begin_shutdown(now)?;
            }
        }

        self.server.tick()?;

        Ok(match self.shutdown_deadline {
            None => HostStatus::Running,
            Some(deadline) if now >= deadline => HostStatus::Terminate,
            Some(deadline) => HostStatus::ShuttingDown {
                remaining: deadline - now,
            },
        })
    }

    /// Broadcasts the shutdown notice and starts the grace period. Returns how
    /// many peers were notified; repeated calls notify nobody.
    pub fn begin_shutdown(&mut self, now: Instant) -> Result<usize> {
        if self.shutdown_deadline.is_some() {
            return Ok(0);
        }
        let sent = self.server.broadcast(&Notice::shutdown().to_bytes()?);
        self.shutdown_deadline = Some(now + self.config.grace_period);
        self.logger.log(
            LogLevel::Info,
            &format!("Server is shutting down, notified {} connections", sent),
        );
        Ok(sent)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_deadline.is_some()
    }

    pub fn server(&self) -> &TransportServer<H> {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut TransportServer<H> {
        &mut self.server
    }

    pub fn shutdown(&mut self) {
        self.server.shutdown();
    }

    fn apply(&mut self, signal: AgentSignal, now: Instant) -> Result<()> {
        match signal {
            AgentSignal::ServerActive => {
                self.server.start_server()?;
                self.logger
                    .log(LogLevel::Info, "Server started from agent activation");
            }
            AgentSignal::Shutdown => {
                self.begin_shutdown(now)?;
            }
            AgentSignal::Maintenance(at) => {
                self.logger.log(
                    LogLevel::Info,
                    &format!("Maintenance scheduled for: {}", at.to_rfc2822()),
                );
                self.server.broadcast(&Notice::maintenance(at).to_bytes()?);
            }
            AgentSignal::AgentError(message) => {
                self.logger
                    .log(LogLevel::Error, &format!("Agent error: {}", message));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn notices_encode_as_tagged_json() {
        let json = String::from_utf8(Notice::shutdown().to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"type":"shutdown","message":"Server is Shutting Down"}"#);

        let at = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();
        let bytes = Notice::maintenance(at).to_bytes().unwrap();
        let back: Notice = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, Notice::maintenance(at));
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "maintenance");
        assert_eq!(value["scheduled_utc"], "2031-06-01T12:00:00Z");
    }

    #[test]
    fn default_grace_is_five_seconds() {
        let config = HostConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert!(config.session_limit.is_none());
        assert!(!config.activate_on_start);
    }
}

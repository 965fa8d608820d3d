//! # loop-bridge
//! A single-threaded TCP transport bridge for hosts that own their own frame
//! loop (game servers, simulations, UI threads).
//!
//! Nothing blocks and nothing runs in the background. The host calls `tick()`
//! once per frame, and each tick pumps a [`mio`] reactor a bounded number of
//! times, stopping early as soon as an iteration finds nothing to do.
//! ## Features
//! - **Bounded cost per tick**: at most `max_ticks_per_frame` non-blocking pumps
//! - **Asynchronous close**: `dispose()` is always safe; `on_closed` follows on a later pump
//! - **Typed connection ids**: carried by the stream handle from creation
//! - **Injected callbacks**: handlers are bound before any I/O starts
//! - **Injected logging**: a [`Logger`](net::tcp::Logger) per component, `tracing` by default
//! ## Architecture Overview
//! ```text
//! ┌─────────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ TransportServer │───▶│  EventLoop  │───▶│ PollHandle  │
//! │ TransportClient │    └─────────────┘    └─────────────┘
//! └─────────────────┘           │
//!          │                    ▼
//!          ▼            ┌──────────────┐
//! ┌────────────────────┐│ StreamHandle │ (weak, per socket)
//! │ ConnectionRegistry │└──────────────┘
//! └────────────────────┘
//! ```
//! ## Quick Start
//!
//! ```rust,no_run
//! use loop_bridge::prelude::*;
//!
//! struct Printer;
//!
//! impl ClientHandler for Printer {
//!     fn on_data(&self, _stream: &StreamHandle, data: &[u8]) {
//!         println!("received {:?}", data);
//!     }
//! }
//!
//! fn main() -> loop_bridge::error::Result<()> {
//!     let mut client = TransportClient::new(TransportConfig::default(), Printer);
//!     client.init()?;
//!     client.connect("127.0.0.1")?;
//!
//!     for _ in 0..600 {
//!         client.tick()?;
//!         if client.is_connected() {
//!             client.send(&[0x01, 0x02]);
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(16));
//!     }
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! Lower level, the [`EventLoop`] can be driven directly with a
//! [`StreamHandler`] per stream and an [`Acceptor`] per listener.

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod host;
pub mod net;
pub mod poll;
pub mod reactor;
pub mod stream;

pub use error::NetworkError;
pub use handler::{Acceptor, StreamHandler};
pub use reactor::{pump_bounded, EventLoop, Pump};
pub use stream::{Incoming, StreamHandle, StreamPhase};

/// Re-exports of the types most callers need.
///
/// ```rust
/// use loop_bridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{AgentSignal, SignalHub};
    pub use crate::error::{NetworkError, Result};
    pub use crate::handler::{Acceptor, StreamHandler};
    pub use crate::host::{HostConfig, HostStatus, Notice, ServerHost};
    pub use crate::net::errors::NetworkEvent;
    pub use crate::net::tcp::{
        ClientHandler, ClientState, ConnectionId, ServerContext, ServerHandler,
        TransportClient, TransportConfig, TransportServer,
    };
    pub use crate::reactor::{self, EventLoop, Pump};
    pub use crate::stream::{Incoming, StreamHandle, StreamPhase};
}

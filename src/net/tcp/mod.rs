//! TCP server and client built on the bounded-pump event loop.
//!
//! Each accepted connection is assigned a [`ConnectionId`] from a counter
//! starting at 0. The server keeps the identifiers in a [`ConnectionRegistry`];
//! the event loop owns the sockets.
//!
//! ```text
//! Connection Storage:
//!   ConnectionRegistry (HashMap<ConnectionId, StreamHandle>)
//!        │
//!        ├──> ConnId(0) ──> StreamHandle { token, Weak<LoopState> }
//!        ├──> ConnId(1) ──> StreamHandle { token, Weak<LoopState> }
//!        └──> ConnId(N) ──> StreamHandle { token, Weak<LoopState> }
//! ```
//!
//! ## Event Handling Pipeline
//!
//! ```text
//! 1. Listener Events:
//!    Readable ──> Acceptor::on_accept(Incoming)
//!        - registry.accept() ──> next ConnectionId
//!        - Incoming::bind(id, handler) registers the socket
//!        - handler.on_connect(), NetworkEvent::ConnectionEstablished
//!
//! 2. Connection Events:
//!    Readable ──> read into the loop buffer ──> handler.on_data()
//!        - EOF: dispose
//!        - error: registry.remove(), handler.on_error(), dispose
//!
//! 3. Disconnection (next pump after dispose):
//!    StreamHandler::on_closed ──> registry.remove() (idempotent)
//!        - handler.on_disconnect(), NetworkEvent::ConnectionClosed
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use loop_bridge::net::tcp::TransportConfig;
//! # use std::sync::Arc;
//! # use loop_bridge::net::tcp::traits::NoOpLogger;
//!
//! let config = TransportConfig::builder()
//!     .port(7777)
//!     .max_ticks_per_frame(100)
//!     .no_delay(true)
//!     .logger(Arc::new(NoOpLogger))
//!     .build();
//! assert_eq!(config.read_buffer_size, 8192);
//! ```

pub mod client;
pub mod config;
pub mod registry;
pub mod server;
pub mod traits;

pub use client::{ClientState, TransportClient};
pub use config::{TransportConfig, TransportConfigBuilder};
pub use registry::ConnectionRegistry;
pub use server::{ServerContext, TransportServer};
pub use traits::{
    ClientHandler, ConnectionId, LogLevel, Logger, NoOpLogger, ServerHandler, TracingLogger,
};

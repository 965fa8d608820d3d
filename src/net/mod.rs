//! Server and client roles layered on the [`EventLoop`](crate::EventLoop).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    External driver (tick)                   │
//! │  ┌─────────────────┐         ┌──────────────────────┐       │
//! │  │ TransportServer │───────▶│ ServerHandler        │       │
//! │  │ TransportClient │───────▶│ ClientHandler        │       │
//! │  └─────────────────┘         └──────────────────────┘       │
//! └────────────┬───────────────────────▲────────────────────────┘
//!              │ tick(max)             │ callbacks
//!              ▼                       │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         EventLoop                           │
//! │  ┌──────────┐      ┌──────────────┐      ┌──────────────┐   │
//! │  │ closes   │────▶│ flushes      │────▶│ poll/dispatch│   │
//! │  └──────────┘      └──────────────┘      └──────────────┘   │
//! └────────────┬────────────────────────────────────────────────┘
//!              │ zero-timeout poll
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Operating System (epoll/kqueue/IOCP)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here spawns threads: every callback runs on the thread calling
//! `tick()`, and each `tick()` performs a bounded number of pump iterations.
//!
//! # Example
//!
//! ```rust,no_run
//! use loop_bridge::net::tcp::{ConnectionId, ServerContext, ServerHandler, TransportConfig, TransportServer};
//!
//! struct Echo;
//!
//! impl ServerHandler for Echo {
//!     fn on_data(&self, ctx: &ServerContext, conn_id: ConnectionId, data: &[u8]) {
//!         ctx.send_to(conn_id, data);
//!     }
//! }
//!
//! # fn main() -> loop_bridge::error::Result<()> {
//! let mut server = TransportServer::new(TransportConfig::default(), Echo);
//! server.init()?;
//! server.start_server()?;
//! loop {
//!     server.tick()?;
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # }
//! ```

pub mod errors;
pub mod tcp;

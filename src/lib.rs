//! IPMB message multiplexer
//!
//! Arbitrates a single management bus among multiple local processes.
//! Clients connect over loopback TCP, register with a one-byte handshake,
//! and exchange raw IPMB frames; the daemon correlates every reply to its
//! outstanding request so each one reaches exactly the requester that
//! asked, whether that requester sits on a socket or out on the bus.

pub mod app;
pub mod broker;
pub mod bus;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod server;

pub use app::{MuxApp, MuxCore};
pub use config::MuxConfig;
pub use error::{Error, Result};

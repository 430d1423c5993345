//! Remote menu connection engine.
//!
//! This crate maintains live command channels to embedded devices over
//! serial, TCP or UDP multicast, speaking the tag-value protocol from
//! `menulink-protocol` and synchronizing an externally owned
//! `menulink_tree::MenuTree`.
//!
//! The moving parts, leaves first:
//!
//! - transport connectors ([`SerialConnector`], [`SocketConnector`],
//!   [`UdpConnector`]) own the byte channel and produce reader/writer halves
//! - [`RemoteConnector`] drives one channel: connect/backoff loop,
//!   handshake, framed read pump, serialized writes, listener dispatch
//! - [`TickScheduler`] is the one shared timer: heartbeats, silence
//!   timeouts and correlation sweeps all run off its tick
//! - [`CorrelationTracker`] matches outbound commands to their
//!   acknowledgements
//! - [`RemoteMenuController`] is the facade wiring a connector to a menu
//!   tree and an application event listener
//!
//! Listener callbacks run on the connector's read thread; long-running work
//! must be handed off to another thread by the listener itself.

mod auth;
mod config;
mod connection;
mod controller;
mod correlation;
mod error;
mod pairing;
mod scheduler;
mod serial;
mod socket;
mod transport;
mod udp;

pub use auth::*;
pub use config::*;
pub use connection::*;
pub use controller::*;
pub use correlation::*;
pub use error::*;
pub use pairing::*;
pub use scheduler::*;
pub use serial::*;
pub use socket::*;
pub use transport::*;
pub use udp::*;

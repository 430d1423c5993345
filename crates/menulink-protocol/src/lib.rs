//! Menulink Remote Menu Protocol
//!
//! This crate provides types and utilities for the tag-value wire protocol
//! spoken between an embedded device and a remote application. Messages are
//! framed, optionally encrypted, textual records:
//!
//! ```text
//! +------+--------+--------+----------------------------------+
//! | 0x01 | len_hi | len_lo | payload[0..len]                  |
//! +------+--------+--------+----------------------------------+
//!
//! payload = msg_type(2 chars)  TAG=value|TAG=value|...  0x02
//! ```
//!
//! # Protocol Overview
//!
//! Every message is one [`MenuCommand`]: a handshake command (join, pairing
//! request, heartbeat), a synchronization command (bootstrap markers, boot
//! items), or an application command (value change, acknowledgement). The
//! codec is pure and performs no I/O; transports feed received bytes into a
//! [`FrameDecoder`] (or the [`ProtocolPipeline`] glue, which also applies
//! AES-CBC when a key is configured) and write the framed result of
//! [`MenuCommand::encode`] back out.
//!
//! # Example
//!
//! ```rust,ignore
//! use menulink_protocol::{LocalIdentifier, MenuCommand, ProtocolPipeline};
//!
//! let mut pipeline = ProtocolPipeline::plaintext();
//! let join = MenuCommand::join(LocalIdentifier::random("controller"));
//! let bytes = pipeline.encode_command(&join)?;
//!
//! pipeline.feed(&received);
//! while let Some(cmd) = pipeline.try_decode()? {
//!     // handle command
//! }
//! ```

mod commands;
mod constants;
mod crypto;
mod error;
mod frame;
mod tagval;
mod types;

pub use commands::*;
pub use constants::*;
pub use crypto::*;
pub use error::*;
pub use frame::*;
pub use tagval::*;
pub use types::*;

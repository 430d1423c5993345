//! The transport abstraction shared by all connector variants.

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::RemoteError;

/// How long a blocking read waits before returning so the pump can check
/// its stop and liveness flags.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The reader and writer halves of an open channel.
///
/// The reader is owned exclusively by the connector's read thread; the
/// writer lives behind the connector's write lock so frames from different
/// callers never interleave.
pub struct ChannelPair {
    /// Blocking reader half, configured with a short read timeout.
    pub reader: Box<dyn Read + Send>,
    /// Writer half.
    pub writer: Box<dyn Write + Send>,
}

/// Opens the underlying byte channel or socket for a connector.
///
/// Implementations are cheap to call repeatedly; the engine reconnects
/// through the same connector after a failure.
pub trait ChannelConnector: Send + Sync {
    /// Open the channel and split it into reader and writer halves.
    fn connect(&self) -> Result<ChannelPair, RemoteError>;

    /// Human-readable endpoint description for logs.
    fn description(&self) -> String;

    /// Whether a zero-length read means the peer closed the channel.
    ///
    /// Stream transports (serial, TCP) return true; datagram transports
    /// have no channel-level close and return false.
    fn stream_oriented(&self) -> bool {
        true
    }
}

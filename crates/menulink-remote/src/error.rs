//! Remote engine error types.

use thiserror::Error;

use menulink_protocol::ProtocolError;

/// Errors surfaced by the remote engine.
///
/// Nothing here terminates the hosting process: transport errors trigger
/// the reconnect policy, protocol errors are scoped to one message, and
/// handshake rejections close one connector. Once `start()` has returned,
/// ongoing failures are reported through connection and correlation
/// callbacks rather than as synchronous errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// I/O failure on the underlying channel.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A message could not be encoded, decoded or decrypted.
    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote's authenticator refused our identity.
    #[error("authentication rejected by remote")]
    AuthRejected,

    /// The remote refused the pairing request.
    #[error("pairing rejected by remote")]
    PairingRejected,

    /// The connector is not in the joined state.
    #[error("connector is not joined")]
    NotConnected,

    /// Configuration failed fast validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bounded wait elapsed.
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

//! Common types used in the protocol.

use std::fmt;

use rand::Rng;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Identifies one side of a connection. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentifier {
    uuid: Uuid,
    name: String,
}

impl LocalIdentifier {
    /// Create an identifier from an existing UUID and name.
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        LocalIdentifier {
            uuid,
            name: name.into(),
        }
    }

    /// Create an identifier with a freshly generated UUID.
    pub fn random(name: impl Into<String>) -> Self {
        LocalIdentifier {
            uuid: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// The UUID of this party.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The display name of this party.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for LocalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// An opaque token matching an outbound command to its acknowledgement.
///
/// Minted per command that expects an acknowledgement; the zero value is the
/// [`CorrelationId::EMPTY`] sentinel meaning fire-and-forget. On the wire a
/// correlation id is 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// The sentinel meaning "no correlation requested".
    pub const EMPTY: CorrelationId = CorrelationId(0);

    /// Mint a new random, non-empty correlation id.
    pub fn new_random() -> Self {
        let mut id = 0u64;
        while id == 0 {
            id = rand::thread_rng().gen();
        }
        CorrelationId(id)
    }

    /// Whether this is the fire-and-forget sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parse the 16-hex-character wire form.
    pub fn from_wire(s: &str) -> Result<Self, ProtocolError> {
        u64::from_str_radix(s, 16)
            .map(CorrelationId)
            .map_err(|_| ProtocolError::InvalidCorrelation(s.to_string()))
    }

    /// The 16-hex-character wire form.
    pub fn to_wire(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Status codes carried by an acknowledgement.
///
/// Codes at or above 10000 are synthesized locally (timeouts, connection
/// teardown) and never appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// The command was applied.
    Success,
    /// The value was outside the item's range.
    ValueOutOfRange,
    /// The addressed item id does not exist.
    IdNotFound,
    /// Authentication or pairing was refused.
    InvalidCredentials,
    /// Any other device-reported failure.
    UnknownError,
    /// Local synthetic: no acknowledgement arrived in time.
    Timeout,
    /// Local synthetic: the connection closed with the command outstanding.
    ConnectionClosed,
}

impl AckCode {
    /// The numeric wire code.
    pub fn code(&self) -> u16 {
        match self {
            AckCode::Success => 0,
            AckCode::ValueOutOfRange => 1,
            AckCode::IdNotFound => 2,
            AckCode::InvalidCredentials => 3,
            AckCode::UnknownError => 10000,
            AckCode::Timeout => 10001,
            AckCode::ConnectionClosed => 10002,
        }
    }

    /// Map a wire code; unrecognised codes become [`AckCode::UnknownError`].
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => AckCode::Success,
            1 => AckCode::ValueOutOfRange,
            2 => AckCode::IdNotFound,
            3 => AckCode::InvalidCredentials,
            10001 => AckCode::Timeout,
            10002 => AckCode::ConnectionClosed,
            _ => AckCode::UnknownError,
        }
    }

    /// Whether the code represents a failure.
    pub fn is_error(&self) -> bool {
        !matches!(self, AckCode::Success)
    }
}

/// The device's reply to a correlated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckStatus {
    /// The correlation id this acknowledges.
    pub correlation: CorrelationId,
    /// The reported status.
    pub code: AckCode,
}

impl AckStatus {
    /// Whether the acknowledgement reports a failure.
    pub fn is_error(&self) -> bool {
        self.code.is_error()
    }
}

/// Governs what the handshake performs once the channel is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Standard authentication against the device's trust store.
    FullyAuthenticated,
    /// One-shot pairing registration of the local identity.
    PairingConnection,
}

/// Platform codes reported in join messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiPlatform {
    /// 8-bit embedded board.
    Arduino8,
    /// 32-bit embedded board.
    Arduino32,
    /// ESP32 class board.
    Esp32,
    /// A desktop or server side API implementation.
    DesktopApi,
    /// A code this implementation does not know.
    Unknown(u8),
}

impl ApiPlatform {
    /// The numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            ApiPlatform::Arduino8 => 0,
            ApiPlatform::Arduino32 => 1,
            ApiPlatform::Esp32 => 2,
            ApiPlatform::DesktopApi => 3,
            ApiPlatform::Unknown(code) => *code,
        }
    }

    /// Map a wire code, keeping unknown codes for round-tripping.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ApiPlatform::Arduino8,
            1 => ApiPlatform::Arduino32,
            2 => ApiPlatform::Esp32,
            3 => ApiPlatform::DesktopApi,
            other => ApiPlatform::Unknown(other),
        }
    }
}

impl fmt::Display for ApiPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiPlatform::Arduino8 => write!(f, "Arduino 8-bit"),
            ApiPlatform::Arduino32 => write!(f, "Arduino 32-bit"),
            ApiPlatform::Esp32 => write!(f, "ESP32"),
            ApiPlatform::DesktopApi => write!(f, "desktop API"),
            ApiPlatform::Unknown(code) => write!(f, "unknown platform ({})", code),
        }
    }
}

/// What the remote party reported about itself after a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInformation {
    /// Remote display name.
    pub name: String,
    /// Protocol version (major * 100 + minor).
    pub version: u16,
    /// Remote platform.
    pub platform: ApiPlatform,
}

impl RemoteInformation {
    /// Version rendered as "major.minor".
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.version / 100, self.version % 100)
    }
}

/// Heartbeat sub-modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatMode {
    /// Periodic liveness message.
    Normal,
    /// Sent once when a connection is established; asks the peer to restart
    /// the exchange (join and bootstrap).
    Start,
    /// Orderly shutdown notice.
    End,
}

impl HeartbeatMode {
    /// The numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            HeartbeatMode::Normal => 0,
            HeartbeatMode::Start => 1,
            HeartbeatMode::End => 2,
        }
    }

    /// Map a wire code; unknown codes are treated as normal heartbeats.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => HeartbeatMode::Start,
            2 => HeartbeatMode::End,
            _ => HeartbeatMode::Normal,
        }
    }
}

/// How a value change is to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Relative adjustment of an integer value.
    Delta,
    /// Replacement of the current value.
    Absolute,
}

impl ChangeType {
    /// The numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            ChangeType::Delta => 0,
            ChangeType::Absolute => 1,
        }
    }

    /// Map a wire code; unknown codes are treated as absolute.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChangeType::Delta,
            _ => ChangeType::Absolute,
        }
    }
}

/// Bootstrap stream markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootType {
    /// The boot item stream is about to begin.
    Start,
    /// The boot item stream is complete.
    End,
}

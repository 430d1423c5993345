//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload ended before the end-of-message marker.
    #[error("message truncated before the end-of-message marker")]
    TruncatedMessage,

    /// The payload is larger than one frame can carry.
    #[error("message too long: maximum {max} bytes, got {actual}")]
    MessageTooLong {
        /// Maximum allowed payload length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// The two-character message type is not in the catalogue.
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// A field was structurally malformed (missing `=` or delimiter).
    #[error("malformed field at payload offset {0}")]
    MalformedField(usize),

    /// A mandatory field for the message type is absent.
    #[error("missing mandatory field {field}")]
    MissingField {
        /// The two-character tag that was expected.
        field: String,
    },

    /// A numeric field could not be parsed.
    #[error("field {field} has invalid numeric value {value:?}")]
    InvalidNumber {
        /// The two-character tag.
        field: String,
        /// The raw value received.
        value: String,
    },

    /// An encoder input contained a reserved delimiter byte.
    #[error("field {field} value contains a reserved delimiter byte")]
    ValueContainsDelimiter {
        /// The two-character tag.
        field: String,
    },

    /// A field value was not valid UTF-8.
    #[error("invalid UTF-8 in field value")]
    InvalidUtf8,

    /// A UUID field could not be parsed.
    #[error("invalid uuid {0:?}")]
    InvalidUuid(String),

    /// A correlation id field was not a valid hex token.
    #[error("invalid correlation id {0:?}")]
    InvalidCorrelation(String),

    /// An enumeration item carries more choices than the wire can encode.
    #[error("too many choices for an enum item: {0} (maximum 26)")]
    TooManyChoices(usize),

    /// Key material has an unsupported length.
    #[error("AES key must be 16 or 32 bytes, got {0}")]
    BadKeyLength(usize),

    /// An encrypt or decrypt operation failed.
    #[error("encryption failure: {0}")]
    Encryption(String),
}

//! Protocol constants
//!
//! These constants pin down the framing bytes, message type codes and field
//! tags of the tag-value wire protocol. They are the single authoritative
//! catalogue for this repository; both codec directions and every test are
//! written against them.

// ============================================================================
// Framing
// ============================================================================

/// Start-of-frame marker; also the resynchronization anchor after corruption.
pub const START_OF_FRAME: u8 = 0x01;
/// End-of-message marker terminating the tag-value sequence.
pub const END_OF_MESSAGE: u8 = 0x02;
/// Delimiter between `TAG=value` fields.
pub const FIELD_DELIMITER: u8 = b'|';
/// Separator between a tag and its value.
pub const TAG_SEPARATOR: u8 = b'=';
/// Maximum payload size carried by one frame.
pub const MAX_FRAME_SIZE: usize = 1024;
/// Frame header length: start byte plus the 2-byte big-endian length.
pub const FRAME_HEADER_LEN: usize = 3;

/// Protocol version reported in join messages (major * 100 + minor).
pub const PROTOCOL_VERSION: u16 = 100;

// ============================================================================
// Message type codes (two ASCII characters)
// ============================================================================

/// Join: identity exchange opening an authenticated session.
pub const MSG_JOIN: [u8; 2] = *b"NJ";
/// Heartbeat: periodic liveness message.
pub const MSG_HEARTBEAT: [u8; 2] = *b"HB";
/// Bootstrap: start/end marker bracketing the boot item stream.
pub const MSG_BOOTSTRAP: [u8; 2] = *b"BS";
/// Acknowledgement of a correlated command or of the handshake.
pub const MSG_ACKNOWLEDGEMENT: [u8; 2] = *b"AK";
/// Pairing request: one-shot identity registration.
pub const MSG_PAIRING_REQUEST: [u8; 2] = *b"PR";
/// Value change for a single item.
pub const MSG_CHANGE_VALUE: [u8; 2] = *b"VC";
/// Boot item: analog.
pub const MSG_BOOT_ANALOG: [u8; 2] = *b"BA";
/// Boot item: boolean.
pub const MSG_BOOT_BOOLEAN: [u8; 2] = *b"BB";
/// Boot item: enumeration.
pub const MSG_BOOT_ENUM: [u8; 2] = *b"BE";
/// Boot item: submenu.
pub const MSG_BOOT_SUBMENU: [u8; 2] = *b"BM";
/// Boot item: text.
pub const MSG_BOOT_TEXT: [u8; 2] = *b"BT";
/// Boot item: floating point.
pub const MSG_BOOT_FLOAT: [u8; 2] = *b"BF";
/// Boot item: action.
pub const MSG_BOOT_ACTION: [u8; 2] = *b"BC";

// ============================================================================
// Field tags (two ASCII characters)
// ============================================================================

/// Party or item display name.
pub const TAG_NAME: [u8; 2] = *b"NM";
/// Party UUID.
pub const TAG_UUID: [u8; 2] = *b"UU";
/// Protocol version (major * 100 + minor).
pub const TAG_VERSION: [u8; 2] = *b"VE";
/// Platform code of the sending party.
pub const TAG_PLATFORM: [u8; 2] = *b"PF";
/// Heartbeat interval in milliseconds.
pub const TAG_HB_INTERVAL: [u8; 2] = *b"HI";
/// Heartbeat mode.
pub const TAG_HB_MODE: [u8; 2] = *b"HM";
/// Bootstrap type (START/END).
pub const TAG_BOOT_TYPE: [u8; 2] = *b"BT";
/// Correlation id.
pub const TAG_CORRELATION: [u8; 2] = *b"IC";
/// Acknowledgement status code.
pub const TAG_ACK_STATUS: [u8; 2] = *b"ST";
/// Item id.
pub const TAG_ITEM_ID: [u8; 2] = *b"ID";
/// Parent item id.
pub const TAG_PARENT_ID: [u8; 2] = *b"PI";
/// Read-only flag (0/1).
pub const TAG_READONLY: [u8; 2] = *b"RO";
/// Change type (delta/absolute).
pub const TAG_CHANGE_TYPE: [u8; 2] = *b"TC";
/// Current or new value.
pub const TAG_CURRENT_VALUE: [u8; 2] = *b"VC";
/// Analog maximum value.
pub const TAG_ANALOG_MAX: [u8; 2] = *b"AM";
/// Analog display offset.
pub const TAG_ANALOG_OFFSET: [u8; 2] = *b"AO";
/// Analog display divisor.
pub const TAG_ANALOG_DIVISOR: [u8; 2] = *b"AD";
/// Analog unit suffix.
pub const TAG_ANALOG_UNIT: [u8; 2] = *b"AU";
/// Boolean naming code.
pub const TAG_BOOL_NAMING: [u8; 2] = *b"BN";
/// Number of enumeration choices.
pub const TAG_CHOICE_COUNT: [u8; 2] = *b"NC";
/// Maximum text length.
pub const TAG_MAX_LENGTH: [u8; 2] = *b"ML";
/// Floating point decimal places.
pub const TAG_DECIMAL_PLACES: [u8; 2] = *b"FD";

/// Maximum number of choices an enumeration item can carry on the wire;
/// choices use sequential tags `CA`, `CB`, ... `CZ`.
pub const MAX_ENUM_CHOICES: usize = 26;

/// The tag carrying the choice at `index` (0 = `CA`).
pub fn choice_tag(index: usize) -> [u8; 2] {
    debug_assert!(index < MAX_ENUM_CHOICES);
    [b'C', b'A' + index as u8]
}

// ============================================================================
// Bootstrap type values
// ============================================================================

/// Bootstrap start marker value.
pub const BOOT_TYPE_START: &str = "START";
/// Bootstrap end marker value.
pub const BOOT_TYPE_END: &str = "END";

// ============================================================================
// Encryption
// ============================================================================

/// AES block length in bytes.
pub const AES_BLOCK_LEN: usize = 16;
/// Length of the IV prepended to every encrypted payload.
pub const AES_IV_LEN: usize = 16;

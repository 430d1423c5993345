//! Commands exchanged between the two parties.
//!
//! Every wire message is one [`MenuCommand`]. Commands are immutable value
//! objects; construct them through the provided constructors (or struct
//! literals in tests) and never mutate them afterwards.

use uuid::Uuid;

use menulink_tree::{
    ActionItem, AnalogItem, BooleanItem, BooleanNaming, EnumerationItem, FloatItem, SubMenuItem,
    TextItem,
};

use crate::constants::*;
use crate::error::ProtocolError;
use crate::tagval::{tag_name, TagParser, TagWriter};
use crate::types::*;

/// Commands exchanged between a device and a remote application.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuCommand {
    /// Identity exchange opening a session. Sent by both parties.
    Join {
        /// Identity of the sending party.
        identity: LocalIdentifier,
        /// Protocol version of the sending party (major * 100 + minor).
        version: u16,
        /// Platform of the sending party.
        platform: ApiPlatform,
    },

    /// Periodic liveness message.
    Heartbeat {
        /// The sender's heartbeat interval in milliseconds.
        interval_ms: u32,
        /// Heartbeat sub-mode.
        mode: HeartbeatMode,
    },

    /// Marker bracketing the boot item stream.
    Bootstrap {
        /// Whether the stream starts or ends.
        boot_type: BootType,
    },

    /// Reply to a correlated command, or the handshake verdict.
    Acknowledgement {
        /// The correlation this acknowledges; empty for handshake acks.
        correlation: CorrelationId,
        /// Status code.
        code: AckCode,
    },

    /// One-shot registration of the sender with the device's trust store.
    PairingRequest {
        /// Identity to register.
        identity: LocalIdentifier,
    },

    /// Change the value of one item.
    ChangeValue {
        /// Correlation for the expected acknowledgement; empty means
        /// fire-and-forget.
        correlation: CorrelationId,
        /// The addressed item.
        item_id: u16,
        /// Delta or absolute.
        change_type: ChangeType,
        /// The new value (or delta) in its textual wire form.
        value: String,
    },

    /// Boot item: analog.
    AnalogBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: AnalogItem,
        /// Current raw value.
        current: i32,
    },

    /// Boot item: boolean.
    BooleanBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: BooleanItem,
        /// Current value.
        current: bool,
    },

    /// Boot item: enumeration.
    EnumBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: EnumerationItem,
        /// Current choice index.
        current: u16,
    },

    /// Boot item: submenu.
    SubMenuBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: SubMenuItem,
    },

    /// Boot item: text.
    TextBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: TextItem,
        /// Current text.
        current: String,
    },

    /// Boot item: floating point.
    FloatBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: FloatItem,
        /// Current value.
        current: f32,
    },

    /// Boot item: action.
    ActionBootItem {
        /// Parent submenu id.
        parent_id: u16,
        /// The item definition.
        item: ActionItem,
    },
}

impl MenuCommand {
    /// Convenience constructor for a join message from this implementation.
    pub fn join(identity: LocalIdentifier) -> Self {
        MenuCommand::Join {
            identity,
            version: PROTOCOL_VERSION,
            platform: ApiPlatform::DesktopApi,
        }
    }

    /// Convenience constructor for a heartbeat.
    pub fn heartbeat(interval_ms: u32, mode: HeartbeatMode) -> Self {
        MenuCommand::Heartbeat { interval_ms, mode }
    }

    /// Convenience constructor for an acknowledgement.
    pub fn ack(correlation: CorrelationId, code: AckCode) -> Self {
        MenuCommand::Acknowledgement { correlation, code }
    }

    /// The two-character message type code for this command.
    pub fn type_code(&self) -> [u8; 2] {
        match self {
            MenuCommand::Join { .. } => MSG_JOIN,
            MenuCommand::Heartbeat { .. } => MSG_HEARTBEAT,
            MenuCommand::Bootstrap { .. } => MSG_BOOTSTRAP,
            MenuCommand::Acknowledgement { .. } => MSG_ACKNOWLEDGEMENT,
            MenuCommand::PairingRequest { .. } => MSG_PAIRING_REQUEST,
            MenuCommand::ChangeValue { .. } => MSG_CHANGE_VALUE,
            MenuCommand::AnalogBootItem { .. } => MSG_BOOT_ANALOG,
            MenuCommand::BooleanBootItem { .. } => MSG_BOOT_BOOLEAN,
            MenuCommand::EnumBootItem { .. } => MSG_BOOT_ENUM,
            MenuCommand::SubMenuBootItem { .. } => MSG_BOOT_SUBMENU,
            MenuCommand::TextBootItem { .. } => MSG_BOOT_TEXT,
            MenuCommand::FloatBootItem { .. } => MSG_BOOT_FLOAT,
            MenuCommand::ActionBootItem { .. } => MSG_BOOT_ACTION,
        }
    }

    /// The correlation id carried by this command, if the kind has one.
    pub fn correlation(&self) -> Option<CorrelationId> {
        match self {
            MenuCommand::Acknowledgement { correlation, .. }
            | MenuCommand::ChangeValue { correlation, .. } => Some(*correlation),
            _ => None,
        }
    }

    /// Encode the command to its tag-value payload.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut w = TagWriter::new(self.type_code());

        match self {
            MenuCommand::Join {
                identity,
                version,
                platform,
            } => {
                w.field(TAG_NAME, identity.name())?;
                w.field_fmt(TAG_UUID, identity.uuid())?;
                w.field_fmt(TAG_VERSION, version)?;
                w.field_fmt(TAG_PLATFORM, platform.code())?;
            }

            MenuCommand::Heartbeat { interval_ms, mode } => {
                w.field_fmt(TAG_HB_INTERVAL, interval_ms)?;
                w.field_fmt(TAG_HB_MODE, mode.code())?;
            }

            MenuCommand::Bootstrap { boot_type } => {
                let value = match boot_type {
                    BootType::Start => BOOT_TYPE_START,
                    BootType::End => BOOT_TYPE_END,
                };
                w.field(TAG_BOOT_TYPE, value)?;
            }

            MenuCommand::Acknowledgement { correlation, code } => {
                if !correlation.is_empty() {
                    w.field(TAG_CORRELATION, &correlation.to_wire())?;
                }
                w.field_fmt(TAG_ACK_STATUS, code.code())?;
            }

            MenuCommand::PairingRequest { identity } => {
                w.field(TAG_NAME, identity.name())?;
                w.field_fmt(TAG_UUID, identity.uuid())?;
            }

            MenuCommand::ChangeValue {
                correlation,
                item_id,
                change_type,
                value,
            } => {
                if !correlation.is_empty() {
                    w.field(TAG_CORRELATION, &correlation.to_wire())?;
                }
                w.field_fmt(TAG_ITEM_ID, item_id)?;
                w.field_fmt(TAG_CHANGE_TYPE, change_type.code())?;
                w.field(TAG_CURRENT_VALUE, value)?;
            }

            MenuCommand::AnalogBootItem {
                parent_id,
                item,
                current,
            } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
                w.field_fmt(TAG_ANALOG_MAX, item.max_value)?;
                w.field_fmt(TAG_ANALOG_OFFSET, item.offset)?;
                w.field_fmt(TAG_ANALOG_DIVISOR, item.divisor)?;
                w.field(TAG_ANALOG_UNIT, &item.unit)?;
                w.field_fmt(TAG_CURRENT_VALUE, current)?;
            }

            MenuCommand::BooleanBootItem {
                parent_id,
                item,
                current,
            } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
                w.field_fmt(TAG_BOOL_NAMING, item.naming.code())?;
                w.field_fmt(TAG_CURRENT_VALUE, u8::from(*current))?;
            }

            MenuCommand::EnumBootItem {
                parent_id,
                item,
                current,
            } => {
                if item.choices.len() > MAX_ENUM_CHOICES {
                    return Err(ProtocolError::TooManyChoices(item.choices.len()));
                }
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
                w.field_fmt(TAG_CHOICE_COUNT, item.choices.len())?;
                for (index, choice) in item.choices.iter().enumerate() {
                    w.field(choice_tag(index), choice)?;
                }
                w.field_fmt(TAG_CURRENT_VALUE, current)?;
            }

            MenuCommand::SubMenuBootItem { parent_id, item } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
            }

            MenuCommand::TextBootItem {
                parent_id,
                item,
                current,
            } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
                w.field_fmt(TAG_MAX_LENGTH, item.max_length)?;
                w.field(TAG_CURRENT_VALUE, current)?;
            }

            MenuCommand::FloatBootItem {
                parent_id,
                item,
                current,
            } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
                w.field_fmt(TAG_DECIMAL_PLACES, item.decimal_places)?;
                w.field_fmt(TAG_CURRENT_VALUE, current)?;
            }

            MenuCommand::ActionBootItem { parent_id, item } => {
                encode_boot_common(&mut w, *parent_id, item.id, &item.name, item.read_only)?;
            }
        }

        Ok(w.finish())
    }

    /// Decode a command from its tag-value payload.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let p = TagParser::parse(payload)?;

        match p.msg_type() {
            MSG_JOIN => {
                let name = p.required(TAG_NAME)?.to_string();
                let uuid = parse_uuid(p.required(TAG_UUID)?)?;
                let version = p.required_num::<u16>(TAG_VERSION)?;
                let platform = ApiPlatform::from_code(p.required_num::<u8>(TAG_PLATFORM)?);
                Ok(MenuCommand::Join {
                    identity: LocalIdentifier::new(uuid, name),
                    version,
                    platform,
                })
            }

            MSG_HEARTBEAT => Ok(MenuCommand::Heartbeat {
                interval_ms: p.required_num::<u32>(TAG_HB_INTERVAL)?,
                mode: HeartbeatMode::from_code(p.required_num::<u8>(TAG_HB_MODE)?),
            }),

            MSG_BOOTSTRAP => {
                let raw = p.required(TAG_BOOT_TYPE)?;
                let boot_type = match raw {
                    BOOT_TYPE_START => BootType::Start,
                    BOOT_TYPE_END => BootType::End,
                    other => {
                        return Err(ProtocolError::InvalidNumber {
                            field: tag_name(TAG_BOOT_TYPE),
                            value: other.to_string(),
                        })
                    }
                };
                Ok(MenuCommand::Bootstrap { boot_type })
            }

            MSG_ACKNOWLEDGEMENT => Ok(MenuCommand::Acknowledgement {
                correlation: parse_correlation(&p)?,
                code: AckCode::from_code(p.required_num::<u16>(TAG_ACK_STATUS)?),
            }),

            MSG_PAIRING_REQUEST => {
                let name = p.required(TAG_NAME)?.to_string();
                let uuid = parse_uuid(p.required(TAG_UUID)?)?;
                Ok(MenuCommand::PairingRequest {
                    identity: LocalIdentifier::new(uuid, name),
                })
            }

            MSG_CHANGE_VALUE => Ok(MenuCommand::ChangeValue {
                correlation: parse_correlation(&p)?,
                item_id: p.required_num::<u16>(TAG_ITEM_ID)?,
                change_type: ChangeType::from_code(p.required_num::<u8>(TAG_CHANGE_TYPE)?),
                value: p.required(TAG_CURRENT_VALUE)?.to_string(),
            }),

            MSG_BOOT_ANALOG => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::AnalogBootItem {
                    parent_id,
                    item: AnalogItem {
                        id,
                        name,
                        read_only,
                        max_value: p.required_num::<u16>(TAG_ANALOG_MAX)?,
                        offset: p.required_num::<i16>(TAG_ANALOG_OFFSET)?,
                        divisor: p.required_num::<u16>(TAG_ANALOG_DIVISOR)?,
                        unit: p.required(TAG_ANALOG_UNIT)?.to_string(),
                    },
                    current: p.required_num::<i32>(TAG_CURRENT_VALUE)?,
                })
            }

            MSG_BOOT_BOOLEAN => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::BooleanBootItem {
                    parent_id,
                    item: BooleanItem {
                        id,
                        name,
                        read_only,
                        naming: BooleanNaming::from_code(p.required_num::<u8>(TAG_BOOL_NAMING)?),
                    },
                    current: p.required_bool(TAG_CURRENT_VALUE)?,
                })
            }

            MSG_BOOT_ENUM => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                let count = p.required_num::<usize>(TAG_CHOICE_COUNT)?;
                if count > MAX_ENUM_CHOICES {
                    return Err(ProtocolError::TooManyChoices(count));
                }
                let mut choices = Vec::with_capacity(count);
                for index in 0..count {
                    choices.push(p.required(choice_tag(index))?.to_string());
                }
                Ok(MenuCommand::EnumBootItem {
                    parent_id,
                    item: EnumerationItem {
                        id,
                        name,
                        read_only,
                        choices,
                    },
                    current: p.required_num::<u16>(TAG_CURRENT_VALUE)?,
                })
            }

            MSG_BOOT_SUBMENU => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::SubMenuBootItem {
                    parent_id,
                    item: SubMenuItem { id, name, read_only },
                })
            }

            MSG_BOOT_TEXT => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::TextBootItem {
                    parent_id,
                    item: TextItem {
                        id,
                        name,
                        read_only,
                        max_length: p.required_num::<u16>(TAG_MAX_LENGTH)?,
                    },
                    current: p.required(TAG_CURRENT_VALUE)?.to_string(),
                })
            }

            MSG_BOOT_FLOAT => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::FloatBootItem {
                    parent_id,
                    item: FloatItem {
                        id,
                        name,
                        read_only,
                        decimal_places: p.required_num::<u8>(TAG_DECIMAL_PLACES)?,
                    },
                    current: p.required_f32(TAG_CURRENT_VALUE)?,
                })
            }

            MSG_BOOT_ACTION => {
                let (parent_id, id, name, read_only) = decode_boot_common(&p)?;
                Ok(MenuCommand::ActionBootItem {
                    parent_id,
                    item: ActionItem { id, name, read_only },
                })
            }

            other => Err(ProtocolError::UnknownMessageType(tag_name(other))),
        }
    }
}

fn encode_boot_common(
    w: &mut TagWriter,
    parent_id: u16,
    id: u16,
    name: &str,
    read_only: bool,
) -> Result<(), ProtocolError> {
    w.field_fmt(TAG_PARENT_ID, parent_id)?;
    w.field_fmt(TAG_ITEM_ID, id)?;
    w.field(TAG_NAME, name)?;
    w.field_fmt(TAG_READONLY, u8::from(read_only))?;
    Ok(())
}

fn decode_boot_common(p: &TagParser) -> Result<(u16, u16, String, bool), ProtocolError> {
    Ok((
        p.required_num::<u16>(TAG_PARENT_ID)?,
        p.required_num::<u16>(TAG_ITEM_ID)?,
        p.required(TAG_NAME)?.to_string(),
        p.required_bool(TAG_READONLY)?,
    ))
}

fn parse_uuid(raw: &str) -> Result<Uuid, ProtocolError> {
    Uuid::parse_str(raw).map_err(|_| ProtocolError::InvalidUuid(raw.to_string()))
}

/// Correlation is optional on the wire; absence means fire-and-forget.
fn parse_correlation(p: &TagParser) -> Result<CorrelationId, ProtocolError> {
    match p.value(TAG_CORRELATION) {
        None => Ok(CorrelationId::EMPTY),
        Some(raw) => CorrelationId::from_wire(raw),
    }
}

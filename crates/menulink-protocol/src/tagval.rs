//! Tag-value field writer and parser.
//!
//! Payloads are a two-character message type followed by `TAG=value` pairs
//! separated by [`FIELD_DELIMITER`] and terminated by [`END_OF_MESSAGE`].
//! Tags are fixed two-character codes. The parser skips tags it does not
//! know (forward compatibility) but fails closed when a mandatory tag is
//! missing; the writer fails closed when a value contains a reserved byte.

use std::fmt;

use crate::constants::*;
use crate::error::ProtocolError;

/// Render a two-character tag for error messages.
pub(crate) fn tag_name(tag: [u8; 2]) -> String {
    String::from_utf8_lossy(&tag).into_owned()
}

/// Builds one tag-value payload.
pub struct TagWriter {
    buf: Vec<u8>,
}

impl TagWriter {
    /// Start a payload for the given message type.
    pub fn new(msg_type: [u8; 2]) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&msg_type);
        TagWriter { buf }
    }

    /// Append a string field. Fails if the value contains a reserved byte.
    pub fn field(&mut self, tag: [u8; 2], value: &str) -> Result<(), ProtocolError> {
        if value
            .bytes()
            .any(|b| b == FIELD_DELIMITER || b == END_OF_MESSAGE || b == START_OF_FRAME)
        {
            return Err(ProtocolError::ValueContainsDelimiter {
                field: tag_name(tag),
            });
        }
        self.buf.extend_from_slice(&tag);
        self.buf.push(TAG_SEPARATOR);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(FIELD_DELIMITER);
        Ok(())
    }

    /// Append a field rendered through `Display` (numbers, uuids).
    ///
    /// Display output of the types used on the wire never contains reserved
    /// bytes, but the same check as [`TagWriter::field`] still applies.
    pub fn field_fmt(&mut self, tag: [u8; 2], value: impl fmt::Display) -> Result<(), ProtocolError> {
        self.field(tag, &value.to_string())
    }

    /// Terminate the payload and return it.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(END_OF_MESSAGE);
        self.buf
    }
}

/// Parses one tag-value payload into its fields.
#[derive(Debug)]
pub struct TagParser {
    msg_type: [u8; 2],
    fields: Vec<([u8; 2], String)>,
}

impl TagParser {
    /// Parse a payload. Unknown tags are retained so lookups simply miss.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 3 {
            return Err(ProtocolError::TruncatedMessage);
        }
        let msg_type = [payload[0], payload[1]];
        let mut fields = Vec::new();
        let mut pos = 2;

        loop {
            match payload.get(pos) {
                None => return Err(ProtocolError::TruncatedMessage),
                Some(&END_OF_MESSAGE) => break,
                Some(_) => {}
            }
            // tag (2 bytes) + '='
            if pos + 3 > payload.len() {
                return Err(ProtocolError::TruncatedMessage);
            }
            let tag = [payload[pos], payload[pos + 1]];
            if payload[pos + 2] != TAG_SEPARATOR {
                return Err(ProtocolError::MalformedField(pos));
            }
            pos += 3;
            let value_start = pos;
            loop {
                match payload.get(pos) {
                    None => return Err(ProtocolError::TruncatedMessage),
                    Some(&FIELD_DELIMITER) => break,
                    Some(&END_OF_MESSAGE) => return Err(ProtocolError::MalformedField(pos)),
                    Some(_) => pos += 1,
                }
            }
            let value = std::str::from_utf8(&payload[value_start..pos])
                .map_err(|_| ProtocolError::InvalidUtf8)?
                .to_string();
            fields.push((tag, value));
            pos += 1; // consume the delimiter
        }

        Ok(TagParser { msg_type, fields })
    }

    /// The two-character message type code.
    pub fn msg_type(&self) -> [u8; 2] {
        self.msg_type
    }

    /// Look up a field value by tag.
    pub fn value(&self, tag: [u8; 2]) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a mandatory field value by tag.
    pub fn required(&self, tag: [u8; 2]) -> Result<&str, ProtocolError> {
        self.value(tag).ok_or_else(|| ProtocolError::MissingField {
            field: tag_name(tag),
        })
    }

    /// Parse a mandatory numeric field (ASCII decimal or `0x`-prefixed hex).
    pub fn required_num<T>(&self, tag: [u8; 2]) -> Result<T, ProtocolError>
    where
        T: TryFrom<i64>,
    {
        let raw = self.required(tag)?;
        parse_wire_num(raw)
            .and_then(|n| T::try_from(n).ok())
            .ok_or_else(|| ProtocolError::InvalidNumber {
                field: tag_name(tag),
                value: raw.to_string(),
            })
    }

    /// Parse an optional numeric field.
    pub fn optional_num<T>(&self, tag: [u8; 2]) -> Result<Option<T>, ProtocolError>
    where
        T: TryFrom<i64>,
    {
        match self.value(tag) {
            None => Ok(None),
            Some(raw) => parse_wire_num(raw)
                .and_then(|n| T::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| ProtocolError::InvalidNumber {
                    field: tag_name(tag),
                    value: raw.to_string(),
                }),
        }
    }

    /// Parse a mandatory boolean field (0/1).
    pub fn required_bool(&self, tag: [u8; 2]) -> Result<bool, ProtocolError> {
        Ok(self.required_num::<u8>(tag)? != 0)
    }

    /// Parse a mandatory floating point field.
    pub fn required_f32(&self, tag: [u8; 2]) -> Result<f32, ProtocolError> {
        let raw = self.required(tag)?;
        raw.parse::<f32>().map_err(|_| ProtocolError::InvalidNumber {
            field: tag_name(tag),
            value: raw.to_string(),
        })
    }
}

/// Parse a wire number: ASCII decimal, or hex with a `0x` prefix.
fn parse_wire_num(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<i64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_builds_payload() {
        let mut w = TagWriter::new(*b"NJ");
        w.field(*b"NM", "Tester").unwrap();
        w.field_fmt(*b"VE", 103).unwrap();
        let payload = w.finish();
        assert_eq!(payload, b"NJNM=Tester|VE=103|\x02");
    }

    #[test]
    fn test_writer_rejects_reserved_bytes() {
        let mut w = TagWriter::new(*b"NJ");
        let err = w.field(*b"NM", "bad|name").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ValueContainsDelimiter {
                field: "NM".to_string()
            }
        );
        assert!(w.field(*b"NM", "bad\x02name").is_err());
    }

    #[test]
    fn test_parser_reads_fields() {
        let p = TagParser::parse(b"NJNM=Tester|VE=103|\x02").unwrap();
        assert_eq!(p.msg_type(), *b"NJ");
        assert_eq!(p.value(*b"NM"), Some("Tester"));
        assert_eq!(p.required_num::<u16>(*b"VE").unwrap(), 103);
    }

    #[test]
    fn test_parser_skips_unknown_tags() {
        let p = TagParser::parse(b"NJZZ=future|NM=Tester|\x02").unwrap();
        assert_eq!(p.value(*b"NM"), Some("Tester"));
        assert_eq!(p.value(*b"QQ"), None);
    }

    #[test]
    fn test_parser_missing_field_fails_closed() {
        let p = TagParser::parse(b"NJVE=103|\x02").unwrap();
        let err = p.required(*b"NM").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                field: "NM".to_string()
            }
        );
    }

    #[test]
    fn test_parser_truncated_payload() {
        // no end marker
        let err = TagParser::parse(b"NJNM=Tester|").unwrap_err();
        assert_eq!(err, ProtocolError::TruncatedMessage);
        let err = TagParser::parse(b"NJ").unwrap_err();
        assert_eq!(err, ProtocolError::TruncatedMessage);
    }

    #[test]
    fn test_parser_empty_value() {
        let p = TagParser::parse(b"HBNM=|\x02").unwrap();
        assert_eq!(p.value(*b"NM"), Some(""));
    }

    #[test]
    fn test_hex_numbers_accepted() {
        let p = TagParser::parse(b"VCID=0x2A|\x02").unwrap();
        assert_eq!(p.required_num::<u16>(*b"ID").unwrap(), 42);
    }

    #[test]
    fn test_negative_numbers_accepted() {
        let p = TagParser::parse(b"BAAO=-128|\x02").unwrap();
        assert_eq!(p.required_num::<i16>(*b"AO").unwrap(), -128);
    }

    #[test]
    fn test_bad_number_reported() {
        let p = TagParser::parse(b"VCID=forty|\x02").unwrap();
        let err = p.required_num::<u16>(*b"ID").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidNumber {
                field: "ID".to_string(),
                value: "forty".to_string()
            }
        );
    }
}

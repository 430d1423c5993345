//! Frame encoding/decoding utilities.
//!
//! Each frame is a start-of-frame byte, a 2-byte big-endian payload length
//! and the payload itself:
//!
//! ```text
//! +------+--------+--------+-------------------+
//! | 0x01 | len_hi | len_lo | payload[0..len]   |
//! +------+--------+--------+-------------------+
//! ```
//!
//! The start byte anchors resynchronization: the decoder scans for it,
//! discarding any preceding garbage, and a length field larger than
//! [`MAX_FRAME_SIZE`] is treated as a corrupted prefix rather than a frame
//! to wait for. When encryption is configured the payload is
//! `IV(16) || ciphertext` and the length covers both.

use bytes::{Buf, BytesMut};

use crate::commands::MenuCommand;
use crate::constants::{FRAME_HEADER_LEN, MAX_FRAME_SIZE, START_OF_FRAME};
use crate::crypto::AesKey;
use crate::error::ProtocolError;

/// Accumulates received bytes and extracts complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder.
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a complete frame payload from the buffer.
    ///
    /// Returns `Some(payload)` if a complete frame is available, or `None`
    /// if more data is needed.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        loop {
            // Scan for the start byte, discarding any preceding garbage
            let mut discarded = 0usize;
            while !self.buffer.is_empty() && self.buffer[0] != START_OF_FRAME {
                self.buffer.advance(1);
                discarded += 1;
            }
            if discarded > 0 {
                log::debug!("discarded {} bytes before start of frame", discarded);
            }

            if self.buffer.len() < FRAME_HEADER_LEN {
                return None;
            }

            let len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;

            // An implausible length means the prefix was corrupted; drop the
            // start byte and rescan instead of waiting for bytes that will
            // never arrive.
            if len > MAX_FRAME_SIZE {
                log::warn!("implausible frame length {}, resynchronizing", len);
                self.buffer.advance(1);
                continue;
            }

            if self.buffer.len() < FRAME_HEADER_LEN + len {
                return None;
            }

            self.buffer.advance(FRAME_HEADER_LEN);
            let payload = self.buffer.split_to(len).to_vec();
            return Some(payload);
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Encode a payload with the frame header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLong {
            max: MAX_FRAME_SIZE,
            actual: payload.len(),
        });
    }
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.push(START_OF_FRAME);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Composes framing, optional encryption and the command codec.
///
/// This is the stateful receive/transmit glue a transport drives: feed
/// received bytes in, pull decoded commands out, and frame outgoing
/// commands. A decode or decrypt failure consumes only the offending frame;
/// calling [`ProtocolPipeline::try_decode`] again continues with the next
/// one.
pub struct ProtocolPipeline {
    decoder: FrameDecoder,
    key: Option<AesKey>,
}

impl ProtocolPipeline {
    /// Create a pipeline, optionally encrypting with the given key.
    pub fn new(key: Option<AesKey>) -> Self {
        ProtocolPipeline {
            decoder: FrameDecoder::new(),
            key,
        }
    }

    /// Create a pipeline without encryption.
    pub fn plaintext() -> Self {
        Self::new(None)
    }

    /// Encode a command for transmission: codec, then encryption, then
    /// framing.
    pub fn encode_command(&self, command: &MenuCommand) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = command.encode()?;
        if let Some(key) = &self.key {
            payload = key.encrypt(&payload)?;
        }
        encode_frame(&payload)
    }

    /// Feed received data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.decoder.push(data);
    }

    /// Try to decode the next command.
    ///
    /// Returns `Ok(Some(command))` if a complete command was decoded,
    /// `Ok(None)` if more data is needed, or `Err` if the next frame failed
    /// to decrypt or decode (the frame is already consumed).
    pub fn try_decode(&mut self) -> Result<Option<MenuCommand>, ProtocolError> {
        match self.decoder.decode() {
            Some(frame) => {
                let payload = match &self.key {
                    Some(key) => key.decrypt(&frame)?,
                    None => frame,
                };
                // Trailing zero padding after the end-of-message marker is
                // ignored by the parser.
                Ok(Some(MenuCommand::decode(&payload)?))
            }
            None => Ok(None),
        }
    }

    /// Reset the receive state.
    pub fn reset(&mut self) {
        self.decoder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CorrelationId, HeartbeatMode};

    #[test]
    fn test_frame_roundtrip() {
        let payload = b"HBHI=5000|HM=0|\x02";
        let framed = encode_frame(payload).unwrap();
        assert_eq!(framed[0], START_OF_FRAME);
        assert_eq!(framed[1], 0);
        assert_eq!(framed[2], payload.len() as u8);

        let mut decoder = FrameDecoder::new();
        decoder.push(&framed);
        assert_eq!(decoder.decode().unwrap(), payload);
        assert!(decoder.decode().is_none());
    }

    #[test]
    fn test_partial_frame() {
        let framed = encode_frame(b"some payload").unwrap();
        let mut decoder = FrameDecoder::new();

        decoder.push(&framed[..5]);
        assert!(decoder.decode().is_none());

        decoder.push(&framed[5..]);
        assert_eq!(decoder.decode().unwrap(), b"some payload");
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let one = encode_frame(b"first").unwrap();
        let two = encode_frame(b"second").unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&one);
        decoder.push(&two);

        assert_eq!(decoder.decode().unwrap(), b"first");
        assert_eq!(decoder.decode().unwrap(), b"second");
        assert!(decoder.decode().is_none());
    }

    #[test]
    fn test_garbage_before_frame_is_skipped() {
        let framed = encode_frame(b"payload").unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\xFF\xFE\x7Fnoise");
        decoder.push(&framed);
        assert_eq!(decoder.decode().unwrap(), b"payload");
    }

    #[test]
    fn test_corrupted_length_prefix_recovers() {
        // A start byte followed by an absurd length must not wedge the
        // decoder; the next valid frame decodes normally.
        let mut corrupted = vec![START_OF_FRAME, 0xFF, 0xFF];
        corrupted.extend_from_slice(&encode_frame(b"valid frame").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&corrupted);
        assert_eq!(decoder.decode().unwrap(), b"valid frame");
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let big = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_frame(&big),
            Err(ProtocolError::MessageTooLong { .. })
        ));
    }

    #[test]
    fn test_pipeline_plaintext_roundtrip() {
        let mut pipeline = ProtocolPipeline::plaintext();
        let cmd = MenuCommand::heartbeat(5000, HeartbeatMode::Normal);
        let framed = pipeline.encode_command(&cmd).unwrap();

        pipeline.feed(&framed);
        assert_eq!(pipeline.try_decode().unwrap(), Some(cmd));
        assert_eq!(pipeline.try_decode().unwrap(), None);
    }

    #[test]
    fn test_pipeline_encrypted_roundtrip() {
        let key = crate::crypto::generate_aes_key();
        let mut pipeline = ProtocolPipeline::new(Some(key));
        let cmd = MenuCommand::ack(CorrelationId::new_random(), crate::types::AckCode::Success);
        let framed = pipeline.encode_command(&cmd).unwrap();

        pipeline.feed(&framed);
        assert_eq!(pipeline.try_decode().unwrap(), Some(cmd));
    }

    #[test]
    fn test_pipeline_bad_frame_does_not_desync() {
        let mut pipeline = ProtocolPipeline::plaintext();
        let good = pipeline
            .encode_command(&MenuCommand::heartbeat(5000, HeartbeatMode::Normal))
            .unwrap();

        // a frame that is valid at the framing layer but not decodable
        let bad = encode_frame(b"??nonsense\x02").unwrap();
        pipeline.feed(&bad);
        pipeline.feed(&good);

        assert!(pipeline.try_decode().is_err());
        assert!(pipeline.try_decode().unwrap().is_some());
    }
}

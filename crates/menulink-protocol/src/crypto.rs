//! Optional AES-CBC payload encryption.
//!
//! Encryption is a transparent transform between the codec and the framing
//! layer: `encrypt` produces `IV(16) || ciphertext` with a fresh random IV
//! per call, and `decrypt` reverses it. The plaintext is zero-padded to a
//! 16-byte multiple before encryption; the tag-value end-of-message marker,
//! not padding removal, recovers the true content length after decryption.
//!
//! Keys are pre-shared 16- or 32-byte AES keys, exchanged out of band
//! (usually Base64-encoded). There is no key exchange protocol; this is
//! confidentiality-only between two parties that already share a key.

use std::fmt;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;

use crate::constants::{AES_BLOCK_LEN, AES_IV_LEN};
use crate::error::ProtocolError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// A pre-shared AES key (16 or 32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey {
    bytes: Vec<u8>,
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // key material stays out of logs
        write!(f, "AesKey({} bytes)", self.bytes.len())
    }
}

impl AesKey {
    /// Create a key from raw bytes. Only 16 and 32 byte keys are accepted.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let bytes = bytes.into();
        match bytes.len() {
            16 | 32 => Ok(AesKey { bytes }),
            other => Err(ProtocolError::BadKeyLength(other)),
        }
    }

    /// Decode a Base64-encoded key as shared out of band.
    pub fn from_base64(encoded: &str) -> Result<Self, ProtocolError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| ProtocolError::Encryption("key is not valid base64".to_string()))?;
        Self::new(bytes)
    }

    /// The Base64 form for sharing out of band.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Encrypt a payload: zero-pad, encrypt under a fresh random IV, and
    /// return `IV || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut iv = [0u8; AES_IV_LEN];
        rand::thread_rng().fill(&mut iv);
        self.encrypt_with_iv(plaintext, &iv)
    }

    /// Encrypt under a caller-supplied IV. Exposed for known-vector tests;
    /// production paths use [`AesKey::encrypt`].
    pub fn encrypt_with_iv(
        &self,
        plaintext: &[u8],
        iv: &[u8; AES_IV_LEN],
    ) -> Result<Vec<u8>, ProtocolError> {
        let padded_len = plaintext.len().div_ceil(AES_BLOCK_LEN) * AES_BLOCK_LEN;
        let mut buf = vec![0u8; padded_len];
        buf[..plaintext.len()].copy_from_slice(plaintext);

        match self.bytes.len() {
            16 => {
                Aes128CbcEnc::new_from_slices(&self.bytes, iv)
                    .map_err(|_| ProtocolError::Encryption("bad key or iv length".to_string()))?
                    .encrypt_padded_mut::<NoPadding>(&mut buf, padded_len)
                    .map_err(|_| ProtocolError::Encryption("block padding failed".to_string()))?;
            }
            32 => {
                Aes256CbcEnc::new_from_slices(&self.bytes, iv)
                    .map_err(|_| ProtocolError::Encryption("bad key or iv length".to_string()))?
                    .encrypt_padded_mut::<NoPadding>(&mut buf, padded_len)
                    .map_err(|_| ProtocolError::Encryption("block padding failed".to_string()))?;
            }
            other => return Err(ProtocolError::BadKeyLength(other)),
        }

        let mut out = Vec::with_capacity(AES_IV_LEN + padded_len);
        out.extend_from_slice(iv);
        out.extend_from_slice(&buf);
        Ok(out)
    }

    /// Decrypt an `IV || ciphertext` payload.
    ///
    /// The result still carries the zero padding; the caller's codec finds
    /// the true content length. A failure here aborts only the one message;
    /// framing of subsequent messages is unaffected because the transport
    /// has already consumed the frame.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() < AES_IV_LEN {
            return Err(ProtocolError::Encryption(
                "payload shorter than the IV".to_string(),
            ));
        }
        let (iv, ciphertext) = payload.split_at(AES_IV_LEN);
        if ciphertext.len() % AES_BLOCK_LEN != 0 {
            return Err(ProtocolError::Encryption(
                "ciphertext is not block aligned".to_string(),
            ));
        }

        let mut buf = ciphertext.to_vec();
        match self.bytes.len() {
            16 => {
                Aes128CbcDec::new_from_slices(&self.bytes, iv)
                    .map_err(|_| ProtocolError::Encryption("bad key or iv length".to_string()))?
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| ProtocolError::Encryption("unpadding failed".to_string()))?;
            }
            32 => {
                Aes256CbcDec::new_from_slices(&self.bytes, iv)
                    .map_err(|_| ProtocolError::Encryption("bad key or iv length".to_string()))?
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| ProtocolError::Encryption("unpadding failed".to_string()))?;
            }
            other => return Err(ProtocolError::BadKeyLength(other)),
        }

        Ok(buf)
    }
}

/// Generate a fresh random AES-128 key.
pub fn generate_aes_key() -> AesKey {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    AesKey { bytes: bytes.to_vec() }
}

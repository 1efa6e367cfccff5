//! Per-device security tokens.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{HeliumError, Result};

/// Token length in bytes (a raw AES-128 key).
pub const TOKEN_SIZE: usize = 16;

/// A 128-bit per-device security token.
///
/// Tokens are raw key bytes, not text: any value is valid, including
/// embedded zeros. Equality is byte-wise. `Debug` output is redacted so
/// tokens cannot leak through logs or error messages, and the bytes are
/// zeroed when a token is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Token([u8; TOKEN_SIZE]);

impl Token {
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Token(bytes)
    }

    /// Decode a standard-alphabet base64 string (the form tokens are
    /// handed out in) into a token. The decoded value must be exactly
    /// [`TOKEN_SIZE`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| HeliumError::InvalidToken {
                reason: "not valid base64",
            })?;
        let bytes: [u8; TOKEN_SIZE] =
            bytes
                .try_into()
                .map_err(|_| HeliumError::InvalidToken {
                    reason: "must decode to exactly 16 bytes",
                })?;
        Ok(Token(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }
}

impl From<[u8; TOKEN_SIZE]> for Token {
    fn from(bytes: [u8; TOKEN_SIZE]) -> Self {
        Token(bytes)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token([REDACTED])")
    }
}

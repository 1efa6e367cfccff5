//! Token-keyed sealing and opening of message payloads.
//!
//! Every payload on the wire is AES-128-GCM sealed under the device
//! token. The transport is unauthenticated UDP, so opening must fail
//! closed: anything that does not verify under the expected token is
//! rejected in one indistinguishable way, with no partial plaintext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes128Gcm, Key, Nonce,
};

use crate::error::{HeliumError, Result};
use crate::token::Token;

/// Nonce length in bytes (96-bit GCM nonce).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Bytes added by sealing: nonce prefix plus authentication tag.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// AES-128-GCM cipher bound to one device token.
///
/// Sealed form is `nonce || ciphertext || tag` with a fresh random nonce
/// per message, so sealing the same plaintext twice yields different
/// bytes.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes128Gcm,
}

impl TokenCipher {
    pub fn new(token: &Token) -> Self {
        let key: Key<Aes128Gcm> = (*token.as_bytes()).into();
        TokenCipher {
            cipher: Aes128Gcm::new(&key),
        }
    }

    /// Seal `plaintext` under the token. Output length is
    /// `plaintext.len() + SEAL_OVERHEAD`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| HeliumError::Crypto("seal failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed payload. Anything that does not verify under the
    /// token (truncated, tampered, wrong key) is
    /// [`HeliumError::AuthenticationFailure`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(HeliumError::AuthenticationFailure);
        }
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &sealed[NONCE_SIZE..])
            .map_err(|_| HeliumError::AuthenticationFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> TokenCipher {
        TokenCipher::new(&Token::from_bytes([byte; 16]))
    }

    #[test]
    fn seal_open_round_trip() {
        let c = cipher(0x42);
        let sealed = c.seal(b"hello device").unwrap();
        assert_eq!(sealed.len(), b"hello device".len() + SEAL_OVERHEAD);
        assert_eq!(c.open(&sealed).unwrap(), b"hello device");
    }

    #[test]
    fn empty_message_round_trip() {
        let c = cipher(0x00);
        let sealed = c.seal(b"").unwrap();
        assert_eq!(sealed.len(), SEAL_OVERHEAD);
        assert_eq!(c.open(&sealed).unwrap(), b"");
    }

    #[test]
    fn large_message_round_trip() {
        let c = cipher(0x07);
        let message = vec![0xA5u8; 60_000];
        let sealed = c.seal(&message).unwrap();
        assert_eq!(c.open(&sealed).unwrap(), message);
    }

    #[test]
    fn wrong_token_fails() {
        let sealed = cipher(0x01).seal(b"secret").unwrap();
        let err = cipher(0x02).open(&sealed).unwrap_err();
        assert!(matches!(err, HeliumError::AuthenticationFailure));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let c = cipher(0x11);
        let mut sealed = c.seal(b"integrity matters").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            c.open(&sealed),
            Err(HeliumError::AuthenticationFailure)
        ));
    }

    #[test]
    fn tampered_nonce_fails() {
        let c = cipher(0x11);
        let mut sealed = c.seal(b"integrity matters").unwrap();
        sealed[0] ^= 0x80;
        assert!(matches!(
            c.open(&sealed),
            Err(HeliumError::AuthenticationFailure)
        ));
    }

    #[test]
    fn truncated_input_fails_without_panic() {
        let c = cipher(0x33);
        let sealed = c.seal(b"x").unwrap();
        for len in 0..sealed.len() {
            assert!(
                matches!(c.open(&sealed[..len]), Err(HeliumError::AuthenticationFailure)),
                "truncation to {} bytes must fail closed",
                len
            );
        }
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let c = cipher(0x55);
        let a = c.seal(b"same plaintext").unwrap();
        let b = c.seal(b"same plaintext").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_eq!(c.open(&a).unwrap(), c.open(&b).unwrap());
    }
}

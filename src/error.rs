//! Error types for the Helium client.
//!
//! One enum covers both halves of the error model: caller-facing kinds
//! (lifecycle misuse, bad arguments, OS failures) are returned from the
//! public API, while network-origin kinds (malformed datagrams, unknown
//! type tags, failed authentication) are produced and absorbed inside the
//! receive loop and only ever show up in logs and counters.

use thiserror::Error;

use crate::mac::DeviceAddress;

pub type Result<T> = std::result::Result<T, HeliumError>;

#[derive(Debug, Error)]
pub enum HeliumError {
    /// `open` called on a connection that is already open.
    #[error("connection is already open")]
    AlreadyOpen,

    /// `open` or `close` called on a connection that has been closed.
    /// Closed connections are terminal; allocate a new one to reconnect.
    #[error("connection is already closed")]
    AlreadyClosed,

    /// Operation requires an open connection.
    #[error("connection is not open")]
    NotOpen,

    /// `unsubscribe` for an address with no active subscription.
    #[error("no subscription for device {0}")]
    NotSubscribed(DeviceAddress),

    /// Subscribing a new address would exceed the configured limit.
    #[error("subscription limit of {limit} reached")]
    CapacityExceeded { limit: usize },

    /// Datagram violates the envelope format (short, bad version,
    /// length mismatch, reserved address bits).
    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: &'static str },

    /// Well-formed envelope with a type tag this version does not know.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// Ciphertext failed to authenticate under the expected token.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Cipher refused an operation (outbound sealing only; sizes are
    /// checked before sealing, so this indicates a bug, not bad input).
    #[error("crypto failure: {0}")]
    Crypto(&'static str),

    /// Message or encoded payload too large to fit a single datagram.
    #[error("payload of {size} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge { size: usize, max: usize },

    /// Token string or bytes do not form a 128-bit key.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: &'static str },

    /// Device address uses the reserved upper 16 bits.
    #[error("invalid device address {0:#x}: upper 16 bits must be zero")]
    InvalidAddress(u64),

    /// Device address string is not 6 octets of hex.
    #[error("invalid device address {0:?}: expected 12 hex digits, colons optional")]
    InvalidAddressFormat(String),

    /// Proxy argument is not an IPv4 address with optional port.
    #[error("invalid proxy address {0:?}: expected IPv4 a.b.c.d or a.b.c.d:port")]
    InvalidProxyAddr(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeliumError {
    pub(crate) fn malformed(reason: &'static str) -> Self {
        HeliumError::MalformedPacket { reason }
    }

    /// Kinds produced by untrusted network input. The receive loop drops
    /// the offending datagram and keeps running; these never surface
    /// through the public API during normal operation.
    pub fn is_network_origin(&self) -> bool {
        matches!(
            self,
            HeliumError::MalformedPacket { .. }
                | HeliumError::UnknownPacketType(_)
                | HeliumError::AuthenticationFailure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_origin_classification() {
        assert!(HeliumError::malformed("short").is_network_origin());
        assert!(HeliumError::UnknownPacketType(0x7f).is_network_origin());
        assert!(HeliumError::AuthenticationFailure.is_network_origin());
        assert!(!HeliumError::NotOpen.is_network_origin());
        assert!(!HeliumError::AlreadyOpen.is_network_origin());
        assert!(!HeliumError::CapacityExceeded { limit: 4 }.is_network_origin());
    }

    #[test]
    fn display_includes_detail() {
        let err = HeliumError::UnknownPacketType(0x7f);
        assert_eq!(err.to_string(), "unknown packet type 0x7f");

        let err = HeliumError::PayloadTooLarge { size: 70000, max: 65467 };
        assert!(err.to_string().contains("70000"));
        assert!(err.to_string().contains("65467"));
    }
}

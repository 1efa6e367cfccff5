//! Wire envelope for client/network datagrams.
//!
//! Exactly one envelope per UDP datagram. All multi-byte integers are
//! big-endian (network byte order).
//!
//! ```text
//! +--------+--------+--------------------+---------+------------------+
//! | ver(1) | type(1)| device address (8) | len (2) | payload (len)    |
//! +--------+--------+--------------------+---------+------------------+
//! ```
//!
//! Input arrives from an untrusted network, so parsing is defensive:
//! every read is covered by a length check and no failure panics.

use bytes::{Buf, BufMut, BytesMut};

use crate::cipher::SEAL_OVERHEAD;
use crate::error::{HeliumError, Result};
use crate::mac::DeviceAddress;

/// Protocol version (currently 0x01)
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Fixed header size: version, type, address, payload length.
pub const HEADER_SIZE: usize = 12;

/// Largest UDP payload deliverable over IPv4 (65535 minus IP and UDP
/// headers).
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Largest sealed payload that fits one datagram.
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// Largest plaintext message a caller may send.
pub const MAX_MESSAGE_SIZE: usize = MAX_CIPHERTEXT_SIZE - SEAL_OVERHEAD;

/// Packet types (identifier byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0x01,
    Subscribe = 0x02,
    Unsubscribe = 0x03,
}

impl TryFrom<u8> for PacketType {
    type Error = HeliumError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(PacketType::Data),
            0x02 => Ok(PacketType::Subscribe),
            0x03 => Ok(PacketType::Unsubscribe),
            other => Err(HeliumError::UnknownPacketType(other)),
        }
    }
}

/// Parsed envelope.
///
/// The address field names the non-client party of the exchange: the
/// recipient on outbound packets, the sender on inbound ones. A `Data`
/// payload is a token-sealed application message; `Subscribe` and
/// `Unsubscribe` carry a possession proof (a seal of the empty message
/// under the device token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data {
        device: DeviceAddress,
        ciphertext: Vec<u8>,
    },
    Subscribe {
        device: DeviceAddress,
        proof: Vec<u8>,
    },
    Unsubscribe {
        device: DeviceAddress,
        proof: Vec<u8>,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Data { .. } => PacketType::Data,
            Packet::Subscribe { .. } => PacketType::Subscribe,
            Packet::Unsubscribe { .. } => PacketType::Unsubscribe,
        }
    }

    pub fn device(&self) -> DeviceAddress {
        match self {
            Packet::Data { device, .. }
            | Packet::Subscribe { device, .. }
            | Packet::Unsubscribe { device, .. } => *device,
        }
    }

    /// Parse a raw UDP datagram into an envelope.
    ///
    /// Truncated or inconsistent input fails with
    /// [`HeliumError::MalformedPacket`]; a well-formed envelope with an
    /// unrecognized type tag fails with
    /// [`HeliumError::UnknownPacketType`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(HeliumError::malformed("shorter than envelope header"));
        }

        let mut buf = &data[..];

        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(HeliumError::malformed("unsupported protocol version"));
        }

        let packet_type = PacketType::try_from(buf.get_u8())?;

        let device = DeviceAddress::try_from(buf.get_u64())
            .map_err(|_| HeliumError::malformed("reserved address bits set"))?;

        // One logical packet per datagram: the declared length must
        // account for every remaining byte.
        let declared = buf.get_u16() as usize;
        if declared != buf.remaining() {
            return Err(HeliumError::malformed("length field does not match payload"));
        }

        let payload = buf.to_vec();

        Ok(match packet_type {
            PacketType::Data => Packet::Data {
                device,
                ciphertext: payload,
            },
            PacketType::Subscribe => Packet::Subscribe {
                device,
                proof: payload,
            },
            PacketType::Unsubscribe => Packet::Unsubscribe {
                device,
                proof: payload,
            },
        })
    }

    /// Encode into a datagram-ready buffer.
    ///
    /// Payloads over [`MAX_CIPHERTEXT_SIZE`] do not fit one datagram
    /// and fail with [`HeliumError::PayloadTooLarge`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (device, payload) = match self {
            Packet::Data { device, ciphertext } => (device, ciphertext),
            Packet::Subscribe { device, proof } => (device, proof),
            Packet::Unsubscribe { device, proof } => (device, proof),
        };
        if payload.len() > MAX_CIPHERTEXT_SIZE {
            return Err(HeliumError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_CIPHERTEXT_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.packet_type() as u8);
        buf.put_u64(device.as_u64());
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);
        Ok(buf.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceAddress {
        DeviceAddress::try_from(0xAABB_CCDD_EEFF).unwrap()
    }

    #[test]
    fn encodes_wire_layout() {
        let packet = Packet::Data {
            device: device(),
            ciphertext: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x01, // version
                0x01, // type: data
                0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, // address
                0x00, 0x04, // payload length
                0xDE, 0xAD, 0xBE, 0xEF, // payload
            ]
        );
    }

    #[test]
    fn parses_data_frame() {
        let bytes = [
            0x01, 0x01, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x02, 0x13, 0x37,
        ];
        let packet = Packet::parse(&bytes).unwrap();
        assert_eq!(
            packet,
            Packet::Data {
                device: device(),
                ciphertext: vec![0x13, 0x37],
            }
        );
    }

    #[test]
    fn parses_empty_payload() {
        let bytes = [
            0x01, 0x02, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x00,
        ];
        let packet = Packet::parse(&bytes).unwrap();
        assert_eq!(packet.packet_type(), PacketType::Subscribe);
        assert_eq!(packet.device(), device());
    }

    #[test]
    fn control_frames_round_trip() {
        for packet in [
            Packet::Subscribe {
                device: device(),
                proof: vec![0x01; 28],
            },
            Packet::Unsubscribe {
                device: device(),
                proof: vec![0x02; 28],
            },
        ] {
            assert_eq!(Packet::parse(&packet.encode().unwrap()).unwrap(), packet);
        }
    }

    #[test]
    fn every_header_truncation_is_malformed() {
        let full = Packet::Data {
            device: device(),
            ciphertext: vec![0xEE; 8],
        }
        .encode()
        .unwrap();

        for len in 0..HEADER_SIZE {
            let err = Packet::parse(&full[..len]).unwrap_err();
            assert!(
                matches!(err, HeliumError::MalformedPacket { .. }),
                "truncation to {} bytes: got {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn payload_truncation_is_malformed() {
        let full = Packet::Data {
            device: device(),
            ciphertext: vec![0xEE; 8],
        }
        .encode()
        .unwrap();

        // header intact, payload cut short
        let err = Packet::parse(&full[..full.len() - 3]).unwrap_err();
        assert!(matches!(err, HeliumError::MalformedPacket { .. }));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut bytes = Packet::Data {
            device: device(),
            ciphertext: vec![0xEE; 8],
        }
        .encode()
        .unwrap();
        bytes.push(0x00);

        let err = Packet::parse(&bytes).unwrap_err();
        assert!(matches!(err, HeliumError::MalformedPacket { .. }));
    }

    #[test]
    fn oversized_payload_is_refused() {
        let packet = Packet::Data {
            device: device(),
            ciphertext: vec![0u8; MAX_CIPHERTEXT_SIZE + 1],
        };
        assert!(matches!(
            packet.encode(),
            Err(HeliumError::PayloadTooLarge { .. })
        ));

        // the largest legal payload still frames
        let full = Packet::Data {
            device: device(),
            ciphertext: vec![0u8; MAX_CIPHERTEXT_SIZE],
        };
        assert_eq!(full.encode().unwrap().len(), MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn unknown_type_tag() {
        let bytes = [
            0x01, 0x7F, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x00,
        ];
        let err = Packet::parse(&bytes).unwrap_err();
        assert!(matches!(err, HeliumError::UnknownPacketType(0x7F)));

        // 0x00 is unassigned, not a silent default
        assert!(matches!(
            PacketType::try_from(0x00),
            Err(HeliumError::UnknownPacketType(0x00))
        ));
    }

    #[test]
    fn wrong_version_is_malformed() {
        let bytes = [
            0x02, 0x01, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x00,
        ];
        assert!(matches!(
            Packet::parse(&bytes),
            Err(HeliumError::MalformedPacket { .. })
        ));
    }

    #[test]
    fn reserved_address_bits_are_malformed() {
        let bytes = [
            0x01, 0x01, 0x10, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x00,
        ];
        assert!(matches!(
            Packet::parse(&bytes),
            Err(HeliumError::MalformedPacket { .. })
        ));
    }

    #[test]
    fn size_limits_line_up() {
        assert_eq!(MAX_CIPHERTEXT_SIZE, 65495);
        assert_eq!(MAX_MESSAGE_SIZE, 65467);
        // a maximum-size message seals and frames into one legal datagram
        assert_eq!(MAX_MESSAGE_SIZE + SEAL_OVERHEAD + HEADER_SIZE, MAX_DATAGRAM_SIZE);
    }
}

//! 48-bit device hardware addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::{HeliumError, Result};

/// Mask of the valid (low 48) bits of a device address.
pub const ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// A 48-bit device hardware address in a 64-bit container.
///
/// The upper 16 bits are reserved and must be zero. Construction through
/// [`TryFrom<u64>`] enforces that, so every `DeviceAddress` in circulation
/// is valid; building from six octets cannot go wrong and is infallible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Build from the six address octets, most significant first.
    pub fn from_octets(octets: [u8; 6]) -> Self {
        let mut value = 0u64;
        for octet in octets {
            value = (value << 8) | u64::from(octet);
        }
        DeviceAddress(value)
    }

    /// The six address octets, most significant first.
    pub fn octets(self) -> [u8; 6] {
        let be = self.0.to_be_bytes();
        [be[2], be[3], be[4], be[5], be[6], be[7]]
    }
}

impl TryFrom<u64> for DeviceAddress {
    type Error = HeliumError;

    fn try_from(value: u64) -> Result<Self> {
        if value & !ADDRESS_MASK != 0 {
            return Err(HeliumError::InvalidAddress(value));
        }
        Ok(DeviceAddress(value))
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(octets: [u8; 6]) -> Self {
        DeviceAddress::from_octets(octets)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAddress({})", self)
    }
}

impl FromStr for DeviceAddress {
    type Err = HeliumError;

    /// Parse `aa:bb:cc:dd:ee:ff` or bare `aabbccddeeff`, case
    /// insensitive.
    fn from_str(s: &str) -> Result<Self> {
        let hex_digits: String = s.chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(&hex_digits)
            .map_err(|_| HeliumError::InvalidAddressFormat(s.to_string()))?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| HeliumError::InvalidAddressFormat(s.to_string()))?;
        Ok(DeviceAddress::from_octets(octets))
    }
}

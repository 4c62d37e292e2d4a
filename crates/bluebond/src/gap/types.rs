use crate::gap::constants::*;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl AddressType {
    /// Identity address types collapse to their over-the-air counterpart
    pub fn to_over_the_air(self) -> Self {
        match self {
            AddressType::PublicIdentity => AddressType::Public,
            AddressType::RandomIdentity => AddressType::Random,
            other => other,
        }
    }
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// Bluetooth device address, stored little-endian as it travels over HCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub const ANY: BdAddr = BdAddr { bytes: [0; 6] };

    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == [0; 6]
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Error returned when a textual address is malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Bluetooth address: {0}")]
pub struct ParseAddressError(pub String);

impl FromStr for BdAddr {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseAddressError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseAddressError(s.to_string()));
            }
            bytes[5 - i] =
                u8::from_str_radix(part, 16).map_err(|_| ParseAddressError(s.to_string()))?;
        }

        Ok(Self { bytes })
    }
}

/// An address together with its type; the key of every per-device map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressWithType {
    pub address: BdAddr,
    pub address_type: AddressType,
}

impl AddressWithType {
    pub fn new(address: BdAddr, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }

    pub fn public(address: BdAddr) -> Self {
        Self::new(address, AddressType::Public)
    }

    /// BR/EDR links only ever carry the public device address
    pub fn to_classic(&self) -> Self {
        Self::public(self.address)
    }

    /// Type octet followed by the address, most significant byte first.
    /// This is the `A1`/`A2` layout consumed by the SC key derivation functions.
    pub fn to_smp_bytes(&self) -> [u8; 7] {
        let mut out = [0u8; 7];
        out[0] = match self.address_type.to_over_the_air() {
            AddressType::Random => 0x01,
            _ => 0x00,
        };
        for i in 0..6 {
            out[1 + i] = self.address.bytes[5 - i];
        }
        out
    }
}

impl fmt::Display for AddressWithType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.address_type {
            AddressType::Public => "public",
            AddressType::Random => "random",
            AddressType::PublicIdentity => "public-id",
            AddressType::RandomIdentity => "random-id",
        };
        write!(f, "[{}, {}]", self.address, kind)
    }
}

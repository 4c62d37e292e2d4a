//! Types shared by the classic and LE security paths
use super::smp::constants::*;
use super::smp::{SmpError, SmpReason};
use crate::gap::AddressWithType;
use std::fmt;
use thiserror::Error;

/// IO Capability types for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoCapability {
    /// Display only capability
    DisplayOnly,
    /// Display with yes/no capability
    DisplayYesNo,
    /// Keyboard only
    KeyboardOnly,
    /// No input, no output
    NoInputNoOutput,
    /// Both keyboard and display (LE only)
    KeyboardDisplay,
}

impl IoCapability {
    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            IoCapability::DisplayOnly => SMP_IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => SMP_IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => SMP_IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => SMP_IO_CAPABILITY_KEYBOARD_DISPLAY,
        }
    }

    /// Convert from u8 value from protocol
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_IO_CAPABILITY_DISPLAY_ONLY => Some(IoCapability::DisplayOnly),
            SMP_IO_CAPABILITY_DISPLAY_YES_NO => Some(IoCapability::DisplayYesNo),
            SMP_IO_CAPABILITY_KEYBOARD_ONLY => Some(IoCapability::KeyboardOnly),
            SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT => Some(IoCapability::NoInputNoOutput),
            SMP_IO_CAPABILITY_KEYBOARD_DISPLAY => Some(IoCapability::KeyboardDisplay),
            _ => None,
        }
    }

    /// The BR/EDR IO capability field has no keyboard+display value
    pub fn to_classic(self) -> Self {
        match self {
            IoCapability::KeyboardDisplay => IoCapability::DisplayYesNo,
            other => other,
        }
    }

    pub fn has_display(&self) -> bool {
        matches!(
            self,
            IoCapability::DisplayOnly | IoCapability::DisplayYesNo | IoCapability::KeyboardDisplay
        )
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, IoCapability::DisplayYesNo | IoCapability::KeyboardDisplay)
    }
}

impl fmt::Display for IoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoCapability::DisplayOnly => write!(f, "Display Only"),
            IoCapability::DisplayYesNo => write!(f, "Display Yes/No"),
            IoCapability::KeyboardOnly => write!(f, "Keyboard Only"),
            IoCapability::NoInputNoOutput => write!(f, "No Input No Output"),
            IoCapability::KeyboardDisplay => write!(f, "Keyboard Display"),
        }
    }
}

/// BR/EDR authentication requirements as sent in the IO capability reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationRequirements {
    NoBonding,
    NoBondingMitm,
    DedicatedBonding,
    DedicatedBondingMitm,
    GeneralBonding,
    GeneralBondingMitm,
}

impl AuthenticationRequirements {
    pub fn to_u8(self) -> u8 {
        match self {
            AuthenticationRequirements::NoBonding => 0x00,
            AuthenticationRequirements::NoBondingMitm => 0x01,
            AuthenticationRequirements::DedicatedBonding => 0x02,
            AuthenticationRequirements::DedicatedBondingMitm => 0x03,
            AuthenticationRequirements::GeneralBonding => 0x04,
            AuthenticationRequirements::GeneralBondingMitm => 0x05,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(AuthenticationRequirements::NoBonding),
            0x01 => Some(AuthenticationRequirements::NoBondingMitm),
            0x02 => Some(AuthenticationRequirements::DedicatedBonding),
            0x03 => Some(AuthenticationRequirements::DedicatedBondingMitm),
            0x04 => Some(AuthenticationRequirements::GeneralBonding),
            0x05 => Some(AuthenticationRequirements::GeneralBondingMitm),
            _ => None,
        }
    }

    pub fn requires_mitm(self) -> bool {
        matches!(
            self,
            AuthenticationRequirements::NoBondingMitm
                | AuthenticationRequirements::DedicatedBondingMitm
                | AuthenticationRequirements::GeneralBondingMitm
        )
    }
}

/// Security level reached on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SecurityLevel {
    /// No security
    #[default]
    None = 0,
    /// Encryption without MITM protection
    EncryptionOnly = 1,
    /// Encryption with MITM protection
    EncryptionWithAuthentication = 2,
    /// Authenticated Secure Connections (P-256)
    SecureConnections = 3,
}

impl SecurityLevel {
    pub fn is_encrypted(&self) -> bool {
        *self >= SecurityLevel::EncryptionOnly
    }

    pub fn is_authenticated(&self) -> bool {
        *self >= SecurityLevel::EncryptionWithAuthentication
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SecurityLevel::EncryptionOnly,
            2 => SecurityLevel::EncryptionWithAuthentication,
            3 => SecurityLevel::SecureConnections,
            _ => SecurityLevel::None,
        }
    }
}

/// BR/EDR link key types reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKeyType {
    Combination,
    DebugCombination,
    UnauthenticatedP192,
    AuthenticatedP192,
    ChangedCombination,
    UnauthenticatedP256,
    AuthenticatedP256,
    Other(u8),
}

impl LinkKeyType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => LinkKeyType::Combination,
            0x03 => LinkKeyType::DebugCombination,
            0x04 => LinkKeyType::UnauthenticatedP192,
            0x05 => LinkKeyType::AuthenticatedP192,
            0x06 => LinkKeyType::ChangedCombination,
            0x07 => LinkKeyType::UnauthenticatedP256,
            0x08 => LinkKeyType::AuthenticatedP256,
            other => LinkKeyType::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            LinkKeyType::Combination => 0x00,
            LinkKeyType::DebugCombination => 0x03,
            LinkKeyType::UnauthenticatedP192 => 0x04,
            LinkKeyType::AuthenticatedP192 => 0x05,
            LinkKeyType::ChangedCombination => 0x06,
            LinkKeyType::UnauthenticatedP256 => 0x07,
            LinkKeyType::AuthenticatedP256 => 0x08,
            LinkKeyType::Other(value) => value,
        }
    }

    pub fn security_level(self) -> SecurityLevel {
        match self {
            LinkKeyType::AuthenticatedP256 => SecurityLevel::SecureConnections,
            LinkKeyType::AuthenticatedP192 => SecurityLevel::EncryptionWithAuthentication,
            _ => SecurityLevel::EncryptionOnly,
        }
    }
}

/// Classic link key with its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkKey {
    pub key: [u8; 16],
    pub key_type: LinkKeyType,
}

/// Long Term Key (LTK) information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermKey {
    /// Key value
    pub key: [u8; 16],
    /// EDIV (Encrypted Diversifier)
    pub ediv: u16,
    /// RAND (Random number)
    pub rand: [u8; 8],
}

impl LongTermKey {
    /// Secure Connections keys always use zero EDIV and RAND
    pub fn new_secure_connections(key: [u8; 16]) -> Self {
        Self {
            key,
            ediv: 0,
            rand: [0; 8],
        }
    }
}

/// Application-facing security requirement for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    BestAvailable,
    AuthenticatedEncryptedTransport,
    EncryptedTransport,
}

impl SecurityPolicy {
    pub fn requires_mitm(&self) -> bool {
        matches!(
            self,
            SecurityPolicy::BestAvailable | SecurityPolicy::AuthenticatedEncryptedTransport
        )
    }

    pub fn authentication_requirements(&self) -> AuthenticationRequirements {
        if self.requires_mitm() {
            AuthenticationRequirements::GeneralBondingMitm
        } else {
            AuthenticationRequirements::GeneralBonding
        }
    }
}

/// Remote classic OOB values for one curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassicOobData {
    /// Hash C
    pub c: [u8; 16],
    /// Randomizer R
    pub r: [u8; 16],
}

/// Keys produced by a successful handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondKeys {
    pub link_key: Option<LinkKey>,
    pub ltk: Option<LongTermKey>,
    pub irk: Option<[u8; 16]>,
    pub csrk: Option<[u8; 16]>,
    pub identity_address: Option<AddressWithType>,
    pub key_size: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOutcome {
    pub keys: BondKeys,
    pub level: SecurityLevel,
}

/// Why a handshake did not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PairingFailure {
    pub message: String,
    /// SMP reason code, for LE handshakes
    pub smp_reason: Option<SmpReason>,
    /// HCI status, for classic handshakes
    pub hci_status: Option<u8>,
}

impl PairingFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            smp_reason: None,
            hci_status: None,
        }
    }

    pub fn smp(message: impl Into<String>, reason: SmpReason) -> Self {
        Self {
            smp_reason: Some(reason),
            ..Self::new(message)
        }
    }

    pub fn hci(message: impl Into<String>, status: u8) -> Self {
        Self {
            hci_status: Some(status),
            ..Self::new(message)
        }
    }
}

impl From<SmpError> for PairingFailure {
    fn from(e: SmpError) -> Self {
        let reason = e.reason();
        Self::smp(e.to_string(), reason)
    }
}

pub type PairingResult = Result<PairingOutcome, PairingFailure>;

/// Synchronous rejections from the security manager API
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("A pairing with {0} is already in progress")]
    PairingInProgress(AddressWithType),

    #[error("LE pairing slot is busy with {0}")]
    LePairingBusy(AddressWithType),

    #[error("Unknown device {0}")]
    UnknownDevice(AddressWithType),

    #[error("No connection to {0}")]
    NotConnected(AddressWithType),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

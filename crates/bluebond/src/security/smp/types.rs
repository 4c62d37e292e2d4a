//! Type definitions for the Security Manager Protocol
use super::constants::*;
use crate::security::IoCapability;
use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

/// Reason carried in a Pairing Failed PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmpReason {
    PasskeyEntryFailed,
    OobNotAvailable,
    AuthenticationRequirements,
    ConfirmValueFailed,
    PairingNotSupported,
    EncryptionKeySize,
    CommandNotSupported,
    UnspecifiedReason,
    RepeatedAttempts,
    InvalidParameters,
    DhKeyCheckFailed,
    NumericComparisonFailed,
    BrEdrPairingInProgress,
    CrossTransportKeyNotAllowed,
    Unknown(u8),
}

impl SmpReason {
    pub fn to_u8(self) -> u8 {
        match self {
            SmpReason::PasskeyEntryFailed => SMP_REASON_PASSKEY_ENTRY_FAILED,
            SmpReason::OobNotAvailable => SMP_REASON_OOB_NOT_AVAILABLE,
            SmpReason::AuthenticationRequirements => SMP_REASON_AUTHENTICATION_REQUIREMENTS,
            SmpReason::ConfirmValueFailed => SMP_REASON_CONFIRM_VALUE_FAILED,
            SmpReason::PairingNotSupported => SMP_REASON_PAIRING_NOT_SUPPORTED,
            SmpReason::EncryptionKeySize => SMP_REASON_ENCRYPTION_KEY_SIZE,
            SmpReason::CommandNotSupported => SMP_REASON_COMMAND_NOT_SUPPORTED,
            SmpReason::UnspecifiedReason => SMP_REASON_UNSPECIFIED_REASON,
            SmpReason::RepeatedAttempts => SMP_REASON_REPEATED_ATTEMPTS,
            SmpReason::InvalidParameters => SMP_REASON_INVALID_PARAMETERS,
            SmpReason::DhKeyCheckFailed => SMP_REASON_DHKEY_CHECK_FAILED,
            SmpReason::NumericComparisonFailed => SMP_REASON_NUMERIC_COMPARISON_FAILED,
            SmpReason::BrEdrPairingInProgress => SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS,
            SmpReason::CrossTransportKeyNotAllowed => SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED,
            SmpReason::Unknown(value) => value,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            SMP_REASON_PASSKEY_ENTRY_FAILED => SmpReason::PasskeyEntryFailed,
            SMP_REASON_OOB_NOT_AVAILABLE => SmpReason::OobNotAvailable,
            SMP_REASON_AUTHENTICATION_REQUIREMENTS => SmpReason::AuthenticationRequirements,
            SMP_REASON_CONFIRM_VALUE_FAILED => SmpReason::ConfirmValueFailed,
            SMP_REASON_PAIRING_NOT_SUPPORTED => SmpReason::PairingNotSupported,
            SMP_REASON_ENCRYPTION_KEY_SIZE => SmpReason::EncryptionKeySize,
            SMP_REASON_COMMAND_NOT_SUPPORTED => SmpReason::CommandNotSupported,
            SMP_REASON_UNSPECIFIED_REASON => SmpReason::UnspecifiedReason,
            SMP_REASON_REPEATED_ATTEMPTS => SmpReason::RepeatedAttempts,
            SMP_REASON_INVALID_PARAMETERS => SmpReason::InvalidParameters,
            SMP_REASON_DHKEY_CHECK_FAILED => SmpReason::DhKeyCheckFailed,
            SMP_REASON_NUMERIC_COMPARISON_FAILED => SmpReason::NumericComparisonFailed,
            SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS => SmpReason::BrEdrPairingInProgress,
            SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED => SmpReason::CrossTransportKeyNotAllowed,
            other => SmpReason::Unknown(other),
        }
    }
}

impl fmt::Display for SmpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmpReason::PasskeyEntryFailed => write!(f, "passkey entry failed"),
            SmpReason::OobNotAvailable => write!(f, "OOB not available"),
            SmpReason::AuthenticationRequirements => write!(f, "authentication requirements"),
            SmpReason::ConfirmValueFailed => write!(f, "confirm value failed"),
            SmpReason::PairingNotSupported => write!(f, "pairing not supported"),
            SmpReason::EncryptionKeySize => write!(f, "encryption key size"),
            SmpReason::CommandNotSupported => write!(f, "command not supported"),
            SmpReason::UnspecifiedReason => write!(f, "unspecified reason"),
            SmpReason::RepeatedAttempts => write!(f, "repeated attempts"),
            SmpReason::InvalidParameters => write!(f, "invalid parameters"),
            SmpReason::DhKeyCheckFailed => write!(f, "DHKey check failed"),
            SmpReason::NumericComparisonFailed => write!(f, "numeric comparison failed"),
            SmpReason::BrEdrPairingInProgress => write!(f, "BR/EDR pairing in progress"),
            SmpReason::CrossTransportKeyNotAllowed => {
                write!(f, "cross-transport key derivation not allowed")
            }
            SmpReason::Unknown(value) => write!(f, "reason 0x{:02x}", value),
        }
    }
}

/// SMP decoding and protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmpError {
    #[error("Empty SMP PDU")]
    Empty,

    #[error("SMP PDU 0x{opcode:02x} too short: {actual} < {expected}")]
    TooShort {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown SMP opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unexpected SMP PDU 0x{opcode:02x} while {stage}")]
    Unexpected { opcode: u8, stage: &'static str },
}

impl SmpError {
    /// Reason to report to the peer in a Pairing Failed PDU
    pub fn reason(&self) -> SmpReason {
        match self {
            SmpError::UnknownOpcode(_) => SmpReason::CommandNotSupported,
            SmpError::Unexpected { .. } => SmpReason::UnspecifiedReason,
            _ => SmpReason::InvalidParameters,
        }
    }
}

/// Result type for SMP operations
pub type SmpResult<T> = Result<T, SmpError>;

bitflags! {
    /// AuthReq field of the pairing request/response
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AuthReq: u8 {
        const BONDING = 0x01;
        const MITM = 0x04;
        const SECURE_CONNECTIONS = 0x08;
        const KEYPRESS = 0x10;
        const CT2 = 0x20;
    }
}

bitflags! {
    /// Key distribution field of the pairing request/response
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyDistribution: u8 {
        const ENC_KEY = 0x01;
        const ID_KEY = 0x02;
        const SIGN_KEY = 0x04;
        const LINK_KEY = 0x08;
    }
}

/// Pairing parameters exchanged in the request and response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingFeatures {
    pub io_capability: IoCapability,
    pub oob_data_present: bool,
    pub auth_req: AuthReq,
    /// Maximum encryption key size (7-16)
    pub max_key_size: u8,
    pub initiator_key_dist: KeyDistribution,
    pub responder_key_dist: KeyDistribution,
}

impl PairingFeatures {
    /// The three octet IOcap input to f6: AuthReq, OOB flag, IO capability
    pub fn iocap_bytes(&self) -> [u8; 3] {
        [
            self.auth_req.bits(),
            self.oob_data_present as u8,
            self.io_capability.to_u8(),
        ]
    }
}

impl Default for PairingFeatures {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::NoInputNoOutput,
            oob_data_present: false,
            auth_req: AuthReq::BONDING | AuthReq::SECURE_CONNECTIONS,
            max_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            initiator_key_dist: KeyDistribution::ID_KEY | KeyDistribution::SIGN_KEY,
            responder_key_dist: KeyDistribution::ID_KEY | KeyDistribution::SIGN_KEY,
        }
    }
}

/// Pairing methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMethod {
    /// Just Works method - no user interaction
    JustWorks,
    /// Passkey Entry - one device enters a passkey
    PasskeyEntry,
    /// Numeric Comparison - user confirms matching numbers
    NumericComparison,
    /// Out of Band data
    OutOfBand,
}

impl PairingMethod {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, PairingMethod::JustWorks)
    }
}

impl fmt::Display for PairingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingMethod::JustWorks => write!(f, "Just Works"),
            PairingMethod::PasskeyEntry => write!(f, "Passkey Entry"),
            PairingMethod::NumericComparison => write!(f, "Numeric Comparison"),
            PairingMethod::OutOfBand => write!(f, "Out of Band"),
        }
    }
}

/// Link layer role of the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

/// LE Secure Connections out-of-band data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeOobData {
    /// Random value (r)
    pub r: [u8; 16],
    /// Confirm value (c = f4(PKx, PKx, r, 0))
    pub c: [u8; 16],
}

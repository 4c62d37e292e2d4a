//! Stack configuration
//!
//! Defaults match the Core Specification timers. A deployment can override
//! individual values in the `Stack` section of its storage.

use crate::security::smp::constants::{
    SMP_MAX_ENCRYPTION_KEY_SIZE, SMP_MIN_ENCRYPTION_KEY_SIZE, SMP_TIMEOUT,
};
use crate::security::smp::{AuthReq, KeyDistribution};
use crate::security::{AuthenticationRequirements, IoCapability};
use crate::storage::{Storage, SECTION_STACK};
use log::warn;
use std::time::Duration;

pub const KEY_IO_CAPABILITY: &str = "IoCapability";
pub const KEY_AUTH_REQ: &str = "AuthReq";
pub const KEY_MAX_KEY_SIZE: &str = "MaxKeySize";
pub const KEY_MIN_KEY_SIZE: &str = "MinKeySize";
pub const KEY_SMP_TIMEOUT_MS: &str = "SmpTimeoutMs";
pub const KEY_LOCAL_KEY_DIST: &str = "LocalKeyDist";
pub const KEY_DIRECT_CONNECT_TIMEOUT_MS: &str = "DirectConnectTimeoutMs";
pub const KEY_ACCEPT_LIST_SIZE: &str = "AcceptListSize";
pub const KEY_INQUIRY_LENGTH: &str = "InquiryLength";
pub const KEY_INQUIRY_RESPONSES: &str = "InquiryResponses";

/// Direct connection attempts give up after this long
pub const DEFAULT_DIRECT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Typical controller accept list capacity
pub const DEFAULT_ACCEPT_LIST_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub io_capability: IoCapability,
    /// Requirements used for classic pairing started without a policy
    pub authentication_requirements: AuthenticationRequirements,
    /// AuthReq octet sent in LE pairing requests and responses
    pub le_auth_req: AuthReq,
    pub max_key_size: u8,
    pub min_key_size: u8,
    pub smp_timeout: Duration,
    /// Keys this device distributes and asks for
    pub local_key_distribution: KeyDistribution,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::DisplayYesNo,
            authentication_requirements: AuthenticationRequirements::GeneralBondingMitm,
            le_auth_req: AuthReq::BONDING | AuthReq::MITM | AuthReq::SECURE_CONNECTIONS,
            max_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            min_key_size: SMP_MIN_ENCRYPTION_KEY_SIZE,
            smp_timeout: SMP_TIMEOUT,
            local_key_distribution: KeyDistribution::ID_KEY | KeyDistribution::SIGN_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub direct_connect_timeout: Duration,
    pub accept_list_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            direct_connect_timeout: DEFAULT_DIRECT_CONNECT_TIMEOUT,
            accept_list_size: DEFAULT_ACCEPT_LIST_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Inquiry length in 1.28 s units
    pub inquiry_length: u8,
    /// 0 means unlimited
    pub num_responses: u8,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            inquiry_length: 0x08,
            num_responses: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackConfig {
    pub security: SecurityConfig,
    pub connection: ConnectionConfig,
    pub discovery: DiscoveryConfig,
}

fn read_u8(storage: &dyn Storage, key: &str) -> Option<u8> {
    let value = storage.get(SECTION_STACK, key)?;
    match value.as_slice() {
        [byte] => Some(*byte),
        _ => {
            warn!("Ignoring {}/{}: expected one octet", SECTION_STACK, key);
            None
        }
    }
}

fn read_millis(storage: &dyn Storage, key: &str) -> Option<Duration> {
    let value = storage.get(SECTION_STACK, key)?;
    match <[u8; 4]>::try_from(value.as_slice()) {
        Ok(bytes) if u32::from_le_bytes(bytes) > 0 => {
            Some(Duration::from_millis(u32::from_le_bytes(bytes) as u64))
        }
        _ => {
            warn!("Ignoring {}/{}: expected a non-zero u32", SECTION_STACK, key);
            None
        }
    }
}

impl StackConfig {
    /// Defaults overridden by whatever valid values the `Stack` section holds
    pub fn load(storage: &dyn Storage) -> Self {
        let mut config = Self::default();

        if let Some(value) = read_u8(storage, KEY_IO_CAPABILITY) {
            match IoCapability::from_u8(value) {
                Some(io_capability) => config.security.io_capability = io_capability,
                None => warn!("Ignoring unknown IO capability 0x{:02x}", value),
            }
        }

        if let Some(value) = read_u8(storage, KEY_AUTH_REQ) {
            config.security.le_auth_req = AuthReq::from_bits_truncate(value);
            config.security.authentication_requirements =
                if config.security.le_auth_req.contains(AuthReq::MITM) {
                    AuthenticationRequirements::GeneralBondingMitm
                } else {
                    AuthenticationRequirements::GeneralBonding
                };
        }

        let min = read_u8(storage, KEY_MIN_KEY_SIZE).unwrap_or(config.security.min_key_size);
        let max = read_u8(storage, KEY_MAX_KEY_SIZE).unwrap_or(config.security.max_key_size);
        if (SMP_MIN_ENCRYPTION_KEY_SIZE..=SMP_MAX_ENCRYPTION_KEY_SIZE).contains(&min)
            && (min..=SMP_MAX_ENCRYPTION_KEY_SIZE).contains(&max)
        {
            config.security.min_key_size = min;
            config.security.max_key_size = max;
        } else {
            warn!("Ignoring key size range {}..={}", min, max);
        }

        if let Some(timeout) = read_millis(storage, KEY_SMP_TIMEOUT_MS) {
            config.security.smp_timeout = timeout;
        }

        if let Some(value) = read_u8(storage, KEY_LOCAL_KEY_DIST) {
            config.security.local_key_distribution = KeyDistribution::from_bits_truncate(value);
        }

        if let Some(timeout) = read_millis(storage, KEY_DIRECT_CONNECT_TIMEOUT_MS) {
            config.connection.direct_connect_timeout = timeout;
        }

        if let Some(size) = read_u8(storage, KEY_ACCEPT_LIST_SIZE) {
            config.connection.accept_list_size = size as usize;
        }

        if let Some(length) = read_u8(storage, KEY_INQUIRY_LENGTH) {
            // Range 1.28 s to 61.44 s
            if (0x01..=0x30).contains(&length) {
                config.discovery.inquiry_length = length;
            } else {
                warn!("Ignoring inquiry length 0x{:02x}", length);
            }
        }

        if let Some(responses) = read_u8(storage, KEY_INQUIRY_RESPONSES) {
            config.discovery.num_responses = responses;
        }

        config
    }
}

//! Per-device security state

use super::types::*;
use crate::gap::{AddressType, AddressWithType, BdAddr};
use crate::storage::{get_array, Storage};

const KEY_ADDR_TYPE: &str = "AddrType";
const KEY_IDENTITY_ADDR: &str = "IdentityAddr";
const KEY_IDENTITY_ADDR_TYPE: &str = "IdentityAddrType";
const KEY_LINK_KEY: &str = "LinkKey";
const KEY_LINK_KEY_TYPE: &str = "LinkKeyType";
const KEY_LTK: &str = "Ltk";
const KEY_EDIV: &str = "Ediv";
const KEY_RAND: &str = "Rand";
const KEY_IRK: &str = "Irk";
const KEY_CSRK: &str = "Csrk";
const KEY_KEY_SIZE: &str = "KeySize";
const KEY_SECURITY_LEVEL: &str = "SecurityLevel";

/// Everything the stack knows about the security of one remote device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRecord {
    /// Address the device is currently using
    pub pseudo_address: AddressWithType,
    /// Resolved identity, known once an IRK has been exchanged
    pub identity_address: Option<AddressWithType>,
    pub bonded: bool,
    pub pairing: bool,
    /// Deleted if the link drops before bonding completes
    pub temporary: bool,
    pub security_level: SecurityLevel,
    pub link_key: Option<LinkKey>,
    pub ltk: Option<LongTermKey>,
    pub irk: Option<[u8; 16]>,
    pub csrk: Option<[u8; 16]>,
    pub key_size: u8,
}

impl SecurityRecord {
    pub fn new(address: AddressWithType) -> Self {
        Self {
            pseudo_address: address,
            identity_address: None,
            bonded: false,
            pairing: false,
            temporary: false,
            security_level: SecurityLevel::None,
            link_key: None,
            ltk: None,
            irk: None,
            csrk: None,
            key_size: 0,
        }
    }

    /// True if `address` is either the pseudo or the identity address
    pub fn matches(&self, address: &AddressWithType) -> bool {
        self.pseudo_address == *address || self.identity_address.as_ref() == Some(address)
    }

    pub fn is_authenticated(&self) -> bool {
        self.bonded && self.security_level.is_authenticated()
    }

    /// Whether the stored state already satisfies `policy`
    pub fn satisfies(&self, policy: SecurityPolicy) -> bool {
        self.bonded && (!policy.requires_mitm() || self.security_level.is_authenticated())
    }

    /// Fold the result of a completed handshake into the record
    pub fn apply_outcome(&mut self, outcome: &PairingOutcome) {
        let keys = &outcome.keys;
        if keys.link_key.is_some() {
            self.link_key = keys.link_key;
        }
        if keys.ltk.is_some() {
            self.ltk = keys.ltk;
        }
        if keys.irk.is_some() {
            self.irk = keys.irk;
        }
        if keys.csrk.is_some() {
            self.csrk = keys.csrk;
        }
        if keys.identity_address.is_some() {
            self.identity_address = keys.identity_address;
        }
        if keys.key_size > 0 {
            self.key_size = keys.key_size;
        }
        self.security_level = outcome.level;
        self.bonded = true;
        self.pairing = false;
        self.temporary = false;
    }

    /// Take over keys from an older record for the same identity
    pub fn absorb(&mut self, older: SecurityRecord) {
        self.link_key = self.link_key.or(older.link_key);
        self.ltk = self.ltk.or(older.ltk);
        self.irk = self.irk.or(older.irk);
        self.csrk = self.csrk.or(older.csrk);
        self.identity_address = self.identity_address.or(older.identity_address);
        if self.key_size == 0 {
            self.key_size = older.key_size;
        }
        self.security_level = self.security_level.max(older.security_level);
        self.bonded |= older.bonded;
    }

    /// Storage section name for this record
    pub fn section(&self) -> String {
        self.pseudo_address.address.to_string()
    }

    pub fn save(&self, storage: &mut dyn Storage) {
        let section = self.section();
        storage.remove_section(&section);

        storage.set(&section, KEY_ADDR_TYPE, &[u8::from(self.pseudo_address.address_type)]);
        if let Some(identity) = &self.identity_address {
            storage.set(&section, KEY_IDENTITY_ADDR, identity.address.as_slice());
            storage.set(&section, KEY_IDENTITY_ADDR_TYPE, &[u8::from(identity.address_type)]);
        }
        if let Some(link_key) = &self.link_key {
            storage.set(&section, KEY_LINK_KEY, &link_key.key);
            storage.set(&section, KEY_LINK_KEY_TYPE, &[link_key.key_type.to_u8()]);
        }
        if let Some(ltk) = &self.ltk {
            storage.set(&section, KEY_LTK, &ltk.key);
            storage.set(&section, KEY_EDIV, &ltk.ediv.to_le_bytes());
            storage.set(&section, KEY_RAND, &ltk.rand);
        }
        if let Some(irk) = &self.irk {
            storage.set(&section, KEY_IRK, irk);
        }
        if let Some(csrk) = &self.csrk {
            storage.set(&section, KEY_CSRK, csrk);
        }
        storage.set(&section, KEY_KEY_SIZE, &[self.key_size]);
        storage.set(&section, KEY_SECURITY_LEVEL, &[self.security_level.to_u8()]);
    }

    /// Rebuild a bonded record from its section; `None` if the section does
    /// not describe a device
    pub fn load(storage: &dyn Storage, section: &str) -> Option<Self> {
        let address: BdAddr = section.parse().ok()?;
        let address_type = AddressType::from(storage.get_u8(section, KEY_ADDR_TYPE)?);
        let mut record = SecurityRecord::new(AddressWithType::new(address, address_type));

        if let Some(identity) = get_array::<6>(storage, section, KEY_IDENTITY_ADDR) {
            let identity_type = storage
                .get_u8(section, KEY_IDENTITY_ADDR_TYPE)
                .map(AddressType::from)
                .unwrap_or(AddressType::PublicIdentity);
            record.identity_address =
                Some(AddressWithType::new(BdAddr::new(identity), identity_type));
        }

        if let Some(key) = get_array::<16>(storage, section, KEY_LINK_KEY) {
            let key_type = storage
                .get_u8(section, KEY_LINK_KEY_TYPE)
                .map(LinkKeyType::from_u8)
                .unwrap_or(LinkKeyType::Combination);
            record.link_key = Some(LinkKey { key, key_type });
        }

        if let Some(key) = get_array::<16>(storage, section, KEY_LTK) {
            record.ltk = Some(LongTermKey {
                key,
                ediv: storage.get_u16(section, KEY_EDIV).unwrap_or(0),
                rand: get_array::<8>(storage, section, KEY_RAND).unwrap_or([0; 8]),
            });
        }

        record.irk = get_array::<16>(storage, section, KEY_IRK);
        record.csrk = get_array::<16>(storage, section, KEY_CSRK);
        record.key_size = storage.get_u8(section, KEY_KEY_SIZE).unwrap_or(0);
        record.security_level = storage
            .get_u8(section, KEY_SECURITY_LEVEL)
            .map(SecurityLevel::from_u8)
            .unwrap_or_default();
        record.bonded = record.link_key.is_some() || record.ltk.is_some();

        Some(record)
    }
}

//! In-memory cache of security records, rebuilt from storage at init

use super::record::SecurityRecord;
use crate::gap::AddressWithType;
use crate::storage::{Storage, StorageResult};
use log::{debug, info};

#[derive(Debug, Default)]
pub struct SecurityRecordStore {
    records: Vec<SecurityRecord>,
}

impl SecurityRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup by pseudo or identity address
    pub fn find(&self, address: &AddressWithType) -> Option<&SecurityRecord> {
        self.records.iter().find(|r| r.matches(address))
    }

    pub fn find_mut(&mut self, address: &AddressWithType) -> Option<&mut SecurityRecord> {
        self.records.iter_mut().find(|r| r.matches(address))
    }

    /// Never fails; a new record starts unbonded and non-temporary
    pub fn find_or_create(&mut self, address: &AddressWithType) -> &mut SecurityRecord {
        let index = match self.records.iter().position(|r| r.matches(address)) {
            Some(index) => index,
            None => {
                debug!("Creating security record for {}", address);
                self.records.push(SecurityRecord::new(*address));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    pub fn remove(&mut self, address: &AddressWithType) -> Option<SecurityRecord> {
        let index = self.records.iter().position(|r| r.matches(address))?;
        Some(self.records.remove(index))
    }

    pub fn is_bonded(&self, address: &AddressWithType) -> bool {
        self.find(address).is_some_and(|r| r.bonded)
    }

    pub fn records(&self) -> impl Iterator<Item = &SecurityRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps at most one record per identity.
    ///
    /// Once `address` resolved to `identity`, any other record already known
    /// under that identity is folded into the record for `address`.
    pub fn merge_identity(&mut self, address: &AddressWithType, identity: &AddressWithType) {
        let Some(current) = self.records.iter().position(|r| r.pseudo_address == *address) else {
            return;
        };

        let duplicate = self
            .records
            .iter()
            .enumerate()
            .position(|(i, r)| i != current && r.matches(identity));

        if let Some(duplicate) = duplicate {
            info!("Merging security record {} into {}", identity, address);
            let older = self.records.remove(duplicate);
            let current = if duplicate < current { current - 1 } else { current };
            self.records[current].absorb(older);
        }
    }

    /// Replace the cache with every bonded record found in `storage`
    pub fn load_all(&mut self, storage: &dyn Storage) {
        self.records = storage
            .sections()
            .iter()
            .filter_map(|section| SecurityRecord::load(storage, section))
            .collect();
        info!("Loaded {} security records", self.records.len());
    }

    /// Persist bonded, non-temporary records and drop the sections of devices
    /// that are no longer bonded
    pub fn save_all(&self, storage: &mut dyn Storage) -> StorageResult<()> {
        for section in storage.sections() {
            if SecurityRecord::load(storage, &section).is_none() {
                continue;
            }
            let still_bonded = self
                .records
                .iter()
                .any(|r| r.bonded && !r.temporary && r.section() == section);
            if !still_bonded {
                storage.remove_section(&section);
            }
        }

        for record in self.records.iter().filter(|r| r.bonded && !r.temporary) {
            record.save(storage);
        }

        storage.flush()
    }
}

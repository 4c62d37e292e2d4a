use super::{Storage, StorageResult};
use std::collections::BTreeMap;

/// Volatile storage backend
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    sections: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub(super) fn entries(&self) -> &BTreeMap<String, BTreeMap<String, Vec<u8>>> {
        &self.sections
    }
}

impl Storage for MemoryStorage {
    fn get(&self, section: &str, key: &str) -> Option<Vec<u8>> {
        self.sections.get(section)?.get(key).cloned()
    }

    fn set(&mut self, section: &str, key: &str, value: &[u8]) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
    }

    fn remove(&mut self, section: &str, key: &str) -> bool {
        let Some(entries) = self.sections.get_mut(section) else {
            return false;
        };
        let removed = entries.remove(key).is_some();
        if entries.is_empty() {
            self.sections.remove(section);
        }
        removed
    }

    fn remove_section(&mut self, section: &str) -> bool {
        self.sections.remove(section).is_some()
    }

    fn sections(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

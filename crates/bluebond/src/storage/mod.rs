//! Persistent key-value storage used by the security record store
//!
//! Storage is organised as named sections holding byte values under string
//! keys. The in-memory backend serves tests and volatile setups; the config file
//! backend persists to an INI-style file.

mod config_file;
mod memory;


pub use config_file::ConfigFileStorage;
pub use memory::MemoryStorage;

use std::path::PathBuf;
use thiserror::Error;

/// Adapter-wide section
pub const SECTION_ADAPTER: &str = "Adapter";
/// Stack configuration overrides
pub const SECTION_STACK: &str = "Stack";

pub const KEY_ADDRESS: &str = "Address";
pub const KEY_LE_LOCAL_KEY_IRK: &str = "LE_LOCAL_KEY_IRK";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid hex value for {section}/{key}")]
    InvalidValue { section: String, key: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage collaborator
pub trait Storage {
    fn get(&self, section: &str, key: &str) -> Option<Vec<u8>>;

    fn set(&mut self, section: &str, key: &str, value: &[u8]);

    /// Returns true if the key existed
    fn remove(&mut self, section: &str, key: &str) -> bool;

    /// Returns true if the section existed
    fn remove_section(&mut self, section: &str) -> bool;

    fn sections(&self) -> Vec<String>;

    /// Persists pending writes; a no-op for volatile backends
    fn flush(&mut self) -> StorageResult<()>;

    fn has_section(&self, section: &str) -> bool {
        self.sections().iter().any(|s| s == section)
    }

    fn get_u8(&self, section: &str, key: &str) -> Option<u8> {
        match self.get(section, key)?.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    fn get_u16(&self, section: &str, key: &str) -> Option<u16> {
        let value = self.get(section, key)?;
        let bytes: [u8; 2] = value.as_slice().try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }
}

/// Fixed-size read through a trait object
pub fn get_array<const N: usize>(storage: &dyn Storage, section: &str, key: &str) -> Option<[u8; N]> {
    storage.get(section, key)?.as_slice().try_into().ok()
}

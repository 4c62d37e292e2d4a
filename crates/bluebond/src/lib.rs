//! Bluebond - host-side Bluetooth pairing, bonding and connection management
//!
//! This library drives classic and LE pairing to completion, persists the
//! resulting keys, and arbitrates the controller's LE accept list between
//! background, announcement-driven and direct connection requests. Classic
//! inquiry and paging helpers round out the discovery side.
//!
//! All state lives in a single [`Host`] context. The embedding feeds it HCI
//! events and timer ticks; nothing here spawns threads or takes locks.

pub mod alarm;
pub mod config;
pub mod connection;
pub mod error;
pub mod gap;
pub mod hci;
pub mod host;
pub mod neighbor;
pub mod scan;
pub mod security;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use config::StackConfig;
pub use connection::{AcceptListController, AppId, ConnectionManager, HciAcceptList};
pub use error::{Error, HciError, Result};
pub use gap::{AddressType, AddressWithType, BdAddr};
pub use hci::{CommandSender, HciCommand, HciEvent, HciSocket, LeAdvertisingReport};
pub use host::Host;
pub use neighbor::{InquiryEvent, InquiryModule, NeighborError, PageModule};
pub use security::{
    PairingUi, SecurityError, SecurityEvent, SecurityManager, SecurityRecord, SmpChannel,
};
pub use storage::{ConfigFileStorage, MemoryStorage, Storage, StorageError};

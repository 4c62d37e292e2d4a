//! Controller accept list access

use crate::gap::AddressWithType;
use crate::hci::{CommandSender, HciCommand};
use crate::scan::set_passive_scan;
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap};

/// The controller resource the connection manager arbitrates
pub trait AcceptListController {
    /// Returns false when the device could not be added, typically because the
    /// list is full. `is_direct` marks a foreground attempt.
    fn add(&mut self, address: &AddressWithType, is_direct: bool) -> bool;
    fn remove(&mut self, address: &AddressWithType);
    fn clear(&mut self);
    /// Scan for announcements on behalf of addresses kept off the list
    fn set_announcement_filter(&mut self, enable: bool);
    fn is_connected(&self, address: &AddressWithType) -> bool;
}

/// Accept list backed by LE HCI commands
///
/// Mirrors the controller's list to enforce its capacity and remembers the LE
/// links that are up so announcements from connected peers can be ignored.
#[derive(Debug)]
pub struct HciAcceptList<S: CommandSender> {
    sender: S,
    capacity: usize,
    entries: BTreeSet<AddressWithType>,
    connections: HashMap<u16, AddressWithType>,
    scanning: bool,
}

impl<S: CommandSender> HciAcceptList<S> {
    pub fn new(sender: S, capacity: usize) -> Self {
        Self {
            sender,
            capacity,
            entries: BTreeSet::new(),
            connections: HashMap::new(),
            scanning: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, address: &AddressWithType) -> bool {
        self.entries.contains(address)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn on_le_connection_complete(&mut self, status: u8, handle: u16, peer: AddressWithType) {
        if status != 0 {
            debug!("LE connection to {} failed, status 0x{:02x}", peer, status);
            return;
        }
        self.connections.insert(handle, peer);
    }

    pub fn on_disconnection(&mut self, handle: u16) -> Option<AddressWithType> {
        self.connections.remove(&handle)
    }
}

impl<S: CommandSender> AcceptListController for HciAcceptList<S> {
    fn add(&mut self, address: &AddressWithType, is_direct: bool) -> bool {
        // Re-adding a known entry is harmless and repairs a list the
        // controller pruned on its own after a direct connection timed out
        if !self.entries.contains(address) && self.entries.len() >= self.capacity {
            warn!("Accept list full ({} entries), cannot add {}", self.capacity, address);
            return false;
        }

        let command = HciCommand::LeAddDeviceToFilterAcceptList {
            address_type: u8::from(address.address_type.to_over_the_air()),
            address: address.address,
        };
        if let Err(e) = self.sender.send_command(command) {
            error!("Failed to add {} to the accept list: {}", address, e);
            return false;
        }

        if is_direct {
            info!("Accept list add {} for a direct connection", address);
        } else {
            debug!("Accept list add {}", address);
        }
        self.entries.insert(*address);
        true
    }

    fn remove(&mut self, address: &AddressWithType) {
        if !self.entries.remove(address) {
            debug!("{} is not on the accept list", address);
            return;
        }

        let command = HciCommand::LeRemoveDeviceFromFilterAcceptList {
            address_type: u8::from(address.address_type.to_over_the_air()),
            address: address.address,
        };
        if let Err(e) = self.sender.send_command(command) {
            error!("Failed to remove {} from the accept list: {}", address, e);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.sender.send_command(HciCommand::LeClearFilterAcceptList) {
            error!("Failed to clear the accept list: {}", e);
        }
    }

    fn set_announcement_filter(&mut self, enable: bool) {
        if self.scanning == enable {
            return;
        }
        match set_passive_scan(&self.sender, enable) {
            Ok(()) => self.scanning = enable,
            Err(e) => error!("Failed to switch announcement scanning: {}", e),
        }
    }

    fn is_connected(&self, address: &AddressWithType) -> bool {
        self.connections.values().any(|peer| peer == address)
    }
}

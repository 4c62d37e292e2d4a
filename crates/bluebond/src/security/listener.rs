//! Bond state notifications
//!
//! Each listener owns the receiving end of a channel and drains it on its own
//! context. Delivery to one listener is FIFO.

use super::types::PairingFailure;
use crate::gap::AddressWithType;
use log::{debug, warn};
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    Bonded(AddressWithType),
    BondFailed(AddressWithType, PairingFailure),
    Unbonded(AddressWithType),
    EncryptionStateChanged {
        address: Option<AddressWithType>,
        handle: u16,
        status: u8,
        enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
pub struct Listeners {
    next_id: u64,
    senders: Vec<(ListenerId, Sender<SecurityEvent>)>,
}

impl Listeners {
    pub fn register(&mut self, sender: Sender<SecurityEvent>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.senders.push((id, sender));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(existing, _)| *existing != id);
        self.senders.len() != before
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Post `event` to every listener, forgetting those that hung up
    pub fn notify(&mut self, event: SecurityEvent) {
        debug!("Security event {:?}", event);
        self.senders.retain(|(id, sender)| {
            if sender.send(event.clone()).is_ok() {
                true
            } else {
                warn!("Dropping listener {:?}, receiver is gone", id);
                false
            }
        });
    }
}

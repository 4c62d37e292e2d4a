//! Command submission and event subscription

use crate::error::HciError;
use crate::hci::packet::HciCommand;
use log::warn;
use std::collections::HashMap;
use std::rc::Rc;

/// Anything that can queue an HCI command towards the controller.
///
/// Responses come back later as command complete/status events on the
/// owning context.
pub trait CommandSender {
    fn send_command(&self, command: HciCommand) -> Result<(), HciError>;
}

impl<T: CommandSender + ?Sized> CommandSender for Rc<T> {
    fn send_command(&self, command: HciCommand) -> Result<(), HciError> {
        (**self).send_command(command)
    }
}

impl<T: CommandSender + ?Sized> CommandSender for Box<T> {
    fn send_command(&self, command: HciCommand) -> Result<(), HciError> {
        (**self).send_command(command)
    }
}

/// Event-code keyed subscription table.
///
/// Each event code has at most one owner; registering a code that is already
/// owned keeps the first owner and logs.
#[derive(Debug)]
pub struct EventRouter<T> {
    owners: HashMap<u8, T>,
}

impl<T> Default for EventRouter<T> {
    fn default() -> Self {
        Self {
            owners: HashMap::new(),
        }
    }
}

impl<T: Copy + PartialEq + std::fmt::Debug> EventRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_code: u8, owner: T) -> bool {
        if let Some(existing) = self.owners.get(&event_code) {
            if *existing != owner {
                warn!(
                    "Event 0x{:02x} already owned by {:?}, ignoring {:?}",
                    event_code, existing, owner
                );
            }
            return false;
        }
        self.owners.insert(event_code, owner);
        true
    }

    pub fn unregister(&mut self, event_code: u8) -> Option<T> {
        self.owners.remove(&event_code)
    }

    pub fn route(&self, event_code: u8) -> Option<T> {
        self.owners.get(&event_code).copied()
    }

    pub fn is_registered(&self, event_code: u8) -> bool {
        self.owners.contains_key(&event_code)
    }
}

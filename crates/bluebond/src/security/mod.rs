//! Pairing and bonding
//!
//! The [`SecurityManager`] owns one pairing handler per remote device, the
//! security records and the listener list. Classic handshakes follow the
//! controller's pairing events; LE handshakes run SMP over the fixed channel.

pub mod channel;
pub mod classic;
pub mod handler;
pub mod listener;
pub mod manager;
pub mod record;
pub mod record_store;
pub mod smp;
pub mod types;
pub mod ui;

#[cfg(test)]
mod tests;

pub use channel::SmpChannel;
pub use classic::{ClassicPairingHandler, RemoteClassicOob};
pub use handler::{
    Completer, CompletionStatus, HandlerContext, PairingCompletion, PairingHandler, PairingInput,
    PairingState, PairingStateMachine,
};
pub use listener::{ListenerId, Listeners, SecurityEvent};
pub use manager::SecurityManager;
pub use record::SecurityRecord;
pub use record_store::SecurityRecordStore;
pub use types::*;
pub use ui::{LoggingUi, PairingUi};

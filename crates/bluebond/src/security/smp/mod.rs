//! Security Manager Protocol (SMP) for LE links
//!
//! PDU codec, the crypto collaborator interface and the LE Secure
//! Connections pairing handler.

pub mod constants;
pub mod crypto;
pub mod handler;
pub mod pdu;
pub mod types;


pub use crypto::{PrivateKey, PublicKey, SmpCrypto};
pub use handler::{LePairingHandler, LocalOobKeys};
pub use pdu::SmpPdu;
pub use types::*;

//! Bluetooth HCI (Host Controller Interface) plumbing
//!
//! Command encoding, typed event views, the raw socket transport and the
//! event-code subscription table shared by the security, connection and
//! discovery layers.

pub mod constants;
pub mod event;
pub mod packet;
pub mod socket;
pub mod transport;


pub use event::{
    command_complete_status, EventPacket, InquiryResponse, LeAdvertisingReport,
    SecurityEventPacket,
};
pub use packet::{HciCommand, HciEvent};
pub use socket::HciSocket;
pub use transport::{CommandSender, EventRouter};

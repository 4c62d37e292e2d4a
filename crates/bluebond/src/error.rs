//! Error types for the bluebond library
//!
//! Each protocol area defines its own error enum next to its types; this module
//! holds the HCI transport errors and the crate-wide aggregate.

use thiserror::Error;

/// Errors that can occur when talking to an HCI controller
#[derive(Error, Debug)]
pub enum HciError {
    #[error("Failed to open HCI socket: {0}")]
    SocketError(#[from] std::io::Error),

    #[error("Failed to bind to HCI device: {0}")]
    BindError(std::io::Error),

    #[error("Failed to send HCI command: {0}")]
    SendError(std::io::Error),

    #[error("Failed to receive HCI event: {0}")]
    ReceiveError(std::io::Error),

    #[error("Invalid parameter length: {0}")]
    InvalidParamLength(usize),

    #[error("Invalid HCI packet format")]
    InvalidPacketFormat,

    #[error("Truncated {0} event")]
    TruncatedEvent(&'static str),

    #[error("Unsupported operation")]
    Unsupported,
}

/// Crate-wide error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Hci(#[from] HciError),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Security(#[from] crate::security::SecurityError),

    #[error(transparent)]
    Smp(#[from] crate::security::smp::SmpError),

    #[error(transparent)]
    Neighbor(#[from] crate::neighbor::NeighborError),
}

pub type Result<T> = std::result::Result<T, Error>;

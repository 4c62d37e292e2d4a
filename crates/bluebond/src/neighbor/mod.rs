//! Classic neighbor discovery
//!
//! Inquiry and paging are thin command sequences. The modules keep a local
//! mirror of the controller's scan settings, refreshed from command complete
//! events, mostly so they can be logged.

pub mod inquiry;
pub mod page;
pub mod scan_parameters;

#[cfg(test)]
mod tests;

use crate::error::HciError;
use thiserror::Error;

pub use inquiry::{InquiryEvent, InquiryModule};
pub use page::PageModule;
pub use scan_parameters::{page_timeout_ms, InquiryMode, ScanParameters, ScanType};

#[derive(Error, Debug)]
pub enum NeighborError {
    #[error("An inquiry is already active")]
    InquiryActive,

    #[error("No inquiry of that kind is active")]
    InquiryNotActive,

    #[error("No inquiry event receiver registered")]
    NoCallbacks,

    #[error(transparent)]
    Hci(#[from] HciError),
}

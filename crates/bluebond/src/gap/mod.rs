//! Generic Access Profile types shared by the security and connection layers

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;

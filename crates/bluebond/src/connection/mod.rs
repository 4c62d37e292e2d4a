//! LE background connection management
//!
//! Many clients can ask for the same peripheral at once: some want an
//! opportunistic background connection, some only want to connect once the
//! peer sends a targeted announcement, and some want a time-bounded direct
//! connection. The [`ConnectionManager`] folds those interests into a single
//! membership decision per address against the controller's accept list.

pub mod accept_list;
pub mod announcement;
pub mod manager;

#[cfg(test)]
mod tests;

pub use accept_list::{AcceptListController, HciAcceptList};
pub use announcement::is_targeted_announcement;
pub use manager::{AppId, ConnectionManager, DirectConnectTimeout};

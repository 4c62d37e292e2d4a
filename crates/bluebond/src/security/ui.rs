//! User interface collaborator for pairing prompts
//!
//! Every prompt is fire-and-forget. Answers come back through the security
//! manager's `on_confirm_yes_no`, `on_passkey_entry`, `on_pin_entry` and
//! `on_pairing_prompt_accepted`.

use crate::gap::AddressWithType;
use log::info;

pub trait PairingUi {
    /// Ask whether to pair with a device that initiated pairing
    fn display_pairing_prompt(&self, address: &AddressWithType);

    /// Withdraw any prompt shown for `address`
    fn cancel(&self, address: &AddressWithType);

    /// Show a six digit value and ask whether it matches the peer
    fn display_confirm_value(&self, address: &AddressWithType, value: u32);

    fn display_yes_no_dialog(&self, address: &AddressWithType);

    fn display_enter_passkey_dialog(&self, address: &AddressWithType);

    fn display_passkey(&self, address: &AddressWithType, passkey: u32);

    fn display_enter_pin_dialog(&self, address: &AddressWithType);
}

/// Default UI until the application installs one. Prompts are logged and
/// never answered, so interactive pairing runs into its timeout.
#[derive(Debug, Default)]
pub struct LoggingUi;

impl PairingUi for LoggingUi {
    fn display_pairing_prompt(&self, address: &AddressWithType) {
        info!("Pairing prompt for {}", address);
    }

    fn cancel(&self, address: &AddressWithType) {
        info!("Cancel prompt for {}", address);
    }

    fn display_confirm_value(&self, address: &AddressWithType, value: u32) {
        info!("Confirm value {:06} for {}", value, address);
    }

    fn display_yes_no_dialog(&self, address: &AddressWithType) {
        info!("Yes/no dialog for {}", address);
    }

    fn display_enter_passkey_dialog(&self, address: &AddressWithType) {
        info!("Passkey entry for {}", address);
    }

    fn display_passkey(&self, address: &AddressWithType, passkey: u32) {
        info!("Passkey {:06} for {}", passkey, address);
    }

    fn display_enter_pin_dialog(&self, address: &AddressWithType) {
        info!("PIN entry for {}", address);
    }
}

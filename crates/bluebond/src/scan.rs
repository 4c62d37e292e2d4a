//! Bluetooth LE scanning helpers
//!
//! Advertising data parsing and the passive scan toggle used while waiting for
//! targeted announcements.

use crate::error::HciError;
use crate::gap::ADV_TYPE_SERVICE_DATA_16BIT_UUID;
use crate::hci::{CommandSender, HciCommand};

/// Passive scan interval used for announcement detection (60 ms)
pub const ANNOUNCEMENT_SCAN_INTERVAL: u16 = 0x0060;
/// Passive scan window used for announcement detection (30 ms)
pub const ANNOUNCEMENT_SCAN_WINDOW: u16 = 0x0030;

/// Turn passive LE scanning on or off
///
/// Enabling writes the scan parameters first; disabling only stops the scan.
pub fn set_passive_scan(sender: &dyn CommandSender, enable: bool) -> Result<(), HciError> {
    if enable {
        sender.send_command(HciCommand::LeSetScanParameters {
            scan_type: 0x00,
            scan_interval: ANNOUNCEMENT_SCAN_INTERVAL,
            scan_window: ANNOUNCEMENT_SCAN_WINDOW,
            own_address_type: 0x00,
            filter_policy: 0x00,
        })?;
    }

    sender.send_command(HciCommand::LeSetScanEnable {
        enable,
        filter_duplicates: false,
    })
}

/// Parse advertisement data from a LE Advertising Report
///
/// # Arguments
///
/// * `data` - The advertisement data
///
/// # Returns
///
/// A vector of (type, data) tuples; parsing stops at the first malformed
/// structure
pub fn parse_advertising_data(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + length >= data.len() {
            break;
        }

        let ad_type = data[i + 1];
        let ad_data = data[i + 2..i + 1 + length].to_vec();

        result.push((ad_type, ad_data));

        i += 1 + length;
    }

    result
}

/// Every 16-bit UUID service data structure as (uuid, payload)
pub fn service_data_16bit(data: &[u8]) -> Vec<(u16, Vec<u8>)> {
    parse_advertising_data(data)
        .into_iter()
        .filter(|(ad_type, value)| *ad_type == ADV_TYPE_SERVICE_DATA_16BIT_UUID && value.len() >= 2)
        .map(|(_, value)| (u16::from_le_bytes([value[0], value[1]]), value[2..].to_vec()))
        .collect()
}

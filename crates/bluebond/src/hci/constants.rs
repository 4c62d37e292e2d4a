//! HCI protocol constants
//!
//! This module contains constants used in the Bluetooth HCI protocol.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_EVENT_PKT: u8 = 0x04;

// Common OGF (Opcode Group Field) values
pub const OGF_LINK_CTL: u8 = 0x01;
pub const OGF_HOST_CTL: u8 = 0x03;
pub const OGF_LE: u8 = 0x08;

/// Packs an OGF/OCF pair into a command opcode
pub const fn opcode(ogf: u8, ocf: u16) -> u16 {
    ((ogf as u16) << 10) | (ocf & 0x3ff)
}

// Link Control Commands (OGF: 0x01)
pub const OCF_INQUIRY: u16 = 0x0001;
pub const OCF_INQUIRY_CANCEL: u16 = 0x0002;
pub const OCF_PERIODIC_INQUIRY_MODE: u16 = 0x0003;
pub const OCF_EXIT_PERIODIC_INQUIRY_MODE: u16 = 0x0004;
pub const OCF_CREATE_CONNECTION: u16 = 0x0005;
pub const OCF_DISCONNECT: u16 = 0x0006;
pub const OCF_LINK_KEY_REQUEST_REPLY: u16 = 0x000B;
pub const OCF_LINK_KEY_REQUEST_NEGATIVE_REPLY: u16 = 0x000C;
pub const OCF_PIN_CODE_REQUEST_REPLY: u16 = 0x000D;
pub const OCF_PIN_CODE_REQUEST_NEGATIVE_REPLY: u16 = 0x000E;
pub const OCF_AUTHENTICATION_REQUESTED: u16 = 0x0011;
pub const OCF_SET_CONNECTION_ENCRYPTION: u16 = 0x0013;
pub const OCF_IO_CAPABILITY_REQUEST_REPLY: u16 = 0x002B;
pub const OCF_USER_CONFIRMATION_REQUEST_REPLY: u16 = 0x002C;
pub const OCF_USER_CONFIRMATION_REQUEST_NEGATIVE_REPLY: u16 = 0x002D;
pub const OCF_USER_PASSKEY_REQUEST_REPLY: u16 = 0x002E;
pub const OCF_USER_PASSKEY_REQUEST_NEGATIVE_REPLY: u16 = 0x002F;
pub const OCF_REMOTE_OOB_DATA_REQUEST_REPLY: u16 = 0x0030;
pub const OCF_REMOTE_OOB_DATA_REQUEST_NEGATIVE_REPLY: u16 = 0x0033;
pub const OCF_IO_CAPABILITY_REQUEST_NEGATIVE_REPLY: u16 = 0x0034;
pub const OCF_REMOTE_OOB_EXTENDED_DATA_REQUEST_REPLY: u16 = 0x0045;

// Host Controller Commands (OGF: 0x03)
pub const OCF_RESET: u16 = 0x0003;
pub const OCF_DELETE_STORED_LINK_KEY: u16 = 0x0012;
pub const OCF_READ_PAGE_TIMEOUT: u16 = 0x0017;
pub const OCF_WRITE_PAGE_TIMEOUT: u16 = 0x0018;
pub const OCF_READ_PAGE_SCAN_ACTIVITY: u16 = 0x001B;
pub const OCF_WRITE_PAGE_SCAN_ACTIVITY: u16 = 0x001C;
pub const OCF_READ_INQUIRY_SCAN_ACTIVITY: u16 = 0x001D;
pub const OCF_WRITE_INQUIRY_SCAN_ACTIVITY: u16 = 0x001E;
pub const OCF_READ_INQUIRY_SCAN_TYPE: u16 = 0x0042;
pub const OCF_WRITE_INQUIRY_SCAN_TYPE: u16 = 0x0043;
pub const OCF_READ_INQUIRY_MODE: u16 = 0x0044;
pub const OCF_WRITE_INQUIRY_MODE: u16 = 0x0045;
pub const OCF_READ_PAGE_SCAN_TYPE: u16 = 0x0046;
pub const OCF_WRITE_PAGE_SCAN_TYPE: u16 = 0x0047;
pub const OCF_WRITE_SIMPLE_PAIRING_MODE: u16 = 0x0056;
pub const OCF_READ_INQUIRY_RESPONSE_TRANSMIT_POWER_LEVEL: u16 = 0x0058;
pub const OCF_WRITE_SECURE_CONNECTIONS_HOST_SUPPORT: u16 = 0x007A;

// LE Command OCF values (OGF: 0x08)
pub const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
pub const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;
pub const OCF_LE_CLEAR_FILTER_ACCEPT_LIST: u16 = 0x0010;
pub const OCF_LE_ADD_DEVICE_TO_FILTER_ACCEPT_LIST: u16 = 0x0011;
pub const OCF_LE_REMOVE_DEVICE_FROM_FILTER_ACCEPT_LIST: u16 = 0x0012;
pub const OCF_LE_START_ENCRYPTION: u16 = 0x0019;
pub const OCF_LE_LONG_TERM_KEY_REQUEST_REPLY: u16 = 0x001A;
pub const OCF_LE_LONG_TERM_KEY_REQUEST_NEGATIVE_REPLY: u16 = 0x001B;

// HCI Events
pub const EVT_INQUIRY_COMPLETE: u8 = 0x01;
pub const EVT_INQUIRY_RESULT: u8 = 0x02;
pub const EVT_CONN_COMPLETE: u8 = 0x03;
pub const EVT_DISCONN_COMPLETE: u8 = 0x05;
pub const EVT_AUTHENTICATION_COMPLETE: u8 = 0x06;
pub const EVT_ENCRYPTION_CHANGE: u8 = 0x08;
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_CMD_STATUS: u8 = 0x0F;
pub const EVT_PIN_CODE_REQUEST: u8 = 0x16;
pub const EVT_LINK_KEY_REQUEST: u8 = 0x17;
pub const EVT_LINK_KEY_NOTIFICATION: u8 = 0x18;
pub const EVT_INQUIRY_RESULT_WITH_RSSI: u8 = 0x22;
pub const EVT_EXTENDED_INQUIRY_RESULT: u8 = 0x2F;
pub const EVT_IO_CAPABILITY_REQUEST: u8 = 0x31;
pub const EVT_IO_CAPABILITY_RESPONSE: u8 = 0x32;
pub const EVT_USER_CONFIRMATION_REQUEST: u8 = 0x33;
pub const EVT_USER_PASSKEY_REQUEST: u8 = 0x34;
pub const EVT_REMOTE_OOB_DATA_REQUEST: u8 = 0x35;
pub const EVT_SIMPLE_PAIRING_COMPLETE: u8 = 0x36;
pub const EVT_USER_PASSKEY_NOTIFICATION: u8 = 0x3B;
pub const EVT_KEYPRESS_NOTIFICATION: u8 = 0x3C;
pub const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta Events
pub const EVT_LE_CONN_COMPLETE: u8 = 0x01;
pub const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;
pub const EVT_LE_LONG_TERM_KEY_REQUEST: u8 = 0x05;

// Status and disconnect reasons
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_AUTHENTICATION_FAILURE: u8 = 0x05;
pub const HCI_REMOTE_USER_TERMINATED_CONNECTION: u8 = 0x13;

// Inquiry access codes
pub const GIAC: u32 = 0x9E8B33;
pub const LIAC: u32 = 0x9E8B00;

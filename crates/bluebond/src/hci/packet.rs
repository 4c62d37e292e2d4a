//! HCI packet structures and parsing
//!
//! This module contains the commands the security, connection and discovery
//! layers issue, and the raw event container read from the controller.

use crate::gap::BdAddr;
use crate::hci::constants::*;

/// HCI commands issued by this stack
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // Link Control Commands (OGF: 0x01)
    Inquiry {
        lap: u32,
        inquiry_length: u8,
        num_responses: u8,
    },
    InquiryCancel,
    PeriodicInquiryMode {
        max_period_length: u16,
        min_period_length: u16,
        lap: u32,
        inquiry_length: u8,
        num_responses: u8,
    },
    ExitPeriodicInquiryMode,
    CreateConnection {
        bd_addr: BdAddr,
        packet_type: u16,
    },
    Disconnect {
        handle: u16,
        reason: u8,
    },
    LinkKeyRequestReply {
        bd_addr: BdAddr,
        link_key: [u8; 16],
    },
    LinkKeyRequestNegativeReply {
        bd_addr: BdAddr,
    },
    PinCodeRequestReply {
        bd_addr: BdAddr,
        pin: Vec<u8>,
    },
    PinCodeRequestNegativeReply {
        bd_addr: BdAddr,
    },
    AuthenticationRequested {
        handle: u16,
    },
    SetConnectionEncryption {
        handle: u16,
        enable: bool,
    },
    IoCapabilityRequestReply {
        bd_addr: BdAddr,
        io_capability: u8,
        oob_data_present: u8,
        authentication_requirements: u8,
    },
    IoCapabilityRequestNegativeReply {
        bd_addr: BdAddr,
        reason: u8,
    },
    UserConfirmationRequestReply {
        bd_addr: BdAddr,
    },
    UserConfirmationRequestNegativeReply {
        bd_addr: BdAddr,
    },
    UserPasskeyRequestReply {
        bd_addr: BdAddr,
        passkey: u32,
    },
    UserPasskeyRequestNegativeReply {
        bd_addr: BdAddr,
    },
    RemoteOobDataRequestReply {
        bd_addr: BdAddr,
        c: [u8; 16],
        r: [u8; 16],
    },
    RemoteOobExtendedDataRequestReply {
        bd_addr: BdAddr,
        c_192: [u8; 16],
        r_192: [u8; 16],
        c_256: [u8; 16],
        r_256: [u8; 16],
    },
    RemoteOobDataRequestNegativeReply {
        bd_addr: BdAddr,
    },

    // Host Controller Commands (OGF: 0x03)
    Reset,
    DeleteStoredLinkKey {
        bd_addr: BdAddr,
        delete_all: bool,
    },
    ReadPageTimeout,
    WritePageTimeout {
        timeout: u16,
    },
    ReadPageScanActivity,
    WritePageScanActivity {
        interval: u16,
        window: u16,
    },
    ReadInquiryScanActivity,
    WriteInquiryScanActivity {
        interval: u16,
        window: u16,
    },
    ReadInquiryScanType,
    WriteInquiryScanType {
        scan_type: u8,
    },
    ReadInquiryMode,
    WriteInquiryMode {
        mode: u8,
    },
    ReadPageScanType,
    WritePageScanType {
        scan_type: u8,
    },
    WriteSimplePairingMode {
        enabled: bool,
    },
    ReadInquiryResponseTransmitPowerLevel,
    WriteSecureConnectionsHostSupport {
        enabled: bool,
    },

    // LE Commands (OGF: 0x08)
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable {
        enable: bool,
        filter_duplicates: bool,
    },
    LeClearFilterAcceptList,
    LeAddDeviceToFilterAcceptList {
        address_type: u8,
        address: BdAddr,
    },
    LeRemoveDeviceFromFilterAcceptList {
        address_type: u8,
        address: BdAddr,
    },
    LeStartEncryption {
        handle: u16,
        rand: [u8; 8],
        ediv: u16,
        ltk: [u8; 16],
    },
    LeLongTermKeyRequestReply {
        handle: u16,
        ltk: [u8; 16],
    },
    LeLongTermKeyRequestNegativeReply {
        handle: u16,
    },
}

fn push_lap(params: &mut Vec<u8>, lap: u32) {
    params.extend_from_slice(&lap.to_le_bytes()[..3]);
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            // Link Control Commands
            Self::Inquiry { .. } => (OGF_LINK_CTL, OCF_INQUIRY),
            Self::InquiryCancel => (OGF_LINK_CTL, OCF_INQUIRY_CANCEL),
            Self::PeriodicInquiryMode { .. } => (OGF_LINK_CTL, OCF_PERIODIC_INQUIRY_MODE),
            Self::ExitPeriodicInquiryMode => (OGF_LINK_CTL, OCF_EXIT_PERIODIC_INQUIRY_MODE),
            Self::CreateConnection { .. } => (OGF_LINK_CTL, OCF_CREATE_CONNECTION),
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),
            Self::LinkKeyRequestReply { .. } => (OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_REPLY),
            Self::LinkKeyRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_NEGATIVE_REPLY)
            }
            Self::PinCodeRequestReply { .. } => (OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_REPLY),
            Self::PinCodeRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_NEGATIVE_REPLY)
            }
            Self::AuthenticationRequested { .. } => (OGF_LINK_CTL, OCF_AUTHENTICATION_REQUESTED),
            Self::SetConnectionEncryption { .. } => (OGF_LINK_CTL, OCF_SET_CONNECTION_ENCRYPTION),
            Self::IoCapabilityRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_REPLY)
            }
            Self::IoCapabilityRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_NEGATIVE_REPLY)
            }
            Self::UserConfirmationRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_REPLY)
            }
            Self::UserConfirmationRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_NEGATIVE_REPLY)
            }
            Self::UserPasskeyRequestReply { .. } => (OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_REPLY),
            Self::UserPasskeyRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_NEGATIVE_REPLY)
            }
            Self::RemoteOobDataRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_REPLY)
            }
            Self::RemoteOobExtendedDataRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_REMOTE_OOB_EXTENDED_DATA_REQUEST_REPLY)
            }
            Self::RemoteOobDataRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_NEGATIVE_REPLY)
            }

            // Host Controller Commands
            Self::Reset => (OGF_HOST_CTL, OCF_RESET),
            Self::DeleteStoredLinkKey { .. } => (OGF_HOST_CTL, OCF_DELETE_STORED_LINK_KEY),
            Self::ReadPageTimeout => (OGF_HOST_CTL, OCF_READ_PAGE_TIMEOUT),
            Self::WritePageTimeout { .. } => (OGF_HOST_CTL, OCF_WRITE_PAGE_TIMEOUT),
            Self::ReadPageScanActivity => (OGF_HOST_CTL, OCF_READ_PAGE_SCAN_ACTIVITY),
            Self::WritePageScanActivity { .. } => (OGF_HOST_CTL, OCF_WRITE_PAGE_SCAN_ACTIVITY),
            Self::ReadInquiryScanActivity => (OGF_HOST_CTL, OCF_READ_INQUIRY_SCAN_ACTIVITY),
            Self::WriteInquiryScanActivity { .. } => {
                (OGF_HOST_CTL, OCF_WRITE_INQUIRY_SCAN_ACTIVITY)
            }
            Self::ReadInquiryScanType => (OGF_HOST_CTL, OCF_READ_INQUIRY_SCAN_TYPE),
            Self::WriteInquiryScanType { .. } => (OGF_HOST_CTL, OCF_WRITE_INQUIRY_SCAN_TYPE),
            Self::ReadInquiryMode => (OGF_HOST_CTL, OCF_READ_INQUIRY_MODE),
            Self::WriteInquiryMode { .. } => (OGF_HOST_CTL, OCF_WRITE_INQUIRY_MODE),
            Self::ReadPageScanType => (OGF_HOST_CTL, OCF_READ_PAGE_SCAN_TYPE),
            Self::WritePageScanType { .. } => (OGF_HOST_CTL, OCF_WRITE_PAGE_SCAN_TYPE),
            Self::WriteSimplePairingMode { .. } => (OGF_HOST_CTL, OCF_WRITE_SIMPLE_PAIRING_MODE),
            Self::ReadInquiryResponseTransmitPowerLevel => {
                (OGF_HOST_CTL, OCF_READ_INQUIRY_RESPONSE_TRANSMIT_POWER_LEVEL)
            }
            Self::WriteSecureConnectionsHostSupport { .. } => {
                (OGF_HOST_CTL, OCF_WRITE_SECURE_CONNECTIONS_HOST_SUPPORT)
            }

            // LE Commands
            Self::LeSetScanParameters { .. } => (OGF_LE, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE, OCF_LE_SET_SCAN_ENABLE),
            Self::LeClearFilterAcceptList => (OGF_LE, OCF_LE_CLEAR_FILTER_ACCEPT_LIST),
            Self::LeAddDeviceToFilterAcceptList { .. } => {
                (OGF_LE, OCF_LE_ADD_DEVICE_TO_FILTER_ACCEPT_LIST)
            }
            Self::LeRemoveDeviceFromFilterAcceptList { .. } => {
                (OGF_LE, OCF_LE_REMOVE_DEVICE_FROM_FILTER_ACCEPT_LIST)
            }
            Self::LeStartEncryption { .. } => (OGF_LE, OCF_LE_START_ENCRYPTION),
            Self::LeLongTermKeyRequestReply { .. } => (OGF_LE, OCF_LE_LONG_TERM_KEY_REQUEST_REPLY),
            Self::LeLongTermKeyRequestNegativeReply { .. } => {
                (OGF_LE, OCF_LE_LONG_TERM_KEY_REQUEST_NEGATIVE_REPLY)
            }
        }
    }

    /// Packed 16-bit opcode
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        opcode(ogf, ocf)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        let mut params = Vec::with_capacity(16);
        match self {
            Self::InquiryCancel
            | Self::ExitPeriodicInquiryMode
            | Self::Reset
            | Self::ReadPageTimeout
            | Self::ReadPageScanActivity
            | Self::ReadInquiryScanActivity
            | Self::ReadInquiryScanType
            | Self::ReadInquiryMode
            | Self::ReadPageScanType
            | Self::ReadInquiryResponseTransmitPowerLevel
            | Self::LeClearFilterAcceptList => {}

            Self::Inquiry {
                lap,
                inquiry_length,
                num_responses,
            } => {
                push_lap(&mut params, *lap);
                params.push(*inquiry_length);
                params.push(*num_responses);
            }

            Self::PeriodicInquiryMode {
                max_period_length,
                min_period_length,
                lap,
                inquiry_length,
                num_responses,
            } => {
                params.extend_from_slice(&max_period_length.to_le_bytes());
                params.extend_from_slice(&min_period_length.to_le_bytes());
                push_lap(&mut params, *lap);
                params.push(*inquiry_length);
                params.push(*num_responses);
            }

            Self::CreateConnection {
                bd_addr,
                packet_type,
            } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(&packet_type.to_le_bytes());
                // Page scan repetition mode R1, reserved, clock offset, allow role switch
                params.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x01]);
            }

            Self::Disconnect { handle, reason } => {
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*reason);
            }

            Self::LinkKeyRequestReply { bd_addr, link_key } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(link_key);
            }

            Self::PinCodeRequestReply { bd_addr, pin } => {
                let len = pin.len().min(16);
                params.extend_from_slice(bd_addr.as_slice());
                params.push(len as u8);
                let mut padded = [0u8; 16];
                padded[..len].copy_from_slice(&pin[..len]);
                params.extend_from_slice(&padded);
            }

            Self::LinkKeyRequestNegativeReply { bd_addr }
            | Self::PinCodeRequestNegativeReply { bd_addr }
            | Self::UserConfirmationRequestReply { bd_addr }
            | Self::UserConfirmationRequestNegativeReply { bd_addr }
            | Self::UserPasskeyRequestNegativeReply { bd_addr }
            | Self::RemoteOobDataRequestNegativeReply { bd_addr } => {
                params.extend_from_slice(bd_addr.as_slice());
            }

            Self::AuthenticationRequested { handle } => {
                params.extend_from_slice(&handle.to_le_bytes());
            }

            Self::SetConnectionEncryption { handle, enable } => {
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*enable as u8);
            }

            Self::IoCapabilityRequestReply {
                bd_addr,
                io_capability,
                oob_data_present,
                authentication_requirements,
            } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*io_capability);
                params.push(*oob_data_present);
                params.push(*authentication_requirements);
            }

            Self::IoCapabilityRequestNegativeReply { bd_addr, reason } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*reason);
            }

            Self::UserPasskeyRequestReply { bd_addr, passkey } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(&passkey.to_le_bytes());
            }

            Self::RemoteOobDataRequestReply { bd_addr, c, r } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(c);
                params.extend_from_slice(r);
            }

            Self::RemoteOobExtendedDataRequestReply {
                bd_addr,
                c_192,
                r_192,
                c_256,
                r_256,
            } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(c_192);
                params.extend_from_slice(r_192);
                params.extend_from_slice(c_256);
                params.extend_from_slice(r_256);
            }

            Self::DeleteStoredLinkKey {
                bd_addr,
                delete_all,
            } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*delete_all as u8);
            }

            Self::WritePageTimeout { timeout } => {
                params.extend_from_slice(&timeout.to_le_bytes());
            }

            Self::WritePageScanActivity { interval, window }
            | Self::WriteInquiryScanActivity { interval, window } => {
                params.extend_from_slice(&interval.to_le_bytes());
                params.extend_from_slice(&window.to_le_bytes());
            }

            Self::WriteInquiryScanType { scan_type } | Self::WritePageScanType { scan_type } => {
                params.push(*scan_type);
            }

            Self::WriteInquiryMode { mode } => params.push(*mode),

            Self::WriteSimplePairingMode { enabled }
            | Self::WriteSecureConnectionsHostSupport { enabled } => {
                params.push(*enabled as u8);
            }

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                params.push(*scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*own_address_type);
                params.push(*filter_policy);
            }

            Self::LeSetScanEnable {
                enable,
                filter_duplicates,
            } => {
                params.push(*enable as u8);
                params.push(*filter_duplicates as u8);
            }

            Self::LeAddDeviceToFilterAcceptList {
                address_type,
                address,
            }
            | Self::LeRemoveDeviceFromFilterAcceptList {
                address_type,
                address,
            } => {
                params.push(*address_type);
                params.extend_from_slice(address.as_slice());
            }

            Self::LeStartEncryption {
                handle,
                rand,
                ediv,
                ltk,
            } => {
                params.extend_from_slice(&handle.to_le_bytes());
                params.extend_from_slice(rand);
                params.extend_from_slice(&ediv.to_le_bytes());
                params.extend_from_slice(ltk);
            }

            Self::LeLongTermKeyRequestReply { handle, ltk } => {
                params.extend_from_slice(&handle.to_le_bytes());
                params.extend_from_slice(ltk);
            }

            Self::LeLongTermKeyRequestNegativeReply { handle } => {
                params.extend_from_slice(&handle.to_le_bytes());
            }
        }
        params
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }
}

/// HCI Event packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    pub fn new(event_code: u8, parameters: Vec<u8>) -> Self {
        Self {
            event_code,
            parameter_total_length: parameters.len() as u8,
            parameters,
        }
    }

    /// Parse an HCI event from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let event_code = data[0];
        let parameter_total_length = data[1];

        if data.len() < (parameter_total_length as usize + 2) {
            return None;
        }

        let parameters = data[2..(parameter_total_length as usize + 2)].to_vec();

        Some(HciEvent {
            event_code,
            parameter_total_length,
            parameters,
        })
    }
}

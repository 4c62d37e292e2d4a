//! Typed views over the HCI events this stack consumes

use crate::error::HciError;
use crate::gap::{AddressType, AddressWithType, BdAddr};
use crate::hci::constants::*;
use crate::hci::packet::HciEvent;
use crate::security::smp::Role;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Classic pairing events; each names the remote device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEventPacket {
    PinCodeRequest {
        bd_addr: BdAddr,
    },
    LinkKeyRequest {
        bd_addr: BdAddr,
    },
    LinkKeyNotification {
        bd_addr: BdAddr,
        link_key: [u8; 16],
        key_type: u8,
    },
    IoCapabilityRequest {
        bd_addr: BdAddr,
    },
    IoCapabilityResponse {
        bd_addr: BdAddr,
        io_capability: u8,
        oob_data_present: u8,
        authentication_requirements: u8,
    },
    SimplePairingComplete {
        status: u8,
        bd_addr: BdAddr,
    },
    RemoteOobDataRequest {
        bd_addr: BdAddr,
    },
    UserPasskeyNotification {
        bd_addr: BdAddr,
        passkey: u32,
    },
    KeypressNotification {
        bd_addr: BdAddr,
        notification_type: u8,
    },
    UserConfirmationRequest {
        bd_addr: BdAddr,
        numeric_value: u32,
    },
    UserPasskeyRequest {
        bd_addr: BdAddr,
    },
}

impl SecurityEventPacket {
    pub fn bd_addr(&self) -> BdAddr {
        match self {
            Self::PinCodeRequest { bd_addr }
            | Self::LinkKeyRequest { bd_addr }
            | Self::LinkKeyNotification { bd_addr, .. }
            | Self::IoCapabilityRequest { bd_addr }
            | Self::IoCapabilityResponse { bd_addr, .. }
            | Self::SimplePairingComplete { bd_addr, .. }
            | Self::RemoteOobDataRequest { bd_addr }
            | Self::UserPasskeyNotification { bd_addr, .. }
            | Self::KeypressNotification { bd_addr, .. }
            | Self::UserConfirmationRequest { bd_addr, .. }
            | Self::UserPasskeyRequest { bd_addr } => *bd_addr,
        }
    }

    pub fn event_code(&self) -> u8 {
        match self {
            Self::PinCodeRequest { .. } => EVT_PIN_CODE_REQUEST,
            Self::LinkKeyRequest { .. } => EVT_LINK_KEY_REQUEST,
            Self::LinkKeyNotification { .. } => EVT_LINK_KEY_NOTIFICATION,
            Self::IoCapabilityRequest { .. } => EVT_IO_CAPABILITY_REQUEST,
            Self::IoCapabilityResponse { .. } => EVT_IO_CAPABILITY_RESPONSE,
            Self::SimplePairingComplete { .. } => EVT_SIMPLE_PAIRING_COMPLETE,
            Self::RemoteOobDataRequest { .. } => EVT_REMOTE_OOB_DATA_REQUEST,
            Self::UserPasskeyNotification { .. } => EVT_USER_PASSKEY_NOTIFICATION,
            Self::KeypressNotification { .. } => EVT_KEYPRESS_NOTIFICATION,
            Self::UserConfirmationRequest { .. } => EVT_USER_CONFIRMATION_REQUEST,
            Self::UserPasskeyRequest { .. } => EVT_USER_PASSKEY_REQUEST,
        }
    }

    /// Events that may legitimately start a remotely initiated pairing
    pub fn can_start_pairing(&self) -> bool {
        matches!(
            self,
            Self::LinkKeyRequest { .. }
                | Self::PinCodeRequest { .. }
                | Self::IoCapabilityResponse { .. }
        )
    }
}

/// One device found during inquiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryResponse {
    pub bd_addr: BdAddr,
    pub page_scan_repetition_mode: u8,
    pub class_of_device: [u8; 3],
    pub clock_offset: u16,
    pub rssi: Option<i8>,
    pub extended_inquiry_response: Vec<u8>,
}

/// LE Advertising Report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvertisingReport {
    pub event_type: u8,
    pub address: AddressWithType,
    pub data: Vec<u8>,
    pub rssi: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPacket {
    CommandComplete {
        num_hci_command_packets: u8,
        opcode: u16,
        return_parameters: Vec<u8>,
    },
    CommandStatus {
        status: u8,
        num_hci_command_packets: u8,
        opcode: u16,
    },
    ConnectionComplete {
        status: u8,
        handle: u16,
        bd_addr: BdAddr,
        link_type: u8,
        encryption_enabled: bool,
    },
    DisconnectionComplete {
        status: u8,
        handle: u16,
        reason: u8,
    },
    AuthenticationComplete {
        status: u8,
        handle: u16,
    },
    EncryptionChange {
        status: u8,
        handle: u16,
        enabled: bool,
    },
    Security(SecurityEventPacket),
    InquiryComplete {
        status: u8,
    },
    InquiryResult(Vec<InquiryResponse>),
    InquiryResultWithRssi(Vec<InquiryResponse>),
    ExtendedInquiryResult(InquiryResponse),
    LeConnectionComplete {
        status: u8,
        handle: u16,
        role: Role,
        peer: AddressWithType,
    },
    LeAdvertisingReport(Vec<LeAdvertisingReport>),
    LeLongTermKeyRequest {
        handle: u16,
        rand: [u8; 8],
        ediv: u16,
    },
    Unknown {
        event_code: u8,
    },
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    name: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], name: &'static str) -> Self {
        Self {
            cursor: Cursor::new(data),
            name,
        }
    }

    fn truncated(&self) -> HciError {
        HciError::TruncatedEvent(self.name)
    }

    fn u8(&mut self) -> Result<u8, HciError> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    fn i8(&mut self) -> Result<i8, HciError> {
        self.cursor.read_i8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16, HciError> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    fn u32(&mut self) -> Result<u32, HciError> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    fn handle(&mut self) -> Result<u16, HciError> {
        Ok(self.u16()? & 0x0fff)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], HciError> {
        let mut out = [0u8; N];
        self.cursor
            .read_exact(&mut out)
            .map_err(|_| self.truncated())?;
        Ok(out)
    }

    fn bd_addr(&mut self) -> Result<BdAddr, HciError> {
        Ok(BdAddr::new(self.array()?))
    }

    fn skip(&mut self, n: usize) -> Result<(), HciError> {
        let position = self.cursor.position() as usize + n;
        if position > self.cursor.get_ref().len() {
            return Err(self.truncated());
        }
        self.cursor.set_position(position as u64);
        Ok(())
    }

    fn bytes(&mut self, n: usize) -> Result<Vec<u8>, HciError> {
        let mut out = vec![0u8; n];
        self.cursor
            .read_exact(&mut out)
            .map_err(|_| self.truncated())?;
        Ok(out)
    }

    fn rest(&mut self) -> Vec<u8> {
        let position = self.cursor.position() as usize;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position(data.len() as u64);
        data[position.min(data.len())..].to_vec()
    }
}

fn parse_inquiry_results(
    parameters: &[u8],
    with_rssi: bool,
) -> Result<Vec<InquiryResponse>, HciError> {
    let name = if with_rssi {
        "inquiry result with RSSI"
    } else {
        "inquiry result"
    };
    let mut r = Reader::new(parameters, name);
    let count = r.u8()? as usize;
    let mut responses = Vec::with_capacity(count);
    for _ in 0..count {
        let bd_addr = r.bd_addr()?;
        let page_scan_repetition_mode = r.u8()?;
        // Reserved octets
        r.skip(if with_rssi { 1 } else { 2 })?;
        let class_of_device = r.array()?;
        let clock_offset = r.u16()?;
        let rssi = if with_rssi { Some(r.i8()?) } else { None };
        responses.push(InquiryResponse {
            bd_addr,
            page_scan_repetition_mode,
            class_of_device,
            clock_offset,
            rssi,
            extended_inquiry_response: Vec::new(),
        });
    }
    Ok(responses)
}

fn parse_le_meta(parameters: &[u8]) -> Result<EventPacket, HciError> {
    let mut r = Reader::new(parameters, "LE meta");
    let subevent = r.u8()?;
    match subevent {
        EVT_LE_CONN_COMPLETE => {
            r.name = "LE connection complete";
            let status = r.u8()?;
            let handle = r.handle()?;
            let role = match r.u8()? {
                0x00 => Role::Central,
                _ => Role::Peripheral,
            };
            let address_type = AddressType::from(r.u8()?);
            let address = r.bd_addr()?;
            Ok(EventPacket::LeConnectionComplete {
                status,
                handle,
                role,
                peer: AddressWithType::new(address, address_type),
            })
        }
        EVT_LE_ADVERTISING_REPORT => {
            r.name = "LE advertising report";
            let count = r.u8()? as usize;
            let mut reports = Vec::with_capacity(count);
            for _ in 0..count {
                let event_type = r.u8()?;
                let address_type = AddressType::from(r.u8()?);
                let address = r.bd_addr()?;
                let data_length = r.u8()? as usize;
                let data = r.bytes(data_length)?;
                let rssi = r.i8()?;
                reports.push(LeAdvertisingReport {
                    event_type,
                    address: AddressWithType::new(address, address_type),
                    data,
                    rssi,
                });
            }
            Ok(EventPacket::LeAdvertisingReport(reports))
        }
        EVT_LE_LONG_TERM_KEY_REQUEST => {
            r.name = "LE long term key request";
            let handle = r.handle()?;
            let rand = r.array()?;
            let ediv = r.u16()?;
            Ok(EventPacket::LeLongTermKeyRequest { handle, rand, ediv })
        }
        _ => Ok(EventPacket::Unknown {
            event_code: EVT_LE_META_EVENT,
        }),
    }
}

impl EventPacket {
    /// Decode the parameters of a raw event
    pub fn parse(event: &HciEvent) -> Result<Self, HciError> {
        let p = event.parameters.as_slice();
        let packet = match event.event_code {
            EVT_CMD_COMPLETE => {
                let mut r = Reader::new(p, "command complete");
                let num_hci_command_packets = r.u8()?;
                let opcode = r.u16()?;
                EventPacket::CommandComplete {
                    num_hci_command_packets,
                    opcode,
                    return_parameters: r.rest(),
                }
            }
            EVT_CMD_STATUS => {
                let mut r = Reader::new(p, "command status");
                EventPacket::CommandStatus {
                    status: r.u8()?,
                    num_hci_command_packets: r.u8()?,
                    opcode: r.u16()?,
                }
            }
            EVT_CONN_COMPLETE => {
                let mut r = Reader::new(p, "connection complete");
                EventPacket::ConnectionComplete {
                    status: r.u8()?,
                    handle: r.handle()?,
                    bd_addr: r.bd_addr()?,
                    link_type: r.u8()?,
                    encryption_enabled: r.u8()? != 0,
                }
            }
            EVT_DISCONN_COMPLETE => {
                let mut r = Reader::new(p, "disconnection complete");
                EventPacket::DisconnectionComplete {
                    status: r.u8()?,
                    handle: r.handle()?,
                    reason: r.u8()?,
                }
            }
            EVT_AUTHENTICATION_COMPLETE => {
                let mut r = Reader::new(p, "authentication complete");
                EventPacket::AuthenticationComplete {
                    status: r.u8()?,
                    handle: r.handle()?,
                }
            }
            EVT_ENCRYPTION_CHANGE => {
                let mut r = Reader::new(p, "encryption change");
                EventPacket::EncryptionChange {
                    status: r.u8()?,
                    handle: r.handle()?,
                    enabled: r.u8()? != 0,
                }
            }
            EVT_PIN_CODE_REQUEST => {
                let mut r = Reader::new(p, "PIN code request");
                EventPacket::Security(SecurityEventPacket::PinCodeRequest {
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_LINK_KEY_REQUEST => {
                let mut r = Reader::new(p, "link key request");
                EventPacket::Security(SecurityEventPacket::LinkKeyRequest {
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_LINK_KEY_NOTIFICATION => {
                let mut r = Reader::new(p, "link key notification");
                EventPacket::Security(SecurityEventPacket::LinkKeyNotification {
                    bd_addr: r.bd_addr()?,
                    link_key: r.array()?,
                    key_type: r.u8()?,
                })
            }
            EVT_IO_CAPABILITY_REQUEST => {
                let mut r = Reader::new(p, "IO capability request");
                EventPacket::Security(SecurityEventPacket::IoCapabilityRequest {
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_IO_CAPABILITY_RESPONSE => {
                let mut r = Reader::new(p, "IO capability response");
                EventPacket::Security(SecurityEventPacket::IoCapabilityResponse {
                    bd_addr: r.bd_addr()?,
                    io_capability: r.u8()?,
                    oob_data_present: r.u8()?,
                    authentication_requirements: r.u8()?,
                })
            }
            EVT_SIMPLE_PAIRING_COMPLETE => {
                let mut r = Reader::new(p, "simple pairing complete");
                EventPacket::Security(SecurityEventPacket::SimplePairingComplete {
                    status: r.u8()?,
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_REMOTE_OOB_DATA_REQUEST => {
                let mut r = Reader::new(p, "remote OOB data request");
                EventPacket::Security(SecurityEventPacket::RemoteOobDataRequest {
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_USER_PASSKEY_NOTIFICATION => {
                let mut r = Reader::new(p, "user passkey notification");
                EventPacket::Security(SecurityEventPacket::UserPasskeyNotification {
                    bd_addr: r.bd_addr()?,
                    passkey: r.u32()?,
                })
            }
            EVT_KEYPRESS_NOTIFICATION => {
                let mut r = Reader::new(p, "keypress notification");
                EventPacket::Security(SecurityEventPacket::KeypressNotification {
                    bd_addr: r.bd_addr()?,
                    notification_type: r.u8()?,
                })
            }
            EVT_USER_CONFIRMATION_REQUEST => {
                let mut r = Reader::new(p, "user confirmation request");
                EventPacket::Security(SecurityEventPacket::UserConfirmationRequest {
                    bd_addr: r.bd_addr()?,
                    numeric_value: r.u32()?,
                })
            }
            EVT_USER_PASSKEY_REQUEST => {
                let mut r = Reader::new(p, "user passkey request");
                EventPacket::Security(SecurityEventPacket::UserPasskeyRequest {
                    bd_addr: r.bd_addr()?,
                })
            }
            EVT_INQUIRY_COMPLETE => {
                let mut r = Reader::new(p, "inquiry complete");
                EventPacket::InquiryComplete { status: r.u8()? }
            }
            EVT_INQUIRY_RESULT => EventPacket::InquiryResult(parse_inquiry_results(p, false)?),
            EVT_INQUIRY_RESULT_WITH_RSSI => {
                EventPacket::InquiryResultWithRssi(parse_inquiry_results(p, true)?)
            }
            EVT_EXTENDED_INQUIRY_RESULT => {
                let mut r = Reader::new(p, "extended inquiry result");
                // Always exactly one response
                r.u8()?;
                let bd_addr = r.bd_addr()?;
                let page_scan_repetition_mode = r.u8()?;
                r.skip(1)?;
                let class_of_device = r.array()?;
                let clock_offset = r.u16()?;
                let rssi = r.i8()?;
                EventPacket::ExtendedInquiryResult(InquiryResponse {
                    bd_addr,
                    page_scan_repetition_mode,
                    class_of_device,
                    clock_offset,
                    rssi: Some(rssi),
                    extended_inquiry_response: r.rest(),
                })
            }
            EVT_LE_META_EVENT => parse_le_meta(p)?,
            event_code => EventPacket::Unknown { event_code },
        };

        Ok(packet)
    }
}

/// Status octet of a command complete event's return parameters
pub fn command_complete_status(return_parameters: &[u8]) -> Option<u8> {
    return_parameters.first().copied()
}

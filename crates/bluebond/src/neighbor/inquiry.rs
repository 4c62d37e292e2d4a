use crate::hci::constants::*;
use crate::hci::{CommandSender, EventPacket, EventRouter, HciCommand, InquiryResponse};
use crate::neighbor::scan_parameters::{InquiryMode, ScanParameters, ScanType};
use crate::neighbor::NeighborError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::mpsc::Sender;

const INQUIRY_CANCEL: u16 = opcode(OGF_LINK_CTL, OCF_INQUIRY_CANCEL);
const PERIODIC_INQUIRY_MODE: u16 = opcode(OGF_LINK_CTL, OCF_PERIODIC_INQUIRY_MODE);
const EXIT_PERIODIC_INQUIRY_MODE: u16 = opcode(OGF_LINK_CTL, OCF_EXIT_PERIODIC_INQUIRY_MODE);
const INQUIRY: u16 = opcode(OGF_LINK_CTL, OCF_INQUIRY);
const READ_INQUIRY_MODE: u16 = opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_MODE);
const WRITE_INQUIRY_MODE: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_INQUIRY_MODE);
const READ_TX_POWER: u16 = opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_RESPONSE_TRANSMIT_POWER_LEVEL);
const READ_INQUIRY_SCAN_ACTIVITY: u16 = opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_SCAN_ACTIVITY);
const WRITE_INQUIRY_SCAN_ACTIVITY: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_INQUIRY_SCAN_ACTIVITY);
const READ_INQUIRY_SCAN_TYPE: u16 = opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_SCAN_TYPE);
const WRITE_INQUIRY_SCAN_TYPE: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_INQUIRY_SCAN_TYPE);

/// Event codes the inquiry module owns while callbacks are registered
const INQUIRY_EVENTS: [u8; 4] = [
    EVT_INQUIRY_RESULT,
    EVT_INQUIRY_RESULT_WITH_RSSI,
    EVT_EXTENDED_INQUIRY_RESULT,
    EVT_INQUIRY_COMPLETE,
];

/// What discovery reports to its client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquiryEvent {
    Result(Vec<InquiryResponse>),
    ResultWithRssi(Vec<InquiryResponse>),
    ExtendedResult(InquiryResponse),
    Complete { status: u8 },
}

/// Classic inquiry
///
/// At most one inquiry of any kind runs at a time. Starting one while another
/// is active is refused with [`NeighborError::InquiryActive`].
pub struct InquiryModule {
    hci: Rc<dyn CommandSender>,
    events: Option<Sender<InquiryEvent>>,
    active_general_one_shot: bool,
    active_limited_one_shot: bool,
    active_general_periodic: bool,
    active_limited_periodic: bool,
    scan: ScanParameters,
    mode: InquiryMode,
    scan_type: ScanType,
    response_tx_power: i8,
}

impl InquiryModule {
    pub fn new(hci: Rc<dyn CommandSender>) -> Self {
        Self {
            hci,
            events: None,
            active_general_one_shot: false,
            active_limited_one_shot: false,
            active_general_periodic: false,
            active_limited_periodic: false,
            scan: ScanParameters::default(),
            mode: InquiryMode::default(),
            scan_type: ScanType::default(),
            response_tx_power: 0,
        }
    }

    /// Route inquiry events to this module and deliver them to `events`
    pub fn register_callbacks<T: Copy + PartialEq + Debug>(
        &mut self,
        router: &mut EventRouter<T>,
        owner: T,
        events: Sender<InquiryEvent>,
    ) {
        for event_code in INQUIRY_EVENTS {
            router.register(event_code, owner);
        }
        self.events = Some(events);
    }

    pub fn unregister_callbacks<T: Copy + PartialEq + Debug>(&mut self, router: &mut EventRouter<T>) {
        for event_code in INQUIRY_EVENTS.iter().rev() {
            router.unregister(*event_code);
        }
        self.events = None;
    }

    pub fn has_callbacks(&self) -> bool {
        self.events.is_some()
    }

    pub fn is_inquiry_active(&self) -> bool {
        self.active_general_one_shot
            || self.active_limited_one_shot
            || self.active_general_periodic
            || self.active_limited_periodic
    }

    pub fn start_general_inquiry(&mut self, length: u8, num_responses: u8) -> Result<(), NeighborError> {
        self.start_one_shot(false, length, num_responses)
    }

    pub fn start_limited_inquiry(&mut self, length: u8, num_responses: u8) -> Result<(), NeighborError> {
        self.start_one_shot(true, length, num_responses)
    }

    pub fn stop_inquiry(&mut self) -> Result<(), NeighborError> {
        if !self.active_general_one_shot && !self.active_limited_one_shot {
            return Err(NeighborError::InquiryNotActive);
        }
        self.active_general_one_shot = false;
        self.active_limited_one_shot = false;
        self.hci.send_command(HciCommand::InquiryCancel)?;
        Ok(())
    }

    pub fn start_general_periodic_inquiry(
        &mut self,
        length: u8,
        num_responses: u8,
        max_delay: u16,
        min_delay: u16,
    ) -> Result<(), NeighborError> {
        self.start_periodic(false, length, num_responses, max_delay, min_delay)
    }

    pub fn start_limited_periodic_inquiry(
        &mut self,
        length: u8,
        num_responses: u8,
        max_delay: u16,
        min_delay: u16,
    ) -> Result<(), NeighborError> {
        self.start_periodic(true, length, num_responses, max_delay, min_delay)
    }

    pub fn stop_periodic_inquiry(&mut self) -> Result<(), NeighborError> {
        if !self.active_general_periodic && !self.active_limited_periodic {
            return Err(NeighborError::InquiryNotActive);
        }
        self.active_general_periodic = false;
        self.active_limited_periodic = false;
        self.hci.send_command(HciCommand::ExitPeriodicInquiryMode)?;
        Ok(())
    }

    pub fn set_scan_activity(&mut self, params: ScanParameters) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WriteInquiryScanActivity {
            interval: params.interval,
            window: params.window,
        })?;
        self.scan = params;
        info!(
            "Set inquiry scan activity interval:0x{:x}/{:.02}ms window:0x{:x}/{:.02}ms",
            params.interval,
            params.interval_ms(),
            params.window,
            params.window_ms()
        );
        Ok(())
    }

    pub fn set_interlaced_scan(&mut self) -> Result<(), NeighborError> {
        self.set_scan_type(ScanType::Interlaced)
    }

    pub fn set_standard_scan(&mut self) -> Result<(), NeighborError> {
        self.set_scan_type(ScanType::Standard)
    }

    pub fn set_standard_inquiry_result_mode(&mut self) -> Result<(), NeighborError> {
        self.set_inquiry_mode(InquiryMode::Standard)
    }

    pub fn set_inquiry_with_rssi_result_mode(&mut self) -> Result<(), NeighborError> {
        self.set_inquiry_mode(InquiryMode::Rssi)
    }

    pub fn set_extended_inquiry_result_mode(&mut self) -> Result<(), NeighborError> {
        self.set_inquiry_mode(InquiryMode::RssiOrExtended)
    }

    /// Read back the controller's current settings
    pub fn start(&mut self) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::ReadInquiryResponseTransmitPowerLevel)?;
        self.hci.send_command(HciCommand::ReadInquiryScanActivity)?;
        self.hci.send_command(HciCommand::ReadInquiryScanType)?;
        self.hci.send_command(HciCommand::ReadInquiryMode)?;
        info!("Started inquiry module");
        Ok(())
    }

    pub fn stop(&self) {
        info!("Inquiry scan interval:{} window:{}", self.scan.interval, self.scan.window);
        info!("Inquiry mode:{:?} scan_type:{:?}", self.mode, self.scan_type);
        info!("Inquiry response tx power:{}", self.response_tx_power);
        info!("Stopped inquiry module");
    }

    pub fn scan_activity(&self) -> ScanParameters {
        self.scan
    }

    pub fn inquiry_mode(&self) -> InquiryMode {
        self.mode
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn response_tx_power(&self) -> i8 {
        self.response_tx_power
    }

    /// Returns false for opcodes this module never issues
    pub fn on_command_complete(&mut self, opcode: u16, return_parameters: &[u8]) -> bool {
        if !matches!(
            opcode,
            INQUIRY_CANCEL
                | PERIODIC_INQUIRY_MODE
                | EXIT_PERIODIC_INQUIRY_MODE
                | READ_INQUIRY_MODE
                | WRITE_INQUIRY_MODE
                | READ_TX_POWER
                | READ_INQUIRY_SCAN_ACTIVITY
                | WRITE_INQUIRY_SCAN_ACTIVITY
                | READ_INQUIRY_SCAN_TYPE
                | WRITE_INQUIRY_SCAN_TYPE
        ) {
            return false;
        }

        let status = return_parameters.first().copied();
        if status != Some(HCI_SUCCESS) {
            warn!("Inquiry command 0x{:04x} failed, status {:?}", opcode, status);
            if opcode == PERIODIC_INQUIRY_MODE {
                self.active_general_periodic = false;
                self.active_limited_periodic = false;
            }
            return true;
        }

        let params = &return_parameters[1..];
        match opcode {
            READ_INQUIRY_MODE => match params.first().copied().and_then(InquiryMode::from_u8) {
                Some(mode) => self.mode = mode,
                None => warn!("Bad read inquiry mode response"),
            },
            READ_TX_POWER => match params.first() {
                Some(power) => self.response_tx_power = *power as i8,
                None => warn!("Bad read tx power response"),
            },
            READ_INQUIRY_SCAN_ACTIVITY if params.len() >= 4 => {
                self.scan = ScanParameters::new(
                    LittleEndian::read_u16(&params[0..2]),
                    LittleEndian::read_u16(&params[2..4]),
                );
            }
            READ_INQUIRY_SCAN_TYPE => match params.first().copied().and_then(ScanType::from_u8) {
                Some(scan_type) => self.scan_type = scan_type,
                None => warn!("Bad read inquiry scan type response"),
            },
            READ_INQUIRY_SCAN_ACTIVITY => warn!("Bad read inquiry scan activity response"),
            _ => debug!("Inquiry command 0x{:04x} complete", opcode),
        }
        true
    }

    pub fn on_command_status(&mut self, status: u8, opcode: u16) -> bool {
        if opcode != INQUIRY {
            return false;
        }

        if status != HCI_SUCCESS {
            warn!("Inquiry rejected, status 0x{:02x}", status);
            self.active_general_one_shot = false;
            self.active_limited_one_shot = false;
        } else if self.active_limited_one_shot || self.active_general_one_shot {
            info!(
                "Inquiry started lap: {}",
                if self.active_limited_one_shot { "Limited" } else { "General" }
            );
        }
        true
    }

    /// Inquiry results and completion. Returns false for other events.
    pub fn on_event(&mut self, event: &EventPacket) -> bool {
        let inquiry_event = match event {
            EventPacket::InquiryComplete { status } => {
                info!("Inquiry complete");
                self.active_general_one_shot = false;
                self.active_limited_one_shot = false;
                InquiryEvent::Complete { status: *status }
            }
            EventPacket::InquiryResult(responses) => {
                info!("Inquiry result num_responses:{}", responses.len());
                InquiryEvent::Result(responses.clone())
            }
            EventPacket::InquiryResultWithRssi(responses) => {
                info!("Inquiry result with rssi num_responses:{}", responses.len());
                InquiryEvent::ResultWithRssi(responses.clone())
            }
            EventPacket::ExtendedInquiryResult(response) => {
                info!(
                    "Extended inquiry result addr:{} repetition_mode:{} cod:{} clock_offset:{} rssi:{:?}",
                    response.bd_addr,
                    response.page_scan_repetition_mode,
                    hex::encode(response.class_of_device),
                    response.clock_offset,
                    response.rssi
                );
                InquiryEvent::ExtendedResult(response.clone())
            }
            _ => return false,
        };

        self.deliver(inquiry_event);
        true
    }

    fn deliver(&mut self, event: InquiryEvent) {
        let Some(events) = &self.events else {
            warn!("Dropping {:?}, no receiver", event);
            return;
        };
        if events.send(event).is_err() {
            warn!("Inquiry event receiver went away");
            self.events = None;
        }
    }

    fn start_one_shot(&mut self, limited: bool, length: u8, num_responses: u8) -> Result<(), NeighborError> {
        self.check_can_start()?;
        self.hci.send_command(HciCommand::Inquiry {
            lap: if limited { LIAC } else { GIAC },
            inquiry_length: length,
            num_responses,
        })?;
        if limited {
            self.active_limited_one_shot = true;
        } else {
            self.active_general_one_shot = true;
        }
        Ok(())
    }

    fn start_periodic(
        &mut self,
        limited: bool,
        length: u8,
        num_responses: u8,
        max_delay: u16,
        min_delay: u16,
    ) -> Result<(), NeighborError> {
        self.check_can_start()?;
        self.hci.send_command(HciCommand::PeriodicInquiryMode {
            max_period_length: max_delay,
            min_period_length: min_delay,
            lap: if limited { LIAC } else { GIAC },
            inquiry_length: length,
            num_responses,
        })?;
        if limited {
            self.active_limited_periodic = true;
        } else {
            self.active_general_periodic = true;
        }
        Ok(())
    }

    fn check_can_start(&self) -> Result<(), NeighborError> {
        if !self.has_callbacks() {
            return Err(NeighborError::NoCallbacks);
        }
        if self.is_inquiry_active() {
            return Err(NeighborError::InquiryActive);
        }
        Ok(())
    }

    fn set_scan_type(&mut self, scan_type: ScanType) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WriteInquiryScanType {
            scan_type: scan_type as u8,
        })?;
        info!("Set inquiry scan type:{:?}", scan_type);
        Ok(())
    }

    fn set_inquiry_mode(&mut self, mode: InquiryMode) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WriteInquiryMode { mode: mode as u8 })?;
        self.mode = mode;
        info!("Set inquiry mode:{:?}", mode);
        Ok(())
    }
}

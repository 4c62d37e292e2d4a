use crate::hci::constants::*;
use crate::hci::{CommandSender, HciCommand};
use crate::neighbor::scan_parameters::{page_timeout_ms, ScanParameters, ScanType};
use crate::neighbor::NeighborError;
use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use std::rc::Rc;

const READ_PAGE_SCAN_ACTIVITY: u16 = opcode(OGF_HOST_CTL, OCF_READ_PAGE_SCAN_ACTIVITY);
const WRITE_PAGE_SCAN_ACTIVITY: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_PAGE_SCAN_ACTIVITY);
const READ_PAGE_SCAN_TYPE: u16 = opcode(OGF_HOST_CTL, OCF_READ_PAGE_SCAN_TYPE);
const WRITE_PAGE_SCAN_TYPE: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_PAGE_SCAN_TYPE);
const READ_PAGE_TIMEOUT: u16 = opcode(OGF_HOST_CTL, OCF_READ_PAGE_TIMEOUT);
const WRITE_PAGE_TIMEOUT: u16 = opcode(OGF_HOST_CTL, OCF_WRITE_PAGE_TIMEOUT);

/// Page scan settings. Every write is followed by a read so the mirror
/// reflects what the controller accepted.
pub struct PageModule {
    hci: Rc<dyn CommandSender>,
    scan: ScanParameters,
    scan_type: ScanType,
    timeout: u16,
}

impl PageModule {
    pub fn new(hci: Rc<dyn CommandSender>) -> Self {
        Self {
            hci,
            scan: ScanParameters::default(),
            scan_type: ScanType::default(),
            timeout: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::ReadPageScanActivity)?;
        self.hci.send_command(HciCommand::ReadPageScanType)?;
        self.hci.send_command(HciCommand::ReadPageTimeout)?;
        Ok(())
    }

    pub fn stop(&self) {
        info!("Page scan interval:{} window:{}", self.scan.interval, self.scan.window);
        info!("Page scan_type:{:?}", self.scan_type);
    }

    pub fn set_scan_activity(&mut self, params: ScanParameters) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WritePageScanActivity {
            interval: params.interval,
            window: params.window,
        })?;
        self.hci.send_command(HciCommand::ReadPageScanActivity)?;
        info!(
            "Set page scan activity interval:0x{:x}/{:.02}ms window:0x{:x}/{:.02}ms",
            params.interval,
            params.interval_ms(),
            params.window,
            params.window_ms()
        );
        Ok(())
    }

    /// Last values read back from the controller
    pub fn get_scan_activity(&self) -> ScanParameters {
        self.scan
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    pub fn set_interlaced_scan(&mut self) -> Result<(), NeighborError> {
        self.set_scan_type(ScanType::Interlaced)
    }

    pub fn set_standard_scan(&mut self) -> Result<(), NeighborError> {
        self.set_scan_type(ScanType::Standard)
    }

    pub fn set_timeout(&mut self, timeout: u16) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WritePageTimeout { timeout })?;
        self.hci.send_command(HciCommand::ReadPageTimeout)?;
        info!("Set page timeout:0x{:x}/{:.02}ms", timeout, page_timeout_ms(timeout));
        Ok(())
    }

    /// Returns false for opcodes this module never issues
    pub fn on_command_complete(&mut self, opcode: u16, return_parameters: &[u8]) -> bool {
        if !matches!(
            opcode,
            READ_PAGE_SCAN_ACTIVITY
                | WRITE_PAGE_SCAN_ACTIVITY
                | READ_PAGE_SCAN_TYPE
                | WRITE_PAGE_SCAN_TYPE
                | READ_PAGE_TIMEOUT
                | WRITE_PAGE_TIMEOUT
        ) {
            return false;
        }

        let Some((&status, params)) = return_parameters.split_first() else {
            warn!("Empty command complete for 0x{:04x}", opcode);
            return true;
        };
        if status != HCI_SUCCESS {
            warn!("Page command 0x{:04x} failed, status 0x{:02x}", opcode, status);
            return true;
        }

        match opcode {
            READ_PAGE_SCAN_ACTIVITY if params.len() >= 4 => {
                self.scan = ScanParameters::new(
                    LittleEndian::read_u16(&params[0..2]),
                    LittleEndian::read_u16(&params[2..4]),
                );
            }
            READ_PAGE_SCAN_TYPE => match params.first().copied().and_then(ScanType::from_u8) {
                Some(scan_type) => self.scan_type = scan_type,
                None => warn!("Bad read page scan type response"),
            },
            READ_PAGE_TIMEOUT if params.len() >= 2 => {
                self.timeout = LittleEndian::read_u16(&params[0..2]);
            }
            READ_PAGE_SCAN_ACTIVITY | READ_PAGE_TIMEOUT => {
                warn!("Short response for 0x{:04x}", opcode)
            }
            _ => {}
        }
        true
    }

    fn set_scan_type(&mut self, scan_type: ScanType) -> Result<(), NeighborError> {
        self.hci.send_command(HciCommand::WritePageScanType {
            scan_type: scan_type as u8,
        })?;
        self.hci.send_command(HciCommand::ReadPageScanType)?;
        info!("Set page scan type:{:?}", scan_type);
        Ok(())
    }
}

/// Length of a baseband slot in milliseconds
const SLOT_MS: f64 = 0.625;

/// Scan interval and window, both in 0.625 ms slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanParameters {
    pub interval: u16,
    pub window: u16,
}

impl ScanParameters {
    pub fn new(interval: u16, window: u16) -> Self {
        Self { interval, window }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval as f64 * SLOT_MS
    }

    pub fn window_ms(&self) -> f64 {
        self.window as f64 * SLOT_MS
    }
}

/// Page timeout in 0.625 ms slots converted to milliseconds
pub fn page_timeout_ms(timeout: u16) -> f64 {
    timeout as f64 * SLOT_MS
}

/// Page and inquiry scan type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanType {
    #[default]
    Standard = 0x00,
    Interlaced = 0x01,
}

impl ScanType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ScanType::Standard),
            0x01 => Some(ScanType::Interlaced),
            _ => None,
        }
    }
}

/// Which inquiry result events the controller reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InquiryMode {
    #[default]
    Standard = 0x00,
    Rssi = 0x01,
    RssiOrExtended = 0x02,
}

impl InquiryMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(InquiryMode::Standard),
            0x01 => Some(InquiryMode::Rssi),
            0x02 => Some(InquiryMode::RssiOrExtended),
            _ => None,
        }
    }
}

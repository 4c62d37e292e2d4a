use super::*;
use crate::gap::BdAddr;
use crate::hci::constants::*;
use crate::hci::{EventPacket, EventRouter, HciCommand, InquiryResponse};
use crate::testing::*;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Discovery,
}

fn inquiry() -> (InquiryModule, RecordingHci) {
    init_logging();
    let hci = RecordingHci::new();
    (InquiryModule::new(Rc::new(hci.clone())), hci)
}

fn registered() -> (InquiryModule, RecordingHci, Receiver<InquiryEvent>) {
    let (mut module, hci) = inquiry();
    let mut router = EventRouter::new();
    let (tx, rx) = channel();
    module.register_callbacks(&mut router, Owner::Discovery, tx);
    (module, hci, rx)
}

fn response(last: u8) -> InquiryResponse {
    InquiryResponse {
        bd_addr: BdAddr::new([last, 0x00, 0x00, 0x00, 0x00, 0x00]),
        page_scan_repetition_mode: 0x01,
        class_of_device: [0x0C, 0x02, 0x5A],
        clock_offset: 0x1234,
        rssi: Some(-50),
        extended_inquiry_response: Vec::new(),
    }
}

// Inquiry

#[test]
fn test_register_callbacks_routes_inquiry_events() {
    let (mut module, _hci) = inquiry();
    let mut router = EventRouter::new();
    let (tx, _rx) = channel();

    assert!(!module.has_callbacks());
    module.register_callbacks(&mut router, Owner::Discovery, tx);
    assert!(module.has_callbacks());
    assert_eq!(router.route(EVT_INQUIRY_RESULT), Some(Owner::Discovery));
    assert_eq!(router.route(EVT_EXTENDED_INQUIRY_RESULT), Some(Owner::Discovery));
    assert_eq!(router.route(EVT_INQUIRY_COMPLETE), Some(Owner::Discovery));

    module.unregister_callbacks(&mut router);
    assert!(!module.has_callbacks());
    assert!(!router.is_registered(EVT_INQUIRY_RESULT_WITH_RSSI));
}

#[test]
fn test_inquiry_requires_callbacks() {
    let (mut module, hci) = inquiry();
    assert!(matches!(
        module.start_general_inquiry(0x08, 0),
        Err(NeighborError::NoCallbacks)
    ));
    assert!(hci.sent().is_empty());
}

#[test]
fn test_one_inquiry_at_a_time() {
    let (mut module, hci, _rx) = registered();

    module.start_general_inquiry(0x08, 0).unwrap();
    assert_eq!(
        hci.take(),
        vec![HciCommand::Inquiry {
            lap: GIAC,
            inquiry_length: 0x08,
            num_responses: 0
        }]
    );

    assert!(matches!(
        module.start_limited_inquiry(0x08, 0),
        Err(NeighborError::InquiryActive)
    ));
    assert!(matches!(
        module.start_general_periodic_inquiry(0x04, 0, 0x20, 0x10),
        Err(NeighborError::InquiryActive)
    ));
    assert!(hci.take().is_empty());
}

#[test]
fn test_stop_inquiry() {
    let (mut module, hci, _rx) = registered();
    assert!(matches!(module.stop_inquiry(), Err(NeighborError::InquiryNotActive)));

    module.start_limited_inquiry(0x04, 5).unwrap();
    module.stop_inquiry().unwrap();
    assert!(!module.is_inquiry_active());

    let sent = hci.take();
    assert_eq!(
        sent[0],
        HciCommand::Inquiry {
            lap: LIAC,
            inquiry_length: 0x04,
            num_responses: 5
        }
    );
    assert_eq!(sent[1], HciCommand::InquiryCancel);
}

#[test]
fn test_rejected_inquiry_is_not_active() {
    let (mut module, _hci, _rx) = registered();
    module.start_general_inquiry(0x08, 0).unwrap();

    assert!(module.on_command_status(0x0C, opcode(OGF_LINK_CTL, OCF_INQUIRY)));
    assert!(!module.is_inquiry_active());
    module.start_general_inquiry(0x08, 0).unwrap();
}

#[test]
fn test_inquiry_results_and_completion_are_delivered() {
    let (mut module, _hci, rx) = registered();
    module.start_general_inquiry(0x08, 0).unwrap();

    assert!(module.on_event(&EventPacket::InquiryResult(vec![response(1)])));
    assert!(module.on_event(&EventPacket::ExtendedInquiryResult(response(2))));
    assert!(module.on_event(&EventPacket::InquiryComplete { status: 0 }));
    assert!(!module.on_event(&EventPacket::Unknown { event_code: 0xFF }));

    let events: Vec<InquiryEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            InquiryEvent::Result(vec![response(1)]),
            InquiryEvent::ExtendedResult(response(2)),
            InquiryEvent::Complete { status: 0 },
        ]
    );
    assert!(!module.is_inquiry_active());
}

#[test]
fn test_periodic_inquiry() {
    let (mut module, hci, _rx) = registered();
    assert!(matches!(
        module.stop_periodic_inquiry(),
        Err(NeighborError::InquiryNotActive)
    ));

    module
        .start_general_periodic_inquiry(0x04, 0, 0x20, 0x10)
        .unwrap();
    assert!(module.is_inquiry_active());
    // A one-shot stop does not end periodic mode
    assert!(module.stop_inquiry().is_err());

    module.stop_periodic_inquiry().unwrap();
    assert_eq!(
        hci.take(),
        vec![
            HciCommand::PeriodicInquiryMode {
                max_period_length: 0x20,
                min_period_length: 0x10,
                lap: GIAC,
                inquiry_length: 0x04,
                num_responses: 0
            },
            HciCommand::ExitPeriodicInquiryMode,
        ]
    );
}

#[test]
fn test_failed_periodic_inquiry_is_not_active() {
    let (mut module, _hci, _rx) = registered();
    module
        .start_limited_periodic_inquiry(0x04, 0, 0x20, 0x10)
        .unwrap();

    assert!(module.on_command_complete(opcode(OGF_LINK_CTL, OCF_PERIODIC_INQUIRY_MODE), &[0x12]));
    assert!(!module.is_inquiry_active());
}

#[test]
fn test_inquiry_start_reads_controller_state() {
    let (mut module, hci) = inquiry();
    module.start().unwrap();
    assert_eq!(
        hci.take(),
        vec![
            HciCommand::ReadInquiryResponseTransmitPowerLevel,
            HciCommand::ReadInquiryScanActivity,
            HciCommand::ReadInquiryScanType,
            HciCommand::ReadInquiryMode,
        ]
    );

    let complete = |module: &mut InquiryModule, ocf: u16, params: &[u8]| {
        assert!(module.on_command_complete(opcode(OGF_HOST_CTL, ocf), params));
    };
    complete(&mut module, OCF_READ_INQUIRY_RESPONSE_TRANSMIT_POWER_LEVEL, &[0x00, 0xFC]);
    complete(&mut module, OCF_READ_INQUIRY_SCAN_ACTIVITY, &[0x00, 0x00, 0x10, 0x12, 0x00]);
    complete(&mut module, OCF_READ_INQUIRY_SCAN_TYPE, &[0x00, 0x01]);
    complete(&mut module, OCF_READ_INQUIRY_MODE, &[0x00, 0x02]);

    assert_eq!(module.response_tx_power(), -4);
    assert_eq!(module.scan_activity(), ScanParameters::new(0x1000, 0x0012));
    assert_eq!(module.scan_type(), ScanType::Interlaced);
    assert_eq!(module.inquiry_mode(), InquiryMode::RssiOrExtended);
    module.stop();
}

#[test]
fn test_inquiry_settings_writes() {
    let (mut module, hci) = inquiry();
    module
        .set_scan_activity(ScanParameters::new(0x0800, 0x0012))
        .unwrap();
    module.set_interlaced_scan().unwrap();
    module.set_inquiry_with_rssi_result_mode().unwrap();

    assert_eq!(
        hci.take(),
        vec![
            HciCommand::WriteInquiryScanActivity {
                interval: 0x0800,
                window: 0x0012
            },
            HciCommand::WriteInquiryScanType { scan_type: 0x01 },
            HciCommand::WriteInquiryMode { mode: 0x01 },
        ]
    );
    assert_eq!(module.inquiry_mode(), InquiryMode::Rssi);
    assert_eq!(module.scan_activity().interval, 0x0800);
}

#[test]
fn test_inquiry_ignores_foreign_and_failed_completions() {
    let (mut module, _hci) = inquiry();
    assert!(!module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_PAGE_TIMEOUT), &[0x00]));
    assert!(!module.on_command_status(0x00, opcode(OGF_LINK_CTL, OCF_CREATE_CONNECTION)));

    assert!(module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_MODE), &[0x01, 0x02]));
    assert_eq!(module.inquiry_mode(), InquiryMode::Standard);
}

// Page

fn page() -> (PageModule, RecordingHci) {
    init_logging();
    let hci = RecordingHci::new();
    (PageModule::new(Rc::new(hci.clone())), hci)
}

#[test]
fn test_page_start_reads_controller_state() {
    let (mut module, hci) = page();
    module.start().unwrap();
    assert_eq!(
        hci.take(),
        vec![
            HciCommand::ReadPageScanActivity,
            HciCommand::ReadPageScanType,
            HciCommand::ReadPageTimeout,
        ]
    );

    assert!(module.on_command_complete(
        opcode(OGF_HOST_CTL, OCF_READ_PAGE_SCAN_ACTIVITY),
        &[0x00, 0x00, 0x08, 0x12, 0x00]
    ));
    assert!(module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_PAGE_TIMEOUT), &[0x00, 0x00, 0x20]));
    assert!(module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_PAGE_SCAN_TYPE), &[0x00, 0x01]));

    assert_eq!(module.get_scan_activity(), ScanParameters::new(0x0800, 0x0012));
    assert_eq!(module.timeout(), 0x2000);
    assert_eq!(module.scan_type(), ScanType::Interlaced);
    module.stop();
}

#[test]
fn test_page_writes_are_read_back() {
    let (mut module, hci) = page();
    module
        .set_scan_activity(ScanParameters::new(0x0400, 0x0024))
        .unwrap();
    module.set_standard_scan().unwrap();
    module.set_timeout(0x4000).unwrap();

    assert_eq!(
        hci.take(),
        vec![
            HciCommand::WritePageScanActivity {
                interval: 0x0400,
                window: 0x0024
            },
            HciCommand::ReadPageScanActivity,
            HciCommand::WritePageScanType { scan_type: 0x00 },
            HciCommand::ReadPageScanType,
            HciCommand::WritePageTimeout { timeout: 0x4000 },
            HciCommand::ReadPageTimeout,
        ]
    );
    // Mirror only follows what the controller reports
    assert_eq!(module.get_scan_activity(), ScanParameters::default());
}

#[test]
fn test_page_ignores_failed_and_foreign_completions() {
    let (mut module, _hci) = page();
    assert!(module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_PAGE_TIMEOUT), &[0x0C, 0x00, 0x20]));
    assert_eq!(module.timeout(), 0);
    assert!(!module.on_command_complete(opcode(OGF_HOST_CTL, OCF_READ_INQUIRY_MODE), &[0x00, 0x01]));
}

use super::smp::{AuthReq, PairingFeatures, Role, SmpPdu, SmpReason};
use super::*;
use crate::config::SecurityConfig;
use crate::gap::{AddressType, AddressWithType, BdAddr};
use crate::hci::{HciCommand, SecurityEventPacket};
use crate::storage::{MemoryStorage, Storage, KEY_LE_LOCAL_KEY_IRK, SECTION_ADAPTER};
use crate::testing::*;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

const LOCAL: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

struct Fixture {
    manager: SecurityManager,
    hci: RecordingHci,
    smp: RecordingSmp,
    ui: RecordingUi,
    events: Receiver<SecurityEvent>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    fn with_storage(storage: MemoryStorage) -> Self {
        init_logging();
        let hci = RecordingHci::new();
        let smp = RecordingSmp::new();
        let ui = RecordingUi::new();
        let mut manager = SecurityManager::new(
            SecurityConfig::default(),
            Rc::new(hci.clone()),
            Rc::new(smp.clone()),
            Box::new(FakeCrypto),
            Box::new(storage),
        );
        manager.init(BdAddr::new(LOCAL)).unwrap();
        manager.set_user_interface_handler(Box::new(ui.clone()));

        let (tx, events) = channel();
        manager.register_listener(tx);
        hci.take();

        Self {
            manager,
            hci,
            smp,
            ui,
            events,
        }
    }

    fn events(&self) -> Vec<SecurityEvent> {
        self.events.try_iter().collect()
    }

    fn hci_event(&mut self, event: SecurityEventPacket) {
        self.manager.on_hci_security_event(event);
    }
}

fn bonded_storage(address: AddressWithType, setup: impl FnOnce(&mut SecurityRecord)) -> MemoryStorage {
    let mut record = SecurityRecord::new(address);
    record.bonded = true;
    setup(&mut record);
    let mut storage = MemoryStorage::new();
    record.save(&mut storage);
    storage
}

fn with_link_key(level: SecurityLevel) -> impl FnOnce(&mut SecurityRecord) {
    move |record| {
        record.link_key = Some(LinkKey {
            key: [0x4B; 16],
            key_type: LinkKeyType::AuthenticatedP256,
        });
        record.security_level = level;
        record.key_size = 16;
    }
}

fn with_ltk(level: SecurityLevel) -> impl FnOnce(&mut SecurityRecord) {
    move |record| {
        record.ltk = Some(LongTermKey {
            key: [0x1C; 16],
            ediv: 0x1234,
            rand: [5; 8],
        });
        record.security_level = level;
        record.key_size = 16;
    }
}

fn recorded_callback() -> (Rc<Cell<Option<bool>>>, Box<dyn FnOnce(bool)>) {
    let result = Rc::new(Cell::new(None));
    let slot = result.clone();
    (result, Box::new(move |satisfied| slot.set(Some(satisfied))))
}

fn bond_failure(events: &[SecurityEvent]) -> Option<&PairingFailure> {
    events.iter().find_map(|event| match event {
        SecurityEvent::BondFailed(_, failure) => Some(failure),
        _ => None,
    })
}

#[test]
fn test_init_enables_secure_simple_pairing() {
    init_logging();
    let hci = RecordingHci::new();
    let mut manager = SecurityManager::new(
        SecurityConfig::default(),
        Rc::new(hci.clone()),
        Rc::new(RecordingSmp::new()),
        Box::new(FakeCrypto),
        Box::new(MemoryStorage::new()),
    );
    manager.init(BdAddr::new(LOCAL)).unwrap();

    assert_eq!(
        hci.sent(),
        vec![
            HciCommand::WriteSimplePairingMode { enabled: true },
            HciCommand::WriteSecureConnectionsHostSupport { enabled: true },
        ]
    );
}

#[test]
fn test_init_keeps_stored_irk() {
    let mut storage = MemoryStorage::new();
    storage.set(SECTION_ADAPTER, KEY_LE_LOCAL_KEY_IRK, &[0x77; 16]);
    let fixture = Fixture::with_storage(storage);
    assert_eq!(fixture.manager.local_irk(), [0x77; 16]);
}

#[test]
fn test_init_loads_bonded_records() {
    let peer = address(0x01);
    let fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_link_key(SecurityLevel::SecureConnections),
    ));

    assert!(fixture.manager.is_bonded(&peer));
    let record = fixture.manager.record(&peer).unwrap();
    assert_eq!(record.security_level, SecurityLevel::SecureConnections);
    assert!(!record.temporary);
}

#[test]
fn test_create_bond_with_bonded_device_reports_bonded() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_link_key(SecurityLevel::SecureConnections),
    ));

    fixture.manager.create_bond(peer);

    assert_eq!(fixture.events(), vec![SecurityEvent::Bonded(peer)]);
    assert!(fixture.hci.sent().is_empty());
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_outgoing_classic_bond() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(peer);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::CreateConnection {
            bd_addr,
            packet_type: 0xCC18,
        }]
    );
    assert!(fixture.manager.has_pending_pairing(&peer));
    assert!(fixture.manager.record(&peer).unwrap().temporary);

    fixture.manager.on_connection_complete(0, 0x0001, bd_addr);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::AuthenticationRequested { handle: 0x0001 }]
    );

    fixture.hci_event(SecurityEventPacket::LinkKeyRequest { bd_addr });
    fixture.hci_event(SecurityEventPacket::IoCapabilityRequest { bd_addr });
    assert_eq!(
        fixture.hci.take(),
        vec![
            HciCommand::LinkKeyRequestNegativeReply { bd_addr },
            HciCommand::IoCapabilityRequestReply {
                bd_addr,
                io_capability: IoCapability::DisplayYesNo.to_u8(),
                oob_data_present: 0,
                authentication_requirements: AuthenticationRequirements::GeneralBondingMitm
                    .to_u8(),
            },
        ]
    );

    fixture.hci_event(SecurityEventPacket::IoCapabilityResponse {
        bd_addr,
        io_capability: IoCapability::DisplayYesNo.to_u8(),
        oob_data_present: 0,
        authentication_requirements: AuthenticationRequirements::GeneralBondingMitm.to_u8(),
    });
    fixture.hci_event(SecurityEventPacket::UserConfirmationRequest {
        bd_addr,
        numeric_value: 123_456,
    });
    assert_eq!(fixture.ui.take(), vec![UiPrompt::ConfirmValue(peer, 123_456)]);

    fixture.manager.on_confirm_yes_no(peer, true);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::UserConfirmationRequestReply { bd_addr }]
    );

    fixture.hci_event(SecurityEventPacket::SimplePairingComplete { status: 0, bd_addr });
    fixture.hci_event(SecurityEventPacket::LinkKeyNotification {
        bd_addr,
        link_key: [0x42; 16],
        key_type: LinkKeyType::AuthenticatedP256.to_u8(),
    });
    assert!(fixture.events().is_empty());

    fixture.manager.on_authentication_complete(0x0001, 0);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::SetConnectionEncryption {
            handle: 0x0001,
            enable: true,
        }]
    );
    assert_eq!(fixture.events(), vec![SecurityEvent::Bonded(peer)]);

    let record = fixture.manager.record(&peer).unwrap();
    assert!(record.bonded);
    assert!(!record.pairing);
    assert!(!record.temporary);
    assert_eq!(record.security_level, SecurityLevel::SecureConnections);
    assert_eq!(record.link_key.map(|k| k.key), Some([0x42; 16]));
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_second_dispatch_for_same_device_is_ignored() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(peer);
    fixture.manager.create_bond(peer);

    assert_eq!(fixture.hci.take().len(), 1);
    assert!(fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_classic_bond_with_identity_address_pairs_over_public_address() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let identity = AddressWithType::new(bd_addr, AddressType::PublicIdentity);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(identity);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::CreateConnection {
            bd_addr,
            packet_type: 0xCC18,
        }]
    );
    assert!(fixture.manager.has_pending_pairing(&peer));
    assert!(!fixture.manager.has_pending_pairing(&identity));

    fixture.manager.on_connection_complete(0, 0x0001, bd_addr);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::AuthenticationRequested { handle: 0x0001 }]
    );

    // Events land on the handler created by create_bond, not on a new one
    fixture.hci_event(SecurityEventPacket::LinkKeyRequest { bd_addr });
    fixture.hci_event(SecurityEventPacket::IoCapabilityRequest { bd_addr });
    assert_eq!(
        fixture.hci.take(),
        vec![
            HciCommand::LinkKeyRequestNegativeReply { bd_addr },
            HciCommand::IoCapabilityRequestReply {
                bd_addr,
                io_capability: IoCapability::DisplayYesNo.to_u8(),
                oob_data_present: 0,
                authentication_requirements: AuthenticationRequirements::GeneralBondingMitm
                    .to_u8(),
            },
        ]
    );
    assert!(fixture.manager.record(&identity).is_none());

    fixture.manager.cancel_bond(identity);
    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(bond_failure(&events).unwrap().message, "Bonding cancelled");
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_remote_just_works_needs_consent() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let mut fixture = Fixture::new();

    fixture.hci_event(SecurityEventPacket::IoCapabilityResponse {
        bd_addr,
        io_capability: IoCapability::NoInputNoOutput.to_u8(),
        oob_data_present: 0,
        authentication_requirements: AuthenticationRequirements::GeneralBonding.to_u8(),
    });
    assert!(fixture.manager.has_pending_pairing(&peer));

    fixture.hci_event(SecurityEventPacket::IoCapabilityRequest { bd_addr });
    fixture.hci_event(SecurityEventPacket::UserConfirmationRequest {
        bd_addr,
        numeric_value: 0,
    });
    assert_eq!(fixture.ui.take(), vec![UiPrompt::PairingPrompt(peer)]);
    fixture.hci.take();

    fixture.manager.on_pairing_prompt_accepted(peer);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::UserConfirmationRequestReply { bd_addr }]
    );

    fixture.hci_event(SecurityEventPacket::LinkKeyNotification {
        bd_addr,
        link_key: [0x24; 16],
        key_type: LinkKeyType::UnauthenticatedP256.to_u8(),
    });
    assert_eq!(fixture.events(), vec![SecurityEvent::Bonded(peer)]);
    assert_eq!(
        fixture.manager.record(&peer).unwrap().security_level,
        SecurityLevel::EncryptionOnly
    );
}

#[test]
fn test_unsolicited_pairing_event_is_dropped() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.hci_event(SecurityEventPacket::UserConfirmationRequest {
        bd_addr: peer.address,
        numeric_value: 1,
    });

    assert!(!fixture.manager.has_pending_pairing(&peer));
    assert!(fixture.hci.sent().is_empty());
    assert!(fixture.ui.prompts().is_empty());
}

#[test]
fn test_bonded_link_key_request_answered_from_record() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_link_key(SecurityLevel::SecureConnections),
    ));

    fixture.hci_event(SecurityEventPacket::LinkKeyRequest {
        bd_addr: peer.address,
    });

    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::LinkKeyRequestReply {
            bd_addr: peer.address,
            link_key: [0x4B; 16],
        }]
    );
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_cancel_bond_without_pairing_does_nothing() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.cancel_bond(peer);

    assert!(fixture.events().is_empty());
    assert!(fixture.hci.sent().is_empty());
}

#[test]
fn test_cancel_bond_withdraws_prompt() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let mut fixture = Fixture::new();

    fixture.hci_event(SecurityEventPacket::IoCapabilityResponse {
        bd_addr,
        io_capability: IoCapability::NoInputNoOutput.to_u8(),
        oob_data_present: 0,
        authentication_requirements: AuthenticationRequirements::GeneralBonding.to_u8(),
    });
    fixture.hci_event(SecurityEventPacket::UserConfirmationRequest {
        bd_addr,
        numeric_value: 0,
    });
    fixture.ui.take();

    fixture.manager.cancel_bond(peer);

    assert_eq!(fixture.ui.take(), vec![UiPrompt::Cancel(peer)]);
    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::UserConfirmationRequestNegativeReply { bd_addr }]
    );
    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(bond_failure(&events).unwrap().message, "Bonding cancelled");
    assert!(!fixture.manager.has_pending_pairing(&peer));

    // A second cancel has nothing left to do
    fixture.manager.cancel_bond(peer);
    assert!(fixture.events().is_empty());
}

#[test]
fn test_remove_bond_disconnects_and_forgets() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_link_key(SecurityLevel::SecureConnections),
    ));
    fixture.manager.on_connection_complete(0, 0x0005, peer.address);

    fixture.manager.remove_bond(peer);

    assert_eq!(
        fixture.hci.take(),
        vec![
            HciCommand::Disconnect {
                handle: 0x0005,
                reason: 0x13,
            },
            HciCommand::DeleteStoredLinkKey {
                bd_addr: peer.address,
                delete_all: false,
            },
        ]
    );
    assert_eq!(fixture.events(), vec![SecurityEvent::Unbonded(peer)]);
    assert!(!fixture.manager.is_bonded(&peer));
    assert!(fixture.manager.record(&peer).is_none());
}

#[test]
fn test_disconnect_drops_temporary_record() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(peer);
    fixture.manager.on_connection_complete(0, 0x0001, peer.address);
    fixture.manager.on_disconnection(0x0001);

    let events = fixture.events();
    assert_eq!(bond_failure(&events).unwrap().message, "Connection closed");
    assert!(fixture.manager.record(&peer).is_none());
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_failed_connection_fails_bond() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(peer);
    fixture.manager.on_connection_complete(0x04, 0x0000, peer.address);

    let events = fixture.events();
    let failure = bond_failure(&events).unwrap();
    assert_eq!(failure.hci_status, Some(0x04));
    assert!(!fixture.manager.record(&peer).unwrap().pairing);
}

#[test]
fn test_create_bond_le_opens_channel_first() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond_le(peer).unwrap();
    assert_eq!(fixture.smp.connects(), vec![peer]);
    assert_eq!(fixture.manager.pending_le_pairing(), Some(peer));
    assert!(fixture.smp.sent_pdus().is_empty());

    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Central);
    assert!(matches!(
        fixture.smp.sent_pdus().as_slice(),
        [SmpPdu::PairingRequest(_)]
    ));
}

#[test]
fn test_le_channel_closed_mid_pairing_sends_nothing() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond_le(peer).unwrap();
    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Central);
    fixture.smp.take_sent();

    fixture.manager.on_le_channel_closed(peer);

    assert!(fixture.smp.take_sent().is_empty());
    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(bond_failure(&events).unwrap().message, "Connection closed");
    assert!(!fixture.manager.has_pending_pairing(&peer));
    assert_eq!(fixture.manager.pending_le_pairing(), None);
}

#[test]
fn test_cancel_le_bond_tells_peer() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond_le(peer).unwrap();
    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Central);
    fixture.smp.take_sent();

    fixture.manager.cancel_bond(peer);

    assert!(matches!(
        fixture.smp.take_sent().as_slice(),
        [(_, SmpPdu::PairingFailed(SmpReason::UnspecifiedReason))]
    ));
    assert_eq!(bond_failure(&fixture.events()).unwrap().message, "Bonding cancelled");
}

#[test]
fn test_create_bond_le_for_bonded_device_fails() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_ltk(SecurityLevel::SecureConnections),
    ));

    fixture.manager.create_bond_le(peer).unwrap();

    let events = fixture.events();
    assert_eq!(bond_failure(&events).unwrap().message, "Already bonded");
    assert!(fixture.smp.connects().is_empty());
}

#[test]
fn test_single_le_pairing_slot() {
    let first = address(0x01);
    let second = address(0x02);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond_le(first).unwrap();
    assert!(matches!(
        fixture.manager.create_bond_le(first),
        Err(SecurityError::PairingInProgress(a)) if a == first
    ));
    assert!(matches!(
        fixture.manager.create_bond_le(second),
        Err(SecurityError::LePairingBusy(a)) if a == first
    ));
}

#[test]
fn test_le_channel_failure_frees_slot() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    fixture.manager.create_bond_le(peer).unwrap();
    fixture.manager.on_le_channel_failed(peer);

    let events = fixture.events();
    assert_eq!(
        bond_failure(&events).unwrap().message,
        "Connection establishment failed"
    );
    assert_eq!(fixture.manager.pending_le_pairing(), None);
    assert!(fixture.manager.create_bond_le(peer).is_ok());
}

#[test]
fn test_remote_le_pairing_rejected_while_busy() {
    let first = address(0x01);
    let second = address(0x02);
    let mut fixture = Fixture::new();
    fixture.manager.create_bond_le(first).unwrap();
    fixture.manager.on_le_channel_open(second, 0x0041, Role::Peripheral);

    let request = SmpPdu::PairingRequest(PairingFeatures::default());
    fixture.manager.on_smp_pdu(second, &request.serialize());

    assert_eq!(
        fixture.smp.take_sent(),
        vec![(second, SmpPdu::PairingFailed(SmpReason::UnspecifiedReason))]
    );
    assert!(!fixture.manager.has_pending_pairing(&second));
}

#[test]
fn test_remote_le_pairing_request_starts_handler() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();
    fixture.manager.on_le_channel_open(peer, 0x0041, Role::Peripheral);

    let request = SmpPdu::PairingRequest(PairingFeatures {
        io_capability: IoCapability::DisplayYesNo,
        auth_req: AuthReq::BONDING | AuthReq::MITM | AuthReq::SECURE_CONNECTIONS,
        ..PairingFeatures::default()
    });
    fixture.manager.on_smp_pdu(peer, &request.serialize());

    assert!(matches!(
        fixture.smp.sent_pdus().as_slice(),
        [SmpPdu::PairingResponse(_)]
    ));
    assert_eq!(fixture.manager.pending_le_pairing(), Some(peer));
    assert!(fixture.manager.record(&peer).unwrap().temporary);
}

#[test]
fn test_security_request_reencrypts_bonded_device() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_ltk(SecurityLevel::SecureConnections),
    ));
    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Central);

    let request = SmpPdu::SecurityRequest(AuthReq::BONDING);
    fixture.manager.on_smp_pdu(peer, &request.serialize());

    assert_eq!(
        fixture.hci.take(),
        vec![HciCommand::LeStartEncryption {
            handle: 0x0040,
            rand: [5; 8],
            ediv: 0x1234,
            ltk: [0x1C; 16],
        }]
    );
    assert!(!fixture.manager.has_pending_pairing(&peer));
}

#[test]
fn test_long_term_key_request_for_bonded_device() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_ltk(SecurityLevel::SecureConnections),
    ));
    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Peripheral);

    fixture.manager.on_le_long_term_key_request(0x0040, [5; 8], 0x1234);
    fixture.manager.on_le_long_term_key_request(0x0040, [5; 8], 0x9999);

    assert_eq!(
        fixture.hci.take(),
        vec![
            HciCommand::LeLongTermKeyRequestReply {
                handle: 0x0040,
                ltk: [0x1C; 16],
            },
            HciCommand::LeLongTermKeyRequestNegativeReply { handle: 0x0040 },
        ]
    );
}

#[test]
fn test_encryption_change_without_pairing_is_reported() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();
    fixture.manager.on_connection_complete(0, 0x0007, peer.address);

    fixture.manager.on_encryption_change(0x0007, 0, true);

    assert_eq!(
        fixture.events(),
        vec![SecurityEvent::EncryptionStateChanged {
            address: Some(peer),
            handle: 0x0007,
            status: 0,
            enabled: true,
        }]
    );
}

#[test]
fn test_smp_timeout_fails_pairing() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();
    fixture.manager.create_bond_le(peer).unwrap();
    fixture.manager.on_le_channel_open(peer, 0x0040, Role::Central);
    fixture.smp.take_sent();

    let deadline = fixture.manager.next_deadline().unwrap();
    fixture.manager.process_timeouts(deadline - Duration::from_millis(1));
    assert!(fixture.events().is_empty());

    fixture.manager.process_timeouts(deadline);
    let events = fixture.events();
    assert_eq!(bond_failure(&events).unwrap().message, "SMP timeout");
    assert!(fixture.smp.sent_pdus().is_empty());
    assert_eq!(fixture.manager.pending_le_pairing(), None);
    assert_eq!(fixture.manager.next_deadline(), None);
}

#[test]
fn test_policy_already_satisfied() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_link_key(SecurityLevel::SecureConnections),
    ));

    let (result, callback) = recorded_callback();
    fixture.manager.enforce_security_policy(
        peer,
        SecurityPolicy::AuthenticatedEncryptedTransport,
        callback,
    );

    assert_eq!(result.get(), Some(true));
    assert!(fixture.hci.sent().is_empty());
}

#[test]
fn test_le_policy_on_weak_bond_fails_at_once() {
    let peer = address(0x01);
    let mut fixture = Fixture::with_storage(bonded_storage(
        peer,
        with_ltk(SecurityLevel::EncryptionOnly),
    ));

    let (result, callback) = recorded_callback();
    fixture
        .manager
        .enforce_le_security_policy(peer, SecurityPolicy::BestAvailable, callback);

    assert_eq!(result.get(), Some(false));
    assert!(fixture.smp.connects().is_empty());
}

#[test]
fn test_policy_answered_when_pairing_completes() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let mut fixture = Fixture::new();

    let (result, callback) = recorded_callback();
    fixture.manager.enforce_security_policy(
        peer,
        SecurityPolicy::AuthenticatedEncryptedTransport,
        callback,
    );
    assert_eq!(result.get(), None);
    assert!(fixture.manager.has_pending_pairing(&peer));

    fixture.manager.on_connection_complete(0, 0x0001, bd_addr);
    fixture.hci_event(SecurityEventPacket::LinkKeyNotification {
        bd_addr,
        link_key: [0x42; 16],
        key_type: LinkKeyType::AuthenticatedP256.to_u8(),
    });
    fixture.manager.on_authentication_complete(0x0001, 0);

    assert_eq!(result.get(), Some(true));
}

#[test]
fn test_policy_during_pairing_waits_for_it() {
    let peer = address(0x01);
    let bd_addr = peer.address;
    let mut fixture = Fixture::new();

    fixture.manager.create_bond(peer);
    fixture.hci.take();

    let (result, callback) = recorded_callback();
    fixture
        .manager
        .enforce_security_policy(peer, SecurityPolicy::EncryptedTransport, callback);
    assert_eq!(result.get(), None);
    assert!(fixture.hci.take().is_empty());

    fixture.manager.on_connection_complete(0, 0x0001, bd_addr);
    fixture.hci_event(SecurityEventPacket::LinkKeyNotification {
        bd_addr,
        link_key: [0x42; 16],
        key_type: LinkKeyType::AuthenticatedP256.to_u8(),
    });
    fixture.manager.on_authentication_complete(0x0001, 0);

    assert_eq!(result.get(), Some(true));
}

#[test]
fn test_le_policy_fails_with_pairing() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();

    let (result, callback) = recorded_callback();
    fixture
        .manager
        .enforce_le_security_policy(peer, SecurityPolicy::EncryptedTransport, callback);
    assert_eq!(fixture.smp.connects(), vec![peer]);
    assert_eq!(result.get(), None);

    fixture.manager.on_le_channel_failed(peer);
    assert_eq!(result.get(), Some(false));
}

#[test]
fn test_le_policy_rejected_when_slot_busy() {
    let first = address(0x01);
    let second = address(0x02);
    let mut fixture = Fixture::new();
    fixture.manager.create_bond_le(first).unwrap();

    let (result, callback) = recorded_callback();
    fixture
        .manager
        .enforce_le_security_policy(second, SecurityPolicy::EncryptedTransport, callback);

    assert_eq!(result.get(), Some(false));
}

#[test]
fn test_out_of_band_data_is_fresh() {
    let mut fixture = Fixture::new();
    let first = fixture.manager.get_out_of_band_data();
    let second = fixture.manager.get_out_of_band_data();
    assert_ne!(first.r, second.r);
    assert_ne!(first.c, second.c);
}

#[test]
fn test_unregistered_listener_gets_nothing() {
    let peer = address(0x01);
    let mut fixture = Fixture::new();
    let (tx, rx) = channel();
    let id = fixture.manager.register_listener(tx);
    assert!(fixture.manager.unregister_listener(id));

    fixture.manager.remove_bond(peer);

    assert!(rx.try_recv().is_err());
    assert_eq!(fixture.events(), vec![SecurityEvent::Unbonded(peer)]);
}

#[test]
fn test_process_timeouts_without_pairing_is_quiet() {
    let mut fixture = Fixture::new();
    fixture.manager.process_timeouts(Instant::now());
    assert!(fixture.events().is_empty());
}

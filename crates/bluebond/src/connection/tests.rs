use super::*;
use crate::config::ConnectionConfig;
use crate::gap::AddressWithType;
use crate::hci::{HciCommand, LeAdvertisingReport};
use crate::testing::*;
use std::collections::BTreeSet;
use std::time::Instant;

const TARGETED: [u8; 5] = [0x04, 0x16, 0x53, 0x18, 0x01];
const GENERAL: [u8; 5] = [0x04, 0x16, 0x53, 0x18, 0x00];

struct Fixture {
    manager: ConnectionManager<HciAcceptList<RecordingHci>>,
    hci: RecordingHci,
}

impl Fixture {
    fn new() -> Self {
        Self::with_capacity(8)
    }

    fn with_capacity(capacity: usize) -> Self {
        init_logging();
        let hci = RecordingHci::new();
        let manager = ConnectionManager::new(
            ConnectionConfig::default(),
            HciAcceptList::new(hci.clone(), capacity),
        );
        Self { manager, hci }
    }

    fn advertise(&mut self, address: AddressWithType, data: &[u8]) -> Option<AppId> {
        self.manager.on_advertising_report(&LeAdvertisingReport {
            event_type: 0x00,
            address,
            data: data.to_vec(),
            rssi: -60,
        })
    }

    fn expire_all(&mut self) -> Vec<DirectConnectTimeout> {
        match self.manager.next_deadline() {
            Some(deadline) => self.manager.process_timeouts(deadline),
            None => Vec::new(),
        }
    }
}

fn add(address: AddressWithType) -> HciCommand {
    HciCommand::LeAddDeviceToFilterAcceptList {
        address_type: 0x00,
        address: address.address,
    }
}

fn remove(address: AddressWithType) -> HciCommand {
    HciCommand::LeRemoveDeviceFromFilterAcceptList {
        address_type: 0x00,
        address: address.address,
    }
}

fn scan_enable(enable: bool) -> HciCommand {
    HciCommand::LeSetScanEnable {
        enable,
        filter_duplicates: false,
    }
}

fn scan_enables(commands: &[HciCommand]) -> Vec<bool> {
    commands
        .iter()
        .filter_map(|command| match command {
            HciCommand::LeSetScanEnable { enable, .. } => Some(*enable),
            _ => None,
        })
        .collect()
}

// Background connect

#[test]
fn test_background_connect_adds_once() {
    let mut f = Fixture::new();
    let peer = address(0x01);

    assert!(f.manager.background_connect_add(1, peer));
    assert!(f.manager.background_connect_add(1, peer));
    assert!(f.manager.background_connect_add(2, peer));

    assert_eq!(f.hci.take(), vec![add(peer)]);
    assert!(f.manager.is_in_accept_list(&peer));
    assert!(f.manager.is_background_connection(&peer));
    assert_eq!(
        f.manager.get_apps_connecting_to(&peer).into_iter().collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn test_background_remove_last_interest_leaves_accept_list() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.manager.background_connect_add(2, peer);
    f.hci.take();

    assert!(f.manager.background_connect_remove(1, peer));
    assert!(f.hci.take().is_empty());

    assert!(f.manager.background_connect_remove(2, peer));
    assert_eq!(f.hci.take(), vec![remove(peer)]);
    assert!(!f.manager.is_background_connection(&peer));
    assert!(f.manager.get_apps_connecting_to(&peer).is_empty());
}

#[test]
fn test_background_remove_without_interest_fails() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    assert!(!f.manager.background_connect_remove(1, peer));

    f.manager.background_connect_add(1, peer);
    assert!(!f.manager.background_connect_remove(2, peer));
    assert!(f.manager.is_in_accept_list(&peer));
}

#[test]
fn test_full_accept_list_rejects_background_connect() {
    let mut f = Fixture::with_capacity(1);
    assert!(f.manager.background_connect_add(1, address(0x01)));
    assert!(!f.manager.background_connect_add(1, address(0x02)));

    assert!(!f.manager.is_background_connection(&address(0x02)));
    assert_eq!(f.hci.take(), vec![add(address(0x01))]);
}

// Targeted announcements

#[test]
fn test_targeted_announcement_displaces_background_connect() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.hci.take();

    assert!(f.manager.background_connect_targeted_announcement_add(2, peer));

    let commands = f.hci.take();
    assert_eq!(commands[0], remove(peer));
    assert!(matches!(commands[1], HciCommand::LeSetScanParameters { scan_type: 0x00, .. }));
    assert_eq!(commands[2], scan_enable(true));
    assert!(!f.manager.is_in_accept_list(&peer));
    assert!(f.manager.is_announcement_filter_enabled());
    assert!(f.manager.accept_list().is_scanning());
}

#[test]
fn test_background_connect_waits_behind_announcement_interest() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_targeted_announcement_add(1, peer);
    f.hci.take();

    assert!(f.manager.background_connect_add(2, peer));
    assert!(f.hci.take().is_empty());
    assert!(!f.manager.is_in_accept_list(&peer));
    assert!(f.manager.get_apps_connecting_to(&peer).contains(&2));
}

#[test]
fn test_dropping_announcement_interest_restores_background_connect() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.manager.background_connect_targeted_announcement_add(2, peer);
    f.hci.take();

    assert!(f.manager.background_connect_remove(2, peer));

    assert_eq!(f.hci.take(), vec![add(peer), scan_enable(false)]);
    assert!(f.manager.is_in_accept_list(&peer));
    assert!(!f.manager.is_announcement_filter_enabled());
}

#[test]
fn test_announcement_interest_outlives_background_interest() {
    let mut f = Fixture::new();
    let peer = address(0x01);

    assert!(f.manager.background_connect_add(1, peer));
    assert_eq!(f.hci.take(), vec![add(peer)]);
    assert!(f.manager.is_in_accept_list(&peer));

    assert!(f.manager.background_connect_targeted_announcement_add(2, peer));
    let commands = f.hci.take();
    assert_eq!(commands[0], remove(peer));
    assert_eq!(scan_enables(&commands), vec![true]);
    assert!(!f.manager.is_in_accept_list(&peer));
    assert!(f.manager.is_announcement_filter_enabled());

    // Only announcement interest is left, the peer stays off the list
    assert!(f.manager.background_connect_remove(1, peer));
    assert!(f.hci.take().is_empty());
    assert!(!f.manager.is_in_accept_list(&peer));
    assert!(f.manager.is_announcement_filter_enabled());
    assert!(f.manager.get_apps_connecting_to(&peer).is_empty());

    assert!(f.manager.background_connect_remove(2, peer));
    assert_eq!(f.hci.take(), vec![scan_enable(false)]);
    assert!(!f.manager.is_announcement_filter_enabled());
    assert!(!f.manager.is_background_connection(&peer));
    assert!(!f.manager.accept_list().contains(&peer));
}

#[test]
fn test_announcement_filter_counts_addresses() {
    let mut f = Fixture::new();
    f.manager.background_connect_targeted_announcement_add(1, address(0x01));
    f.manager.background_connect_targeted_announcement_add(1, address(0x02));
    assert_eq!(scan_enables(&f.hci.take()), vec![true]);

    f.manager.background_connect_remove(1, address(0x01));
    assert!(f.hci.take().is_empty());
    assert!(f.manager.is_announcement_filter_enabled());

    f.manager.background_connect_remove(1, address(0x02));
    assert_eq!(f.hci.take(), vec![scan_enable(false)]);
    assert!(!f.manager.is_background_connection(&address(0x02)));
}

#[test]
fn test_targeted_announcement_starts_direct_connect() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_targeted_announcement_add(3, peer);
    f.hci.take();

    assert_eq!(f.advertise(peer, &GENERAL), None);
    assert_eq!(f.advertise(peer, &TARGETED), Some(3));

    assert_eq!(f.hci.take(), vec![add(peer), scan_enable(false)]);
    assert!(f.manager.is_in_accept_list(&peer));
    assert!(f.manager.next_deadline().is_some());

    // Already connecting
    assert_eq!(f.advertise(peer, &TARGETED), None);
}

#[test]
fn test_announcement_ignored_without_interest_or_when_connected() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    assert_eq!(f.advertise(peer, &TARGETED), None);

    f.manager.background_connect_targeted_announcement_add(1, peer);
    f.manager
        .accept_list_mut()
        .on_le_connection_complete(0x00, 0x0040, peer);
    assert_eq!(f.advertise(peer, &TARGETED), None);

    assert_eq!(f.manager.accept_list_mut().on_disconnection(0x0040), Some(peer));
    assert_eq!(f.advertise(peer, &TARGETED), Some(1));
}

#[test]
fn test_announcement_timeout_returns_to_filtering() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_targeted_announcement_add(1, peer);
    f.advertise(peer, &TARGETED);
    f.hci.take();

    let timeouts = f.expire_all();
    assert_eq!(timeouts, vec![DirectConnectTimeout { app: 1, address: peer }]);
    let commands = f.hci.take();
    assert_eq!(commands[0], remove(peer));
    assert_eq!(scan_enables(&commands), vec![true]);
    assert!(f.manager.is_background_connection(&peer));
    assert!(!f.manager.is_in_accept_list(&peer));
}

// Direct connect

#[test]
fn test_direct_connect_rejects_second_attempt_by_same_app() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    assert!(f.manager.direct_connect_add(1, peer));
    let deadline = f.manager.next_deadline();

    assert!(!f.manager.direct_connect_add(1, peer));
    assert_eq!(f.manager.next_deadline(), deadline);

    assert!(f.manager.direct_connect_add(2, peer));
    assert_eq!(f.hci.take(), vec![add(peer)]);
}

#[test]
fn test_direct_connect_joins_announcement_interest() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_targeted_announcement_add(1, peer);
    f.hci.take();

    assert!(f.manager.direct_connect_add(2, peer));
    assert_eq!(f.hci.take(), vec![add(peer), scan_enable(false)]);

    assert!(f.manager.direct_connect_remove(2, peer));
    let commands = f.hci.take();
    assert_eq!(commands[0], remove(peer));
    assert_eq!(scan_enables(&commands), vec![true]);
    assert!(f.manager.is_background_connection(&peer));
    assert!(f.manager.next_deadline().is_none());
}

#[test]
fn test_direct_connect_timeout_fires_once() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.direct_connect_add(1, peer);
    f.hci.take();

    assert!(f.manager.process_timeouts(Instant::now()).is_empty());

    let timeouts = f.expire_all();
    assert_eq!(timeouts, vec![DirectConnectTimeout { app: 1, address: peer }]);
    assert_eq!(f.hci.take(), vec![remove(peer)]);
    assert!(!f.manager.is_background_connection(&peer));
    assert!(f.expire_all().is_empty());
}

#[test]
fn test_direct_connect_timeout_restores_background_entry() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.manager.direct_connect_add(2, peer);
    f.hci.take();

    let timeouts = f.expire_all();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(f.hci.take(), vec![add(peer)]);
    assert!(f.manager.is_in_accept_list(&peer));
}

#[test]
fn test_direct_connect_remove_cancels_timer() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.manager.direct_connect_add(2, peer);
    f.hci.take();

    assert!(f.manager.direct_connect_remove(2, peer));
    assert!(!f.manager.direct_connect_remove(2, peer));
    assert!(f.hci.take().is_empty());
    assert!(f.manager.next_deadline().is_none());
    assert!(f.manager.is_in_accept_list(&peer));
}

#[test]
fn test_connection_complete_ends_direct_attempts() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.direct_connect_add(1, peer);
    f.manager.direct_connect_add(2, peer);
    f.hci.take();

    f.manager.on_connection_complete(&peer);

    assert_eq!(f.hci.take(), vec![remove(peer)]);
    assert!(!f.manager.is_background_connection(&peer));
    assert!(f.expire_all().is_empty());
}

#[test]
fn test_full_accept_list_rejects_direct_connect() {
    let mut f = Fixture::with_capacity(0);
    assert!(!f.manager.direct_connect_add(1, address(0x01)));
    assert!(f.manager.next_deadline().is_none());
    assert!(!f.manager.is_background_connection(&address(0x01)));
}

// Teardown

#[test]
fn test_app_deregistration_drops_only_that_app() {
    let mut f = Fixture::new();
    f.manager.background_connect_add(1, address(0x01));
    f.manager.direct_connect_add(1, address(0x02));
    f.manager.background_connect_add(2, address(0x02));
    f.manager.background_connect_targeted_announcement_add(1, address(0x03));
    f.hci.take();

    f.manager.on_app_deregistered(1);

    assert_eq!(f.hci.take(), vec![remove(address(0x01)), scan_enable(false)]);
    assert!(!f.manager.is_background_connection(&address(0x01)));
    assert!(f.manager.is_in_accept_list(&address(0x02)));
    assert!(!f.manager.is_background_connection(&address(0x03)));
    assert!(f.manager.next_deadline().is_none());
}

#[test]
fn test_remove_unconditional() {
    let mut f = Fixture::new();
    let peer = address(0x01);
    f.manager.background_connect_add(1, peer);
    f.manager.direct_connect_add(2, peer);
    f.hci.take();

    assert!(f.manager.remove_unconditional(&peer));
    assert!(!f.manager.remove_unconditional(&peer));
    assert_eq!(f.hci.take(), vec![remove(peer)]);
    assert!(f.manager.next_deadline().is_none());
}

#[test]
fn test_reset_clears_controller_state() {
    let mut f = Fixture::new();
    f.manager.background_connect_add(1, address(0x01));
    f.manager.background_connect_targeted_announcement_add(1, address(0x02));
    f.manager.direct_connect_add(2, address(0x03));
    f.hci.take();

    f.manager.reset(false);

    assert_eq!(
        f.hci.take(),
        vec![scan_enable(false), HciCommand::LeClearFilterAcceptList]
    );
    assert!(!f.manager.is_background_connection(&address(0x01)));
    assert!(f.manager.accept_list().is_empty());
    assert!(f.expire_all().is_empty());
}

#[test]
fn test_reset_after_controller_reset_is_silent() {
    let mut f = Fixture::new();
    f.manager.background_connect_add(1, address(0x01));
    f.hci.take();

    f.manager.reset(true);

    assert!(f.hci.take().is_empty());
    assert!(!f.manager.is_background_connection(&address(0x01)));
}

#[test]
fn test_dump() {
    let mut f = Fixture::new();
    assert!(f.manager.dump().contains("no Low Energy connection attempts"));

    f.manager.background_connect_add(4, address(0x01));
    f.manager.direct_connect_add(7, address(0x01));

    let dump = f.manager.dump();
    assert!(dump.contains(&address(0x01).to_string()));
    assert!(dump.contains("apps doing direct connect: 7"));
    assert!(dump.contains("apps doing background connect: 4"));
    assert!(dump.contains("in the accept list: true"));
}

// Accept-list membership over arbitrary sequences

#[derive(Debug, Clone, Copy)]
enum Step {
    Background(AppId),
    Targeted(AppId),
    RemoveBackground(AppId),
    Direct(AppId),
    RemoveDirect(AppId),
    Announcement,
    Connected,
    Timeout,
}

#[derive(Debug, Default)]
struct Interest {
    background: BTreeSet<AppId>,
    targeted: BTreeSet<AppId>,
    direct: BTreeSet<AppId>,
}

impl Interest {
    fn wants_accept_list(&self) -> bool {
        !self.direct.is_empty() || (!self.background.is_empty() && self.targeted.is_empty())
    }

    fn is_empty(&self) -> bool {
        self.background.is_empty() && self.targeted.is_empty() && self.direct.is_empty()
    }
}

fn all_steps() -> Vec<Step> {
    let mut steps = vec![Step::Announcement, Step::Connected, Step::Timeout];
    for app in [1, 2] {
        steps.extend([
            Step::Background(app),
            Step::Targeted(app),
            Step::RemoveBackground(app),
            Step::Direct(app),
            Step::RemoveDirect(app),
        ]);
    }
    steps
}

fn apply(f: &mut Fixture, interest: &mut Interest, peer: AddressWithType, step: Step) {
    match step {
        Step::Background(app) => {
            assert!(f.manager.background_connect_add(app, peer));
            interest.background.insert(app);
        }
        Step::Targeted(app) => {
            assert!(f.manager.background_connect_targeted_announcement_add(app, peer));
            interest.targeted.insert(app);
        }
        Step::RemoveBackground(app) => {
            let known = interest.background.remove(&app) | interest.targeted.remove(&app);
            assert_eq!(f.manager.background_connect_remove(app, peer), known);
        }
        Step::Direct(app) => {
            assert_eq!(f.manager.direct_connect_add(app, peer), interest.direct.insert(app));
        }
        Step::RemoveDirect(app) => {
            assert_eq!(f.manager.direct_connect_remove(app, peer), interest.direct.remove(&app));
        }
        Step::Announcement => {
            let expected = match interest.targeted.first() {
                Some(&app) if !interest.wants_accept_list() => Some(app),
                _ => None,
            };
            assert_eq!(f.advertise(peer, &TARGETED), expected);
            if let Some(app) = expected {
                interest.direct.insert(app);
            }
        }
        Step::Connected => {
            f.manager.on_connection_complete(&peer);
            interest.direct.clear();
        }
        Step::Timeout => {
            let later = Instant::now() + ConnectionConfig::default().direct_connect_timeout * 2;
            assert_eq!(f.manager.process_timeouts(later).len(), interest.direct.len());
            interest.direct.clear();
        }
    }
}

#[test]
fn test_accept_list_membership_follows_interest() {
    let peer = address(0x01);
    let steps = all_steps();

    for first in &steps {
        for second in &steps {
            for third in &steps {
                let mut f = Fixture::new();
                let mut interest = Interest::default();
                let sequence = [*first, *second, *third];

                for step in sequence {
                    apply(&mut f, &mut interest, peer, step);

                    let wanted = interest.wants_accept_list();
                    assert_eq!(f.manager.is_in_accept_list(&peer), wanted, "{:?}", sequence);
                    assert_eq!(f.manager.accept_list().contains(&peer), wanted, "{:?}", sequence);
                    assert_eq!(
                        f.manager.is_announcement_filter_enabled(),
                        !interest.targeted.is_empty() && !wanted,
                        "{:?}",
                        sequence
                    );
                    assert_eq!(f.manager.get_apps_connecting_to(&peer), interest.background);
                    assert_eq!(
                        f.manager.is_background_connection(&peer),
                        !interest.is_empty(),
                        "{:?}",
                        sequence
                    );
                }
            }
        }
    }
}

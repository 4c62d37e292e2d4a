use crate::alarm::{AlarmQueue, AlarmToken};
use crate::config::ConnectionConfig;
use crate::connection::accept_list::AcceptListController;
use crate::connection::announcement::is_targeted_announcement;
use crate::gap::AddressWithType;
use crate::hci::LeAdvertisingReport;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::time::Instant;

/// Identifies a client of the connection manager
pub type AppId = u8;

/// A direct connection attempt that ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectConnectTimeout {
    pub app: AppId,
    pub address: AddressWithType,
}

/// Interest in one address
#[derive(Debug, Default)]
struct AppsConnecting {
    background: BTreeSet<AppId>,
    targeted: BTreeSet<AppId>,
    /// Each direct attempt owns its timeout alarm
    direct: BTreeMap<AppId, AlarmToken>,
    in_accept_list: bool,
}

impl AppsConnecting {
    fn is_anyone_connecting(&self) -> bool {
        !self.background.is_empty() || !self.targeted.is_empty() || !self.direct.is_empty()
    }

    /// Announcement filtering displaces plain background interest, never a
    /// direct attempt
    fn wants_accept_list(&self) -> bool {
        if self.targeted.is_empty() {
            !self.background.is_empty() || !self.direct.is_empty()
        } else {
            !self.direct.is_empty()
        }
    }

    fn uses_announcement_filter(&self) -> bool {
        !self.in_accept_list && !self.targeted.is_empty()
    }
}

/// Accept list arbitration across background, announcement and direct
/// connection interest
///
/// An address is on the accept list exactly when a direct attempt wants it, or
/// when background interest wants it and no client is waiting for a targeted
/// announcement from it. Addresses held off the list by announcement interest
/// are covered by a controller-wide passive scan instead.
#[derive(Debug)]
pub struct ConnectionManager<A: AcceptListController> {
    config: ConnectionConfig,
    accept_list: A,
    devices: BTreeMap<AddressWithType, AppsConnecting>,
    alarms: AlarmQueue<(AppId, AddressWithType)>,
    announcement_filter: bool,
}

impl<A: AcceptListController> ConnectionManager<A> {
    pub fn new(config: ConnectionConfig, accept_list: A) -> Self {
        Self {
            config,
            accept_list,
            devices: BTreeMap::new(),
            alarms: AlarmQueue::new(),
            announcement_filter: false,
        }
    }

    pub fn accept_list(&self) -> &A {
        &self.accept_list
    }

    pub fn accept_list_mut(&mut self) -> &mut A {
        &mut self.accept_list
    }

    /// Add background connection interest. Returns false only when the
    /// address needed the accept list and could not get on it.
    pub fn background_connect_add(&mut self, app: AppId, address: AddressWithType) -> bool {
        let (in_accept_list, targeted) = match self.devices.get(&address) {
            Some(entry) if entry.background.contains(&app) => {
                debug!("App {} already connecting to {} in background", app, address);
                return true;
            }
            Some(entry) => (entry.in_accept_list, !entry.targeted.is_empty()),
            None => (false, false),
        };

        let mut added = false;
        if in_accept_list {
            debug!("{} already on the accept list", address);
        } else if targeted {
            debug!("{} is waiting for a targeted announcement, not adding to the accept list", address);
        } else {
            if !self.accept_list.add(&address, false) {
                warn!("App {} could not add {} to the accept list", app, address);
                return false;
            }
            added = true;
        }

        let entry = self.devices.entry(address).or_default();
        entry.in_accept_list |= added;
        entry.background.insert(app);
        info!("App {} background connecting to {}", app, address);
        true
    }

    /// Wait for a targeted announcement from `address` before connecting
    pub fn background_connect_targeted_announcement_add(
        &mut self,
        app: AppId,
        address: AddressWithType,
    ) -> bool {
        let entry = self.devices.entry(address).or_default();
        if entry.targeted.contains(&app) {
            debug!("App {} already waiting for announcements from {}", app, address);
            return true;
        }
        entry.targeted.insert(app);
        info!("App {} waiting for targeted announcements from {}", app, address);

        self.reconcile(&address);
        true
    }

    /// Drop background and announcement interest of `app`
    pub fn background_connect_remove(&mut self, app: AppId, address: AddressWithType) -> bool {
        let Some(entry) = self.devices.get_mut(&address) else {
            warn!("No connection attempts to {}", address);
            return false;
        };

        let background = entry.background.remove(&app);
        let targeted = entry.targeted.remove(&app);
        if !background && !targeted {
            warn!("App {} is not background connecting to {}", app, address);
            return false;
        }

        info!("App {} stopped background connecting to {}", app, address);
        self.reconcile(&address);
        true
    }

    /// Forget every interest in `address`, whoever registered it
    pub fn remove_unconditional(&mut self, address: &AddressWithType) -> bool {
        let Some(entry) = self.devices.remove(address) else {
            return false;
        };

        for token in entry.direct.values() {
            self.alarms.cancel(*token);
        }
        if entry.in_accept_list {
            self.accept_list.remove(address);
        }
        info!("Removed all connection attempts to {}", address);
        self.update_announcement_filter();
        true
    }

    /// Start a time-bounded connection attempt. A second attempt by the same
    /// app for the same address is refused.
    pub fn direct_connect_add(&mut self, app: AppId, address: AddressWithType) -> bool {
        let in_accept_list = match self.devices.get(&address) {
            Some(entry) if entry.direct.contains_key(&app) => {
                warn!("App {} already direct connecting to {}", app, address);
                return false;
            }
            Some(entry) => entry.in_accept_list,
            None => false,
        };

        if !in_accept_list && !self.accept_list.add(&address, true) {
            warn!("App {} could not add {} to the accept list", app, address);
            return false;
        }

        let deadline = Instant::now() + self.config.direct_connect_timeout;
        let token = self.alarms.schedule(deadline, (app, address));

        let entry = self.devices.entry(address).or_default();
        entry.in_accept_list = true;
        entry.direct.insert(app, token);
        info!("App {} direct connecting to {}", app, address);

        self.update_announcement_filter();
        true
    }

    pub fn direct_connect_remove(&mut self, app: AppId, address: AddressWithType) -> bool {
        self.remove_direct(app, address, false)
    }

    /// Stop tracking a client that went away
    pub fn on_app_deregistered(&mut self, app: AppId) {
        let addresses: Vec<AddressWithType> = self.devices.keys().copied().collect();
        for address in addresses {
            let Some(entry) = self.devices.get_mut(&address) else {
                continue;
            };

            let mut touched = entry.background.remove(&app);
            touched |= entry.targeted.remove(&app);
            if let Some(token) = entry.direct.remove(&app) {
                self.alarms.cancel(token);
                touched = true;
            }

            if touched {
                self.reconcile(&address);
            }
        }
    }

    /// A link to `address` is up, so no direct attempt is needed any more
    pub fn on_connection_complete(&mut self, address: &AddressWithType) {
        let Some(entry) = self.devices.get_mut(address) else {
            return;
        };
        if entry.direct.is_empty() {
            return;
        }

        for (app, token) in std::mem::take(&mut entry.direct) {
            self.alarms.cancel(token);
            debug!("Direct connection by app {} to {} completed", app, address);
        }
        self.reconcile(address);
    }

    /// Promote announcement interest to a direct attempt when the peer asks
    /// for a connection. Returns the app the attempt was started for.
    pub fn on_advertising_report(&mut self, report: &LeAdvertisingReport) -> Option<AppId> {
        let entry = self.devices.get(&report.address)?;
        let app = *entry.targeted.iter().next()?;

        if !is_targeted_announcement(&report.data) {
            return None;
        }
        if entry.in_accept_list {
            debug!("{} is already being connected", report.address);
            return None;
        }
        if self.accept_list.is_connected(&report.address) {
            debug!("{} is already connected", report.address);
            return None;
        }

        info!("Targeted announcement from {}, connecting for app {}", report.address, app);
        self.direct_connect_add(app, report.address).then_some(app)
    }

    /// Fire expired direct connection timeouts
    pub fn process_timeouts(&mut self, now: Instant) -> Vec<DirectConnectTimeout> {
        let mut timeouts = Vec::new();
        for (token, (app, address)) in self.alarms.poll_expired(now) {
            let current = self
                .devices
                .get(&address)
                .and_then(|entry| entry.direct.get(&app))
                .copied();
            if current != Some(token) {
                debug!("Dropping stale direct connect timeout for {}", address);
                continue;
            }

            info!("Direct connection by app {} to {} timed out", app, address);
            self.remove_direct(app, address, true);
            timeouts.push(DirectConnectTimeout { app, address });
        }
        timeouts
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.alarms.next_deadline()
    }

    /// Apps holding background interest in `address`
    pub fn get_apps_connecting_to(&self, address: &AddressWithType) -> BTreeSet<AppId> {
        self.devices
            .get(address)
            .map(|entry| entry.background.clone())
            .unwrap_or_default()
    }

    pub fn is_background_connection(&self, address: &AddressWithType) -> bool {
        self.devices.contains_key(address)
    }

    pub fn is_in_accept_list(&self, address: &AddressWithType) -> bool {
        self.devices
            .get(address)
            .is_some_and(|entry| entry.in_accept_list)
    }

    pub fn is_announcement_filter_enabled(&self) -> bool {
        self.announcement_filter
    }

    /// Drop all interest. After a controller reset the controller has already
    /// forgotten its list and filters, so nothing is sent.
    pub fn reset(&mut self, after_reset: bool) {
        info!("Resetting connection manager, after_reset={}", after_reset);
        self.devices.clear();
        self.alarms.clear();
        self.announcement_filter = false;
        if !after_reset {
            self.accept_list.set_announcement_filter(false);
            self.accept_list.clear();
        }
    }

    pub fn dump(&self) -> String {
        let mut out = String::from("\tle background connect:\n");
        if self.devices.is_empty() {
            out.push_str("\t\tno Low Energy connection attempts\n");
            return out;
        }

        for (address, entry) in &self.devices {
            let _ = writeln!(out, "\t\t{}:", address);
            let _ = writeln!(out, "\t\t\tapps doing direct connect: {}", join(entry.direct.keys()));
            let _ = writeln!(out, "\t\t\tapps doing background connect: {}", join(&entry.background));
            let _ = writeln!(out, "\t\t\tapps doing targeted announcements: {}", join(&entry.targeted));
            let _ = writeln!(out, "\t\t\tin the accept list: {}", entry.in_accept_list);
        }
        out
    }

    fn remove_direct(&mut self, app: AppId, address: AddressWithType, timed_out: bool) -> bool {
        let Some(entry) = self.devices.get_mut(&address) else {
            warn!("No connection attempts to {}", address);
            return false;
        };
        let Some(token) = entry.direct.remove(&app) else {
            warn!("App {} is not direct connecting to {}", app, address);
            return false;
        };
        self.alarms.cancel(token);

        // The controller prunes its list when a direct attempt times out
        if timed_out && entry.in_accept_list && entry.wants_accept_list() {
            if !self.accept_list.add(&address, false) {
                warn!("Could not restore {} to the accept list", address);
                entry.in_accept_list = false;
            }
        }

        self.reconcile(&address);
        true
    }

    /// Bring one address back in line with the membership rule, erasing it
    /// once nobody is interested
    fn reconcile(&mut self, address: &AddressWithType) {
        if let Some(entry) = self.devices.get_mut(address) {
            if !entry.is_anyone_connecting() {
                if entry.in_accept_list {
                    self.accept_list.remove(address);
                }
                self.devices.remove(address);
                debug!("No interest left in {}", address);
            } else {
                let wanted = entry.wants_accept_list();
                if wanted && !entry.in_accept_list {
                    if self.accept_list.add(address, !entry.direct.is_empty()) {
                        entry.in_accept_list = true;
                    } else {
                        warn!("Could not put {} back on the accept list", address);
                    }
                } else if !wanted && entry.in_accept_list {
                    info!("Switching {} to announcement filtering", address);
                    self.accept_list.remove(address);
                    entry.in_accept_list = false;
                }
            }
        }

        self.update_announcement_filter();
    }

    fn update_announcement_filter(&mut self) {
        let wanted = self
            .devices
            .values()
            .any(AppsConnecting::uses_announcement_filter);
        if wanted != self.announcement_filter {
            info!(
                "{} targeted announcement filtering",
                if wanted { "Enabling" } else { "Disabling" }
            );
            self.announcement_filter = wanted;
            self.accept_list.set_announcement_filter(wanted);
        }
    }
}

fn join<'a>(apps: impl IntoIterator<Item = &'a AppId>) -> String {
    let apps: Vec<String> = apps.into_iter().map(|app| app.to_string()).collect();
    apps.join(", ")
}

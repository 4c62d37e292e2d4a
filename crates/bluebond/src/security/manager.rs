//! Security manager: owns every pairing handler and the security records
//!
//! All entry points run on the owning context. Handlers report completion
//! through a channel which is drained after every call into a handler, so a
//! handler is never dropped from inside its own call frame.

use super::channel::SmpChannel;
use super::classic::{ClassicPairingHandler, RemoteClassicOob};
use super::handler::*;
use super::listener::{ListenerId, Listeners, SecurityEvent};
use super::record::SecurityRecord;
use super::record_store::SecurityRecordStore;
use super::smp::crypto::generate_random_128;
use super::smp::{
    LeOobData, LePairingHandler, LocalOobKeys, PairingFeatures, Role, SmpCrypto, SmpPdu, SmpReason,
};
use super::types::*;
use super::ui::{LoggingUi, PairingUi};
use crate::alarm::AlarmQueue;
use crate::config::SecurityConfig;
use crate::gap::{AddressWithType, BdAddr};
use crate::hci::constants::{HCI_REMOTE_USER_TERMINATED_CONNECTION, HCI_SUCCESS};
use crate::hci::{CommandSender, HciCommand, SecurityEventPacket};
use crate::storage::{get_array, Storage, KEY_ADDRESS, KEY_LE_LOCAL_KEY_IRK, SECTION_ADAPTER};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

type PolicyCallback = Box<dyn FnOnce(bool)>;

/// The single LE pairing slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingLePairing {
    address: AddressWithType,
    waiting_for_channel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LeChannel {
    handle: u16,
    role: Role,
}

pub struct SecurityManager {
    config: SecurityConfig,
    hci: Rc<dyn CommandSender>,
    smp: Rc<dyn SmpChannel>,
    crypto: Box<dyn SmpCrypto>,
    ui: Box<dyn PairingUi>,
    storage: Box<dyn Storage>,
    records: SecurityRecordStore,
    handlers: HashMap<AddressWithType, PairingHandler>,
    pending_le: Option<PendingLePairing>,
    completion_tx: Sender<PairingCompletion>,
    completion_rx: Receiver<PairingCompletion>,
    listeners: Listeners,
    /// Classic ACL handles
    connections: HashMap<u16, AddressWithType>,
    le_channels: HashMap<AddressWithType, LeChannel>,
    policy_callbacks: Vec<(AddressWithType, SecurityPolicy, PolicyCallback)>,
    local_address: AddressWithType,
    local_irk: [u8; 16],
    local_le_oob: Option<LocalOobKeys>,
    remote_le_oob: HashMap<AddressWithType, LeOobData>,
    smp_alarms: AlarmQueue<AddressWithType>,
}

impl SecurityManager {
    pub fn new(
        config: SecurityConfig,
        hci: Rc<dyn CommandSender>,
        smp: Rc<dyn SmpChannel>,
        crypto: Box<dyn SmpCrypto>,
        storage: Box<dyn Storage>,
    ) -> Self {
        let (completion_tx, completion_rx) = channel();
        Self {
            config,
            hci,
            smp,
            crypto,
            ui: Box::new(LoggingUi),
            storage,
            records: SecurityRecordStore::new(),
            handlers: HashMap::new(),
            pending_le: None,
            completion_tx,
            completion_rx,
            listeners: Listeners::default(),
            connections: HashMap::new(),
            le_channels: HashMap::new(),
            policy_callbacks: Vec::new(),
            local_address: AddressWithType::public(BdAddr::default()),
            local_irk: [0; 16],
            local_le_oob: None,
            remote_le_oob: HashMap::new(),
            smp_alarms: AlarmQueue::new(),
        }
    }

    /// Enable SSP and Secure Connections, load bonds and the local IRK
    pub fn init(&mut self, local_address: BdAddr) -> Result<(), SecurityError> {
        self.send_command(HciCommand::WriteSimplePairingMode { enabled: true });
        self.send_command(HciCommand::WriteSecureConnectionsHostSupport { enabled: true });

        self.records.load_all(&*self.storage);

        let stored_irk = get_array::<16>(&*self.storage, SECTION_ADAPTER, KEY_LE_LOCAL_KEY_IRK);
        self.local_irk = match stored_irk {
            Some(irk) => irk,
            None => {
                info!("Generating local IRK");
                let irk = generate_random_128();
                self.storage.set(SECTION_ADAPTER, KEY_LE_LOCAL_KEY_IRK, &irk);
                irk
            }
        };

        self.local_address = AddressWithType::public(local_address);
        self.storage.set(SECTION_ADAPTER, KEY_ADDRESS, local_address.as_slice());
        self.storage.flush()?;

        info!("Security manager ready on {}", local_address);
        Ok(())
    }

    pub fn set_user_interface_handler(&mut self, ui: Box<dyn PairingUi>) {
        self.ui = ui;
    }

    pub fn register_listener(&mut self, sender: Sender<SecurityEvent>) -> ListenerId {
        self.listeners.register(sender)
    }

    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn records(&self) -> &SecurityRecordStore {
        &self.records
    }

    pub fn record(&self, address: &AddressWithType) -> Option<&SecurityRecord> {
        self.records.find(address)
    }

    pub fn is_bonded(&self, address: &AddressWithType) -> bool {
        self.records.is_bonded(address)
    }

    pub fn has_pending_pairing(&self, address: &AddressWithType) -> bool {
        self.handlers.contains_key(address)
            || self.pending_le.is_some_and(|p| p.address == *address)
    }

    pub fn pending_le_pairing(&self) -> Option<AddressWithType> {
        self.pending_le.map(|p| p.address)
    }

    pub fn local_irk(&self) -> [u8; 16] {
        self.local_irk
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.smp_alarms.next_deadline()
    }

    fn send_command(&self, command: HciCommand) {
        if let Err(e) = self.hci.send_command(command) {
            error!("Failed to send HCI command: {}", e);
        }
    }

    fn notify(&mut self, event: SecurityEvent) {
        self.listeners.notify(event);
    }

    fn save(&mut self) {
        if let Err(e) = self.records.save_all(&mut *self.storage) {
            error!("Failed to save security records: {}", e);
        }
    }

    fn with_handler_at<R>(
        &mut self,
        address: &AddressWithType,
        now: Instant,
        f: impl FnOnce(&mut PairingHandler, &mut HandlerContext<'_>) -> R,
    ) -> Option<R> {
        let handler = self.handlers.get_mut(address)?;
        let mut ctx = HandlerContext {
            hci: &*self.hci,
            smp: &*self.smp,
            crypto: &*self.crypto,
            ui: &*self.ui,
            config: &self.config,
            local_address: self.local_address,
            local_irk: self.local_irk,
            alarms: &mut self.smp_alarms,
            now,
        };
        let result = f(handler, &mut ctx);
        self.drain_completions();
        Some(result)
    }

    fn with_handler<R>(
        &mut self,
        address: &AddressWithType,
        f: impl FnOnce(&mut PairingHandler, &mut HandlerContext<'_>) -> R,
    ) -> Option<R> {
        self.with_handler_at(address, Instant::now(), f)
    }

    fn feed(&mut self, address: &AddressWithType, input: PairingInput) -> bool {
        self.with_handler(address, |handler, ctx| handler.on_input(ctx, input))
            .is_some()
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.on_pairing_complete(completion);
        }
    }

    fn on_pairing_complete(&mut self, completion: PairingCompletion) {
        let PairingCompletion { address, result } = completion;
        self.handlers.remove(&address);
        if self.pending_le.is_some_and(|p| p.address == address) {
            self.pending_le = None;
        }

        match result {
            Ok(outcome) => {
                let record = self.records.find_or_create(&address);
                record.apply_outcome(&outcome);
                let identity = outcome.keys.identity_address;
                if let Some(identity) = identity {
                    self.records.merge_identity(&address, &identity);
                }
                self.save();

                info!("Bonded with {} at {:?}", address, outcome.level);
                self.notify(SecurityEvent::Bonded(address));
                if let Some(identity) = identity.filter(|id| *id != address) {
                    self.notify(SecurityEvent::Bonded(identity));
                }
            }
            Err(failure) => {
                if let Some(record) = self.records.find_mut(&address) {
                    record.pairing = false;
                }
                info!("Bonding with {} failed: {}", address, failure);
                self.notify(SecurityEvent::BondFailed(address, failure));
                self.save();
            }
        }

        self.run_policy_callbacks(&address);
    }

    fn run_policy_callbacks(&mut self, address: &AddressWithType) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.policy_callbacks)
            .into_iter()
            .partition(|(target, _, _)| {
                target == address || self.records.find(address).is_some_and(|r| r.matches(target))
            });
        self.policy_callbacks = waiting;

        for (target, policy, callback) in ready {
            let satisfied = self.records.find(&target).is_some_and(|r| r.satisfies(policy));
            debug!("Policy {:?} for {}: {}", policy, target, satisfied);
            callback(satisfied);
        }
    }

    fn mark_pairing(&mut self, address: &AddressWithType) {
        let record = self.records.find_or_create(address);
        record.pairing = true;
        if !record.bonded {
            record.temporary = true;
        }
    }

    fn classic_handle(&self, address: &AddressWithType) -> Option<u16> {
        self.connections
            .iter()
            .find(|(_, connected)| *connected == address)
            .map(|(handle, _)| *handle)
    }

    fn dispatch_classic(
        &mut self,
        address: AddressWithType,
        locally_initiated: bool,
        authentication_requirements: AuthenticationRequirements,
        remote_oob: RemoteClassicOob,
    ) {
        let address = address.to_classic();
        if self.handlers.contains_key(&address) {
            warn!("Pairing with {} already in progress, dispatch ignored", address);
            return;
        }

        self.mark_pairing(&address);
        let stored_link_key = self.records.find(&address).and_then(|r| r.link_key);
        let handler = ClassicPairingHandler::new(
            address,
            locally_initiated,
            self.config.io_capability,
            authentication_requirements,
            remote_oob,
            self.classic_handle(&address),
            stored_link_key,
            Completer::new(address, self.completion_tx.clone()),
        );
        debug!("Dispatching classic pairing with {}", address);
        self.handlers.insert(address, PairingHandler::Classic(handler));
        self.with_handler(&address, |handler, ctx| handler.initiate(ctx));
    }

    pub fn create_bond(&mut self, address: AddressWithType) {
        let address = address.to_classic();
        if self.records.is_bonded(&address) {
            info!("{} is already bonded", address);
            self.notify(SecurityEvent::Bonded(address));
            return;
        }
        let requirements = self.config.authentication_requirements;
        self.dispatch_classic(address, true, requirements, RemoteClassicOob::default());
    }

    pub fn create_bond_out_of_band(
        &mut self,
        address: AddressWithType,
        p192: Option<ClassicOobData>,
        p256: Option<ClassicOobData>,
    ) {
        let address = address.to_classic();
        if self.records.is_bonded(&address) {
            info!("{} is already bonded", address);
            self.notify(SecurityEvent::Bonded(address));
            return;
        }
        let requirements = self.config.authentication_requirements;
        self.dispatch_classic(address, true, requirements, RemoteClassicOob { p192, p256 });
    }

    pub fn create_bond_le(&mut self, address: AddressWithType) -> Result<(), SecurityError> {
        if self.records.is_bonded(&address) {
            self.notify(SecurityEvent::BondFailed(
                address,
                PairingFailure::new("Already bonded"),
            ));
            return Ok(());
        }
        if let Some(pending) = self.pending_le {
            return Err(if pending.address == address {
                SecurityError::PairingInProgress(address)
            } else {
                SecurityError::LePairingBusy(pending.address)
            });
        }
        if self.handlers.contains_key(&address) {
            return Err(SecurityError::PairingInProgress(address));
        }

        self.mark_pairing(&address);
        self.pending_le = Some(PendingLePairing {
            address,
            waiting_for_channel: true,
        });

        match self.le_channels.get(&address).copied() {
            Some(channel) => self.start_le_pairing(address, channel, true, None),
            None => {
                debug!("Opening SMP channel to {}", address);
                self.smp.connect(&address);
            }
        }
        Ok(())
    }

    fn start_le_pairing(
        &mut self,
        address: AddressWithType,
        channel: LeChannel,
        locally_initiated: bool,
        remote_request: Option<PairingFeatures>,
    ) {
        self.pending_le = Some(PendingLePairing {
            address,
            waiting_for_channel: false,
        });

        let handler = LePairingHandler::new(
            address,
            channel.role,
            channel.handle,
            locally_initiated,
            remote_request,
            self.remote_le_oob.remove(&address),
            self.local_le_oob,
            Completer::new(address, self.completion_tx.clone()),
        );
        debug!("Starting LE pairing with {} as {:?}", address, channel.role);
        self.handlers.insert(address, PairingHandler::Le(handler));
        self.with_handler(&address, |handler, ctx| handler.initiate(ctx));
    }

    /// Fail an LE pairing that never got a handler
    fn fail_pending_le(&mut self, address: &AddressWithType, message: &str, link_lost: bool) {
        let Some(pending) = self.pending_le.filter(|p| p.address == *address) else {
            return;
        };
        if self.handlers.contains_key(address) {
            self.with_handler(address, |handler, ctx| {
                if link_lost {
                    handler.on_link_lost(ctx, message)
                } else {
                    handler.cancel(ctx, message)
                }
            });
            return;
        }

        self.pending_le = None;
        if let Some(record) = self.records.find_mut(&pending.address) {
            record.pairing = false;
        }
        self.notify(SecurityEvent::BondFailed(pending.address, PairingFailure::new(message)));
        self.save();
        self.run_policy_callbacks(address);
    }

    pub fn cancel_bond(&mut self, address: AddressWithType) {
        let classic = address.to_classic();
        let mut cancelled = self
            .with_handler(&address, |handler, ctx| handler.cancel(ctx, "Bonding cancelled"))
            .is_some();
        if classic != address && self.handlers.get(&classic).is_some_and(|h| !h.is_le()) {
            cancelled |= self
                .with_handler(&classic, |handler, ctx| handler.cancel(ctx, "Bonding cancelled"))
                .is_some();
        }
        if !cancelled {
            debug!("No pairing handler for {}", address);
        }
        self.fail_pending_le(&address, "Bonding cancelled", false);

        for key in [address, classic] {
            if let Some(record) = self.records.find_mut(&key) {
                record.pairing = false;
            }
        }
    }

    pub fn remove_bond(&mut self, address: AddressWithType) {
        self.cancel_bond(address);

        if let Some(handle) = self.classic_handle(&address) {
            self.send_command(HciCommand::Disconnect {
                handle,
                reason: HCI_REMOTE_USER_TERMINATED_CONNECTION,
            });
        }
        self.send_command(HciCommand::DeleteStoredLinkKey {
            bd_addr: address.address,
            delete_all: false,
        });

        if self.records.remove(&address).is_some() {
            info!("Removed bond with {}", address);
        }
        self.save();
        self.notify(SecurityEvent::Unbonded(address));
    }

    pub fn on_hci_security_event(&mut self, event: SecurityEventPacket) {
        let address = AddressWithType::public(event.bd_addr());
        if self.handlers.contains_key(&address) {
            self.feed(&address, PairingInput::Hci(event));
            return;
        }

        if let SecurityEventPacket::LinkKeyRequest { bd_addr } = event {
            let stored = self.records.find(&address).filter(|r| r.bonded);
            if let Some(link_key) = stored.and_then(|r| r.link_key) {
                debug!("Answering link key request for bonded {}", address);
                self.send_command(HciCommand::LinkKeyRequestReply {
                    bd_addr,
                    link_key: link_key.key,
                });
                return;
            }
        }

        if !event.can_start_pairing() {
            warn!("Dropping {:?}, no pairing with {}", event, address);
            return;
        }

        info!("{} started pairing", address);
        let requirements = self.config.authentication_requirements;
        self.dispatch_classic(address, false, requirements, RemoteClassicOob::default());
        self.feed(&address, PairingInput::Hci(event));
    }

    pub fn on_connection_complete(&mut self, status: u8, handle: u16, bd_addr: BdAddr) {
        let address = AddressWithType::public(bd_addr);
        if status == HCI_SUCCESS {
            self.connections.insert(handle, address);
        }
        self.feed(&address, PairingInput::ConnectionComplete { status, handle });
    }

    pub fn on_disconnection(&mut self, handle: u16) {
        match self.connections.remove(&handle) {
            Some(address) => self.on_connection_closed(address),
            None => debug!("Disconnection of unknown handle 0x{:04x}", handle),
        }
    }

    /// Cancels any pairing with `address` and forgets a temporary record
    pub fn on_connection_closed(&mut self, address: AddressWithType) {
        self.with_handler(&address, |handler, ctx| {
            handler.on_link_lost(ctx, "Connection closed")
        });
        self.drop_temporary_record(&address);
    }

    fn drop_temporary_record(&mut self, address: &AddressWithType) {
        if self.records.find(address).is_some_and(|r| r.temporary && !r.bonded) {
            debug!("Removing temporary record for {}", address);
            self.records.remove(address);
        }
    }

    pub fn on_authentication_complete(&mut self, handle: u16, status: u8) {
        match self.connections.get(&handle).copied() {
            Some(address) => {
                if !self.feed(&address, PairingInput::AuthenticationComplete { status }) {
                    debug!("Authentication complete for {} without pairing", address);
                }
            }
            None => warn!("Authentication complete for unknown handle 0x{:04x}", handle),
        }
    }

    fn le_handler_for_handle(&self, handle: u16) -> Option<AddressWithType> {
        self.handlers
            .values()
            .filter_map(|h| h.as_le())
            .find(|h| h.handle() == handle)
            .map(|h| h.address())
    }

    pub fn on_encryption_change(&mut self, handle: u16, status: u8, enabled: bool) {
        if let Some(address) = self.le_handler_for_handle(handle) {
            self.feed(&address, PairingInput::EncryptionChange { status, enabled });
            return;
        }

        let address = self.connections.get(&handle).copied().or_else(|| {
            self.le_channels
                .iter()
                .find(|(_, channel)| channel.handle == handle)
                .map(|(address, _)| *address)
        });
        self.notify(SecurityEvent::EncryptionStateChanged {
            address,
            handle,
            status,
            enabled,
        });
    }

    pub fn on_le_channel_open(&mut self, address: AddressWithType, handle: u16, role: Role) {
        let channel = LeChannel { handle, role };
        self.le_channels.insert(address, channel);

        if self
            .pending_le
            .is_some_and(|p| p.address == address && p.waiting_for_channel)
        {
            self.start_le_pairing(address, channel, true, None);
        }
    }

    pub fn on_le_channel_failed(&mut self, address: AddressWithType) {
        self.fail_pending_le(&address, "Connection establishment failed", true);
    }

    pub fn on_le_channel_closed(&mut self, address: AddressWithType) {
        self.le_channels.remove(&address);
        self.fail_pending_le(&address, "Connection closed", true);
        self.drop_temporary_record(&address);
    }

    pub fn on_smp_pdu(&mut self, address: AddressWithType, bytes: &[u8]) {
        if self.handlers.get(&address).is_some_and(|h| h.is_le()) {
            self.feed(&address, PairingInput::SmpPdu(bytes.to_vec()));
            return;
        }

        let Some(channel) = self.le_channels.get(&address).copied() else {
            warn!("SMP PDU from {} without a channel", address);
            return;
        };
        let pdu = match SmpPdu::parse(bytes) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Dropping SMP PDU from {}: {}", address, e);
                return;
            }
        };

        match (channel.role, pdu) {
            (Role::Peripheral, SmpPdu::PairingRequest(request)) => {
                if let Some(pending) = self.pending_le {
                    warn!("Rejecting pairing from {}, busy with {}", address, pending.address);
                    self.smp.send(
                        &address,
                        &SmpPdu::PairingFailed(SmpReason::UnspecifiedReason),
                    );
                    return;
                }
                info!("{} started LE pairing", address);
                self.mark_pairing(&address);
                self.start_le_pairing(address, channel, false, Some(request));
            }
            (Role::Central, SmpPdu::SecurityRequest(auth_req)) => {
                let stored_ltk = self
                    .records
                    .find(&address)
                    .filter(|r| r.bonded)
                    .and_then(|r| r.ltk);
                if let Some(ltk) = stored_ltk {
                    debug!("Re-encrypting bonded {} ({:?})", address, auth_req);
                    self.send_command(HciCommand::LeStartEncryption {
                        handle: channel.handle,
                        rand: ltk.rand,
                        ediv: ltk.ediv,
                        ltk: ltk.key,
                    });
                    return;
                }
                if self.pending_le.is_some() {
                    debug!("Ignoring security request from {} while pairing", address);
                    return;
                }
                self.mark_pairing(&address);
                self.start_le_pairing(address, channel, false, None);
            }
            (_, SmpPdu::PairingFailed(reason)) => {
                debug!("Pairing failed from {} without pairing: {}", address, reason);
            }
            (role, pdu) => warn!("Dropping {:?} from {} as {:?}", pdu, address, role),
        }
    }

    pub fn on_le_long_term_key_request(&mut self, handle: u16, rand: [u8; 8], ediv: u16) {
        if let Some(address) = self.le_handler_for_handle(handle) {
            self.feed(&address, PairingInput::LongTermKeyRequest { rand, ediv });
            return;
        }

        let ltk = self
            .le_channels
            .iter()
            .find(|(_, channel)| channel.handle == handle)
            .and_then(|(address, _)| self.records.find(address))
            .filter(|r| r.bonded)
            .and_then(|r| r.ltk)
            .filter(|ltk| ltk.ediv == ediv && ltk.rand == rand);

        match ltk {
            Some(ltk) => self.send_command(HciCommand::LeLongTermKeyRequestReply {
                handle,
                ltk: ltk.key,
            }),
            None => {
                debug!("No LTK for handle 0x{:04x}", handle);
                self.send_command(HciCommand::LeLongTermKeyRequestNegativeReply { handle });
            }
        }
    }

    pub fn on_confirm_yes_no(&mut self, address: AddressWithType, confirmed: bool) {
        if self
            .with_handler(&address, |handler, ctx| handler.on_confirm_yes_no(ctx, confirmed))
            .is_none()
        {
            warn!("Confirmation for {} without pairing", address);
        }
    }

    pub fn on_passkey_entry(&mut self, address: AddressWithType, passkey: u32) {
        if self
            .with_handler(&address, |handler, ctx| handler.on_passkey_entry(ctx, passkey))
            .is_none()
        {
            warn!("Passkey for {} without pairing", address);
        }
    }

    pub fn on_pin_entry(&mut self, address: AddressWithType, pin: &[u8]) {
        if self
            .with_handler(&address, |handler, ctx| handler.on_pin_entry(ctx, pin))
            .is_none()
        {
            warn!("PIN for {} without pairing", address);
        }
    }

    pub fn on_pairing_prompt_accepted(&mut self, address: AddressWithType) {
        if self
            .with_handler(&address, |handler, ctx| handler.on_pairing_prompt_accepted(ctx))
            .is_none()
        {
            warn!("Prompt accepted for {} without pairing", address);
        }
    }

    /// Calls back synchronously when the record already satisfies `policy`,
    /// otherwise pairs and calls back once pairing finishes. A request made
    /// while pairing is already running waits for that pairing instead of
    /// being dropped.
    pub fn enforce_security_policy(
        &mut self,
        address: AddressWithType,
        policy: SecurityPolicy,
        callback: PolicyCallback,
    ) {
        let address = address.to_classic();
        if self.records.find(&address).is_some_and(|r| r.satisfies(policy)) {
            callback(true);
            return;
        }

        self.policy_callbacks.push((address, policy, callback));
        if !self.handlers.contains_key(&address) {
            self.dispatch_classic(
                address,
                true,
                policy.authentication_requirements(),
                RemoteClassicOob::default(),
            );
        }
    }

    pub fn enforce_le_security_policy(
        &mut self,
        address: AddressWithType,
        policy: SecurityPolicy,
        callback: PolicyCallback,
    ) {
        match self.records.find(&address) {
            Some(record) if record.satisfies(policy) => {
                callback(true);
                return;
            }
            Some(record) if record.bonded => {
                info!("Bond with {} does not meet {:?}", address, policy);
                callback(false);
                return;
            }
            _ => {}
        }

        if self.has_pending_pairing(&address) {
            self.policy_callbacks.push((address, policy, callback));
            return;
        }
        self.policy_callbacks.push((address, policy, callback));
        if let Err(e) = self.create_bond_le(address) {
            warn!("Cannot enforce {:?} on {}: {}", policy, address, e);
            if let Some((_, _, callback)) = self.policy_callbacks.pop() {
                callback(false);
            }
        }
    }

    pub fn set_out_of_band_data(&mut self, address: AddressWithType, data: LeOobData) {
        self.remote_le_oob.insert(address, data);
    }

    /// Fresh local OOB values; the matching key pair is used for the next
    /// handshake whose peer presents them
    pub fn get_out_of_band_data(&mut self) -> LeOobData {
        let keys = LocalOobKeys::generate(&*self.crypto);
        self.local_le_oob = Some(keys);
        keys.data
    }

    pub fn process_timeouts(&mut self, now: Instant) {
        for (token, address) in self.smp_alarms.poll_expired(now) {
            let current = self
                .handlers
                .get(&address)
                .and_then(|h| h.as_le())
                .and_then(|h| h.timer_token());
            if current != Some(token) {
                debug!("Dropping stale SMP timer for {}", address);
                continue;
            }
            warn!("SMP timeout with {}", address);
            self.with_handler_at(&address, now, |handler, ctx| {
                handler.on_input(ctx, PairingInput::Timeout)
            });
        }
    }
}

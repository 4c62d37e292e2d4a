//! The host context
//!
//! [`Host`] owns every stateful subsystem and is the only place HCI events,
//! API calls and timer ticks enter them. Nothing inside is shared across
//! threads: the embedding reads events from its transport, hands them to
//! [`Host::handle_event`] and calls [`Host::process_timeouts`] whenever
//! [`Host::next_deadline`] passes.

use crate::config::{DiscoveryConfig, StackConfig};
use crate::connection::{ConnectionManager, DirectConnectTimeout, HciAcceptList};
use crate::error::Result;
use crate::gap::BdAddr;
use crate::hci::constants::*;
use crate::hci::{CommandSender, EventPacket, EventRouter, HciEvent};
use crate::neighbor::{InquiryEvent, InquiryModule, PageModule};
use crate::security::smp::SmpCrypto;
use crate::security::{SecurityManager, SmpChannel};
use crate::storage::Storage;
use log::{debug, info, warn};
use std::rc::Rc;
use std::sync::mpsc::Sender;
use std::time::Instant;

/// Event owners in the host's routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Security,
    LowEnergy,
    Inquiry,
}

const SECURITY_EVENTS: [u8; 15] = [
    EVT_CONN_COMPLETE,
    EVT_DISCONN_COMPLETE,
    EVT_AUTHENTICATION_COMPLETE,
    EVT_ENCRYPTION_CHANGE,
    EVT_PIN_CODE_REQUEST,
    EVT_LINK_KEY_REQUEST,
    EVT_LINK_KEY_NOTIFICATION,
    EVT_IO_CAPABILITY_REQUEST,
    EVT_IO_CAPABILITY_RESPONSE,
    EVT_USER_CONFIRMATION_REQUEST,
    EVT_USER_PASSKEY_REQUEST,
    EVT_REMOTE_OOB_DATA_REQUEST,
    EVT_SIMPLE_PAIRING_COMPLETE,
    EVT_USER_PASSKEY_NOTIFICATION,
    EVT_KEYPRESS_NOTIFICATION,
];

pub type HostConnectionManager = ConnectionManager<HciAcceptList<Rc<dyn CommandSender>>>;

pub struct Host {
    router: EventRouter<Subsystem>,
    security: SecurityManager,
    connections: HostConnectionManager,
    inquiry: InquiryModule,
    page: PageModule,
    discovery: DiscoveryConfig,
}

impl Host {
    pub fn new(
        config: StackConfig,
        hci: Rc<dyn CommandSender>,
        smp: Rc<dyn SmpChannel>,
        crypto: Box<dyn SmpCrypto>,
        storage: Box<dyn Storage>,
    ) -> Self {
        let mut router = EventRouter::new();
        for event_code in SECURITY_EVENTS {
            router.register(event_code, Subsystem::Security);
        }
        router.register(EVT_LE_META_EVENT, Subsystem::LowEnergy);

        let accept_list = HciAcceptList::new(hci.clone(), config.connection.accept_list_size);
        Self {
            router,
            security: SecurityManager::new(config.security, hci.clone(), smp, crypto, storage),
            connections: ConnectionManager::new(config.connection, accept_list),
            inquiry: InquiryModule::new(hci.clone()),
            page: PageModule::new(hci),
            discovery: config.discovery,
        }
    }

    /// Initialise security and read back the controller's discovery settings
    pub fn start(&mut self, local_address: BdAddr) -> Result<()> {
        self.security.init(local_address)?;
        self.inquiry.start()?;
        self.page.start()?;
        info!("Host started as {}", local_address);
        Ok(())
    }

    pub fn stop(&self) {
        self.inquiry.stop();
        self.page.stop();
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn security_mut(&mut self) -> &mut SecurityManager {
        &mut self.security
    }

    pub fn connections(&self) -> &HostConnectionManager {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut HostConnectionManager {
        &mut self.connections
    }

    pub fn inquiry_mut(&mut self) -> &mut InquiryModule {
        &mut self.inquiry
    }

    pub fn page(&self) -> &PageModule {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut PageModule {
        &mut self.page
    }

    pub fn register_inquiry_callbacks(&mut self, events: Sender<InquiryEvent>) {
        self.inquiry
            .register_callbacks(&mut self.router, Subsystem::Inquiry, events);
    }

    pub fn unregister_inquiry_callbacks(&mut self) {
        self.inquiry.unregister_callbacks(&mut self.router);
    }

    /// General inquiry with the configured length and response limit
    pub fn start_discovery(&mut self) -> Result<()> {
        self.inquiry
            .start_general_inquiry(self.discovery.inquiry_length, self.discovery.num_responses)?;
        Ok(())
    }

    /// The controller was reset and has forgotten its accept list
    pub fn on_controller_reset(&mut self) {
        self.connections.reset(true);
    }

    /// Route one event from the controller. Malformed or unowned events are
    /// logged and dropped.
    pub fn handle_event(&mut self, event: &HciEvent) {
        let packet = match EventPacket::parse(event) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping event 0x{:02x}: {}", event.event_code, e);
                return;
            }
        };

        match packet {
            EventPacket::CommandComplete {
                opcode,
                return_parameters,
                ..
            } => {
                if !self.inquiry.on_command_complete(opcode, &return_parameters)
                    && !self.page.on_command_complete(opcode, &return_parameters)
                {
                    debug!("Unhandled command complete for 0x{:04x}", opcode);
                }
                return;
            }
            EventPacket::CommandStatus { status, opcode, .. } => {
                if !self.inquiry.on_command_status(status, opcode) && status != HCI_SUCCESS {
                    warn!("Command 0x{:04x} failed with status 0x{:02x}", opcode, status);
                }
                return;
            }
            _ => {}
        }

        match self.router.route(event.event_code) {
            Some(Subsystem::Security) => self.on_security_event(packet),
            Some(Subsystem::LowEnergy) => self.on_le_event(packet),
            Some(Subsystem::Inquiry) => {
                self.inquiry.on_event(&packet);
            }
            None => warn!("No owner for event 0x{:02x}", event.event_code),
        }
    }

    fn on_security_event(&mut self, packet: EventPacket) {
        match packet {
            EventPacket::Security(event) => self.security.on_hci_security_event(event),
            EventPacket::ConnectionComplete {
                status,
                handle,
                bd_addr,
                ..
            } => self.security.on_connection_complete(status, handle, bd_addr),
            EventPacket::DisconnectionComplete { handle, reason, .. } => {
                debug!("Disconnection of 0x{:04x}, reason 0x{:02x}", handle, reason);
                match self.connections.accept_list_mut().on_disconnection(handle) {
                    Some(peer) => self.security.on_le_channel_closed(peer),
                    None => self.security.on_disconnection(handle),
                }
            }
            EventPacket::AuthenticationComplete { status, handle } => {
                self.security.on_authentication_complete(handle, status)
            }
            EventPacket::EncryptionChange {
                status,
                handle,
                enabled,
            } => self.security.on_encryption_change(handle, status, enabled),
            other => debug!("Ignoring {:?}", other),
        }
    }

    fn on_le_event(&mut self, packet: EventPacket) {
        match packet {
            EventPacket::LeConnectionComplete {
                status,
                handle,
                role,
                peer,
            } => {
                self.connections
                    .accept_list_mut()
                    .on_le_connection_complete(status, handle, peer);
                if status == HCI_SUCCESS {
                    self.connections.on_connection_complete(&peer);
                    self.security.on_le_channel_open(peer, handle, role);
                } else {
                    self.security.on_le_channel_failed(peer);
                }
            }
            EventPacket::LeAdvertisingReport(reports) => {
                for report in &reports {
                    self.connections.on_advertising_report(report);
                }
            }
            EventPacket::LeLongTermKeyRequest { handle, rand, ediv } => {
                self.security.on_le_long_term_key_request(handle, rand, ediv)
            }
            other => debug!("Ignoring LE event {:?}", other),
        }
    }

    /// Earliest pending deadline across all subsystems
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.security.next_deadline(), self.connections.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every alarm due at `now`. Direct connection timeouts are returned
    /// to the caller; pairing timeouts are reported to security listeners.
    pub fn process_timeouts(&mut self, now: Instant) -> Vec<DirectConnectTimeout> {
        self.security.process_timeouts(now);
        self.connections.process_timeouts(now)
    }
}

//! Common shape of the per-device pairing state machines
//!
//! A handler never removes itself. When it finishes it sends exactly one
//! [`PairingCompletion`] on its channel; the security manager drains that
//! channel after every call into a handler and drops the handler from its map.

use super::channel::SmpChannel;
use super::classic::ClassicPairingHandler;
use super::smp::{LePairingHandler, SmpCrypto};
use super::types::PairingResult;
use super::ui::PairingUi;
use crate::alarm::AlarmQueue;
use crate::config::SecurityConfig;
use crate::gap::AddressWithType;
use crate::hci::{CommandSender, HciCommand, SecurityEventPacket};
use log::{error, warn};
use std::sync::mpsc::Sender;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    Initiated,
    WaitingRemoteResponse,
    WaitingUserConfirmation,
    WaitingOob,
    KeyExchange,
    Complete(CompletionStatus),
}

impl PairingState {
    pub fn is_complete(&self) -> bool {
        matches!(self, PairingState::Complete(_))
    }
}

/// Events fed to a handler by the security manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingInput {
    Hci(SecurityEventPacket),
    ConnectionComplete { status: u8, handle: u16 },
    AuthenticationComplete { status: u8 },
    SmpPdu(Vec<u8>),
    EncryptionChange { status: u8, enabled: bool },
    LongTermKeyRequest { rand: [u8; 8], ediv: u16 },
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCompletion {
    pub address: AddressWithType,
    pub result: PairingResult,
}

/// One-shot completion slot
#[derive(Debug)]
pub struct Completer {
    address: AddressWithType,
    sender: Option<Sender<PairingCompletion>>,
}

impl Completer {
    pub fn new(address: AddressWithType, sender: Sender<PairingCompletion>) -> Self {
        Self {
            address,
            sender: Some(sender),
        }
    }

    pub fn is_done(&self) -> bool {
        self.sender.is_none()
    }

    /// Returns false if a result was already delivered
    pub fn complete(&mut self, result: PairingResult) -> bool {
        let Some(sender) = self.sender.take() else {
            return false;
        };
        if sender
            .send(PairingCompletion {
                address: self.address,
                result,
            })
            .is_err()
        {
            warn!("Completion for {} has no receiver", self.address);
        }
        true
    }
}

/// Collaborators lent to a handler for the duration of one call
pub struct HandlerContext<'a> {
    pub hci: &'a dyn CommandSender,
    pub smp: &'a dyn SmpChannel,
    pub crypto: &'a dyn SmpCrypto,
    pub ui: &'a dyn PairingUi,
    pub config: &'a SecurityConfig,
    pub local_address: AddressWithType,
    pub local_irk: [u8; 16],
    /// SMP timers, keyed by remote address
    pub alarms: &'a mut AlarmQueue<AddressWithType>,
    pub now: Instant,
}

impl HandlerContext<'_> {
    pub fn send_command(&self, command: HciCommand) {
        if let Err(e) = self.hci.send_command(command) {
            error!("Failed to send HCI command: {}", e);
        }
    }
}

pub trait PairingStateMachine {
    fn address(&self) -> AddressWithType;

    fn state(&self) -> PairingState;

    fn is_locally_initiated(&self) -> bool;

    fn initiate(&mut self, ctx: &mut HandlerContext<'_>);

    fn on_input(&mut self, ctx: &mut HandlerContext<'_>, input: PairingInput);

    fn on_confirm_yes_no(&mut self, ctx: &mut HandlerContext<'_>, confirmed: bool);

    fn on_passkey_entry(&mut self, ctx: &mut HandlerContext<'_>, passkey: u32);

    fn on_pin_entry(&mut self, ctx: &mut HandlerContext<'_>, pin: &[u8]);

    fn on_pairing_prompt_accepted(&mut self, ctx: &mut HandlerContext<'_>);

    /// Force a failure. Safe from any state; a no-op once complete.
    fn cancel(&mut self, ctx: &mut HandlerContext<'_>, reason: &str);

    /// The link to the peer is already gone, so nothing may be sent on it
    fn on_link_lost(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        self.cancel(ctx, reason)
    }
}

#[derive(Debug)]
pub enum PairingHandler {
    Classic(ClassicPairingHandler),
    Le(LePairingHandler),
}

impl PairingHandler {
    pub fn is_le(&self) -> bool {
        matches!(self, PairingHandler::Le(_))
    }

    pub fn as_le(&self) -> Option<&LePairingHandler> {
        match self {
            PairingHandler::Le(handler) => Some(handler),
            PairingHandler::Classic(_) => None,
        }
    }

    fn inner(&self) -> &dyn PairingStateMachine {
        match self {
            PairingHandler::Classic(handler) => handler,
            PairingHandler::Le(handler) => handler,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PairingStateMachine {
        match self {
            PairingHandler::Classic(handler) => handler,
            PairingHandler::Le(handler) => handler,
        }
    }
}

impl PairingStateMachine for PairingHandler {
    fn address(&self) -> AddressWithType {
        self.inner().address()
    }

    fn state(&self) -> PairingState {
        self.inner().state()
    }

    fn is_locally_initiated(&self) -> bool {
        self.inner().is_locally_initiated()
    }

    fn initiate(&mut self, ctx: &mut HandlerContext<'_>) {
        self.inner_mut().initiate(ctx)
    }

    fn on_input(&mut self, ctx: &mut HandlerContext<'_>, input: PairingInput) {
        self.inner_mut().on_input(ctx, input)
    }

    fn on_confirm_yes_no(&mut self, ctx: &mut HandlerContext<'_>, confirmed: bool) {
        self.inner_mut().on_confirm_yes_no(ctx, confirmed)
    }

    fn on_passkey_entry(&mut self, ctx: &mut HandlerContext<'_>, passkey: u32) {
        self.inner_mut().on_passkey_entry(ctx, passkey)
    }

    fn on_pin_entry(&mut self, ctx: &mut HandlerContext<'_>, pin: &[u8]) {
        self.inner_mut().on_pin_entry(ctx, pin)
    }

    fn on_pairing_prompt_accepted(&mut self, ctx: &mut HandlerContext<'_>) {
        self.inner_mut().on_pairing_prompt_accepted(ctx)
    }

    fn cancel(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        self.inner_mut().cancel(ctx, reason)
    }

    fn on_link_lost(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        self.inner_mut().on_link_lost(ctx, reason)
    }
}

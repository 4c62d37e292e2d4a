//! BR/EDR pairing driven by the controller's pairing event sequence

use super::handler::*;
use super::types::*;
use crate::gap::AddressWithType;
use crate::hci::constants::{HCI_AUTHENTICATION_FAILURE, HCI_SUCCESS};
use crate::hci::{HciCommand, SecurityEventPacket};
use crate::security::smp::constants::SMP_PASSKEY_MAX;
use log::{debug, info, warn};

/// Packet types DM1/DH1/DM3/DH3/DM5/DH5
const ACL_PACKET_TYPES: u16 = 0xCC18;

/// The UI answer the handler is blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserRequest {
    Confirmation,
    Consent,
    Passkey,
    Pin,
}

/// Remote OOB values, P-192 and P-256
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteClassicOob {
    pub p192: Option<ClassicOobData>,
    pub p256: Option<ClassicOobData>,
}

impl RemoteClassicOob {
    pub fn is_present(&self) -> bool {
        self.p192.is_some() || self.p256.is_some()
    }
}

#[derive(Debug)]
pub struct ClassicPairingHandler {
    address: AddressWithType,
    locally_initiated: bool,
    state: PairingState,
    io_capability: IoCapability,
    authentication_requirements: AuthenticationRequirements,
    remote_oob: RemoteClassicOob,
    remote_io_capability: Option<IoCapability>,
    remote_authentication_requirements: Option<AuthenticationRequirements>,
    handle: Option<u16>,
    authentication_requested: bool,
    stored_link_key: Option<LinkKey>,
    link_key: Option<LinkKey>,
    awaiting: Option<UserRequest>,
    completer: Completer,
}

impl ClassicPairingHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: AddressWithType,
        locally_initiated: bool,
        io_capability: IoCapability,
        authentication_requirements: AuthenticationRequirements,
        remote_oob: RemoteClassicOob,
        handle: Option<u16>,
        stored_link_key: Option<LinkKey>,
        completer: Completer,
    ) -> Self {
        Self {
            address,
            locally_initiated,
            state: PairingState::Idle,
            io_capability: io_capability.to_classic(),
            authentication_requirements,
            remote_oob,
            remote_io_capability: None,
            remote_authentication_requirements: None,
            handle,
            authentication_requested: false,
            stored_link_key,
            link_key: None,
            awaiting: None,
            completer,
        }
    }

    pub fn handle(&self) -> Option<u16> {
        self.handle
    }

    fn finish(&mut self, result: PairingResult) {
        self.awaiting = None;
        self.state = PairingState::Complete(if result.is_ok() {
            CompletionStatus::Success
        } else {
            CompletionStatus::Failure
        });
        self.completer.complete(result);
    }

    fn fail(&mut self, failure: PairingFailure) {
        info!("Classic pairing with {} failed: {}", self.address, failure);
        self.finish(Err(failure));
    }

    fn succeed(&mut self) {
        let link_key = self.link_key.or(self.stored_link_key);
        let level = link_key
            .map(|k| k.key_type.security_level())
            .unwrap_or(SecurityLevel::EncryptionOnly);
        info!("Classic pairing with {} complete at {:?}", self.address, level);
        self.finish(Ok(PairingOutcome {
            keys: BondKeys {
                link_key,
                key_size: 16,
                ..Default::default()
            },
            level,
        }));
    }

    fn request_authentication(&mut self, ctx: &mut HandlerContext<'_>) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.authentication_requested {
            return;
        }
        self.authentication_requested = true;
        self.state = PairingState::WaitingRemoteResponse;
        ctx.send_command(HciCommand::AuthenticationRequested { handle });
    }

    fn on_security_event(&mut self, ctx: &mut HandlerContext<'_>, event: SecurityEventPacket) {
        let bd_addr = self.address.address;
        match event {
            SecurityEventPacket::LinkKeyRequest { .. } => match self.stored_link_key {
                Some(link_key) => ctx.send_command(HciCommand::LinkKeyRequestReply {
                    bd_addr,
                    link_key: link_key.key,
                }),
                None => ctx.send_command(HciCommand::LinkKeyRequestNegativeReply { bd_addr }),
            },
            SecurityEventPacket::PinCodeRequest { .. } => {
                self.state = PairingState::WaitingUserConfirmation;
                self.awaiting = Some(UserRequest::Pin);
                ctx.ui.display_enter_pin_dialog(&self.address);
            }
            SecurityEventPacket::IoCapabilityRequest { .. } => {
                ctx.send_command(HciCommand::IoCapabilityRequestReply {
                    bd_addr,
                    io_capability: self.io_capability.to_u8(),
                    oob_data_present: self.remote_oob.is_present() as u8,
                    authentication_requirements: self.authentication_requirements.to_u8(),
                });
                self.state = PairingState::WaitingRemoteResponse;
            }
            SecurityEventPacket::IoCapabilityResponse {
                io_capability,
                authentication_requirements,
                ..
            } => {
                self.remote_io_capability = IoCapability::from_u8(io_capability);
                self.remote_authentication_requirements =
                    AuthenticationRequirements::from_u8(authentication_requirements);
                debug!(
                    "{} reports {:?} / {:?}",
                    self.address, self.remote_io_capability, self.remote_authentication_requirements
                );
            }
            SecurityEventPacket::UserConfirmationRequest { numeric_value, .. } => {
                self.state = PairingState::WaitingUserConfirmation;
                let remote_can_confirm = self
                    .remote_io_capability
                    .is_some_and(|io| io.can_confirm());
                if self.io_capability.can_confirm() && remote_can_confirm {
                    self.awaiting = Some(UserRequest::Confirmation);
                    ctx.ui.display_confirm_value(&self.address, numeric_value);
                } else if !self.locally_initiated {
                    // Just Works started by the peer needs the user's consent
                    self.awaiting = Some(UserRequest::Consent);
                    ctx.ui.display_pairing_prompt(&self.address);
                } else {
                    ctx.send_command(HciCommand::UserConfirmationRequestReply { bd_addr });
                    self.state = PairingState::KeyExchange;
                }
            }
            SecurityEventPacket::UserPasskeyRequest { .. } => {
                self.state = PairingState::WaitingUserConfirmation;
                self.awaiting = Some(UserRequest::Passkey);
                ctx.ui.display_enter_passkey_dialog(&self.address);
            }
            SecurityEventPacket::UserPasskeyNotification { passkey, .. } => {
                ctx.ui.display_passkey(&self.address, passkey);
            }
            SecurityEventPacket::KeypressNotification {
                notification_type, ..
            } => {
                debug!("Keypress {} from {}", notification_type, self.address);
            }
            SecurityEventPacket::RemoteOobDataRequest { .. } => {
                let RemoteClassicOob { p192, p256 } = self.remote_oob;
                if !self.remote_oob.is_present() {
                    ctx.send_command(HciCommand::RemoteOobDataRequestNegativeReply { bd_addr });
                    return;
                }
                self.state = PairingState::WaitingOob;
                let p192 = p192.unwrap_or_default();
                let p256 = p256.unwrap_or_default();
                ctx.send_command(HciCommand::RemoteOobExtendedDataRequestReply {
                    bd_addr,
                    c_192: p192.c,
                    r_192: p192.r,
                    c_256: p256.c,
                    r_256: p256.r,
                });
            }
            SecurityEventPacket::SimplePairingComplete { status, .. } => {
                if status != HCI_SUCCESS {
                    self.fail(PairingFailure::hci("Simple pairing failed", status));
                } else {
                    self.state = PairingState::KeyExchange;
                }
            }
            SecurityEventPacket::LinkKeyNotification {
                link_key, key_type, ..
            } => {
                self.link_key = Some(LinkKey {
                    key: link_key,
                    key_type: LinkKeyType::from_u8(key_type),
                });
                self.state = PairingState::KeyExchange;
                if !self.locally_initiated {
                    self.succeed();
                }
            }
        }
    }

    fn take_awaiting(&mut self, expected: &[UserRequest]) -> Option<UserRequest> {
        match self.awaiting {
            Some(request) if expected.contains(&request) => self.awaiting.take(),
            other => {
                warn!(
                    "Unexpected UI response for {} while waiting for {:?}",
                    self.address, other
                );
                None
            }
        }
    }
}

impl PairingStateMachine for ClassicPairingHandler {
    fn address(&self) -> AddressWithType {
        self.address
    }

    fn state(&self) -> PairingState {
        self.state
    }

    fn is_locally_initiated(&self) -> bool {
        self.locally_initiated
    }

    fn initiate(&mut self, ctx: &mut HandlerContext<'_>) {
        if !self.locally_initiated {
            self.state = PairingState::WaitingRemoteResponse;
            return;
        }

        self.state = PairingState::Initiated;
        if self.handle.is_some() {
            self.request_authentication(ctx);
        } else {
            debug!("Connecting to {} before authentication", self.address);
            ctx.send_command(HciCommand::CreateConnection {
                bd_addr: self.address.address,
                packet_type: ACL_PACKET_TYPES,
            });
        }
    }

    fn on_input(&mut self, ctx: &mut HandlerContext<'_>, input: PairingInput) {
        if self.state.is_complete() {
            debug!("Ignoring {:?} for finished pairing with {}", input, self.address);
            return;
        }

        match input {
            PairingInput::Hci(event) => self.on_security_event(ctx, event),
            PairingInput::ConnectionComplete { status, handle } => {
                if status != HCI_SUCCESS {
                    self.fail(PairingFailure::hci("Connection establishment failed", status));
                    return;
                }
                self.handle = Some(handle);
                if self.locally_initiated {
                    self.request_authentication(ctx);
                }
            }
            PairingInput::AuthenticationComplete { status } => {
                if status != HCI_SUCCESS {
                    self.fail(PairingFailure::hci("Authentication failed", status));
                    return;
                }
                if let Some(handle) = self.handle {
                    ctx.send_command(HciCommand::SetConnectionEncryption {
                        handle,
                        enable: true,
                    });
                }
                self.succeed();
            }
            PairingInput::Timeout => {
                self.fail(PairingFailure::hci("Pairing timed out", HCI_AUTHENTICATION_FAILURE));
            }
            other => warn!("Classic pairing with {} ignores {:?}", self.address, other),
        }
    }

    fn on_confirm_yes_no(&mut self, ctx: &mut HandlerContext<'_>, confirmed: bool) {
        if self
            .take_awaiting(&[UserRequest::Confirmation, UserRequest::Consent])
            .is_none()
        {
            return;
        }

        let bd_addr = self.address.address;
        if confirmed {
            ctx.send_command(HciCommand::UserConfirmationRequestReply { bd_addr });
            self.state = PairingState::KeyExchange;
        } else {
            ctx.send_command(HciCommand::UserConfirmationRequestNegativeReply { bd_addr });
            self.fail(PairingFailure::new("User rejected the confirmation"));
        }
    }

    fn on_passkey_entry(&mut self, ctx: &mut HandlerContext<'_>, passkey: u32) {
        if self.take_awaiting(&[UserRequest::Passkey]).is_none() {
            return;
        }

        let bd_addr = self.address.address;
        if passkey > SMP_PASSKEY_MAX {
            ctx.send_command(HciCommand::UserPasskeyRequestNegativeReply { bd_addr });
            self.fail(PairingFailure::new("Passkey out of range"));
            return;
        }
        ctx.send_command(HciCommand::UserPasskeyRequestReply { bd_addr, passkey });
        self.state = PairingState::KeyExchange;
    }

    fn on_pin_entry(&mut self, ctx: &mut HandlerContext<'_>, pin: &[u8]) {
        if self.take_awaiting(&[UserRequest::Pin]).is_none() {
            return;
        }

        let bd_addr = self.address.address;
        if pin.is_empty() || pin.len() > 16 {
            ctx.send_command(HciCommand::PinCodeRequestNegativeReply { bd_addr });
            self.fail(PairingFailure::new("Invalid PIN"));
            return;
        }
        ctx.send_command(HciCommand::PinCodeRequestReply {
            bd_addr,
            pin: pin.to_vec(),
        });
        self.state = PairingState::KeyExchange;
    }

    fn on_pairing_prompt_accepted(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.take_awaiting(&[UserRequest::Consent]).is_none() {
            return;
        }
        ctx.send_command(HciCommand::UserConfirmationRequestReply {
            bd_addr: self.address.address,
        });
        self.state = PairingState::KeyExchange;
    }

    fn cancel(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        if self.state.is_complete() {
            return;
        }

        let bd_addr = self.address.address;
        if let Some(request) = self.awaiting.take() {
            ctx.ui.cancel(&self.address);
            match request {
                UserRequest::Confirmation | UserRequest::Consent => {
                    ctx.send_command(HciCommand::UserConfirmationRequestNegativeReply { bd_addr })
                }
                UserRequest::Passkey => {
                    ctx.send_command(HciCommand::UserPasskeyRequestNegativeReply { bd_addr })
                }
                UserRequest::Pin => {
                    ctx.send_command(HciCommand::PinCodeRequestNegativeReply { bd_addr })
                }
            }
        }
        self.fail(PairingFailure::new(reason));
    }
}

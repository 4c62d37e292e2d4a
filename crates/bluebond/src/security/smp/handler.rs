//! LE Secure Connections pairing over the SMP fixed channel
//!
//! One handler drives one handshake with one peer, in either link role:
//! feature exchange, public key exchange, authentication stage 1 (Just Works,
//! Numeric Comparison, Passkey Entry or OOB), the DHKey check, link encryption
//! and finally the transport specific key distribution. Legacy pairing is
//! refused.

use super::constants::*;
use super::crypto::*;
use super::pdu::SmpPdu;
use super::types::*;
use crate::alarm::AlarmToken;
use crate::gap::AddressWithType;
use crate::hci::constants::HCI_SUCCESS;
use crate::hci::HciCommand;
use crate::security::handler::*;
use crate::security::types::*;
use crate::security::IoCapability;
use log::{debug, info, trace, warn};

/// Local OOB material handed out by `get_out_of_band_data`. The key pair is
/// reused for the next handshake whose peer claims to hold our OOB data.
#[derive(Debug, Clone, Copy)]
pub struct LocalOobKeys {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub data: LeOobData,
}

impl LocalOobKeys {
    pub fn generate(crypto: &dyn SmpCrypto) -> Self {
        let (private_key, public_key) = crypto.generate_key_pair();
        let r = generate_random_128();
        let c = crypto.f4(&public_key.x, &public_key.x, &r, 0);
        Self {
            private_key,
            public_key,
            data: LeOobData { r, c },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitPairingResponse,
    AwaitPairingRequest,
    AwaitPublicKey,
    AwaitConfirm,
    AwaitRandom,
    AwaitUserConfirmation,
    AwaitPasskey,
    AwaitDhKeyCheck,
    AwaitEncryption,
    AwaitKeys,
    Done,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitPairingResponse => "waiting for pairing response",
            Phase::AwaitPairingRequest => "waiting for pairing request",
            Phase::AwaitPublicKey => "waiting for public key",
            Phase::AwaitConfirm => "waiting for confirm",
            Phase::AwaitRandom => "waiting for random",
            Phase::AwaitUserConfirmation => "waiting for user confirmation",
            Phase::AwaitPasskey => "waiting for passkey",
            Phase::AwaitDhKeyCheck => "waiting for DHKey check",
            Phase::AwaitEncryption => "waiting for encryption",
            Phase::AwaitKeys => "waiting for keys",
            Phase::Done => "done",
        }
    }
}

/// Outcome of the feature exchange, in initiator/responder order
#[derive(Debug, Clone, Copy)]
struct Negotiated {
    request: PairingFeatures,
    response: PairingFeatures,
    method: PairingMethod,
    key_size: u8,
}

/// Public key material once both keys are known. `pka`/`pkb` are the
/// central's and the peripheral's X coordinates.
#[derive(Debug, Clone, Copy)]
struct Exchanged {
    pka: [u8; 32],
    pkb: [u8; 32],
    dh_key: [u8; 32],
}

type Step = Result<(), PairingFailure>;

fn fail_with(reason: SmpReason, message: &str) -> PairingFailure {
    PairingFailure::smp(message, reason)
}

/// Stage 1 method from the initiator's request and the responder's response
pub fn select_method(request: &PairingFeatures, response: &PairingFeatures) -> PairingMethod {
    use IoCapability::*;

    if !request.auth_req.contains(AuthReq::MITM) && !response.auth_req.contains(AuthReq::MITM) {
        return PairingMethod::JustWorks;
    }
    if request.oob_data_present || response.oob_data_present {
        return PairingMethod::OutOfBand;
    }

    let (initiator, responder) = (request.io_capability, response.io_capability);
    let confirms = |io: IoCapability| matches!(io, KeyboardDisplay | DisplayYesNo);
    let display_only = |io: IoCapability| matches!(io, DisplayOnly | DisplayYesNo);

    if confirms(initiator) && confirms(responder) {
        PairingMethod::NumericComparison
    } else if initiator == NoInputNoOutput || responder == NoInputNoOutput {
        PairingMethod::JustWorks
    } else if display_only(initiator) && display_only(responder) {
        PairingMethod::JustWorks
    } else {
        PairingMethod::PasskeyEntry
    }
}

/// Whether the local side shows the passkey (and the peer types it in)
pub fn displays_passkey(local: IoCapability, remote: IoCapability) -> bool {
    match local {
        IoCapability::DisplayOnly | IoCapability::DisplayYesNo => true,
        IoCapability::KeyboardDisplay => remote == IoCapability::KeyboardOnly,
        IoCapability::KeyboardOnly | IoCapability::NoInputNoOutput => false,
    }
}

#[derive(Debug)]
pub struct LePairingHandler {
    address: AddressWithType,
    role: Role,
    handle: u16,
    locally_initiated: bool,
    phase: Phase,
    state: PairingState,
    completer: Completer,
    timer: Option<AlarmToken>,

    /// Pairing request that created a remotely initiated handler
    remote_request: Option<PairingFeatures>,
    remote_oob: Option<LeOobData>,
    local_oob: Option<LocalOobKeys>,

    negotiated: Option<Negotiated>,
    key_pair: Option<(PrivateKey, PublicKey)>,
    exchanged: Option<Exchanged>,

    local_nonce: [u8; 16],
    remote_nonce: [u8; 16],
    remote_confirm: Option<[u8; 16]>,
    passkey: Option<u32>,
    passkey_round: u8,
    ra: [u8; 16],
    rb: [u8; 16],
    mac_key: [u8; 16],
    ltk: Option<[u8; 16]>,
    /// Initiator DHKey check that arrived before we were ready for it
    early_dhkey_check: Option<[u8; 16]>,

    expected_keys: KeyDistribution,
    received_keys: KeyDistribution,
    remote_irk: Option<[u8; 16]>,
    remote_identity: Option<AddressWithType>,
    remote_csrk: Option<[u8; 16]>,
}

impl LePairingHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: AddressWithType,
        role: Role,
        handle: u16,
        locally_initiated: bool,
        remote_request: Option<PairingFeatures>,
        remote_oob: Option<LeOobData>,
        local_oob: Option<LocalOobKeys>,
        completer: Completer,
    ) -> Self {
        Self {
            address,
            role,
            handle,
            locally_initiated,
            phase: Phase::Idle,
            state: PairingState::Idle,
            completer,
            timer: None,
            remote_request,
            remote_oob,
            local_oob,
            negotiated: None,
            key_pair: None,
            exchanged: None,
            local_nonce: [0; 16],
            remote_nonce: [0; 16],
            remote_confirm: None,
            passkey: None,
            passkey_round: 0,
            ra: [0; 16],
            rb: [0; 16],
            mac_key: [0; 16],
            ltk: None,
            early_dhkey_check: None,
            expected_keys: KeyDistribution::empty(),
            received_keys: KeyDistribution::empty(),
            remote_irk: None,
            remote_identity: None,
            remote_csrk: None,
        }
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Token of the currently armed SMP timer
    pub fn timer_token(&self) -> Option<AlarmToken> {
        self.timer
    }

    pub fn method(&self) -> Option<PairingMethod> {
        self.negotiated.map(|n| n.method)
    }

    fn is_central(&self) -> bool {
        self.role == Role::Central
    }

    fn enter(&mut self, phase: Phase) {
        trace!("SMP {} -> {}", self.address, phase.name());
        self.phase = phase;
        self.state = match phase {
            Phase::Idle => PairingState::Idle,
            Phase::AwaitPairingResponse | Phase::AwaitPairingRequest => PairingState::Initiated,
            Phase::AwaitRandom if self.method() == Some(PairingMethod::OutOfBand) => {
                PairingState::WaitingOob
            }
            Phase::AwaitPublicKey
            | Phase::AwaitConfirm
            | Phase::AwaitRandom
            | Phase::AwaitDhKeyCheck => PairingState::WaitingRemoteResponse,
            Phase::AwaitUserConfirmation | Phase::AwaitPasskey => {
                PairingState::WaitingUserConfirmation
            }
            Phase::AwaitEncryption | Phase::AwaitKeys => PairingState::KeyExchange,
            Phase::Done => self.state,
        };
    }

    fn rearm_timer(&mut self, ctx: &mut HandlerContext<'_>) {
        if let Some(token) = self.timer.take() {
            ctx.alarms.cancel(token);
        }
        self.timer = Some(ctx.alarms.schedule(ctx.now + ctx.config.smp_timeout, self.address));
    }

    fn send(&self, ctx: &HandlerContext<'_>, pdu: SmpPdu) {
        debug!("SMP -> {}: {:?}", self.address, pdu);
        ctx.smp.send(&self.address, &pdu);
    }

    fn finish(&mut self, ctx: &mut HandlerContext<'_>, result: PairingResult) {
        if let Some(token) = self.timer.take() {
            ctx.alarms.cancel(token);
        }
        self.state = PairingState::Complete(if result.is_ok() {
            CompletionStatus::Success
        } else {
            CompletionStatus::Failure
        });
        self.phase = Phase::Done;
        self.completer.complete(result);
    }

    fn withdraw_prompt(&self, ctx: &mut HandlerContext<'_>) {
        if matches!(self.phase, Phase::AwaitUserConfirmation | Phase::AwaitPasskey) {
            ctx.ui.cancel(&self.address);
        }
    }

    /// Fail locally and tell the peer why
    fn abort(&mut self, ctx: &mut HandlerContext<'_>, failure: PairingFailure) {
        let reason = failure.smp_reason.unwrap_or(SmpReason::UnspecifiedReason);
        info!("LE pairing with {} failed: {}", self.address, failure);
        self.send(ctx, SmpPdu::PairingFailed(reason));
        self.finish(ctx, Err(failure));
    }

    fn local_features(&self, ctx: &HandlerContext<'_>) -> PairingFeatures {
        PairingFeatures {
            io_capability: ctx.config.io_capability,
            oob_data_present: self.remote_oob.is_some(),
            auth_req: ctx.config.le_auth_req,
            max_key_size: ctx.config.max_key_size,
            initiator_key_dist: ctx.config.local_key_distribution,
            responder_key_dist: ctx.config.local_key_distribution,
        }
    }

    fn negotiated(&self) -> Result<Negotiated, PairingFailure> {
        self.negotiated
            .ok_or_else(|| fail_with(SmpReason::UnspecifiedReason, "Features not exchanged"))
    }

    fn exchanged(&self) -> Result<Exchanged, PairingFailure> {
        self.exchanged
            .ok_or_else(|| fail_with(SmpReason::UnspecifiedReason, "Public keys not exchanged"))
    }

    /// (Na, Nb) in initiator/responder order
    fn nonces(&self) -> ([u8; 16], [u8; 16]) {
        if self.is_central() {
            (self.local_nonce, self.remote_nonce)
        } else {
            (self.remote_nonce, self.local_nonce)
        }
    }

    /// (A, B) in initiator/responder order
    fn addresses(&self, ctx: &HandlerContext<'_>) -> ([u8; 7], [u8; 7]) {
        let local = ctx.local_address.to_smp_bytes();
        let remote = self.address.to_smp_bytes();
        if self.is_central() {
            (local, remote)
        } else {
            (remote, local)
        }
    }

    fn negotiate(
        &mut self,
        ctx: &HandlerContext<'_>,
        request: PairingFeatures,
        response: PairingFeatures,
    ) -> Step {
        if !request.auth_req.contains(AuthReq::SECURE_CONNECTIONS)
            || !response.auth_req.contains(AuthReq::SECURE_CONNECTIONS)
        {
            return Err(fail_with(
                SmpReason::AuthenticationRequirements,
                "Legacy pairing is not supported",
            ));
        }

        let key_size = request.max_key_size.min(response.max_key_size);
        if key_size < ctx.config.min_key_size || key_size > SMP_MAX_ENCRYPTION_KEY_SIZE {
            return Err(fail_with(
                SmpReason::EncryptionKeySize,
                "Encryption key size too small",
            ));
        }

        let method = select_method(&request, &response);
        debug!("LE pairing with {} uses {}", self.address, method);
        self.negotiated = Some(Negotiated {
            request,
            response,
            method,
            key_size,
        });
        Ok(())
    }

    fn generate_key_pair(&mut self, ctx: &HandlerContext<'_>, remote_has_our_oob: bool) {
        self.key_pair = match (remote_has_our_oob, self.local_oob) {
            (true, Some(oob)) => Some((oob.private_key, oob.public_key)),
            _ => Some(ctx.crypto.generate_key_pair()),
        };
    }

    fn on_pairing_request(&mut self, ctx: &mut HandlerContext<'_>, request: PairingFeatures) -> Step {
        let local = self.local_features(ctx);
        let response = PairingFeatures {
            initiator_key_dist: request.initiator_key_dist & local.initiator_key_dist,
            responder_key_dist: request.responder_key_dist & local.responder_key_dist,
            ..local
        };

        self.negotiate(ctx, request, response)?;
        self.send(ctx, SmpPdu::PairingResponse(response));
        self.generate_key_pair(ctx, request.oob_data_present);
        self.enter(Phase::AwaitPublicKey);
        Ok(())
    }

    fn on_pairing_response(&mut self, ctx: &mut HandlerContext<'_>, response: PairingFeatures) -> Step {
        let request = self.local_features(ctx);
        self.negotiate(ctx, request, response)?;
        self.generate_key_pair(ctx, response.oob_data_present);

        if let Some((_, public_key)) = self.key_pair {
            self.send(ctx, SmpPdu::PairingPublicKey(public_key));
        }
        self.enter(Phase::AwaitPublicKey);
        Ok(())
    }

    fn on_public_key(&mut self, ctx: &mut HandlerContext<'_>, remote: PublicKey) -> Step {
        let (private_key, local) = self
            .key_pair
            .ok_or_else(|| fail_with(SmpReason::UnspecifiedReason, "No local key pair"))?;

        if remote.x == local.x {
            return Err(fail_with(
                SmpReason::InvalidParameters,
                "Remote public key matches ours",
            ));
        }
        if !ctx.crypto.validate_public_key(&remote) {
            return Err(fail_with(
                SmpReason::InvalidParameters,
                "Remote public key is not on the curve",
            ));
        }
        let dh_key = ctx
            .crypto
            .dh_key(&private_key, &remote)
            .ok_or_else(|| fail_with(SmpReason::InvalidParameters, "DHKey computation failed"))?;

        if !self.is_central() {
            self.send(ctx, SmpPdu::PairingPublicKey(local));
        }

        let (pka, pkb) = if self.is_central() {
            (local.x, remote.x)
        } else {
            (remote.x, local.x)
        };
        self.exchanged = Some(Exchanged { pka, pkb, dh_key });
        self.begin_authentication(ctx)
    }

    fn begin_authentication(&mut self, ctx: &mut HandlerContext<'_>) -> Step {
        let negotiated = self.negotiated()?;
        let keys = self.exchanged()?;

        match negotiated.method {
            PairingMethod::JustWorks | PairingMethod::NumericComparison => {
                self.local_nonce = generate_random_128();
                if self.is_central() {
                    self.enter(Phase::AwaitConfirm);
                } else {
                    let confirm = ctx.crypto.f4(&keys.pkb, &keys.pka, &self.local_nonce, 0);
                    self.send(ctx, SmpPdu::PairingConfirm(confirm));
                    self.enter(Phase::AwaitRandom);
                }
            }
            PairingMethod::PasskeyEntry => {
                let (local_io, remote_io) = if self.is_central() {
                    (negotiated.request.io_capability, negotiated.response.io_capability)
                } else {
                    (negotiated.response.io_capability, negotiated.request.io_capability)
                };
                if displays_passkey(local_io, remote_io) {
                    let passkey = generate_passkey();
                    self.passkey = Some(passkey);
                    ctx.ui.display_passkey(&self.address, passkey);
                    self.start_passkey_round(ctx)?;
                } else {
                    self.enter(Phase::AwaitPasskey);
                    ctx.ui.display_enter_passkey_dialog(&self.address);
                }
            }
            PairingMethod::OutOfBand => {
                let (local_request, remote_request) = if self.is_central() {
                    (negotiated.request, negotiated.response)
                } else {
                    (negotiated.response, negotiated.request)
                };

                let local_r = match (remote_request.oob_data_present, self.local_oob) {
                    (true, Some(oob)) => oob.data.r,
                    _ => [0; 16],
                };
                let remote_r = match (local_request.oob_data_present, self.remote_oob) {
                    (true, Some(oob)) => {
                        let remote_x = if self.is_central() { keys.pkb } else { keys.pka };
                        if ctx.crypto.f4(&remote_x, &remote_x, &oob.r, 0) != oob.c {
                            return Err(fail_with(
                                SmpReason::ConfirmValueFailed,
                                "OOB confirm value mismatch",
                            ));
                        }
                        oob.r
                    }
                    _ => [0; 16],
                };

                (self.ra, self.rb) = if self.is_central() {
                    (local_r, remote_r)
                } else {
                    (remote_r, local_r)
                };

                self.local_nonce = generate_random_128();
                if self.is_central() {
                    self.send(ctx, SmpPdu::PairingRandom(self.local_nonce));
                }
                self.enter(Phase::AwaitRandom);
            }
        }
        Ok(())
    }

    fn passkey_bit(&self) -> Result<u8, PairingFailure> {
        let passkey = self
            .passkey
            .ok_or_else(|| fail_with(SmpReason::PasskeyEntryFailed, "No passkey"))?;
        Ok(passkey_round_bit(passkey, self.passkey_round))
    }

    fn start_passkey_round(&mut self, ctx: &mut HandlerContext<'_>) -> Step {
        let keys = self.exchanged()?;
        let ri = self.passkey_bit()?;
        self.local_nonce = generate_random_128();

        if self.is_central() {
            let confirm = ctx.crypto.f4(&keys.pka, &keys.pkb, &self.local_nonce, ri);
            self.send(ctx, SmpPdu::PairingConfirm(confirm));
            self.enter(Phase::AwaitConfirm);
        } else if self.remote_confirm.is_some() {
            let confirm = ctx.crypto.f4(&keys.pkb, &keys.pka, &self.local_nonce, ri);
            self.send(ctx, SmpPdu::PairingConfirm(confirm));
            self.enter(Phase::AwaitRandom);
        } else {
            self.enter(Phase::AwaitConfirm);
        }
        Ok(())
    }

    fn on_confirm(&mut self, ctx: &mut HandlerContext<'_>, confirm: [u8; 16]) -> Step {
        let method = self.negotiated()?.method;

        if self.phase == Phase::AwaitPasskey {
            if self.is_central() {
                return Err(SmpError::Unexpected {
                    opcode: SMP_PAIRING_CONFIRM,
                    stage: self.phase.name(),
                }
                .into());
            }
            // Initiator may commit before our user has typed the passkey
            self.remote_confirm = Some(confirm);
            return Ok(());
        }

        self.remote_confirm = Some(confirm);
        match (method, self.role) {
            (PairingMethod::JustWorks | PairingMethod::NumericComparison, Role::Central)
            | (PairingMethod::PasskeyEntry, Role::Central) => {
                self.send(ctx, SmpPdu::PairingRandom(self.local_nonce));
                self.enter(Phase::AwaitRandom);
            }
            (PairingMethod::PasskeyEntry, Role::Peripheral) => {
                let keys = self.exchanged()?;
                let ri = self.passkey_bit()?;
                let ours = ctx.crypto.f4(&keys.pkb, &keys.pka, &self.local_nonce, ri);
                self.send(ctx, SmpPdu::PairingConfirm(ours));
                self.enter(Phase::AwaitRandom);
            }
            _ => {
                return Err(SmpError::Unexpected {
                    opcode: SMP_PAIRING_CONFIRM,
                    stage: self.phase.name(),
                }
                .into())
            }
        }
        Ok(())
    }

    fn on_random(&mut self, ctx: &mut HandlerContext<'_>, nonce: [u8; 16]) -> Step {
        let method = self.negotiated()?.method;
        let keys = self.exchanged()?;
        self.remote_nonce = nonce;

        match method {
            PairingMethod::JustWorks | PairingMethod::NumericComparison => {
                if self.is_central() {
                    let expected = ctx.crypto.f4(&keys.pkb, &keys.pka, &nonce, 0);
                    if self.remote_confirm != Some(expected) {
                        return Err(fail_with(
                            SmpReason::ConfirmValueFailed,
                            "Confirm value mismatch",
                        ));
                    }
                } else {
                    self.send(ctx, SmpPdu::PairingRandom(self.local_nonce));
                }
                self.request_user_approval(ctx, method, keys)
            }
            PairingMethod::PasskeyEntry => {
                let ri = self.passkey_bit()?;
                let (commit_x, other_x) = if self.is_central() {
                    (keys.pkb, keys.pka)
                } else {
                    (keys.pka, keys.pkb)
                };
                let expected = ctx.crypto.f4(&commit_x, &other_x, &nonce, ri);
                if self.remote_confirm.take() != Some(expected) {
                    return Err(fail_with(
                        SmpReason::ConfirmValueFailed,
                        "Passkey confirm value mismatch",
                    ));
                }
                if !self.is_central() {
                    self.send(ctx, SmpPdu::PairingRandom(self.local_nonce));
                }

                self.passkey_round += 1;
                if self.passkey_round < SMP_PASSKEY_ROUNDS {
                    return self.start_passkey_round(ctx);
                }
                if let Some(passkey) = self.passkey {
                    self.ra = passkey_to_r(passkey);
                    self.rb = self.ra;
                }
                self.begin_dhkey_check(ctx)
            }
            PairingMethod::OutOfBand => {
                if !self.is_central() {
                    self.send(ctx, SmpPdu::PairingRandom(self.local_nonce));
                }
                self.begin_dhkey_check(ctx)
            }
        }
    }

    fn request_user_approval(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        method: PairingMethod,
        keys: Exchanged,
    ) -> Step {
        let (na, nb) = self.nonces();
        if method == PairingMethod::NumericComparison {
            let value = numeric_comparison_value(ctx.crypto.g2(&keys.pka, &keys.pkb, &na, &nb));
            self.enter(Phase::AwaitUserConfirmation);
            ctx.ui.display_confirm_value(&self.address, value);
            Ok(())
        } else if !self.locally_initiated {
            self.enter(Phase::AwaitUserConfirmation);
            ctx.ui.display_pairing_prompt(&self.address);
            Ok(())
        } else {
            self.begin_dhkey_check(ctx)
        }
    }

    /// Expected (Ea, Eb)
    fn dhkey_checks(&self, ctx: &HandlerContext<'_>) -> Result<([u8; 16], [u8; 16]), PairingFailure> {
        let negotiated = self.negotiated()?;
        let (na, nb) = self.nonces();
        let (a, b) = self.addresses(ctx);
        let ea = ctx.crypto.f6(
            &self.mac_key,
            &na,
            &nb,
            &self.rb,
            &negotiated.request.iocap_bytes(),
            &a,
            &b,
        );
        let eb = ctx.crypto.f6(
            &self.mac_key,
            &nb,
            &na,
            &self.ra,
            &negotiated.response.iocap_bytes(),
            &b,
            &a,
        );
        Ok((ea, eb))
    }

    fn begin_dhkey_check(&mut self, ctx: &mut HandlerContext<'_>) -> Step {
        let keys = self.exchanged()?;
        let (na, nb) = self.nonces();
        let (a, b) = self.addresses(ctx);
        let (mac_key, ltk) = ctx.crypto.f5(&keys.dh_key, &na, &nb, &a, &b);
        self.mac_key = mac_key;
        self.ltk = Some(ltk);

        let (ea, _) = self.dhkey_checks(ctx)?;
        if self.is_central() {
            self.send(ctx, SmpPdu::PairingDhKeyCheck(ea));
            self.enter(Phase::AwaitDhKeyCheck);
            return Ok(());
        }

        match self.early_dhkey_check.take() {
            Some(check) => self.on_dhkey_check(ctx, check),
            None => {
                self.enter(Phase::AwaitDhKeyCheck);
                Ok(())
            }
        }
    }

    fn on_dhkey_check(&mut self, ctx: &mut HandlerContext<'_>, check: [u8; 16]) -> Step {
        let (ea, eb) = self.dhkey_checks(ctx)?;
        let expected = if self.is_central() { eb } else { ea };
        if check != expected {
            return Err(fail_with(SmpReason::DhKeyCheckFailed, "DHKey check mismatch"));
        }

        if self.is_central() {
            let ltk = self
                .ltk
                .ok_or_else(|| fail_with(SmpReason::UnspecifiedReason, "No LTK"))?;
            ctx.send_command(HciCommand::LeStartEncryption {
                handle: self.handle,
                rand: [0; 8],
                ediv: 0,
                ltk,
            });
        } else {
            self.send(ctx, SmpPdu::PairingDhKeyCheck(eb));
        }
        self.enter(Phase::AwaitEncryption);
        Ok(())
    }

    /// Keys (sent, expected) after masking out what LE Secure Connections
    /// derives instead of distributing
    fn key_distribution(&self) -> Result<(KeyDistribution, KeyDistribution), PairingFailure> {
        let negotiated = self.negotiated()?;
        let strip = !(KeyDistribution::ENC_KEY | KeyDistribution::LINK_KEY);
        let initiator_keys =
            negotiated.request.initiator_key_dist & negotiated.response.initiator_key_dist & strip;
        let responder_keys =
            negotiated.request.responder_key_dist & negotiated.response.responder_key_dist & strip;

        Ok(if self.is_central() {
            (initiator_keys, responder_keys)
        } else {
            (responder_keys, initiator_keys)
        })
    }

    fn on_encrypted(&mut self, ctx: &mut HandlerContext<'_>) -> Step {
        let (local_keys, expected_keys) = self.key_distribution()?;
        self.expected_keys = expected_keys;
        self.received_keys = KeyDistribution::empty();

        // The responder distributes first
        if !self.is_central() {
            self.send_keys(ctx, local_keys);
        }
        if expected_keys.is_empty() {
            if self.is_central() {
                self.send_keys(ctx, local_keys);
            }
            self.succeed(ctx);
        } else {
            self.enter(Phase::AwaitKeys);
        }
        Ok(())
    }

    fn send_keys(&self, ctx: &HandlerContext<'_>, keys: KeyDistribution) {
        if keys.contains(KeyDistribution::ID_KEY) {
            self.send(ctx, SmpPdu::IdentityInformation(ctx.local_irk));
            self.send(ctx, SmpPdu::IdentityAddressInformation(ctx.local_address));
        }
        if keys.contains(KeyDistribution::SIGN_KEY) {
            self.send(ctx, SmpPdu::SigningInformation(generate_random_128()));
        }
    }

    fn on_key(&mut self, ctx: &mut HandlerContext<'_>, pdu: SmpPdu) -> Step {
        let opcode = pdu.opcode();
        let unexpected = SmpError::Unexpected {
            opcode,
            stage: self.phase.name(),
        };

        match pdu {
            SmpPdu::IdentityInformation(irk)
                if self.expected_keys.contains(KeyDistribution::ID_KEY) =>
            {
                self.remote_irk = Some(irk);
            }
            SmpPdu::IdentityAddressInformation(address)
                if self.expected_keys.contains(KeyDistribution::ID_KEY)
                    && self.remote_irk.is_some() =>
            {
                self.remote_identity = Some(address);
                self.received_keys |= KeyDistribution::ID_KEY;
            }
            SmpPdu::SigningInformation(csrk)
                if self.expected_keys.contains(KeyDistribution::SIGN_KEY) =>
            {
                self.remote_csrk = Some(csrk);
                self.received_keys |= KeyDistribution::SIGN_KEY;
            }
            _ => return Err(unexpected.into()),
        }

        if self.received_keys.contains(self.expected_keys) {
            if self.is_central() {
                let (local_keys, _) = self.key_distribution()?;
                self.send_keys(ctx, local_keys);
            }
            self.succeed(ctx);
        }
        Ok(())
    }

    fn succeed(&mut self, ctx: &mut HandlerContext<'_>) {
        let Some(negotiated) = self.negotiated else {
            return;
        };
        let level = if negotiated.method == PairingMethod::JustWorks {
            SecurityLevel::EncryptionOnly
        } else {
            SecurityLevel::SecureConnections
        };
        info!(
            "LE pairing with {} complete ({}, key size {})",
            self.address, negotiated.method, negotiated.key_size
        );

        let outcome = PairingOutcome {
            keys: BondKeys {
                link_key: None,
                ltk: self.ltk.map(LongTermKey::new_secure_connections),
                irk: self.remote_irk,
                csrk: self.remote_csrk,
                identity_address: self.remote_identity,
                key_size: negotiated.key_size,
            },
            level,
        };
        self.finish(ctx, Ok(outcome));
    }

    fn on_pdu(&mut self, ctx: &mut HandlerContext<'_>, pdu: SmpPdu) -> Step {
        let unexpected = SmpError::Unexpected {
            opcode: pdu.opcode(),
            stage: self.phase.name(),
        };

        match (self.phase, pdu) {
            (Phase::AwaitPairingRequest, SmpPdu::PairingRequest(request)) if !self.is_central() => {
                self.on_pairing_request(ctx, request)
            }
            (Phase::AwaitPairingResponse, SmpPdu::PairingResponse(response)) => {
                self.on_pairing_response(ctx, response)
            }
            (Phase::AwaitPairingResponse, SmpPdu::SecurityRequest(_)) => {
                debug!("Security request from {} while pairing", self.address);
                Ok(())
            }
            (Phase::AwaitPublicKey, SmpPdu::PairingPublicKey(key)) => self.on_public_key(ctx, key),
            (Phase::AwaitConfirm | Phase::AwaitPasskey, SmpPdu::PairingConfirm(confirm)) => {
                self.on_confirm(ctx, confirm)
            }
            (Phase::AwaitRandom, SmpPdu::PairingRandom(nonce)) => self.on_random(ctx, nonce),
            (Phase::AwaitUserConfirmation, SmpPdu::PairingDhKeyCheck(check))
                if !self.is_central() =>
            {
                self.early_dhkey_check = Some(check);
                Ok(())
            }
            (Phase::AwaitDhKeyCheck, SmpPdu::PairingDhKeyCheck(check)) => {
                self.on_dhkey_check(ctx, check)
            }
            (_, SmpPdu::KeypressNotification(kind)) => {
                debug!("Keypress {} from {}", kind, self.address);
                Ok(())
            }
            (Phase::AwaitKeys, pdu) => self.on_key(ctx, pdu),
            _ => Err(unexpected.into()),
        }
    }

    fn on_smp_bytes(&mut self, ctx: &mut HandlerContext<'_>, bytes: &[u8]) {
        self.rearm_timer(ctx);

        let pdu = match SmpPdu::parse(bytes) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Bad SMP PDU from {}: {}", self.address, e);
                self.abort(ctx, e.into());
                return;
            }
        };
        debug!("SMP <- {}: {:?}", self.address, pdu);

        if let SmpPdu::PairingFailed(reason) = pdu {
            info!("{} rejected pairing: {}", self.address, reason);
            self.finish(
                ctx,
                Err(PairingFailure::smp(format!("Remote failed pairing: {}", reason), reason)),
            );
            return;
        }

        if let Err(failure) = self.on_pdu(ctx, pdu) {
            self.abort(ctx, failure);
        }
    }

    fn step(&mut self, ctx: &mut HandlerContext<'_>, result: Step) {
        if let Err(failure) = result {
            self.abort(ctx, failure);
        }
    }
}

impl PairingStateMachine for LePairingHandler {
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
        if self.phase != Phase::Idle {
            warn!("LE pairing with {} already started", self.address);
            return;
        }
        self.rearm_timer(ctx);

        match (self.role, self.remote_request.take()) {
            (Role::Central, _) => {
                let request = self.local_features(ctx);
                self.send(ctx, SmpPdu::PairingRequest(request));
                self.enter(Phase::AwaitPairingResponse);
            }
            (Role::Peripheral, Some(request)) => {
                self.enter(Phase::AwaitPairingRequest);
                let result = self.on_pairing_request(ctx, request);
                self.step(ctx, result);
            }
            (Role::Peripheral, None) => {
                if self.locally_initiated {
                    self.send(ctx, SmpPdu::SecurityRequest(ctx.config.le_auth_req));
                }
                self.enter(Phase::AwaitPairingRequest);
            }
        }
    }

    fn on_input(&mut self, ctx: &mut HandlerContext<'_>, input: PairingInput) {
        if self.state.is_complete() {
            debug!("Ignoring {:?} for finished pairing with {}", input, self.address);
            return;
        }

        match input {
            PairingInput::SmpPdu(bytes) => self.on_smp_bytes(ctx, &bytes),
            PairingInput::LongTermKeyRequest { .. } => {
                match self.ltk.filter(|_| self.phase == Phase::AwaitEncryption) {
                    Some(ltk) => ctx.send_command(HciCommand::LeLongTermKeyRequestReply {
                        handle: self.handle,
                        ltk,
                    }),
                    None => ctx.send_command(HciCommand::LeLongTermKeyRequestNegativeReply {
                        handle: self.handle,
                    }),
                }
            }
            PairingInput::EncryptionChange { status, enabled } => {
                if self.phase != Phase::AwaitEncryption {
                    debug!("Encryption change for {} while {}", self.address, self.phase.name());
                    return;
                }
                if status != HCI_SUCCESS || !enabled {
                    let failure = PairingFailure::hci("Link encryption failed", status);
                    info!("LE pairing with {} failed: {}", self.address, failure);
                    self.finish(ctx, Err(failure));
                    return;
                }
                self.rearm_timer(ctx);
                let result = self.on_encrypted(ctx);
                self.step(ctx, result);
            }
            PairingInput::Timeout => {
                info!("LE pairing with {} timed out", self.address);
                self.finish(
                    ctx,
                    Err(fail_with(SmpReason::UnspecifiedReason, "SMP timeout")),
                );
            }
            other => warn!("LE pairing with {} ignores {:?}", self.address, other),
        }
    }

    fn on_confirm_yes_no(&mut self, ctx: &mut HandlerContext<'_>, confirmed: bool) {
        if self.phase != Phase::AwaitUserConfirmation {
            warn!("Unexpected confirmation for {} while {}", self.address, self.phase.name());
            return;
        }

        if !confirmed {
            let reason = if self.method() == Some(PairingMethod::NumericComparison) {
                SmpReason::NumericComparisonFailed
            } else {
                SmpReason::UnspecifiedReason
            };
            self.abort(ctx, fail_with(reason, "User rejected pairing"));
            return;
        }
        let result = self.begin_dhkey_check(ctx);
        self.step(ctx, result);
    }

    fn on_passkey_entry(&mut self, ctx: &mut HandlerContext<'_>, passkey: u32) {
        if self.phase != Phase::AwaitPasskey {
            warn!("Unexpected passkey for {} while {}", self.address, self.phase.name());
            return;
        }

        if passkey > SMP_PASSKEY_MAX {
            self.abort(ctx, fail_with(SmpReason::PasskeyEntryFailed, "Passkey out of range"));
            return;
        }
        self.passkey = Some(passkey);
        let result = self.start_passkey_round(ctx);
        self.step(ctx, result);
    }

    fn on_pin_entry(&mut self, _ctx: &mut HandlerContext<'_>, _pin: &[u8]) {
        warn!("PIN entry does not apply to LE pairing with {}", self.address);
    }

    fn on_pairing_prompt_accepted(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.method() == Some(PairingMethod::NumericComparison) {
            warn!("Numeric comparison with {} needs a yes/no answer", self.address);
            return;
        }
        self.on_confirm_yes_no(ctx, true);
    }

    fn cancel(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        if self.state.is_complete() {
            return;
        }
        self.withdraw_prompt(ctx);
        self.abort(ctx, fail_with(SmpReason::UnspecifiedReason, reason));
    }

    fn on_link_lost(&mut self, ctx: &mut HandlerContext<'_>, reason: &str) {
        if self.state.is_complete() {
            return;
        }
        self.withdraw_prompt(ctx);
        info!("LE pairing with {} failed: {}", self.address, reason);
        self.finish(ctx, Err(PairingFailure::new(reason)));
    }
}

//! Recording collaborators and a deterministic crypto provider for tests

use crate::error::HciError;
use crate::gap::{AddressWithType, BdAddr};
use crate::hci::{CommandSender, HciCommand};
use crate::security::smp::{PrivateKey, PublicKey, SmpCrypto, SmpPdu};
use crate::security::{PairingUi, SmpChannel};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn address(last: u8) -> AddressWithType {
    AddressWithType::public(BdAddr::new([last, 0x22, 0x33, 0x44, 0x55, 0x66]))
}

#[derive(Debug, Default, Clone)]
pub struct RecordingHci {
    commands: Rc<RefCell<Vec<HciCommand>>>,
}

impl RecordingHci {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything sent so far
    pub fn take(&self) -> Vec<HciCommand> {
        self.commands.borrow_mut().drain(..).collect()
    }

    pub fn sent(&self) -> Vec<HciCommand> {
        self.commands.borrow().clone()
    }
}

impl CommandSender for RecordingHci {
    fn send_command(&self, command: HciCommand) -> Result<(), HciError> {
        self.commands.borrow_mut().push(command);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSmp {
    sent: Rc<RefCell<Vec<(AddressWithType, SmpPdu)>>>,
    connects: Rc<RefCell<Vec<AddressWithType>>>,
    closes: Rc<RefCell<Vec<AddressWithType>>>,
}

impl RecordingSmp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_sent(&self) -> Vec<(AddressWithType, SmpPdu)> {
        self.sent.borrow_mut().drain(..).collect()
    }

    pub fn sent_pdus(&self) -> Vec<SmpPdu> {
        self.sent.borrow().iter().map(|(_, pdu)| pdu.clone()).collect()
    }

    pub fn connects(&self) -> Vec<AddressWithType> {
        self.connects.borrow().clone()
    }
}

impl SmpChannel for RecordingSmp {
    fn connect(&self, address: &AddressWithType) {
        self.connects.borrow_mut().push(*address);
    }

    fn send(&self, address: &AddressWithType, pdu: &SmpPdu) {
        self.sent.borrow_mut().push((*address, pdu.clone()));
    }

    fn close(&self, address: &AddressWithType) {
        self.closes.borrow_mut().push(*address);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiPrompt {
    PairingPrompt(AddressWithType),
    Cancel(AddressWithType),
    ConfirmValue(AddressWithType, u32),
    YesNo(AddressWithType),
    EnterPasskey(AddressWithType),
    Passkey(AddressWithType, u32),
    EnterPin(AddressWithType),
}

#[derive(Debug, Default, Clone)]
pub struct RecordingUi {
    prompts: Rc<RefCell<Vec<UiPrompt>>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<UiPrompt> {
        self.prompts.borrow().clone()
    }

    pub fn take(&self) -> Vec<UiPrompt> {
        self.prompts.borrow_mut().drain(..).collect()
    }

    pub fn displayed_passkey(&self) -> Option<u32> {
        self.prompts.borrow().iter().find_map(|p| match p {
            UiPrompt::Passkey(_, passkey) => Some(*passkey),
            _ => None,
        })
    }

    pub fn confirm_value(&self) -> Option<u32> {
        self.prompts.borrow().iter().find_map(|p| match p {
            UiPrompt::ConfirmValue(_, value) => Some(*value),
            _ => None,
        })
    }

    fn push(&self, prompt: UiPrompt) {
        self.prompts.borrow_mut().push(prompt);
    }
}

impl PairingUi for RecordingUi {
    fn display_pairing_prompt(&self, address: &AddressWithType) {
        self.push(UiPrompt::PairingPrompt(*address));
    }

    fn cancel(&self, address: &AddressWithType) {
        self.push(UiPrompt::Cancel(*address));
    }

    fn display_confirm_value(&self, address: &AddressWithType, value: u32) {
        self.push(UiPrompt::ConfirmValue(*address, value));
    }

    fn display_yes_no_dialog(&self, address: &AddressWithType) {
        self.push(UiPrompt::YesNo(*address));
    }

    fn display_enter_passkey_dialog(&self, address: &AddressWithType) {
        self.push(UiPrompt::EnterPasskey(*address));
    }

    fn display_passkey(&self, address: &AddressWithType, passkey: u32) {
        self.push(UiPrompt::Passkey(*address, passkey));
    }

    fn display_enter_pin_dialog(&self, address: &AddressWithType) {
        self.push(UiPrompt::EnterPin(*address));
    }
}

/// Not cryptography. The public X coordinate equals the private key and the
/// shared secret is their XOR, so both sides of a handshake agree on it; the
/// f-functions are keyed hashes of their inputs.
#[derive(Debug, Default)]
pub struct FakeCrypto;

fn digest(label: u8, parts: &[&[u8]]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (half, chunk) in out.chunks_mut(8).enumerate() {
        let mut hasher = DefaultHasher::new();
        (label, half).hash(&mut hasher);
        for part in parts {
            part.hash(&mut hasher);
        }
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

impl SmpCrypto for FakeCrypto {
    fn generate_key_pair(&self) -> (PrivateKey, PublicKey) {
        let private = rand::random::<[u8; 32]>();
        (PrivateKey(private), PublicKey { x: private, y: [0x01; 32] })
    }

    fn validate_public_key(&self, key: &PublicKey) -> bool {
        key.y != [0; 32]
    }

    fn dh_key(&self, private_key: &PrivateKey, remote: &PublicKey) -> Option<[u8; 32]> {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = private_key.0[i] ^ remote.x[i];
        }
        Some(out)
    }

    fn f4(&self, u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], z: u8) -> [u8; 16] {
        digest(4, &[&u[..], &v[..], &x[..], &[z][..]])
    }

    fn f5(
        &self,
        w: &[u8; 32],
        n1: &[u8; 16],
        n2: &[u8; 16],
        a1: &[u8; 7],
        a2: &[u8; 7],
    ) -> ([u8; 16], [u8; 16]) {
        (
            digest(50, &[&w[..], &n1[..], &n2[..], &a1[..], &a2[..]]),
            digest(51, &[&w[..], &n1[..], &n2[..], &a1[..], &a2[..]]),
        )
    }

    fn f6(
        &self,
        w: &[u8; 16],
        n1: &[u8; 16],
        n2: &[u8; 16],
        r: &[u8; 16],
        io_cap: &[u8; 3],
        a1: &[u8; 7],
        a2: &[u8; 7],
    ) -> [u8; 16] {
        digest(
            6,
            &[&w[..], &n1[..], &n2[..], &r[..], &io_cap[..], &a1[..], &a2[..]],
        )
    }

    fn g2(&self, u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], y: &[u8; 16]) -> u32 {
        let out = digest(2, &[&u[..], &v[..], &x[..], &y[..]]);
        u32::from_le_bytes([out[12], out[13], out[14], out[15]])
    }
}

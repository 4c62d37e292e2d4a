//! Cryptographic collaborator for LE Secure Connections
//!
//! The stack never implements ECDH or AES-CMAC itself. A [`SmpCrypto`]
//! provider supplies the P-256 operations and the f4/f5/f6/g2 functions from
//! the Core Specification (Vol 3, Part H, 2.2). Random values come from `rand`.

use super::constants::SMP_PASSKEY_MAX;

/// P-256 public key as carried in the Pairing Public Key PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    pub x: [u8; 32],
    pub y: [u8; 32],
}

/// P-256 private key; never leaves the pairing handler
#[derive(Clone, Copy)]
pub struct PrivateKey(pub [u8; 32]);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

pub trait SmpCrypto {
    fn generate_key_pair(&self) -> (PrivateKey, PublicKey);

    /// Returns false if the point is not on the curve
    fn validate_public_key(&self, key: &PublicKey) -> bool;

    /// ECDH shared secret; `None` if the remote key is unusable
    fn dh_key(&self, private_key: &PrivateKey, remote: &PublicKey) -> Option<[u8; 32]>;

    /// Confirm value generation function
    fn f4(&self, u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], z: u8) -> [u8; 16];

    /// Key generation function, returns (MacKey, LTK)
    fn f5(
        &self,
        w: &[u8; 32],
        n1: &[u8; 16],
        n2: &[u8; 16],
        a1: &[u8; 7],
        a2: &[u8; 7],
    ) -> ([u8; 16], [u8; 16]);

    /// Check value generation function
    #[allow(clippy::too_many_arguments)]
    fn f6(
        &self,
        w: &[u8; 16],
        n1: &[u8; 16],
        n2: &[u8; 16],
        r: &[u8; 16],
        io_cap: &[u8; 3],
        a1: &[u8; 7],
        a2: &[u8; 7],
    ) -> [u8; 16];

    /// Numeric comparison value generation function
    fn g2(&self, u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], y: &[u8; 16]) -> u32;
}

/// Generate a 128-bit random number
pub fn generate_random_128() -> [u8; 16] {
    rand::random::<[u8; 16]>()
}

/// Generate a random passkey (0-999999)
pub fn generate_passkey() -> u32 {
    rand::random::<u32>() % (SMP_PASSKEY_MAX + 1)
}

/// Six digit value shown to the user during numeric comparison
pub fn numeric_comparison_value(g2_output: u32) -> u32 {
    g2_output % (SMP_PASSKEY_MAX + 1)
}

/// Per-round commitment input `ri` for passkey entry
pub fn passkey_round_bit(passkey: u32, round: u8) -> u8 {
    0x80 | ((passkey >> round) & 0x01) as u8
}

/// Passkey as the 128-bit `ra`/`rb` value used in the DHKey check
pub fn passkey_to_r(passkey: u32) -> [u8; 16] {
    let mut r = [0u8; 16];
    r[..4].copy_from_slice(&passkey.to_le_bytes());
    r
}

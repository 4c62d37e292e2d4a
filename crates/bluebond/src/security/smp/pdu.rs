//! SMP PDU encoding and decoding
//!
//! Every PDU starts with its opcode octet. Multi-octet values are kept in the
//! byte order they travel in; only EDIV is interpreted as an integer.

use super::constants::*;
use super::crypto::PublicKey;
use super::types::*;
use crate::gap::{AddressType, AddressWithType, BdAddr};
use crate::security::IoCapability;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmpPdu {
    PairingRequest(PairingFeatures),
    PairingResponse(PairingFeatures),
    PairingConfirm([u8; 16]),
    PairingRandom([u8; 16]),
    PairingFailed(SmpReason),
    EncryptionInformation([u8; 16]),
    CentralIdentification { ediv: u16, rand: [u8; 8] },
    IdentityInformation([u8; 16]),
    IdentityAddressInformation(AddressWithType),
    SigningInformation([u8; 16]),
    SecurityRequest(AuthReq),
    PairingPublicKey(PublicKey),
    PairingDhKeyCheck([u8; 16]),
    KeypressNotification(u8),
}

fn expect_len(data: &[u8], expected: usize) -> SmpResult<()> {
    if data.len() < expected {
        return Err(SmpError::TooShort {
            opcode: data[0],
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

fn parse_features(data: &[u8]) -> SmpResult<PairingFeatures> {
    expect_len(data, 7)?;
    let io_capability = IoCapability::from_u8(data[1]).ok_or_else(|| {
        SmpError::InvalidParameter(format!("IO capability 0x{:02x}", data[1]))
    })?;

    Ok(PairingFeatures {
        io_capability,
        oob_data_present: data[2] == 0x01,
        auth_req: AuthReq::from_bits_truncate(data[3]),
        max_key_size: data[4],
        initiator_key_dist: KeyDistribution::from_bits_truncate(data[5]),
        responder_key_dist: KeyDistribution::from_bits_truncate(data[6]),
    })
}

impl SmpPdu {
    /// Parse from raw packet
    pub fn parse(data: &[u8]) -> SmpResult<Self> {
        let Some(&opcode) = data.first() else {
            return Err(SmpError::Empty);
        };

        let pdu = match opcode {
            SMP_PAIRING_REQUEST => SmpPdu::PairingRequest(parse_features(data)?),
            SMP_PAIRING_RESPONSE => SmpPdu::PairingResponse(parse_features(data)?),
            SMP_PAIRING_CONFIRM => {
                expect_len(data, 17)?;
                SmpPdu::PairingConfirm(array(data, 1))
            }
            SMP_PAIRING_RANDOM => {
                expect_len(data, 17)?;
                SmpPdu::PairingRandom(array(data, 1))
            }
            SMP_PAIRING_FAILED => {
                expect_len(data, 2)?;
                SmpPdu::PairingFailed(SmpReason::from_u8(data[1]))
            }
            SMP_ENCRYPTION_INFORMATION => {
                expect_len(data, 17)?;
                SmpPdu::EncryptionInformation(array(data, 1))
            }
            SMP_CENTRAL_IDENTIFICATION => {
                expect_len(data, 11)?;
                let mut cursor = Cursor::new(&data[1..]);
                let ediv = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|e| SmpError::InvalidParameter(e.to_string()))?;
                SmpPdu::CentralIdentification {
                    ediv,
                    rand: array(data, 3),
                }
            }
            SMP_IDENTITY_INFORMATION => {
                expect_len(data, 17)?;
                SmpPdu::IdentityInformation(array(data, 1))
            }
            SMP_IDENTITY_ADDRESS_INFORMATION => {
                expect_len(data, 8)?;
                let address_type = match data[1] {
                    0x00 => AddressType::PublicIdentity,
                    0x01 => AddressType::RandomIdentity,
                    other => {
                        return Err(SmpError::InvalidParameter(format!(
                            "identity address type 0x{:02x}",
                            other
                        )))
                    }
                };
                SmpPdu::IdentityAddressInformation(AddressWithType::new(
                    BdAddr::new(array(data, 2)),
                    address_type,
                ))
            }
            SMP_SIGNING_INFORMATION => {
                expect_len(data, 17)?;
                SmpPdu::SigningInformation(array(data, 1))
            }
            SMP_SECURITY_REQUEST => {
                expect_len(data, 2)?;
                SmpPdu::SecurityRequest(AuthReq::from_bits_truncate(data[1]))
            }
            SMP_PAIRING_PUBLIC_KEY => {
                expect_len(data, 65)?;
                SmpPdu::PairingPublicKey(PublicKey {
                    x: array(data, 1),
                    y: array(data, 33),
                })
            }
            SMP_PAIRING_DHKEY_CHECK => {
                expect_len(data, 17)?;
                SmpPdu::PairingDhKeyCheck(array(data, 1))
            }
            SMP_PAIRING_KEYPRESS_NOTIFICATION => {
                expect_len(data, 2)?;
                SmpPdu::KeypressNotification(data[1])
            }
            other => return Err(SmpError::UnknownOpcode(other)),
        };

        Ok(pdu)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            SmpPdu::PairingRequest(_) => SMP_PAIRING_REQUEST,
            SmpPdu::PairingResponse(_) => SMP_PAIRING_RESPONSE,
            SmpPdu::PairingConfirm(_) => SMP_PAIRING_CONFIRM,
            SmpPdu::PairingRandom(_) => SMP_PAIRING_RANDOM,
            SmpPdu::PairingFailed(_) => SMP_PAIRING_FAILED,
            SmpPdu::EncryptionInformation(_) => SMP_ENCRYPTION_INFORMATION,
            SmpPdu::CentralIdentification { .. } => SMP_CENTRAL_IDENTIFICATION,
            SmpPdu::IdentityInformation(_) => SMP_IDENTITY_INFORMATION,
            SmpPdu::IdentityAddressInformation(_) => SMP_IDENTITY_ADDRESS_INFORMATION,
            SmpPdu::SigningInformation(_) => SMP_SIGNING_INFORMATION,
            SmpPdu::SecurityRequest(_) => SMP_SECURITY_REQUEST,
            SmpPdu::PairingPublicKey(_) => SMP_PAIRING_PUBLIC_KEY,
            SmpPdu::PairingDhKeyCheck(_) => SMP_PAIRING_DHKEY_CHECK,
            SmpPdu::KeypressNotification(_) => SMP_PAIRING_KEYPRESS_NOTIFICATION,
        }
    }

    /// Serialize to raw packet
    pub fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(17);
        packet.push(self.opcode());

        match self {
            SmpPdu::PairingRequest(features) | SmpPdu::PairingResponse(features) => {
                packet.push(features.io_capability.to_u8());
                packet.push(features.oob_data_present as u8);
                packet.push(features.auth_req.bits());
                packet.push(features.max_key_size);
                packet.push(features.initiator_key_dist.bits());
                packet.push(features.responder_key_dist.bits());
            }
            SmpPdu::PairingConfirm(value)
            | SmpPdu::PairingRandom(value)
            | SmpPdu::EncryptionInformation(value)
            | SmpPdu::IdentityInformation(value)
            | SmpPdu::SigningInformation(value)
            | SmpPdu::PairingDhKeyCheck(value) => packet.extend_from_slice(value),
            SmpPdu::PairingFailed(reason) => packet.push(reason.to_u8()),
            SmpPdu::CentralIdentification { ediv, rand } => {
                // Writing into a Vec cannot fail
                let _ = packet.write_u16::<LittleEndian>(*ediv);
                packet.extend_from_slice(rand);
            }
            SmpPdu::IdentityAddressInformation(address) => {
                packet.push(match address.address_type.to_over_the_air() {
                    AddressType::Random => 0x01,
                    _ => 0x00,
                });
                packet.extend_from_slice(address.address.as_slice());
            }
            SmpPdu::SecurityRequest(auth_req) => packet.push(auth_req.bits()),
            SmpPdu::PairingPublicKey(key) => {
                packet.extend_from_slice(&key.x);
                packet.extend_from_slice(&key.y);
            }
            SmpPdu::KeypressNotification(kind) => packet.push(*kind),
        }

        packet
    }
}

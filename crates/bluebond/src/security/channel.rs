//! LE SMP fixed channel collaborator (CID 0x0006)

use super::smp::SmpPdu;
use crate::gap::AddressWithType;

/// Outbound side of the SMP fixed channel.
///
/// Inbound PDUs and channel state changes reach the security manager through
/// `on_smp_pdu`, `on_le_channel_open`, `on_le_channel_failed` and
/// `on_le_channel_closed`.
pub trait SmpChannel {
    /// Ask the transport to establish a link to `address`. Completion is
    /// reported later through the channel callbacks.
    fn connect(&self, address: &AddressWithType);

    fn send(&self, address: &AddressWithType, pdu: &SmpPdu);

    fn close(&self, address: &AddressWithType);
}

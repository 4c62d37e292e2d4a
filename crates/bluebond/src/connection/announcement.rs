//! Audio announcement detection in advertising data

use crate::gap::{
    ANNOUNCEMENT_TYPE_TARGETED, ASCS_ANNOUNCEMENT_SERVICE_UUID, CAP_ANNOUNCEMENT_SERVICE_UUID,
};
use crate::scan::service_data_16bit;

/// True when the advertising data carries a targeted announcement, i.e. the
/// peer is asking a specific host to connect now
pub fn is_targeted_announcement(data: &[u8]) -> bool {
    service_data_16bit(data).iter().any(|(uuid, payload)| {
        matches!(
            *uuid,
            CAP_ANNOUNCEMENT_SERVICE_UUID | ASCS_ANNOUNCEMENT_SERVICE_UUID
        ) && payload.first() == Some(&ANNOUNCEMENT_TYPE_TARGETED)
    })
}

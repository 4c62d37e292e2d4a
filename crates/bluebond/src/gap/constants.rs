// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// Advertising data type carrying service data keyed by a 16-bit UUID
pub const ADV_TYPE_SERVICE_DATA_16BIT_UUID: u8 = 0x16;

// Announcement service UUIDs
pub const CAP_ANNOUNCEMENT_SERVICE_UUID: u16 = 0x1853;
pub const ASCS_ANNOUNCEMENT_SERVICE_UUID: u16 = 0x184E;

// Announcement types carried as the first byte of the service data
pub const ANNOUNCEMENT_TYPE_GENERAL: u8 = 0x00;
pub const ANNOUNCEMENT_TYPE_TARGETED: u8 = 0x01;

//! BLE GATT constants for the ESP32 Garden relay board.
//!
//! The board exposes a single custom service with one characteristic
//! holding the relay bitmask. The characteristic supports read and
//! write-without-response.

use uuid::Uuid;

/// Relay service UUID: 7e6b2f20-5f7a-4d7c-8c2a-5d9e2b1a0000
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x7e6b2f20_5f7a_4d7c_8c2a_5d9e2b1a0000);

/// Relay bitmask characteristic UUID (read / write-without-response)
pub const RELAY_CHAR_UUID: Uuid = Uuid::from_u128(0x7e6b2f20_5f7a_4d7c_8c2a_5d9e2b1a0001);

/// Name the board advertises while powered on
pub const DEFAULT_NAME: &str = "ESP32 Garden";

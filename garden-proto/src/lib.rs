//! ESP32 Garden wire protocol - BLE constants and the relay bitmask

pub mod ble;
pub mod mask;

//! Garden BLE Controller
//!
//! BLE client for the ESP32 Garden relay board.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use garden_ble_controller::ble::{self, Target};
//! use garden_proto::mask::RelayMask;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::adapter().await?;
//!
//!     // Resolve the board by its advertised name
//!     let target = Target::Name("ESP32 Garden".to_string());
//!     let device = ble::find_device(&adapter, &target, Duration::from_secs(6)).await?;
//!
//!     // Read the current bitmask
//!     let mask = ble::read_mask(&device, Duration::from_secs_f64(7.5)).await?;
//!     println!("{mask}");
//!
//!     // Turn both relays on
//!     ble::write_mask(&device, RelayMask::from_byte(0b11), Duration::from_secs_f64(7.5)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ble;

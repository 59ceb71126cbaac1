//! BLE client for the ESP32 Garden relay board.
//!
//! Resolves the board by advertised name or explicit MAC address and
//! reads or writes the relay bitmask characteristic. Every operation is
//! awaited sequentially with a bounded timeout, and the connection is
//! released on every exit path.

use std::time::Duration;

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager};

pub use btleplug::platform::Peripheral;

use garden_proto::ble::RELAY_CHAR_UUID;
use garden_proto::mask::RelayMask;

/// How often discovered peripherals are re-checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from scanning, connecting and characteristic I/O.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("no Bluetooth adapter found")]
    AdapterNotFound,
    #[error("device not found: nothing matching {target} within {}s", .timeout.as_secs_f64())]
    DeviceNotFound { target: Target, timeout: Duration },
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: btleplug::Error,
    },
    #[error("connecting to {address} timed out after {}s", .timeout.as_secs_f64())]
    ConnectTimeout { address: String, timeout: Duration },
    #[error("relay characteristic not present on device")]
    CharacteristicNotFound,
    #[error("empty response when reading relay characteristic")]
    EmptyResponse,
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}

/// How the target board is identified.
#[derive(Debug, Clone)]
pub enum Target {
    /// Explicit MAC address, e.g. "AA:BB:CC:DD:EE:FF" (matched case-insensitively)
    Address(String),
    /// Exact advertised name
    Name(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Address(mac) => write!(f, "address {mac}"),
            Target::Name(name) => write!(f, "name \"{name}\""),
        }
    }
}

/// A device seen while scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
}

/// Get the default Bluetooth adapter.
pub async fn adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::AdapterNotFound)
}

/// Scan for nearby BLE advertisements for `duration`.
pub async fn scan(adapter: &Adapter, duration: Duration) -> Result<Vec<DiscoveredDevice>, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            devices.push(DiscoveredDevice {
                name: props.local_name,
                address: peripheral.address().to_string(),
                rssi: props.rssi,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find the relay board, scanning until `timeout` elapses.
///
/// The first peripheral matching the target wins. Fails with
/// [`BleError::DeviceNotFound`] once the timeout is spent.
pub async fn find_device(
    adapter: &Adapter,
    target: &Target,
    timeout: Duration,
) -> Result<Peripheral, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    let found = poll_for_device(adapter, target, timeout).await;
    let _ = adapter.stop_scan().await;
    found
}

async fn poll_for_device(
    adapter: &Adapter,
    target: &Target,
    timeout: Duration,
) -> Result<Peripheral, BleError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::time::sleep(SCAN_POLL_INTERVAL.min(timeout)).await;

        for peripheral in adapter.peripherals().await? {
            if let Some(props) = peripheral.properties().await? {
                let matched = match target {
                    Target::Address(mac) => {
                        peripheral.address().to_string().eq_ignore_ascii_case(mac)
                    }
                    Target::Name(name) => props.local_name.as_deref() == Some(name.as_str()),
                };
                if matched {
                    return Ok(peripheral);
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(BleError::DeviceNotFound {
                target: target.clone(),
                timeout,
            });
        }
    }
}

/// Read the current relay bitmask.
///
/// Connects within `conn_timeout`, reads the characteristic and
/// disconnects again. Bits 2-7 of the returned byte are discarded.
pub async fn read_mask(device: &Peripheral, conn_timeout: Duration) -> Result<RelayMask, BleError> {
    connect(device, conn_timeout).await?;
    let result = read_connected(device).await;
    let _ = device.disconnect().await;
    result
}

/// Write a relay bitmask.
///
/// The characteristic is written without response; the board does not
/// acknowledge the write.
pub async fn write_mask(
    device: &Peripheral,
    mask: RelayMask,
    conn_timeout: Duration,
) -> Result<(), BleError> {
    connect(device, conn_timeout).await?;
    let result = write_connected(device, mask).await;
    let _ = device.disconnect().await;
    result
}

async fn connect(device: &Peripheral, timeout: Duration) -> Result<(), BleError> {
    let address = device.address().to_string();
    match tokio::time::timeout(timeout, device.connect()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(BleError::Connect { address, source }),
        Err(_) => Err(BleError::ConnectTimeout { address, timeout }),
    }
}

async fn read_connected(device: &Peripheral) -> Result<RelayMask, BleError> {
    let characteristic = relay_characteristic(device).await?;
    let data = device.read(&characteristic).await?;
    match data.first() {
        Some(&byte) => Ok(RelayMask::from_byte(byte)),
        None => Err(BleError::EmptyResponse),
    }
}

async fn write_connected(device: &Peripheral, mask: RelayMask) -> Result<(), BleError> {
    let characteristic = relay_characteristic(device).await?;
    device
        .write(&characteristic, &mask.payload(), WriteType::WithoutResponse)
        .await?;
    Ok(())
}

async fn relay_characteristic(device: &Peripheral) -> Result<Characteristic, BleError> {
    device.discover_services().await?;
    device
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == RELAY_CHAR_UUID)
        .ok_or(BleError::CharacteristicNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_display_for_diagnostics() {
        let by_name = Target::Name("ESP32 Garden".to_string());
        assert_eq!(by_name.to_string(), "name \"ESP32 Garden\"");

        let by_mac = Target::Address("AA:BB:CC:DD:EE:FF".to_string());
        assert_eq!(by_mac.to_string(), "address AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn device_not_found_names_the_target_and_window() {
        let err = BleError::DeviceNotFound {
            target: Target::Name("ESP32 Garden".to_string()),
            timeout: Duration::from_secs_f64(6.0),
        };
        assert_eq!(
            err.to_string(),
            "device not found: nothing matching name \"ESP32 Garden\" within 6s"
        );
    }
}

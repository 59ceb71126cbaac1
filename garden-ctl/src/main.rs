//! CLI to control the ESP32 Garden relays via BLE
//!
//! Resolves the board by advertised name (or explicit MAC), then reads
//! or writes the single-byte relay bitmask characteristic.
//!
//! Usage:
//!   garden-ctl --read                        - print the current bitmask
//!   garden-ctl --set-bits 3                  - both relays on
//!   garden-ctl --r1 on --r2 off              - compose per-relay states
//!   garden-ctl both off                      - positional shorthand
//!   garden-ctl --mac AA:BB:CC:DD:EE:FF --r1 off
//!   garden-ctl --read-first --r2 on          - preserve relay 1, switch relay 2
//!   garden-ctl --scan                        - list nearby advertisements

use std::time::Duration;

use clap::{Parser, ValueEnum};

use garden_ble_controller::ble::{self, BleError, Peripheral, Target};
use garden_proto::ble::DEFAULT_NAME;
use garden_proto::mask::{compose, RelayMask, RelayState};

#[derive(Parser)]
#[command(name = "garden-ctl")]
#[command(about = "Control the ESP32 Garden relays via BLE (bitmask characteristic)")]
struct Cli {
    /// Relay to switch (shorthand for --r1/--r2)
    #[arg(value_enum, requires = "state", conflicts_with_all = ["r1", "r2", "set_bits", "read"])]
    relay: Option<RelayArg>,

    /// State for the positional relay
    #[arg(value_enum)]
    state: Option<StateArg>,

    /// Target MAC (AA:BB:CC:DD:EE:FF) instead of scanning by name
    #[arg(long, conflicts_with = "name")]
    mac: Option<String>,

    /// Advertised name to scan for
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Read and print the current relay bitmask
    #[arg(long)]
    read: bool,

    /// Explicit bitmask (0..3) to write; wins over --r1/--r2
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    set_bits: Option<u8>,

    /// Set relay 1
    #[arg(long, value_enum)]
    r1: Option<StateArg>,

    /// Set relay 2
    #[arg(long, value_enum)]
    r2: Option<StateArg>,

    /// Read the current mask first and only modify the specified relays
    #[arg(long)]
    read_first: bool,

    /// Read after writing to confirm
    #[arg(long)]
    read_back: bool,

    /// List nearby BLE advertisements and exit
    #[arg(long, conflicts_with_all = ["relay", "read", "set_bits", "r1", "r2"])]
    scan: bool,

    /// Scan timeout in seconds
    #[arg(long, default_value_t = 6.0)]
    scan_timeout: f64,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 7.5)]
    conn_timeout: f64,

    /// Write attempts before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds between write attempts
    #[arg(long, default_value_t = 0.8)]
    backoff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RelayArg {
    R1,
    R2,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StateArg {
    On,
    Off,
}

impl From<StateArg> for RelayState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::On => RelayState::On,
            StateArg::Off => RelayState::Off,
        }
    }
}

/// Per-relay overrides with the positional shorthand folded in.
fn relay_overrides(cli: &Cli) -> (Option<RelayState>, Option<RelayState>) {
    match (cli.relay, cli.state) {
        (Some(RelayArg::R1), Some(state)) => (Some(state.into()), None),
        (Some(RelayArg::R2), Some(state)) => (None, Some(state.into())),
        (Some(RelayArg::Both), Some(state)) => (Some(state.into()), Some(state.into())),
        _ => (cli.r1.map(Into::into), cli.r2.map(Into::into)),
    }
}

fn wants_write(cli: &Cli) -> bool {
    cli.set_bits.is_some() || cli.r1.is_some() || cli.r2.is_some() || cli.relay.is_some()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted.");
            130
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.scan {
        return scan_devices(&cli).await;
    }

    if !cli.read && !wants_write(&cli) {
        return Err(
            "nothing to do: pass --read, --scan, --set-bits, --r1/--r2 or a relay/state pair"
                .into(),
        );
    }

    let conn_timeout = Duration::from_secs_f64(cli.conn_timeout);
    let device = resolve_device(&cli).await?;

    // Pure read: --read with no write-shaped arguments.
    if cli.read && !wants_write(&cli) {
        let mask = ble::read_mask(&device, conn_timeout).await?;
        println!("Relay bitmask: {mask}");
        return Ok(());
    }

    let mut current = RelayMask::OFF;
    if cli.read_first {
        match ble::read_mask(&device, conn_timeout).await {
            Ok(mask) => {
                current = mask;
                println!("Current bitmask: {mask}");
            }
            Err(e) => {
                eprintln!("Warning: read-first failed, assuming both relays off: {e}");
            }
        }
    }

    let (r1, r2) = relay_overrides(&cli);
    let target = compose(current, r1, r2, cli.set_bits);

    if cli.read_first && target == current {
        println!("Already {target}, nothing to write.");
        return Ok(());
    }

    write_with_retries(&cli, &device, target, conn_timeout).await
}

async fn resolve_device(cli: &Cli) -> Result<Peripheral, Box<dyn std::error::Error>> {
    let target = match &cli.mac {
        Some(mac) => Target::Address(mac.clone()),
        None => Target::Name(cli.name.clone()),
    };

    println!("Looking for {target} ({}s scan)...", cli.scan_timeout);
    let adapter = ble::adapter().await?;
    let device = ble::find_device(&adapter, &target, Duration::from_secs_f64(cli.scan_timeout))
        .await?;
    println!("Found {target}.");
    Ok(device)
}

async fn scan_devices(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for BLE devices ({}s)...", cli.scan_timeout);
    let adapter = ble::adapter().await?;
    let devices = ble::scan(&adapter, Duration::from_secs_f64(cli.scan_timeout)).await?;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("\nFound {} devices:", devices.len());
    for device in &devices {
        let name = device.name.as_deref().unwrap_or("(unnamed)");
        let rssi = device.rssi.map(|r| format!(" ({r}dBm)")).unwrap_or_default();
        let marker = if device.name.as_deref() == Some(cli.name.as_str()) {
            "  <- target"
        } else {
            ""
        };
        println!("  {} - {}{}{}", name, device.address, rssi, marker);
    }
    Ok(())
}

async fn write_with_retries(
    cli: &Cli,
    device: &Peripheral,
    target: RelayMask,
    conn_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let backoff = Duration::from_secs_f64(cli.backoff);
    let mut last_err: Option<BleError> = None;

    for attempt in 1..=cli.retries {
        match write_and_confirm(cli, device, target, conn_timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                eprintln!("Attempt {attempt}/{} failed: {e}", cli.retries);
                last_err = Some(e);
                if attempt < cli.retries {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    Err(match last_err {
        Some(e) => format!("giving up after {} attempts: {e}", cli.retries).into(),
        None => "no write attempts were made (--retries 0)".into(),
    })
}

async fn write_and_confirm(
    cli: &Cli,
    device: &Peripheral,
    target: RelayMask,
    conn_timeout: Duration,
) -> Result<(), BleError> {
    ble::write_mask(device, target, conn_timeout).await?;
    println!("Wrote {target}.");

    if cli.read_back {
        let confirmed = ble::read_mask(device, conn_timeout).await?;
        println!("Read back: {confirmed}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn positional_pair_folds_into_overrides() {
        let cli = Cli::try_parse_from(["garden-ctl", "r1", "on"]).unwrap();
        assert_eq!(relay_overrides(&cli), (Some(RelayState::On), None));

        let cli = Cli::try_parse_from(["garden-ctl", "r2", "off"]).unwrap();
        assert_eq!(relay_overrides(&cli), (None, Some(RelayState::Off)));

        let cli = Cli::try_parse_from(["garden-ctl", "both", "off"]).unwrap();
        assert_eq!(
            relay_overrides(&cli),
            (Some(RelayState::Off), Some(RelayState::Off))
        );
    }

    #[test]
    fn flag_overrides_pass_through() {
        let cli = Cli::try_parse_from(["garden-ctl", "--r1", "on"]).unwrap();
        assert_eq!(relay_overrides(&cli), (Some(RelayState::On), None));
        assert!(wants_write(&cli));
    }

    #[test]
    fn positional_relay_requires_a_state() {
        assert!(Cli::try_parse_from(["garden-ctl", "r1"]).is_err());
    }

    #[test]
    fn positional_pair_conflicts_with_write_flags() {
        assert!(Cli::try_parse_from(["garden-ctl", "r1", "on", "--set-bits", "2"]).is_err());
        assert!(Cli::try_parse_from(["garden-ctl", "r1", "on", "--r2", "off"]).is_err());
        assert!(Cli::try_parse_from(["garden-ctl", "r1", "on", "--read"]).is_err());
    }

    #[test]
    fn mac_conflicts_with_name() {
        assert!(
            Cli::try_parse_from(["garden-ctl", "--mac", "AA:BB:CC:DD:EE:FF", "--name", "X", "--read"])
                .is_err()
        );
    }

    #[test]
    fn set_bits_range_is_enforced() {
        assert!(Cli::try_parse_from(["garden-ctl", "--set-bits", "4"]).is_err());
        let cli = Cli::try_parse_from(["garden-ctl", "--set-bits", "3"]).unwrap();
        assert_eq!(cli.set_bits, Some(3));
    }

    #[test]
    fn defaults_match_the_board() {
        let cli = Cli::try_parse_from(["garden-ctl", "--read"]).unwrap();
        assert_eq!(cli.name, DEFAULT_NAME);
        assert_eq!(cli.scan_timeout, 6.0);
        assert_eq!(cli.conn_timeout, 7.5);
        assert_eq!(cli.retries, 3);
        assert_eq!(cli.backoff, 0.8);
    }

    #[test]
    fn read_alone_is_a_pure_read() {
        let cli = Cli::try_parse_from(["garden-ctl", "--read"]).unwrap();
        assert!(cli.read && !wants_write(&cli));

        let cli = Cli::try_parse_from(["garden-ctl", "--read", "--r1", "on"]).unwrap();
        assert!(cli.read && wants_write(&cli));
    }

    #[test]
    fn noop_guard_skips_the_write() {
        // read_first saw 0b10; asking for relay 2 on again composes to the
        // same mask, so nothing gets written.
        let cli = Cli::try_parse_from(["garden-ctl", "--read-first", "--r2", "on"]).unwrap();
        let current = RelayMask::from_byte(0b10);
        let (r1, r2) = relay_overrides(&cli);
        let target = compose(current, r1, r2, cli.set_bits);
        assert!(cli.read_first && target == current);
    }
}

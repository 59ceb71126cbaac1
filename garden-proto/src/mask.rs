//! The relay bitmask and how overrides compose into it.
//!
//! The board stores both relay states in a single byte: bit 0 drives
//! relay 1, bit 1 drives relay 2. Bits 2-7 are ignored by the firmware
//! and kept zero on the wire.

/// Bit driving relay 1
pub const RELAY1_BIT: u8 = 0x01;

/// Bit driving relay 2
pub const RELAY2_BIT: u8 = 0x02;

const MASK_BITS: u8 = RELAY1_BIT | RELAY2_BIT;

/// Desired state for a single relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    On,
    Off,
}

/// The 2-bit relay bitmask. Always holds a value in 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayMask(u8);

impl RelayMask {
    /// Both relays off.
    pub const OFF: RelayMask = RelayMask(0);

    /// Builds a mask from a raw byte, discarding bits 2-7.
    pub fn from_byte(byte: u8) -> Self {
        RelayMask(byte & MASK_BITS)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn relay1(self) -> bool {
        self.0 & RELAY1_BIT != 0
    }

    pub fn relay2(self) -> bool {
        self.0 & RELAY2_BIT != 0
    }

    /// The exact one-byte payload written to the characteristic.
    pub fn payload(self) -> [u8; 1] {
        [self.0]
    }

    fn with_relay(self, bit: u8, state: RelayState) -> Self {
        match state {
            RelayState::On => RelayMask(self.0 | bit),
            RelayState::Off => RelayMask(self.0 & !bit),
        }
    }
}

impl std::fmt::Display for RelayMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0b{:02b} (relay1 {}, relay2 {})",
            self.0,
            if self.relay1() { "on" } else { "off" },
            if self.relay2() { "on" } else { "off" },
        )
    }
}

/// Composes the mask to write.
///
/// An explicit `set_bits` wins outright. Otherwise each given override
/// sets or clears its own bit in `current`, leaving the other bit alone.
pub fn compose(
    current: RelayMask,
    r1: Option<RelayState>,
    r2: Option<RelayState>,
    set_bits: Option<u8>,
) -> RelayMask {
    if let Some(bits) = set_bits {
        return RelayMask::from_byte(bits);
    }
    let mut mask = current;
    if let Some(state) = r1 {
        mask = mask.with_relay(RELAY1_BIT, state);
    }
    if let Some(state) = r2 {
        mask = mask.with_relay(RELAY2_BIT, state);
    }
    mask
}

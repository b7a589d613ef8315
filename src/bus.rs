//! Light-switch message layout and the receive mailbox.
//!
//! The switch command arrives as a 4-byte frame on the vehicle bus,
//! arbitration id 0x200, nominal period 50 ms:
//!
//! ```text
//! byte 0          byte 1          byte 2          byte 3
//! ┌──────────┐    ┌────┬──────┐   ┌──────────┐    ┌──────────┐
//! │  CRC-8   │    │rsvd│ ctr  │   │ command  │    │ reserved │
//! └──────────┘    └────┴──────┘   └──────────┘    └──────────┘
//!                  hi     lo
//! ```
//!
//! The transport deposits frames into a [`FrameMailbox`] between ticks;
//! the receiver drains it at tick entry. A fresh frame always replaces a
//! stale one that was never consumed.

use crate::config::FlmConfig;
use crate::e2e::P01Config;

/// Arbitration id of the light-switch message.
pub const LIGHT_SWITCH_MSG_ID: u16 = 0x200;
/// Frame length in bytes.
pub const LIGHT_SWITCH_MSG_LEN: usize = 4;
/// Byte index carrying the switch command code.
pub const CMD_BYTE: usize = 2;

/// One received light-switch frame.
pub type LightSwitchFrame = [u8; LIGHT_SWITCH_MSG_LEN];

/// Driver switch positions as encoded in byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SwitchCommand {
    #[default]
    Off = 0,
    LowBeam = 1,
    HighBeam = 2,
    Auto = 3,
}

impl SwitchCommand {
    /// Decode a wire code; anything above `Auto` is reserved.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::LowBeam),
            2 => Some(Self::HighBeam),
            3 => Some(Self::Auto),
            _ => None,
        }
    }
}

/// E2E Profile 01 parameters of the light-switch message.
pub fn light_switch_e2e_config(cfg: &FlmConfig) -> P01Config {
    P01Config {
        data_length_bits: cfg.e2e_data_length_bits,
        data_id: cfg.e2e_data_id,
        max_delta_counter: cfg.e2e_max_delta_counter,
        max_no_new_or_repeated_data: cfg.e2e_max_no_new_data,
        counter_offset_bits: 8,
        crc_offset_bits: 0,
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Single-slot mailbox between the bus transport and the receiver tick.
///
/// At most one frame is pending; pushing before the previous frame was
/// drained overwrites it; a fresh command is always preferred to a stale
/// one. Under the cooperative tick model there is exactly one producer
/// (the transport, between ticks) and one consumer (the 10 ms band), so
/// no locking is needed.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Option<LightSwitchFrame>,
    overwrites: u32,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a frame, replacing any undrained predecessor.
    pub fn push(&mut self, frame: LightSwitchFrame) {
        if self.slot.is_some() {
            self.overwrites = self.overwrites.saturating_add(1);
        }
        self.slot = Some(frame);
    }

    /// Take the pending frame, leaving the mailbox empty.
    pub fn take(&mut self) -> Option<LightSwitchFrame> {
        self.slot.take()
    }

    /// Frames that were replaced before being consumed.
    pub fn overwrites(&self) -> u32 {
        self.overwrites
    }
}

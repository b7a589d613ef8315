//! Hardware abstraction ports and their simulated implementations.
//!
//! The control plane never touches registers directly; it talks to two
//! narrow port traits. On the bench the simulated implementations back
//! them with plain values that tests and the scenario runner inject.
//!
//! - [`AdcPort`]: 12-bit polled conversions, one ambient-light channel
//!   and one current-sense channel.
//! - [`DioPort`]: the two headlight relay lines plus a read-only
//!   feedback channel.

use log::warn;

use crate::error::HalError;

/// Full-scale value of the 12-bit converter.
pub const ADC_MAX_VALUE: u16 = 4095;

/// ADC channel assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcChannel {
    /// Ambient light sensor.
    AmbientLight = 0,
    /// Headlight current sense.
    CurrentSense = 1,
}

/// Digital output channel assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DioChannel {
    /// Low-beam relay (writable).
    LowBeam = 0,
    /// High-beam relay (writable).
    HighBeam = 1,
    /// Output-stage feedback (read-only).
    Feedback = 2,
}

/// Electrical level on a digital channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Polled ADC conversions.
pub trait AdcPort {
    /// Kick off a conversion on `channel`.
    fn start(&mut self, channel: AdcChannel);

    /// Fetch the converted value, or `AdcNotReady` while converting.
    fn read(&mut self, channel: AdcChannel) -> Result<u16, HalError>;
}

/// Digital output lines.
pub trait DioPort {
    /// Drive a writable channel; the feedback channel rejects writes.
    fn write_channel(&mut self, channel: DioChannel, level: Level) -> Result<(), HalError>;

    /// Read back a channel level.
    fn read_channel(&self, channel: DioChannel) -> Level;
}

// ---------------------------------------------------------------------------
// Simulated ADC
// ---------------------------------------------------------------------------

/// Bench ADC: conversions are instant and values come from the test or
/// the scenario runner.
#[derive(Debug)]
pub struct SimAdc {
    values: [u16; 2],
}

impl Default for SimAdc {
    fn default() -> Self {
        // Mid-range ambient, no load current: the idle bench state.
        Self {
            values: [2000, 0],
        }
    }
}

impl SimAdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a raw sample, clamped to the 12-bit range.
    pub fn set_value(&mut self, channel: AdcChannel, raw: u16) {
        self.values[channel as usize] = raw.min(ADC_MAX_VALUE);
    }
}

impl AdcPort for SimAdc {
    fn start(&mut self, _channel: AdcChannel) {
        // Simulated conversions complete instantly.
    }

    fn read(&mut self, channel: AdcChannel) -> Result<u16, HalError> {
        Ok(self.values[channel as usize])
    }
}

// ---------------------------------------------------------------------------
// Simulated DIO
// ---------------------------------------------------------------------------

/// Bench DIO: latches the commanded relay levels so tests can assert on
/// the physical output state.
#[derive(Debug, Default)]
pub struct SimDio {
    levels: [bool; 3],
}

impl SimDio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience predicate for tests.
    pub fn is_high(&self, channel: DioChannel) -> bool {
        self.levels[channel as usize]
    }
}

impl DioPort for SimDio {
    fn write_channel(&mut self, channel: DioChannel, level: Level) -> Result<(), HalError> {
        if channel == DioChannel::Feedback {
            warn!("DIO: write to read-only feedback channel rejected");
            return Err(HalError::ChannelReadOnly);
        }
        self.levels[channel as usize] = level == Level::High;
        Ok(())
    }

    fn read_channel(&self, channel: DioChannel) -> Level {
        if self.levels[channel as usize] {
            Level::High
        } else {
            Level::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_adc_clamps_to_twelve_bits() {
        let mut adc = SimAdc::new();
        adc.set_value(AdcChannel::AmbientLight, 9999);
        assert_eq!(adc.read(AdcChannel::AmbientLight), Ok(ADC_MAX_VALUE));
    }

    #[test]
    fn sim_dio_latches_levels() {
        let mut dio = SimDio::new();
        dio.write_channel(DioChannel::LowBeam, Level::High).unwrap();
        assert!(dio.is_high(DioChannel::LowBeam));
        assert!(!dio.is_high(DioChannel::HighBeam));
        dio.write_channel(DioChannel::LowBeam, Level::Low).unwrap();
        assert!(!dio.is_high(DioChannel::LowBeam));
    }

    #[test]
    fn feedback_channel_is_read_only() {
        let mut dio = SimDio::new();
        assert_eq!(
            dio.write_channel(DioChannel::Feedback, Level::High),
            Err(HalError::ChannelReadOnly)
        );
        assert_eq!(dio.read_channel(DioChannel::Feedback), Level::Low);
    }
}

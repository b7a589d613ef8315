//! Ambient light sensor conditioning and qualification.
//!
//! Turns the noisy 12-bit ADC stream into a qualified reading: a 4-sample
//! running mean, electrical screens for open and shorted sensor lines,
//! and a rate-of-change plausibility screen evaluated every fifth tick.
//! The reading only becomes valid once the averaging buffer is full.

use log::warn;

use crate::config::FlmConfig;
use crate::diagnostics::{DiagEvent, DiagnosticSink, EventStatus};
use crate::hal::{AdcChannel, AdcPort};

/// Qualification tag on the ambient signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Valid,
    Invalid,
    Timeout,
    OpenCircuit,
    ShortCircuit,
    Plausibility,
}

/// Qualified ambient light snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AmbientReading {
    /// Filtered ADC value (0..=4095).
    pub adc: u16,
    /// Derived illuminance. Coarse device linearisation: lux = adc / 4.
    pub lux: u16,
    /// True while the electrical and plausibility screens pass.
    pub valid: bool,
}

impl Default for AmbientReading {
    fn default() -> Self {
        Self {
            adc: 0,
            lux: 0,
            valid: false,
        }
    }
}

const BUFFER_CAP: usize = 8;

/// The sensor component.
pub struct AmbientSensor {
    // Averaging buffer.
    buffer: [u16; BUFFER_CAP],
    buffer_len: usize,
    index: usize,
    sample_count: usize,
    raw: u16,
    filtered: u16,

    // Rate-of-change tracking.
    previous_filtered: u16,
    rate_of_change: u16,
    rate_check_counter: u32,
    plausibility_error_count: u32,
    plausibility_fault: bool,

    status: SignalStatus,
    reading: AmbientReading,

    open_circuit_threshold: u16,
    short_circuit_threshold: u16,
    rate_limit: u16,
    rate_check_cycles: u32,
    plausibility_debounce: u32,
}

impl AmbientSensor {
    pub fn new(cfg: &FlmConfig) -> Self {
        Self {
            buffer: [0; BUFFER_CAP],
            buffer_len: cfg.adc_samples.min(BUFFER_CAP),
            index: 0,
            sample_count: 0,
            raw: 0,
            filtered: 0,
            previous_filtered: 0,
            rate_of_change: 0,
            rate_check_counter: 0,
            plausibility_error_count: 0,
            plausibility_fault: false,
            status: SignalStatus::Invalid,
            reading: AmbientReading::default(),
            open_circuit_threshold: cfg.open_circuit_threshold,
            short_circuit_threshold: cfg.short_circuit_threshold,
            rate_limit: cfg.ambient_rate_limit,
            rate_check_cycles: cfg.rate_check_cycles,
            plausibility_debounce: cfg.plausibility_debounce,
        }
    }

    /// Run one 20 ms cycle against the ambient ADC channel.
    pub fn tick(&mut self, adc: &mut dyn AdcPort, diag: &mut dyn DiagnosticSink) {
        adc.start(AdcChannel::AmbientLight);
        match adc.read(AdcChannel::AmbientLight) {
            Ok(raw) => self.raw = raw,
            // Conversion not ready: keep the previous raw sample.
            Err(_) => {}
        }

        self.apply_filter();
        let electrical = self.electrical_screen();
        self.check_plausibility();
        self.update_output(electrical);
        self.report_diag_events(diag);
    }

    /// Latest qualified reading.
    pub fn reading(&self) -> AmbientReading {
        self.reading
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    /// Filtered value irrespective of validity.
    pub fn filtered(&self) -> u16 {
        self.filtered
    }

    /// Last measured filtered-value change per check interval.
    pub fn rate_of_change(&self) -> u16 {
        self.rate_of_change
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn apply_filter(&mut self) {
        self.buffer[self.index] = self.raw;
        self.index = (self.index + 1) % self.buffer_len;
        if self.sample_count < self.buffer_len {
            self.sample_count += 1;
        }

        let sum: u32 = self.buffer[..self.sample_count]
            .iter()
            .map(|&v| u32::from(v))
            .sum();
        self.filtered = (sum / self.sample_count as u32) as u16;
    }

    /// Open / short screen, re-evaluated on every tick so the status
    /// follows the line condition.
    fn electrical_screen(&self) -> Option<SignalStatus> {
        if self.filtered < self.open_circuit_threshold {
            Some(SignalStatus::OpenCircuit)
        } else if self.filtered > self.short_circuit_threshold {
            Some(SignalStatus::ShortCircuit)
        } else {
            None
        }
    }

    /// Rate-of-change screen, evaluated every `rate_check_cycles` ticks.
    ///
    /// The debounce counter saturates at its threshold and only clears at
    /// a below-limit check interval; the fault is sticky within an
    /// interval.
    fn check_plausibility(&mut self) {
        self.rate_check_counter += 1;
        if self.rate_check_counter < self.rate_check_cycles {
            return;
        }
        self.rate_check_counter = 0;

        self.rate_of_change = self.filtered.abs_diff(self.previous_filtered);

        if self.rate_of_change > self.rate_limit {
            if self.plausibility_error_count < self.plausibility_debounce {
                self.plausibility_error_count += 1;
            }
            if self.plausibility_error_count >= self.plausibility_debounce {
                if !self.plausibility_fault {
                    warn!(
                        "ambient: implausible rate of change {} (limit {})",
                        self.rate_of_change, self.rate_limit
                    );
                }
                self.plausibility_fault = true;
            }
        } else {
            self.plausibility_error_count = 0;
            self.plausibility_fault = false;
        }

        self.previous_filtered = self.filtered;
    }

    fn update_output(&mut self, electrical: Option<SignalStatus>) {
        self.status = if let Some(fault) = electrical {
            fault
        } else if self.plausibility_fault {
            SignalStatus::Plausibility
        } else if self.sample_count >= self.buffer_len {
            SignalStatus::Valid
        } else {
            SignalStatus::Invalid
        };

        self.reading = AmbientReading {
            adc: self.filtered,
            lux: self.filtered / 4,
            valid: self.status == SignalStatus::Valid,
        };
    }

    fn report_diag_events(&self, diag: &mut dyn DiagnosticSink) {
        let report = |diag: &mut dyn DiagnosticSink, event, failed: bool| {
            diag.set_event_status(
                event,
                if failed {
                    EventStatus::Failed
                } else {
                    EventStatus::Passed
                },
            );
        };
        report(
            diag,
            DiagEvent::AmbientOpenCircuit,
            self.status == SignalStatus::OpenCircuit,
        );
        report(
            diag,
            DiagEvent::AmbientShortCircuit,
            self.status == SignalStatus::ShortCircuit,
        );
        report(diag, DiagEvent::AmbientPlausibility, self.plausibility_fault);
    }
}

//! System configuration parameters.
//!
//! All tunable parameters for the front-light-management control plane.
//! The defaults are the qualified values from the safety concept; a
//! scenario runner may override them before constructing the system.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlmConfig {
    // --- Task periods ---
    /// Main-function period for the 10 ms band (SwitchReceiver,
    /// FlmController, OutputMonitor).
    pub main_period_ms: u32,
    /// Ambient light sensor period (ms).
    pub ambient_period_ms: u32,
    /// Safety aggregator / watchdog period (ms).
    pub safety_period_ms: u32,

    // --- Safety timing ---
    /// Light-switch frame timeout (ms).
    pub frame_timeout_ms: u32,
    /// E2E supervisor not-Valid tolerance before safe state (ms).
    pub e2e_timeout_ms: u32,
    /// Fault-Tolerant Time Interval (ms).
    pub ftti_ms: u32,
    /// Worst-case safe state transition time (ms).
    pub safe_state_transition_ms: u32,

    // --- Ambient light sensor ---
    /// ADC threshold below which Auto mode turns lights on.
    pub ambient_threshold_on: u16,
    /// ADC threshold above which Auto mode turns lights off (hysteresis).
    pub ambient_threshold_off: u16,
    /// Day/night classification threshold used by the safety aggregator.
    pub day_threshold: u16,
    /// Maximum filtered-value change per rate-check interval.
    pub ambient_rate_limit: u16,
    /// ADC value below which the sensor line is considered open.
    pub open_circuit_threshold: u16,
    /// ADC value above which the sensor line is considered shorted.
    pub short_circuit_threshold: u16,
    /// Averaging window length in samples.
    pub adc_samples: usize,
    /// Rate-of-change check interval in ambient ticks.
    pub rate_check_cycles: u32,
    /// Consecutive rate violations before a plausibility fault.
    pub plausibility_debounce: u32,

    // --- Headlight output stage ---
    /// Settling window after a command change before open-load detection (ms).
    pub fault_detect_window_ms: u32,
    /// Current below this while commanded on indicates an open load (mA).
    pub open_load_threshold_ma: u16,
    /// Minimum current for the output to be observed as on (mA).
    pub min_on_current_ma: u16,
    /// Current above this indicates a short circuit (mA).
    pub overcurrent_threshold_ma: u16,
    /// Current-sense conversion factor (mA per ADC count).
    pub current_scale_factor: u16,

    // --- Error handling ---
    /// Invalid-input ticks before the controller degrades.
    pub max_consecutive_errors: u32,
    /// Concurrent faults that trigger immediate safe state.
    pub max_fault_count: u8,

    // --- E2E Profile 01 ---
    /// Protected data length in bits (CRC and counter included).
    pub e2e_data_length_bits: u16,
    /// DataID salt for the light-switch message.
    pub e2e_data_id: u16,
    /// Maximum tolerated counter jump.
    pub e2e_max_delta_counter: u8,
    /// Check cycles without new data before NoNewData.
    pub e2e_max_no_new_data: u16,
}

impl Default for FlmConfig {
    fn default() -> Self {
        Self {
            // Task periods
            main_period_ms: 10,
            ambient_period_ms: 20,
            safety_period_ms: 5,

            // Safety timing
            frame_timeout_ms: 50,
            e2e_timeout_ms: 100,
            ftti_ms: 200,
            safe_state_transition_ms: 100,

            // Ambient light
            ambient_threshold_on: 800,
            ambient_threshold_off: 1000,
            day_threshold: 1500,
            ambient_rate_limit: 500,
            open_circuit_threshold: 100,
            short_circuit_threshold: 3995,
            adc_samples: 4,
            rate_check_cycles: 5,
            plausibility_debounce: 3,

            // Output stage
            fault_detect_window_ms: 20,
            open_load_threshold_ma: 50,
            min_on_current_ma: 100,
            overcurrent_threshold_ma: 15_000,
            current_scale_factor: 10,

            // Error handling
            max_consecutive_errors: 3,
            max_fault_count: 3,

            // E2E
            e2e_data_length_bits: 32,
            e2e_data_id: 0x0100,
            e2e_max_delta_counter: 2,
            e2e_max_no_new_data: 5,
        }
    }
}

impl FlmConfig {
    /// Frame timeout expressed in 10 ms receiver ticks.
    pub fn frame_timeout_cycles(&self) -> u32 {
        self.frame_timeout_ms / self.main_period_ms
    }

    /// Open-load / short confirm count in 10 ms output ticks.
    pub fn fault_confirm_cycles(&self) -> u32 {
        self.fault_detect_window_ms / self.main_period_ms
    }

    /// Time the controller may linger in Degraded before Safe (ms).
    pub fn degraded_timeout_ms(&self) -> u32 {
        self.ftti_ms - self.safe_state_transition_ms
    }

    /// Check the cross-parameter invariants the timing concept relies on.
    ///
    /// Returns a typed error without touching any component state, so a
    /// bad override can never half-configure a running system.
    pub fn validate(&self) -> Result<()> {
        if self.ambient_threshold_on >= self.ambient_threshold_off {
            return Err(Error::Config("ON threshold must be below OFF threshold"));
        }
        if self.safe_state_transition_ms > self.ftti_ms {
            return Err(Error::Config("safe state transition must fit in FTTI"));
        }
        if self.e2e_timeout_ms >= self.ftti_ms {
            return Err(Error::Config("E2E timeout must be below FTTI"));
        }
        if self.frame_timeout_ms >= self.e2e_timeout_ms {
            return Err(Error::Config("frame timeout must be below E2E timeout"));
        }
        if self.open_circuit_threshold >= self.short_circuit_threshold {
            return Err(Error::Config(
                "open circuit threshold must be below short circuit",
            ));
        }
        if self.adc_samples == 0 {
            return Err(Error::Config("averaging window must not be empty"));
        }
        if self.main_period_ms == 0 || self.safety_period_ms == 0 || self.ambient_period_ms == 0 {
            return Err(Error::Config("task periods must be non-zero"));
        }
        Ok(())
    }
}

//! Shared context threaded through every controller state handler.
//!
//! One struct the handlers read inputs from and write the headlight
//! command into: the latest switch report and ambient reading, timing,
//! configuration, the hysteresis memory, and the external safe-state
//! trigger.

use crate::ambient::AmbientReading;
use crate::config::FlmConfig;
use crate::switch_rx::SwitchReport;

/// Output toward the headlight output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadlightCommand {
    #[default]
    Off,
    LowBeam,
    HighBeam,
}

/// The shared context passed to every state handler function.
pub struct FlmContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Duration of one tick (ms).
    pub tick_period_ms: u32,
    /// Wall-clock instant (ms since init) the current state was entered.
    pub state_entry_time_ms: u32,

    // -- Inputs, snapshotted before each tick --
    pub switch: SwitchReport,
    pub ambient: AmbientReading,

    // -- Output --
    pub headlight_command: HeadlightCommand,

    // -- Hysteresis memory for Auto mode --
    /// Last commanded-on state; gives the asymmetric thresholds their
    /// memory.
    pub lights_currently_on: bool,

    // -- Error tracking --
    /// Consecutive ticks with at least one invalid input while Normal.
    pub consecutive_errors: u32,

    // -- External safety --
    /// Latched request from the safety aggregator; forces Safe.
    pub safe_state_trigger: bool,

    pub config: FlmConfig,
}

impl FlmContext {
    pub fn new(config: FlmConfig) -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            tick_period_ms: config.main_period_ms,
            state_entry_time_ms: 0,
            switch: SwitchReport::default(),
            ambient: AmbientReading::default(),
            headlight_command: HeadlightCommand::Off,
            lights_currently_on: false,
            consecutive_errors: 0,
            safe_state_trigger: false,
            config,
        }
    }

    /// Milliseconds spent in the current state.
    pub fn ms_in_state(&self) -> u32 {
        (self.ticks_in_state as u32).saturating_mul(self.tick_period_ms)
    }

    pub fn all_inputs_valid(&self) -> bool {
        self.switch.valid && self.ambient.valid
    }

    pub fn any_input_invalid(&self) -> bool {
        !self.all_inputs_valid()
    }
}

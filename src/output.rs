//! Headlight output stage driver and load diagnosis.
//!
//! Drives the two relay lines for the commanded beam pattern and
//! classifies the electrical behaviour of the load from the current-sense
//! channel. Open-load detection waits out a settling window after every
//! command change; overcurrent detection runs unconditionally and
//! de-energises both lines the instant a short is confirmed; that
//! protective latch overrides every later command until re-init.

use log::{error, warn};

use crate::config::FlmConfig;
use crate::diagnostics::{DiagEvent, DiagnosticSink, EventStatus};
use crate::flm::context::HeadlightCommand;
use crate::hal::{AdcChannel, AdcPort, DioChannel, DioPort, Level};

/// Load classification. Confirmed faults latch until component re-init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFault {
    #[default]
    None,
    /// Commanded on but no current flows.
    OpenLoad,
    /// Confirmed short circuit; outputs forced off.
    Short,
    /// Overcurrent observed but not yet confirmed.
    Overcurrent,
}

/// Published output-stage snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputStatus {
    /// True when the sensed current says the lamps are actually lit.
    pub output_on: bool,
    /// Sensed load current (mA).
    pub current_ma: u32,
    pub fault: OutputFault,
}

/// The output monitor component.
pub struct OutputMonitor {
    requested: HeadlightCommand,
    current_cmd: HeadlightCommand,

    now_ms: u32,
    period_ms: u32,
    command_change_ms: u32,

    current_ma: u32,
    output_on: bool,

    fault: OutputFault,
    open_load_counter: u32,
    short_counter: u32,
    fault_confirmed: bool,
    /// Protective shutoff after a confirmed short.
    outputs_forced_off: bool,

    fault_detect_window_ms: u32,
    fault_confirm_cycles: u32,
    open_load_threshold_ma: u32,
    min_on_current_ma: u32,
    overcurrent_threshold_ma: u32,
    scale_factor: u32,
}

impl OutputMonitor {
    pub fn new(cfg: &FlmConfig) -> Self {
        Self {
            requested: HeadlightCommand::Off,
            current_cmd: HeadlightCommand::Off,
            now_ms: 0,
            period_ms: cfg.main_period_ms,
            command_change_ms: 0,
            current_ma: 0,
            output_on: false,
            fault: OutputFault::None,
            open_load_counter: 0,
            short_counter: 0,
            fault_confirmed: false,
            outputs_forced_off: false,
            fault_detect_window_ms: cfg.fault_detect_window_ms,
            fault_confirm_cycles: cfg.fault_confirm_cycles(),
            open_load_threshold_ma: u32::from(cfg.open_load_threshold_ma),
            min_on_current_ma: u32::from(cfg.min_on_current_ma),
            overcurrent_threshold_ma: u32::from(cfg.overcurrent_threshold_ma),
            scale_factor: u32::from(cfg.current_scale_factor),
        }
    }

    /// Run one 10 ms cycle for the freshly arrived command.
    pub fn tick(
        &mut self,
        command: HeadlightCommand,
        adc: &mut dyn AdcPort,
        dio: &mut dyn DioPort,
        diag: &mut dyn DiagnosticSink,
    ) {
        self.now_ms = self.now_ms.wrapping_add(self.period_ms);
        self.requested = command;

        self.set_outputs(dio);
        self.read_feedback(adc);
        self.check_open_load();
        self.check_short_circuit(dio);
        self.update_fault_status();
        self.report_diag_events(diag);

        self.current_cmd = self.requested;
    }

    /// Latest published snapshot.
    pub fn status(&self) -> OutputStatus {
        OutputStatus {
            output_on: self.output_on,
            current_ma: self.current_ma,
            fault: self.fault,
        }
    }

    pub fn fault(&self) -> OutputFault {
        self.fault
    }

    /// Clear latched faults and release the protective shutoff. Only the
    /// boot/mode manager calls this, on a full component re-init.
    pub fn reinit(&mut self) {
        self.fault = OutputFault::None;
        self.open_load_counter = 0;
        self.short_counter = 0;
        self.fault_confirmed = false;
        self.outputs_forced_off = false;
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn set_outputs(&mut self, dio: &mut dyn DioPort) {
        // The protective latch wins over every commanded pattern.
        let (low, high) = if self.outputs_forced_off {
            (Level::Low, Level::Low)
        } else {
            match self.requested {
                HeadlightCommand::Off => (Level::Low, Level::Low),
                HeadlightCommand::LowBeam => (Level::High, Level::Low),
                HeadlightCommand::HighBeam => (Level::High, Level::High),
            }
        };
        let _ = dio.write_channel(DioChannel::LowBeam, low);
        let _ = dio.write_channel(DioChannel::HighBeam, high);

        if self.requested != self.current_cmd {
            self.command_change_ms = self.now_ms;
        }
    }

    fn read_feedback(&mut self, adc: &mut dyn AdcPort) {
        adc.start(AdcChannel::CurrentSense);
        if let Ok(raw) = adc.read(AdcChannel::CurrentSense) {
            self.current_ma = u32::from(raw) * self.scale_factor;
        }
        self.output_on = self.current_ma >= self.min_on_current_ma;
    }

    fn check_open_load(&mut self) {
        if self.requested == HeadlightCommand::Off {
            self.open_load_counter = 0;
            return;
        }

        // Let the filament inrush settle before judging the load.
        if self.now_ms.wrapping_sub(self.command_change_ms) < self.fault_detect_window_ms {
            return;
        }

        if self.current_ma < self.open_load_threshold_ma {
            self.open_load_counter += 1;
            if self.open_load_counter >= self.fault_confirm_cycles && !self.fault_confirmed {
                warn!("output: open load confirmed ({} mA)", self.current_ma);
                self.fault = OutputFault::OpenLoad;
                self.fault_confirmed = true;
            }
        } else if !self.fault_confirmed {
            self.open_load_counter = 0;
        }
    }

    fn check_short_circuit(&mut self, dio: &mut dyn DioPort) {
        if self.current_ma > self.overcurrent_threshold_ma {
            self.short_counter += 1;
            if self.short_counter >= self.fault_confirm_cycles {
                if !self.outputs_forced_off {
                    error!(
                        "output: short circuit confirmed ({} mA), outputs de-energised",
                        self.current_ma
                    );
                }
                self.fault = OutputFault::Short;
                self.fault_confirmed = true;
                self.outputs_forced_off = true;
                let _ = dio.write_channel(DioChannel::LowBeam, Level::Low);
                let _ = dio.write_channel(DioChannel::HighBeam, Level::Low);
            } else if self.fault == OutputFault::None {
                // Seen but not yet confirmed.
                self.fault = OutputFault::Overcurrent;
            }
        } else {
            self.short_counter = 0;
            if self.fault == OutputFault::Overcurrent {
                self.fault = OutputFault::None;
            }
        }
    }

    fn update_fault_status(&mut self) {
        // Unconfirmed observations decay once both counters are clear;
        // confirmed faults stay until reinit.
        if self.open_load_counter == 0 && self.short_counter == 0 && !self.fault_confirmed {
            self.fault = OutputFault::None;
        }
    }

    fn report_diag_events(&self, diag: &mut dyn DiagnosticSink) {
        diag.set_event_status(
            DiagEvent::HeadlightOpenLoad,
            if self.fault == OutputFault::OpenLoad {
                EventStatus::Failed
            } else {
                EventStatus::Passed
            },
        );
        diag.set_event_status(
            DiagEvent::HeadlightShortCircuit,
            if self.fault == OutputFault::Short {
                EventStatus::Failed
            } else {
                EventStatus::Passed
            },
        );
    }
}

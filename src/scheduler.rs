//! Cooperative tick scheduler and system assembly.
//!
//! A 1 ms system tick dispatches three bands, run-to-completion and in
//! fixed order, mirroring the task layout of the target ECU:
//!
//! ```text
//! every  5 ms │ SafetyAggregator, watchdog housekeeping
//! every 10 ms │ mailbox drain → SwitchReceiver → FlmController → OutputMonitor
//! every 20 ms │ AmbientSensor
//! ```
//!
//! The aggregator runs first within a tick, so it always judges the
//! state published by the end of the previous tick, never mid-tick
//! work. Within the 10 ms band the declared order guarantees the
//! controller sees the freshest validated command and the output stage
//! the freshest controller command.
//!
//! [`FlmSystem`] owns every component plus the simulated HAL; tests and
//! the scenario runner inject frames, ADC values and watchdog verdicts
//! through it.

use std::time::Instant;

use log::error;

use crate::ambient::{AmbientReading, AmbientSensor};
use crate::bus::{FrameMailbox, LightSwitchFrame};
use crate::config::FlmConfig;
use crate::diagnostics::DiagnosticLog;
use crate::error::Result;
use crate::flm::context::HeadlightCommand;
use crate::flm::{FlmController, FlmState};
use crate::hal::{AdcChannel, SimAdc, SimDio};
use crate::output::{OutputMonitor, OutputStatus};
use crate::safety::{AggregatorInputs, SafetyAggregator, SafetyStatus, SafeStateReason};
use crate::switch_rx::{SwitchReceiver, SwitchReport};
use crate::watchdog::{Entity, GlobalStatus, WatchdogManager};

/// Budget for the 5 ms band handlers.
const DEADLINE_5MS_BAND_MS: u128 = 5;
/// Budget for the 10 ms and 20 ms band handlers.
const DEADLINE_10MS_BAND_MS: u128 = 3;

/// The assembled system.
pub struct FlmSystem {
    config: FlmConfig,
    tick_ms: u64,

    // Simulated HAL, written by tests / the scenario runner.
    adc: SimAdc,
    dio: SimDio,
    mailbox: FrameMailbox,

    // Components, each the single owner of its state record.
    switch_rx: SwitchReceiver,
    ambient: AmbientSensor,
    controller: FlmController,
    output: OutputMonitor,
    aggregator: SafetyAggregator,
    watchdog: WatchdogManager,
    diag: DiagnosticLog,

    deadline_violations: u32,
}

impl FlmSystem {
    /// Build a system from a validated configuration.
    pub fn new(config: FlmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            switch_rx: SwitchReceiver::new(&config),
            ambient: AmbientSensor::new(&config),
            controller: FlmController::new(&config),
            output: OutputMonitor::new(&config),
            aggregator: SafetyAggregator::new(&config),
            watchdog: WatchdogManager::new(config.safety_period_ms),
            diag: DiagnosticLog::new(),
            adc: SimAdc::new(),
            dio: SimDio::new(),
            mailbox: FrameMailbox::new(),
            tick_ms: 0,
            deadline_violations: 0,
            config,
        })
    }

    /// Advance the system by one 1 ms tick.
    pub fn tick_1ms(&mut self) {
        self.tick_ms += 1;

        if self.tick_ms % u64::from(self.config.safety_period_ms) == 0 {
            self.run_5ms_band();
        }
        if self.tick_ms % u64::from(self.config.main_period_ms) == 0 {
            self.run_10ms_band();
        }
        if self.tick_ms % u64::from(self.config.ambient_period_ms) == 0 {
            self.run_20ms_band();
        }
    }

    /// Advance by `ms` milliseconds of simulated time.
    pub fn run_for_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.tick_1ms();
        }
    }

    // -----------------------------------------------------------------------
    // Input injection
    // -----------------------------------------------------------------------

    /// Deposit a light-switch frame, as the bus transport would between
    /// ticks.
    pub fn submit_frame(&mut self, frame: LightSwitchFrame) {
        self.mailbox.push(frame);
    }

    /// Inject the ambient-light ADC sample.
    pub fn set_ambient_adc(&mut self, raw: u16) {
        self.adc.set_value(AdcChannel::AmbientLight, raw);
    }

    /// Inject the current-sense ADC sample (raw counts; 10 mA/LSB).
    pub fn set_current_adc(&mut self, raw: u16) {
        self.adc.set_value(AdcChannel::CurrentSense, raw);
    }

    /// Inject the sensed load current directly, in milliamps.
    pub fn set_load_current_ma(&mut self, ma: u32) {
        let raw = (ma / u32::from(self.config.current_scale_factor)).min(4095) as u16;
        self.adc.set_value(AdcChannel::CurrentSense, raw);
    }

    /// Bench override of the watchdog verdict.
    pub fn force_watchdog_status(&mut self, status: Option<GlobalStatus>) {
        self.watchdog.force_global_status(status);
    }

    /// Operator-initiated safe state (shell `stop` path).
    pub fn request_manual_safe_state(&mut self) {
        self.aggregator.trigger_safe_state(SafeStateReason::Manual);
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &FlmConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn flm_state(&self) -> FlmState {
        self.controller.current_state()
    }

    pub fn headlight_command(&self) -> HeadlightCommand {
        self.controller.ctx.headlight_command
    }

    pub fn switch_report(&self) -> SwitchReport {
        self.switch_rx.report()
    }

    pub fn ambient_reading(&self) -> AmbientReading {
        self.ambient.reading()
    }

    pub fn output_status(&self) -> OutputStatus {
        self.output.status()
    }

    pub fn global_status(&self) -> SafetyStatus {
        self.aggregator.global_status()
    }

    pub fn safe_state_reason(&self) -> SafeStateReason {
        self.aggregator.reason()
    }

    pub fn is_in_safe_state(&self) -> bool {
        self.aggregator.is_in_safe_state()
    }

    /// Physical relay levels, for end-to-end assertions.
    pub fn dio(&self) -> &SimDio {
        &self.dio
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diag
    }

    pub fn deadline_violations(&self) -> u32 {
        self.deadline_violations
    }

    // -----------------------------------------------------------------------
    // Bands
    // -----------------------------------------------------------------------

    fn run_5ms_band(&mut self) {
        let started = Instant::now();

        self.watchdog.checkpoint_reached(Entity::SafetyAggregator);
        let inputs = AggregatorInputs {
            switch_valid: self.switch_rx.report().valid,
            e2e_supervisor: self.switch_rx.supervisor_status(),
            ambient: self.ambient.reading(),
            flm_state: self.controller.current_state(),
            output_fault: self.output.fault(),
            wdg_status: self.watchdog.global_status(),
        };
        self.aggregator.tick(&inputs, &mut self.diag);

        // Level-propagate the latch; the controller re-checks it at the
        // top of its own tick.
        if self.aggregator.is_in_safe_state() {
            self.controller.trigger_safe_state();
        }

        self.watchdog.main_function();

        self.enforce_deadline(started, DEADLINE_5MS_BAND_MS, "5ms");
    }

    fn run_10ms_band(&mut self) {
        let started = Instant::now();

        // Serial RX demux: hand the pending frame to the receiver.
        if let Some(frame) = self.mailbox.take() {
            self.switch_rx.submit_frame(frame);
        }

        self.watchdog.checkpoint_reached(Entity::SwitchReceiver);
        self.switch_rx.tick(&mut self.diag);

        self.watchdog.checkpoint_reached(Entity::FlmController);
        self.controller.ctx.switch = self.switch_rx.report();
        self.controller.ctx.ambient = self.ambient.reading();
        self.controller.tick();

        self.watchdog.checkpoint_reached(Entity::OutputMonitor);
        let command = self.controller.ctx.headlight_command;
        self.output
            .tick(command, &mut self.adc, &mut self.dio, &mut self.diag);

        self.enforce_deadline(started, DEADLINE_10MS_BAND_MS, "10ms");
    }

    fn run_20ms_band(&mut self) {
        let started = Instant::now();

        self.watchdog.checkpoint_reached(Entity::AmbientSensor);
        self.ambient.tick(&mut self.adc, &mut self.diag);

        self.enforce_deadline(started, DEADLINE_10MS_BAND_MS, "20ms");
    }

    /// A band overrunning its budget is a scheduling fault, not a
    /// recoverable hiccup.
    fn enforce_deadline(&mut self, started: Instant, budget_ms: u128, band: &str) {
        let elapsed = started.elapsed().as_millis();
        if elapsed > budget_ms {
            self.deadline_violations += 1;
            error!("{band} band overran its deadline: {elapsed} ms > {budget_ms} ms");
            debug_assert!(elapsed <= budget_ms, "{band} band deadline violation");
        }
    }
}

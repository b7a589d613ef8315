//! Safety aggregator.
//!
//! Runs every 5 ms, **before** the 10/20 ms bands, so it always judges
//! the state the components published by the end of the previous tick.
//! It fuses the per-component fault signals into one global posture,
//! enforces the FTTI, and latches the system into its safe state when a
//! trigger condition holds. The latch has no exit path this power cycle.
//!
//! ## Trigger conditions
//!
//! 1. Fault count reaches the multi-fault limit (immediate).
//! 2. Watchdog global status Failed or Expired (immediate).
//! 3. E2E supervisor not Valid for 100 ms (sustained).
//! 4. Any fault active for the full 200 ms FTTI (sustained).

use log::{error, info};

use crate::ambient::AmbientReading;
use crate::config::FlmConfig;
use crate::diagnostics::{DiagEvent, DiagnosticSink, EventStatus};
use crate::e2e::SmStatus;
use crate::flm::context::HeadlightCommand;
use crate::flm::FlmState;
use crate::output::OutputFault;
use crate::watchdog::GlobalStatus as WdgStatus;

/// Why the safe state latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafeStateReason {
    #[default]
    None,
    /// E2E supervisor stayed invalid past its tolerance.
    E2eFailure,
    /// Watchdog supervision failed or expired.
    WdgmFailure,
    /// Too many concurrent faults.
    MultiFault,
    /// A fault outlived the FTTI.
    Timeout,
    /// Operator or boot manager request.
    Manual,
}

/// Fused system posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyStatus {
    Ok,
    Warning,
    Degraded,
    SafeState,
}

/// Snapshot of the component outputs the aggregator judges each tick.
/// The scheduler copies these by value at the read point.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorInputs {
    pub switch_valid: bool,
    pub e2e_supervisor: SmStatus,
    pub ambient: AmbientReading,
    pub flm_state: FlmState,
    pub output_fault: OutputFault,
    pub wdg_status: WdgStatus,
}

/// The aggregator component.
pub struct SafetyAggregator {
    now_ms: u32,
    period_ms: u32,

    // Per-component fault mirror of the last judged tick.
    switch_fault: bool,
    ambient_fault: bool,
    output_fault: bool,
    wdg_fault: bool,
    fault_count: u8,

    // FTTI bookkeeping.
    ftti_armed: bool,
    first_fault_ms: u32,

    // E2E sustained-invalid bookkeeping.
    e2e_timer_armed: bool,
    e2e_invalid_since_ms: u32,

    // Safe-state latch.
    in_safe_state: bool,
    reason: SafeStateReason,
    safe_state_entry_ms: u32,

    is_daytime: bool,
    global_status: SafetyStatus,
    safe_command: HeadlightCommand,

    ftti_ms: u32,
    e2e_timeout_ms: u32,
    max_fault_count: u8,
    day_threshold: u16,
}

impl SafetyAggregator {
    pub fn new(cfg: &FlmConfig) -> Self {
        Self {
            now_ms: 0,
            period_ms: cfg.safety_period_ms,
            switch_fault: false,
            ambient_fault: false,
            output_fault: false,
            wdg_fault: false,
            fault_count: 0,
            ftti_armed: false,
            first_fault_ms: 0,
            e2e_timer_armed: false,
            e2e_invalid_since_ms: 0,
            in_safe_state: false,
            reason: SafeStateReason::None,
            safe_state_entry_ms: 0,
            // Assume daylight until the sensor says otherwise.
            is_daytime: true,
            global_status: SafetyStatus::Ok,
            safe_command: HeadlightCommand::Off,
            ftti_ms: cfg.ftti_ms,
            e2e_timeout_ms: cfg.e2e_timeout_ms,
            max_fault_count: cfg.max_fault_count,
            day_threshold: cfg.day_threshold,
        }
    }

    /// Run one 5 ms cycle over the previous tick's published state.
    pub fn tick(&mut self, inputs: &AggregatorInputs, diag: &mut dyn DiagnosticSink) {
        self.now_ms = self.now_ms.wrapping_add(self.period_ms);

        self.classify_day_night(&inputs.ambient);
        self.count_faults(inputs);
        self.check_ftti();
        self.check_immediate_triggers(inputs);
        self.update_global_status();

        if self.in_safe_state {
            self.safe_command = if self.is_daytime {
                HeadlightCommand::Off
            } else {
                HeadlightCommand::LowBeam
            };
        }

        self.report_diag_events(diag);
    }

    /// Latch the safe state. Idempotent: the first call wins and captures
    /// the reason; later calls are ignored.
    pub fn trigger_safe_state(&mut self, reason: SafeStateReason) {
        if self.in_safe_state {
            return;
        }
        self.in_safe_state = true;
        self.reason = reason;
        self.safe_state_entry_ms = self.now_ms;
        self.global_status = SafetyStatus::SafeState;
        error!("SAFE STATE latched: {:?} at t={} ms", reason, self.now_ms);
    }

    pub fn is_in_safe_state(&self) -> bool {
        self.in_safe_state
    }

    pub fn reason(&self) -> SafeStateReason {
        self.reason
    }

    pub fn global_status(&self) -> SafetyStatus {
        self.global_status
    }

    /// Headlight command to apply while in safe state.
    pub fn safe_state_command(&self) -> HeadlightCommand {
        self.safe_command
    }

    pub fn fault_count(&self) -> u8 {
        self.fault_count
    }

    pub fn is_daytime(&self) -> bool {
        self.is_daytime
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Day iff the ambient sensor is trustworthy and bright; otherwise
    /// keep the previous classification.
    fn classify_day_night(&mut self, ambient: &AmbientReading) {
        if ambient.valid {
            let day = ambient.adc > self.day_threshold;
            if day != self.is_daytime {
                info!("day/night: now {}", if day { "day" } else { "night" });
            }
            self.is_daytime = day;
        }
    }

    fn count_faults(&mut self, inputs: &AggregatorInputs) {
        self.switch_fault = !inputs.switch_valid;
        self.ambient_fault = !inputs.ambient.valid;
        self.output_fault = inputs.output_fault != OutputFault::None;
        self.wdg_fault = inputs.wdg_status != WdgStatus::Ok;

        let count = u8::from(self.switch_fault)
            + u8::from(self.ambient_fault)
            + u8::from(self.output_fault)
            + u8::from(self.wdg_fault);

        // Arm the FTTI timer on the clean->faulty edge.
        if count > 0 && self.fault_count == 0 {
            self.first_fault_ms = self.now_ms;
            self.ftti_armed = true;
        }
        if count == 0 {
            self.ftti_armed = false;
        }
        self.fault_count = count;
    }

    fn check_ftti(&mut self) {
        if !self.ftti_armed {
            return;
        }
        if self.now_ms.wrapping_sub(self.first_fault_ms) >= self.ftti_ms {
            self.trigger_safe_state(SafeStateReason::Timeout);
        }
    }

    fn check_immediate_triggers(&mut self, inputs: &AggregatorInputs) {
        // Priority order: multi-fault, watchdog, sustained E2E loss.
        if self.fault_count >= self.max_fault_count {
            self.trigger_safe_state(SafeStateReason::MultiFault);
        }

        if matches!(inputs.wdg_status, WdgStatus::Failed | WdgStatus::Expired) {
            self.trigger_safe_state(SafeStateReason::WdgmFailure);
        }

        if inputs.e2e_supervisor != SmStatus::Valid {
            if !self.e2e_timer_armed {
                self.e2e_timer_armed = true;
                self.e2e_invalid_since_ms = self.now_ms;
            } else if self.now_ms.wrapping_sub(self.e2e_invalid_since_ms) >= self.e2e_timeout_ms {
                self.trigger_safe_state(SafeStateReason::E2eFailure);
            }
        } else {
            self.e2e_timer_armed = false;
        }
    }

    fn update_global_status(&mut self) {
        self.global_status = if self.in_safe_state {
            SafetyStatus::SafeState
        } else if self.fault_count >= 2 {
            SafetyStatus::Degraded
        } else if self.fault_count == 1 {
            SafetyStatus::Warning
        } else {
            SafetyStatus::Ok
        };
    }

    fn report_diag_events(&self, diag: &mut dyn DiagnosticSink) {
        diag.set_event_status(
            DiagEvent::WatchdogSupervision,
            if self.wdg_fault {
                EventStatus::Failed
            } else {
                EventStatus::Passed
            },
        );
        if self.in_safe_state {
            diag.set_event_status(DiagEvent::SafeStateEntered, EventStatus::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLog;

    fn nominal_inputs() -> AggregatorInputs {
        AggregatorInputs {
            switch_valid: true,
            e2e_supervisor: SmStatus::Valid,
            ambient: AmbientReading {
                adc: 2000,
                lux: 500,
                valid: true,
            },
            flm_state: FlmState::Normal,
            output_fault: OutputFault::None,
            wdg_status: WdgStatus::Ok,
        }
    }

    fn make_aggregator() -> (SafetyAggregator, DiagnosticLog) {
        (
            SafetyAggregator::new(&FlmConfig::default()),
            DiagnosticLog::new(),
        )
    }

    #[test]
    fn clean_inputs_report_ok() {
        let (mut agg, mut diag) = make_aggregator();
        for _ in 0..50 {
            agg.tick(&nominal_inputs(), &mut diag);
        }
        assert_eq!(agg.global_status(), SafetyStatus::Ok);
        assert!(!agg.is_in_safe_state());
        assert_eq!(agg.fault_count(), 0);
    }

    #[test]
    fn single_fault_is_a_warning() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.switch_valid = false;
        agg.tick(&inputs, &mut diag);
        assert_eq!(agg.global_status(), SafetyStatus::Warning);
    }

    #[test]
    fn two_faults_are_degraded() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.switch_valid = false;
        inputs.ambient.valid = false;
        // Ambient invalid also suppresses day reclassification.
        agg.tick(&inputs, &mut diag);
        assert_eq!(agg.global_status(), SafetyStatus::Degraded);
        assert!(!agg.is_in_safe_state());
    }

    #[test]
    fn three_faults_latch_multi_fault_within_one_tick() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.switch_valid = false;
        inputs.ambient.valid = false;
        inputs.output_fault = OutputFault::OpenLoad;
        agg.tick(&inputs, &mut diag);
        assert!(agg.is_in_safe_state());
        assert_eq!(agg.reason(), SafeStateReason::MultiFault);
        assert_eq!(agg.global_status(), SafetyStatus::SafeState);
        assert!(diag.is_failed(DiagEvent::SafeStateEntered));
    }

    #[test]
    fn watchdog_failure_latches_immediately() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.wdg_status = WdgStatus::Expired;
        agg.tick(&inputs, &mut diag);
        assert!(agg.is_in_safe_state());
        assert_eq!(agg.reason(), SafeStateReason::WdgmFailure);
    }

    #[test]
    fn e2e_invalid_must_be_sustained_for_100ms() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.e2e_supervisor = SmStatus::Invalid;
        // E2E loss alone also flips switch_valid in practice; keep the
        // switch flagged so only one fault is active.
        inputs.switch_valid = false;

        // 100 ms at 5 ms per tick = 20 ticks; the timer arms on the
        // first tick, so the deadline hits on tick 21.
        for _ in 0..20 {
            agg.tick(&inputs, &mut diag);
            assert!(!agg.is_in_safe_state());
        }
        agg.tick(&inputs, &mut diag);
        assert!(agg.is_in_safe_state());
        assert_eq!(agg.reason(), SafeStateReason::E2eFailure);
    }

    #[test]
    fn e2e_recovery_disarms_the_timer() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.e2e_supervisor = SmStatus::Invalid;
        inputs.switch_valid = false;
        for _ in 0..15 {
            agg.tick(&inputs, &mut diag);
        }

        let healthy = nominal_inputs();
        for _ in 0..10 {
            agg.tick(&healthy, &mut diag);
        }
        // A fresh invalid phase starts the 100 ms budget over.
        inputs = nominal_inputs();
        inputs.e2e_supervisor = SmStatus::Invalid;
        inputs.switch_valid = false;
        for _ in 0..15 {
            agg.tick(&inputs, &mut diag);
        }
        assert!(!agg.is_in_safe_state());
    }

    #[test]
    fn persistent_single_fault_expires_ftti() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.ambient.valid = false;

        // FTTI 200 ms at 5 ms per tick = 40 ticks after arming.
        for _ in 0..40 {
            agg.tick(&inputs, &mut diag);
            assert!(!agg.is_in_safe_state());
        }
        agg.tick(&inputs, &mut diag);
        assert!(agg.is_in_safe_state());
        assert_eq!(agg.reason(), SafeStateReason::Timeout);
    }

    #[test]
    fn fault_clearing_disarms_ftti() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.ambient.valid = false;
        for _ in 0..30 {
            agg.tick(&inputs, &mut diag);
        }
        // Fault clears before the 200 ms budget is spent.
        for _ in 0..20 {
            agg.tick(&nominal_inputs(), &mut diag);
        }
        // Same fault again: the budget must restart.
        for _ in 0..30 {
            agg.tick(&inputs, &mut diag);
        }
        assert!(!agg.is_in_safe_state());
    }

    #[test]
    fn safe_command_follows_day_night() {
        let (mut agg, mut diag) = make_aggregator();

        // Night first: dark but valid ambient.
        let mut inputs = nominal_inputs();
        inputs.ambient.adc = 400;
        agg.tick(&inputs, &mut diag);
        assert!(!agg.is_daytime());

        agg.trigger_safe_state(SafeStateReason::Manual);
        agg.tick(&inputs, &mut diag);
        assert_eq!(agg.safe_state_command(), HeadlightCommand::LowBeam);

        // Brighten up: the safe command flips to Off.
        inputs.ambient.adc = 2000;
        agg.tick(&inputs, &mut diag);
        assert_eq!(agg.safe_state_command(), HeadlightCommand::Off);
    }

    #[test]
    fn invalid_ambient_keeps_previous_day_classification() {
        let (mut agg, mut diag) = make_aggregator();
        let mut inputs = nominal_inputs();
        inputs.ambient.adc = 400;
        agg.tick(&inputs, &mut diag);
        assert!(!agg.is_daytime());

        inputs.ambient.valid = false;
        inputs.ambient.adc = 4000;
        agg.tick(&inputs, &mut diag);
        assert!(!agg.is_daytime(), "stale bright value must not reclassify");
    }

    #[test]
    fn latch_is_idempotent_and_keeps_first_reason() {
        let (mut agg, _diag) = make_aggregator();
        agg.trigger_safe_state(SafeStateReason::Manual);
        agg.trigger_safe_state(SafeStateReason::MultiFault);
        assert_eq!(agg.reason(), SafeStateReason::Manual);
    }
}

//! Switch command receiver.
//!
//! Validates every incoming light-switch frame with E2E Profile 01 and
//! publishes a typed [`SwitchReport`]. The report is only marked valid
//! while the E2E supervisor qualifies the stream as Valid *and* frames
//! keep arriving inside the 50 ms timeout budget.
//!
//! All failures here are recoverable: both the supervisor and the timeout
//! flag clear on their own once healthy traffic resumes.

use log::debug;

use crate::bus::{LightSwitchFrame, SwitchCommand, CMD_BYTE};
use crate::config::FlmConfig;
use crate::diagnostics::{DiagEvent, DiagnosticSink, EventStatus};
use crate::e2e::{self, CheckState, CheckStatus, P01Config, SmConfig, SmState, SmStatus};

/// Published switch command snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchReport {
    /// Most recently accepted command.
    pub command: SwitchCommand,
    /// True while the command may be acted on.
    pub valid: bool,
    /// Numeric code of the last E2E check verdict.
    pub e2e_status: u8,
}

/// The receiver component.
pub struct SwitchReceiver {
    e2e_config: P01Config,
    check_state: CheckState,
    sm_config: SmConfig,
    sm_state: SmState,
    last_status: CheckStatus,

    /// Frame waiting to be checked on the next tick.
    pending: Option<LightSwitchFrame>,

    /// Ticks without a pending frame; raises the timeout flag at the
    /// configured cycle count.
    timeout_counter: u32,
    timeout_cycles: u32,
    timeout_active: bool,

    /// Local tick timestamp (ms since init), advanced once per tick.
    now_ms: u32,
    period_ms: u32,

    /// The last accepted frame carried a reserved command code.
    reserved_code_seen: bool,

    report: SwitchReport,
}

impl SwitchReceiver {
    pub fn new(cfg: &FlmConfig) -> Self {
        Self {
            e2e_config: crate::bus::light_switch_e2e_config(cfg),
            check_state: CheckState::new(),
            sm_config: SmConfig::default(),
            sm_state: SmState::new(),
            last_status: CheckStatus::Initial,
            pending: None,
            timeout_counter: 0,
            timeout_cycles: cfg.frame_timeout_cycles(),
            timeout_active: false,
            now_ms: 0,
            period_ms: cfg.main_period_ms,
            reserved_code_seen: false,
            report: SwitchReport::default(),
        }
    }

    /// Buffer a frame for the next tick. A second submission before the
    /// tick replaces the first.
    pub fn submit_frame(&mut self, frame: LightSwitchFrame) {
        self.pending = Some(frame);
    }

    /// Run one 10 ms cycle: stamp-advance, E2E check, timeout update,
    /// validity decision, signal emission.
    pub fn tick(&mut self, diag: &mut dyn DiagnosticSink) {
        self.now_ms = self.now_ms.wrapping_add(self.period_ms);

        let had_frame = self.pending.is_some();
        self.run_e2e_check();
        self.update_timeout(had_frame);

        // Valid only while the supervisor qualifies the stream, the bus
        // is not silent, and the last accepted code was in range.
        self.report.valid = self.sm_state.status() == SmStatus::Valid
            && !self.timeout_active
            && !self.reserved_code_seen;
        self.report.e2e_status = self.last_status as u8;

        self.report_diag_events(diag);
    }

    /// Latest published report.
    pub fn report(&self) -> SwitchReport {
        self.report
    }

    /// Current supervisor qualification, for the safety aggregator.
    pub fn supervisor_status(&self) -> SmStatus {
        self.sm_state.status()
    }

    /// Last per-frame verdict.
    pub fn e2e_status(&self) -> CheckStatus {
        self.last_status
    }

    pub fn is_timeout_active(&self) -> bool {
        self.timeout_active
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn run_e2e_check(&mut self) {
        let frame = self.pending.take();
        // A malformed-buffer error cannot happen for a fixed-size frame;
        // treat it as a CRC failure rather than poisoning the stream.
        self.last_status = e2e::check(
            &self.e2e_config,
            &mut self.check_state,
            frame.as_ref().map(|f| f.as_slice()),
        )
        .unwrap_or(CheckStatus::WrongCrc);

        self.sm_state.check(&self.sm_config, self.last_status);

        if self.last_status.is_positive() {
            if let Some(f) = frame {
                self.extract_command(&f);
            }
            self.timeout_counter = 0;
        }
    }

    fn extract_command(&mut self, frame: &LightSwitchFrame) {
        match SwitchCommand::from_code(frame[CMD_BYTE]) {
            Some(cmd) => {
                if cmd != self.report.command {
                    debug!("switch command {:?} -> {:?}", self.report.command, cmd);
                }
                self.report.command = cmd;
                self.reserved_code_seen = false;
            }
            None => {
                // Reserved code: the previous command stays in place and
                // the report is held invalid until an in-range code
                // arrives.
                self.reserved_code_seen = true;
            }
        }
    }

    fn update_timeout(&mut self, had_frame: bool) {
        if !had_frame {
            self.timeout_counter = self.timeout_counter.saturating_add(1);
        }
        self.timeout_active = self.timeout_counter >= self.timeout_cycles;
    }

    fn report_diag_events(&self, diag: &mut dyn DiagnosticSink) {
        let e2e_ok = self.sm_state.status() != SmStatus::Invalid;
        diag.set_event_status(
            DiagEvent::SwitchFrameE2e,
            if e2e_ok {
                EventStatus::Passed
            } else {
                EventStatus::Failed
            },
        );
        diag.set_event_status(
            DiagEvent::SwitchTimeout,
            if self.timeout_active {
                EventStatus::Failed
            } else {
                EventStatus::Passed
            },
        );
    }
}

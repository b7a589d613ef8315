//! Diagnostic event reporting.
//!
//! Components report pass/fail verdicts for their monitored conditions
//! every tick, fire-and-forget; the control plane never depends on the
//! sink's reaction. The in-crate sink keeps the latest status per event
//! plus a bounded history of status *changes* so tests and the scenario
//! runner can inspect what happened without an external tester attached.
//!
//! Persistence and the binary DTC format live outside this crate.

use heapless::Deque;
use log::{info, warn};

/// Events the control plane can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DiagEvent {
    /// E2E verdict stream on the light-switch message degraded.
    SwitchFrameE2e = 0,
    /// Light-switch frame timeout.
    SwitchTimeout = 1,
    /// Ambient sensor line reads open.
    AmbientOpenCircuit = 2,
    /// Ambient sensor line reads shorted.
    AmbientShortCircuit = 3,
    /// Ambient signal implausible (rate of change).
    AmbientPlausibility = 4,
    /// Headlight load missing while commanded on.
    HeadlightOpenLoad = 5,
    /// Headlight overcurrent.
    HeadlightShortCircuit = 6,
    /// Watchdog alive supervision degraded.
    WatchdogSupervision = 7,
    /// The system latched its safe state.
    SafeStateEntered = 8,
}

impl DiagEvent {
    pub const COUNT: usize = 9;
}

/// Test verdict attached to an event report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Passed,
    Failed,
    PrePassed,
    PreFailed,
}

/// Receiver of diagnostic reports.
///
/// Callers ignore the outcome: a broken event sink must never be able to
/// disturb the control decision.
pub trait DiagnosticSink {
    fn set_event_status(&mut self, event: DiagEvent, status: EventStatus);
}

/// One recorded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagRecord {
    pub event: DiagEvent,
    pub status: EventStatus,
}

const HISTORY_CAP: usize = 32;

/// In-memory sink: latest status per event plus a drop-oldest change log.
pub struct DiagnosticLog {
    latest: [Option<EventStatus>; DiagEvent::COUNT],
    history: Deque<DiagRecord, HISTORY_CAP>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self {
            latest: [None; DiagEvent::COUNT],
            history: Deque::new(),
        }
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest reported status for `event`, if any report arrived.
    pub fn latest(&self, event: DiagEvent) -> Option<EventStatus> {
        self.latest[event as usize]
    }

    /// True if the most recent report for `event` was `Failed`.
    pub fn is_failed(&self, event: DiagEvent) -> bool {
        self.latest(event) == Some(EventStatus::Failed)
    }

    /// Recorded status changes, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DiagRecord> {
        self.history.iter()
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn set_event_status(&mut self, event: DiagEvent, status: EventStatus) {
        let slot = &mut self.latest[event as usize];
        if *slot == Some(status) {
            return; // Steady state; components re-report every tick.
        }

        match status {
            EventStatus::Failed | EventStatus::PreFailed => {
                warn!("DIAG {:?} -> {:?}", event, status)
            }
            EventStatus::Passed | EventStatus::PrePassed => {
                info!("DIAG {:?} -> {:?}", event, status)
            }
        }

        *slot = Some(status);
        if self.history.is_full() {
            let _ = self.history.pop_front();
        }
        let _ = self.history.push_back(DiagRecord { event, status });
    }
}

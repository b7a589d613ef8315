//! End-to-end scenarios against the assembled system.
//!
//! Each test builds a fresh [`FlmSystem`], injects bus frames and ADC
//! profiles at millisecond resolution, and asserts on the externally
//! visible posture: controller state, headlight command, relay levels,
//! and the aggregator's verdict.

use frontlight::bus::{light_switch_e2e_config, LightSwitchFrame};
use frontlight::config::FlmConfig;
use frontlight::e2e::{self, P01Config, ProtectState};
use frontlight::flm::context::HeadlightCommand;
use frontlight::flm::FlmState;
use frontlight::hal::DioChannel;
use frontlight::safety::{SafeStateReason, SafetyStatus};
use frontlight::scheduler::FlmSystem;

// ── Harness ───────────────────────────────────────────────────

/// Bus-side sender: protects frames exactly like the real transmitter.
struct FrameSource {
    tx: ProtectState,
    p01: P01Config,
}

impl FrameSource {
    fn new(cfg: &FlmConfig) -> Self {
        Self {
            tx: ProtectState::new(),
            p01: light_switch_e2e_config(cfg),
        }
    }

    fn frame(&mut self, command: u8) -> LightSwitchFrame {
        let mut f = [0u8, 0, command, 0];
        e2e::protect(&self.p01, &mut self.tx, &mut f).unwrap();
        f
    }

    fn corrupted_frame(&mut self, command: u8) -> LightSwitchFrame {
        let mut f = self.frame(command);
        f[0] ^= 0xA5;
        f
    }
}

struct Harness {
    sys: FlmSystem,
    source: FrameSource,
}

impl Harness {
    fn new() -> Self {
        let cfg = FlmConfig::default();
        Self {
            source: FrameSource::new(&cfg),
            sys: FlmSystem::new(cfg).unwrap(),
        }
    }

    /// Run `ms` milliseconds, submitting a fresh protected frame every
    /// 10 ms and feeding back a plausible load current for whatever is
    /// commanded.
    fn run_with_frames(&mut self, ms: u32, command: u8) {
        for _ in 0..(ms / 10) {
            let f = self.source.frame(command);
            self.sys.submit_frame(f);
            self.mirror_load_current();
            self.sys.run_for_ms(10);
        }
    }

    /// Run without bus traffic, still mirroring the load current.
    fn run_silent(&mut self, ms: u32) {
        for _ in 0..(ms / 10) {
            self.mirror_load_current();
            self.sys.run_for_ms(10);
        }
    }

    /// Lamps draw current when energised; keep the current-sense channel
    /// consistent with the commanded pattern.
    fn mirror_load_current(&mut self) {
        let ma = match self.sys.headlight_command() {
            HeadlightCommand::Off => 0,
            HeadlightCommand::LowBeam => 5_000,
            HeadlightCommand::HighBeam => 9_000,
        };
        self.sys.set_load_current_ma(ma);
    }

    /// Healthy warm-up: qualifies the switch stream and fills the
    /// ambient filter so the controller reaches Normal.
    fn warm_up(&mut self, command: u8, ambient: u16) {
        self.sys.set_ambient_adc(ambient);
        self.run_with_frames(150, command);
        assert_eq!(self.sys.flm_state(), FlmState::Normal, "warm-up failed");
    }
}

// ── Day cruise ────────────────────────────────────────────────

#[test]
fn day_cruise_stays_dark_and_ok() {
    let mut h = Harness::new();
    h.sys.set_ambient_adc(2000);
    h.run_with_frames(500, 0);

    assert_eq!(h.sys.flm_state(), FlmState::Normal);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);
    assert_eq!(h.sys.global_status(), SafetyStatus::Ok);
    assert!(!h.sys.dio().is_high(DioChannel::LowBeam));
    assert!(!h.sys.dio().is_high(DioChannel::HighBeam));
    assert_eq!(h.sys.deadline_violations(), 0);
}

// ── Dusk transition (Auto-mode hysteresis end to end) ─────────

#[test]
fn dusk_transition_switches_on_only_below_threshold() {
    let mut h = Harness::new();
    h.warm_up(3, 2000);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);

    // 2000 -> 1200: still bright, stays off.
    h.sys.set_ambient_adc(1200);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);

    // 1200 -> 900: inside the hysteresis band, stays off.
    h.sys.set_ambient_adc(900);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);

    // 900 -> 700: crosses the on-threshold.
    h.sys.set_ambient_adc(700);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);
    assert!(h.sys.dio().is_high(DioChannel::LowBeam));
    assert!(!h.sys.dio().is_high(DioChannel::HighBeam));
    assert_eq!(h.sys.flm_state(), FlmState::Normal);
}

#[test]
fn auto_mode_turns_back_off_above_upper_threshold() {
    let mut h = Harness::new();
    h.warm_up(3, 500);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);

    // Between thresholds: hysteresis holds the lamps on.
    h.sys.set_ambient_adc(900);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);

    // Above the off-threshold: lamps out.
    h.sys.set_ambient_adc(1200);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);

    // Back into the band: stays off.
    h.sys.set_ambient_adc(900);
    h.run_with_frames(300, 3);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);
}

// ── High beam ─────────────────────────────────────────────────

#[test]
fn high_beam_request_energises_both_lines() {
    let mut h = Harness::new();
    h.warm_up(2, 500);

    assert_eq!(h.sys.headlight_command(), HeadlightCommand::HighBeam);
    assert!(h.sys.dio().is_high(DioChannel::LowBeam));
    assert!(h.sys.dio().is_high(DioChannel::HighBeam));
    assert_eq!(h.sys.global_status(), SafetyStatus::Ok);
}

// ── E2E blackout ──────────────────────────────────────────────

#[test]
fn sustained_crc_corruption_latches_e2e_failure() {
    let mut h = Harness::new();
    h.warm_up(1, 2000);
    assert!(h.sys.switch_report().valid);

    // Corrupted traffic: the supervisor disqualifies the stream after
    // two bad frames, and 100 ms of sustained invalidity latches the
    // safe state.
    for _ in 0..30 {
        let f = h.source.corrupted_frame(1);
        h.sys.submit_frame(f);
        h.mirror_load_current();
        h.sys.run_for_ms(10);
    }

    assert!(h.sys.is_in_safe_state());
    assert_eq!(h.sys.safe_state_reason(), SafeStateReason::E2eFailure);
    assert_eq!(h.sys.flm_state(), FlmState::Safe);
    assert_eq!(h.sys.global_status(), SafetyStatus::SafeState);

    // Daylight: the safe-state policy keeps the lamps dark.
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);
}

#[test]
fn e2e_failure_at_night_fails_visible() {
    let mut h = Harness::new();
    h.warm_up(0, 500); // night

    for _ in 0..30 {
        let f = h.source.corrupted_frame(0);
        h.sys.submit_frame(f);
        h.mirror_load_current();
        h.sys.run_for_ms(10);
    }

    assert!(h.sys.is_in_safe_state());
    // Dark road: the controller's safe fallback commands low beam.
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);
    assert!(h.sys.dio().is_high(DioChannel::LowBeam));
}

// ── Multi-fault ───────────────────────────────────────────────

#[test]
fn triple_fault_latches_multi_fault() {
    let mut h = Harness::new();
    h.warm_up(1, 2000);

    // Simultaneous injection: open sensor line, silent bus, dead load.
    h.sys.set_ambient_adc(20);
    h.sys.set_load_current_ma(0);
    h.sys.run_for_ms(100);

    assert!(h.sys.is_in_safe_state());
    assert_eq!(h.sys.safe_state_reason(), SafeStateReason::MultiFault);
}

#[test]
fn two_faults_degrade_without_immediate_latch() {
    let mut h = Harness::new();
    h.warm_up(0, 2000);

    // Silent bus plus open ambient line; the lamps are off so the
    // output stage stays healthy.
    h.sys.set_ambient_adc(20);
    h.sys.run_for_ms(90);

    assert_eq!(h.sys.global_status(), SafetyStatus::Degraded);
    assert!(!h.sys.is_in_safe_state());
}

// ── Short-circuit protection ──────────────────────────────────

#[test]
fn short_circuit_deenergises_and_counts_one_fault() {
    let mut h = Harness::new();
    h.warm_up(1, 500);
    assert!(h.sys.dio().is_high(DioChannel::LowBeam));

    // 20 A into the current sense; two 10 ms ticks confirm the short.
    h.sys.set_load_current_ma(20_000);
    for _ in 0..3 {
        let f = h.source.frame(1);
        h.sys.submit_frame(f);
        h.sys.run_for_ms(10);
    }

    assert!(!h.sys.dio().is_high(DioChannel::LowBeam));
    assert!(!h.sys.dio().is_high(DioChannel::HighBeam));
    assert_eq!(
        h.sys.output_status().fault,
        frontlight::output::OutputFault::Short
    );
    assert_eq!(h.sys.global_status(), SafetyStatus::Warning);
    assert!(!h.sys.is_in_safe_state());
}

#[test]
fn persistent_short_expires_ftti_into_safe_state() {
    let mut h = Harness::new();
    h.warm_up(1, 500);

    // The latched Short never clears, so the FTTI budget runs out.
    for _ in 0..30 {
        let f = h.source.frame(1);
        h.sys.submit_frame(f);
        h.sys.set_load_current_ma(20_000);
        h.sys.run_for_ms(10);
    }

    assert!(h.sys.is_in_safe_state());
    assert_eq!(h.sys.safe_state_reason(), SafeStateReason::Timeout);
    // Night-time safe policy: low beam. The output stage's
    // protective latch keeps the lines physically dead.
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);
    assert!(!h.sys.dio().is_high(DioChannel::LowBeam));
}

// ── Watchdog failure ──────────────────────────────────────────

#[test]
fn watchdog_expiry_latches_wdgm_failure() {
    let mut h = Harness::new();
    h.warm_up(0, 2000);

    h.sys
        .force_watchdog_status(Some(frontlight::watchdog::GlobalStatus::Expired));
    h.run_with_frames(20, 0);

    assert!(h.sys.is_in_safe_state());
    assert_eq!(h.sys.safe_state_reason(), SafeStateReason::WdgmFailure);
    assert_eq!(h.sys.flm_state(), FlmState::Safe);
}

// ── Degraded behaviour ────────────────────────────────────────

#[test]
fn bus_silence_degrades_then_recovers() {
    let mut h = Harness::new();
    h.warm_up(1, 2000);

    // 80 ms of silence: timeout plus supervisor loss degrade the
    // controller but stay short of the FTTI.
    h.run_silent(80);
    assert_eq!(h.sys.flm_state(), FlmState::Degraded);
    assert!(!h.sys.is_in_safe_state());

    // Fresh traffic re-qualifies the stream; the controller returns to
    // Normal and the aggregator calms down.
    h.run_with_frames(100, 1);
    assert_eq!(h.sys.flm_state(), FlmState::Normal);
    assert_eq!(h.sys.global_status(), SafetyStatus::Ok);
    assert!(!h.sys.is_in_safe_state());
}

#[test]
fn degraded_with_invalid_switch_runs_ambient_fallback() {
    let mut h = Harness::new();
    h.warm_up(0, 500); // night, switch Off
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::Off);

    // Switch goes silent on a dark road: the degraded controller falls
    // back to the ambient rule and lights up.
    h.run_silent(80);
    assert_eq!(h.sys.flm_state(), FlmState::Degraded);
    assert_eq!(h.sys.headlight_command(), HeadlightCommand::LowBeam);
}

//! Concrete state handlers, table builder, and headlight command logic.

use log::{info, warn};

use super::context::{FlmContext, HeadlightCommand};
use super::{FlmState, StateDescriptor};
use crate::bus::SwitchCommand;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at startup.
pub fn build_state_table() -> [StateDescriptor; FlmState::COUNT] {
    [
        StateDescriptor {
            id: FlmState::Init,
            name: "Init",
            on_enter: None,
            on_exit: None,
            on_update: init_update,
        },
        StateDescriptor {
            id: FlmState::Normal,
            name: "Normal",
            on_enter: Some(normal_enter),
            on_exit: None,
            on_update: normal_update,
        },
        StateDescriptor {
            id: FlmState::Degraded,
            name: "Degraded",
            on_enter: Some(degraded_enter),
            on_exit: None,
            on_update: degraded_update,
        },
        StateDescriptor {
            id: FlmState::Safe,
            name: "Safe",
            on_enter: Some(safe_enter),
            on_exit: None,
            on_update: safe_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT — waiting for both inputs to qualify
// ═══════════════════════════════════════════════════════════════════════════

fn init_update(ctx: &mut FlmContext) -> Option<FlmState> {
    if ctx.all_inputs_valid() {
        ctx.consecutive_errors = 0;
        return Some(FlmState::Normal);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  NORMAL — full functionality
// ═══════════════════════════════════════════════════════════════════════════

fn normal_enter(ctx: &mut FlmContext) {
    ctx.consecutive_errors = 0;
    info!("NORMAL: all inputs valid");
}

fn normal_update(ctx: &mut FlmContext) -> Option<FlmState> {
    if ctx.any_input_invalid() {
        ctx.consecutive_errors += 1;
        if ctx.consecutive_errors >= ctx.config.max_consecutive_errors {
            return Some(FlmState::Degraded);
        }
    } else {
        ctx.consecutive_errors = 0;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEGRADED — running on partial inputs against the FTTI budget
// ═══════════════════════════════════════════════════════════════════════════

fn degraded_enter(ctx: &mut FlmContext) {
    warn!(
        "DEGRADED: switch valid={} ambient valid={}, budget {} ms",
        ctx.switch.valid,
        ctx.ambient.valid,
        ctx.config.degraded_timeout_ms()
    );
}

fn degraded_update(ctx: &mut FlmContext) -> Option<FlmState> {
    if ctx.all_inputs_valid() {
        ctx.consecutive_errors = 0;
        return Some(FlmState::Normal);
    }

    // Strict comparison: the transition lands one tick after the nominal
    // FTTI - transition-time deadline.
    if ctx.ms_in_state() > ctx.config.degraded_timeout_ms() {
        warn!("DEGRADED: budget exhausted after {} ms", ctx.ms_in_state());
        return Some(FlmState::Safe);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFE — latched minimum-harm behaviour, no recovery this power cycle
// ═══════════════════════════════════════════════════════════════════════════

fn safe_enter(ctx: &mut FlmContext) {
    warn!(
        "SAFE: latched at t={} ms (trigger={})",
        ctx.state_entry_time_ms, ctx.safe_state_trigger
    );
}

fn safe_update(_ctx: &mut FlmContext) -> Option<FlmState> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  Headlight command
// ═══════════════════════════════════════════════════════════════════════════

/// Translate state + inputs into the headlight command. Runs after the
/// state step on every tick.
pub fn compute_headlight_command(ctx: &mut FlmContext, state: FlmState) {
    match state {
        FlmState::Init => {
            ctx.headlight_command = HeadlightCommand::Off;
        }
        FlmState::Safe => {
            // Fail-visible bias: with the ambient sensor also down, a lit
            // road beats a dark one.
            ctx.headlight_command = if ctx.ambient.valid {
                if ctx.ambient.adc < ctx.config.ambient_threshold_on {
                    HeadlightCommand::LowBeam
                } else {
                    HeadlightCommand::Off
                }
            } else {
                HeadlightCommand::LowBeam
            };
        }
        FlmState::Normal | FlmState::Degraded => {
            match ctx.switch.command {
                SwitchCommand::Off => {
                    ctx.headlight_command = HeadlightCommand::Off;
                    ctx.lights_currently_on = false;
                }
                SwitchCommand::LowBeam => {
                    ctx.headlight_command = HeadlightCommand::LowBeam;
                    ctx.lights_currently_on = true;
                }
                SwitchCommand::HighBeam => {
                    ctx.headlight_command = HeadlightCommand::HighBeam;
                    ctx.lights_currently_on = true;
                }
                SwitchCommand::Auto => apply_auto_mode(ctx),
            }

            // A degraded controller without a trustworthy switch falls
            // back to ambient-driven operation.
            if state == FlmState::Degraded && !ctx.switch.valid {
                apply_auto_mode(ctx);
            }
        }
    }
}

/// Auto mode with asymmetric thresholds: on below 800, off above 1000,
/// hold in between. An invalid ambient reading freezes the current
/// command.
fn apply_auto_mode(ctx: &mut FlmContext) {
    if !ctx.ambient.valid {
        return;
    }

    if ctx.lights_currently_on {
        if ctx.ambient.adc > ctx.config.ambient_threshold_off {
            ctx.headlight_command = HeadlightCommand::Off;
            ctx.lights_currently_on = false;
        } else {
            ctx.headlight_command = HeadlightCommand::LowBeam;
        }
    } else if ctx.ambient.adc < ctx.config.ambient_threshold_on {
        ctx.headlight_command = HeadlightCommand::LowBeam;
        ctx.lights_currently_on = true;
    } else {
        ctx.headlight_command = HeadlightCommand::Off;
    }
}

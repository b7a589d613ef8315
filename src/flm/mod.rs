//! Front-light-management control state machine.
//!
//! Classic table-driven embedded FSM: each state is a row of plain `fn`
//! pointers. No closures, no dynamic dispatch, no heap.
//!
//! ```text
//!  INIT ──[all inputs valid]──▶ NORMAL
//!                                 │  ▲
//!              [3 invalid ticks]  │  │ [inputs recovered]
//!                                 ▼  │
//!                              DEGRADED
//!                                 │
//!             [FTTI budget spent] │
//!                                 ▼
//!  Any state ──[critical fault / external trigger]──▶ SAFE (absorbing)
//! ```
//!
//! Each 10 ms tick the engine calls `on_update` for the current state; a
//! returned `Some(next)` runs `on_exit` → `on_enter` and re-stamps the
//! state entry time. The safety aggregator can force the Safe transition
//! from outside via [`FlmController::trigger_safe_state`], which is
//! level-checked at the top of every tick.

pub mod context;
pub mod states;

use context::FlmContext;
use log::info;

use crate::config::FlmConfig;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlmState {
    Init = 0,
    Normal = 1,
    Degraded = 2,
    Safe = 3,
}

impl FlmState {
    /// Number of states; sizes the table array.
    pub const COUNT: usize = 4;

    /// Convert a table index back to a state. Out-of-range indices fall
    /// back to `Safe` in release builds.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Init,
            1 => Self::Normal,
            2 => Self::Degraded,
            3 => Self::Safe,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Safe
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer table
// ---------------------------------------------------------------------------

/// Signature for `on_enter` / `on_exit` actions.
pub type StateActionFn = fn(&mut FlmContext);

/// Per-tick update handler; `Some(next)` requests a transition.
pub type StateUpdateFn = fn(&mut FlmContext) -> Option<FlmState>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: FlmState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The controller: state table, engine bookkeeping, and the shared
/// context holding inputs and the headlight command output.
pub struct FlmController {
    table: [StateDescriptor; FlmState::COUNT],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
    pub ctx: FlmContext,
}

impl FlmController {
    pub fn new(cfg: &FlmConfig) -> Self {
        let mut controller = Self {
            table: states::build_state_table(),
            current: FlmState::Init as usize,
            tick_count: 0,
            state_entry_tick: 0,
            ctx: FlmContext::new(cfg.clone()),
        };
        if let Some(enter) = controller.table[controller.current].on_enter {
            enter(&mut controller.ctx);
        }
        controller
    }

    /// Advance one 10 ms cycle.
    ///
    /// Inputs must already be copied into `ctx` (the scheduler snapshots
    /// the receiver and sensor outputs before calling this). The external
    /// safe-state trigger is honoured before the state handler runs, so a
    /// latched aggregator decision is never delayed by a tick handler.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        self.ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        self.ctx.total_ticks = self.tick_count;

        if self.ctx.safe_state_trigger && self.current_state() != FlmState::Safe {
            self.transition(FlmState::Safe);
        } else {
            let next = (self.table[self.current].on_update)(&mut self.ctx);
            if let Some(next_id) = next {
                self.transition(next_id);
            }
        }

        let state = self.current_state();
        states::compute_headlight_command(&mut self.ctx, state);
    }

    /// Latch the external safe-state request. Level-checked each tick;
    /// there is no way to clear it within a power cycle.
    pub fn trigger_safe_state(&mut self) {
        self.ctx.safe_state_trigger = true;
    }

    pub fn current_state(&self) -> FlmState {
        FlmState::from_index(self.current)
    }

    /// Ticks spent in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: FlmState) {
        let next_idx = next_id as usize;

        info!(
            "FLM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(&mut self.ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        self.ctx.ticks_in_state = 0;
        self.ctx.state_entry_time_ms = self.tick_count as u32 * self.ctx.tick_period_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(&mut self.ctx);
        }
    }
}

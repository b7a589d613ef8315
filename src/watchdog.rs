//! Watchdog manager: alive supervision of the periodic components.
//!
//! Every component reports a checkpoint at the top of its tick. Once per
//! 100 ms supervision cycle the manager compares the indication count of
//! each supervised entity against the count its period predicts; a count
//! outside the tolerance marks the entity Failed, and three failed cycles
//! in a row escalate it to Expired. The global status is the worst local
//! one and feeds the safety aggregator.

use log::{error, warn};

/// Supervised entities, one per periodic component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Entity {
    SwitchReceiver = 0,
    AmbientSensor = 1,
    FlmController = 2,
    OutputMonitor = 3,
    SafetyAggregator = 4,
}

impl Entity {
    pub const COUNT: usize = 5;

    /// Expected checkpoint indications per 100 ms supervision cycle.
    fn expected_indications(self) -> u32 {
        match self {
            Entity::SwitchReceiver => 10,
            Entity::AmbientSensor => 5,
            Entity::FlmController => 10,
            Entity::OutputMonitor => 10,
            Entity::SafetyAggregator => 20,
        }
    }
}

/// Per-entity supervision verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Ok,
    Failed,
    Expired,
    Deactivated,
}

/// Fused supervision verdict, read by the safety aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalStatus {
    Ok,
    Failed,
    Expired,
    Stopped,
    Deactivated,
}

const SUPERVISION_CYCLE_MS: u32 = 100;
/// Allowed shortfall/excess of indications per cycle.
const ALIVE_MARGIN: u32 = 2;
/// Failed cycles in a row before an entity is expired.
const FAILED_REF_CYCLES: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct EntitySlot {
    indications: u32,
    failed_cycles: u32,
    local_status: LocalStatus,
    active: bool,
}

impl Default for EntitySlot {
    fn default() -> Self {
        Self {
            indications: 0,
            failed_cycles: 0,
            local_status: LocalStatus::Ok,
            active: true,
        }
    }
}

/// The watchdog manager.
pub struct WatchdogManager {
    entities: [EntitySlot; Entity::COUNT],
    cycle_elapsed_ms: u32,
    period_ms: u32,
    global: GlobalStatus,
    running: bool,
    /// Bench override; `None` means supervise normally.
    forced_global: Option<GlobalStatus>,
}

impl WatchdogManager {
    pub fn new(period_ms: u32) -> Self {
        Self {
            entities: [EntitySlot::default(); Entity::COUNT],
            cycle_elapsed_ms: 0,
            period_ms,
            global: GlobalStatus::Ok,
            running: true,
            forced_global: None,
        }
    }

    /// Alive indication from a component's tick entry.
    pub fn checkpoint_reached(&mut self, entity: Entity) {
        let slot = &mut self.entities[entity as usize];
        if slot.active {
            slot.indications = slot.indications.saturating_add(1);
        }
    }

    /// Housekeeping, called from the 5 ms band.
    pub fn main_function(&mut self) {
        if !self.running {
            return;
        }

        self.cycle_elapsed_ms += self.period_ms;
        if self.cycle_elapsed_ms >= SUPERVISION_CYCLE_MS {
            self.cycle_elapsed_ms = 0;
            self.perform_alive_supervision();
        }
        self.update_global_status();
    }

    /// Fused supervision verdict.
    pub fn global_status(&self) -> GlobalStatus {
        self.forced_global.unwrap_or(self.global)
    }

    pub fn local_status(&self, entity: Entity) -> LocalStatus {
        self.entities[entity as usize].local_status
    }

    /// Stop supervising (shutdown path).
    pub fn stop(&mut self) {
        self.running = false;
        self.global = GlobalStatus::Stopped;
    }

    /// Bench override for fault-injection runs. `None` restores normal
    /// supervision.
    pub fn force_global_status(&mut self, status: Option<GlobalStatus>) {
        self.forced_global = status;
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn perform_alive_supervision(&mut self) {
        for (idx, slot) in self.entities.iter_mut().enumerate() {
            if !slot.active {
                continue;
            }
            let entity = entity_from_index(idx);
            let expected = entity.expected_indications();
            let actual = slot.indications;
            slot.indications = 0;

            let within = actual + ALIVE_MARGIN >= expected && actual <= expected + ALIVE_MARGIN;
            if within {
                slot.failed_cycles = 0;
                slot.local_status = LocalStatus::Ok;
            } else {
                slot.failed_cycles += 1;
                if slot.failed_cycles >= FAILED_REF_CYCLES {
                    if slot.local_status != LocalStatus::Expired {
                        error!(
                            "WDG: {:?} expired ({} indications, expected {})",
                            entity, actual, expected
                        );
                    }
                    slot.local_status = LocalStatus::Expired;
                } else {
                    warn!(
                        "WDG: {:?} alive supervision failed ({} indications, expected {})",
                        entity, actual, expected
                    );
                    slot.local_status = LocalStatus::Failed;
                }
            }
        }
    }

    fn update_global_status(&mut self) {
        let mut any_failed = false;
        let mut any_expired = false;
        for slot in self.entities.iter().filter(|s| s.active) {
            match slot.local_status {
                LocalStatus::Expired => any_expired = true,
                LocalStatus::Failed => any_failed = true,
                _ => {}
            }
        }
        self.global = if any_expired {
            GlobalStatus::Expired
        } else if any_failed {
            GlobalStatus::Failed
        } else {
            GlobalStatus::Ok
        };
    }
}

fn entity_from_index(idx: usize) -> Entity {
    match idx {
        0 => Entity::SwitchReceiver,
        1 => Entity::AmbientSensor,
        2 => Entity::FlmController,
        3 => Entity::OutputMonitor,
        _ => Entity::SafetyAggregator,
    }
}

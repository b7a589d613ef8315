//! Front Light Management (FLM) control plane.
//!
//! Decides whether a vehicle's low- or high-beam headlights are
//! energised, given a driver switch command received over the vehicle
//! bus and an ambient-light reading, and guarantees a defined safe
//! behaviour whenever inputs, program flow, or the output stage
//! misbehave.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  bus frame ──▶ SwitchReceiver ──┐                              │
//! │                 (E2E P01)       ├──▶ FlmController ──▶ Output  │
//! │  ADC sample ─▶ AmbientSensor ───┘      (Init/Normal/  Monitor  │
//! │                                         Degraded/Safe)   │     │
//! │                                                          ▼     │
//! │  watchdog ───▶ SafetyAggregator ◀────────────── fault class    │
//! │                 (FTTI, safe-state latch)                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Five periodic state machines cooperate on a 1 ms tick: the receiver,
//! controller and output stage every 10 ms, the ambient sensor every
//! 20 ms, the aggregator every 5 ms. All hardware sits behind the
//! [`hal`] port traits; the crate ships simulated implementations so
//! the whole control plane runs on the host.

#![deny(unused_must_use)]

pub mod ambient;
pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod e2e;
pub mod error;
pub mod flm;
pub mod hal;
pub mod output;
pub mod safety;
pub mod scheduler;
pub mod switch_rx;
pub mod watchdog;

//! # Voltaic Core
//!
//! A nodal network simulation core for photovoltaic power systems.
//!
//! This library provides:
//! - A node/link network representation where every link contributes an
//!   admittance matrix and a source vector to a shared system of equations
//! - A minor-step convergence protocol for nonlinear links (breakers,
//!   regulators, generation sources) that must inspect a trial solution
//!   before the solver may accept it
//! - A three-layer photovoltaic equivalent-circuit model (cell, string,
//!   section) with bypass-diode shading logic, maximum-power-point
//!   computation, and fixed-power / fixed-voltage / fixed-conductance load
//!   resolution
//! - Time-domain malfunction injection with sinusoidal ramping
//!
//! ## Architecture
//!
//! - [`network`] - Nodes and their conservation bookkeeping
//! - [`link`] - The conductive link contract and the concrete links
//! - [`pv`] - The photovoltaic cell/string/section stack
//! - [`solver`] - Dense admittance assembly and the minor-step harness
//!
//! ## Simulation Method
//!
//! For each major step of duration dt:
//!
//! 1. Every link's `step(dt)` refreshes its admittance contribution
//! 2. Contributions are summed into the system matrix `G·V = I` and solved
//! 3. Nonlinear links inspect the trial potentials and answer CONFIRM,
//!    REJECT (admittance changed, re-solve) or DELAY (not settled yet);
//!    the solve repeats until all confirm
//! 4. Every link's `compute_flows(dt)` transports flux to its nodes

pub mod error;
pub mod link;
pub mod network;
pub mod pv;
pub mod solver;

// Re-export main types for convenience
pub use error::{Result, VoltaicError};
pub use network::{Node, NodeId};
pub use pv::{PvSection, PvString};
pub use solver::Network;

/// Upper bound on any single conductance ratio in the equivalent-circuit
/// models. Resistances are floored at its reciprocal so both bias
/// directions stay numerically well-posed.
pub const CONDUCTANCE_LIMIT: f64 = 1.0e6;

/// Resistance floor applied to configured shunt/series resistances.
pub const MIN_RESISTANCE: f64 = 1.0 / CONDUCTANCE_LIMIT;

/// Boltzmann constant over elementary charge, in V/K. Thermal voltage is
/// `BOLTZMANN_OVER_CHARGE * T` for T in kelvin.
pub const BOLTZMANN_OVER_CHARGE: f64 = 8.617_333_262e-5;

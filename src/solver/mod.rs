//! Network assembly and solving.
//!
//! The harness sums every link's local contribution `I = G·V + I_source`
//! into one dense system over the non-ground nodes:
//!
//! ```text
//! [ G ] [ v ] = [ i ]
//! ```
//!
//! where `G` is the summed admittance matrix, `v` the node potentials and
//! `i` the summed source injections. Nonlinear links are settled by the
//! minor-step relaxation loop in the harness: solve, poll every nonlinear
//! link, re-solve on any REJECT or DELAY, accept only when the potential
//! vector has converged and every link confirms.

mod harness;
mod matrix;

pub use harness::{Network, SolverConfig};
pub use matrix::SystemMatrix;

/// Convergence tolerance on the potential vector.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Ceiling on minor iterations per major step.
pub const MAX_MINOR_STEPS: usize = 50;

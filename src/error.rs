//! Error types for the Voltaic network simulator.
//!
//! This module provides a unified error type [`VoltaicError`] covering link
//! and photovoltaic-stack initialization failures plus the harness-level
//! solve failures. Runtime model degeneracies (zero active cells, load
//! requests beyond the maximum power point) are deliberately NOT errors:
//! the model returns a well-defined zero state and emits an advisory
//! `tracing::warn!` line instead, so a real-time step loop never halts on
//! a numerical edge case.

use thiserror::Error;

/// Result type alias using [`VoltaicError`].
pub type Result<T> = std::result::Result<T, VoltaicError>;

/// Unified error type for all Voltaic operations.
#[derive(Error, Debug)]
pub enum VoltaicError {
    // ============ Initialization Errors ============
    /// Link or model instance name is empty
    #[error("Instance name cannot be empty")]
    EmptyName,

    /// Configuration value out of range or inconsistent
    #[error("Invalid configuration for '{name}': {message}")]
    InvalidConfig { name: String, message: String },

    /// Initial input data out of range
    #[error("Invalid initial input for '{name}': {message}")]
    InvalidInput { name: String, message: String },

    /// Port mapped to a node index outside the network
    #[error("Link '{name}' port {port} maps to node {node}, outside the network")]
    PortOutOfRange {
        name: String,
        port: usize,
        node: usize,
    },

    // ============ Solver Errors ============
    /// Matrix is singular and cannot be factored
    #[error("Singular admittance matrix - network may have an isolated node")]
    SingularMatrix,

    /// Minor-step relaxation did not settle within the iteration ceiling
    #[error("Minor-step relaxation did not converge after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },
}

impl VoltaicError {
    /// Create an invalid-configuration error.
    pub fn invalid_config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid_input(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a convergence failure error.
    pub fn convergence_failure(iterations: usize, residual: f64) -> Self {
        Self::ConvergenceFailure {
            iterations,
            residual,
        }
    }
}

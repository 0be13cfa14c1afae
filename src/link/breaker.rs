//! Over-current breaker link.
//!
//! A conductor that opens when the solved current through it exceeds a
//! trip limit. Trip evaluation participates in the minor-step convergence
//! protocol: the breaker DELAYs until the solver has a converged trial
//! solution, DELAYs further while its trip-priority window has not been
//! reached (letting lower-priority breakers trip first), then opens and
//! REJECTs the solution exactly once so the solver re-solves with the open
//! admittance already stamped.

use tracing::warn;

use crate::error::Result;
use crate::link::conductor::{Conductor, ConductorConfig, ConductorInput};
use crate::link::SolutionResult;
use crate::network::{Node, NodeId};

/// Conductivity of an open breaker [S].
pub const OPEN_CONDUCTIVITY: f64 = 1e-12;

/// Construction-time breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Underlying conductor configuration.
    pub conductor: ConductorConfig,
    /// Current magnitude above which the breaker trips [flux units].
    pub trip_limit: f64,
    /// Converged-step index at which this breaker is allowed to trip.
    /// Staggering priorities across breakers fixes the trip order.
    pub trip_priority: usize,
}

/// An over-current breaker.
#[derive(Debug, Clone)]
pub struct Breaker {
    conductor: Conductor,
    trip_limit: f64,
    trip_priority: usize,
    tripped: bool,
}

impl Breaker {
    /// Create and validate a breaker between two nodes.
    pub fn new(
        config: BreakerConfig,
        input: ConductorInput,
        port0: NodeId,
        port1: NodeId,
    ) -> Result<Self> {
        let conductor = Conductor::new(config.conductor, input, port0, port1)?;
        if config.trip_limit <= 0.0 {
            return Err(crate::error::VoltaicError::invalid_config(
                &conductor.name,
                "trip limit must be > 0",
            ));
        }
        Ok(Self {
            conductor,
            trip_limit: config.trip_limit,
            trip_priority: config.trip_priority.max(1),
            tripped: false,
        })
    }

    /// Step the underlying conductor, holding the open conductivity while
    /// tripped.
    pub fn step(&mut self, dt: f64) {
        if self.tripped {
            self.conductor.step_with(dt, OPEN_CONDUCTIVITY);
        } else {
            self.conductor.step(dt);
        }
    }

    /// Minor-step protocol evaluation against the trial potentials.
    pub fn confirm_solution_acceptable(
        &mut self,
        nodes: &[Node],
        converged_step: usize,
        _absolute_step: usize,
    ) -> SolutionResult {
        // No valid trial solution to evaluate yet.
        if converged_step == 0 {
            return SolutionResult::Delay;
        }
        if self.tripped {
            return SolutionResult::Confirm;
        }

        let ports = self.conductor.ports();
        let drop = nodes[ports[0].0].potential - nodes[ports[1].0].potential;
        let current = drop * self.conductor.stamped_conductance();

        if current.abs() > self.trip_limit {
            if converged_step < self.trip_priority {
                // Waiting for the trip-priority window.
                return SolutionResult::Delay;
            }
            self.tripped = true;
            self.conductor.step_with(0.0, OPEN_CONDUCTIVITY);
            warn!(
                breaker = %self.conductor.name,
                current,
                limit = self.trip_limit,
                "breaker tripped open"
            );
            return SolutionResult::Reject;
        }
        SolutionResult::Confirm
    }

    /// Transport flux through the underlying conductor.
    pub fn compute_flows(&mut self, nodes: &mut [Node], dt: f64) {
        self.conductor.compute_flows(nodes, dt);
    }

    /// Close the breaker again (operator command).
    pub fn reset(&mut self) {
        self.tripped = false;
    }

    /// Whether the breaker is open.
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Access the underlying conductor.
    pub fn conductor(&self) -> &Conductor {
        &self.conductor
    }

    /// Mutable access for the enum dispatch.
    pub(crate) fn conductor_mut(&mut self) -> &mut Conductor {
        &mut self.conductor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(priority: usize) -> Breaker {
        Breaker::new(
            BreakerConfig {
                conductor: ConductorConfig::new("feed.breaker", 10.0),
                trip_limit: 1.0,
                trip_priority: priority,
            },
            ConductorInput::default(),
            NodeId(1),
            NodeId::GROUND,
        )
        .unwrap()
    }

    fn nodes_with_drop(v: f64) -> Vec<Node> {
        vec![Node::new(0.0), Node::new(v)]
    }

    #[test]
    fn test_delays_before_convergence() {
        // Regardless of how far over the limit the current is.
        let mut b = breaker(1);
        let nodes = nodes_with_drop(100.0);
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 0, 5),
            SolutionResult::Delay
        );
        assert!(!b.is_tripped());
    }

    #[test]
    fn test_trips_once_through_reject() {
        let mut b = breaker(1);
        let nodes = nodes_with_drop(1.0); // 10 A through 10 S, over the 1 A limit
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 1, 1),
            SolutionResult::Reject
        );
        assert!(b.is_tripped());
        // Open conductance already stamped before the reject returned.
        assert!(b.conductor().stamped_conductance() <= OPEN_CONDUCTIVITY);
        // Subsequent polls confirm.
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 2, 2),
            SolutionResult::Confirm
        );
    }

    #[test]
    fn test_waits_for_trip_priority() {
        let mut b = breaker(3);
        let nodes = nodes_with_drop(1.0);
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 1, 1),
            SolutionResult::Delay
        );
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 2, 2),
            SolutionResult::Delay
        );
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 3, 3),
            SolutionResult::Reject
        );
    }

    #[test]
    fn test_confirms_under_limit() {
        let mut b = breaker(1);
        let nodes = nodes_with_drop(0.05); // 0.5 A, under the limit
        assert_eq!(
            b.confirm_solution_acceptable(&nodes, 1, 1),
            SolutionResult::Confirm
        );
    }

    #[test]
    fn test_reset_closes() {
        let mut b = breaker(1);
        let nodes = nodes_with_drop(1.0);
        b.confirm_solution_acceptable(&nodes, 1, 1);
        assert!(b.is_tripped());
        b.reset();
        b.step(0.01);
        assert!(!b.is_tripped());
        assert!(b.conductor().stamped_conductance() > 1.0);
    }
}

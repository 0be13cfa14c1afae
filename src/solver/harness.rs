//! Network harness: owns the nodes and links and drives one major step.
//!
//! The harness is the in-process stand-in for a production network solver:
//! dense assembly, LU factorization, and the minor-step relaxation loop
//! that polls nonlinear links for CONFIRM/REJECT/DELAY. Links only see the
//! fixed contract: their own admittance/source contributions and the
//! shared node potentials.

use crate::error::{Result, VoltaicError};
use crate::link::{NetworkLink, SolutionResult};
use crate::network::Node;
use crate::solver::matrix::SystemMatrix;
use crate::solver::{CONVERGENCE_TOLERANCE, MAX_MINOR_STEPS};

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Ceiling on minor iterations per major step.
    pub max_minor_steps: usize,
    /// Convergence tolerance on the potential vector.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_minor_steps: MAX_MINOR_STEPS,
            tolerance: CONVERGENCE_TOLERANCE,
        }
    }
}

/// A network of nodes and links.
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<NetworkLink>,
    matrix: SystemMatrix,
    config: SolverConfig,
    /// Consecutive converged minor iterations within the current step.
    converged_step: usize,
    /// Minor iterations used by the last major step.
    last_minor_steps: usize,
}

impl Network {
    /// Create a network with `num_nodes` nodes. Node 0 is ground.
    pub fn new(num_nodes: usize) -> Self {
        Self::with_config(num_nodes, SolverConfig::default())
    }

    /// Create a network with a custom solver configuration.
    pub fn with_config(num_nodes: usize, config: SolverConfig) -> Self {
        let num_nodes = num_nodes.max(1);
        Self {
            nodes: vec![Node::default(); num_nodes],
            links: Vec::new(),
            matrix: SystemMatrix::new(num_nodes - 1),
            config,
            converged_step: 0,
            last_minor_steps: 0,
        }
    }

    /// Add a link, validating its port map against the network size.
    /// Returns the link index.
    pub fn add_link(&mut self, link: NetworkLink) -> Result<usize> {
        for (port, node) in link.ports().iter().enumerate() {
            if node.0 >= self.nodes.len() {
                return Err(VoltaicError::PortOutOfRange {
                    name: link.name().to_string(),
                    port,
                    node: node.0,
                });
            }
        }
        self.links.push(link);
        Ok(self.links.len() - 1)
    }

    /// Access a link.
    pub fn link(&self, index: usize) -> &NetworkLink {
        &self.links[index]
    }

    /// Mutable access to a link (for runtime inputs and commands).
    pub fn link_mut(&mut self, index: usize) -> &mut NetworkLink {
        &mut self.links[index]
    }

    /// Access a node.
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Mutable access to a node (initial conditions).
    pub fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    /// Solved potential of a node.
    pub fn potential(&self, index: usize) -> f64 {
        self.nodes[index].potential
    }

    /// Minor iterations used by the last major step.
    pub fn last_minor_steps(&self) -> usize {
        self.last_minor_steps
    }

    /// Advance the network one major step.
    ///
    /// Ordering: every link's `step` completes before assembly and
    /// factorization; every `compute_flows` runs strictly after the final
    /// accepted solve. Returns the number of minor iterations used.
    pub fn step(&mut self, dt: f64) -> Result<usize> {
        for node in &mut self.nodes {
            node.reset_flows();
        }
        for link in &mut self.links {
            link.step(&mut self.nodes, dt);
        }

        let mut x_prev: Vec<f64> = self.nodes[1..].iter().map(|n| n.potential).collect();
        self.converged_step = 0;
        let mut residual = f64::INFINITY;

        let mut minor = 0;
        while minor < self.config.max_minor_steps {
            minor += 1;

            // Re-assemble and re-factor only when some contribution
            // changed; otherwise the previous factorization is reused,
            // even across major steps.
            let dirty = self
                .links
                .iter_mut()
                .fold(false, |acc, l| l.take_dirty() || acc);
            if dirty {
                self.matrix.clear();
                for link in &self.links {
                    self.matrix
                        .stamp_link(link.ports(), link.admittance(), link.source());
                }
                self.matrix.factor()?;
            }
            self.matrix.solve()?;

            for (i, node) in self.nodes[1..].iter_mut().enumerate() {
                node.potential = self.matrix.x[i];
            }

            residual = self
                .matrix
                .x
                .iter()
                .zip(&x_prev)
                .map(|(x, p)| (x - p).abs())
                .fold(0.0, f64::max);
            if residual < self.config.tolerance {
                self.converged_step += 1;
            } else {
                self.converged_step = 0;
            }
            x_prev.copy_from_slice(&self.matrix.x);

            // Poll the nonlinear links. A reject dominates a delay; either
            // one sends the solver around again.
            let mut rejected = false;
            let mut delayed = false;
            for link in &mut self.links {
                if !link.is_nonlinear() {
                    continue;
                }
                match link.confirm_solution_acceptable(&self.nodes, self.converged_step, minor) {
                    SolutionResult::Reject => rejected = true,
                    SolutionResult::Delay => delayed = true,
                    SolutionResult::Confirm => {}
                }
            }

            if !rejected && !delayed && self.converged_step > 0 {
                self.last_minor_steps = minor;
                for link in &mut self.links {
                    link.compute_flows(&mut self.nodes, dt);
                }
                return Ok(minor);
            }
        }

        Err(VoltaicError::convergence_failure(
            self.config.max_minor_steps,
            residual,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{
        Breaker, BreakerConfig, Conductor, ConductorConfig, ConductorInput, FluxSource,
        PvArrayLink,
    };
    use crate::network::NodeId;
    use crate::pv::{
        CellConfigV2, CellModel, FacingOrientation, PvSection, SectionConfig,
        SectionEnvironment, StringConfig,
    };
    use approx::assert_relative_eq;

    fn conductor(name: &str, g: f64, n0: NodeId, n1: NodeId) -> NetworkLink {
        NetworkLink::Conductor(
            Conductor::new(ConductorConfig::new(name, g), ConductorInput::default(), n0, n1)
                .unwrap(),
        )
    }

    #[test]
    fn test_source_through_conductor() {
        let mut net = Network::new(2);
        net.add_link(NetworkLink::FluxSource(
            FluxSource::new("src", 1.0, NodeId::GROUND, NodeId(1)).unwrap(),
        ))
        .unwrap();
        net.add_link(conductor("load", 0.5, NodeId(1), NodeId::GROUND))
            .unwrap();

        net.step(0.01).unwrap();
        assert_relative_eq!(net.potential(1), 2.0, max_relative = 1e-12);
        // Conservation at node 1: 1 A in from the source, 1 A out
        // through the conductor.
        assert_relative_eq!(net.node(1).net_flux(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_series_divider_potentials() {
        let mut net = Network::new(3);
        net.add_link(NetworkLink::FluxSource(
            FluxSource::new("src", 2.0, NodeId::GROUND, NodeId(1)).unwrap(),
        ))
        .unwrap();
        net.add_link(conductor("upper", 2.0, NodeId(1), NodeId(2)))
            .unwrap();
        net.add_link(conductor("lower", 1.0, NodeId(2), NodeId::GROUND))
            .unwrap();

        net.step(0.01).unwrap();
        assert_relative_eq!(net.potential(1), 3.0, max_relative = 1e-9);
        assert_relative_eq!(net.potential(2), 2.0, max_relative = 1e-9);
    }

    #[test]
    fn test_unchanged_network_reuses_factorization() {
        let mut net = Network::new(2);
        net.add_link(NetworkLink::FluxSource(
            FluxSource::new("src", 1.0, NodeId::GROUND, NodeId(1)).unwrap(),
        ))
        .unwrap();
        net.add_link(conductor("load", 1.0, NodeId(1), NodeId::GROUND))
            .unwrap();
        net.step(0.01).unwrap();
        let first = net.last_minor_steps();
        net.step(0.01).unwrap();
        // Second step starts converged; nothing restamps.
        assert!(net.last_minor_steps() <= first);
        assert_relative_eq!(net.potential(1), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_breaker_trips_and_network_recovers() {
        let mut net = Network::new(2);
        let src = net
            .add_link(NetworkLink::FluxSource(
                FluxSource::new("src", 0.5, NodeId::GROUND, NodeId(1)).unwrap(),
            ))
            .unwrap();
        let brk = net
            .add_link(NetworkLink::Breaker(
                Breaker::new(
                    BreakerConfig {
                        conductor: ConductorConfig::new("feed.breaker", 10.0),
                        trip_limit: 1.0,
                        trip_priority: 1,
                    },
                    ConductorInput::default(),
                    NodeId(1),
                    NodeId::GROUND,
                )
                .unwrap(),
            ))
            .unwrap();
        // Parallel leak path keeps the matrix well-posed after the trip.
        net.add_link(conductor("leak", 1e-3, NodeId(1), NodeId::GROUND))
            .unwrap();

        // Under the limit: no trip.
        net.step(0.01).unwrap();
        if let NetworkLink::Breaker(b) = net.link(brk) {
            assert!(!b.is_tripped());
        }

        // Raise the demand over the limit: trips through a single reject.
        if let NetworkLink::FluxSource(s) = net.link_mut(src) {
            s.set_demand(5.0);
        }
        let minors = net.step(0.01).unwrap();
        assert!(minors > 1, "trip must cost extra minor iterations");
        if let NetworkLink::Breaker(b) = net.link(brk) {
            assert!(b.is_tripped());
        }
        // All demand now flows through the leak.
        assert_relative_eq!(net.potential(1), 5.0 / 1e-3, max_relative = 1e-6);
    }

    fn pv_section(num_strings: usize) -> PvSection {
        PvSection::new(
            "pv",
            SectionConfig {
                orientation: FacingOrientation::NormalIncidence,
                angle_exponent: 1.0,
                backside_reduction: 0.1,
                reference_flux: 1000.0,
                num_strings,
                string: StringConfig {
                    cell: CellModel::Version2(CellConfigV2 {
                        voc_ref: 2.2,
                        isc_ref: 0.5,
                        vmp_ref: 1.9,
                        imp_ref: 0.46,
                        ideality: 1.2,
                        surface_area: 0.0025,
                        temperature_voltage_coeff: -0.003,
                        temperature_current_coeff: 0.0005,
                        ref_temperature: 300.0,
                        ref_flux: 1000.0,
                    }),
                    num_cells: 28,
                    bypass_interval: 7,
                    bypass_diode_drop: 0.7,
                    blocking_diode_drop: 0.7,
                },
            },
            SectionEnvironment {
                flux_magnitude: 1000.0,
                incidence_angle: 0.0,
                exposed_fraction: 1.0,
                temperature: 300.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_pv_array_against_resistive_load() {
        let mut net = Network::new(2);
        let pv = net
            .add_link(NetworkLink::PvArray(
                PvArrayLink::new(pv_section(2), NodeId(1), NodeId::GROUND).unwrap(),
            ))
            .unwrap();
        net.add_link(conductor("load", 0.02, NodeId(1), NodeId::GROUND))
            .unwrap();

        net.step(0.1).unwrap();
        let v = net.potential(1);
        if let NetworkLink::PvArray(p) = net.link(pv) {
            let voc = p.section.strings()[0].open_circuit_voltage();
            assert!(v > 0.0 && v < voc, "terminal voltage {v} outside (0, {voc})");
            // The solved point sits on the section curve.
            let curve_i = p.section.predict_current_at_voltage(v);
            assert_relative_eq!(curve_i, 0.02 * v, max_relative = 1e-6);
            // Section reports absorbed (negative) power.
            assert!(p.section.terminal_power() < 0.0);
        }
        assert_relative_eq!(net.node(1).net_flux(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dark_pv_array_converges_to_zero() {
        let mut net = Network::new(2);
        let pv = net
            .add_link(NetworkLink::PvArray(
                PvArrayLink::new(pv_section(1), NodeId(1), NodeId::GROUND).unwrap(),
            ))
            .unwrap();
        net.add_link(conductor("load", 0.02, NodeId(1), NodeId::GROUND))
            .unwrap();

        if let NetworkLink::PvArray(p) = net.link_mut(pv) {
            p.section.env.flux_magnitude = 0.0;
        }
        net.step(0.1).unwrap();
        assert!(net.potential(1).abs() < 1e-9);
    }
}

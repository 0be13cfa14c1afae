//! Two-port conductive link.
//!
//! The conductor is the base shape every conductive link shares: a
//! port-to-node map, a 2x2 admittance contribution, a source contribution,
//! a blockage malfunction fraction, and the `step`/`compute_flows`
//! lifecycle. Derived links (breakers, regulators) reuse it through
//! [`Conductor::step_with`], replacing the conductivity the step would
//! otherwise reset to its configured default.

use crate::error::{Result, VoltaicError};
use crate::network::{Node, NodeId};

/// Construction-time conductor configuration.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Instance name.
    pub name: String,
    /// Conductivity the link resets to at each step [S].
    pub default_conductivity: f64,
    /// Upper clamp on the stamped conductance [S].
    pub max_conductance: f64,
}

impl ConductorConfig {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, default_conductivity: f64) -> Self {
        Self {
            name: name.into(),
            default_conductivity,
            max_conductance: crate::CONDUCTANCE_LIMIT,
        }
    }
}

/// Initial input data for a conductor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConductorInput {
    /// Blockage malfunction fraction in [0, 1]; scales conductance by
    /// `1 - blockage`.
    pub blockage: f64,
}

/// A two-port conductive link.
#[derive(Debug, Clone)]
pub struct Conductor {
    /// Instance name.
    pub name: String,
    ports: [NodeId; 2],
    default_conductivity: f64,
    max_conductance: f64,
    /// Blockage malfunction fraction, mutable at runtime.
    pub blockage: f64,
    /// Conductivity before blockage/clamping, from the last step.
    effective_conductivity: f64,
    admittance: [f64; 4],
    source: [f64; 2],
    /// Conductance currently written into the admittance contribution.
    stamped: f64,
    dirty: bool,
    /// Flux transported at the last `compute_flows` [flux units].
    pub flux: f64,
    /// Power dissipated at the last `compute_flows` [W].
    pub power: f64,
    /// Potential drop at the last `compute_flows`.
    pub potential_drop: f64,
}

impl Conductor {
    /// Create and validate a conductor between two nodes.
    pub fn new(
        config: ConductorConfig,
        input: ConductorInput,
        port0: NodeId,
        port1: NodeId,
    ) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(VoltaicError::EmptyName);
        }
        if config.default_conductivity < 0.0 {
            return Err(VoltaicError::invalid_config(
                &config.name,
                "conductivity must be >= 0",
            ));
        }
        if config.max_conductance <= 0.0 {
            return Err(VoltaicError::invalid_config(
                &config.name,
                "maximum conductance must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&input.blockage) {
            return Err(VoltaicError::invalid_input(
                &config.name,
                "blockage fraction outside [0, 1]",
            ));
        }
        let mut conductor = Self {
            name: config.name,
            ports: [port0, port1],
            default_conductivity: config.default_conductivity,
            max_conductance: config.max_conductance,
            blockage: input.blockage,
            effective_conductivity: 0.0,
            admittance: [0.0; 4],
            source: [0.0; 2],
            stamped: f64::NAN,
            dirty: false,
            flux: 0.0,
            power: 0.0,
            potential_drop: 0.0,
        };
        conductor.step(0.0);
        Ok(conductor)
    }

    /// Reset to the default conductivity and restamp if it changed.
    pub fn step(&mut self, dt: f64) {
        let conductivity = self.default_conductivity;
        self.step_with(dt, conductivity);
    }

    /// Step with a replacement conductivity, the hook derived links use.
    /// Applies the blockage malfunction, clamps to the configured maximum,
    /// and rewrites the admittance contribution only when the resulting
    /// conductance actually changed.
    pub fn step_with(&mut self, _dt: f64, conductivity: f64) {
        self.effective_conductivity = conductivity;
        let g = (conductivity * (1.0 - self.blockage.clamp(0.0, 1.0)))
            .min(self.max_conductance);
        if g != self.stamped {
            self.admittance = [g, -g, -g, g];
            self.stamped = g;
            self.dirty = true;
        }
    }

    /// Compute the flux through the link and transport it to the nodes.
    /// Potential drops below the rounding-noise floor
    /// `100 * eps * max(|V0|, |V1|)` produce zero flux.
    pub fn compute_flows(&mut self, nodes: &mut [Node], _dt: f64) {
        let v0 = nodes[self.ports[0].0].potential;
        let v1 = nodes[self.ports[1].0].potential;
        let drop = v0 - v1;
        self.potential_drop = drop;

        let noise_floor = 100.0 * f64::EPSILON * v0.abs().max(v1.abs());
        self.flux = if drop.abs() < noise_floor {
            0.0
        } else {
            drop * self.stamped
        };
        self.power = self.flux * drop;

        nodes[self.ports[0].0].collect_outflux(self.flux);
        nodes[self.ports[1].0].collect_influx(self.flux);
    }

    /// Port-to-node map.
    pub fn ports(&self) -> &[NodeId; 2] {
        &self.ports
    }

    /// Local admittance contribution, row-major 2x2.
    pub fn admittance(&self) -> &[f64; 4] {
        &self.admittance
    }

    /// Local source contribution (flux injected at each port's node).
    pub fn source(&self) -> &[f64; 2] {
        &self.source
    }

    /// Conductance currently stamped.
    pub fn stamped_conductance(&self) -> f64 {
        self.stamped
    }

    /// Conductivity before blockage and clamping.
    pub fn effective_conductivity(&self) -> f64 {
        self.effective_conductivity
    }

    /// Whether the admittance changed since the last assembly; clears the
    /// flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conductor(g: f64) -> Conductor {
        Conductor::new(
            ConductorConfig::new("load", g),
            ConductorInput::default(),
            NodeId(1),
            NodeId::GROUND,
        )
        .unwrap()
    }

    #[test]
    fn test_admittance_rows_sum_to_zero() {
        let c = conductor(0.05);
        let a = c.admittance();
        assert_eq!(a[0] + a[1], 0.0);
        assert_eq!(a[2] + a[3], 0.0);
        // Symmetric
        assert_eq!(a[1], a[2]);
    }

    #[test]
    fn test_blockage_scales_conductance() {
        let mut c = conductor(0.1);
        c.blockage = 0.25;
        c.step(0.01);
        assert!((c.stamped_conductance() - 0.075).abs() < 1e-15);
    }

    #[test]
    fn test_dirty_only_on_change() {
        let mut c = conductor(0.1);
        assert!(c.take_dirty()); // initial stamp
        c.step(0.01);
        assert!(!c.take_dirty()); // unchanged
        c.blockage = 0.5;
        c.step(0.01);
        assert!(c.take_dirty());
    }

    #[test]
    fn test_max_conductance_clamp() {
        let mut cfg = ConductorConfig::new("short", 10.0);
        cfg.max_conductance = 2.0;
        let c = Conductor::new(cfg, ConductorInput::default(), NodeId(1), NodeId(2)).unwrap();
        assert_eq!(c.stamped_conductance(), 2.0);
    }

    #[test]
    fn test_compute_flows_transports_flux() {
        let mut c = conductor(0.5);
        let mut nodes = vec![Node::new(0.0), Node::new(2.0)];
        c.compute_flows(&mut nodes, 0.01);
        assert!((c.flux - 1.0).abs() < 1e-12);
        assert!((c.power - 2.0).abs() < 1e-12);
        assert!((nodes[1].outflux() - 1.0).abs() < 1e-12);
        assert!((nodes[0].influx() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_noise_floor_zeroes_flux() {
        let mut c = conductor(1.0);
        let v = 10.0;
        let mut nodes = vec![Node::new(v), Node::new(v + 10.0 * f64::EPSILON * v)];
        c.compute_flows(&mut nodes, 0.01);
        assert_eq!(c.flux, 0.0);
        assert_eq!(c.power, 0.0);
    }

    #[test]
    fn test_rejects_negative_conductivity() {
        let cfg = ConductorConfig::new("bad", -1.0);
        assert!(Conductor::new(cfg, ConductorInput::default(), NodeId(1), NodeId(0)).is_err());
    }

    #[test]
    fn test_rejects_empty_name() {
        let cfg = ConductorConfig::new("", 1.0);
        assert!(matches!(
            Conductor::new(cfg, ConductorInput::default(), NodeId(1), NodeId(0)),
            Err(VoltaicError::EmptyName)
        ));
    }
}

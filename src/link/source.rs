//! Flux source link.
//!
//! Injects a demanded flux from its first port's node into its second
//! port's node, contributing only to the source vector. The demand is
//! mutable between steps.

use crate::error::{Result, VoltaicError};
use crate::network::{Node, NodeId};

/// A two-port flux source.
#[derive(Debug, Clone)]
pub struct FluxSource {
    /// Instance name.
    pub name: String,
    ports: [NodeId; 2],
    /// Demanded flux transported from port 0 to port 1.
    pub demand: f64,
    admittance: [f64; 4],
    source: [f64; 2],
    dirty: bool,
}

impl FluxSource {
    /// Create a flux source between two nodes.
    pub fn new(
        name: impl Into<String>,
        demand: f64,
        port0: NodeId,
        port1: NodeId,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VoltaicError::EmptyName);
        }
        Ok(Self {
            name,
            ports: [port0, port1],
            demand,
            admittance: [0.0; 4],
            source: [0.0; 2],
            dirty: true,
        })
    }

    /// Refresh the source contribution and schedule the outflux.
    pub fn step(&mut self, nodes: &mut [Node], _dt: f64) {
        self.source = [-self.demand, self.demand];
        nodes[self.ports[0].0].schedule_outflux(self.demand);
    }

    /// Transport the demanded flux to the nodes.
    pub fn compute_flows(&mut self, nodes: &mut [Node], _dt: f64) {
        nodes[self.ports[0].0].collect_outflux(self.demand);
        nodes[self.ports[1].0].collect_influx(self.demand);
    }

    /// Port-to-node map.
    pub fn ports(&self) -> &[NodeId; 2] {
        &self.ports
    }

    /// Local admittance contribution (all zero).
    pub fn admittance(&self) -> &[f64; 4] {
        &self.admittance
    }

    /// Local source contribution (flux injected at each port's node).
    pub fn source(&self) -> &[f64; 2] {
        &self.source
    }

    /// Source contributions change every step the demand changes; keep it
    /// simple and report dirty whenever the demand moved.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Set a new demand for the next step.
    pub fn set_demand(&mut self, demand: f64) {
        if demand != self.demand {
            self.demand = demand;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_contribution_signs() {
        let mut s = FluxSource::new("feed", 2.0, NodeId(1), NodeId(2)).unwrap();
        let mut nodes = vec![Node::default(), Node::default(), Node::default()];
        s.step(&mut nodes, 0.01);
        assert_eq!(s.source(), &[-2.0, 2.0]);
        assert_eq!(nodes[1].scheduled_outflux(), 2.0);

        s.compute_flows(&mut nodes, 0.01);
        assert_eq!(nodes[1].outflux(), 2.0);
        assert_eq!(nodes[2].influx(), 2.0);
    }
}

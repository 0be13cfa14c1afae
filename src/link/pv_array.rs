//! Photovoltaic array link.
//!
//! Bridges a [`PvSection`] into the network: the section's piecewise-linear
//! I-V curve is presented to the solver as a Norton equivalent of whichever
//! segment (short-circuit side or open-circuit side of the MPP) the
//! terminal operating point sits on. Segment choice is settled through the
//! minor-step protocol: when a solved terminal voltage lands on the other
//! side of the MPP than the stamped segment, the link restamps and REJECTs
//! so the next solve reflects the correct slope.

use crate::error::Result;
use crate::link::SolutionResult;
use crate::network::{Node, NodeId};
use crate::pv::PvSection;

/// Conductance stamped for a dark or fully bypassed array [S].
const DARK_CONDUCTANCE: f64 = 1e-12;

/// A photovoltaic array link.
#[derive(Debug, Clone)]
pub struct PvArrayLink {
    /// The owned section; environment is set through `section.env`.
    pub section: PvSection,
    ports: [NodeId; 2],
    admittance: [f64; 4],
    source: [f64; 2],
    dirty: bool,
    /// Whether the stamp currently reflects the short-circuit side.
    short_side: bool,
    /// Terminal flux from the last `compute_flows` [A].
    pub flux: f64,
    /// Terminal power from the last `compute_flows` [W].
    pub power: f64,
}

impl PvArrayLink {
    /// Create the link. The section carries the instance name and has
    /// already validated its configuration.
    pub fn new(section: PvSection, terminal: NodeId, rtn: NodeId) -> Result<Self> {
        Ok(Self {
            section,
            ports: [terminal, rtn],
            admittance: [0.0; 4],
            source: [0.0; 2],
            dirty: true,
            short_side: false,
            flux: 0.0,
            power: 0.0,
        })
    }

    /// Step: update the section from its environment, then stamp the
    /// segment the previous terminal voltage was on.
    pub fn step(&mut self, dt: f64) {
        self.section.update(dt);
        let v_prev = self.section.terminal().voltage;
        let side = self.side_for(v_prev);
        self.stamp_segment(side);
    }

    fn mpp_voltage(&self) -> f64 {
        self.section.strings()[0].mpp().voltage
    }

    fn side_for(&self, terminal_voltage: f64) -> bool {
        terminal_voltage <= self.mpp_voltage()
    }

    /// Write the Norton equivalent of one curve segment, summed across the
    /// parallel strings: `i(v) = norton - g * v`.
    fn stamp_segment(&mut self, short_side: bool) {
        let strings = self.section.strings();
        let n = strings.len() as f64;
        let s = &strings[0];
        let mpp = s.mpp();

        let (g, norton) = if mpp.power <= 0.0 {
            (DARK_CONDUCTANCE, 0.0)
        } else if short_side {
            let isc = s.short_circuit_current();
            let slope = (mpp.current - isc) / mpp.voltage;
            (-n * slope, n * isc)
        } else {
            let voc = s.open_circuit_voltage();
            let slope = mpp.current / (voc - mpp.voltage);
            (n * slope, n * slope * voc)
        };
        // Segment slopes can degenerate to zero; keep the stamp invertible.
        let g = g.max(DARK_CONDUCTANCE);

        let changed = self.admittance[0] != g || self.source[0] != norton;
        self.admittance = [g, -g, -g, g];
        self.source = [norton, -norton];
        self.short_side = short_side;
        if changed {
            self.dirty = true;
        }
    }

    /// Minor-step protocol evaluation against the trial potentials.
    pub fn confirm_solution_acceptable(
        &mut self,
        nodes: &[Node],
        converged_step: usize,
        _absolute_step: usize,
    ) -> SolutionResult {
        if converged_step == 0 {
            return SolutionResult::Delay;
        }
        if self.section.strings()[0].mpp().power <= 0.0 {
            return SolutionResult::Confirm;
        }
        let v = nodes[self.ports[0].0].potential - nodes[self.ports[1].0].potential;
        let side = self.side_for(v);
        if side != self.short_side {
            self.stamp_segment(side);
            return SolutionResult::Reject;
        }
        SolutionResult::Confirm
    }

    /// Resolve the section at the solved terminal voltage and transport
    /// the generated flux.
    pub fn compute_flows(&mut self, nodes: &mut [Node], _dt: f64) {
        let v = nodes[self.ports[0].0].potential - nodes[self.ports[1].0].potential;
        self.section.load_at_voltage(v.max(0.0));
        let terminal = self.section.terminal();
        self.flux = terminal.current;
        self.power = terminal.power;

        nodes[self.ports[0].0].collect_influx(self.flux);
        nodes[self.ports[1].0].collect_outflux(self.flux);
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

    /// Whether the stamp changed since the last assembly; clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

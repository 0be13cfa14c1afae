//! Photovoltaic string: series-connected cells behind bypass-diode groups
//! and a blocking diode.
//!
//! Each update recomputes everything from configuration plus the shared
//! input block: bypass-group count from the exposed fraction, the cell
//! equivalent circuit for the active cells, the string Voc/Isc, and the
//! maximum power point. Load resolution then walks the resulting
//! piecewise-linear I-V curve `(0, Isc) -> (Vmp, Imp) -> (Voc, 0)` in one
//! of three modes: fixed power, fixed voltage, or fixed conductance.

use tracing::warn;

use crate::error::{Result, VoltaicError};
use crate::pv::cell::{knee_point, CellModel, EquivCircuit};
use crate::pv::malfunction::{
    FluxRampOverride, GroupFailure, PowerDegrade, SteppedOverride,
};

/// A resolved operating point on the string I-V curve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadState {
    /// Terminal voltage [V].
    pub voltage: f64,
    /// Terminal current [A].
    pub current: f64,
    /// Terminal power [W].
    pub power: f64,
    /// Terminal conductance [S].
    pub conductance: f64,
}

impl LoadState {
    /// The all-zero degenerate state.
    pub fn zero() -> Self {
        Self::default()
    }

    fn at(voltage: f64, current: f64) -> Self {
        let conductance = if voltage > 0.0 { current / voltage } else { 0.0 };
        Self {
            voltage,
            current,
            power: voltage * current,
            conductance,
        }
    }
}

/// String configuration, immutable after initialization.
#[derive(Debug, Clone)]
pub struct StringConfig {
    /// Cell model variant shared by every cell in the string.
    pub cell: CellModel,
    /// Number of series cells.
    pub num_cells: usize,
    /// Cells per bypass-diode group. Must evenly divide `num_cells`.
    pub bypass_interval: usize,
    /// Forward-bias drop of one bypass diode [V].
    pub bypass_diode_drop: f64,
    /// Forward-bias drop of the end-of-string blocking diode [V].
    pub blocking_diode_drop: f64,
}

impl StringConfig {
    /// Validate the configuration. `name` is the owning instance name.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.num_cells == 0 {
            return Err(VoltaicError::invalid_config(name, "string has zero cells"));
        }
        if self.bypass_interval == 0 || self.num_cells % self.bypass_interval != 0 {
            return Err(VoltaicError::invalid_config(
                name,
                "bypass interval must evenly divide the cell count",
            ));
        }
        if self.bypass_diode_drop < 0.0 || self.blocking_diode_drop < 0.0 {
            return Err(VoltaicError::invalid_config(
                name,
                "diode voltage drops must be >= 0",
            ));
        }
        self.cell.validate(name)
    }

    /// Number of bypass-diode groups.
    pub fn total_groups(&self) -> usize {
        self.num_cells / self.bypass_interval
    }
}

/// Per-step input data, broadcast by the owning section and shared by all
/// of its strings. The malfunction overrides live here and are ticked once
/// centrally through [`StringInput::apply_overrides`].
#[derive(Debug, Clone, Default)]
pub struct StringInput {
    /// Illumination flux reaching the string [W/m^2].
    pub photo_flux: f64,
    /// Fraction of the string exposed to the illumination [0, 1].
    pub exposed_fraction: f64,
    /// Cell temperature [K].
    pub temperature: f64,
    /// Illumination override with sinusoidal ramping.
    pub flux_override: FluxRampOverride,
    /// Exposed-fraction override.
    pub exposure_override: SteppedOverride,
    /// Temperature override.
    pub temperature_override: SteppedOverride,
    /// Latched failed-group malfunction.
    pub group_failure: GroupFailure,
    /// Latched power-degrade malfunction.
    pub power_degrade: PowerDegrade,
}

impl StringInput {
    /// Validate initial input values. `name` is the owning instance name.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.photo_flux < 0.0 {
            return Err(VoltaicError::invalid_input(name, "illumination flux < 0"));
        }
        if !(0.0..=1.0).contains(&self.exposed_fraction) {
            return Err(VoltaicError::invalid_input(
                name,
                "exposed fraction outside [0, 1]",
            ));
        }
        if self.temperature < 0.0 {
            return Err(VoltaicError::invalid_input(name, "temperature < 0 K"));
        }
        Ok(())
    }

    /// Tick every timed override once and replace the ambient values with
    /// the effective ones for this step.
    pub fn apply_overrides(&mut self, dt: f64) {
        self.photo_flux = self.flux_override.apply(dt, self.photo_flux);
        self.exposed_fraction = self
            .exposure_override
            .apply(dt, self.exposed_fraction)
            .clamp(0.0, 1.0);
        self.temperature = self.temperature_override.apply(dt, self.temperature);
    }
}

/// A photovoltaic string.
#[derive(Debug, Clone)]
pub struct PvString {
    /// Instance name, used in advisory log lines.
    pub name: String,
    config: StringConfig,
    /// Equivalent circuit from the last update.
    eq: EquivCircuit,
    /// Bypass groups currently routed around.
    num_bypassed_groups: usize,
    /// Series cells still contributing.
    num_active_cells: usize,
    /// String open-circuit voltage [V].
    voc: f64,
    /// String short-circuit current [A].
    isc: f64,
    /// Maximum power point from the last update.
    mpp: LoadState,
    /// Last resolved terminal operating point.
    terminal: LoadState,
}

impl PvString {
    /// Create a string, validating name and configuration.
    pub fn new(name: impl Into<String>, config: StringConfig) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VoltaicError::EmptyName);
        }
        config.validate(&name)?;
        Ok(Self {
            name,
            config,
            eq: EquivCircuit::default(),
            num_bypassed_groups: 0,
            num_active_cells: 0,
            voc: 0.0,
            isc: 0.0,
            mpp: LoadState::zero(),
            terminal: LoadState::zero(),
        })
    }

    /// Recompute the string state from the shared input block.
    pub fn update(&mut self, input: &StringInput) {
        let groups = self.config.total_groups();

        // A single shaded or failed cell blocks its whole series group, so
        // shading converts directly to a worst-case bypassed-group count.
        // The failed-group malfunction can only raise it, never lower it.
        let shaded = (groups as f64 * (1.0 - input.exposed_fraction.clamp(0.0, 1.0))).ceil()
            as usize;
        let failed = if input.group_failure.active {
            input.group_failure.count.min(groups)
        } else {
            0
        };
        self.num_bypassed_groups = shaded.max(failed).min(groups);
        self.num_active_cells =
            self.config.num_cells - self.num_bypassed_groups * self.config.bypass_interval;

        self.eq = self.config.cell.compute(
            input.photo_flux,
            input.temperature,
            input.power_degrade.effective(),
        );

        let n = self.num_active_cells as f64;
        let raw_voc = n * self.eq.voc
            - self.config.blocking_diode_drop
            - self.num_bypassed_groups as f64 * self.config.bypass_diode_drop;

        if self.num_active_cells == 0 || raw_voc <= 0.0 || self.eq.isc <= 0.0 {
            self.voc = 0.0;
            self.isc = 0.0;
            self.mpp = LoadState::zero();
            return;
        }

        self.voc = raw_voc;
        self.isc = self.eq.isc;

        // Direct MPP solve: internal node pinned at the open-circuit
        // voltage, shunt branch reverse-biased (short-circuit-side slope),
        // series plus forward diode on the open-circuit side.
        let diode_r = if self.eq.il + self.eq.i0 > 0.0 {
            self.eq.n_vt / (self.eq.il + self.eq.i0)
        } else {
            0.0
        };
        let rser = n * (self.eq.rs + diode_r);
        let rsh = n * self.eq.rsh;
        let (v_mp, i_mp) = knee_point(self.voc, self.isc, rser, rsh);
        self.mpp = LoadState::at(v_mp, i_mp);
    }

    /// Equivalent circuit from the last update.
    pub fn equiv_circuit(&self) -> &EquivCircuit {
        &self.eq
    }

    /// Number of bypass groups currently routed around.
    pub fn num_bypassed_groups(&self) -> usize {
        self.num_bypassed_groups
    }

    /// Number of series cells still contributing.
    pub fn num_active_cells(&self) -> usize {
        self.num_active_cells
    }

    /// String open-circuit voltage [V].
    pub fn open_circuit_voltage(&self) -> f64 {
        self.voc
    }

    /// String short-circuit current [A].
    pub fn short_circuit_current(&self) -> f64 {
        self.isc
    }

    /// Maximum power point from the last update.
    pub fn mpp(&self) -> &LoadState {
        &self.mpp
    }

    /// Last resolved terminal operating point.
    pub fn terminal(&self) -> &LoadState {
        &self.terminal
    }

    /// Slope of the short-circuit-side segment, d(i)/d(v) <= 0.
    fn sc_slope(&self) -> f64 {
        if self.mpp.voltage > 0.0 {
            (self.mpp.current - self.isc) / self.mpp.voltage
        } else {
            0.0
        }
    }

    /// Magnitude of the open-circuit-side slope, i = b * (voc - v).
    fn oc_slope(&self) -> f64 {
        if self.voc > self.mpp.voltage {
            self.mpp.current / (self.voc - self.mpp.voltage)
        } else {
            0.0
        }
    }

    /// Read-only current prediction at a terminal voltage, on the same
    /// piecewise-linear curve the mutating loaders use.
    pub fn predict_current_at_voltage(&self, voltage: f64) -> f64 {
        if self.mpp.power <= 0.0 || voltage < f64::EPSILON || voltage > self.voc {
            return 0.0;
        }
        let i = if voltage <= self.mpp.voltage {
            self.isc + self.sc_slope() * voltage
        } else {
            self.oc_slope() * (self.voc - voltage)
        };
        i.max(0.0)
    }

    /// Resolve the terminal state for a fixed terminal voltage.
    pub fn load_at_voltage(&mut self, voltage: f64) -> LoadState {
        let current = self.predict_current_at_voltage(voltage);
        self.terminal = if current > 0.0 {
            LoadState::at(voltage, current)
        } else {
            LoadState::zero()
        };
        self.terminal
    }

    /// Resolve the terminal state for a requested output power.
    ///
    /// The piecewise curve offers two operating points for any power below
    /// the maximum; `prefer_short_circuit_side` selects which side of the
    /// MPP to solve on. Requests beyond the MPP power, or whose quadratic
    /// has no real root, zero the output.
    pub fn load_at_power(&mut self, power: f64, prefer_short_circuit_side: bool) -> LoadState {
        if power <= 0.0 || self.mpp.power <= 0.0 {
            self.terminal = LoadState::zero();
            return self.terminal;
        }
        if power > self.mpp.power {
            warn!(
                string = %self.name,
                requested = power,
                available = self.mpp.power,
                "load power request exceeds maximum power point, output zeroed"
            );
            self.terminal = LoadState::zero();
            return self.terminal;
        }

        let voltage = if prefer_short_circuit_side {
            // p = v * (isc + b*v) with b <= 0; take the lower-voltage root.
            let b = self.sc_slope();
            if b.abs() < f64::EPSILON {
                Some(power / self.isc)
            } else {
                let disc = self.isc * self.isc + 4.0 * b * power;
                if disc < 0.0 {
                    None
                } else {
                    Some(((-self.isc + disc.sqrt()) / (2.0 * b)).clamp(0.0, self.mpp.voltage))
                }
            }
        } else {
            // p = b * v * (voc - v); take the higher-voltage root.
            let b = self.oc_slope();
            let disc = self.voc * self.voc - 4.0 * power / b.max(f64::EPSILON);
            if b <= 0.0 || disc < 0.0 {
                None
            } else {
                Some(((self.voc + disc.sqrt()) * 0.5).clamp(self.mpp.voltage, self.voc))
            }
        };

        self.terminal = match voltage {
            Some(v) if v > 0.0 => LoadState::at(v, power / v),
            _ => {
                warn!(
                    string = %self.name,
                    requested = power,
                    "load power request has no real operating point, output zeroed"
                );
                LoadState::zero()
            }
        };
        self.terminal
    }

    /// Resolve the terminal state for a resistive load of conductance `g`.
    pub fn load_at_conductance(&mut self, conductance: f64) -> LoadState {
        if conductance < 0.0 || self.mpp.power <= 0.0 || self.mpp.voltage <= 0.0 {
            self.terminal = LoadState::zero();
            return self.terminal;
        }
        let g_mpp = self.mpp.current / self.mpp.voltage;
        let voltage = if conductance >= g_mpp {
            // Load line meets the short-circuit-side segment.
            self.isc / (conductance - self.sc_slope())
        } else {
            // Load line meets the open-circuit-side segment.
            let b = self.oc_slope();
            b * self.voc / (conductance + b)
        };
        let voltage = voltage.clamp(0.0, self.voc);
        self.terminal = LoadState::at(voltage, conductance * voltage);
        self.terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::cell::CellConfigV2;
    use approx::assert_relative_eq;

    fn test_config() -> StringConfig {
        StringConfig {
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
        }
    }

    fn lit_input() -> StringInput {
        StringInput {
            photo_flux: 1000.0,
            exposed_fraction: 1.0,
            temperature: 300.0,
            ..StringInput::default()
        }
    }

    fn updated_string() -> PvString {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        s.update(&lit_input());
        s
    }

    #[test]
    fn test_partial_shading_bypasses_one_group() {
        // 28 cells, interval 7 => 4 groups; exposed 0.75 => 1 group out.
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        let mut input = lit_input();
        input.exposed_fraction = 0.75;
        s.update(&input);
        assert_eq!(s.num_bypassed_groups(), 1);
        assert_eq!(s.num_active_cells(), 21);
    }

    #[test]
    fn test_active_cell_invariant() {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        for exposed in [0.0, 0.2, 0.5, 0.75, 0.9, 1.0] {
            let mut input = lit_input();
            input.exposed_fraction = exposed;
            s.update(&input);
            let expected =
                s.config.num_cells - s.num_bypassed_groups() * s.config.bypass_interval;
            assert_eq!(s.num_active_cells(), expected);
            assert!(s.num_active_cells() <= s.config.num_cells);
        }
    }

    #[test]
    fn test_fully_shaded_string_is_dead() {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        let mut input = lit_input();
        input.exposed_fraction = 0.0;
        s.update(&input);
        assert_eq!(s.num_active_cells(), 0);
        assert_eq!(s.open_circuit_voltage(), 0.0);
        assert_eq!(s.short_circuit_current(), 0.0);
        assert_eq!(s.mpp().power, 0.0);
    }

    #[test]
    fn test_failed_groups_only_raise_bypass_count() {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        let mut input = lit_input();
        input.exposed_fraction = 0.75; // shading alone bypasses 1 group
        input.group_failure.set(3);
        s.update(&input);
        assert_eq!(s.num_bypassed_groups(), 3);

        // A failure count below the shading-derived count does not lower it.
        input.group_failure.set(0);
        s.update(&input);
        assert_eq!(s.num_bypassed_groups(), 1);

        // And the count clamps to the group total.
        input.group_failure.set(99);
        s.update(&input);
        assert_eq!(s.num_bypassed_groups(), 4);
        assert_eq!(s.num_active_cells(), 0);
    }

    #[test]
    fn test_mpp_bounded_by_corner_power() {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        for exposed in [0.3, 0.6, 1.0] {
            for flux in [200.0, 1000.0, 1400.0] {
                let mut input = lit_input();
                input.exposed_fraction = exposed;
                input.photo_flux = flux;
                s.update(&input);
                let corner = s.open_circuit_voltage() * s.short_circuit_current();
                assert!(s.mpp().power >= 0.0);
                assert!(s.mpp().power <= corner + 1e-12, "mpp {} corner {}", s.mpp().power, corner);
            }
        }
    }

    #[test]
    fn test_predictor_matches_loader() {
        let mut s = updated_string();
        let voc = s.open_circuit_voltage();
        for frac in [0.01, 0.25, 0.5, 0.8, 0.95, 1.0] {
            let v = voc * frac;
            let predicted = s.predict_current_at_voltage(v);
            let loaded = s.load_at_voltage(v);
            assert_eq!(predicted, loaded.current);
        }
    }

    #[test]
    fn test_load_at_voltage_outside_range_is_zero() {
        let mut s = updated_string();
        assert_eq!(s.load_at_voltage(0.0), LoadState::zero());
        let voc = s.open_circuit_voltage();
        assert_eq!(s.load_at_voltage(voc * 1.01), LoadState::zero());
    }

    #[test]
    fn test_load_at_power_beyond_mpp_is_zero() {
        let mut s = updated_string();
        let over = s.mpp().power * 1.01;
        assert_eq!(s.load_at_power(over, true), LoadState::zero());
        assert_eq!(s.load_at_power(over, false), LoadState::zero());
    }

    #[test]
    fn test_load_at_power_sides_straddle_mpp() {
        let mut s = updated_string();
        let p = s.mpp().power * 0.5;
        let sc = s.load_at_power(p, true);
        let oc = s.load_at_power(p, false);
        assert_relative_eq!(sc.power, p, max_relative = 1e-9);
        assert_relative_eq!(oc.power, p, max_relative = 1e-9);
        assert!(sc.voltage <= s.mpp().voltage);
        assert!(oc.voltage >= s.mpp().voltage);
    }

    #[test]
    fn test_load_at_conductance_limits() {
        let mut s = updated_string();
        // Zero conductance floats to open circuit.
        let open = s.load_at_conductance(0.0);
        assert_relative_eq!(open.voltage, s.open_circuit_voltage(), max_relative = 1e-12);
        assert_eq!(open.current, 0.0);

        // A huge conductance pulls toward short circuit.
        let short = s.load_at_conductance(1e6);
        assert!(short.voltage < 1e-3);
        assert_relative_eq!(short.current, s.short_circuit_current(), max_relative = 1e-2);

        // The MPP conductance reproduces the MPP itself.
        let mpp = *s.mpp();
        let at_mpp = s.load_at_conductance(mpp.current / mpp.voltage);
        assert_relative_eq!(at_mpp.voltage, mpp.voltage, max_relative = 1e-9);
        assert_relative_eq!(at_mpp.power, mpp.power, max_relative = 1e-9);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut a = updated_string();
        let mut b = updated_string();
        b.update(&lit_input());
        assert_eq!(a.equiv_circuit(), b.equiv_circuit());
        assert_eq!(a.mpp(), b.mpp());
        assert_eq!(a.open_circuit_voltage(), b.open_circuit_voltage());
        let va = a.load_at_voltage(10.0);
        let vb = b.load_at_voltage(10.0);
        assert_eq!(va, vb);
    }

    #[test]
    fn test_power_degrade_scales_output() {
        let mut s = PvString::new("pv.string0", test_config()).unwrap();
        let mut input = lit_input();
        s.update(&input);
        let clean_isc = s.short_circuit_current();

        input.power_degrade.set(0.5);
        s.update(&input);
        assert_relative_eq!(s.short_circuit_current() * 2.0, clean_isc, max_relative = 1e-12);

        input.power_degrade.set(1.0);
        s.update(&input);
        assert_eq!(s.mpp().power, 0.0);
    }

    #[test]
    fn test_input_validation() {
        let mut input = lit_input();
        assert!(input.validate("pv").is_ok());
        input.exposed_fraction = 1.5;
        assert!(input.validate("pv").is_err());
        input.exposed_fraction = 1.0;
        input.photo_flux = -1.0;
        assert!(input.validate("pv").is_err());
    }

    #[test]
    fn test_rejects_uneven_bypass_interval() {
        let mut cfg = test_config();
        cfg.bypass_interval = 5; // does not divide 28
        assert!(PvString::new("pv.string0", cfg).is_err());
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(matches!(
            PvString::new("  ", test_config()),
            Err(VoltaicError::EmptyName)
        ));
    }
}

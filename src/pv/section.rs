//! Photovoltaic section: an array of identical strings under one
//! environment.
//!
//! The section turns the raw environment (illumination magnitude and
//! incidence angle, exposed fraction, temperature) into the shared string
//! input block, ticks the malfunction overrides once centrally, updates
//! every string, and aggregates the results. Summed terminal power is
//! reported negative so it can feed a thermal model as an absorbed-heat
//! term.

use crate::error::{Result, VoltaicError};
use crate::pv::string::{LoadState, PvString, StringConfig, StringInput};

/// Which trig function maps the incidence angle to a facing factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingOrientation {
    /// Cosine facing: full illumination at zero incidence angle.
    #[default]
    NormalIncidence,
    /// Sine facing: full illumination edge-on.
    EdgeIncidence,
}

/// Section configuration, immutable after initialization.
#[derive(Debug, Clone)]
pub struct SectionConfig {
    /// Trig function selecting the facing response.
    pub orientation: FacingOrientation,
    /// Exponent applied to the facing factor, bounded to [0.1, 10].
    pub angle_exponent: f64,
    /// Illumination fraction reaching the backside, in [0, 1].
    pub backside_reduction: f64,
    /// Reference flux for the percent-insolation indicator [W/m^2].
    pub reference_flux: f64,
    /// Number of parallel strings, at least 1.
    pub num_strings: usize,
    /// Configuration shared by every string.
    pub string: StringConfig,
}

impl SectionConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if !(0.1..=10.0).contains(&self.angle_exponent) {
            return Err(VoltaicError::invalid_config(
                name,
                "angle exponent must be in [0.1, 10]",
            ));
        }
        if !(0.0..=1.0).contains(&self.backside_reduction) {
            return Err(VoltaicError::invalid_config(
                name,
                "backside reduction must be in [0, 1]",
            ));
        }
        if self.reference_flux <= 0.0 {
            return Err(VoltaicError::invalid_config(
                name,
                "reference flux must be > 0",
            ));
        }
        if self.num_strings == 0 {
            return Err(VoltaicError::invalid_config(
                name,
                "section needs at least one string",
            ));
        }
        self.string.validate(name)
    }
}

/// Per-step environment input, mutable between steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionEnvironment {
    /// Illumination magnitude before facing effects [W/m^2].
    pub flux_magnitude: f64,
    /// Incidence angle [rad].
    pub incidence_angle: f64,
    /// Fraction of the section exposed to the illumination [0, 1].
    pub exposed_fraction: f64,
    /// Cell temperature [K].
    pub temperature: f64,
}

impl SectionEnvironment {
    fn validate(&self, name: &str) -> Result<()> {
        if self.flux_magnitude < 0.0 {
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
}

/// A photovoltaic section.
#[derive(Debug, Clone)]
pub struct PvSection {
    /// Instance name.
    pub name: String,
    config: SectionConfig,
    /// Environment input, set by the owner between steps.
    pub env: SectionEnvironment,
    /// Shared input block broadcast to every string each step; the
    /// malfunction overrides are armed here.
    input: StringInput,
    strings: Vec<PvString>,
    percent_insolation: f64,
    terminal_power: f64,
}

impl PvSection {
    /// Create a section, validating name, configuration and the initial
    /// environment.
    pub fn new(
        name: impl Into<String>,
        config: SectionConfig,
        env: SectionEnvironment,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VoltaicError::EmptyName);
        }
        config.validate(&name)?;
        env.validate(&name)?;

        let strings = (0..config.num_strings)
            .map(|i| PvString::new(format!("{name}.string{i}"), config.string.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            config,
            env,
            input: StringInput::default(),
            strings,
            percent_insolation: 0.0,
            terminal_power: 0.0,
        })
    }

    /// Facing factor for the current incidence angle: the configured trig
    /// response raised to the angle exponent, with the backside reduction
    /// applied when the panel faces away.
    fn facing_factor(&self) -> f64 {
        let raw = match self.config.orientation {
            FacingOrientation::NormalIncidence => self.env.incidence_angle.cos(),
            FacingOrientation::EdgeIncidence => self.env.incidence_angle.sin(),
        };
        let factor = raw.abs().powf(self.config.angle_exponent);
        if raw < 0.0 {
            factor * self.config.backside_reduction
        } else {
            factor
        }
    }

    /// Step the section: derive the string input from the environment,
    /// tick the malfunction overrides once, and update every string.
    pub fn update(&mut self, dt: f64) {
        self.input.photo_flux = self.env.flux_magnitude * self.facing_factor();
        self.input.exposed_fraction = self.env.exposed_fraction;
        self.input.temperature = self.env.temperature;
        self.input.apply_overrides(dt);

        for string in &mut self.strings {
            string.update(&self.input);
        }

        self.percent_insolation =
            100.0 * self.input.photo_flux / self.config.reference_flux;
        self.refresh_terminal_power();
    }

    /// Apply a terminal voltage to every (parallel) string.
    pub fn load_at_voltage(&mut self, voltage: f64) {
        for string in &mut self.strings {
            string.load_at_voltage(voltage);
        }
        self.refresh_terminal_power();
    }

    /// Split a requested output power evenly across the identical strings.
    pub fn load_at_power(&mut self, power: f64, prefer_short_circuit_side: bool) {
        let per_string = power / self.strings.len() as f64;
        for string in &mut self.strings {
            string.load_at_power(per_string, prefer_short_circuit_side);
        }
        self.refresh_terminal_power();
    }

    /// Split a resistive load conductance evenly across the strings.
    pub fn load_at_conductance(&mut self, conductance: f64) {
        let per_string = conductance / self.strings.len() as f64;
        for string in &mut self.strings {
            string.load_at_conductance(per_string);
        }
        self.refresh_terminal_power();
    }

    /// Put every string at its own maximum power point.
    pub fn load_at_mpp(&mut self) {
        for string in &mut self.strings {
            let v_mp = string.mpp().voltage;
            string.load_at_voltage(v_mp);
        }
        self.refresh_terminal_power();
    }

    fn refresh_terminal_power(&mut self) {
        self.terminal_power = -self
            .strings
            .iter()
            .map(|s| s.terminal().power)
            .sum::<f64>();
    }

    /// Summed terminal power, sign-flipped (negative while generating).
    pub fn terminal_power(&self) -> f64 {
        self.terminal_power
    }

    /// Effective illumination as a percentage of the reference flux.
    pub fn percent_insolation(&self) -> f64 {
        self.percent_insolation
    }

    /// The strings owned by this section.
    pub fn strings(&self) -> &[PvString] {
        &self.strings
    }

    /// Shared input block, for arming malfunction overrides.
    pub fn input_mut(&mut self) -> &mut StringInput {
        &mut self.input
    }

    /// Shared input block after the last update.
    pub fn input(&self) -> &StringInput {
        &self.input
    }

    /// Sum of every string's predicted current at a common terminal
    /// voltage, without mutating any string state.
    pub fn predict_current_at_voltage(&self, voltage: f64) -> f64 {
        self.strings
            .iter()
            .map(|s| s.predict_current_at_voltage(voltage))
            .sum()
    }

    /// Combined terminal state of the parallel strings.
    pub fn terminal(&self) -> LoadState {
        let mut out = LoadState::zero();
        for s in &self.strings {
            let t = s.terminal();
            out.current += t.current;
            out.power += t.power;
            out.voltage = t.voltage;
        }
        if out.voltage > 0.0 {
            out.conductance = out.current / out.voltage;
        }
        out
    }
}

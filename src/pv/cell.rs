//! Photovoltaic cell equivalent circuit.
//!
//! Single-diode model: a photo-generated source current `IL` feeding a
//! diode (saturation current `I0`, thermal voltage product `N*Vt`), a shunt
//! resistance `Rsh`, and a series resistance `Rs` to the terminal. The
//! circuit is a pure function of configuration plus the current environment
//! (illumination flux, temperature, degradation); it carries no state
//! between steps.
//!
//! Two interchangeable parameterizations exist, selected once at
//! construction:
//! - [`CellModel::Version1`] takes resistances and a conversion efficiency
//!   directly from configuration. Efficiency is range-checked but otherwise
//!   trusted, so the derived I-V curve follows it blindly.
//! - [`CellModel::Version2`] takes vendor performance points
//!   (Voc/Isc/Vmp/Imp) plus a diode ideality constant, derives the
//!   resistances from the points, and reports efficiency and fill factor as
//!   outputs for verification instead of accepting them as inputs.

use crate::error::{Result, VoltaicError};
use crate::{BOLTZMANN_OVER_CHARGE, MIN_RESISTANCE};

/// Resistance/coefficient-parameterized cell configuration.
#[derive(Debug, Clone)]
pub struct CellConfigV1 {
    /// Open-circuit voltage per cell at reference temperature [V].
    pub voc_ref: f64,
    /// Shunt resistance [ohm].
    pub rsh: f64,
    /// Series resistance [ohm].
    pub rs: f64,
    /// Cell surface area [m^2].
    pub surface_area: f64,
    /// Conversion efficiency (0, 1]. Drives the source current directly.
    pub efficiency: f64,
    /// Voc derating per kelvin away from reference [1/K].
    pub temperature_voltage_coeff: f64,
    /// Source-current derating per kelvin away from reference [1/K].
    pub temperature_current_coeff: f64,
    /// Reference cell temperature [K].
    pub ref_temperature: f64,
}

/// Performance-point-parameterized cell configuration.
#[derive(Debug, Clone)]
pub struct CellConfigV2 {
    /// Open-circuit voltage per cell at reference conditions [V].
    pub voc_ref: f64,
    /// Short-circuit current at reference conditions [A].
    pub isc_ref: f64,
    /// Maximum-power-point voltage at reference conditions [V].
    pub vmp_ref: f64,
    /// Maximum-power-point current at reference conditions [A].
    pub imp_ref: f64,
    /// Diode ideality constant (typically 1 to 2).
    pub ideality: f64,
    /// Cell surface area [m^2].
    pub surface_area: f64,
    /// Voc derating per kelvin away from reference [1/K].
    pub temperature_voltage_coeff: f64,
    /// Source-current derating per kelvin away from reference [1/K].
    pub temperature_current_coeff: f64,
    /// Reference cell temperature [K].
    pub ref_temperature: f64,
    /// Reference illumination flux [W/m^2].
    pub ref_flux: f64,
}

/// The computed equivalent circuit for the current environment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EquivCircuit {
    /// Photo-generated source current, pre-loss [A].
    pub il: f64,
    /// Diode saturation current [A].
    pub i0: f64,
    /// Thermal voltage product N*Vt [V].
    pub n_vt: f64,
    /// Shunt resistance, floored [ohm].
    pub rsh: f64,
    /// Series resistance, floored [ohm].
    pub rs: f64,
    /// Open-circuit voltage per cell [V].
    pub voc: f64,
    /// Short-circuit current [A].
    pub isc: f64,
    /// Per-cell maximum-power-point voltage [V].
    pub mpp_voltage: f64,
    /// Per-cell maximum-power-point current [A].
    pub mpp_current: f64,
    /// Fill factor Vmp*Imp / (Voc*Isc).
    pub fill_factor: f64,
    /// Conversion efficiency (input for version 1, derived for version 2).
    pub efficiency: f64,
}

/// Cell model variant, fixed at construction.
#[derive(Debug, Clone)]
pub enum CellModel {
    Version1(CellConfigV1),
    Version2(CellConfigV2),
}

impl CellModel {
    /// Validate the configuration. `name` is the owning instance name used
    /// in error messages.
    pub fn validate(&self, name: &str) -> Result<()> {
        match self {
            CellModel::Version1(c) => {
                if c.voc_ref <= 0.0 {
                    return Err(VoltaicError::invalid_config(name, "cell Voc must be > 0"));
                }
                if c.rsh <= 0.0 || c.rs <= 0.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell resistances must be > 0",
                    ));
                }
                if c.surface_area <= 0.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell surface area must be > 0",
                    ));
                }
                if c.efficiency <= 0.0 || c.efficiency > 1.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell efficiency must be in (0, 1]",
                    ));
                }
                validate_common(name, c.temperature_voltage_coeff, c.temperature_current_coeff, c.ref_temperature)
            }
            CellModel::Version2(c) => {
                if c.voc_ref <= 0.0 || c.vmp_ref <= 0.0 || c.vmp_ref >= c.voc_ref {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell performance points must satisfy 0 < Vmp < Voc",
                    ));
                }
                if c.isc_ref <= 0.0 || c.imp_ref <= 0.0 || c.imp_ref >= c.isc_ref {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell performance points must satisfy 0 < Imp < Isc",
                    ));
                }
                if c.ideality <= 0.0 || c.ideality > 10.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "diode ideality must be in (0, 10]",
                    ));
                }
                if c.surface_area <= 0.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "cell surface area must be > 0",
                    ));
                }
                if c.ref_flux <= 0.0 {
                    return Err(VoltaicError::invalid_config(
                        name,
                        "reference flux must be > 0",
                    ));
                }
                validate_common(name, c.temperature_voltage_coeff, c.temperature_current_coeff, c.ref_temperature)
            }
        }
    }

    /// Compute the equivalent circuit for the given illumination flux
    /// [W/m^2], cell temperature [K] and degradation fraction [0, 1].
    pub fn compute(&self, flux: f64, temperature: f64, degradation: f64) -> EquivCircuit {
        match self {
            CellModel::Version1(c) => {
                let derate_v = thermal_derate(c.temperature_voltage_coeff, temperature, c.ref_temperature);
                let derate_i = thermal_derate(c.temperature_current_coeff, temperature, c.ref_temperature);
                // Absorbed power times the (trusted) efficiency, expressed
                // as a current source at the open-circuit voltage.
                let il = (flux.max(0.0) * c.surface_area * c.efficiency * derate_i
                    * (1.0 - degradation.clamp(0.0, 1.0)))
                    / c.voc_ref;
                let voc = c.voc_ref * derate_v;
                let n_vt = BOLTZMANN_OVER_CHARGE * temperature.max(1.0);
                finish_circuit(il, voc, c.rsh, c.rs, n_vt, flux, c.surface_area, Some(c.efficiency))
            }
            CellModel::Version2(c) => {
                let derate_v = thermal_derate(c.temperature_voltage_coeff, temperature, c.ref_temperature);
                let derate_i = thermal_derate(c.temperature_current_coeff, temperature, c.ref_temperature);
                let il = c.isc_ref * (flux.max(0.0) / c.ref_flux) * derate_i
                    * (1.0 - degradation.clamp(0.0, 1.0));
                let voc = c.voc_ref * derate_v;
                let n_vt = c.ideality * BOLTZMANN_OVER_CHARGE * temperature.max(1.0);
                // Series slope from the Vmp-to-Voc drop, shunt slope from
                // the Isc-to-Imp drop: the classic two-point estimates.
                let rs = (c.voc_ref - c.vmp_ref) / c.imp_ref;
                let rsh = c.vmp_ref / (c.isc_ref - c.imp_ref);
                finish_circuit(il, voc, rsh, rs, n_vt, flux, c.surface_area, None)
            }
        }
    }
}

fn validate_common(name: &str, alpha_v: f64, alpha_i: f64, ref_temperature: f64) -> Result<()> {
    if !(-1.0..=1.0).contains(&alpha_v) || !(-1.0..=1.0).contains(&alpha_i) {
        return Err(VoltaicError::invalid_config(
            name,
            "temperature coefficients must be in [-1, 1] per kelvin",
        ));
    }
    if ref_temperature <= 0.0 {
        return Err(VoltaicError::invalid_config(
            name,
            "reference temperature must be > 0 K",
        ));
    }
    Ok(())
}

/// Linear thermal derating factor floored at zero so it never flips sign.
fn thermal_derate(coeff: f64, temperature: f64, ref_temperature: f64) -> f64 {
    (1.0 + coeff * (temperature - ref_temperature)).max(0.0)
}

/// Shared tail of both variants: derive I0, Isc, the per-cell knee point
/// and the reported ratios from the raw circuit values.
#[allow(clippy::too_many_arguments)]
fn finish_circuit(
    il: f64,
    voc: f64,
    rsh: f64,
    rs: f64,
    n_vt: f64,
    flux: f64,
    surface_area: f64,
    input_efficiency: Option<f64>,
) -> EquivCircuit {
    let rsh = rsh.max(MIN_RESISTANCE);
    let rs = rs.max(MIN_RESISTANCE);

    if il <= 0.0 || voc <= 0.0 {
        // Dark or fully degraded cell: zero output, resistances intact.
        return EquivCircuit {
            n_vt,
            rsh,
            rs,
            efficiency: input_efficiency.unwrap_or(0.0),
            ..EquivCircuit::default()
        };
    }

    // Saturation current chosen so the diode exactly cancels IL at Voc.
    let i0 = il / ((voc / n_vt).exp() - 1.0);
    // Terminal short-circuit current after the series/shunt divider.
    let isc = il * rsh / (rsh + rs);

    let (mpp_voltage, mpp_current) = knee_point(voc, isc, rs + n_vt / (il + i0), rsh);
    let fill_factor = if voc * isc > 0.0 {
        mpp_voltage * mpp_current / (voc * isc)
    } else {
        0.0
    };
    let efficiency = match input_efficiency {
        Some(e) => e,
        None => {
            let absorbed = flux * surface_area;
            if absorbed > 0.0 {
                mpp_voltage * mpp_current / absorbed
            } else {
                0.0
            }
        }
    };

    EquivCircuit {
        il,
        i0,
        n_vt,
        rsh,
        rs,
        voc,
        isc,
        mpp_voltage,
        mpp_current,
        fill_factor,
        efficiency,
    }
}

/// Direct maximum-power solve for a single-diode circuit whose internal
/// node sits at the open-circuit voltage: the short-circuit side of the
/// curve falls with the shunt slope (`i = isc - v/rsh`), the open-circuit
/// side with the combined series/forward-diode slope
/// (`i = (voc - v)/rser`). Their intersection is the knee, clamped into
/// the physical quadrant.
pub(crate) fn knee_point(voc: f64, isc: f64, rser: f64, rsh: f64) -> (f64, f64) {
    if voc <= 0.0 || isc <= 0.0 || rser >= rsh {
        return (0.0, 0.0);
    }
    let v = (rsh * (voc - isc * rser) / (rsh - rser)).clamp(0.0, voc);
    let i = (isc - v / rsh).clamp(0.0, isc);
    (v, i)
}

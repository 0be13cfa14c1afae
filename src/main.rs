//! Voltaic - photovoltaic network scenario driver
//!
//! Builds a small network (a photovoltaic section feeding a resistive
//! load), steps it through a transient, and prints one CSV row per step.
//! An illumination malfunction can be armed partway through the run to
//! exercise the sinusoidal ramp injection.
//!
//! # Usage
//!
//! ```bash
//! voltaic --strings 4 --steps 600 --malf-start 20 > run.csv
//! ```

use clap::Parser;
use voltaic_core::{
    link::{Conductor, ConductorConfig, ConductorInput, NetworkLink, PvArrayLink},
    pv::{
        CellConfigV2, CellModel, FacingOrientation, PvSection, SectionConfig,
        SectionEnvironment, StringConfig,
    },
    Network, NodeId, Result,
};

/// Photovoltaic network scenario driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of parallel strings in the section
    #[arg(long, default_value_t = 4)]
    strings: usize,

    /// Series cells per string
    #[arg(long, default_value_t = 28)]
    cells: usize,

    /// Cells per bypass-diode group
    #[arg(long, default_value_t = 7)]
    bypass_interval: usize,

    /// Illumination magnitude in W/m^2
    #[arg(long, default_value_t = 1361.0)]
    flux: f64,

    /// Illumination incidence angle in degrees
    #[arg(long, default_value_t = 0.0)]
    incidence_deg: f64,

    /// Load conductance in siemens
    #[arg(long, default_value_t = 0.05)]
    load_conductance: f64,

    /// Time step in seconds
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Number of major steps to run
    #[arg(long, default_value_t = 300)]
    steps: usize,

    /// Time at which the illumination malfunction arms, in seconds
    /// (negative disables it)
    #[arg(long, default_value_t = -1.0)]
    malf_start: f64,

    /// Malfunction duration in seconds
    #[arg(long, default_value_t = 10.0)]
    malf_duration: f64,

    /// Malfunction ramp-in/ramp-out time in seconds
    #[arg(long, default_value_t = 2.0)]
    malf_ramp: f64,

    /// Malfunction target illumination in W/m^2
    #[arg(long, default_value_t = 0.0)]
    malf_flux: f64,
}

fn build_section(args: &Args) -> Result<PvSection> {
    PvSection::new(
        "pv",
        SectionConfig {
            orientation: FacingOrientation::NormalIncidence,
            angle_exponent: 1.0,
            backside_reduction: 0.1,
            reference_flux: 1361.0,
            num_strings: args.strings,
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
                    ref_flux: 1361.0,
                }),
                num_cells: args.cells,
                bypass_interval: args.bypass_interval,
                bypass_diode_drop: 0.7,
                blocking_diode_drop: 0.7,
            },
        },
        SectionEnvironment {
            flux_magnitude: args.flux,
            incidence_angle: args.incidence_deg.to_radians(),
            exposed_fraction: 1.0,
            temperature: 300.0,
        },
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut net = Network::new(2);
    let pv = net.add_link(NetworkLink::PvArray(PvArrayLink::new(
        build_section(&args)?,
        NodeId(1),
        NodeId::GROUND,
    )?))?;
    net.add_link(NetworkLink::Conductor(Conductor::new(
        ConductorConfig::new("load", args.load_conductance),
        ConductorInput::default(),
        NodeId(1),
        NodeId::GROUND,
    )?))?;

    println!("time_s,flux_w_m2,percent_insolation,terminal_v,terminal_a,terminal_w,minor_steps");

    let mut malf_armed = false;
    for n in 0..args.steps {
        let t = n as f64 * args.dt;

        if !malf_armed && args.malf_start >= 0.0 && t >= args.malf_start {
            if let NetworkLink::PvArray(p) = net.link_mut(pv) {
                p.section.input_mut().flux_override.arm(
                    args.malf_flux,
                    args.malf_duration,
                    args.malf_ramp,
                );
            }
            malf_armed = true;
        }

        let minors = net.step(args.dt)?;

        if let NetworkLink::PvArray(p) = net.link(pv) {
            let terminal = p.section.terminal();
            println!(
                "{:.3},{:.3},{:.2},{:.4},{:.4},{:.4},{}",
                t,
                p.section.input().photo_flux,
                p.section.percent_insolation(),
                terminal.voltage,
                terminal.current,
                terminal.power,
                minors,
            );
        }
    }

    Ok(())
}

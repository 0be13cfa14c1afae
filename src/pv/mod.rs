//! Photovoltaic power-generation stack.
//!
//! Three layers, each recomputed per step from configuration plus the
//! current environment:
//! - [`cell`] - single-diode equivalent circuit, two parameterizations
//! - [`string`] - series cells with bypass groups, MPP and load resolution
//! - [`section`] - strings aggregated under one environment
//!
//! [`malfunction`] holds the timed override state machines injected through
//! the shared string input block.

pub mod cell;
pub mod malfunction;
pub mod section;
pub mod string;

pub use cell::{CellConfigV1, CellConfigV2, CellModel, EquivCircuit};
pub use malfunction::{FluxRampOverride, GroupFailure, OverridePhase, PowerDegrade, SteppedOverride};
pub use section::{FacingOrientation, PvSection, SectionConfig, SectionEnvironment};
pub use string::{LoadState, PvString, StringConfig, StringInput};

//! # beamcheck - beam injection regression checks for PIC simulations
//!
//! `beamcheck` verifies that a particle-in-cell code ingests an external
//! particle beam correctly: it writes a small synthetic beam as an openPMD
//! series, and once the simulation has run, reads the particles back from
//! the plotfile and compares weight, position and velocity.
//!
//! ## Features
//!
//! - `openpmd` (default): openPMD series model with a JSON backend
//! - `plotfile` (default): plotfile particle reader on memory-mapped files
//! - `hdf5`: HDF5 backend for openPMD series (needs a system HDF5)
//!
//! ## Example
//!
//! ```no_run
//! use beamcheck::regression::{self, CheckConfig, FixtureConfig};
//!
//! // Before the run: write the beam the simulation will inject
//! regression::write_fixture(&FixtureConfig::default()).unwrap();
//!
//! // After the run: compare the output with it
//! let report = regression::run(&CheckConfig::default()).unwrap();
//! assert!(report.passed(), "{:?}", report.failures());
//! ```

pub use beam::{Axis, Beam, BeamError};
pub use inputs::{Inputs, InputsError};
pub use units::UnitSystem;

#[cfg(feature = "openpmd")]
pub use openpmd::{OpenPmdError, Series};

#[cfg(feature = "plotfile")]
pub use check::{CheckError, Report, Tolerances};
#[cfg(feature = "plotfile")]
pub use plotfile::{Endianness, ParticleData, ParticleReader, Plotfile, PlotfileError};

pub mod beam;
pub mod inputs;
pub mod units;

#[cfg(feature = "openpmd")]
pub mod openpmd;

#[cfg(feature = "plotfile")]
pub mod check;
#[cfg(feature = "plotfile")]
pub mod plotfile;

#[cfg(all(feature = "openpmd", feature = "plotfile"))]
pub mod regression;

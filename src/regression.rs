//! # Beam injection regression check
//!
//! Ties the pieces together the way the check is run around a simulation:
//!
//! 1. [`write_fixture`] writes the synthetic beam as an openPMD series;
//! 2. the simulation (run separately) injects it and writes a plotfile;
//! 3. [`run`] reads the beam file back, the total charge from the input
//!    deck and the particles from the plotfile, then compares them.

use crate::beam::{Beam, DEFAULT_PARTICLE_COUNT};
use crate::check::{self, CheckError, ExpectedBeam, Report, Tolerances};
use crate::inputs::{Inputs, InputsError, DEFAULT_CHARGE_KEY};
use crate::openpmd::{self, OpenPmdError, DEFAULT_ITERATION};
use crate::plotfile::{Endianness, Plotfile, PlotfileError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Species name the simulation gives the injected beam in its output
pub const DEFAULT_OUTPUT_SPECIES: &str = "beam";

/// Errors aborting a regression check before a verdict
#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("beam file: {0}")]
    OpenPmd(#[from] OpenPmdError),

    #[error("inputs: {0}")]
    Inputs(#[from] InputsError),

    #[error("plotfile: {0}")]
    Plotfile(#[from] PlotfileError),

    #[error("comparison: {0}")]
    Check(#[from] CheckError),

    /// The plotfile has no weight for the species, so no beam was injected
    #[error("species `{0}` has no particle_weight in the plotfile")]
    NoBeam(String),
}

/// Where the beam file is written and what it holds
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub path: PathBuf,
    pub particles: usize,
    pub iteration: u64,
    pub species: String,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("electrons_opmd.json"),
            particles: DEFAULT_PARTICLE_COUNT,
            iteration: DEFAULT_ITERATION,
            species: crate::beam::DEFAULT_SPECIES.to_string(),
        }
    }
}

/// Write the synthetic beam and return it
pub fn write_fixture(config: &FixtureConfig) -> Result<Beam, RegressionError> {
    let mut beam = Beam::synthetic(config.particles);
    beam.species = config.species.clone();
    openpmd::write_beam(&config.path, config.iteration, &beam)?;
    info!(
        path = %config.path.display(),
        particles = beam.len(),
        species = %beam.species,
        units = beam.units.name(),
        "beam fixture written"
    );
    Ok(beam)
}

/// Inputs of a check run
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// openPMD beam file given to the simulation
    pub beam: PathBuf,
    pub iteration: u64,
    /// Species name inside the beam file
    pub beam_species: String,
    /// Simulation input deck
    pub inputs: PathBuf,
    /// Key of the total beam charge in the input deck
    pub charge_key: String,
    /// Plotfile directory to check
    pub plotfile: PathBuf,
    /// Species name inside the plotfile
    pub output_species: String,
    pub endianness: Endianness,
    pub tolerances: Tolerances,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            beam: PathBuf::from("electrons_opmd.json"),
            iteration: DEFAULT_ITERATION,
            beam_species: crate::beam::DEFAULT_SPECIES.to_string(),
            inputs: PathBuf::from("input"),
            charge_key: DEFAULT_CHARGE_KEY.to_string(),
            plotfile: PathBuf::from("diags/plotfiles/plt00000"),
            output_species: DEFAULT_OUTPUT_SPECIES.to_string(),
            endianness: Endianness::Little,
            tolerances: Tolerances::default(),
        }
    }
}

/// Run the comparison and return the report; the caller decides what a
/// failed report means
pub fn run(config: &CheckConfig) -> Result<Report, RegressionError> {
    let beam = openpmd::read_beam(&config.beam, config.iteration, &config.beam_species)?;
    let q_tot = Inputs::from_path(&config.inputs)?.get_f64(&config.charge_key)?;
    let expected = ExpectedBeam::from_beam(&beam, q_tot)?;
    info!(
        particles = expected.len(),
        weight = expected.weight,
        q_tot,
        "expected beam"
    );

    let plotfile = Plotfile::open(&config.plotfile)?;
    if !plotfile.has_component(&config.output_species, "particle_weight")? {
        return Err(RegressionError::NoBeam(config.output_species.clone()));
    }
    let observed = plotfile
        .particles(&config.output_species)
        .with_endianness(config.endianness)
        .build()?
        .read_all()?;
    info!(
        plotfile = %config.plotfile.display(),
        time = plotfile.time(),
        particles = observed.len(),
        "read plotfile"
    );

    Ok(check::compare(&expected, &observed, &config.tolerances)?)
}

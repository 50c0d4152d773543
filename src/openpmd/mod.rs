//! # openPMD particle series
//!
//! An in-memory model of the part of the openPMD standard needed to hand a
//! particle beam to a simulation: one series, its iterations, the particle
//! species of each iteration and their records.
//!
//! Records follow openPMD conventions:
//! - a record (`position`, `velocity`, `mass`, ...) carries a
//!   `unitDimension` and a `timeOffset`;
//! - each component (`x`, `vx`, or the scalar component) carries `unitSI`
//!   and holds either a dataset or a constant `value` with a `shape`.
//!
//! Serialization is delegated to a [`SeriesBackend`], chosen from the file
//! extension: `.json` files use the JSON backend, `.h5`/`.hdf5` files use
//! HDF5 when the `hdf5` feature is enabled.
//!
//! ```no_run
//! use beamcheck::openpmd::Series;
//! use beamcheck::Beam;
//!
//! let mut series = Series::new();
//! series.add_beam(1, &Beam::synthetic(5));
//! series.write("electrons_opmd.json").unwrap();
//! ```

#[cfg(feature = "hdf5")]
pub mod h5;
pub mod json;

use crate::beam::{Beam, BeamError};
use crate::units::{self, UnitDimension, UnitSystem};
use glam::DVec3;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Version of the openPMD standard written
pub const OPENPMD_VERSION: &str = "1.1.0";

/// Path of an iteration group, `%T` being the iteration index
pub const BASE_PATH: &str = "/data/%T/";

/// Path of the particle species below an iteration
pub const PARTICLES_PATH: &str = "particles/";

/// Name used for the single component of a scalar record
pub const SCALAR: &str = "\u{b}Scalar";

/// Iteration the beam is stored under by default
pub const DEFAULT_ITERATION: u64 = 1;

const POSITION_COMPONENTS: [&str; 3] = ["x", "y", "z"];
const VELOCITY_COMPONENTS: [&str; 3] = ["vx", "vy", "vz"];

/// Possible errors when reading or writing an openPMD series
#[derive(Error, Debug)]
pub enum OpenPmdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// The file does not follow the openPMD layout
    #[error("openPMD format error: {0}")]
    Format(String),

    #[error("iteration {0} not found in series")]
    MissingIteration(u64),

    #[error("particle species `{0}` not found")]
    MissingSpecies(String),

    #[error("record `{0}` not found")]
    MissingRecord(String),

    /// No backend is available for this file extension
    #[error("no openPMD backend for `{0}`")]
    UnsupportedBackend(String),

    #[error(transparent)]
    Beam(#[from] BeamError),
}

/// Data held by a record component
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentData {
    /// Same value for every particle
    Constant { value: f64, shape: Vec<u64> },
    /// One value per particle
    Values(Vec<f64>),
}

/// A record component and its conversion factor to SI
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub unit_si: f64,
    pub data: ComponentData,
}

impl Component {
    pub fn values(unit_si: f64, values: Vec<f64>) -> Self {
        Self {
            unit_si,
            data: ComponentData::Values(values),
        }
    }

    pub fn constant(unit_si: f64, value: f64, len: usize) -> Self {
        Self {
            unit_si,
            data: ComponentData::Constant {
                value,
                shape: vec![len as u64],
            },
        }
    }

    /// Number of particles described by this component
    pub fn len(&self) -> usize {
        match &self.data {
            ComponentData::Constant { shape, .. } => shape.iter().product::<u64>() as usize,
            ComponentData::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values converted to SI, constants expanded to their shape
    pub fn to_si(&self) -> Vec<f64> {
        match &self.data {
            ComponentData::Constant { value, .. } => vec![value * self.unit_si; self.len()],
            ComponentData::Values(v) => v.iter().map(|x| x * self.unit_si).collect(),
        }
    }
}

/// A physical quantity of a species, split into components
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub unit_dimension: UnitDimension,
    pub time_offset: f64,
    pub components: BTreeMap<String, Component>,
}

impl Record {
    /// Record with a single scalar component
    pub fn scalar(unit_dimension: UnitDimension, component: Component) -> Self {
        let mut components = BTreeMap::new();
        components.insert(SCALAR.to_string(), component);
        Self {
            unit_dimension,
            time_offset: 0.0,
            components,
        }
    }

    /// Record with named vector components
    pub fn vector<'a>(
        unit_dimension: UnitDimension,
        components: impl IntoIterator<Item = (&'a str, Component)>,
    ) -> Self {
        Self {
            unit_dimension,
            time_offset: 0.0,
            components: components
                .into_iter()
                .map(|(name, c)| (name.to_string(), c))
                .collect(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.components.len() == 1 && self.components.contains_key(SCALAR)
    }

    pub fn component(&self, name: &str) -> Result<&Component, OpenPmdError> {
        self.components
            .get(name)
            .ok_or_else(|| OpenPmdError::MissingRecord(name.to_string()))
    }
}

/// All records of one particle species
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSpecies {
    pub records: BTreeMap<String, Record>,
}

impl ParticleSpecies {
    /// Lay a beam out as openPMD records.
    ///
    /// Positions and velocities keep the beam's units and get a matching
    /// `unitSI`; mass and charge are stored as constants in SI.
    pub fn from_beam(beam: &Beam) -> Self {
        let n = beam.len();
        let length_si = beam.units.length_to_si();
        let velocity_si = beam.units.velocity_to_si();

        let column = |vs: &[DVec3], i: usize| vs.iter().map(|v| v[i]).collect::<Vec<f64>>();

        let mut records = BTreeMap::new();
        records.insert(
            "mass".to_string(),
            Record::scalar(units::MASS, Component::constant(1.0, beam.mass, n)),
        );
        records.insert(
            "charge".to_string(),
            Record::scalar(units::CHARGE, Component::constant(1.0, beam.charge, n)),
        );
        records.insert(
            "position".to_string(),
            Record::vector(
                units::LENGTH,
                POSITION_COMPONENTS
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (*name, Component::values(length_si, column(beam.positions(), i)))),
            ),
        );
        records.insert(
            "positionOffset".to_string(),
            Record::vector(
                units::LENGTH,
                POSITION_COMPONENTS
                    .iter()
                    .map(|name| (*name, Component::constant(length_si, 0.0, n))),
            ),
        );
        records.insert(
            "velocity".to_string(),
            Record::vector(
                units::VELOCITY,
                VELOCITY_COMPONENTS
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        (*name, Component::values(velocity_si, column(beam.velocities(), i)))
                    }),
            ),
        );
        Self { records }
    }

    pub fn record(&self, name: &str) -> Result<&Record, OpenPmdError> {
        self.records
            .get(name)
            .ok_or_else(|| OpenPmdError::MissingRecord(name.to_string()))
    }

    /// Rebuild a beam in SI units.
    ///
    /// `positionOffset` is added to `position` when present.
    pub fn to_beam(&self, name: &str) -> Result<Beam, OpenPmdError> {
        let position = self.record("position")?;
        let velocity = self.record("velocity")?;
        let offset = self.records.get("positionOffset");

        let mut pos_cols = Vec::with_capacity(3);
        for axis in POSITION_COMPONENTS {
            let mut col = position.component(axis)?.to_si();
            if let Some(offset) = offset {
                let off = offset.component(axis)?.to_si();
                if off.len() != col.len() {
                    return Err(OpenPmdError::Format(format!(
                        "positionOffset/{axis} has {} entries, position/{axis} has {}",
                        off.len(),
                        col.len()
                    )));
                }
                col.iter_mut().zip(off).for_each(|(p, o)| *p += o);
            }
            pos_cols.push(col);
        }
        let vel_cols = VELOCITY_COMPONENTS
            .iter()
            .map(|axis| velocity.component(axis).map(Component::to_si))
            .collect::<Result<Vec<_>, _>>()?;

        let n = pos_cols[0].len();
        if pos_cols.iter().chain(vel_cols.iter()).any(|c| c.len() != n) {
            return Err(OpenPmdError::Format(format!(
                "species `{name}` has components of different lengths"
            )));
        }

        let positions = (0..n)
            .map(|i| DVec3::new(pos_cols[0][i], pos_cols[1][i], pos_cols[2][i]))
            .collect();
        let velocities = (0..n)
            .map(|i| DVec3::new(vel_cols[0][i], vel_cols[1][i], vel_cols[2][i]))
            .collect();

        let mass = scalar_value(self.record("mass")?)?;
        let charge = scalar_value(self.record("charge")?)?;

        Ok(Beam::new(name, mass, charge, UnitSystem::Si, positions, velocities)?)
    }
}

/// First SI value of a scalar record (mass and charge are per species)
fn scalar_value(record: &Record) -> Result<f64, OpenPmdError> {
    let component = record.component(SCALAR)?;
    match &component.data {
        ComponentData::Constant { value, .. } => Ok(value * component.unit_si),
        ComponentData::Values(v) => v
            .first()
            .map(|x| x * component.unit_si)
            .ok_or_else(|| OpenPmdError::Format("empty scalar record".to_string())),
    }
}

/// One time step of a series
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub time: f64,
    pub dt: f64,
    pub time_unit_si: f64,
    pub species: BTreeMap<String, ParticleSpecies>,
}

impl Default for Iteration {
    fn default() -> Self {
        Self {
            time: 0.0,
            dt: 1.0,
            time_unit_si: 1.0,
            species: BTreeMap::new(),
        }
    }
}

impl Iteration {
    pub fn species(&self, name: &str) -> Result<&ParticleSpecies, OpenPmdError> {
        self.species
            .get(name)
            .ok_or_else(|| OpenPmdError::MissingSpecies(name.to_string()))
    }
}

/// An openPMD series using group-based iteration encoding
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub software: String,
    pub iterations: BTreeMap<u64, Iteration>,
}

impl Default for Series {
    fn default() -> Self {
        Self::new()
    }
}

impl Series {
    pub fn new() -> Self {
        Self {
            software: env!("CARGO_PKG_NAME").to_string(),
            iterations: BTreeMap::new(),
        }
    }

    /// Store a beam as a species of the given iteration, creating the
    /// iteration if needed
    pub fn add_beam(&mut self, iteration: u64, beam: &Beam) {
        let it = self.iterations.entry(iteration).or_default();
        it.time_unit_si = beam.units.time_to_si();
        it.species
            .insert(beam.species.clone(), ParticleSpecies::from_beam(beam));
    }

    pub fn iteration(&self, index: u64) -> Result<&Iteration, OpenPmdError> {
        self.iterations
            .get(&index)
            .ok_or(OpenPmdError::MissingIteration(index))
    }

    /// Write the series, picking the backend from the file extension
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), OpenPmdError> {
        let path = path.as_ref();
        let backend = backend_for(path)?;
        debug!(path = %path.display(), backend = backend.name(), "writing openPMD series");
        backend.write(self, path)?;
        info!(
            path = %path.display(),
            iterations = self.iterations.len(),
            "openPMD series written"
        );
        Ok(())
    }

    /// Read a series, picking the backend from the file extension
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, OpenPmdError> {
        let path = path.as_ref();
        let backend = backend_for(path)?;
        debug!(path = %path.display(), backend = backend.name(), "reading openPMD series");
        backend.read(path)
    }
}

/// A storage format for openPMD series
pub trait SeriesBackend {
    fn name(&self) -> &'static str;

    /// Write the whole series to `path`, replacing any existing file
    fn write(&self, series: &Series, path: &Path) -> Result<(), OpenPmdError>;

    fn read(&self, path: &Path) -> Result<Series, OpenPmdError>;
}

/// Select a backend from the file extension
pub fn backend_for(path: &Path) -> Result<Box<dyn SeriesBackend>, OpenPmdError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => Ok(Box::new(json::JsonBackend)),
        #[cfg(feature = "hdf5")]
        "h5" | "hdf5" => Ok(Box::new(h5::Hdf5Backend)),
        _ => Err(OpenPmdError::UnsupportedBackend(path.display().to_string())),
    }
}

/// Write a single beam under `iteration` of a fresh series
pub fn write_beam<P: AsRef<Path>>(path: P, iteration: u64, beam: &Beam) -> Result<(), OpenPmdError> {
    let mut series = Series::new();
    series.add_beam(iteration, beam);
    series.write(path)
}

/// Read one species of one iteration back as an SI beam
pub fn read_beam<P: AsRef<Path>>(
    path: P,
    iteration: u64,
    species: &str,
) -> Result<Beam, OpenPmdError> {
    let series = Series::read(path)?;
    series.iteration(iteration)?.species(species)?.to_beam(species)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::Axis;

    #[test]
    fn species_layout_from_beam() {
        let beam = Beam::synthetic(5);
        let species = ParticleSpecies::from_beam(&beam);

        let names: Vec<_> = species.records.keys().cloned().collect();
        assert_eq!(
            names,
            ["charge", "mass", "position", "positionOffset", "velocity"]
        );

        let mass = species.record("mass").unwrap();
        assert!(mass.is_scalar());
        assert_eq!(mass.unit_dimension, units::MASS);

        let x = species.record("position").unwrap().component("x").unwrap();
        assert_eq!(x.unit_si, 1.0e-3);
        assert_eq!(x.len(), 5);

        let vy = species.record("velocity").unwrap().component("vy").unwrap();
        assert!((vy.unit_si - 1.0e6).abs() < 1e-6);
    }

    #[test]
    fn to_beam_converts_to_si() {
        let beam = Beam::synthetic(3);
        let species = ParticleSpecies::from_beam(&beam);
        let si = species.to_beam("electrons").unwrap();

        assert_eq!(si.units, UnitSystem::Si);
        assert_eq!(si.mass, beam.mass);
        let x = si.position_axis(Axis::X);
        assert!((x[2] - 3.0e-9).abs() < 1e-20);
        let vz = si.velocity_axis(Axis::Z);
        assert!((vz[0] - 3.1e-2).abs() < 1e-12);
    }

    #[test]
    fn missing_lookups() {
        let mut series = Series::new();
        series.add_beam(1, &Beam::synthetic(1));
        assert!(matches!(
            series.iteration(2),
            Err(OpenPmdError::MissingIteration(2))
        ));
        let it = series.iteration(1).unwrap();
        assert!(matches!(
            it.species("beam"),
            Err(OpenPmdError::MissingSpecies(_))
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            backend_for(Path::new("beam.bp")),
            Err(OpenPmdError::UnsupportedBackend(_))
        ));
        assert_eq!(backend_for(Path::new("beam.JSON")).unwrap().name(), "json");
    }
}

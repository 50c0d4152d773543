//! # Plotfile reader
//!
//! Reads the simulation output snapshots ("plotfiles") that the PIC code
//! writes after a run. A plotfile is a directory:
//!
//! ```text
//! plt00000/
//!   Header                 mesh header: fields, time, domain extent
//!   Level_0/...            mesh data (not read here)
//!   beam/                  one directory per particle species
//!     Header               particle header: components, grids
//!     Level_0/DATA_00000   binary particle data
//! ```
//!
//! Only the mesh header and the particle data are decoded; mesh field data
//! is never needed to check a beam.
//!
//! ## Example
//!
//! ```no_run
//! use beamcheck::plotfile::Plotfile;
//!
//! let plt = Plotfile::open("diags/plotfiles/plt00000").unwrap();
//! let data = plt.particles("beam").build().unwrap().read_all().unwrap();
//! println!("{} particles, weights {:?}", data.len(), data.component("particle_weight"));
//! ```

mod particles;

pub use particles::{
    GridLocation, ParticleData, ParticleHeader, ParticleReader, ParticleReaderBuilder, Precision,
};

use glam::DVec3;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Byte order of the binary particle data
///
/// Plotfiles are written in the native order of the machine that ran the
/// simulation, which is little endian on every current HPC platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Little endian (most common)
    #[default]
    Little,
    /// Big endian
    Big,
}

/// Possible errors when reading plotfiles
#[derive(Error, Debug)]
pub enum PlotfileError {
    /// I/O errors from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format errors from an invalid header or data file
    #[error("plotfile format error: {0}")]
    Format(String),

    /// The header parses but describes something unsupported
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested particle species is not in the plotfile
    #[error("particle species `{0}` not found")]
    MissingSpecies(String),

    /// The requested particle component is not in the species
    #[error("particle component `{0}` not found")]
    MissingComponent(String),
}

/// Whitespace-separated tokens of a text header, with context for errors
pub(crate) struct HeaderTokens<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    source: &'a str,
}

impl<'a> HeaderTokens<'a> {
    pub(crate) fn new(text: &'a str, source: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace(),
            source,
        }
    }

    pub(crate) fn next_str(&mut self, what: &str) -> Result<&'a str, PlotfileError> {
        self.tokens.next().ok_or_else(|| {
            PlotfileError::Format(format!("{}: unexpected end reading {what}", self.source))
        })
    }

    pub(crate) fn next_parsed<T: FromStr>(&mut self, what: &str) -> Result<T, PlotfileError> {
        let token = self.next_str(what)?;
        token.parse().map_err(|_| {
            PlotfileError::Format(format!("{}: invalid {what} `{token}`", self.source))
        })
    }
}

/// A plotfile directory and its mesh header
#[derive(Debug, Clone)]
pub struct Plotfile {
    /// Plotfile directory
    dir: PathBuf,

    /// Header version string
    version: String,

    /// Mesh field names
    fields: Vec<String>,

    /// Space dimension, 1 to 3
    dim: usize,

    /// Simulation time (s)
    time: f64,

    /// Finest refinement level
    finest_level: usize,

    /// Domain corners (m); axes beyond `dim` are zero
    prob_lo: DVec3,
    prob_hi: DVec3,
}

impl Plotfile {
    /// Open a plotfile directory and parse its `Header`
    ///
    /// # Arguments
    ///
    /// * `dir` - Path to the plotfile directory, e.g. `diags/plotfiles/plt00000`
    ///
    /// # Returns
    ///
    /// A Result containing either the Plotfile or an error
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, PlotfileError> {
        let dir = dir.as_ref().to_path_buf();
        let header_path = dir.join("Header");
        let text = fs::read_to_string(&header_path)?;
        let source = header_path.display().to_string();
        let mut tokens = HeaderTokens::new(&text, &source);

        let version = tokens.next_str("version")?.to_string();
        let nfields: usize = tokens.next_parsed("field count")?;
        let fields = (0..nfields)
            .map(|_| tokens.next_str("field name").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        let dim: usize = tokens.next_parsed("space dimension")?;
        if !(1..=3).contains(&dim) {
            return Err(PlotfileError::Validation(format!(
                "{source}: space dimension {dim} is not 1, 2 or 3"
            )));
        }
        let time: f64 = tokens.next_parsed("time")?;
        let finest_level: usize = tokens.next_parsed("finest level")?;

        let mut prob_lo = DVec3::ZERO;
        for i in 0..dim {
            prob_lo[i] = tokens.next_parsed("domain lower edge")?;
        }
        let mut prob_hi = DVec3::ZERO;
        for i in 0..dim {
            prob_hi[i] = tokens.next_parsed("domain upper edge")?;
        }

        debug!(
            path = %dir.display(),
            %version,
            nfields,
            dim,
            time,
            "opened plotfile"
        );

        Ok(Self {
            dir,
            version,
            fields,
            dim,
            time,
            finest_level,
            prob_lo,
            prob_hi,
        })
    }

    /// Returns the plotfile directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Header version string, e.g. `HyperCLaw-V1.1`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Names of the mesh fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the space dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Simulation time of the snapshot (s)
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns the finest refinement level
    pub fn finest_level(&self) -> usize {
        self.finest_level
    }

    /// Lower corner of the simulation domain (m)
    pub fn domain_left_edge(&self) -> DVec3 {
        self.prob_lo
    }

    /// Upper corner of the simulation domain (m)
    pub fn domain_right_edge(&self) -> DVec3 {
        self.prob_hi
    }

    /// Domain extent as `[xmin, xmax, ymin, ymax, zmin, zmax]`
    pub fn extent(&self) -> [f64; 6] {
        [
            self.prob_lo.x,
            self.prob_hi.x,
            self.prob_lo.y,
            self.prob_hi.y,
            self.prob_lo.z,
            self.prob_hi.z,
        ]
    }

    /// Particle species present in the plotfile, sorted by name.
    ///
    /// A species is any subdirectory holding a `Header`, except the mesh
    /// level directories.
    pub fn species(&self) -> Result<Vec<String>, PlotfileError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("Level_") {
                continue;
            }
            if entry.path().join("Header").is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Start building a reader for one species
    ///
    /// # Arguments
    ///
    /// * `species` - Name of the species subdirectory, e.g. `beam`
    ///
    /// # Returns
    ///
    /// A ParticleReaderBuilder for the species, options still to be set
    pub fn particles(&self, species: &str) -> ParticleReaderBuilder {
        ParticleReaderBuilder::new(&self.dir, species)
    }

    /// True if the species exists and has the given real component.
    ///
    /// Accepts both the raw name (`weight`) and the `particle_` prefixed
    /// one (`particle_weight`).
    pub fn has_component(&self, species: &str, name: &str) -> Result<bool, PlotfileError> {
        let header_path = self.dir.join(species).join("Header");
        if !header_path.is_file() {
            return Ok(false);
        }
        let header = ParticleHeader::from_path(&header_path)?;
        Ok(header.real_index(name).is_some() || header.is_position(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "HyperCLaw-V1.1
3
Ex
Ey
Ez
3
1.5e-15
0
-2.0e-5 -2.0e-5 -1.0e-4
2.0e-5 2.0e-5 1.0e-4

((0,0,0) (31,31,63) (0,0,0))
0
1.25e-06 1.25e-06 3.125e-06
0
0
0 1 1.5e-15
0
-2.0e-5 2.0e-5
-2.0e-5 2.0e-5
-1.0e-4 1.0e-4
Level_0/Cell
";

    #[test]
    fn tokens_report_context() {
        let mut t = HeaderTokens::new("3 x", "Header");
        assert_eq!(t.next_parsed::<usize>("count").unwrap(), 3);
        let err = t.next_parsed::<usize>("count").unwrap_err();
        assert!(err.to_string().contains("invalid count `x`"));
        let err = t.next_str("name").unwrap_err();
        assert!(err.to_string().contains("unexpected end"));
    }

    #[test]
    fn parses_mesh_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Header"), HEADER).unwrap();

        let plt = Plotfile::open(dir.path()).unwrap();
        assert_eq!(plt.version(), "HyperCLaw-V1.1");
        assert_eq!(plt.fields(), ["Ex", "Ey", "Ez"]);
        assert_eq!(plt.dim(), 3);
        assert_eq!(plt.time(), 1.5e-15);
        assert_eq!(plt.finest_level(), 0);
        assert_eq!(
            plt.extent(),
            [-2.0e-5, 2.0e-5, -2.0e-5, 2.0e-5, -1.0e-4, 1.0e-4]
        );
        assert!(plt.species().unwrap().is_empty());
        assert!(!plt.has_component("beam", "particle_weight").unwrap());
    }

    #[test]
    fn rejects_bad_dimension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Header"), "HyperCLaw-V1.1\n0\n4\n0.0\n0\n").unwrap();
        assert!(matches!(
            Plotfile::open(dir.path()),
            Err(PlotfileError::Validation(_))
        ));
    }

    #[test]
    fn missing_header_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Plotfile::open(dir.path().join("plt00000")),
            Err(PlotfileError::Io(_))
        ));
    }
}

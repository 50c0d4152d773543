//! Particle data of one species in a plotfile.
//!
//! The species `Header` lists the components and, for every refinement
//! level, the grids holding particles with the data file, particle count
//! and byte offset of each. At that offset a grid stores, particle by
//! particle:
//!
//! - an integer chunk of `2 + nint` values (id, cpu, int components),
//!   present for checkpoints or when int components exist;
//! - a real chunk of `dim + nreal` values (position, real components),
//!   in single or double precision.

use super::{Endianness, HeaderTokens, PlotfileError};
use crate::beam::Axis;
use glam::DVec3;
use memmap2::{Mmap, MmapOptions};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix analysis tools put in front of particle component names
const FIELD_PREFIX: &str = "particle_";

/// Floating point precision of the real particle data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    fn size(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }
}

/// Where the particles of one grid live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLocation {
    pub level: usize,
    /// Index `N` of the `DATA_N` file
    pub file: usize,
    pub count: usize,
    /// Byte offset into the data file
    pub offset: usize,
}

/// Parsed particle `Header` of a species
#[derive(Debug, Clone)]
pub struct ParticleHeader {
    /// Version line, e.g. `Version_Two_Dot_Zero_double`
    pub version: String,

    /// Precision of the real data, from the version suffix
    pub precision: Precision,

    /// Space dimension, 1 to 3
    pub dim: usize,

    /// Real components stored after the position
    pub real_names: Vec<String>,

    /// Int components stored after id and cpu
    pub int_names: Vec<String>,

    /// Checkpoints always store ids and cpus
    pub is_checkpoint: bool,

    /// Total particle count
    pub num_particles: usize,

    /// Next id the simulation would hand out
    pub next_id: i64,

    pub finest_level: usize,

    /// Grids holding particles, level by level
    pub grids: Vec<GridLocation>,
}

impl ParticleHeader {
    /// Read and parse a species `Header` file
    pub fn from_path(path: &Path) -> Result<Self, PlotfileError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse the text of a particle header. `source` only names the
    /// header in error messages.
    pub fn parse(text: &str, source: &str) -> Result<Self, PlotfileError> {
        let mut tokens = HeaderTokens::new(text, source);

        let version = tokens.next_str("version")?.to_string();
        let precision = if version.ends_with("_double") {
            Precision::Double
        } else if version.ends_with("_single") {
            Precision::Single
        } else {
            return Err(PlotfileError::Format(format!(
                "{source}: unknown particle version `{version}`"
            )));
        };

        let dim: usize = tokens.next_parsed("space dimension")?;
        if !(1..=3).contains(&dim) {
            return Err(PlotfileError::Validation(format!(
                "{source}: space dimension {dim} is not 1, 2 or 3"
            )));
        }

        let nreal: usize = tokens.next_parsed("real component count")?;
        let real_names = (0..nreal)
            .map(|_| tokens.next_str("real component name").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;
        let nint: usize = tokens.next_parsed("int component count")?;
        let int_names = (0..nint)
            .map(|_| tokens.next_str("int component name").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        let is_checkpoint = tokens.next_parsed::<u8>("checkpoint flag")? != 0;
        let num_particles: usize = tokens.next_parsed("particle count")?;
        let next_id: i64 = tokens.next_parsed("next id")?;
        let finest_level: usize = tokens.next_parsed("finest level")?;

        let grids_per_level = (0..=finest_level)
            .map(|_| tokens.next_parsed::<usize>("grid count"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut grids = Vec::new();
        for (level, &ngrids) in grids_per_level.iter().enumerate() {
            for _ in 0..ngrids {
                grids.push(GridLocation {
                    level,
                    file: tokens.next_parsed("grid file index")?,
                    count: tokens.next_parsed("grid particle count")?,
                    offset: tokens.next_parsed("grid offset")?,
                });
            }
        }

        Ok(Self {
            version,
            precision,
            dim,
            real_names,
            int_names,
            is_checkpoint,
            num_particles,
            next_id,
            finest_level,
            grids,
        })
    }

    /// True if the data files carry the integer chunk
    pub fn has_int_data(&self) -> bool {
        self.is_checkpoint || !self.int_names.is_empty()
    }

    /// Index of a real component, with or without the `particle_` prefix
    pub fn real_index(&self, name: &str) -> Option<usize> {
        let name = name.strip_prefix(FIELD_PREFIX).unwrap_or(name);
        self.real_names.iter().position(|n| n == name)
    }

    /// True for `particle_position_x` and friends, which are stored
    /// outside the real components
    pub fn is_position(&self, name: &str) -> bool {
        position_axis(name).is_some_and(|axis| axis.index() < self.dim)
    }

    /// Bytes used by one particle in a data file
    fn particle_size(&self) -> usize {
        let ints = if self.has_int_data() {
            (2 + self.int_names.len()) * 4
        } else {
            0
        };
        ints + (self.dim + self.real_names.len()) * self.precision.size()
    }
}

fn position_axis(name: &str) -> Option<Axis> {
    let name = name.strip_prefix(FIELD_PREFIX).unwrap_or(name);
    match name {
        "position_x" | "x" => Some(Axis::X),
        "position_y" | "y" => Some(Axis::Y),
        "position_z" | "z" => Some(Axis::Z),
        _ => None,
    }
}

/// Particles decoded from a plotfile, one column per quantity
#[derive(Debug, Clone, Default)]
pub struct ParticleData {
    /// Particle ids, unique per rank
    pub ids: Vec<i64>,

    /// Rank that created each particle
    pub cpus: Vec<i32>,

    /// Positions (m); axes beyond the space dimension are zero
    pub positions: Vec<DVec3>,

    real_names: Vec<String>,
    reals: Vec<Vec<f64>>,
    int_names: Vec<String>,
    ints: Vec<Vec<i32>>,
}

impl ParticleData {
    fn with_layout(header: &ParticleHeader, capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            cpus: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            real_names: header.real_names.clone(),
            reals: vec![Vec::with_capacity(capacity); header.real_names.len()],
            int_names: header.int_names.clone(),
            ints: vec![Vec::with_capacity(capacity); header.int_names.len()],
        }
    }

    /// Number of particles
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Names of the real components, without the `particle_` prefix
    pub fn real_names(&self) -> &[String] {
        &self.real_names
    }

    /// Names of the int components, without the `particle_` prefix
    pub fn int_names(&self) -> &[String] {
        &self.int_names
    }

    /// Real component column, e.g. `weight` or `particle_momentum_x`
    pub fn component(&self, name: &str) -> Result<&[f64], PlotfileError> {
        let key = name.strip_prefix(FIELD_PREFIX).unwrap_or(name);
        self.real_names
            .iter()
            .position(|n| n == key)
            .map(|i| self.reals[i].as_slice())
            .ok_or_else(|| PlotfileError::MissingComponent(name.to_string()))
    }

    /// Int component column, e.g. `ionization_level`
    pub fn int_component(&self, name: &str) -> Result<&[i32], PlotfileError> {
        let key = name.strip_prefix(FIELD_PREFIX).unwrap_or(name);
        self.int_names
            .iter()
            .position(|n| n == key)
            .map(|i| self.ints[i].as_slice())
            .ok_or_else(|| PlotfileError::MissingComponent(name.to_string()))
    }

    /// Position column along one axis
    pub fn position_axis(&self, axis: Axis) -> Vec<f64> {
        self.positions.iter().map(|p| axis.of(*p)).collect()
    }

    /// Append another chunk with the same layout
    pub fn extend(&mut self, other: ParticleData) {
        self.ids.extend(other.ids);
        self.cpus.extend(other.cpus);
        self.positions.extend(other.positions);
        for (dst, src) in self.reals.iter_mut().zip(other.reals) {
            dst.extend(src);
        }
        for (dst, src) in self.ints.iter_mut().zip(other.ints) {
            dst.extend(src);
        }
    }

    /// Reorder all columns by ascending particle identity `(id, cpu)`
    ///
    /// Ids are only unique per rank, so particles created on different
    /// ranks may share one; the rank breaks the tie.
    pub fn sort_by_id(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| (self.ids[i], self.cpus.get(i).copied().unwrap_or(0)));

        fn permute<T: Copy>(v: &mut Vec<T>, order: &[usize]) {
            if v.len() == order.len() {
                *v = order.iter().map(|&i| v[i]).collect();
            }
        }

        permute(&mut self.ids, &order);
        permute(&mut self.cpus, &order);
        permute(&mut self.positions, &order);
        for col in &mut self.reals {
            permute(col, &order);
        }
        for col in &mut self.ints {
            permute(col, &order);
        }
    }
}

/// Builder for [`ParticleReader`]
///
/// Collects the reading options before the species header is parsed.
/// Obtained from [`Plotfile::particles`](super::Plotfile::particles) or
/// created directly.
pub struct ParticleReaderBuilder {
    /// Plotfile directory
    dir: PathBuf,

    /// Species subdirectory name
    species: String,

    /// Byte order of the data files
    /// Little endian unless forced otherwise
    endianness: Endianness,

    /// Skip consistency checks between header and data files
    /// Useful for partially written plotfiles
    skip_validation: bool,
}

impl ParticleReaderBuilder {
    /// Create a new builder
    ///
    /// # Arguments
    ///
    /// * `dir` - Path to the plotfile directory
    /// * `species` - Name of the species subdirectory
    ///
    /// # Returns
    ///
    /// A new ParticleReaderBuilder with default options
    pub fn new<P: AsRef<Path>>(dir: P, species: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            species: species.to_string(),
            endianness: Endianness::default(),
            skip_validation: false,
        }
    }

    /// Force the byte order of the data files
    ///
    /// Plotfiles written on x86 and ARM machines are little endian, the
    /// default.
    ///
    /// # Arguments
    ///
    /// * `endianness` - The byte order to use (Little or Big)
    ///
    /// # Returns
    ///
    /// The builder with the byte order set
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Skip checks of the grid table against the header particle count
    ///
    /// With validation on, a mismatch is logged and the grid table wins.
    ///
    /// # Arguments
    ///
    /// * `skip` - Whether to skip validation (true) or not (false)
    ///
    /// # Returns
    ///
    /// The builder with the validation setting updated
    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Build the reader
    ///
    /// Parses the species `Header` and validates its grid table. Data
    /// files are only mapped once a grid is read.
    ///
    /// # Returns
    ///
    /// A Result containing either the ParticleReader or an error,
    /// `MissingSpecies` when the species has no header
    pub fn build(self) -> Result<ParticleReader, PlotfileError> {
        let species_dir = self.dir.join(&self.species);
        let header_path = species_dir.join("Header");
        if !header_path.is_file() {
            return Err(PlotfileError::MissingSpecies(self.species));
        }
        let mut header = ParticleHeader::from_path(&header_path)?;

        if !self.skip_validation {
            let total: usize = header.grids.iter().map(|g| g.count).sum();
            if total != header.num_particles {
                warn!(
                    species = %self.species,
                    header = header.num_particles,
                    grids = total,
                    "particle count in header does not match grid table, using grid table"
                );
                header.num_particles = total;
            }
        }

        debug!(
            species = %self.species,
            particles = header.num_particles,
            grids = header.grids.len(),
            reals = ?header.real_names,
            "parsed particle header"
        );

        Ok(ParticleReader {
            species_dir,
            species: self.species,
            header,
            endianness: self.endianness,
            validate: !self.skip_validation,
            files: HashMap::new(),
            current_grid: 0,
            synthetic_ids: 0,
        })
    }
}

/// Reader for the particles of one species, grid by grid
///
/// Data files are memory-mapped on first use and kept mapped until the
/// reader is dropped.
pub struct ParticleReader {
    /// Directory holding the species `Header` and its `Level_N` data
    species_dir: PathBuf,

    /// Species name
    species: String,

    /// Parsed species header
    header: ParticleHeader,

    /// Byte order of the data files
    endianness: Endianness,

    /// Warn about suspicious particle ids
    validate: bool,

    /// Data files mapped so far, keyed by (level, file index)
    files: HashMap<(usize, usize), Mmap>,

    /// Next grid to read
    current_grid: usize,

    /// Ids handed out so far to particles stored without an int chunk
    synthetic_ids: i64,
}

impl ParticleReader {
    /// Opens a species of a plotfile with default options
    ///
    /// # Arguments
    ///
    /// * `dir` - Path to the plotfile directory
    /// * `species` - Name of the species subdirectory
    ///
    /// # Returns
    ///
    /// A Result containing either the ParticleReader or an error
    pub fn open<P: AsRef<Path>>(dir: P, species: &str) -> Result<Self, PlotfileError> {
        ParticleReaderBuilder::new(dir, species).build()
    }

    /// Returns the parsed species header
    pub fn header(&self) -> &ParticleHeader {
        &self.header
    }

    /// Returns the species name
    pub fn species(&self) -> &str {
        &self.species
    }

    /// Returns the number of particles of the species
    pub fn num_particles(&self) -> usize {
        self.header.num_particles
    }

    /// Returns the byte order of the data files
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Rewind to the first grid
    ///
    /// Mapped data files stay mapped.
    pub fn reset(&mut self) {
        self.current_grid = 0;
        self.synthetic_ids = 0;
    }

    /// Reads the particles of the next non-empty grid
    ///
    /// # Returns
    ///
    /// - Some(ParticleData) for the next grid holding particles
    /// - None once all grids have been read
    /// - An error if the data file is missing or too short
    pub fn read_next(&mut self) -> Result<Option<ParticleData>, PlotfileError> {
        while self.current_grid < self.header.grids.len() {
            let grid = self.header.grids[self.current_grid];
            self.current_grid += 1;
            if grid.count > 0 {
                return self.read_grid(grid).map(Some);
            }
        }
        Ok(None)
    }

    /// Read every grid from the start
    ///
    /// # Returns
    ///
    /// All particles of the species, sorted by `(id, cpu)`
    pub fn read_all(&mut self) -> Result<ParticleData, PlotfileError> {
        self.reset();
        // Columns grow grid by grid, each bounds-checked before allocation
        let mut data = ParticleData::with_layout(&self.header, 0);
        while let Some(chunk) = self.read_next()? {
            data.extend(chunk);
        }
        data.sort_by_id();
        Ok(data)
    }

    fn mapped_file(&mut self, level: usize, file: usize) -> Result<&Mmap, PlotfileError> {
        let path = self
            .species_dir
            .join(format!("Level_{level}"))
            .join(format!("DATA_{file:05}"));
        match self.files.entry((level, file)) {
            Entry::Occupied(e) => Ok(&*e.into_mut()),
            Entry::Vacant(e) => {
                let f = File::open(&path)?;
                // Safety: the mapping is read-only and plotfiles are not
                // modified while being checked
                let mmap = unsafe { MmapOptions::new().map(&f)? };
                debug!(path = %path.display(), bytes = mmap.len(), "mapped particle data");
                Ok(&*e.insert(mmap))
            }
        }
    }

    fn read_grid(&mut self, grid: GridLocation) -> Result<ParticleData, PlotfileError> {
        let header = self.header.clone();
        let endianness = self.endianness;
        let validate = self.validate;
        let first_id = self.synthetic_ids;
        if !header.has_int_data() {
            self.synthetic_ids += grid.count as i64;
        }
        let mmap: &[u8] = self.mapped_file(grid.level, grid.file)?;

        let end = grid
            .count
            .checked_mul(header.particle_size())
            .and_then(|bytes| bytes.checked_add(grid.offset))
            .ok_or_else(|| {
                PlotfileError::Format(format!(
                    "Level_{}/DATA_{:05}: grid of {} particles at offset {} overflows",
                    grid.level, grid.file, grid.count, grid.offset
                ))
            })?;
        if end > mmap.len() {
            return Err(PlotfileError::Format(format!(
                "Level_{}/DATA_{:05}: grid needs bytes {}..{} but file has {}",
                grid.level,
                grid.file,
                grid.offset,
                end,
                mmap.len()
            )));
        }

        let mut data = ParticleData::with_layout(&header, grid.count);
        let mut pos = grid.offset;

        if header.has_int_data() {
            let chunk = 2 + header.int_names.len();
            let ints = read_i32_slice(mmap, pos, grid.count * chunk, endianness)?;
            for particle in ints.chunks_exact(chunk) {
                data.ids.push(i64::from(particle[0]));
                data.cpus.push(particle[1]);
                for (col, &v) in data.ints.iter_mut().zip(&particle[2..]) {
                    col.push(v);
                }
            }
            pos += grid.count * chunk * 4;
        } else {
            // No ids stored: number particles in file order
            data.ids
                .extend((0..grid.count as i64).map(|i| first_id + i + 1));
            data.cpus.resize(grid.count, 0);
        }

        let chunk = header.dim + header.real_names.len();
        let reals = match header.precision {
            Precision::Double => read_f64_slice(mmap, pos, grid.count * chunk, endianness)?,
            Precision::Single => read_f32_slice(mmap, pos, grid.count * chunk, endianness)?
                .into_iter()
                .map(f64::from)
                .collect(),
        };
        for particle in reals.chunks_exact(chunk) {
            let mut p = DVec3::ZERO;
            for (i, &x) in particle[..header.dim].iter().enumerate() {
                p[i] = x;
            }
            data.positions.push(p);
            for (col, &v) in data.reals.iter_mut().zip(&particle[header.dim..]) {
                col.push(v);
            }
        }

        if validate && data.ids.iter().any(|&id| id <= 0) {
            warn!(species = %self.species, "grid holds particles with non-positive ids");
        }

        Ok(data)
    }
}

impl Iterator for ParticleReader {
    type Item = Result<ParticleData, PlotfileError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

// Helpers reading arrays of values out of a mapped data file

/// `n` values of `size` bytes starting at `pos`
fn byte_range(bytes: &[u8], pos: usize, n: usize, size: usize) -> Result<&[u8], PlotfileError> {
    n.checked_mul(size)
        .and_then(|len| pos.checked_add(len))
        .and_then(|end| bytes.get(pos..end))
        .ok_or_else(|| PlotfileError::Format("Unexpected end of file".to_string()))
}

/// Read `n` i32 values starting at `pos`
fn read_i32_slice(
    bytes: &[u8],
    pos: usize,
    n: usize,
    endianness: Endianness,
) -> Result<Vec<i32>, PlotfileError> {
    let raw = byte_range(bytes, pos, n, 4)?;
    // Zero-copy when the data is aligned and in host order
    if cfg!(target_endian = "little") && endianness == Endianness::Little {
        if let Ok(values) = bytemuck::try_cast_slice::<u8, i32>(raw) {
            return Ok(values.to_vec());
        }
    }
    Ok(raw
        .chunks_exact(4)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            match endianness {
                Endianness::Little => i32::from_le_bytes(b),
                Endianness::Big => i32::from_be_bytes(b),
            }
        })
        .collect())
}

/// Read `n` f32 values starting at `pos`
fn read_f32_slice(
    bytes: &[u8],
    pos: usize,
    n: usize,
    endianness: Endianness,
) -> Result<Vec<f32>, PlotfileError> {
    let raw = byte_range(bytes, pos, n, 4)?;
    if cfg!(target_endian = "little") && endianness == Endianness::Little {
        if let Ok(values) = bytemuck::try_cast_slice::<u8, f32>(raw) {
            return Ok(values.to_vec());
        }
    }
    Ok(raw
        .chunks_exact(4)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            match endianness {
                Endianness::Little => f32::from_le_bytes(b),
                Endianness::Big => f32::from_be_bytes(b),
            }
        })
        .collect())
}

/// Read `n` f64 values starting at `pos`
fn read_f64_slice(
    bytes: &[u8],
    pos: usize,
    n: usize,
    endianness: Endianness,
) -> Result<Vec<f64>, PlotfileError> {
    let raw = byte_range(bytes, pos, n, 8)?;
    if cfg!(target_endian = "little") && endianness == Endianness::Little {
        if let Ok(values) = bytemuck::try_cast_slice::<u8, f64>(raw) {
            return Ok(values.to_vec());
        }
    }
    Ok(raw
        .chunks_exact(8)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
            match endianness {
                Endianness::Little => f64::from_le_bytes(b),
                Endianness::Big => f64::from_be_bytes(b),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Version_Two_Dot_Zero_double
3
4
weight
momentum_x
momentum_y
momentum_z
0
1
5
6
0
2
0 3 0
0 2 192
";

    #[test]
    fn parses_particle_header() {
        let h = ParticleHeader::parse(HEADER, "Header").unwrap();
        assert_eq!(h.precision, Precision::Double);
        assert_eq!(h.dim, 3);
        assert_eq!(h.real_names.len(), 4);
        assert!(h.int_names.is_empty());
        assert!(h.is_checkpoint);
        assert!(h.has_int_data());
        assert_eq!(h.num_particles, 5);
        assert_eq!(h.next_id, 6);
        assert_eq!(h.grids.len(), 2);
        assert_eq!(
            h.grids[1],
            GridLocation {
                level: 0,
                file: 0,
                count: 2,
                offset: 192
            }
        );
        // 2 ints + 7 doubles
        assert_eq!(h.particle_size(), 8 + 56);
    }

    #[test]
    fn component_lookup_accepts_prefix() {
        let h = ParticleHeader::parse(HEADER, "Header").unwrap();
        assert_eq!(h.real_index("particle_weight"), Some(0));
        assert_eq!(h.real_index("momentum_z"), Some(3));
        assert_eq!(h.real_index("particle_energy"), None);
        assert!(h.is_position("particle_position_y"));
        assert!(!h.is_position("particle_momentum_y"));
    }

    #[test]
    fn rejects_unknown_version() {
        let text = HEADER.replace("_double", "_quad");
        assert!(matches!(
            ParticleHeader::parse(&text, "Header"),
            Err(PlotfileError::Format(_))
        ));
    }

    #[test]
    fn truncated_header_is_format_error() {
        let text: String = HEADER.lines().take(9).collect::<Vec<_>>().join("\n");
        assert!(matches!(
            ParticleHeader::parse(&text, "Header"),
            Err(PlotfileError::Format(_))
        ));
    }

    #[test]
    fn sort_by_id_permutes_all_columns() {
        let h = ParticleHeader::parse(HEADER, "Header").unwrap();
        let mut data = ParticleData::with_layout(&h, 3);
        for (id, x) in [(3, 30.0), (1, 10.0), (2, 20.0)] {
            data.ids.push(id);
            data.cpus.push(0);
            data.positions.push(DVec3::new(x, 0.0, 0.0));
            for (k, col) in data.reals.iter_mut().enumerate() {
                col.push(x + k as f64);
            }
        }
        data.sort_by_id();
        assert_eq!(data.ids, vec![1, 2, 3]);
        assert_eq!(data.position_axis(Axis::X), vec![10.0, 20.0, 30.0]);
        assert_eq!(data.component("weight").unwrap(), &[10.0, 20.0, 30.0]);
        assert_eq!(data.component("particle_momentum_z").unwrap(), &[13.0, 23.0, 33.0]);
        assert!(matches!(
            data.component("particle_energy"),
            Err(PlotfileError::MissingComponent(_))
        ));
    }

    #[test]
    fn reads_both_byte_orders() {
        let mut le = Vec::new();
        let mut be = Vec::new();
        le.push(0u8); // misalign on purpose
        be.push(0u8);
        for v in [1.5f64, -2.25] {
            le.extend_from_slice(&v.to_le_bytes());
            be.extend_from_slice(&v.to_be_bytes());
        }
        assert_eq!(
            read_f64_slice(&le, 1, 2, Endianness::Little).unwrap(),
            vec![1.5, -2.25]
        );
        assert_eq!(
            read_f64_slice(&be, 1, 2, Endianness::Big).unwrap(),
            vec![1.5, -2.25]
        );
        assert!(read_f64_slice(&le, 1, 3, Endianness::Little).is_err());
        assert!(read_f64_slice(&le, usize::MAX, 1, Endianness::Little).is_err());
        assert!(read_i32_slice(&le, 0, usize::MAX, Endianness::Little).is_err());
    }

    #[test]
    fn sort_breaks_id_ties_by_cpu() {
        let h = ParticleHeader::parse(HEADER, "Header").unwrap();
        let mut data = ParticleData::with_layout(&h, 3);
        for (id, cpu, x) in [(2, 0, 20.0), (1, 1, 11.0), (1, 0, 10.0)] {
            data.ids.push(id);
            data.cpus.push(cpu);
            data.positions.push(DVec3::new(x, 0.0, 0.0));
            for col in data.reals.iter_mut() {
                col.push(x);
            }
        }
        data.sort_by_id();
        assert_eq!(data.ids, vec![1, 1, 2]);
        assert_eq!(data.cpus, vec![0, 1, 0]);
        assert_eq!(data.position_axis(Axis::X), vec![10.0, 11.0, 20.0]);
        assert_eq!(data.component("weight").unwrap(), &[10.0, 11.0, 20.0]);
    }

    /// Species `beam` with one real component and the given grid line
    fn corrupt_species(grid: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let level = dir.path().join("beam").join("Level_0");
        fs::create_dir_all(&level).unwrap();
        let header = format!(
            "Version_Two_Dot_Zero_double\n3\n1\nweight\n0\n1\n2\n3\n0\n1\n{grid}\n"
        );
        fs::write(dir.path().join("beam").join("Header"), header).unwrap();
        fs::write(level.join("DATA_00000"), [0u8; 48]).unwrap();
        dir
    }

    #[test]
    fn oversized_grid_count_is_format_error() {
        let dir = corrupt_species(&format!("0 {} 0", usize::MAX));
        let mut reader = ParticleReader::open(dir.path(), "beam").unwrap();
        assert!(matches!(reader.read_all(), Err(PlotfileError::Format(_))));
    }

    #[test]
    fn oversized_grid_offset_is_format_error() {
        let dir = corrupt_species(&format!("0 1 {}", usize::MAX));
        let mut reader = ParticleReader::open(dir.path(), "beam").unwrap();
        assert!(matches!(reader.read_next(), Err(PlotfileError::Format(_))));
    }
}

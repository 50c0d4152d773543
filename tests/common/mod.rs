//! Writes plotfile fixtures with the on-disk layout of a real run.

#![allow(dead_code)]

use beamcheck::units::{ELECTRON_MASS, SPEED_OF_LIGHT};
use beamcheck::Beam;
use std::fs;
use std::io;
use std::path::Path;

/// Real components written by the simulation for every particle
pub const REAL_NAMES: [&str; 4] = ["weight", "momentum_x", "momentum_y", "momentum_z"];

/// One particle as stored in a plotfile
#[derive(Debug, Clone)]
pub struct PlotParticle {
    pub id: i32,
    pub position: [f64; 3],
    pub reals: Vec<f64>,
    /// One value per int component of the layout
    pub ints: Vec<i32>,
}

/// How the species data is laid out on disk
#[derive(Debug, Clone)]
pub struct Layout {
    /// Particles per grid, in order
    pub grids: Vec<usize>,
    pub single_precision: bool,
    pub checkpoint: bool,
    /// Int components stored after id and cpu
    pub int_names: Vec<&'static str>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            grids: vec![usize::MAX],
            single_precision: false,
            checkpoint: true,
            int_names: Vec::new(),
        }
    }
}

/// Write the mesh `Header` of a 3D plotfile with no mesh fields
pub fn write_mesh_header(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let header = "HyperCLaw-V1.1
0
3
0
0
-2.0e-5 -2.0e-5 -1.0e-4
2.0e-5 2.0e-5 1.0e-4

((0,0,0) (31,31,63) (0,0,0))
0
1.25e-06 1.25e-06 3.125e-06
0
0
0 1 0
0
-2.0e-5 2.0e-5
-2.0e-5 2.0e-5
-1.0e-4 1.0e-4
Level_0/Cell
";
    fs::write(dir.join("Header"), header)
}

/// Write one particle species below a plotfile directory
pub fn write_species(
    dir: &Path,
    species: &str,
    real_names: &[&str],
    particles: &[PlotParticle],
    layout: &Layout,
) -> io::Result<()> {
    let species_dir = dir.join(species);
    let level_dir = species_dir.join("Level_0");
    fs::create_dir_all(&level_dir)?;

    let mut counts = Vec::new();
    let mut remaining = particles.len();
    for &n in &layout.grids {
        let n = n.min(remaining);
        counts.push(n);
        remaining -= n;
    }
    if remaining > 0 {
        counts.push(remaining);
    }

    let mut data = Vec::new();
    let mut table = Vec::new();
    let mut start = 0;
    for &count in &counts {
        table.push(format!("0 {} {}", count, data.len()));
        let grid = &particles[start..start + count];
        if layout.checkpoint || !layout.int_names.is_empty() {
            for p in grid {
                data.extend_from_slice(&p.id.to_le_bytes());
                data.extend_from_slice(&0i32.to_le_bytes());
                for v in &p.ints {
                    data.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        for p in grid {
            for &x in p.position.iter().chain(p.reals.iter()) {
                if layout.single_precision {
                    data.extend_from_slice(&(x as f32).to_le_bytes());
                } else {
                    data.extend_from_slice(&x.to_le_bytes());
                }
            }
        }
        start += count;
    }

    let version = if layout.single_precision {
        "Version_Two_Dot_Zero_single"
    } else {
        "Version_Two_Dot_Zero_double"
    };
    let mut header = vec![
        version.to_string(),
        "3".to_string(),
        real_names.len().to_string(),
    ];
    header.extend(real_names.iter().map(|n| n.to_string()));
    header.push(layout.int_names.len().to_string());
    header.extend(layout.int_names.iter().map(|n| n.to_string()));
    header.push(u8::from(layout.checkpoint).to_string());
    header.push(particles.len().to_string());
    header.push((particles.len() + 1).to_string());
    header.push("0".to_string());
    header.push(counts.len().to_string());
    header.extend(table);

    fs::write(species_dir.join("Header"), header.join("\n") + "\n")?;
    fs::write(level_dir.join("DATA_00000"), data)
}

/// Particles a simulation would report for `beam` right after injection:
/// SI positions, relativistic momenta and a uniform weight
pub fn injected_particles(beam: &Beam, weight: f64) -> Vec<PlotParticle> {
    let length = beam.units.length_to_si();
    let velocity = beam.units.velocity_to_si();
    beam.positions()
        .iter()
        .zip(beam.velocities())
        .enumerate()
        .map(|(i, (p, v))| {
            let p = *p * length;
            let v = *v * velocity;
            let gamma = 1.0 / (1.0 - v.length_squared() / (SPEED_OF_LIGHT * SPEED_OF_LIGHT)).sqrt();
            let u = v * gamma * ELECTRON_MASS;
            PlotParticle {
                id: i as i32 + 1,
                position: p.to_array(),
                reals: vec![weight, u.x, u.y, u.z],
                ints: Vec::new(),
            }
        })
        .collect()
}

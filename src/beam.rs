//! # Particle beams
//!
//! A [`Beam`] is a small, ordered set of macro-particles of one species:
//! positions and velocities plus the species mass and charge. Values are
//! stored in the beam's [`UnitSystem`]; nothing here converts them.
//!
//! [`Beam::synthetic`] builds the deterministic fixture injected into the
//! simulation by the regression check.

use crate::units::{UnitSystem, ELECTRON_MASS, ELEMENTARY_CHARGE};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of particles in the default fixture
pub const DEFAULT_PARTICLE_COUNT: usize = 5;

/// Species name used by the fixture
pub const DEFAULT_SPECIES: &str = "electrons";

/// Cartesian axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three axes in storage order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Lower-case component label ("x", "y", "z")
    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Index into a 3-vector
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Pick this axis' component out of a vector
    #[inline]
    pub fn of(self, v: DVec3) -> f64 {
        v[self.index()]
    }
}

/// Errors raised when assembling a beam
#[derive(Error, Debug)]
pub enum BeamError {
    /// Positions and velocities do not describe the same particles
    #[error("beam has {positions} positions but {velocities} velocities")]
    LengthMismatch { positions: usize, velocities: usize },
}

/// A set of particles of a single species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    /// Species name, used as the openPMD particle group name
    pub species: String,

    /// Mass of one physical particle
    pub mass: f64,

    /// Charge of one physical particle
    pub charge: f64,

    /// Unit system of `positions` and `velocities`
    pub units: UnitSystem,

    positions: Vec<DVec3>,
    velocities: Vec<DVec3>,
}

impl Beam {
    /// Assemble a beam, checking that every particle has both a position
    /// and a velocity.
    pub fn new(
        species: impl Into<String>,
        mass: f64,
        charge: f64,
        units: UnitSystem,
        positions: Vec<DVec3>,
        velocities: Vec<DVec3>,
    ) -> Result<Self, BeamError> {
        if positions.len() != velocities.len() {
            return Err(BeamError::LengthMismatch {
                positions: positions.len(),
                velocities: velocities.len(),
            });
        }
        Ok(Self {
            species: species.into(),
            mass,
            charge,
            units,
            positions,
            velocities,
        })
    }

    /// Build the `n`-particle electron fixture in Geant4 units.
    ///
    /// Particle `i` (1-based) sits at `(1.0, 1.5, 10.0) * 1e-6 * i` and moves
    /// with `(2.9, 3.0, 3.1) * 1e-8 * i`.
    pub fn synthetic(n: usize) -> Self {
        let (positions, velocities) = (1..=n)
            .map(|i| {
                let i = i as f64;
                (
                    DVec3::new(1.0e-6 * i, 1.5e-6 * i, 10.0e-6 * i),
                    DVec3::new(2.9e-8 * i, 3.0e-8 * i, 3.1e-8 * i),
                )
            })
            .unzip();

        Self {
            species: DEFAULT_SPECIES.to_string(),
            mass: ELECTRON_MASS,
            charge: ELEMENTARY_CHARGE,
            units: UnitSystem::Geant4,
            positions,
            velocities,
        }
    }

    /// Number of particles
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if the beam holds no particle
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[DVec3] {
        &self.velocities
    }

    /// Column of positions along one axis
    pub fn position_axis(&self, axis: Axis) -> Vec<f64> {
        self.positions.iter().map(|p| axis.of(*p)).collect()
    }

    /// Column of velocities along one axis
    pub fn velocity_axis(&self, axis: Axis) -> Vec<f64> {
        self.velocities.iter().map(|v| axis.of(*v)).collect()
    }
}

impl Default for Beam {
    fn default() -> Self {
        Self::synthetic(DEFAULT_PARTICLE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_follows_progression() {
        let beam = Beam::synthetic(5);
        assert_eq!(beam.len(), 5);
        assert_eq!(beam.species, "electrons");
        assert_eq!(beam.units, UnitSystem::Geant4);

        let x = beam.position_axis(Axis::X);
        let vz = beam.velocity_axis(Axis::Z);
        for (k, i) in (1..=5).enumerate() {
            let i = i as f64;
            assert_eq!(x[k], 1.0e-6 * i);
            assert_eq!(vz[k], 3.1e-8 * i);
        }
        assert_eq!(beam.positions()[4].y, 1.5e-6 * 5.0);
        assert_eq!(beam.velocities()[0].x, 2.9e-8);
    }

    #[test]
    fn empty_fixture() {
        let beam = Beam::synthetic(0);
        assert!(beam.is_empty());
    }

    #[test]
    fn rejects_mismatched_columns() {
        let err = Beam::new(
            "e",
            1.0,
            1.0,
            UnitSystem::Si,
            vec![DVec3::ZERO; 2],
            vec![DVec3::ZERO; 3],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BeamError::LengthMismatch {
                positions: 2,
                velocities: 3
            }
        ));
    }
}

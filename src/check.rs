//! # Beam comparison
//!
//! Compares the beam that was handed to the simulation with the particles
//! found in its output. Both sides are brought to SI first:
//!
//! - the expected positions and velocities are scaled by the beam's unit
//!   conversion factors;
//! - the plotfile stores momenta (kg m/s), which are turned back into
//!   velocities relativistically.
//!
//! The expected statistical weight of each macro-particle is the total
//! physical charge of the run divided among the particles.

use crate::beam::{Axis, Beam};
use crate::plotfile::{ParticleData, PlotfileError};
use crate::units::SPEED_OF_LIGHT;
use glam::DVec3;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Default relative error accepted for every quantity
pub const DEFAULT_TOLERANCE: f64 = 1.0e-4;

/// Errors preventing a comparison from being made
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Plotfile(#[from] PlotfileError),

    /// Not the same number of particles on both sides
    #[error("expected {expected} particles, plotfile has {found}")]
    CountMismatch { expected: usize, found: usize },

    /// The expected value is zero, so no relative error exists
    #[error("expected {0} is zero, relative error undefined")]
    ZeroReference(&'static str),

    #[error("beam charge is zero, weight undefined")]
    ZeroCharge,

    #[error("no particles to compare")]
    Empty,
}

/// Maximum relative errors accepted
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerances {
    pub weight: f64,
    pub position: f64,
    pub velocity: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::uniform(DEFAULT_TOLERANCE)
    }
}

impl Tolerances {
    /// Same tolerance for every quantity
    pub fn uniform(tolerance: f64) -> Self {
        Self {
            weight: tolerance,
            position: tolerance,
            velocity: tolerance,
        }
    }
}

/// `|(expected - observed) / expected|`
#[inline]
pub fn relative_error(expected: f64, observed: f64) -> f64 {
    ((expected - observed) / expected).abs()
}

/// Velocity of a particle of rest mass `mass` carrying momentum `p`.
///
/// `gamma = sqrt(1 + |p|²/(m c)²)` and `v = p / (gamma m)`.
pub fn momentum_to_velocity(p: DVec3, mass: f64) -> DVec3 {
    let mc = mass * SPEED_OF_LIGHT;
    let gamma = (1.0 + p.length_squared() / (mc * mc)).sqrt();
    p / (gamma * mass)
}

/// The beam as the simulation should report it, in SI
#[derive(Debug, Clone)]
pub struct ExpectedBeam {
    pub mass: f64,
    pub weight: f64,
    pub positions: Vec<DVec3>,
    pub velocities: Vec<DVec3>,
}

impl ExpectedBeam {
    /// Convert a beam to SI and derive the weight from the total charge.
    ///
    /// Only magnitudes matter for the weight: `|q_tot| / (n |q|)`.
    pub fn from_beam(beam: &Beam, physical_q_tot: f64) -> Result<Self, CheckError> {
        if beam.charge == 0.0 {
            return Err(CheckError::ZeroCharge);
        }
        let length = beam.units.length_to_si();
        let velocity = beam.units.velocity_to_si();
        let weight = physical_q_tot.abs() / (beam.len() as f64 * beam.charge.abs());

        Ok(Self {
            mass: beam.mass,
            weight,
            positions: beam.positions().iter().map(|p| *p * length).collect(),
            velocities: beam.velocities().iter().map(|v| *v * velocity).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Largest relative errors found, per quantity and axis
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub particles: usize,
    pub weight_error: f64,
    pub position_errors: [f64; 3],
    pub velocity_errors: [f64; 3],
    pub tolerances: Tolerances,
}

impl Report {
    /// Descriptions of every quantity over its tolerance
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !within(self.weight_error, self.tolerances.weight) {
            out.push(format!(
                "weight: relative error {:e} >= {:e}",
                self.weight_error, self.tolerances.weight
            ));
        }
        for axis in Axis::ALL {
            let i = axis.index();
            if !within(self.position_errors[i], self.tolerances.position) {
                out.push(format!(
                    "position {}: relative error {:e} >= {:e}",
                    axis.label(),
                    self.position_errors[i],
                    self.tolerances.position
                ));
            }
            if !within(self.velocity_errors[i], self.tolerances.velocity) {
                out.push(format!(
                    "velocity {}: relative error {:e} >= {:e}",
                    axis.label(),
                    self.velocity_errors[i],
                    self.tolerances.velocity
                ));
            }
        }
        out
    }

    /// True if every error is strictly below its tolerance.
    /// NaN errors never pass.
    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }
}

/// Strictly below tolerance; false for NaN
fn within(error: f64, tolerance: f64) -> bool {
    error < tolerance
}

/// Compare the expected beam with the particles read from a plotfile.
///
/// `observed` must be sorted by id, which [`ParticleReader::read_all`]
/// guarantees; particles are then matched in injection order.
///
/// [`ParticleReader::read_all`]: crate::plotfile::ParticleReader::read_all
pub fn compare(
    expected: &ExpectedBeam,
    observed: &ParticleData,
    tolerances: &Tolerances,
) -> Result<Report, CheckError> {
    if expected.len() != observed.len() {
        return Err(CheckError::CountMismatch {
            expected: expected.len(),
            found: observed.len(),
        });
    }
    if observed.is_empty() {
        return Err(CheckError::Empty);
    }

    let weights = observed.component("particle_weight")?;
    let weight_error = max_relative_error(
        std::iter::repeat(expected.weight),
        weights.iter().copied(),
        "weight",
    )?;
    info!(error = weight_error, "relative error weight");

    let momenta = [
        observed.component("particle_momentum_x")?,
        observed.component("particle_momentum_y")?,
        observed.component("particle_momentum_z")?,
    ];
    let velocities: Vec<DVec3> = (0..observed.len())
        .map(|i| {
            let p = DVec3::new(momenta[0][i], momenta[1][i], momenta[2][i]);
            momentum_to_velocity(p, expected.mass)
        })
        .collect();

    let mut position_errors = [0.0; 3];
    let mut velocity_errors = [0.0; 3];
    for axis in Axis::ALL {
        let i = axis.index();
        position_errors[i] = max_relative_error(
            expected.positions.iter().map(|p| axis.of(*p)),
            observed.positions.iter().map(|p| axis.of(*p)),
            "position",
        )?;
        velocity_errors[i] = max_relative_error(
            expected.velocities.iter().map(|v| axis.of(*v)),
            velocities.iter().map(|v| axis.of(*v)),
            "velocity",
        )?;
        info!(
            axis = axis.label(),
            position = position_errors[i],
            velocity = velocity_errors[i],
            "relative error"
        );
    }

    let report = Report {
        particles: observed.len(),
        weight_error,
        position_errors,
        velocity_errors,
        tolerances: *tolerances,
    };
    for failure in report.failures() {
        warn!("{failure}");
    }
    Ok(report)
}

fn max_relative_error(
    expected: impl Iterator<Item = f64>,
    observed: impl Iterator<Item = f64>,
    what: &'static str,
) -> Result<f64, CheckError> {
    let mut max = 0.0_f64;
    for (e, o) in expected.zip(observed) {
        if e == 0.0 {
            return Err(CheckError::ZeroReference(what));
        }
        let err = relative_error(e, o);
        // NaN must surface as a failure, not vanish in f64::max
        max = if err.is_nan() { f64::NAN } else { max.max(err) };
        if max.is_nan() {
            break;
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{ELECTRON_MASS, ELEMENTARY_CHARGE};

    #[test]
    fn relative_error_is_symmetric_in_sign() {
        assert_eq!(relative_error(2.0, 1.0), 0.5);
        assert_eq!(relative_error(-2.0, -3.0), 0.5);
        assert_eq!(relative_error(4.0, 4.0), 0.0);
    }

    #[test]
    fn slow_particles_are_classical() {
        let v = DVec3::new(29.0, 30.0, 31.0);
        let p = v * ELECTRON_MASS;
        let back = momentum_to_velocity(p, ELECTRON_MASS);
        assert!((back - v).length() / v.length() < 1e-12);
    }

    #[test]
    fn fast_particles_stay_below_c() {
        let p = DVec3::new(0.0, 0.0, 10.0 * ELECTRON_MASS * SPEED_OF_LIGHT);
        let v = momentum_to_velocity(p, ELECTRON_MASS);
        assert!(v.z < SPEED_OF_LIGHT);
        // gamma = sqrt(101)
        let expected = 10.0 / 101.0_f64.sqrt() * SPEED_OF_LIGHT;
        assert!(relative_error(expected, v.z) < 1e-12);
    }

    #[test]
    fn expected_beam_in_si() {
        let beam = Beam::synthetic(5);
        let q_tot = -5.0 * 2.0 * ELEMENTARY_CHARGE;
        let expected = ExpectedBeam::from_beam(&beam, q_tot).unwrap();

        assert!(relative_error(2.0, expected.weight) < 1e-12);
        assert!(relative_error(5.0e-9, expected.positions[4].x) < 1e-12);
        assert!(relative_error(3.1e-2, expected.velocities[0].z) < 1e-12);
    }

    #[test]
    fn report_verdict() {
        let mut report = Report {
            particles: 5,
            weight_error: 1e-6,
            position_errors: [0.0, 1e-5, 2e-5],
            velocity_errors: [3e-5, 0.0, 0.0],
            tolerances: Tolerances::default(),
        };
        assert!(report.passed());

        report.velocity_errors[1] = 1e-4;
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("velocity y"));

        report.weight_error = f64::NAN;
        assert_eq!(report.failures().len(), 2);
    }

    #[test]
    fn nan_propagates_through_max() {
        let err = max_relative_error(
            [1.0, 2.0].into_iter(),
            [1.0, f64::NAN].into_iter(),
            "position",
        )
        .unwrap();
        assert!(err.is_nan());
    }

    #[test]
    fn zero_reference_is_rejected() {
        assert!(matches!(
            max_relative_error([0.0].into_iter(), [0.0].into_iter(), "position"),
            Err(CheckError::ZeroReference("position"))
        ));
    }
}

//! # Unit conventions
//!
//! Physical constants and the conversion factors between the unit system
//! a beam file is written in and SI, which is what plotfiles hold.
//!
//! The Geant4 convention (mm, ns) is the one external beam files
//! usually come from. openPMD records carry their own `unitSI` factor and
//! a `unitDimension` vector, both derived here.

use serde::{Deserialize, Serialize};

/// Elementary charge (C)
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;

/// Electron mass (kg)
pub const ELECTRON_MASS: f64 = 9.1093837015e-31;

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// openPMD `unitDimension` exponents: (L, M, T, I, theta, N, J).
pub type UnitDimension = [f64; 7];

/// Length: L
pub const LENGTH: UnitDimension = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Velocity: L T^-1
pub const VELOCITY: UnitDimension = [1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0];

/// Mass: M
pub const MASS: UnitDimension = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Charge: T I
pub const CHARGE: UnitDimension = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0];

/// Unit convention used for the values stored in a beam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitSystem {
    /// SI units (m, m/s, s)
    Si,
    /// Geant4 units (mm, mm/ns, ns)
    #[default]
    Geant4,
}

impl UnitSystem {
    /// Factor converting a length in this system to meters
    pub fn length_to_si(self) -> f64 {
        match self {
            UnitSystem::Si => 1.0,
            UnitSystem::Geant4 => 1.0e-3,
        }
    }

    /// Factor converting a time in this system to seconds
    pub fn time_to_si(self) -> f64 {
        match self {
            UnitSystem::Si => 1.0,
            UnitSystem::Geant4 => 1.0e-9,
        }
    }

    /// Factor converting a velocity in this system to m/s
    pub fn velocity_to_si(self) -> f64 {
        match self {
            UnitSystem::Si => 1.0,
            UnitSystem::Geant4 => 1.0e6,
        }
    }

    /// Short name, as printed in logs
    pub fn name(self) -> &'static str {
        match self {
            UnitSystem::Si => "SI",
            UnitSystem::Geant4 => "Geant4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geant4_factors() {
        let g4 = UnitSystem::Geant4;
        assert_eq!(g4.length_to_si(), 1.0e-3);
        assert_eq!(g4.time_to_si(), 1.0e-9);
        assert_eq!(g4.velocity_to_si(), 1.0e6);
        let ratio = g4.length_to_si() / g4.time_to_si();
        assert!((ratio - g4.velocity_to_si()).abs() < 1e-6);
    }

    #[test]
    fn si_is_identity() {
        let si = UnitSystem::Si;
        assert_eq!(si.length_to_si(), 1.0);
        assert_eq!(si.velocity_to_si(), 1.0);
        assert_eq!(si.time_to_si(), 1.0);
    }
}

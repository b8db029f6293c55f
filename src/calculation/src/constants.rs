//! Physical constants and hard limits for the analysis engines.
//!
//! Fluid properties are plain data so that a polar can carry the exact
//! values it was computed with. The `limits` module holds the ceilings
//! enforced before any matrix is assembled.

use serde::{Deserialize, Serialize};

/// Gravitational acceleration (m/s²)
pub const GRAVITY: f64 = 9.81;

/// Fluid properties for dimensional results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fluid {
    /// Density (kg/m³)
    /// Standard value: 1.225 kg/m³ at sea level, 15°C
    pub density: f64,

    /// Kinematic viscosity (m²/s)
    pub viscosity: f64,
}

impl Fluid {
    /// Sea-level standard air.
    pub const fn new() -> Self {
        Self {
            density: 1.225,
            viscosity: 1.5e-5,
        }
    }

    /// Standard atmosphere at 3000 m.
    pub fn altitude_3000m() -> Self {
        Self {
            density: 0.9093,
            viscosity: 1.87e-5,
        }
    }

    /// Fresh water at 15°C, for hydrofoil sections.
    pub fn water() -> Self {
        Self {
            density: 999.1,
            viscosity: 1.14e-6,
        }
    }

    /// Create a fluid from density and kinematic viscosity.
    pub fn custom(density: f64, viscosity: f64) -> Self {
        Self { density, viscosity }
    }

    /// q = 0.5 * ρ * V²
    #[inline(always)]
    pub fn dynamic_pressure(&self, speed: f64) -> f64 {
        0.5 * self.density * speed * speed
    }

    /// Re = V * L / ν
    #[inline(always)]
    pub fn reynolds(&self, speed: f64, length: f64) -> f64 {
        speed * length / self.viscosity
    }
}

impl Default for Fluid {
    fn default() -> Self {
        Self::new()
    }
}

/// Hard ceilings and numerical thresholds.
pub mod limits {
    /// Maximum nodes on one airfoil side.
    pub const MAX_FOIL_PANELS_PER_SIDE: usize = 300;

    /// Maximum angle between consecutive airfoil panels (degrees).
    pub const MAX_FOIL_PANEL_ANGLE_DEG: f64 = 30.0;

    /// Default element ceiling for 3D meshes.
    pub const MAX_WING_PANELS: usize = 2000;

    /// Pivots below this fraction of the largest matrix entry are singular.
    pub const SINGULAR_PIVOT_RATIO: f64 = 1e-12;

    /// Mach ceiling applied in fixed-lift polars.
    pub const MAX_MACH: f64 = 0.99;

    /// Ratio ceiling Re/Re_ref applied in fixed-lift polars.
    pub const MAX_RE_RATIO: f64 = 100.0;

    /// Floor on the lift coefficient used by Mach(Cl)/Re(Cl) formulas.
    pub const MIN_CL_FOR_SCALING: f64 = 1e-6;

    /// Shape factor above which the turbulent layer is flagged separated.
    pub const TURBULENT_SEPARATION_H: f64 = 2.4;

    /// Thwaites pressure-gradient parameter at laminar separation.
    pub const LAMINAR_SEPARATION_LAMBDA: f64 = -0.09;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_fluid() {
        let f = Fluid::default();
        assert_eq!(f.density, 1.225);
        assert_eq!(f.viscosity, 1.5e-5);
    }

    #[test]
    fn test_dynamic_pressure() {
        let f = Fluid::new();
        assert_relative_eq!(f.dynamic_pressure(10.0), 61.25, epsilon = 1e-10);
    }

    #[test]
    fn test_reynolds() {
        let f = Fluid::custom(1.225, 1.5e-5);
        assert_relative_eq!(f.reynolds(30.0, 0.1), 200_000.0, epsilon = 1e-6);
        assert!(Fluid::water().reynolds(1.0, 1.0) > f.reynolds(1.0, 1.0));
    }

    #[test]
    fn test_fluid_deserialize_defaults() {
        let f: Fluid = serde_json::from_str(r#"{"density": 1.0}"#).unwrap();
        assert_eq!(f.density, 1.0);
        assert_eq!(f.viscosity, 1.5e-5);
    }
}

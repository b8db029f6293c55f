//! Aerodynamic relations shared by the 2D and 3D engines.
//!
//! This module collects the closed-form pieces every engine needs around its
//! linear solve:
//!
//! - **Karman-Tsien**: compressibility correction of incompressible Cp
//! - **Mach/Reynolds scaling**: fixed-lift and rubber-chord polar types,
//!   where the flow condition depends on the lift coefficient
//! - **Weight balance**: flight speed from lift in fixed-lift 3D polars
//! - **Kutta-Joukowski**: force on a bound vortex segment

use crate::constants::limits;
use crate::error::{AnalysisError, AnalysisResult};
use crate::polar::PolarType;
use crate::vector::Vec3;

/// Karman-Tsien correction for a given free-stream Mach number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KarmanTsien {
    /// Free-stream Mach number
    pub mach: f64,
    /// Prandtl-Glauert factor sqrt(1 - M²)
    beta: f64,
    /// Karman-Tsien weight M² / (1 + β)
    bfac: f64,
}

impl KarmanTsien {
    /// Correction for free-stream Mach number `mach`.
    pub fn new(mach: f64) -> Self {
        let m2 = mach * mach;
        let beta = (1.0 - m2).max(0.0).sqrt();
        let bfac = 0.5 * m2 / (1.0 + beta);
        Self { mach, beta, bfac }
    }

    /// Prandtl-Glauert factor sqrt(1 - M²).
    #[inline(always)]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Compressible Cp from the incompressible value.
    ///
    /// Cp = Cp_inc / (β + M²/(2(1+β)) Cp_inc); a non-positive denominator means
    /// the local speed is too large for the correction.
    #[inline(always)]
    pub fn correct(&self, cp_inc: f64, node: usize) -> AnalysisResult<f64> {
        if self.mach <= 0.0 {
            return Ok(cp_inc);
        }
        let den = self.beta + self.bfac * cp_inc;
        if den <= 0.0 || !den.is_finite() {
            return Err(AnalysisError::CompressibilityInvalid {
                node,
                mach: self.mach,
            });
        }
        Ok(cp_inc / den)
    }

    /// Apply the correction to a whole distribution.
    pub fn correct_all(&self, cp_inc: &[f64]) -> AnalysisResult<Vec<f64>> {
        cp_inc
            .iter()
            .enumerate()
            .map(|(i, &cp)| self.correct(cp, i))
            .collect()
    }
}

/// Flow condition derived from the lift coefficient, with clamp warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledCondition {
    /// Mach number at the scaled condition
    pub mach: f64,
    /// Reynolds number at the scaled condition
    pub reynolds: f64,
    /// Clamp messages, one per limit hit
    pub warnings: Vec<String>,
}

/// Mach and Reynolds numbers for the polar type at lift coefficient `cl`.
///
/// Fixed-lift polars hold Re√Cl and M√Cl constant, rubber-chord polars hold
/// Re·Cl constant. Degenerate values are clamped with a warning.
pub fn scaled_condition(polar_type: PolarType, cl: f64, mach_ref: f64, re_ref: f64) -> ScaledCondition {
    let cla = cl.max(limits::MIN_CL_FOR_SCALING);
    let mut warnings = Vec::new();

    let mut mach = mach_ref;
    if polar_type == PolarType::FixedLift {
        mach = mach_ref / cla.sqrt();
        if mach >= limits::MAX_MACH {
            let msg = format!("Artificially limiting Mach to {:.2}", limits::MAX_MACH);
            log::warn!("{}", msg);
            warnings.push(msg);
            mach = limits::MAX_MACH;
        }
    }

    let mut ratio = match polar_type {
        PolarType::FixedLift => 1.0 / cla.sqrt(),
        PolarType::RubberChord => 1.0 / cla,
        _ => 1.0,
    };
    if ratio > limits::MAX_RE_RATIO {
        ratio = limits::MAX_RE_RATIO;
        let msg = format!("Artificially limiting Re to {:.0}", re_ref * ratio);
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    ScaledCondition {
        mach,
        reynolds: re_ref * ratio,
        warnings,
    }
}

/// Speed at which lift balances weight: V = sqrt(2W / (ρ S CL)).
pub fn speed_from_weight(mass: f64, density: f64, area: f64, cl: f64) -> AnalysisResult<f64> {
    if cl <= 0.0 {
        return Err(AnalysisError::NegativeLift { cl });
    }
    Ok((2.0 * mass * crate::constants::GRAVITY / (density * area * cl)).sqrt())
}

/// Force on a bound vortex segment: F = ρ Γ V × dl.
#[inline(always)]
pub fn kutta_joukowski(density: f64, velocity: &Vec3, gamma: f64, segment: &Vec3) -> Vec3 {
    velocity.cross(segment) * (density * gamma)
}

/// Oswald efficiency e = CL² / (π AR CDi).
pub fn oswald_efficiency(cl: f64, cdi: f64, aspect_ratio: f64) -> Option<f64> {
    if cdi.abs() < 1e-12 || aspect_ratio <= 0.0 {
        None
    } else {
        Some(cl * cl / (std::f64::consts::PI * aspect_ratio * cdi))
    }
}

/// Free-stream direction for angle of attack and sideslip (radians).
///
/// Body axes: x downstream, z up; positive sideslip brings the flow from
/// the right (negative y).
pub fn freestream_direction(alpha: f64, beta: f64) -> Vec3 {
    let (sa, ca) = alpha.sin_cos();
    let (sb, cb) = beta.sin_cos();
    Vec3::new(ca * cb, -sb, sa * cb)
}

/// Lift and drag unit vectors for the given free stream.
pub fn wind_axes(alpha: f64, beta: f64) -> (Vec3, Vec3) {
    let drag = freestream_direction(alpha, beta);
    let (sa, ca) = alpha.sin_cos();
    let lift = Vec3::new(-sa, 0.0, ca);
    (lift, drag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_karman_tsien_incompressible_passthrough() {
        let kt = KarmanTsien::new(0.0);
        assert_eq!(kt.correct(-1.3, 0).unwrap(), -1.3);
    }

    #[test]
    fn test_karman_tsien_amplifies_suction() {
        let kt = KarmanTsien::new(0.5);
        let cp = kt.correct(-1.0, 0).unwrap();
        assert!(cp < -1.0 / kt.beta());
        assert_relative_eq!(kt.correct(0.0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_karman_tsien_invalid() {
        let kt = KarmanTsien::new(0.8);
        let err = kt.correct(-10.0, 7).unwrap_err();
        assert_eq!(err, AnalysisError::CompressibilityInvalid { node: 7, mach: 0.8 });
    }

    #[test]
    fn test_scaled_condition_fixed_lift() {
        let c = scaled_condition(PolarType::FixedLift, 0.25, 0.1, 100_000.0);
        assert_relative_eq!(c.mach, 0.2, epsilon = 1e-12);
        assert_relative_eq!(c.reynolds, 200_000.0, epsilon = 1e-6);
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_scaled_condition_clamps() {
        let c = scaled_condition(PolarType::FixedLift, 1e-9, 0.3, 100_000.0);
        assert_eq!(c.mach, limits::MAX_MACH);
        assert_relative_eq!(c.reynolds, 100.0 * 100_000.0);
        assert_eq!(c.warnings.len(), 2);
        assert!(c.warnings[0].starts_with("Artificially limiting Mach"));
        assert!(c.warnings[1].starts_with("Artificially limiting Re"));

        let r = scaled_condition(PolarType::RubberChord, 0.5, 0.0, 100_000.0);
        assert_relative_eq!(r.reynolds, 200_000.0);
        let f = scaled_condition(PolarType::FixedSpeed, 0.01, 0.2, 100_000.0);
        assert_eq!((f.mach, f.reynolds), (0.2, 100_000.0));
    }

    #[test]
    fn test_speed_from_weight() {
        let v = speed_from_weight(1.0, 1.225, 0.5, 0.5).unwrap();
        assert_relative_eq!(0.5 * 1.225 * v * v * 0.5 * 0.5, 9.81, epsilon = 1e-9);
        assert!(matches!(
            speed_from_weight(1.0, 1.225, 0.5, -0.1),
            Err(AnalysisError::NegativeLift { .. })
        ));
    }

    #[test]
    fn test_kutta_joukowski_lift_up() {
        // spanwise segment along +y in a +x stream: lift along +z
        let f = kutta_joukowski(1.0, &Vec3::new(1.0, 0.0, 0.0), 1.0, &Vec3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(f.z, 1.0);
    }

    #[test]
    fn test_wind_axes_orthogonal() {
        let (l, d) = wind_axes(0.1, 0.0);
        assert_relative_eq!(l.dot(&d), 0.0, epsilon = 1e-14);
    }
}

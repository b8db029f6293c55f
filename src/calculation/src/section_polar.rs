//! Viscous section data for the wing engines.
//!
//! A [`SectionPolar`] is a table of 2D coefficients at one Reynolds number.
//! [`FoilPolars`] groups the tables of every airfoil used on a wing and
//! answers lookups by angle of attack (lifting line) or by lift coefficient
//! (viscous strip drag of the panel methods), interpolating in Reynolds
//! number between the bracketing tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::foil_solver::FoilResult;
use crate::polar::{AeroCoefficients, Polar};

/// One row of a section polar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionPoint {
    /// Degrees
    pub alpha: f64,
    /// Lift coefficient
    pub cl: f64,
    /// Drag coefficient
    pub cd: f64,
    /// Moment coefficient
    pub cm: f64,
}

/// Coefficients interpolated at one station.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SectionCoefficients {
    /// Degrees
    pub alpha: f64,
    /// Lift coefficient
    pub cl: f64,
    /// Drag coefficient
    pub cd: f64,
    /// Moment coefficient
    pub cm: f64,
    /// The lookup fell outside the tabulated range and was clamped
    pub out_of_envelope: bool,
}

/// Section coefficients at a single Reynolds number, sorted by alpha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPolar {
    /// Chord Reynolds number of the table
    pub reynolds: f64,
    /// Rows sorted by alpha
    pub points: Vec<SectionPoint>,
}

impl SectionPolar {
    /// Table from raw rows; non-finite rows are dropped and at least two must remain.
    pub fn new(reynolds: f64, mut points: Vec<SectionPoint>) -> AnalysisResult<Self> {
        points.retain(|p| p.alpha.is_finite() && p.cl.is_finite() && p.cd.is_finite());
        if points.len() < 2 {
            return Err(AnalysisError::geometry(format!(
                "section polar at Re {:.0} has fewer than two points",
                reynolds
            )));
        }
        points.sort_by(|a, b| a.alpha.total_cmp(&b.alpha));
        Ok(Self { reynolds, points })
    }

    /// Thin-airfoil table: `cl = 2π(α - α0)`, parabolic drag, constant moment.
    pub fn linear(reynolds: f64, alpha0_deg: f64, cd0: f64, k: f64, cm: f64) -> Self {
        let points = (-10..=15)
            .map(|i| {
                let alpha = i as f64;
                let cl = 2.0 * std::f64::consts::PI * (alpha - alpha0_deg).to_radians();
                SectionPoint { alpha, cl, cd: cd0 + k * cl * cl, cm }
            })
            .collect();
        Self { reynolds, points }
    }

    /// Table built from the converged points of a 2D polar.
    pub fn from_polar(polar: &Polar<FoilResult>) -> AnalysisResult<Self> {
        let reynolds = polar
            .converged()
            .map(|r| r.reynolds)
            .next()
            .ok_or_else(|| AnalysisError::geometry(format!("polar {} has no converged point", polar.name)))?;
        let points = polar
            .converged()
            .map(|r| SectionPoint {
                alpha: r.alpha(),
                cl: r.cl(),
                cd: r.cd(),
                cm: r.cm(),
            })
            .collect();
        Self::new(reynolds, points)
    }

    /// Index of the maximum lift; lookups by Cl stay on the attached branch.
    fn cl_max_index(&self) -> usize {
        self.points
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if p.cl > self.points[best].cl { i } else { best })
    }

    /// Row of least lift at or below the maximum-lift row.
    fn cl_min_index(&self) -> usize {
        let top = self.cl_max_index();
        self.points[..=top]
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if p.cl < self.points[best].cl { i } else { best })
    }

    /// Linear interpolation between two rows.
    fn blend(a: &SectionPoint, b: &SectionPoint, t: f64) -> SectionCoefficients {
        SectionCoefficients {
            alpha: a.alpha + t * (b.alpha - a.alpha),
            cl: a.cl + t * (b.cl - a.cl),
            cd: a.cd + t * (b.cd - a.cd),
            cm: a.cm + t * (b.cm - a.cm),
            out_of_envelope: false,
        }
    }

    /// Clamped lookup at a table end.
    fn at_end(p: &SectionPoint) -> SectionCoefficients {
        SectionCoefficients {
            alpha: p.alpha,
            cl: p.cl,
            cd: p.cd,
            cm: p.cm,
            out_of_envelope: true,
        }
    }

    /// Coefficients at `alpha` degrees, clamped outside the table.
    pub fn at_alpha(&self, alpha: f64) -> SectionCoefficients {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        if alpha < first.alpha {
            return Self::at_end(first);
        }
        if alpha > last.alpha {
            return Self::at_end(last);
        }
        for w in self.points.windows(2) {
            if alpha <= w[1].alpha {
                let span = w[1].alpha - w[0].alpha;
                let t = if span > 0.0 { (alpha - w[0].alpha) / span } else { 0.0 };
                return Self::blend(&w[0], &w[1], t);
            }
        }
        Self::at_end(last)
    }

    /// Lookup on the rising part of the lift curve, between min and max Cl.
    pub fn at_cl(&self, cl: f64) -> SectionCoefficients {
        let lo = self.cl_min_index();
        let hi = self.cl_max_index();
        if cl <= self.points[lo].cl {
            return SectionCoefficients {
                out_of_envelope: cl < self.points[lo].cl,
                ..Self::at_end(&self.points[lo])
            };
        }
        if cl >= self.points[hi].cl {
            return SectionCoefficients {
                out_of_envelope: cl > self.points[hi].cl,
                ..Self::at_end(&self.points[hi])
            };
        }
        for w in self.points[lo..=hi].windows(2) {
            let (a, b) = (&w[0], &w[1]);
            let (cmin, cmax) = (a.cl.min(b.cl), a.cl.max(b.cl));
            if cl >= cmin && cl <= cmax {
                let t = if b.cl != a.cl { (cl - a.cl) / (b.cl - a.cl) } else { 0.0 };
                return Self::blend(a, b, t);
            }
        }
        Self::at_end(&self.points[hi])
    }

    /// Angle of zero lift, interpolated on the attached branch.
    pub fn zero_lift_alpha(&self) -> f64 {
        self.at_cl(0.0).alpha
    }
}

/// All tables of one airfoil, sorted by Reynolds number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoilPolarSet {
    /// Tables in increasing Reynolds number
    pub polars: Vec<SectionPolar>,
}

impl FoilPolarSet {
    /// Insert a table, keeping the Reynolds order.
    pub fn push(&mut self, polar: SectionPolar) {
        self.polars.push(polar);
        self.polars.sort_by(|a, b| a.reynolds.total_cmp(&b.reynolds));
    }

    /// Apply `f` to the tables around `reynolds` and interpolate linearly in Reynolds number.
    fn lookup(&self, reynolds: f64, f: impl Fn(&SectionPolar) -> SectionCoefficients) -> SectionCoefficients {
        let first = &self.polars[0];
        let last = &self.polars[self.polars.len() - 1];
        if self.polars.len() == 1 {
            // a single table is used as is, any Reynolds number
            return f(first);
        }
        if reynolds <= first.reynolds {
            let mut c = f(first);
            c.out_of_envelope |= reynolds < first.reynolds;
            return c;
        }
        if reynolds >= last.reynolds {
            let mut c = f(last);
            c.out_of_envelope |= reynolds > last.reynolds;
            return c;
        }
        let upper = self.polars.iter().position(|p| p.reynolds >= reynolds).unwrap_or(self.polars.len() - 1);
        let (a, b) = (&self.polars[upper - 1], &self.polars[upper]);
        let t = (reynolds - a.reynolds) / (b.reynolds - a.reynolds);
        let (ca, cb) = (f(a), f(b));
        mix(&ca, &cb, t)
    }
}

/// Linear blend of two interpolated coefficient sets.
fn mix(a: &SectionCoefficients, b: &SectionCoefficients, t: f64) -> SectionCoefficients {
    SectionCoefficients {
        alpha: a.alpha + t * (b.alpha - a.alpha),
        cl: a.cl + t * (b.cl - a.cl),
        cd: a.cd + t * (b.cd - a.cd),
        cm: a.cm + t * (b.cm - a.cm),
        out_of_envelope: a.out_of_envelope || b.out_of_envelope,
    }
}

/// Section polars of every airfoil referenced by a wing, keyed by foil name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoilPolars {
    /// Tables by foil name
    pub foils: HashMap<String, FoilPolarSet>,
}

impl FoilPolars {
    /// No foils.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table for `foil`.
    pub fn insert(&mut self, foil: impl Into<String>, polar: SectionPolar) {
        self.foils.entry(foil.into()).or_default().push(polar);
    }

    /// True when `foil` has at least one table.
    pub fn contains(&self, foil: &str) -> bool {
        self.foils.get(foil).is_some_and(|s| !s.polars.is_empty())
    }

    /// Fails with `GeometryInvalid` naming the first foil without data.
    pub fn check<'a>(&self, foils: impl IntoIterator<Item = &'a str>) -> AnalysisResult<()> {
        for name in foils {
            if !self.contains(name) {
                return Err(AnalysisError::geometry(format!("no section polar for foil {}", name)));
            }
        }
        Ok(())
    }

    /// Tables of `foil`, or `GeometryInvalid` when it has none.
    fn set(&self, foil: &str) -> AnalysisResult<&FoilPolarSet> {
        self.foils
            .get(foil)
            .filter(|s| !s.polars.is_empty())
            .ok_or_else(|| AnalysisError::geometry(format!("no section polar for foil {}", foil)))
    }

    /// Coefficients at a station between two section foils, `blend` being the
    /// spanwise fraction from `foil_a` to `foil_b`.
    pub fn at_alpha(
        &self,
        foil_a: &str,
        foil_b: &str,
        blend: f64,
        alpha: f64,
        reynolds: f64,
    ) -> AnalysisResult<SectionCoefficients> {
        let a = self.set(foil_a)?.lookup(reynolds, |p| p.at_alpha(alpha));
        let b = self.set(foil_b)?.lookup(reynolds, |p| p.at_alpha(alpha));
        Ok(mix(&a, &b, blend))
    }

    /// Coefficients at lift `cl` at a station between two section foils.
    pub fn at_cl(
        &self,
        foil_a: &str,
        foil_b: &str,
        blend: f64,
        cl: f64,
        reynolds: f64,
    ) -> AnalysisResult<SectionCoefficients> {
        let a = self.set(foil_a)?.lookup(reynolds, |p| p.at_cl(cl));
        let b = self.set(foil_b)?.lookup(reynolds, |p| p.at_cl(cl));
        Ok(mix(&a, &b, blend))
    }

    /// Zero-lift angle at a station, degrees.
    pub fn zero_lift_alpha(&self, foil_a: &str, foil_b: &str, blend: f64, reynolds: f64) -> AnalysisResult<f64> {
        Ok(self.at_cl(foil_a, foil_b, blend, 0.0, reynolds)?.alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_alpha_lookup_interpolates() {
        let p = SectionPolar::linear(1e6, 0.0, 0.01, 0.0, 0.0);
        let c = p.at_alpha(2.5);
        assert_relative_eq!(c.cl, 2.0 * std::f64::consts::PI * 2.5f64.to_radians(), epsilon = 1e-12);
        assert!(!c.out_of_envelope);
        assert!(p.at_alpha(30.0).out_of_envelope);
    }

    #[test]
    fn test_cl_lookup_stays_on_attached_branch() {
        let pts = vec![
            SectionPoint { alpha: 0.0, cl: 0.0, cd: 0.01, cm: 0.0 },
            SectionPoint { alpha: 10.0, cl: 1.0, cd: 0.02, cm: 0.0 },
            SectionPoint { alpha: 15.0, cl: 1.2, cd: 0.04, cm: 0.0 },
            SectionPoint { alpha: 20.0, cl: 0.9, cd: 0.12, cm: 0.0 },
        ];
        let p = SectionPolar::new(1e5, pts).unwrap();
        let c = p.at_cl(1.0);
        assert_relative_eq!(c.alpha, 10.0);
        assert_relative_eq!(c.cd, 0.02);
        assert!(p.at_cl(1.5).out_of_envelope);
    }

    #[test]
    fn test_reynolds_interpolation_and_blend() {
        let mut polars = FoilPolars::new();
        polars.insert("a", SectionPolar::linear(1e5, 0.0, 0.02, 0.0, 0.0));
        polars.insert("a", SectionPolar::linear(3e5, 0.0, 0.01, 0.0, 0.0));
        polars.insert("b", SectionPolar::linear(1e5, -2.0, 0.01, 0.0, -0.05));
        let c = polars.at_cl("a", "a", 0.0, 0.5, 2e5).unwrap();
        assert_relative_eq!(c.cd, 0.015, epsilon = 1e-12);
        assert!(!c.out_of_envelope);
        let half = polars.at_alpha("a", "b", 0.5, 0.0, 1e5).unwrap();
        assert_relative_eq!(half.cm, -0.025, epsilon = 1e-12);
        assert!(polars.at_cl("a", "missing", 0.0, 0.5, 1e5).is_err());
        assert!(polars.check(["a", "b"]).is_ok());
    }

    #[test]
    fn test_zero_lift_alpha() {
        let p = SectionPolar::linear(1e6, -2.0, 0.01, 0.0, 0.0);
        assert_relative_eq!(p.zero_lift_alpha(), -2.0, epsilon = 1e-9);
    }
}

//! Polar metrics and performance figures.
//!
//! Derived quantities computed from the converged points of a polar:
//! lift-curve slope, zero-lift angle, best glide ratio, endurance factor
//! and, for 3D polars that carry a speed, the sink rate.

use std::collections::HashMap;

use crate::polar::{AeroCoefficients, Polar};

/// Coefficient columns of a polar and the figures derived from them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolarMetrics {
    /// Angle of attack, degrees
    pub alpha: Vec<f64>,
    /// Lift coefficient
    pub cl: Vec<f64>,
    /// Drag coefficient
    pub cd: Vec<f64>,
    /// Moment coefficient
    pub cm: Vec<f64>,
    /// Cl / Cd
    pub glide_ratio: Vec<f64>,
    /// Cl^1.5 / Cd, zero where Cl is negative
    pub endurance: Vec<f64>,
    /// Free-stream speed, m/s, when the engine reports one
    pub speed: Vec<Option<f64>>,
    /// V Cd / Cl, m/s, where the speed is known and Cl is positive
    pub sink_rate: Vec<Option<f64>>,
}

impl PolarMetrics {
    /// Empty columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of the converged points of `polar`, sorted by angle of attack.
    pub fn from_polar<R: AeroCoefficients>(polar: &Polar<R>) -> Result<Self, &'static str> {
        let mut rows: Vec<(f64, f64, f64, f64, Option<f64>)> = polar
            .converged()
            .map(|r| (r.alpha(), r.cl(), r.cd(), r.cm(), r.speed()))
            .collect();
        if rows.len() < 2 {
            return Err("Need at least 2 converged points to compute metrics");
        }
        if rows.iter().any(|r| !r.0.is_finite() || !r.1.is_finite() || !r.2.is_finite()) {
            return Err("Polar contains non-finite coefficients");
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut metrics = Self::new();
        for (alpha, cl, cd, cm, speed) in rows {
            metrics.alpha.push(alpha);
            metrics.cl.push(cl);
            metrics.cd.push(cd);
            metrics.cm.push(cm);
            metrics.glide_ratio.push(if cd > 0.0 { cl / cd } else { 0.0 });
            metrics.endurance.push(if cd > 0.0 && cl > 0.0 { cl.powf(1.5) / cd } else { 0.0 });
            metrics.speed.push(speed);
            metrics
                .sink_rate
                .push(speed.filter(|_| cl > 0.0).map(|v| v * cd / cl));
        }
        Ok(metrics)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    /// Least-squares slope of Cl against alpha over the points within
    /// `[alpha_min, alpha_max]`, per degree.
    pub fn lift_slope_between(&self, alpha_min: f64, alpha_max: f64) -> Option<f64> {
        let pts: Vec<(f64, f64)> = self
            .alpha
            .iter()
            .zip(&self.cl)
            .filter(|(a, _)| **a >= alpha_min && **a <= alpha_max)
            .map(|(a, c)| (*a, *c))
            .collect();
        if pts.len() < 2 {
            return None;
        }
        let n = pts.len() as f64;
        let mean_a = pts.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_c = pts.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx: f64 = pts.iter().map(|p| (p.0 - mean_a).powi(2)).sum();
        let sxy: f64 = pts.iter().map(|p| (p.0 - mean_a) * (p.1 - mean_c)).sum();
        if sxx < 1e-12 { None } else { Some(sxy / sxx) }
    }

    /// Lift slope per degree over the attached range, -5° to 8°.
    pub fn lift_slope(&self) -> Option<f64> {
        self.lift_slope_between(-5.0, 8.0)
            .or_else(|| self.lift_slope_between(f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Angle where Cl first changes sign, by linear interpolation.
    pub fn zero_lift_alpha(&self) -> Option<f64> {
        self.alpha
            .windows(2)
            .zip(self.cl.windows(2))
            .find(|(_, c)| c[0] == 0.0 || c[0].signum() != c[1].signum())
            .map(|(a, c)| {
                if c[1] == c[0] {
                    a[0]
                } else {
                    a[0] + (a[1] - a[0]) * (-c[0]) / (c[1] - c[0])
                }
            })
    }

    /// Index and value of the largest finite entry.
    fn argmax(values: &[f64]) -> Option<(usize, f64)> {
        values
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Best Cl/Cd and the angle where it occurs.
    pub fn max_glide_ratio(&self) -> Option<(f64, f64)> {
        Self::argmax(&self.glide_ratio).map(|(i, v)| (self.alpha[i], v))
    }

    /// Best Cl^1.5/Cd and the angle where it occurs.
    pub fn max_endurance(&self) -> Option<(f64, f64)> {
        Self::argmax(&self.endurance).map(|(i, v)| (self.alpha[i], v))
    }

    /// Largest Cl and the angle where it occurs.
    pub fn max_cl(&self) -> Option<(f64, f64)> {
        Self::argmax(&self.cl).map(|(i, v)| (self.alpha[i], v))
    }

    /// Lowest sink rate and the angle where it occurs.
    pub fn min_sink_rate(&self) -> Option<(f64, f64)> {
        self.sink_rate
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|v| (i, v)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, v)| (self.alpha[i], v))
    }

    /// Minimum drag coefficient.
    pub fn min_cd(&self) -> Option<f64> {
        self.cd.iter().copied().reduce(f64::min)
    }

    /// Summary statistics keyed by name.
    pub fn get_summary(&self) -> HashMap<String, f64> {
        let mut summary = HashMap::new();
        if self.is_empty() {
            return summary;
        }
        summary.insert("n_points".to_string(), self.len() as f64);
        if let Some(s) = self.lift_slope() {
            summary.insert("lift_slope_per_deg".to_string(), s);
        }
        if let Some(a) = self.zero_lift_alpha() {
            summary.insert("zero_lift_alpha".to_string(), a);
        }
        if let Some((a, cl)) = self.max_cl() {
            summary.insert("cl_max".to_string(), cl);
            summary.insert("alpha_cl_max".to_string(), a);
        }
        if let Some((a, g)) = self.max_glide_ratio() {
            summary.insert("max_glide_ratio".to_string(), g);
            summary.insert("alpha_max_glide".to_string(), a);
        }
        if let Some((_, e)) = self.max_endurance() {
            summary.insert("max_endurance".to_string(), e);
        }
        if let Some(cd) = self.min_cd() {
            summary.insert("cd_min".to_string(), cd);
        }
        if let Some((_, s)) = self.min_sink_rate() {
            summary.insert("min_sink_rate".to_string(), s);
        }
        summary
    }

    /// Whether the data looks physical: increasing angles, positive drag.
    pub fn is_valid(&self) -> bool {
        if self.len() < 2 {
            return false;
        }
        if self.alpha.windows(2).any(|w| w[1] <= w[0]) {
            return false;
        }
        self.cd.iter().all(|cd| *cd > 0.0)
    }
}

/// Metrics of a polar.
pub fn compute_polar_metrics<R: AeroCoefficients>(polar: &Polar<R>) -> Result<PolarMetrics, &'static str> {
    PolarMetrics::from_polar(polar)
}

/// Metrics of several polars, skipping those with too few converged points.
pub fn batch_compute_metrics<R: AeroCoefficients>(polars: &[Polar<R>]) -> Vec<PolarMetrics> {
    polars
        .iter()
        .filter_map(|p| PolarMetrics::from_polar(p).ok())
        .collect()
}

/// Mean squared Cl difference between two polars at the angles of the
/// first, the second being interpolated.
pub fn lift_curve_mse(reference: &PolarMetrics, other: &PolarMetrics) -> Result<f64, &'static str> {
    if other.len() < 2 {
        return Err("Second polar needs at least 2 points");
    }
    let interp = |alpha: f64| -> Option<f64> {
        other
            .alpha
            .windows(2)
            .zip(other.cl.windows(2))
            .find(|(a, _)| alpha >= a[0] && alpha <= a[1])
            .map(|(a, c)| {
                let t = if a[1] > a[0] { (alpha - a[0]) / (a[1] - a[0]) } else { 0.0 };
                c[0] + t * (c[1] - c[0])
            })
    };
    let errors: Vec<f64> = reference
        .alpha
        .iter()
        .zip(&reference.cl)
        .filter_map(|(a, c)| interp(*a).map(|o| (o - c).powi(2)))
        .collect();
    if errors.is_empty() {
        return Err("Polars share no angle range");
    }
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polar::{OpPoint, PointStatus, PolarType, SweepVariable};
    use approx::assert_relative_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        alpha: f64,
        speed: Option<f64>,
    }

    impl AeroCoefficients for Row {
        fn alpha(&self) -> f64 {
            self.alpha
        }
        fn cl(&self) -> f64 {
            0.1 * (self.alpha + 2.0)
        }
        fn cd(&self) -> f64 {
            0.01 + 0.01 * self.cl() * self.cl()
        }
        fn cm(&self) -> f64 {
            -0.05
        }
        fn speed(&self) -> Option<f64> {
            self.speed
        }
    }

    fn polar(alphas: &[f64], speed: Option<f64>) -> Polar<Row> {
        let mut p = Polar::new("test", PolarType::FixedSpeed, SweepVariable::Alpha);
        for &alpha in alphas {
            p.push(OpPoint {
                target: alpha,
                status: PointStatus::Converged,
                iterations: 1,
                warnings: vec![],
                result: Some(Row { alpha, speed }),
            });
        }
        p
    }

    #[test]
    fn test_slope_and_zero_lift() {
        let alphas: Vec<f64> = (-4..=10).map(|a| a as f64).collect();
        let m = PolarMetrics::from_polar(&polar(&alphas, None)).unwrap();
        assert!(m.is_valid());
        assert_relative_eq!(m.lift_slope().unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(m.zero_lift_alpha().unwrap(), -2.0, epsilon = 1e-12);
        assert!(m.min_sink_rate().is_none());
    }

    #[test]
    fn test_glide_ratio_peak() {
        let alphas: Vec<f64> = (-4..=20).map(|a| a as f64).collect();
        let m = PolarMetrics::from_polar(&polar(&alphas, Some(12.0))).unwrap();
        // Cl/Cd peaks where Cd0 = k Cl², Cl = 1 at alpha = 8
        let (alpha, ratio) = m.max_glide_ratio().unwrap();
        assert_relative_eq!(alpha, 8.0, epsilon = 1e-12);
        assert_relative_eq!(ratio, 50.0, epsilon = 1e-9);
        let (_, sink) = m.min_sink_rate().unwrap();
        assert!(sink > 0.0 && sink < 12.0 / 50.0 + 1e-9);
        let summary = m.get_summary();
        assert!(summary.contains_key("max_endurance"));
        assert!(summary.contains_key("min_sink_rate"));
    }

    #[test]
    fn test_too_few_points() {
        assert!(PolarMetrics::from_polar(&polar(&[1.0], None)).is_err());
        let batch = batch_compute_metrics(&[polar(&[1.0], None), polar(&[0.0, 1.0, 2.0], None)]);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_mse_between_polars() {
        let a = PolarMetrics::from_polar(&polar(&[0.0, 2.0, 4.0], None)).unwrap();
        let b = PolarMetrics::from_polar(&polar(&[0.0, 4.0], None)).unwrap();
        assert_relative_eq!(lift_curve_mse(&a, &b).unwrap(), 0.0, epsilon = 1e-20);
    }
}

//! Nonlinear lifting-line analysis of the main wing.
//!
//! Stations sit at cosine-spaced span positions. The circulation is fitted
//! by a sine series whose coefficients give the induced angles; each
//! station then reads its lift from the section polars at the effective
//! angle of attack, and the circulation moves a fraction of the way towards
//! the one this lift implies. The loop stops when the induced angles settle.

use std::f64::consts::PI;

use ndarray::{Array1, Array2};

use crate::aerodynamics::{oswald_efficiency, speed_from_weight};
use crate::error::{AnalysisError, AnalysisResult};
use crate::linalg::{Factorization, SharedSolver, default_solver};
use crate::panel3d::{StripResult, WingMethod, WingPolarSpec, WingResult};
use crate::plane::Plane;
use crate::polar::{PolarType, SweepVariable};
use crate::progress::RunContext;
use crate::section_polar::{FoilPolars, SectionCoefficients};
use crate::settings::{SweepOptions, WingSettings};
use crate::sweep::{PointOutcome, PointSolver};
use crate::vector::Vec3;

/// One spanwise station.
#[derive(Debug, Clone)]
struct Station {
    /// Spanwise coordinate
    y: f64,
    /// Glauert angle, y = -b/2 cos θ
    theta: f64,
    /// Local chord
    chord: f64,
    /// Twist plus wing incidence, degrees
    twist: f64,
    /// Quarter-chord point
    quarter_chord: Vec3,
    /// Inboard section foil
    foil_a: String,
    /// Outboard section foil
    foil_b: String,
    /// Spanwise fraction from `foil_a` to `foil_b`
    blend: f64,
    /// Span width represented by the station
    width: f64,
}

/// Nonlinear lifting line driven by section polars.
pub struct LiftingLineSolver {
    /// Analyzed plane; only its main wing carries load
    pub plane: Plane,
    /// Polar definition
    pub spec: WingPolarSpec,
    /// Numerical settings
    pub settings: WingSettings,
    /// Section polars of the wing's foils
    polars: FoilPolars,
    /// Report unconverged points with data
    keep_out_points: bool,
    /// Linear-system backend
    linear: SharedSolver,
    /// Circulation of the last converged point, unit speed
    carried: Option<Vec<f64>>,
}

impl LiftingLineSolver {
    /// Solver with the default linear backend.
    pub fn new(plane: Plane, polars: FoilPolars, spec: WingPolarSpec, settings: WingSettings) -> Self {
        Self {
            plane,
            spec: WingPolarSpec {
                method: WingMethod::LiftingLine,
                ..spec
            },
            settings,
            polars,
            keep_out_points: true,
            linear: default_solver(),
            carried: None,
        }
    }

    /// Substitute the linear-system backend.
    pub fn with_linear_solver(mut self, linear: SharedSolver) -> Self {
        self.linear = linear;
        self
    }

    /// Keep unconverged points when the sweep options ask for it.
    pub fn with_sweep_options(mut self, options: &SweepOptions) -> Self {
        self.keep_out_points = options.keep_out_points;
        self
    }

    /// Spanwise stations at Glauert angles over the main wing.
    fn stations(&self) -> Vec<Station> {
        let placed = &self.plane.wing;
        let wing = &placed.wing;
        let half = 0.5 * wing.span();
        let n = self.settings.llt_stations;
        (1..n)
            .rev()
            .map(|k| {
                let theta = k as f64 * PI / n as f64;
                let y = half * theta.cos();
                let s = wing.station(y >= 0.0, y.abs());
                Station {
                    y,
                    theta,
                    chord: s.chord,
                    twist: s.twist + placed.tilt,
                    quarter_chord: Vec3::new(
                        placed.position.x + s.offset + 0.25 * s.chord,
                        placed.position.y + y,
                        placed.position.z + s.z,
                    ),
                    foil_a: s.foil_a,
                    foil_b: s.foil_b,
                    blend: s.blend,
                    width: half * theta.sin() * PI / n as f64,
                }
            })
            .collect()
    }

    /// Sine series coefficients of `gamma` and the induced angles (radians).
    fn induced_angles(kernel: &dyn Factorization, stations: &[Station], gamma: &[f64], span: f64) -> AnalysisResult<Vec<f64>> {
        let rhs = Array1::from_iter(gamma.iter().map(|g| g / (2.0 * span)));
        let a = kernel.solve(rhs.view())?;
        Ok(stations
            .iter()
            .map(|st| {
                a.iter()
                    .enumerate()
                    .map(|(j, an)| (j + 1) as f64 * an * ((j + 1) as f64 * st.theta).sin())
                    .sum::<f64>()
                    / st.theta.sin()
            })
            .collect())
    }

    /// Circulation of the linear problem with a 2π lift slope, unit speed.
    fn linear_circulation(&self, stations: &[Station], alpha: f64, reynolds: &[f64]) -> AnalysisResult<Vec<f64>> {
        let span = self.plane.wing.wing.span();
        let n = stations.len();
        let mut m = Array2::<f64>::zeros((n, n));
        let mut rhs = Array1::<f64>::zeros(n);
        for (k, st) in stations.iter().enumerate() {
            let mu = 2.0 * PI * st.chord / (4.0 * span);
            for j in 0..n {
                let order = (j + 1) as f64;
                m[[k, j]] = (order * st.theta).sin() * (mu * order + st.theta.sin());
            }
            let alpha0 = self
                .polars
                .zero_lift_alpha(&st.foil_a, &st.foil_b, st.blend, reynolds[k])?;
            rhs[k] = mu * (alpha + st.twist - alpha0).to_radians() * st.theta.sin();
        }
        let a = self.linear.solve(m, rhs.view())?;
        Ok(stations
            .iter()
            .map(|st| {
                2.0 * span
                    * a.iter()
                        .enumerate()
                        .map(|(j, an)| an * ((j + 1) as f64 * st.theta).sin())
                        .sum::<f64>()
            })
            .collect())
    }

    /// Free-stream speed: from the weight for fixed-lift polars, otherwise the target or polar speed.
    fn speed_for(&self, cl: f64, target_speed: Option<f64>) -> AnalysisResult<f64> {
        match self.spec.polar_type {
            PolarType::FixedLift => speed_from_weight(
                self.plane.mass,
                self.spec.fluid.density,
                self.plane.wing.wing.area(),
                cl,
            ),
            _ => Ok(target_speed.unwrap_or(self.spec.speed)),
        }
    }

    /// Wing lift coefficient at unit speed from the station circulations.
    fn wing_cl(stations: &[Station], gamma: &[f64], area: f64) -> f64 {
        // unit speed: local lift per span is 2Γ over the dynamic pressure
        2.0 * stations.iter().zip(gamma).map(|(st, g)| g * st.width).sum::<f64>() / area
    }

    /// Solve one point at `alpha` (degrees), speed taken from the polar type.
    pub fn analyze(
        &mut self,
        alpha: f64,
        target_speed: Option<f64>,
        ctx: &mut RunContext,
    ) -> AnalysisResult<PointOutcome<WingResult>> {
        ctx.check_cancel()?;
        let wing = &self.plane.wing.wing;
        let span = wing.span();
        let area = wing.area();
        let stations = self.stations();
        let n = stations.len();

        let mut kernel = Array2::<f64>::zeros((n, n));
        for (k, st) in stations.iter().enumerate() {
            for j in 0..n {
                kernel[[k, j]] = ((j + 1) as f64 * st.theta).sin();
            }
        }
        let kernel = self.linear.factorize(kernel)?;

        let mut gamma = match self.carried.take() {
            Some(g) if g.len() == n => g,
            _ => {
                let v0 = match self.spec.polar_type {
                    PolarType::FixedLift => self.spec.speed,
                    _ => target_speed.unwrap_or(self.spec.speed),
                };
                let reynolds: Vec<f64> = stations.iter().map(|st| self.spec.fluid.reynolds(v0, st.chord)).collect();
                self.linear_circulation(&stations, alpha, &reynolds)?
            }
        };

        let precision = self.settings.llt_alpha_precision;
        let relax = self.settings.llt_relaxation;
        let mut previous: Option<Vec<f64>> = None;
        let mut converged = false;
        let mut iterations = 0;
        let mut state: Option<(Vec<f64>, Vec<SectionCoefficients>, Vec<f64>, f64)> = None;

        for it in 1..=self.settings.llt_max_iterations {
            ctx.check_cancel()?;
            ctx.iteration(it);
            iterations = it;
            let ai = Self::induced_angles(&*kernel, &stations, &gamma, span)?;
            let speed = self.speed_for(Self::wing_cl(&stations, &gamma, area), target_speed)?;
            let mut sections = Vec::with_capacity(n);
            let mut reynolds = Vec::with_capacity(n);
            for (k, st) in stations.iter().enumerate() {
                let re = self.spec.fluid.reynolds(speed, st.chord);
                let alpha_eff = alpha + st.twist - ai[k].to_degrees();
                let c = self.polars.at_alpha(&st.foil_a, &st.foil_b, st.blend, alpha_eff, re)?;
                if c.out_of_envelope && !self.keep_out_points {
                    return Err(AnalysisError::out_of_envelope(format!(
                        "station y = {:.4} m at α = {:.2}°, Re = {:.0}",
                        st.y, alpha_eff, re
                    )));
                }
                sections.push(c);
                reynolds.push(re);
            }

            let delta = previous.as_ref().map(|p| {
                p.iter()
                    .zip(&ai)
                    .map(|(a, b)| (a - b).abs().to_degrees())
                    .fold(0.0, f64::max)
            });
            previous = Some(ai.clone());
            state = Some((ai, sections, reynolds, speed));
            if delta.is_some_and(|d| d < precision) {
                converged = true;
                break;
            }

            let Some((_, sections, _, _)) = &state else { break };
            for (k, st) in stations.iter().enumerate() {
                let target = 0.5 * st.chord * sections[k].cl;
                gamma[k] += (target - gamma[k]) / relax;
            }
            if gamma.iter().any(|g| !g.is_finite()) {
                return Err(AnalysisError::Diverged {
                    iteration: it,
                    reason: "non-finite circulation".into(),
                });
            }
        }

        let Some((ai, sections, reynolds, speed)) = state else {
            return Err(AnalysisError::geometry("lifting line needs at least one iteration"));
        };
        if converged {
            self.carried = Some(gamma.clone());
        }
        let result = self.assemble(alpha, speed, &stations, &gamma, &ai, &sections, &reynolds);
        let mut warnings = vec![];
        if result.out_of_envelope {
            warnings.push("stations outside the section polar envelope, values clamped".to_string());
        }
        if !converged {
            warnings.push(format!("lifting line unconverged after {} iterations", iterations));
        }
        Ok(PointOutcome {
            result,
            converged,
            iterations,
            warnings,
        })
    }

    /// Wing coefficients and spanwise distributions of a solved point.
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        alpha: f64,
        speed: f64,
        stations: &[Station],
        gamma: &[f64],
        ai: &[f64],
        sections: &[SectionCoefficients],
        reynolds: &[f64],
    ) -> WingResult {
        let wing = &self.plane.wing.wing;
        let (area, span, mac) = (wing.area(), wing.span(), wing.mac());
        let cog = self.plane.cog;
        let (mut cl, mut cdi, mut cdv, mut cm, mut croll, mut cyaw, mut lift_x) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let mut strips = Vec::with_capacity(stations.len());
        for (k, st) in stations.iter().enumerate() {
            let s = &sections[k];
            let ds = st.chord * st.width;
            let cdi_local = s.cl * ai[k];
            let arm = st.quarter_chord - cog;
            cl += s.cl * ds;
            cdi += cdi_local * ds;
            cdv += s.cd * ds;
            cm += s.cm * st.chord * ds - arm.x * s.cl * ds;
            croll += arm.y * s.cl * ds;
            cyaw -= arm.y * (s.cd + cdi_local) * ds;
            lift_x += st.quarter_chord.x * s.cl * ds;
            strips.push(StripResult {
                surface: 0,
                position: st.quarter_chord,
                chord: st.chord,
                width: st.width,
                cl: s.cl,
                cd_induced: cdi_local,
                cd_viscous: s.cd,
                induced_angle: -ai[k].to_degrees(),
                reynolds: reynolds[k],
                circulation: gamma[k],
                out_of_envelope: s.out_of_envelope,
            });
        }
        let x_cp = if cl.abs() > 1e-12 { lift_x / cl } else { cog.x };
        cl /= area;
        cdi /= area;
        cdv /= area;
        let q = self.spec.fluid.dynamic_pressure(speed);
        let report = self.plane.symmetry(self.spec.beta);
        WingResult {
            method: WingMethod::LiftingLine,
            alpha,
            beta: 0.0,
            speed,
            control: 0.0,
            cl,
            cy: 0.0,
            cdi,
            cdv,
            cd: cdi + cdv,
            cm: cm / (area * mac),
            croll: croll / (area * span),
            cyaw: cyaw / (area * span),
            lift: cl * q * area,
            drag: (cdi + cdv) * q * area,
            x_cp,
            efficiency: oswald_efficiency(cl, cdi, wing.aspect_ratio()),
            symmetric: report.symmetric,
            symmetry_reasons: report.reasons,
            wake_iterations: 0,
            out_of_envelope: strips.iter().any(|s| s.out_of_envelope),
            strips,
            panel_cp: vec![],
            strengths: vec![],
        }
    }
}

impl PointSolver for LiftingLineSolver {
    type Output = WingResult;

    fn polar_type(&self) -> PolarType {
        self.spec.polar_type
    }

    fn variable(&self) -> SweepVariable {
        self.spec.variable
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> AnalysisResult<()> {
        self.settings.validate()?;
        self.spec.validate()?;
        if !matches!(self.spec.variable, SweepVariable::Alpha | SweepVariable::Speed) {
            return Err(AnalysisError::geometry(format!(
                "the lifting line cannot sweep {:?}",
                self.spec.variable
            )));
        }
        if self.spec.beta.abs() > 1e-9 {
            return Err(AnalysisError::geometry("the lifting line has no sideslip model"));
        }
        self.plane.validate()?;
        let wing = &self.plane.wing.wing;
        self.polars.check(wing.foil_names())?;
        if self.plane.wing2.is_some() || self.plane.elevator.is_some() || self.plane.fin.is_some() {
            ctx.log("Lifting line: only the main wing is analyzed");
        }
        ctx.log(format!(
            "Lifting line on {} with {} stations",
            wing.name,
            self.settings.llt_stations - 1
        ));
        Ok(())
    }

    fn solve_point(&mut self, target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<WingResult>> {
        match self.spec.variable {
            SweepVariable::Speed => self.analyze(self.spec.alpha, Some(target), ctx),
            _ => self.analyze(target, None, ctx),
        }
    }

    fn reset_state(&mut self) {
        self.carried = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAVITY;
    use crate::progress::{CancelToken, NullSink};
    use crate::section_polar::SectionPolar;
    use crate::wing::Wing;

    fn solver(alpha0: f64) -> LiftingLineSolver {
        let plane = Plane::from_wing(Wing::rectangular("ar8", 8.0, 1.0, "f", 4, 10), 10.0);
        let mut polars = FoilPolars::new();
        polars.insert("f", SectionPolar::linear(5e5, alpha0, 0.008, 0.005, -0.05));
        LiftingLineSolver::new(plane, polars, WingPolarSpec::default(), WingSettings::default())
    }

    fn run(s: &mut LiftingLineSolver, alpha: f64) -> AnalysisResult<PointOutcome<WingResult>> {
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        s.prepare(&mut ctx)?;
        s.analyze(alpha, None, &mut ctx)
    }

    #[test]
    fn test_rectangular_wing_lift_slope() {
        let out = run(&mut solver(0.0), 5.0).unwrap();
        assert!(out.converged);
        let r = out.result;
        assert!(r.cl > 0.38 && r.cl < 0.5, "CL = {}", r.cl);
        // rectangular planform, slightly below elliptic
        let e = r.efficiency.unwrap();
        assert!(e > 0.85 && e <= 1.01, "e = {}", e);
        assert!(r.cdv > 0.008 && r.cdv < 0.01);
        assert_eq!(r.strips.len(), 19);
        assert!(r.strips.windows(2).all(|w| w[1].position.y > w[0].position.y));
    }

    #[test]
    fn test_cambered_section_lifts_at_zero_alpha() {
        let r = run(&mut solver(-2.0), 0.0).unwrap().result;
        assert!(r.cl > 0.1);
        assert!(r.strips.iter().all(|s| s.induced_angle < 0.0));
    }

    #[test]
    fn test_fixed_lift_speed_and_negative_lift() {
        let mut s = solver(0.0);
        s.spec.polar_type = PolarType::FixedLift;
        let r = run(&mut s, 4.0).unwrap().result;
        let expected = (2.0 * 10.0 * GRAVITY / (1.225 * 8.0 * r.cl)).sqrt();
        assert!((r.speed - expected).abs() / expected < 1e-2);
        let err = run(&mut s, -4.0).unwrap_err();
        assert!(matches!(err, AnalysisError::NegativeLift { .. }));
    }

    #[test]
    fn test_out_of_envelope_policy() {
        let mut s = solver(0.0);
        let out = run(&mut s, 20.0).unwrap();
        assert!(out.result.out_of_envelope);
        assert!(!out.warnings.is_empty());
        s.reset_state();
        s.keep_out_points = false;
        let err = run(&mut s, 20.0).unwrap_err();
        assert!(matches!(err, AnalysisError::OutOfEnvelope { .. }));
    }

    #[test]
    fn test_missing_polar_is_geometry_error() {
        let mut s = solver(0.0);
        s.polars = FoilPolars::new();
        let err = run(&mut s, 2.0).unwrap_err();
        assert!(matches!(err, AnalysisError::GeometryInvalid { .. }));
    }
}

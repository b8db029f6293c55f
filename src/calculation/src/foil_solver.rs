//! Viscous/inviscid coupled airfoil analysis.
//!
//! The unknowns are the signed tangential speeds at the panel control
//! points. Each evaluation splits the contour at the stagnation point,
//! marches the boundary layer on both sides, converts the mass defect
//! `m = Ue δ*` to a transpiration velocity `b = dm/dξ` and forms the
//! residual `q - (q_inv + D b)`, where `D` is the surface-speed response of
//! the panel system to blowing. Newton's method drives the residual to
//! zero with a finite-difference Jacobian and a backtracking line search.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::aerodynamics::{KarmanTsien, scaled_condition};
use crate::boundary_layer::{SideLayer, SideParams, march_side, resume_side};
use crate::error::{AnalysisError, AnalysisResult};
use crate::foil::Airfoil;
use crate::linalg::{SharedSolver, default_solver};
use crate::panel2d::{InviscidSystem, circulation_cl, cp_from_speed, integrate_pressure};
use crate::polar::{AeroCoefficients, PolarType, SweepVariable};
use crate::progress::RunContext;
use crate::settings::FoilSettings;
use crate::sweep::{PointOutcome, PointSolver};

/// Edge-speed perturbation for the Jacobian columns.
const JACOBIAN_STEP: f64 = 1e-6;
/// Step halvings tried before a Newton step is taken regardless.
const LINE_SEARCH_HALVINGS: usize = 4;
/// Bounds on the stagnation point's position between its two control points.
const STAGNATION_FRACTION: (f64, f64) = (0.01, 0.99);

/// Definition of a 2D polar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoilPolarSpec {
    /// How speed and Reynolds number follow the lift
    pub polar_type: PolarType,
    /// Swept variable
    pub variable: SweepVariable,
    /// Reference Reynolds number (chord based)
    pub reynolds: f64,
    /// Reference Mach number
    pub mach: f64,
    /// Critical amplification factor of the eN method
    pub ncrit: f64,
    /// Forced transition x/c, upper side
    pub xtr_top: f64,
    /// Forced transition x/c, lower side
    pub xtr_bot: f64,
    /// Couple the boundary layer; inviscid panel solution otherwise
    pub viscous: bool,
    /// Angle of attack for fixed-angle (Reynolds sweep) polars, degrees
    pub alpha: f64,
}

impl Default for FoilPolarSpec {
    fn default() -> Self {
        Self {
            polar_type: PolarType::FixedSpeed,
            variable: SweepVariable::Alpha,
            reynolds: 100_000.0,
            mach: 0.0,
            ncrit: 9.0,
            xtr_top: 1.0,
            xtr_bot: 1.0,
            viscous: true,
            alpha: 0.0,
        }
    }
}

impl FoilPolarSpec {
    /// Reject definitions no 2D analysis can run.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.viscous && !(self.reynolds > 0.0) {
            return Err(AnalysisError::geometry("viscous polar needs a positive Reynolds number"));
        }
        if !(0.0..1.0).contains(&self.mach) {
            return Err(AnalysisError::geometry(format!("Mach {} outside [0, 1)", self.mach)));
        }
        if !(self.ncrit > 0.0) {
            return Err(AnalysisError::geometry("NCrit must be positive"));
        }
        if matches!(self.variable, SweepVariable::Speed | SweepVariable::Control) {
            return Err(AnalysisError::geometry("2D polars sweep alpha, Cl or Reynolds"));
        }
        if matches!(self.polar_type, PolarType::Control) {
            return Err(AnalysisError::geometry("control polars are 3D only"));
        }
        Ok(())
    }
}

/// Carried edge-speed distribution between consecutive points.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLayerState {
    /// Signed tangential speed per control point
    pub edge_speed: Vec<f64>,
    /// Angle of attack the distribution belongs to (radians)
    pub alpha: f64,
}

/// One converged (or flagged) 2D operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoilResult {
    /// Degrees
    pub alpha: f64,
    /// Chord Reynolds number of the point
    pub reynolds: f64,
    /// Mach number of the point
    pub mach: f64,
    /// Pressure-integrated lift
    pub cl: f64,
    /// Total drag (Squire-Young)
    pub cd: f64,
    /// Pressure drag
    pub cdp: f64,
    /// Friction drag
    pub cdf: f64,
    /// Quarter-chord moment
    pub cm: f64,
    /// Lift from the circulation, for consistency checks
    pub cl_circulation: f64,
    /// Pressure-integrated drag (near zero when inviscid)
    pub cd_pressure: f64,
    /// Upper-side transition x/c
    pub xtr_top: f64,
    /// Lower-side transition x/c
    pub xtr_bot: f64,
    /// Turbulent separation on the upper side
    pub separated_top: bool,
    /// Turbulent separation on the lower side
    pub separated_bot: bool,
    /// Boundary layer was coupled
    pub viscous: bool,
    /// x/c of each control point
    pub x: Vec<f64>,
    /// Pressure coefficient per control point
    pub cp: Vec<f64>,
    /// Signed tangential speed
    pub ue: Vec<f64>,
    /// Upper-side boundary layer
    pub top: Option<SideLayer>,
    /// Lower-side boundary layer
    pub bottom: Option<SideLayer>,
}

impl AeroCoefficients for FoilResult {
    fn alpha(&self) -> f64 {
        self.alpha
    }
    fn cl(&self) -> f64 {
        self.cl
    }
    fn cd(&self) -> f64 {
        self.cd
    }
    fn cm(&self) -> f64 {
        self.cm
    }
}

/// Split of the control points at the stagnation point.
#[derive(Debug, Clone)]
struct SideSplit {
    /// Upper-side control points in marching order
    top: Vec<usize>,
    /// Lower-side control points in marching order
    bottom: Vec<usize>,
    /// Distance from the stagnation point per control point
    xi: Vec<f64>,
    /// x/c per control point
    x: Vec<f64>,
    /// Stagnation x/c
    x_stag: f64,
    /// dUe/dξ at the stagnation point
    stagnation_gradient: f64,
}

impl SideSplit {
    /// Control points of one side.
    fn order(&self, top: bool) -> &[usize] {
        if top { &self.top } else { &self.bottom }
    }
}

/// Everything one residual evaluation produces.
#[derive(Debug, Clone)]
struct Coupling {
    /// Side split of the evaluated speeds
    split: SideSplit,
    /// Upper-side layer
    top: SideLayer,
    /// Lower-side layer
    bottom: SideLayer,
    /// Displacement thickness per control point
    dstar: Vec<f64>,
    /// Transpiration velocity per control point
    blowing: Array1<f64>,
    /// q - q_inv - D b
    residual: Array1<f64>,
    /// Root mean square of the residual
    rms: f64,
}

/// Fixed inputs of the residual at one operating point.
#[derive(Clone, Copy)]
struct CouplingInputs<'a> {
    /// Panel system
    system: &'a InviscidSystem,
    /// Inviscid speeds at the point's angle of attack
    q_inv: &'a [f64],
    /// Blowing response
    d: &'a Array2<f64>,
    /// Kinematic viscosity, chord / Re
    nu: f64,
}

/// Coupled solver for one airfoil.
pub struct FoilSolver {
    /// Analyzed section
    pub foil: Airfoil,
    /// Polar definition
    pub spec: FoilPolarSpec,
    /// Numerical settings
    pub settings: FoilSettings,
    /// Linear-system backend
    linear: SharedSolver,
    /// Inviscid panel system, built on first use
    system: Option<InviscidSystem>,
    /// Blowing response of the panel system, built on first viscous use
    blowing: Option<Array2<f64>>,
    /// Edge speeds of the last point, for warm starts
    state: Option<BoundaryLayerState>,
}

impl FoilSolver {
    /// Solver with the default linear backend.
    pub fn new(foil: Airfoil, spec: FoilPolarSpec, settings: FoilSettings) -> Self {
        Self {
            foil,
            spec,
            settings,
            linear: default_solver(),
            system: None,
            blowing: None,
            state: None,
        }
    }

    /// Substitute the linear-system backend.
    pub fn with_linear_solver(mut self, linear: SharedSolver) -> Self {
        self.linear = linear;
        self
    }

    /// Edge speeds carried from the last point.
    pub fn state(&self) -> Option<&BoundaryLayerState> {
        self.state.as_ref()
    }

    /// Build the panel system and, when viscous, its blowing response.
    fn ensure_system(&mut self, ctx: &mut RunContext) -> AnalysisResult<()> {
        if self.system.is_none() {
            ctx.log("Creating the influence matrix...");
            self.system = Some(InviscidSystem::new(&self.foil, self.linear.as_ref())?);
        }
        if self.spec.viscous && self.blowing.is_none() {
            if let Some(system) = &self.system {
                ctx.log("Computing the blowing response...");
                self.blowing = Some(system.blowing_response()?);
            }
        }
        Ok(())
    }

    /// Analyze at angle of attack `alpha_deg`.
    pub fn analyze_alpha(&mut self, alpha_deg: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<FoilResult>> {
        self.analyze(alpha_deg, None, None, ctx)
    }

    /// Analyze at `alpha_deg` with a given Reynolds number (fixed-angle polars).
    pub fn analyze_reynolds(&mut self, reynolds: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<FoilResult>> {
        if !(reynolds > 0.0) {
            return Err(AnalysisError::out_of_envelope(format!("Reynolds number {}", reynolds)));
        }
        self.analyze(self.spec.alpha, Some((reynolds, self.spec.mach)), None, ctx)
    }

    /// Find the angle of attack giving lift coefficient `cl_target`.
    pub fn analyze_cl(&mut self, cl_target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<FoilResult>> {
        self.ensure_system(ctx)?;
        let mut warnings = Vec::new();
        let fixed = match self.spec.polar_type {
            PolarType::FixedLift | PolarType::RubberChord => {
                if cl_target <= 0.0 && self.spec.polar_type == PolarType::FixedLift {
                    return Err(AnalysisError::NegativeLift { cl: cl_target });
                }
                let c = scaled_condition(self.spec.polar_type, cl_target, self.spec.mach, self.spec.reynolds);
                warnings.extend(c.warnings);
                Some((c.reynolds, c.mach))
            }
            _ => None,
        };

        // linear inviscid estimate for the first two trials
        let (cl0, slope) = match &self.system {
            Some(system) => {
                let c0 = circulation_cl(&system.geom, system.solve(0.0).gamma);
                let c1 = circulation_cl(&system.geom, system.solve(1f64.to_radians()).gamma);
                (c0, (c1 - c0).max(0.05))
            }
            None => (0.0, 0.11),
        };
        let mut a_prev = (cl_target - cl0) / slope;
        let mut out = self.analyze(a_prev, fixed, Some(cl_target), ctx)?;
        let mut cl_prev = out.result.cl;
        let mut a = a_prev + (cl_target - cl_prev) / slope;
        let mut total = out.iterations;

        for _ in 0..self.settings.lift_iterations {
            if (cl_prev - cl_target).abs() < self.settings.lift_tolerance {
                break;
            }
            ctx.check_cancel()?;
            out = self.analyze(a, fixed, Some(cl_target), ctx)?;
            total += out.iterations;
            let cl = out.result.cl;
            let dcl = cl - cl_prev;
            let next = if dcl.abs() > 1e-9 {
                a + (cl_target - cl) * (a - a_prev) / dcl
            } else {
                a + (cl_target - cl) / slope
            };
            a_prev = a;
            cl_prev = cl;
            a = a_prev + (next - a_prev).clamp(-2.0, 2.0);
        }

        if (cl_prev - cl_target).abs() >= self.settings.lift_tolerance.max(1e-3) {
            out.converged = false;
        }
        out.iterations = total;
        warnings.append(&mut out.warnings);
        out.warnings = warnings;
        Ok(out)
    }

    /// Reynolds and Mach numbers of a point at lift `cl`, collecting any
    /// scaling warnings once.
    fn condition(&self, fixed: Option<(f64, f64)>, cl: f64, warnings: &mut Vec<String>) -> (f64, f64) {
        match fixed {
            Some(rm) => rm,
            None => {
                let c = scaled_condition(self.spec.polar_type, cl, self.spec.mach, self.spec.reynolds);
                for w in c.warnings {
                    if !warnings.contains(&w) {
                        warnings.push(w);
                    }
                }
                (c.reynolds, c.mach)
            }
        }
    }

    /// Locate the stagnation point (the sign change of `q` nearest the
    /// leading edge) and measure ξ from it.
    fn split(&self, q: &[f64], system: &InviscidSystem) -> AnalysisResult<SideSplit> {
        let geom = &system.geom;
        let n = q.len();
        let s_le = {
            let le = self.foil.leading_edge_index();
            geom.s_mid[le.min(n.saturating_sub(1))]
        };
        let k = (1..n)
            .filter(|&k| q[k - 1] < 0.0 && q[k] >= 0.0)
            .min_by(|&a, &b| (geom.s_mid[a] - s_le).abs().total_cmp(&(geom.s_mid[b] - s_le).abs()))
            .ok_or_else(|| AnalysisError::Diverged {
                iteration: 0,
                reason: "no stagnation point on the contour".into(),
            })?;
        let (f_min, f_max) = STAGNATION_FRACTION;
        let f = (-q[k - 1] / (q[k] - q[k - 1])).clamp(f_min, f_max);
        let ds = geom.s_mid[k] - geom.s_mid[k - 1];
        let s_stag = geom.s_mid[k - 1] + f * ds;
        let x: Vec<f64> = geom
            .mid
            .iter()
            .map(|p| (p.x - geom.leading_edge.x) / geom.chord)
            .collect();
        Ok(SideSplit {
            top: (0..k).rev().collect(),
            bottom: (k..n).collect(),
            xi: geom.s_mid.iter().map(|s| (s - s_stag).abs()).collect(),
            x_stag: x[k - 1] + f * (x[k] - x[k - 1]),
            stagnation_gradient: (q[k] - q[k - 1]) / ds,
            x,
        })
    }

    /// Boundary-layer inputs of one side.
    fn side_params(&self, top: bool, split: &SideSplit, nu: f64) -> SideParams {
        SideParams {
            nu,
            ncrit: self.spec.ncrit,
            xtr: if top { self.spec.xtr_top } else { self.spec.xtr_bot },
            substeps: self.settings.rk_substeps,
            stagnation_gradient: split.stagnation_gradient,
        }
    }

    /// March one side, resuming after station `from` of `prior` when given.
    fn march(
        &self,
        q: &[f64],
        split: &SideSplit,
        top: bool,
        nu: f64,
        prior: Option<(&SideLayer, usize)>,
    ) -> AnalysisResult<SideLayer> {
        let order = split.order(top);
        let xi: Vec<f64> = order.iter().map(|&i| split.xi[i]).collect();
        let x: Vec<f64> = order.iter().map(|&i| split.x[i]).collect();
        let ue: Vec<f64> = order.iter().map(|&i| q[i].abs()).collect();
        let params = self.side_params(top, split, nu);
        match prior {
            Some((layer, from)) => resume_side(&xi, &x, &ue, &params, layer, from),
            None => march_side(&xi, &x, &ue, &params),
        }
    }

    /// Transpiration velocity b = dm/dξ along each side. The mass defect
    /// vanishes at the stagnation point.
    fn blowing(split: &SideSplit, q: &[f64], dstar: &[f64]) -> AnalysisResult<Array1<f64>> {
        let mass: Vec<f64> = q.iter().zip(dstar).map(|(v, d)| v.abs() * d).collect();
        let mut b = Array1::zeros(q.len());
        for order in [&split.top, &split.bottom] {
            let len = order.len();
            if len < 2 {
                return Err(AnalysisError::Diverged {
                    iteration: 0,
                    reason: "stagnation point next to the trailing edge".into(),
                });
            }
            let xi = |j: usize| split.xi[order[j]];
            let m = |j: usize| mass[order[j]];
            for j in 0..len {
                b[order[j]] = match j {
                    0 => m(1) / xi(1),
                    _ if j + 1 == len => (m(j) - m(j - 1)) / (xi(j) - xi(j - 1)),
                    _ => (m(j + 1) - m(j - 1)) / (xi(j + 1) - xi(j - 1)),
                };
            }
        }
        Ok(b)
    }

    /// Write the displacement thickness of a side into `dstar`.
    fn scatter_dstar(order: &[usize], layer: &SideLayer, dstar: &mut [f64]) {
        for (&i, st) in order.iter().zip(&layer.stations) {
            dstar[i] = st.dstar;
        }
    }

    /// Evaluate the coupled residual at edge speeds `q`.
    fn couple(&self, q: &[f64], inputs: CouplingInputs) -> AnalysisResult<Coupling> {
        let n = q.len();
        let split = self.split(q, inputs.system)?;
        let top = self.march(q, &split, true, inputs.nu, None)?;
        let bottom = self.march(q, &split, false, inputs.nu, None)?;
        let mut dstar = vec![0.0; n];
        Self::scatter_dstar(&split.top, &top, &mut dstar);
        Self::scatter_dstar(&split.bottom, &bottom, &mut dstar);
        let blowing = Self::blowing(&split, q, &dstar)?;
        let db = inputs.d.dot(&blowing);
        let residual = Array1::from_iter((0..n).map(|i| q[i] - inputs.q_inv[i] - db[i]));
        let rms = (residual.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();
        if !rms.is_finite() {
            return Err(AnalysisError::Diverged {
                iteration: 0,
                reason: "non-finite edge-velocity residual".into(),
            });
        }
        Ok(Coupling {
            split,
            top,
            bottom,
            dstar,
            blowing,
            residual,
            rms,
        })
    }

    /// Finite-difference Jacobian of the residual, J = I - D db/dq.
    ///
    /// A perturbation near the stagnation point can move it, so those
    /// columns are evaluated from scratch. Elsewhere only the perturbed
    /// side is marched again, from two stations upstream of the change.
    /// Columns whose perturbed evaluation fails keep the identity.
    fn jacobian(&self, q: &[f64], base: &Coupling, inputs: CouplingInputs) -> Array2<f64> {
        let n = q.len();
        let mut jac = Array2::<f64>::eye(n);
        let mut position = vec![(true, 0); n];
        for top in [true, false] {
            for (j, &i) in base.split.order(top).iter().enumerate() {
                position[i] = (top, j);
            }
        }

        let mut qp = q.to_vec();
        for k in 0..n {
            qp[k] = q[k] + JACOBIAN_STEP;
            let (top, j) = position[k];
            let perturbed = if j <= 1 {
                self.couple(&qp, inputs).map(|c| c.blowing)
            } else {
                let prior = if top { &base.top } else { &base.bottom };
                self.march(&qp, &base.split, top, inputs.nu, Some((prior, j - 2)))
                    .and_then(|layer| {
                        let mut dstar = base.dstar.clone();
                        Self::scatter_dstar(base.split.order(top), &layer, &mut dstar);
                        Self::blowing(&base.split, &qp, &dstar)
                    })
            };
            qp[k] = q[k];
            let Ok(blowing) = perturbed else {
                log::trace!("jacobian column {} skipped", k);
                continue;
            };
            let mut column = jac.column_mut(k);
            for (m, (bp, b0)) in blowing.iter().zip(base.blowing.iter()).enumerate() {
                let db = (bp - b0) / JACOBIAN_STEP;
                if db != 0.0 {
                    column.scaled_add(-db, &inputs.d.column(m));
                }
            }
        }
        jac
    }

    /// Kinematic viscosity at edge speeds `q`, following the polar's
    /// Reynolds scaling with lift.
    #[allow(clippy::too_many_arguments)]
    fn viscosity(
        &self,
        system: &InviscidSystem,
        q: &[f64],
        alpha: f64,
        fixed: Option<(f64, f64)>,
        cl_hint: Option<f64>,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let cl = cl_hint.unwrap_or_else(|| integrate_pressure(&system.geom, &cp_from_speed(q), alpha).cl);
        let (reynolds, _) = self.condition(fixed, cl, warnings);
        system.geom.chord / reynolds
    }

    /// Solve one operating point.
    fn analyze(
        &mut self,
        alpha_deg: f64,
        fixed: Option<(f64, f64)>,
        cl_hint: Option<f64>,
        ctx: &mut RunContext,
    ) -> AnalysisResult<PointOutcome<FoilResult>> {
        self.ensure_system(ctx)?;
        let alpha = alpha_deg.to_radians();
        let Some(system) = self.system.as_ref() else {
            return Err(AnalysisError::geometry("panel system unavailable"));
        };
        let n = system.len();
        let inviscid = system.solve(alpha);
        let mut warnings = Vec::new();

        if !self.spec.viscous {
            let cl_guess = cl_hint.unwrap_or_else(|| circulation_cl(&system.geom, inviscid.gamma));
            let (reynolds, mach) = self.condition(fixed, cl_guess, &mut warnings);
            let result = self.assemble_result(alpha_deg, reynolds, mach, &inviscid.vt, inviscid.gamma, None, None)?;
            self.state = Some(BoundaryLayerState {
                edge_speed: inviscid.vt.clone(),
                alpha,
            });
            return Ok(PointOutcome {
                result,
                converged: true,
                iterations: 1,
                warnings,
            });
        }

        let Some(d) = self.blowing.as_ref() else {
            return Err(AnalysisError::geometry("blowing response unavailable"));
        };
        ctx.check_cancel()?;

        // initial guess: carried distribution shifted by the inviscid change
        let mut q: Vec<f64> = match &self.state {
            Some(st) if st.edge_speed.len() == n => {
                let prev = system.solve(st.alpha);
                (0..n).map(|i| st.edge_speed[i] + inviscid.vt[i] - prev.vt[i]).collect()
            }
            _ => inviscid.vt.clone(),
        };

        let mut inputs = CouplingInputs {
            system,
            q_inv: &inviscid.vt,
            d,
            nu: self.viscosity(system, &q, alpha, fixed, cl_hint, &mut warnings),
        };
        let mut current = self.couple(&q, inputs)?;
        for (side, xtr) in [("top", self.spec.xtr_top), ("bottom", self.spec.xtr_bot)] {
            if xtr <= current.split.x_stag {
                let msg = format!(
                    "{} side: forced transition x/c {:.3} lies upstream of the stagnation point",
                    side, xtr
                );
                log::warn!("{}", msg);
                warnings.push(msg);
            }
        }

        let mut converged = false;
        let mut iterations = 0;
        for iter in 1..=self.settings.max_iterations {
            ctx.check_cancel()?;
            ctx.iteration(iter);
            iterations = iter;
            log::debug!("alpha {:.2}: iteration {} rms {:.3e}", alpha_deg, iter, current.rms);
            if current.rms < self.settings.tolerance {
                converged = true;
                break;
            }

            let jac = self.jacobian(&q, &current, inputs);
            let rhs = current.residual.mapv(|r| -r);
            let mut step = self.linear.solve(jac, rhs.view())?;
            let largest = step.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            if largest > self.settings.max_step {
                step *= self.settings.max_step / largest;
            }

            // backtrack until the residual drops, then take the shortest step
            let mut lambda = 1.0;
            let mut accepted = None;
            for halving in 0..=LINE_SEARCH_HALVINGS {
                let trial: Vec<f64> = q.iter().zip(step.iter()).map(|(v, s)| v + lambda * s).collect();
                match self.couple(&trial, inputs) {
                    Ok(c) if c.rms < current.rms || halving == LINE_SEARCH_HALVINGS => {
                        accepted = Some((trial, c));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => log::trace!("alpha {:.2}: trial step {} failed: {}", alpha_deg, lambda, e),
                }
                lambda *= 0.5;
            }
            let Some((trial, c)) = accepted else {
                return Err(AnalysisError::Diverged {
                    iteration: iter,
                    reason: "no Newton step gives a valid boundary layer".into(),
                });
            };
            q = trial;
            current = c;

            let nu = self.viscosity(system, &q, alpha, fixed, cl_hint, &mut warnings);
            if nu != inputs.nu {
                inputs.nu = nu;
                current = self.couple(&q, inputs)?;
            }
        }
        converged |= current.rms < self.settings.tolerance;

        let cl_now = cl_hint.unwrap_or_else(|| integrate_pressure(&system.geom, &cp_from_speed(&q), alpha).cl);
        let (reynolds, mach) = self.condition(fixed, cl_now, &mut warnings);
        let blown = system.solve_with_blowing(alpha, &current.blowing.to_vec())?;
        if !converged {
            log::info!("alpha {:.2}: unconverged, rms {:.3e}", alpha_deg, current.rms);
        }
        let Coupling { top, bottom, .. } = current;
        let result = self.assemble_result(alpha_deg, reynolds, mach, &q, blown.gamma, Some(top), Some(bottom))?;
        self.state = Some(BoundaryLayerState { edge_speed: q, alpha });
        Ok(PointOutcome {
            result,
            converged,
            iterations,
            warnings,
        })
    }

    /// Coefficients, drag breakdown and distributions of a solved point.
    #[allow(clippy::too_many_arguments)]
    fn assemble_result(
        &self,
        alpha_deg: f64,
        reynolds: f64,
        mach: f64,
        q: &[f64],
        gamma: f64,
        top: Option<SideLayer>,
        bottom: Option<SideLayer>,
    ) -> AnalysisResult<FoilResult> {
        let Some(system) = self.system.as_ref() else {
            return Err(AnalysisError::geometry("panel system unavailable"));
        };
        let geom = &system.geom;
        let alpha = alpha_deg.to_radians();
        let cp = KarmanTsien::new(mach).correct_all(&cp_from_speed(q))?;
        let forces = integrate_pressure(geom, &cp, alpha);

        let (cd, cdf) = match (&top, &bottom) {
            (Some(t), Some(b)) => {
                let cd = (t.squire_young() + b.squire_young()) / geom.chord;
                let cdf = (friction_drag(t) + friction_drag(b)) / geom.chord;
                (cd, cdf.min(cd))
            }
            _ => (0.0, 0.0),
        };

        Ok(FoilResult {
            alpha: alpha_deg,
            reynolds,
            mach,
            cl: forces.cl,
            cd,
            cdp: cd - cdf,
            cdf,
            cm: forces.cm,
            cl_circulation: circulation_cl(geom, gamma),
            cd_pressure: forces.cd,
            xtr_top: top.as_ref().map(|l| l.transition_x).unwrap_or(1.0),
            xtr_bot: bottom.as_ref().map(|l| l.transition_x).unwrap_or(1.0),
            separated_top: top.as_ref().map(|l| l.separated).unwrap_or(false),
            separated_bot: bottom.as_ref().map(|l| l.separated).unwrap_or(false),
            viscous: top.is_some(),
            x: geom.mid.iter().map(|p| (p.x - geom.leading_edge.x) / geom.chord).collect(),
            cp,
            ue: q.to_vec(),
            top,
            bottom,
        })
    }
}

/// Wall shear of one side integrated along the surface and projected on
/// the chord line, trapezoidal between stations. Unit chord.
pub fn friction_drag(layer: &SideLayer) -> f64 {
    layer
        .stations
        .windows(2)
        .map(|w| {
            let ds = w[1].xi - w[0].xi;
            let tau = 0.5 * (w[0].cf * w[0].ue * w[0].ue + w[1].cf * w[1].ue * w[1].ue);
            let dx = (w[1].x - w[0].x).abs();
            if ds > 0.0 { tau * ds * (dx / ds).min(1.0) } else { 0.0 }
        })
        .sum()
}

impl PointSolver for FoilSolver {
    type Output = FoilResult;

    fn polar_type(&self) -> PolarType {
        self.spec.polar_type
    }

    fn variable(&self) -> SweepVariable {
        self.spec.variable
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> AnalysisResult<()> {
        self.settings.validate()?;
        self.spec.validate()?;
        self.foil
            .validate(self.settings.max_panels_per_side, self.settings.max_panel_angle_deg)?;
        ctx.log(format!(
            "{}: {} panels, Re = {:.0}, Mach = {:.3}, NCrit = {:.1}",
            self.foil.name,
            self.foil.panel_count(),
            self.spec.reynolds,
            self.spec.mach,
            self.spec.ncrit
        ));
        Ok(())
    }

    fn solve_point(&mut self, target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<FoilResult>> {
        match self.spec.variable {
            SweepVariable::Cl => self.analyze_cl(target, ctx),
            SweepVariable::Reynolds => self.analyze_reynolds(target, ctx),
            _ => self.analyze_alpha(target, ctx),
        }
    }

    fn reset_state(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_layer::TransitionKind;
    use crate::progress::{CancelToken, NullSink};
    use approx::assert_relative_eq;

    fn solver(code: &str, viscous: bool) -> FoilSolver {
        let foil = Airfoil::naca4(code, 80).unwrap();
        let spec = FoilPolarSpec {
            viscous,
            reynolds: 1e6,
            ..Default::default()
        };
        FoilSolver::new(foil, spec, FoilSettings::default())
    }

    #[test]
    fn test_inviscid_symmetric_zero_lift() {
        let mut s = solver("0012", false);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let out = s.analyze_alpha(0.0, &mut ctx).unwrap();
        assert!(out.converged);
        assert_relative_eq!(out.result.cl, 0.0, epsilon = 1e-8);
        assert_relative_eq!(out.result.cm, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_inviscid_pressure_matches_circulation() {
        let mut s = solver("2412", false);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let r = s.analyze_alpha(4.0, &mut ctx).unwrap().result;
        assert!((r.cl - r.cl_circulation).abs() < 0.02);
        assert!(r.cd_pressure.abs() < 0.01);
        assert_eq!(r.cd, 0.0);
    }

    #[test]
    fn test_inviscid_cl_target() {
        let mut s = solver("0012", false);
        s.spec.variable = SweepVariable::Cl;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let out = s.analyze_cl(0.5, &mut ctx).unwrap();
        assert!(out.converged);
        assert_relative_eq!(out.result.cl, 0.5, epsilon = 1e-3);
        assert!(out.result.alpha > 3.0 && out.result.alpha < 5.0);
    }

    #[test]
    fn test_compressibility_invalid_reported() {
        let mut s = solver("0012", false);
        s.spec.mach = 0.95;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let err = s.analyze_alpha(10.0, &mut ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::CompressibilityInvalid { .. }));
    }

    #[test]
    fn test_viscous_point_has_drag() {
        let mut s = solver("0012", true);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let out = s.analyze_alpha(0.0, &mut ctx).unwrap();
        assert!(out.converged, "{} iterations", out.iterations);
        let r = &out.result;
        assert!(r.cd > 0.004 && r.cd < 0.012, "cd = {}", r.cd);
        assert!(r.cdf > 0.0 && r.cdf <= r.cd);
        assert!(r.cl.abs() < 0.01);
        assert!(r.xtr_top > 0.0 && r.xtr_top <= 1.0);
        // symmetric section at zero incidence
        assert_relative_eq!(r.xtr_top, r.xtr_bot, epsilon = 0.02);
        assert!(s.state().is_some());
    }

    #[test]
    fn test_viscous_forces_consistent() {
        let mut s = solver("0012", true);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let out = s.analyze_alpha(4.0, &mut ctx).unwrap();
        assert!(out.converged, "{} iterations", out.iterations);
        let r = &out.result;

        // the converged speeds are those of the blown panel solution
        assert!((r.cl - r.cl_circulation).abs() < 0.02, "cl {} vs {}", r.cl, r.cl_circulation);
        // the boundary layer takes lift away from the inviscid value
        let system = s.system.as_ref().unwrap();
        let cl_inviscid = circulation_cl(&system.geom, system.solve(4f64.to_radians()).gamma);
        assert!(r.cl > 0.3 && r.cl < cl_inviscid, "cl {} inviscid {}", r.cl, cl_inviscid);

        let chord = system.geom.chord;
        let top = r.top.as_ref().unwrap();
        let bottom = r.bottom.as_ref().unwrap();
        assert_relative_eq!(r.cdf * chord, friction_drag(top) + friction_drag(bottom), max_relative = 1e-12);
        assert_relative_eq!(r.cd * chord, top.squire_young() + bottom.squire_young(), max_relative = 1e-12);
        assert_relative_eq!(r.cd, r.cdp + r.cdf, epsilon = 1e-15);
        assert!(r.cdp > 0.0 && r.cdf > 0.0);
        assert!(r.cd > 0.004 && r.cd < 0.015, "cd = {}", r.cd);
        // suction side transitions first
        assert!(r.xtr_top < r.xtr_bot);
    }

    #[test]
    fn test_trip_upstream_of_stagnation_point() {
        let mut s = solver("0012", true);
        s.spec.xtr_bot = 0.0;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let out = s.analyze_alpha(2.0, &mut ctx).unwrap();
        assert!(out.converged, "{} iterations", out.iterations);
        assert_eq!(out.warnings.len(), 1, "{:?}", out.warnings);
        assert!(out.warnings[0].starts_with("bottom side"));
        assert!(out.warnings[0].contains("upstream of the stagnation point"));

        let r = &out.result;
        assert!(r.xtr_bot < 0.01, "xtr_bot = {}", r.xtr_bot);
        let bottom = r.bottom.as_ref().unwrap();
        assert_eq!(bottom.transition, TransitionKind::Forced);
        assert!(bottom.stations.iter().all(|st| st.turbulent));
        assert!(r.cd > 0.0 && r.cdf <= r.cd);
    }

    #[test]
    fn test_short_side_rejected() {
        let split = SideSplit {
            top: vec![0],
            bottom: vec![1, 2, 3],
            xi: vec![0.1, 0.1, 0.2, 0.3],
            x: vec![0.0; 4],
            x_stag: 0.0,
            stagnation_gradient: 1.0,
        };
        let err = FoilSolver::blowing(&split, &[-1.0, 1.0, 1.0, 1.0], &[1e-3; 4]).unwrap_err();
        assert!(matches!(err, AnalysisError::Diverged { .. }));
    }

    #[test]
    fn test_blowing_is_mass_defect_slope() {
        let split = SideSplit {
            top: vec![2, 1, 0],
            bottom: vec![3, 4, 5],
            xi: vec![0.3, 0.2, 0.1, 0.1, 0.2, 0.3],
            x: vec![0.0; 6],
            x_stag: 0.0,
            stagnation_gradient: 1.0,
        };
        // m = ξ on both sides
        let q = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        let dstar = [0.3, 0.2, 0.1, 0.1, 0.2, 0.3];
        let b = FoilSolver::blowing(&split, &q, &dstar).unwrap();
        for v in b.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cancel_inside_newton() {
        let mut s = solver("0012", true);
        let token = CancelToken::new();
        token.cancel();
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, token);
        assert_eq!(s.analyze_alpha(2.0, &mut ctx).unwrap_err(), AnalysisError::Cancelled);
    }

    #[test]
    fn test_fixed_lift_negative_target() {
        let mut s = solver("0012", false);
        s.spec.polar_type = PolarType::FixedLift;
        s.spec.variable = SweepVariable::Cl;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        assert!(matches!(
            s.analyze_cl(-0.2, &mut ctx),
            Err(AnalysisError::NegativeLift { .. })
        ));
    }
}

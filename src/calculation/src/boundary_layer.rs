//! Integral boundary-layer march along one airfoil side.
//!
//! Laminar flow uses Thwaites' method, integrated in closed form over each
//! interval with the edge velocity varying linearly, and the envelope eN
//! method for the amplification factor. Transition is placed inside the
//! interval where N reaches NCrit, the trip is passed or λ drops below the
//! laminar separation value, whichever comes first. Head's entrainment
//! method with Ludwieg-Tillmann skin friction then takes over, integrated
//! with [`RK4Integrator`]. Station quantities vary continuously with the
//! edge speeds, which the viscous Newton coupling relies on.
//!
//! Quantities are normalized: unit free-stream speed, lengths in the units
//! of the airfoil coordinates, ν = chord / Re.

use serde::{Deserialize, Serialize};

use crate::constants::limits;
use crate::error::{AnalysisError, AnalysisResult};
use crate::ode::{OdeSystem, RK4Integrator};

/// Lower shape-factor bound of the turbulent closure.
const H_TURB_MIN: f64 = 1.15;
/// Upper shape-factor bound of the turbulent closure.
const H_TURB_MAX: f64 = 4.0;
/// Largest shape factor a turbulent layer starts from after transition.
/// Head's closure is nearly singular as H1 approaches 3.3.
const H_TURB_START: f64 = 2.2;
/// Half-width of the amplification onset ramp, in decades of Reθ.
const ONSET_RAMP: f64 = 0.08;
/// Smallest edge speed used in the closures.
const UE_MIN: f64 = 1e-6;
/// Upper bound on RK4 substeps per interval.
const MAX_SUBSTEPS: usize = 400;
/// Three-point Gauss-Legendre rule on [-1, 1], exact for quintics.
const GAUSS3: [(f64, f64); 3] = [
    (-0.774_596_669_241_483_4, 5.0 / 9.0),
    (0.0, 8.0 / 9.0),
    (0.774_596_669_241_483_4, 5.0 / 9.0),
];
/// Shape factor where the two branches of Head's fit meet.
const HEAD_BRANCH_H: f64 = 1.584_670_146;
/// H1 at [`HEAD_BRANCH_H`].
const HEAD_BRANCH_H1: f64 = 5.391_421_237;

/// Why the layer became turbulent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// N reached NCrit
    Free,
    /// Trip location reached
    Forced,
    /// Laminar separation
    LaminarSeparation,
    /// Laminar up to the trailing edge
    None,
}

/// Inputs for one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideParams {
    /// Kinematic viscosity in normalized units
    pub nu: f64,
    /// Critical amplification factor
    pub ncrit: f64,
    /// Forced transition x/c
    pub xtr: f64,
    /// Minimum RK4 substeps per interval
    pub substeps: usize,
    /// dUe/dξ at the stagnation point, for the Hiemenz starting value
    pub stagnation_gradient: f64,
}

/// Layer quantities at one surface station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Distance from the stagnation point
    pub xi: f64,
    /// Chordwise position x/c
    pub x: f64,
    /// Edge speed
    pub ue: f64,
    /// Momentum thickness
    pub theta: f64,
    /// Displacement thickness
    pub dstar: f64,
    /// Shape factor δ*/θ
    pub h: f64,
    /// Skin friction coefficient on the edge dynamic pressure
    pub cf: f64,
    /// Amplification factor (NCrit once turbulent)
    pub n: f64,
    /// Station lies downstream of transition
    pub turbulent: bool,
}

/// Integration variables carried from one station to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarchState {
    /// Thwaites θ² and the amplification factor
    Laminar {
        /// Momentum thickness squared
        theta_sq: f64,
        /// Amplification factor
        n: f64,
    },
    /// Head's θ and entrainment flux Ue θ H1
    Turbulent {
        /// Momentum thickness
        theta: f64,
        /// Entrainment flux Ue θ H1
        flux: f64,
    },
}

/// Boundary layer of one side, stagnation point to trailing edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideLayer {
    /// Surface stations from the stagnation point aft
    pub stations: Vec<Station>,
    /// Integration state at each station, kept for resumed marches
    #[serde(skip)]
    pub states: Vec<MarchState>,
    /// Transition x/c (1.0 when laminar to the trailing edge)
    pub transition_x: f64,
    /// Transition mechanism
    pub transition: TransitionKind,
    /// First turbulent station
    pub transition_station: Option<usize>,
    /// Turbulent separation (H above the threshold and rising) somewhere on the side
    pub separated: bool,
}

impl SideLayer {
    /// Layer with no stations yet, laminar to the trailing edge.
    fn empty(capacity: usize) -> Self {
        Self {
            stations: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            transition_x: 1.0,
            transition: TransitionKind::None,
            transition_station: None,
            separated: false,
        }
    }

    /// Trailing-edge station.
    pub fn last(&self) -> Option<&Station> {
        self.stations.last()
    }

    /// Squire-Young drag contribution of this side, per unit chord length.
    pub fn squire_young(&self) -> f64 {
        self.last()
            .map(|s| squire_young(s.theta, s.ue, s.h))
            .unwrap_or(0.0)
    }
}

/// Cd = 2θ Ue^((H+5)/2) at the trailing edge.
#[inline(always)]
pub fn squire_young(theta: f64, ue: f64, h: f64) -> f64 {
    2.0 * theta * ue.max(0.0).powf(0.5 * (h.min(H_TURB_MAX) + 5.0))
}

/// Thwaites shear and shape functions l(λ), H(λ).
#[inline(always)]
pub fn thwaites(lambda: f64) -> (f64, f64) {
    let lam = lambda.clamp(-0.1, 0.1);
    if lam >= 0.0 {
        (0.22 + 1.57 * lam - 1.8 * lam * lam, 2.61 - 3.75 * lam + 5.24 * lam * lam)
    } else {
        (
            0.22 + 1.402 * lam + 0.018 * lam / (lam + 0.107),
            2.088 + 0.0731 / (lam + 0.14),
        )
    }
}

/// Envelope amplification rate dN/dξ for shape factor `h`, Reθ and θ.
///
/// The rate is blended in with a cubic ramp over ±0.08 decades of Reθ
/// around the critical value, so N has no kink at onset.
pub fn amplification_rate(h: f64, re_theta: f64, theta: f64) -> f64 {
    if re_theta <= 0.0 || theta <= 0.0 {
        return 0.0;
    }
    let h = h.max(1.05);
    let hm1 = h - 1.0;
    let log_re0 = (1.415 / hm1 - 0.489) * (20.0 / hm1 - 12.9).tanh() + 3.295 / hm1 + 0.44;
    let r = (re_theta.log10() - (log_re0 - ONSET_RAMP)) / (2.0 * ONSET_RAMP);
    if r <= 0.0 {
        return 0.0;
    }
    let ramp = if r >= 1.0 { 1.0 } else { r * r * (3.0 - 2.0 * r) };
    let a = 2.4 * h - 3.7 + 2.5 * (1.5 * h - 4.65).tanh();
    let dn_dre = 0.01 * (a * a + 0.25).sqrt();
    let l = (6.54 * h - 14.07) / (h * h);
    let m = (0.058 * (h - 4.0) * (h - 4.0) / hm1 - 0.068) / l;
    (dn_dre * 0.5 * (m + 1.0) * l / theta * ramp).max(0.0)
}

/// Low-H branch of Head's fit.
#[inline(always)]
fn head_low(h: f64) -> f64 {
    3.3 + 0.8234 * (h - 1.1).max(1e-3).powf(-1.287)
}

/// High-H branch of Head's fit.
#[inline(always)]
fn head_high(h: f64) -> f64 {
    3.3 + 1.5501 * (h - 0.6778).powf(-3.064)
}

/// Head's mass-flow shape factor H1(H), continuous across the branches.
#[inline(always)]
pub fn head_h1(h: f64) -> f64 {
    if h <= HEAD_BRANCH_H { head_low(h) } else { head_high(h) }
}

/// Inverse of [`head_h1`], clamped to the turbulent range.
#[inline(always)]
pub fn head_h(h1: f64) -> f64 {
    let x = (h1 - 3.3).max(1e-9);
    let h = if h1 >= HEAD_BRANCH_H1 {
        1.1 + (x / 0.8234).powf(-1.0 / 1.287)
    } else {
        0.6778 + (x / 1.5501).powf(-1.0 / 3.064)
    };
    h.clamp(H_TURB_MIN, H_TURB_MAX)
}

/// Head's entrainment function F(H1).
#[inline(always)]
fn entrainment(h1: f64) -> f64 {
    0.0306 * (h1 - 3.0).max(1e-3).powf(-0.6169)
}

/// Ludwieg-Tillmann skin friction.
#[inline(always)]
pub fn ludwieg_tillmann(h: f64, re_theta: f64) -> f64 {
    0.246 * 10f64.powf(-0.678 * h) * re_theta.max(1.0).powf(-0.268)
}

/// dUe/dξ at each station: central inside, backward at the trailing edge,
/// and the slope from the stagnation point at the first station.
pub fn station_gradients(xi: &[f64], ue: &[f64]) -> Vec<f64> {
    let n = xi.len();
    (0..n)
        .map(|i| match i {
            0 if n > 1 => ue[1] / xi[1],
            0 => ue[0] / xi[0],
            _ if i + 1 == n => (ue[i] - ue[i - 1]) / (xi[i] - xi[i - 1]),
            _ => (ue[i + 1] - ue[i - 1]) / (xi[i + 1] - xi[i - 1]),
        })
        .collect()
}

/// Edge velocity varying linearly over one interval, with the station
/// gradients interpolated for λ.
#[derive(Debug, Clone, Copy)]
struct EdgeSegment {
    /// Interval start
    s0: f64,
    /// Interval end
    s1: f64,
    /// Edge speed at `s0`
    ue0: f64,
    /// dUe/dξ across the interval
    slope: f64,
    /// Station gradient at `s0`
    g0: f64,
    /// Station gradient at `s1`
    g1: f64,
    /// Kinematic viscosity
    nu: f64,
}

impl EdgeSegment {
    /// Edge speed at `s`.
    #[inline(always)]
    fn ue(&self, s: f64) -> f64 {
        (self.ue0 + self.slope * (s - self.s0)).max(UE_MIN)
    }

    /// Interpolated station gradient at `s`.
    #[inline(always)]
    fn gradient(&self, s: f64) -> f64 {
        self.g0 + (self.g1 - self.g0) * (s - self.s0) / (self.s1 - self.s0)
    }

    /// Thwaites: θ² Ue⁶ grows by 0.45 ν ∫ Ue⁵ dξ.
    fn theta_sq(&self, theta_sq0: f64, s: f64) -> f64 {
        let half = 0.5 * (s - self.s0);
        let mid = self.s0 + half;
        let integral = GAUSS3
            .iter()
            .map(|(p, w)| w * self.ue(mid + half * p).powi(5))
            .sum::<f64>()
            * half;
        (theta_sq0 * self.ue(self.s0).powi(6) + 0.45 * self.nu * integral) / self.ue(s).powi(6)
    }

    /// Pressure-gradient parameter λ = θ² dUe/dξ / ν.
    fn lambda(&self, theta_sq: f64, s: f64) -> f64 {
        theta_sq * self.gradient(s) / self.nu
    }
}

/// dN/dξ along a laminar interval, θ following Thwaites' solution.
struct AmplificationOde {
    /// Interval
    seg: EdgeSegment,
    /// θ² at the start of the interval
    theta_sq0: f64,
}

impl OdeSystem for AmplificationOde {
    type State = [f64; 1];

    fn rhs(&self, s: f64, _state: &[f64; 1]) -> [f64; 1] {
        let th2 = self.seg.theta_sq(self.theta_sq0, s);
        let (_, h) = thwaites(self.seg.lambda(th2, s));
        let theta = th2.sqrt();
        [amplification_rate(h, self.seg.ue(s) * theta / self.seg.nu, theta)]
    }
}

/// Head's method, state [θ, Ue θ H1].
struct TurbulentOde(EdgeSegment);

impl OdeSystem for TurbulentOde {
    type State = [f64; 2];

    fn rhs(&self, s: f64, state: &[f64; 2]) -> [f64; 2] {
        let seg = &self.0;
        let ue = seg.ue(s);
        let theta = state[0];
        if theta <= 0.0 {
            return [f64::NAN, f64::NAN];
        }
        let h = head_h(state[1] / (ue * theta));
        let cf = ludwieg_tillmann(h, ue * theta / seg.nu);
        [0.5 * cf - (h + 2.0) * theta * seg.slope / ue, ue * entrainment(head_h1(h))]
    }
}

/// RK4 substeps keeping Head's equations inside the stability region.
fn turbulent_substeps(seg: &EdgeSegment, theta: f64, flux: f64, base: usize) -> usize {
    let ue = seg.ue(seg.s0);
    let h1 = flux / (ue * theta);
    let h = head_h(h1);
    let rate = (h + 2.0) * seg.slope.abs() / ue + 0.6169 * entrainment(h1) / ((h1 - 3.0).max(1e-3) * theta);
    let steps = ((seg.s1 - seg.s0) * rate / 1.5).ceil();
    if steps.is_finite() {
        (steps as usize).clamp(base.max(1), MAX_SUBSTEPS)
    } else {
        MAX_SUBSTEPS
    }
}

/// Integrate Head's equations from `s0` to the end of `seg`.
fn turbulent_run(seg: EdgeSegment, s0: f64, theta: f64, flux: f64, substeps: usize) -> Option<MarchState> {
    if seg.s1 <= s0 {
        return Some(MarchState::Turbulent { theta, flux });
    }
    let steps = turbulent_substeps(&seg, theta, flux, substeps);
    let [theta, flux] = RK4Integrator::new(steps).integrate(&TurbulentOde(seg), s0, seg.s1, [theta, flux])?;
    Some(MarchState::Turbulent { theta, flux })
}

/// Station quantities from the integration state.
fn station(state: MarchState, xi: f64, x: f64, ue: f64, gradient: f64, params: &SideParams) -> Station {
    let ue = ue.max(UE_MIN);
    let nu = params.nu;
    match state {
        MarchState::Laminar { theta_sq, n } => {
            let theta = theta_sq.sqrt();
            let (l, h) = thwaites(theta_sq * gradient / nu);
            Station {
                xi,
                x,
                ue,
                theta,
                dstar: h * theta,
                h,
                cf: 2.0 * l * nu / (ue * theta),
                n,
                turbulent: false,
            }
        }
        MarchState::Turbulent { theta, flux } => {
            let h = head_h(flux / (ue * theta));
            Station {
                xi,
                x,
                ue,
                theta,
                dstar: h * theta,
                h,
                cf: ludwieg_tillmann(h, ue * theta / nu),
                n: params.ncrit,
                turbulent: true,
            }
        }
    }
}

/// March one side. `xi` are distances from the stagnation point (strictly
/// increasing), `x` chordwise positions x/c, `ue` edge speeds.
pub fn march_side(xi: &[f64], x: &[f64], ue: &[f64], params: &SideParams) -> AnalysisResult<SideLayer> {
    let mut layer = SideLayer::empty(xi.len());
    if xi.is_empty() {
        return Ok(layer);
    }
    // Hiemenz stagnation flow
    let theta_sq = 0.075 * params.nu / params.stagnation_gradient.max(UE_MIN);
    let first = if x[0] >= params.xtr {
        let (_, h) = thwaites(theta_sq * station_gradients(xi, ue)[0] / params.nu);
        let theta = theta_sq.sqrt();
        layer.transition = TransitionKind::Forced;
        layer.transition_x = x[0];
        layer.transition_station = Some(0);
        MarchState::Turbulent {
            theta,
            flux: ue[0].max(UE_MIN) * theta * head_h1(h.min(H_TURB_START)),
        }
    } else {
        MarchState::Laminar { theta_sq, n: 0.0 }
    };
    layer.states.push(first);
    march_from(xi, x, ue, params, layer)
}

/// March again downstream of station `from`, keeping `prior` up to and
/// including it. Valid when the edge speeds changed only beyond `from + 1`.
pub fn resume_side(
    xi: &[f64],
    x: &[f64],
    ue: &[f64],
    params: &SideParams,
    prior: &SideLayer,
    from: usize,
) -> AnalysisResult<SideLayer> {
    if from >= prior.states.len() || prior.states.len() != xi.len() {
        return march_side(xi, x, ue, params);
    }
    let mut layer = SideLayer::empty(xi.len());
    layer.states.extend_from_slice(&prior.states[..=from]);
    if prior.transition_station.is_some_and(|t| t <= from) {
        layer.transition = prior.transition;
        layer.transition_x = prior.transition_x;
        layer.transition_station = prior.transition_station;
    }
    march_from(xi, x, ue, params, layer)
}

/// Continue the march from the last state in `layer` to the trailing edge.
fn march_from(
    xi: &[f64],
    x: &[f64],
    ue: &[f64],
    params: &SideParams,
    mut layer: SideLayer,
) -> AnalysisResult<SideLayer> {
    let nu = params.nu;
    let grads = station_gradients(xi, ue);
    let diverged = |i: usize, what: &str| AnalysisError::Diverged {
        iteration: i,
        reason: format!("boundary layer {} at station {}", what, i),
    };

    for i in layer.states.len()..xi.len() {
        if !(xi[i] > xi[i - 1]) {
            return Err(diverged(i, "stations out of order"));
        }
        let (ue_a, ue_b) = (ue[i - 1].max(UE_MIN), ue[i].max(UE_MIN));
        let seg = EdgeSegment {
            s0: xi[i - 1],
            s1: xi[i],
            ue0: ue_a,
            slope: (ue_b - ue_a) / (xi[i] - xi[i - 1]),
            g0: grads[i - 1],
            g1: grads[i],
            nu,
        };
        let next = match layer.states[i - 1] {
            MarchState::Turbulent { theta, flux } => {
                turbulent_run(seg, seg.s0, theta, flux, params.substeps).ok_or_else(|| diverged(i, "turbulent march"))?
            }
            MarchState::Laminar { theta_sq, n: amp } => {
                let theta_sq_b = seg.theta_sq(theta_sq, seg.s1);
                let [amp_b] = RK4Integrator::new(params.substeps)
                    .integrate(&AmplificationOde { seg, theta_sq0: theta_sq }, seg.s0, seg.s1, [amp])
                    .ok_or_else(|| diverged(i, "amplification"))?;

                // earliest trigger inside the interval, as a fraction of it
                let mut trigger: Option<(f64, TransitionKind)> = None;
                let mut consider = |f: f64, kind: TransitionKind| {
                    let f = f.clamp(0.0, 1.0);
                    if trigger.is_none_or(|(g, _)| f < g) {
                        trigger = Some((f, kind));
                    }
                };
                if amp_b >= params.ncrit {
                    let f = if amp_b > amp { (params.ncrit - amp) / (amp_b - amp) } else { 1.0 };
                    consider(f, TransitionKind::Free);
                }
                if x[i] >= params.xtr {
                    let f = if x[i - 1] < params.xtr {
                        (params.xtr - x[i - 1]) / (x[i] - x[i - 1])
                    } else {
                        0.0
                    };
                    consider(f, TransitionKind::Forced);
                }
                let sep = limits::LAMINAR_SEPARATION_LAMBDA;
                let lam_a = seg.lambda(theta_sq, seg.s0);
                let lam_b = seg.lambda(theta_sq_b, seg.s1);
                if lam_b < sep {
                    let f = if lam_a > lam_b { (lam_a - sep) / (lam_a - lam_b) } else { 0.0 };
                    consider(f, TransitionKind::LaminarSeparation);
                }

                match trigger {
                    None => MarchState::Laminar {
                        theta_sq: theta_sq_b,
                        n: amp_b,
                    },
                    Some((f, kind)) => {
                        let st = seg.s0 + f * (seg.s1 - seg.s0);
                        let theta_sq_t = seg.theta_sq(theta_sq, st);
                        let (_, h) = thwaites(seg.lambda(theta_sq_t, st));
                        let theta = theta_sq_t.sqrt();
                        let flux = seg.ue(st) * theta * head_h1(h.min(H_TURB_START));
                        layer.transition = kind;
                        layer.transition_x = x[i - 1] + f * (x[i] - x[i - 1]);
                        layer.transition_station = Some(i);
                        turbulent_run(seg, st, theta, flux, params.substeps)
                            .ok_or_else(|| diverged(i, "turbulent march"))?
                    }
                }
            }
        };
        if let MarchState::Turbulent { theta, .. } = next {
            if !(theta > 0.0) {
                return Err(diverged(i, "momentum thickness collapse"));
            }
        }
        layer.states.push(next);
    }

    layer.stations = layer
        .states
        .iter()
        .enumerate()
        .map(|(i, s)| station(*s, xi[i], x[i], ue[i], grads[i], params))
        .collect();
    layer.separated = layer.stations.windows(2).any(|w| {
        w[0].turbulent && w[1].turbulent && w[1].h > limits::TURBULENT_SEPARATION_H && w[1].h > w[0].h
    });
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(re: f64, ncrit: f64, xtr: f64, gradient: f64) -> SideParams {
        SideParams {
            nu: 1.0 / re,
            ncrit,
            xtr,
            substeps: 4,
            stagnation_gradient: gradient,
        }
    }

    fn flat_plate(n: usize, re: f64, ncrit: f64, xtr: f64) -> SideLayer {
        let xi: Vec<f64> = (1..=n).map(|i| i as f64 / n as f64).collect();
        let ue = vec![1.0; n];
        march_side(&xi, &xi, &ue, &params(re, ncrit, xtr, 1.0 / xi[0])).unwrap()
    }

    #[test]
    fn test_blasius_momentum_thickness() {
        // laminar flat plate: θ = 0.664 x / sqrt(Re_x); Thwaites gives 0.671
        let layer = flat_plate(100, 1e5, 20.0, 1.0 + 1e-9);
        let te = layer.last().unwrap();
        assert!(!te.turbulent);
        assert_relative_eq!(te.theta, 0.671 / 1e5_f64.sqrt(), max_relative = 0.02);
        assert_relative_eq!(te.h, 2.61, epsilon = 1e-9);
        assert_eq!(layer.transition, TransitionKind::None);
        assert_eq!(layer.transition_station, None);
    }

    #[test]
    fn test_forced_transition() {
        let layer = flat_plate(100, 1e6, 20.0, 0.3);
        assert_eq!(layer.transition, TransitionKind::Forced);
        assert_relative_eq!(layer.transition_x, 0.3, epsilon = 1e-9);
        assert_eq!(layer.transition_station, Some(29));
        let te = layer.last().unwrap();
        assert!(te.turbulent);
        assert!(te.h > 1.2 && te.h < 1.6, "H = {}", te.h);
        // turbulent layer is thicker than the laminar one
        assert!(te.theta > 0.671 / 1e6_f64.sqrt());
    }

    #[test]
    fn test_momentum_thickness_continuous_through_transition() {
        let layer = flat_plate(100, 1e6, 20.0, 0.305);
        let (a, b) = (&layer.stations[29], &layer.stations[30]);
        assert!(!a.turbulent && b.turbulent);
        assert!(b.theta > a.theta && b.theta < 1.1 * a.theta);
    }

    #[test]
    fn test_trip_moves_smoothly_between_stations() {
        // trailing-edge θ follows the trip across a station without a jump
        let te = |xtr: f64| flat_plate(50, 1e6, 20.0, xtr).last().unwrap().theta;
        let (a, b, c) = (te(0.4195), te(0.42), te(0.4205));
        assert!(a > b && b > c);
        assert!((a - b).abs() < 2e-3 * b);
        assert!((b - c).abs() < 2e-3 * b);
    }

    #[test]
    fn test_free_transition_on_plate() {
        // zero-gradient plate at Re 5e6 transitions before the end with NCrit 9
        let layer = flat_plate(200, 5e6, 9.0, 1.0 + 1e-9);
        assert_eq!(layer.transition, TransitionKind::Free);
        assert!(layer.transition_x > 0.05 && layer.transition_x < 1.0);
    }

    #[test]
    fn test_adverse_gradient_laminar_separation() {
        let n = 100;
        let xi: Vec<f64> = (1..=n).map(|i| i as f64 / n as f64).collect();
        let ue: Vec<f64> = xi.iter().map(|x| 1.0 - 0.5 * x).collect();
        let p = SideParams {
            nu: 1e-5,
            ncrit: 30.0,
            xtr: 2.0,
            substeps: 4,
            stagnation_gradient: ue[0] / xi[0],
        };
        let layer = march_side(&xi, &xi, &ue, &p).unwrap();
        assert_eq!(layer.transition, TransitionKind::LaminarSeparation);
        assert!(layer.transition_x > 0.1 && layer.transition_x < 0.5);
    }

    #[test]
    fn test_resume_matches_full_march() {
        let n = 60;
        let xi: Vec<f64> = (1..=n).map(|i| i as f64 / n as f64).collect();
        let mut ue: Vec<f64> = xi.iter().map(|x| 1.1 - 0.2 * x).collect();
        let p = params(2e6, 9.0, 1.0 + 1e-9, ue[0] / xi[0]);
        let before = march_side(&xi, &xi, &ue, &p).unwrap();
        assert_eq!(before.transition, TransitionKind::Free);

        // downstream of transition
        ue[45] += 1e-3;
        let full = march_side(&xi, &xi, &ue, &p).unwrap();
        let resumed = resume_side(&xi, &xi, &ue, &p, &before, 43).unwrap();
        assert_eq!(full.transition_station, resumed.transition_station);
        assert_eq!(full.transition_x, resumed.transition_x);
        assert_eq!(full.stations, resumed.stations);

        // upstream of it, transition is found again
        ue[10] += 1e-3;
        let full = march_side(&xi, &xi, &ue, &p).unwrap();
        let resumed = resume_side(&xi, &xi, &ue, &p, &before, 8).unwrap();
        assert_eq!(full.stations, resumed.stations);
        assert_eq!(full.transition_x, resumed.transition_x);
    }

    #[test]
    fn test_head_inverse() {
        for h in [1.3, 1.5, 1.8, 2.2, 3.0, 3.5] {
            assert_relative_eq!(head_h(head_h1(h)), h, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_head_branches_meet() {
        assert_relative_eq!(head_low(HEAD_BRANCH_H), head_high(HEAD_BRANCH_H), epsilon = 1e-6);
        assert_relative_eq!(head_h1(HEAD_BRANCH_H), HEAD_BRANCH_H1, epsilon = 1e-6);
    }

    #[test]
    fn test_squire_young_limit() {
        assert_relative_eq!(squire_young(0.001, 1.0, 1.4), 0.002);
        assert_eq!(squire_young(0.001, 0.0, 1.4), 0.0);
    }

    #[test]
    fn test_amplification_zero_below_critical_re() {
        assert_eq!(amplification_rate(2.6, 10.0, 1e-4), 0.0);
        assert!(amplification_rate(2.6, 2000.0, 1e-3) > 0.0);
    }

    #[test]
    fn test_amplification_onset_is_continuous() {
        // critical Reθ for H = 2.6 lies inside this range
        let rates: Vec<f64> = (0..200).map(|k| amplification_rate(2.6, 150.0 + k as f64, 1e-3)).collect();
        let largest = rates.iter().fold(0.0_f64, |m, v| m.max(*v));
        assert!(largest > 0.0);
        assert_eq!(rates[0], 0.0);
        assert!(rates.windows(2).all(|w| (w[1] - w[0]).abs() < 0.05 * largest));
    }
}

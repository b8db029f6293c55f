//! Inviscid 2D panel method.
//!
//! Constant-strength source panels plus one uniform vortex sheet, closed by
//! the Kutta condition (equal and opposite tangential speeds on the two
//! trailing-edge panels). Panel j runs from node j to node j+1; the outward
//! normal of a counterclockwise contour is `n = (t_y, -t_x)`.
//!
//! The influence matrix depends only on the geometry, so it is factored
//! once and reused for every angle of attack and for every blowing
//! distribution produced by the boundary layer.

use std::f64::consts::PI;

use ndarray::{Array1, Array2};

use crate::error::{AnalysisError, AnalysisResult};
use crate::foil::Airfoil;
use crate::linalg::{Factorization, LinearSolver};
use crate::vector::Vec2;

/// Derived panel quantities.
#[derive(Debug, Clone)]
pub struct PanelGeometry {
    /// Contour nodes
    pub nodes: Vec<Vec2>,
    /// Control points (panel midpoints)
    pub mid: Vec<Vec2>,
    /// Unit tangent per panel, node k to k+1
    pub tangent: Vec<Vec2>,
    /// Unit outward normal per panel
    pub normal: Vec<Vec2>,
    /// Panel length
    pub length: Vec<f64>,
    /// Arc length from node 0 to each control point
    pub s_mid: Vec<f64>,
    /// Leading edge to trailing edge distance
    pub chord: f64,
    /// Most forward node
    pub leading_edge: Vec2,
}

impl PanelGeometry {
    /// Panel geometry of an airfoil contour.
    pub fn new(foil: &Airfoil) -> AnalysisResult<Self> {
        let n = foil.panel_count();
        let mut mid = Vec::with_capacity(n);
        let mut tangent = Vec::with_capacity(n);
        let mut normal = Vec::with_capacity(n);
        let mut length = Vec::with_capacity(n);
        let mut s_mid = Vec::with_capacity(n);
        let mut s = 0.0;
        for (j, w) in foil.nodes.windows(2).enumerate() {
            let d = w[1] - w[0];
            let l = d.magnitude();
            let t = d
                .normalized()
                .ok_or_else(|| AnalysisError::geometry(format!("panel {} has zero length", j)))?;
            mid.push(w[0].lerp(&w[1], 0.5));
            tangent.push(t);
            normal.push(Vec2::new(t.y, -t.x));
            length.push(l);
            s_mid.push(s + 0.5 * l);
            s += l;
        }
        Ok(Self {
            nodes: foil.nodes.clone(),
            mid,
            tangent,
            normal,
            length,
            s_mid,
            chord: foil.chord(),
            leading_edge: foil.leading_edge(),
        })
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.length.len()
    }

    /// True when there are no panels.
    pub fn is_empty(&self) -> bool {
        self.length.is_empty()
    }

    /// Contour length.
    pub fn perimeter(&self) -> f64 {
        self.length.iter().sum()
    }
}

/// Velocity induced at `p` by panel `j` with unit source and unit vortex
/// strength, as (source, vortex) in global axes.
#[inline(always)]
fn panel_influence(geom: &PanelGeometry, j: usize, p: Vec2, self_panel: bool) -> (Vec2, Vec2) {
    let t = geom.tangent[j];
    let e_y = t.perp();
    let l = geom.length[j];
    let (u_s, v_s) = if self_panel {
        // outer-side limit at the midpoint
        (0.0, -0.5)
    } else {
        let d = p - geom.nodes[j];
        let x = d.dot(&t);
        let y = d.dot(&e_y);
        let r1 = (x * x + y * y).sqrt();
        let r2 = ((x - l) * (x - l) + y * y).sqrt();
        let theta1 = y.atan2(x);
        let theta2 = y.atan2(x - l);
        ((r1 / r2).ln() / (2.0 * PI), (theta2 - theta1) / (2.0 * PI))
    };
    // A unit vortex sheet induces (-v_s, u_s) where the source gives (u_s, v_s).
    let source = t * u_s + e_y * v_s;
    let vortex = t * (-v_s) + e_y * u_s;
    (source, vortex)
}

/// Factored influence system of one airfoil.
pub struct InviscidSystem {
    /// Panel geometry
    pub geom: PanelGeometry,
    /// Factored influence matrix, N flow-tangency rows plus the Kutta condition
    factors: Box<dyn Factorization>,
    /// Tangential speed per unit strength: N rows, N sources + 1 vortex
    tangential: Array2<f64>,
    /// Singularity strengths for unit free streams along x and y
    base_x: Array1<f64>,
    /// Same for y
    base_y: Array1<f64>,
}

/// Strengths and surface speeds for one free-stream direction.
#[derive(Debug, Clone)]
pub struct InviscidSolution {
    /// Source strength per panel
    pub sigma: Vec<f64>,
    /// Uniform vortex strength (counterclockwise positive)
    pub gamma: f64,
    /// Signed tangential speed at each control point
    pub vt: Vec<f64>,
}

impl InviscidSystem {
    /// Assemble and factor the influence matrix.
    pub fn new(foil: &Airfoil, solver: &dyn LinearSolver) -> AnalysisResult<Self> {
        let geom = PanelGeometry::new(foil)?;
        let n = geom.len();
        let mut a = Array2::<f64>::zeros((n + 1, n + 1));
        let mut tangential = Array2::<f64>::zeros((n, n + 1));

        for i in 0..n {
            let p = geom.mid[i];
            let (ni, ti) = (geom.normal[i], geom.tangent[i]);
            for j in 0..n {
                let (src, vor) = panel_influence(&geom, j, p, i == j);
                a[[i, j]] = src.dot(&ni);
                a[[i, n]] += vor.dot(&ni);
                tangential[[i, j]] = src.dot(&ti);
                tangential[[i, n]] += vor.dot(&ti);
            }
        }
        // Kutta row: Vt(first) + Vt(last) = 0
        for j in 0..=n {
            a[[n, j]] = tangential[[0, j]] + tangential[[n - 1, j]];
        }

        let factors = solver.factorize(a)?;

        let rhs_for = |v: Vec2| -> Array1<f64> {
            let mut rhs = Array1::zeros(n + 1);
            for i in 0..n {
                rhs[i] = -v.dot(&geom.normal[i]);
            }
            rhs[n] = -(v.dot(&geom.tangent[0]) + v.dot(&geom.tangent[n - 1]));
            rhs
        };
        let base_x = factors.solve(rhs_for(Vec2::new(1.0, 0.0)).view())?;
        let base_y = factors.solve(rhs_for(Vec2::new(0.0, 1.0)).view())?;

        Ok(Self {
            geom,
            factors,
            tangential,
            base_x,
            base_y,
        })
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.geom.len()
    }

    /// True when there are no panels.
    pub fn is_empty(&self) -> bool {
        self.geom.is_empty()
    }

    /// Solution at angle of attack `alpha` (radians), unit free stream.
    pub fn solve(&self, alpha: f64) -> InviscidSolution {
        let (sa, ca) = alpha.sin_cos();
        let x = &self.base_x * ca + &self.base_y * sa;
        self.solution_from(&x, Vec2::new(ca, sa))
    }

    /// Solution with an outward transpiration velocity at every control point.
    pub fn solve_with_blowing(&self, alpha: f64, blowing: &[f64]) -> AnalysisResult<InviscidSolution> {
        let n = self.len();
        let (sa, ca) = alpha.sin_cos();
        let mut rhs = Array1::zeros(n + 1);
        for (r, b) in rhs.iter_mut().zip(blowing.iter()) {
            *r = *b;
        }
        let dx = self.factors.solve(rhs.view())?;
        let x = &self.base_x * ca + &self.base_y * sa + dx;
        Ok(self.solution_from(&x, Vec2::new(ca, sa)))
    }

    /// Strengths and tangential speeds from the solution vector `x`.
    fn solution_from(&self, x: &Array1<f64>, vinf: Vec2) -> InviscidSolution {
        let n = self.len();
        let vt = self.tangential.dot(x);
        InviscidSolution {
            sigma: x.iter().take(n).copied().collect(),
            gamma: x[n],
            vt: vt
                .iter()
                .zip(self.geom.tangent.iter())
                .map(|(v, t)| v + vinf.dot(t))
                .collect(),
        }
    }

    /// Sensitivity of the tangential speeds to blowing: D[i][k] = dVt_i / db_k.
    pub fn blowing_response(&self) -> AnalysisResult<Array2<f64>> {
        let n = self.len();
        let mut e = Array2::<f64>::zeros((n + 1, n));
        for k in 0..n {
            e[[k, k]] = 1.0;
        }
        let x = self.factors.solve_many(&e)?;
        Ok(self.tangential.dot(&x))
    }
}

/// Force and moment coefficients from a pressure distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PressureForces {
    /// Lift coefficient
    pub cl: f64,
    /// Pressure drag coefficient
    pub cd: f64,
    /// About the quarter chord, positive nose up
    pub cm: f64,
}

/// Integrate `cp` (one value per panel) over the contour.
pub fn integrate_pressure(geom: &PanelGeometry, cp: &[f64], alpha: f64) -> PressureForces {
    let c = geom.chord.max(1e-12);
    let r_ref = Vec2::new(geom.leading_edge.x + 0.25 * c, geom.leading_edge.y);
    let mut f = Vec2::zero();
    let mut mz = 0.0;
    for j in 0..geom.len() {
        let df = geom.normal[j] * (-cp[j] * geom.length[j]);
        f += df;
        mz += (geom.mid[j] - r_ref).cross(&df);
    }
    let (sa, ca) = alpha.sin_cos();
    let lift_dir = Vec2::new(-sa, ca);
    let drag_dir = Vec2::new(ca, sa);
    PressureForces {
        cl: f.dot(&lift_dir) / c,
        cd: f.dot(&drag_dir) / c,
        cm: -mz / (c * c),
    }
}

/// Lift coefficient from the circulation, Cl = -2Γ/(V c).
pub fn circulation_cl(geom: &PanelGeometry, gamma: f64) -> f64 {
    -2.0 * gamma * geom.perimeter() / geom.chord.max(1e-12)
}

/// Incompressible pressure coefficient from unit-free-stream speeds.
pub fn cp_from_speed(vt: &[f64]) -> Vec<f64> {
    vt.iter().map(|v| 1.0 - v * v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::DenseLu;
    use approx::assert_relative_eq;

    fn system(code: &str, per_side: usize) -> InviscidSystem {
        let foil = Airfoil::naca4(code, per_side).unwrap();
        InviscidSystem::new(&foil, &DenseLu::default()).unwrap()
    }

    #[test]
    fn test_symmetric_zero_alpha() {
        let sys = system("0012", 80);
        let sol = sys.solve(0.0);
        assert_relative_eq!(circulation_cl(&sys.geom, sol.gamma), 0.0, epsilon = 1e-8);
        let f = integrate_pressure(&sys.geom, &cp_from_speed(&sol.vt), 0.0);
        assert_relative_eq!(f.cl, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_naca0012_lift_slope() {
        let sys = system("0012", 80);
        let alpha = 5.0_f64.to_radians();
        let sol = sys.solve(alpha);
        let cl = circulation_cl(&sys.geom, sol.gamma);
        // thin-airfoil 2πα = 0.548, thickness adds ~10%
        assert!(cl > 0.55 && cl < 0.7, "cl = {}", cl);
        let f = integrate_pressure(&sys.geom, &cp_from_speed(&sol.vt), alpha);
        assert!((f.cl - cl).abs() < 0.02, "pressure {} vs circulation {}", f.cl, cl);
        assert!(f.cd.abs() < 0.01);
    }

    #[test]
    fn test_kutta_condition_holds() {
        let sys = system("2412", 60);
        let sol = sys.solve(0.1);
        let n = sol.vt.len();
        assert_relative_eq!(sol.vt[0] + sol.vt[n - 1], 0.0, epsilon = 1e-9);
        // upper surface flows against the node order
        assert!(sol.vt[n / 4] < 0.0);
        assert!(sol.vt[3 * n / 4] > 0.0);
    }

    #[test]
    fn test_camber_gives_lift_at_zero_alpha() {
        let sys = system("2412", 60);
        let sol = sys.solve(0.0);
        let cl = circulation_cl(&sys.geom, sol.gamma);
        assert!(cl > 0.2 && cl < 0.3, "cl = {}", cl);
        let f = integrate_pressure(&sys.geom, &cp_from_speed(&sol.vt), 0.0);
        assert!(f.cm < 0.0);
    }

    #[test]
    fn test_blowing_response_matches_direct_solve() {
        let sys = system("0012", 40);
        let n = sys.len();
        let d = sys.blowing_response().unwrap();
        let mut b = vec![0.0; n];
        b[n / 3] = 1e-3;
        let base = sys.solve(0.05);
        let blown = sys.solve_with_blowing(0.05, &b).unwrap();
        for i in 0..n {
            assert_relative_eq!(blown.vt[i] - base.vt[i], d[[i, n / 3]] * 1e-3, epsilon = 1e-10);
        }
    }
}

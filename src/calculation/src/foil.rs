//! Airfoil geometry: node list, generators, repaneling and flaps.
//!
//! Nodes run counterclockwise: trailing edge, upper surface, leading edge,
//! lower surface, back to the trailing edge. The first and last nodes may
//! coincide (closed trailing edge).

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::vector::Vec2;

/// Smallest panel length accepted (chord fraction).
const MIN_PANEL_LENGTH: f64 = 1e-9;

/// Flap hinge and deflection, positive trailing edge down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flap {
    /// Hinge x position (chord fraction)
    pub hinge_x: f64,
    /// Hinge y position, fraction of local thickness from the lower surface
    pub hinge_y: f64,
    /// Deflection (degrees)
    pub angle: f64,
}

impl Default for Flap {
    fn default() -> Self {
        Self {
            hinge_x: 0.8,
            hinge_y: 0.5,
            angle: 0.0,
        }
    }
}

/// An airfoil shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airfoil {
    /// Display name
    pub name: String,
    /// Contour nodes, counterclockwise from the trailing edge over the upper surface
    pub nodes: Vec<Vec2>,
}

impl Airfoil {
    /// Wrap a node list; at least three distinct nodes are required.
    pub fn from_points(name: impl Into<String>, nodes: Vec<Vec2>) -> AnalysisResult<Self> {
        let foil = Self {
            name: name.into(),
            nodes,
        };
        if foil.nodes.len() < 5 {
            return Err(AnalysisError::geometry(format!(
                "foil {} has {} nodes, at least 5 are needed",
                foil.name,
                foil.nodes.len()
            )));
        }
        if foil.nodes.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(AnalysisError::geometry(format!("foil {} has non-finite coordinates", foil.name)));
        }
        Ok(foil)
    }

    /// NACA 4-digit section with `per_side` panels on each surface,
    /// cosine-clustered at both edges, closed trailing edge.
    pub fn naca4(code: &str, per_side: usize) -> AnalysisResult<Self> {
        let digits: Vec<u32> = code.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 4 || code.len() != 4 {
            return Err(AnalysisError::geometry(format!("invalid NACA 4-digit code {}", code)));
        }
        let m = digits[0] as f64 / 100.0;
        let p = digits[1] as f64 / 10.0;
        let t = (digits[2] * 10 + digits[3]) as f64 / 100.0;
        if t <= 0.0 {
            return Err(AnalysisError::geometry(format!("NACA {} has zero thickness", code)));
        }
        let n = per_side.max(4);

        let surface = |x: f64| -> (Vec2, Vec2) {
            let yt = 5.0
                * t
                * (0.2969 * x.sqrt() - 0.1260 * x - 0.3516 * x * x + 0.2843 * x.powi(3) - 0.1036 * x.powi(4));
            let (yc, dyc) = if m == 0.0 || p == 0.0 {
                (0.0, 0.0)
            } else if x < p {
                (m / (p * p) * (2.0 * p * x - x * x), 2.0 * m / (p * p) * (p - x))
            } else {
                (
                    m / ((1.0 - p) * (1.0 - p)) * (1.0 - 2.0 * p + 2.0 * p * x - x * x),
                    2.0 * m / ((1.0 - p) * (1.0 - p)) * (p - x),
                )
            };
            let th = dyc.atan();
            (
                Vec2::new(x - yt * th.sin(), yc + yt * th.cos()),
                Vec2::new(x + yt * th.sin(), yc - yt * th.cos()),
            )
        };

        let mut nodes = Vec::with_capacity(2 * n + 1);
        // upper: TE -> LE
        for i in 0..=n {
            let beta = std::f64::consts::PI * (n - i) as f64 / n as f64;
            let x = 0.5 * (1.0 - beta.cos());
            nodes.push(surface(x).0);
        }
        // lower: LE (excluded) -> TE
        for i in 1..=n {
            let beta = std::f64::consts::PI * i as f64 / n as f64;
            let x = 0.5 * (1.0 - beta.cos());
            nodes.push(surface(x).1);
        }
        Self::from_points(format!("NACA {}", code), nodes)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when there are no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of panels.
    pub fn panel_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Index of the most forward node.
    pub fn leading_edge_index(&self) -> usize {
        self.nodes
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(bi, bx), (i, p)| if p.x < bx { (i, p.x) } else { (bi, bx) })
            .0
    }

    /// Most forward node.
    pub fn leading_edge(&self) -> Vec2 {
        self.nodes[self.leading_edge_index()]
    }

    /// Midpoint of the first and last node.
    pub fn trailing_edge(&self) -> Vec2 {
        self.nodes[0].lerp(&self.nodes[self.nodes.len() - 1], 0.5)
    }

    /// Leading edge to trailing-edge midpoint distance.
    pub fn chord(&self) -> f64 {
        self.leading_edge().distance(&self.trailing_edge())
    }

    /// Trailing-edge gap.
    pub fn te_gap(&self) -> f64 {
        self.nodes[0].distance(&self.nodes[self.nodes.len() - 1])
    }

    /// Panel and angle checks applied before a 2D analysis.
    pub fn validate(&self, max_per_side: usize, max_angle_deg: f64) -> AnalysisResult<()> {
        let le = self.leading_edge_index();
        let upper = le;
        let lower = self.nodes.len() - 1 - le;
        if upper > max_per_side || lower > max_per_side {
            return Err(AnalysisError::geometry(format!(
                "foil {}: {} upper / {} lower panels exceed the {} per side ceiling",
                self.name, upper, lower, max_per_side
            )));
        }
        if upper < 2 || lower < 2 {
            return Err(AnalysisError::geometry(format!(
                "foil {}: leading edge at node {} leaves a side without panels",
                self.name, le
            )));
        }
        for (i, w) in self.nodes.windows(2).enumerate() {
            if w[0].distance(&w[1]) < MIN_PANEL_LENGTH * self.chord().max(1e-12) {
                return Err(AnalysisError::geometry(format!(
                    "foil {}: panel {} has zero length",
                    self.name, i
                )));
            }
        }
        let max_angle = max_angle_deg.to_radians();
        for (i, w) in self.nodes.windows(3).enumerate() {
            let a = w[1] - w[0];
            let b = w[2] - w[1];
            let turn = a.cross(&b).atan2(a.dot(&b)).abs();
            if turn > max_angle {
                return Err(AnalysisError::geometry(format!(
                    "foil {}: panel angle {:.1} deg at node {} exceeds {:.1} deg",
                    self.name,
                    turn.to_degrees(),
                    i + 1,
                    max_angle_deg
                )));
            }
        }
        Ok(())
    }

    /// Cumulative arc length at each node.
    pub fn arc_lengths(&self) -> Vec<f64> {
        let mut s = Vec::with_capacity(self.nodes.len());
        s.push(0.0);
        for w in self.nodes.windows(2) {
            let last = s[s.len() - 1];
            s.push(last + w[0].distance(&w[1]));
        }
        s
    }

    /// Point at arc length `target` along the contour, `arcs` being the cumulative node arc lengths.
    fn point_at_arc(&self, arcs: &[f64], target: f64) -> Vec2 {
        let k = match arcs.binary_search_by(|v| v.total_cmp(&target)) {
            Ok(k) => return self.nodes[k],
            Err(k) => k.clamp(1, arcs.len() - 1),
        };
        let ds = arcs[k] - arcs[k - 1];
        let t = if ds > 0.0 { (target - arcs[k - 1]) / ds } else { 0.0 };
        self.nodes[k - 1].lerp(&self.nodes[k], t)
    }

    /// Redistribute nodes along the arc length, `per_side` panels on each
    /// surface, clustered at both edges.
    pub fn repanel(&self, per_side: usize) -> AnalysisResult<Self> {
        let n = per_side.max(4);
        let arcs = self.arc_lengths();
        let le = self.leading_edge_index();
        let s_le = arcs[le];
        let s_end = arcs[arcs.len() - 1];

        let mut nodes = Vec::with_capacity(2 * n + 1);
        for i in 0..=n {
            let f = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / n as f64).cos());
            nodes.push(self.point_at_arc(&arcs, f * s_le));
        }
        for i in 1..=n {
            let f = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / n as f64).cos());
            nodes.push(self.point_at_arc(&arcs, s_le + f * (s_end - s_le)));
        }
        Self::from_points(self.name.clone(), nodes)
    }

    /// y of the upper or lower surface at chord fraction `xc`.
    fn surface_y(&self, xc: f64, upper: bool) -> f64 {
        let le = self.leading_edge_index();
        let x0 = self.nodes[le].x;
        let c = (self.trailing_edge().x - x0).max(1e-12);
        let x = x0 + xc.clamp(0.0, 1.0) * c;
        let side: Vec<Vec2> = if upper {
            self.nodes[..=le].iter().rev().copied().collect()
        } else {
            self.nodes[le..].to_vec()
        };
        for w in side.windows(2) {
            let (a, b) = (w[0], w[1]);
            let (lo, hi) = if a.x <= b.x { (a, b) } else { (b, a) };
            if x >= lo.x && x <= hi.x {
                let t = if hi.x > lo.x { (x - lo.x) / (hi.x - lo.x) } else { 0.0 };
                return lo.y + t * (hi.y - lo.y);
            }
        }
        side[side.len() - 1].y
    }

    /// Upper surface ordinate at chord fraction `xc`.
    pub fn upper_y(&self, xc: f64) -> f64 {
        self.surface_y(xc, true)
    }

    /// Lower surface ordinate at chord fraction `xc`.
    pub fn lower_y(&self, xc: f64) -> f64 {
        self.surface_y(xc, false)
    }

    /// Mean camber line at chord fraction `xc`.
    pub fn camber(&self, xc: f64) -> f64 {
        0.5 * (self.upper_y(xc) + self.lower_y(xc))
    }

    /// Local thickness at chord fraction `xc`.
    pub fn thickness(&self, xc: f64) -> f64 {
        self.upper_y(xc) - self.lower_y(xc)
    }

    /// Maximum thickness and its chord position, sampled at 100 stations.
    pub fn max_thickness(&self) -> (f64, f64) {
        (0..=100)
            .map(|i| {
                let x = i as f64 / 100.0;
                (self.thickness(x), x)
            })
            .fold((0.0, 0.0), |best, cur| if cur.0 > best.0 { cur } else { best })
    }

    /// Copy with a trailing-edge flap deflected about its hinge.
    pub fn with_te_flap(&self, flap: &Flap) -> Self {
        self.deflect(flap, true)
    }

    /// Copy with a leading-edge flap deflected about its hinge, positive nose down.
    pub fn with_le_flap(&self, flap: &Flap) -> Self {
        self.deflect(flap, false)
    }

    /// Rotate the nodes behind (or ahead of) the hinge by the flap angle.
    fn deflect(&self, flap: &Flap, trailing: bool) -> Self {
        if flap.angle == 0.0 {
            return self.clone();
        }
        let le = self.leading_edge();
        let c = (self.trailing_edge().x - le.x).max(1e-12);
        let xh = le.x + flap.hinge_x * c;
        let yl = self.lower_y(flap.hinge_x);
        let yu = self.upper_y(flap.hinge_x);
        let hinge = Vec2::new(xh, yl + flap.hinge_y * (yu - yl));
        // trailing edge down and nose down are both clockwise rotations
        // for the aft part and counterclockwise for the forward part
        let theta = if trailing { -flap.angle.to_radians() } else { flap.angle.to_radians() };

        let nodes = self
            .nodes
            .iter()
            .map(|p| {
                let moves = if trailing { p.x > xh } else { p.x < xh };
                if moves { p.rotate_about(&hinge, theta) } else { *p }
            })
            .collect();
        Self {
            name: format!("{} flapped", self.name),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_naca0012_shape() {
        let foil = Airfoil::naca4("0012", 60).unwrap();
        assert_eq!(foil.len(), 121);
        assert_eq!(foil.leading_edge_index(), 60);
        assert_relative_eq!(foil.chord(), 1.0, epsilon = 1e-9);
        let (t, x) = foil.max_thickness();
        assert_relative_eq!(t, 0.12, epsilon = 2e-3);
        assert!((x - 0.3).abs() < 0.03);
        assert_relative_eq!(foil.camber(0.4), 0.0, epsilon = 1e-9);
        assert!(foil.te_gap() < 1e-9);
    }

    #[test]
    fn test_naca2412_camber() {
        let foil = Airfoil::naca4("2412", 80).unwrap();
        assert_relative_eq!(foil.camber(0.4), 0.02, epsilon = 1e-3);
        assert!(foil.upper_y(0.3) > 0.0 && foil.lower_y(0.3) < 0.0);
    }

    #[test]
    fn test_invalid_code() {
        assert!(Airfoil::naca4("12", 40).is_err());
        assert!(Airfoil::naca4("2400", 40).is_err());
    }

    #[test]
    fn test_validate_ceiling_and_angle() {
        let foil = Airfoil::naca4("0012", 80).unwrap();
        assert!(foil.validate(300, 30.0).is_ok());
        assert!(matches!(
            foil.validate(50, 30.0),
            Err(AnalysisError::GeometryInvalid { .. })
        ));
        let coarse = Airfoil::naca4("0012", 4).unwrap();
        assert!(coarse.validate(300, 10.0).is_err());
    }

    #[test]
    fn test_repanel_keeps_shape() {
        let foil = Airfoil::naca4("4412", 100).unwrap();
        let re = foil.repanel(50).unwrap();
        assert_eq!(re.len(), 101);
        assert_relative_eq!(re.thickness(0.3), foil.thickness(0.3), epsilon = 2e-3);
        assert!(re.validate(300, 30.0).is_ok());
    }

    #[test]
    fn test_te_flap_moves_trailing_edge_down() {
        let foil = Airfoil::naca4("0012", 60).unwrap();
        let flapped = foil.with_te_flap(&Flap {
            angle: 10.0,
            ..Flap::default()
        });
        assert!(flapped.nodes[0].y < -0.02);
        assert_eq!(flapped.nodes[60], foil.nodes[60]);
    }
}

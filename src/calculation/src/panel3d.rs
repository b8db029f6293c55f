//! Vortex-lattice and panel analysis of a plane.
//!
//! Three formulations share one assembly path:
//!
//! - horseshoe vortices with legs along the free stream,
//! - vortex rings on the mean camber surface with a ring wake,
//! - a Dirichlet source/doublet panel method on thick wings, the other
//!   surfaces of the plane falling back to vortex rings.
//!
//! Every unknown is a doublet (or vortex) strength on one panel. Thin
//! panels impose zero normal velocity at their control point, thick panels
//! zero internal perturbation potential at their center. Symmetric
//! configurations are solved on the right half only, the left half taking
//! the mirrored strengths. Ground effect adds image elements below the
//! ground plane. Induced drag is evaluated in the Trefftz plane, viscous
//! drag from the section polars at the strip lift coefficients.

use std::borrow::Cow;
use std::f64::consts::PI;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::aerodynamics::{freestream_direction, kutta_joukowski, oswald_efficiency, speed_from_weight, wind_axes};
use crate::constants::Fluid;
use crate::error::{AnalysisError, AnalysisResult};
use crate::influence::{
    doublet_potential, doublet_velocity, ground_image, horseshoe_velocity, source_potential, source_velocity,
};
use crate::linalg::{SharedSolver, default_solver};
use crate::mesh::{FoilLibrary, Mesh, MeshOptions, Panel3, PanelKind, Wake, count_panels};
use crate::plane::{ControlGain, Plane, SymmetryReport};
use crate::polar::{AeroCoefficients, PolarType, SweepVariable};
use crate::progress::RunContext;
use crate::section_polar::FoilPolars;
use crate::settings::{SweepOptions, WingSettings};
use crate::sweep::{PointOutcome, PointSolver};
use crate::vector::{Vec3, directions};

/// Wing analysis method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WingMethod {
    /// Nonlinear lifting line, see [`crate::lifting_line`]
    LiftingLine,
    /// Thin-surface horseshoe vortices
    Horseshoe,
    /// Thin-surface vortex rings
    #[default]
    VortexRing,
    /// Source and doublet panels on thick surfaces
    Panel,
}

/// Definition of a 3D polar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WingPolarSpec {
    /// Analysis method
    pub method: WingMethod,
    /// How speed and Reynolds number follow the lift
    pub polar_type: PolarType,
    /// Swept variable
    pub variable: SweepVariable,
    /// Free-stream speed (m/s), unused by fixed-lift polars
    pub speed: f64,
    /// Angle of attack for fixed-angle and control polars, degrees
    pub alpha: f64,
    /// Sideslip, degrees
    pub beta: f64,
    /// Fluid properties
    pub fluid: Fluid,
    /// Add section drag from the foil polars
    pub viscous: bool,
    /// Height of the plane origin above the ground (m)
    pub ground_height: Option<f64>,
    /// Deflection laws of a control polar
    pub controls: Vec<ControlGain>,
}

impl Default for WingPolarSpec {
    fn default() -> Self {
        Self {
            method: WingMethod::VortexRing,
            polar_type: PolarType::FixedSpeed,
            variable: SweepVariable::Alpha,
            speed: 10.0,
            alpha: 0.0,
            beta: 0.0,
            fluid: Fluid::new(),
            viscous: true,
            ground_height: None,
            controls: vec![],
        }
    }
}

impl WingPolarSpec {
    /// Reject sweep combinations and non-physical inputs.
    pub fn validate(&self) -> AnalysisResult<()> {
        let allowed = matches!(
            (self.polar_type, self.variable),
            (PolarType::FixedSpeed | PolarType::FixedLift, SweepVariable::Alpha | SweepVariable::Cl)
                | (PolarType::FixedAngle, SweepVariable::Speed)
                | (PolarType::Control, SweepVariable::Control)
        );
        if !allowed {
            return Err(AnalysisError::geometry(format!(
                "a {:?} wing polar cannot sweep {:?}",
                self.polar_type, self.variable
            )));
        }
        if self.polar_type != PolarType::FixedLift && self.variable != SweepVariable::Speed && !(self.speed > 0.0) {
            return Err(AnalysisError::geometry("free-stream speed must be positive"));
        }
        if self.ground_height.is_some_and(|h| !(h > 0.0)) {
            return Err(AnalysisError::geometry("ground height must be positive"));
        }
        if !(self.fluid.density > 0.0) || !(self.fluid.viscosity > 0.0) {
            return Err(AnalysisError::geometry("fluid density and viscosity must be positive"));
        }
        Ok(())
    }
}

/// Per-strip results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripResult {
    /// Index of the owning surface
    pub surface: usize,
    /// Quarter-chord point
    pub position: Vec3,
    /// Mean chord
    pub chord: f64,
    /// Spanwise width
    pub width: f64,
    /// Local lift coefficient
    pub cl: f64,
    /// Local induced drag coefficient
    pub cd_induced: f64,
    /// Local section drag coefficient
    pub cd_viscous: f64,
    /// Degrees
    pub induced_angle: f64,
    /// Local Reynolds number
    pub reynolds: f64,
    /// Circulation at unit speed (m)
    pub circulation: f64,
    /// Lift outside the section polars
    pub out_of_envelope: bool,
}

/// One 3D operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WingResult {
    /// Analysis method
    pub method: WingMethod,
    /// Degrees
    pub alpha: f64,
    /// Sideslip, degrees
    pub beta: f64,
    /// m/s
    pub speed: f64,
    /// Control variable value
    pub control: f64,
    /// Lift coefficient
    pub cl: f64,
    /// Side force
    pub cy: f64,
    /// Induced drag coefficient
    pub cdi: f64,
    /// Viscous drag coefficient
    pub cdv: f64,
    /// Total drag coefficient
    pub cd: f64,
    /// Pitching moment about the reference point
    pub cm: f64,
    /// Rolling moment
    pub croll: f64,
    /// Yawing moment
    pub cyaw: f64,
    /// N
    pub lift: f64,
    /// N
    pub drag: f64,
    /// Center of pressure x (m)
    pub x_cp: f64,
    /// Oswald efficiency
    pub efficiency: Option<f64>,
    /// Solved on one half only
    pub symmetric: bool,
    /// Why the half-model was not used
    pub symmetry_reasons: Vec<String>,
    /// Wake roll-up passes
    pub wake_iterations: usize,
    /// Some strip lies outside its section polars
    pub out_of_envelope: bool,
    /// Per-strip distributions
    pub strips: Vec<StripResult>,
    /// Pressure (thick) or loading (thin) coefficient per panel
    pub panel_cp: Vec<f64>,
    /// Doublet or vortex strength per panel at unit speed
    pub strengths: Vec<f64>,
}

impl AeroCoefficients for WingResult {
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
    fn speed(&self) -> Option<f64> {
        Some(self.speed)
    }
}

/// Panels carrying an unknown, and the unknown each panel takes its strength from.
struct Unknowns {
    /// Panel of each unknown
    rows: Vec<usize>,
    /// Unknown of each panel, shared by mirror panels in a half-model
    index: Vec<Option<usize>>,
}

impl Unknowns {
    /// Unknowns of `mesh`, only the right half when `symmetric`.
    fn new(mesh: &Mesh, symmetric: bool) -> Self {
        let mut index = vec![None; mesh.len()];
        let mut rows = vec![];
        for (i, p) in mesh.panels.iter().enumerate() {
            let fin = mesh.surfaces[p.surface].is_fin;
            if symmetric && (fin || !mesh.strips[p.strip].right) {
                continue;
            }
            index[i] = Some(rows.len());
            rows.push(i);
        }
        if symmetric {
            for (i, p) in mesh.panels.iter().enumerate() {
                if index[i].is_none() && !mesh.surfaces[p.surface].is_fin {
                    index[i] = p.mirror.and_then(|m| index[m]);
                }
            }
        }
        Self { rows, index }
    }
}

/// Influence evaluation for one configuration.
struct Field<'a> {
    /// Mesh being solved
    mesh: &'a Mesh,
    /// Analysis method
    method: WingMethod,
    /// Free-stream direction, also the direction of horseshoe legs
    dir: Vec3,
    /// Vortex core radius
    core: f64,
    /// Ground height, when in ground effect
    ground: Option<f64>,
}

/// Ground images of `corners`.
fn mirrored(corners: &[Vec3; 4], ground: f64) -> [Vec3; 4] {
    corners.map(|c| ground_image(&c, ground))
}

/// Unit normal and centroid of a quadrilateral.
fn quad_frame(c: &[Vec3; 4]) -> (Vec3, Vec3) {
    let n = (c[2] - c[0]).cross(&(c[3] - c[1])).normalized().unwrap_or(directions::Z);
    (n, (c[0] + c[1] + c[2] + c[3]) * 0.25)
}

impl Field<'_> {
    /// Velocity of the unit-strength vortex or doublet element of a panel.
    fn element_velocity(&self, src: &Panel3, p: &Vec3) -> Vec3 {
        let mut v = match self.method {
            WingMethod::Horseshoe => {
                let (a, b) = src.bound_vortex();
                horseshoe_velocity(p, &a, &b, &self.dir, self.core)
            }
            _ => doublet_velocity(p, &src.ring, self.core),
        };
        if let Some(g) = self.ground {
            // image vortices turn the other way
            v = v - match self.method {
                WingMethod::Horseshoe => {
                    let (a, b) = src.bound_vortex();
                    let dir = Vec3::new(self.dir.x, self.dir.y, -self.dir.z);
                    horseshoe_velocity(p, &ground_image(&a, g), &ground_image(&b, g), &dir, self.core)
                }
                _ => doublet_velocity(p, &mirrored(&src.ring, g), self.core),
            };
        }
        v
    }

    /// Doublet potential at `p`, less its ground image.
    fn doublet_potential(&self, corners: &[Vec3; 4], p: &Vec3) -> f64 {
        let mut phi = doublet_potential(p, corners);
        if let Some(g) = self.ground {
            phi -= doublet_potential(p, &mirrored(corners, g));
        }
        phi
    }

    /// Doublet velocity at `p`, less its ground image.
    fn doublet_velocity(&self, corners: &[Vec3; 4], p: &Vec3) -> Vec3 {
        let mut v = doublet_velocity(p, corners, self.core);
        if let Some(g) = self.ground {
            v = v - doublet_velocity(p, &mirrored(corners, g), self.core);
        }
        v
    }

    /// Source potential at `p`, plus its ground image.
    fn source_potential(&self, src: &Panel3, p: &Vec3) -> f64 {
        let mut phi = source_potential(p, &src.corners, &src.normal, &src.center);
        if let Some(g) = self.ground {
            let c = mirrored(&src.corners, g);
            let (n, center) = quad_frame(&c);
            phi += source_potential(p, &c, &n, &center);
        }
        phi
    }

    /// Source velocity at `p`, plus its ground image.
    fn source_velocity(&self, src: &Panel3, p: &Vec3) -> Vec3 {
        let mut v = source_velocity(p, &src.corners, &src.normal, &src.center, src.area);
        if let Some(g) = self.ground {
            let c = mirrored(&src.corners, g);
            let (n, center) = quad_frame(&c);
            v = v + source_velocity(p, &c, &n, &center, src.area);
        }
        v
    }

    /// Coefficient of panel `q`'s strength in the boundary condition of panel `k`.
    fn panel_influence(&self, q: usize, k: usize) -> f64 {
        let row = &self.mesh.panels[k];
        let src = &self.mesh.panels[q];
        if row.is_thin() {
            self.element_velocity(src, &row.control).dot(&row.bc_normal)
        } else if q == k {
            // inner side of the panel itself
            let mut phi = -0.5;
            if let Some(g) = self.ground {
                phi -= doublet_potential(&row.control, &mirrored(&src.ring, g));
            }
            phi
        } else {
            self.doublet_potential(&src.ring, &row.control)
        }
    }

    /// Coefficient of a wake ring's unit strength in the boundary condition of panel `k`.
    fn wake_influence(&self, corners: &[Vec3; 4], k: usize) -> f64 {
        let row = &self.mesh.panels[k];
        if row.is_thin() {
            self.doublet_velocity(corners, &row.control).dot(&row.bc_normal)
        } else {
            self.doublet_potential(corners, &row.control)
        }
    }

    /// Total velocity at `p` for the given singularity strengths.
    fn velocity(&self, p: &Vec3, strengths: &[f64], sigma: &[f64], wake: Option<&Wake>) -> Vec3 {
        let mut v = self.dir;
        for (q, panel) in self.mesh.panels.iter().enumerate() {
            if strengths[q] != 0.0 {
                v = v + self.element_velocity(panel, p) * strengths[q];
            }
            if sigma[q] != 0.0 {
                v = v + self.source_velocity(panel, p) * sigma[q];
            }
        }
        if let Some(wake) = wake {
            for (s, strip) in self.mesh.strips.iter().enumerate() {
                let mu = wake_strength(strip.te_top, strip.te_bottom, strengths);
                if mu == 0.0 {
                    continue;
                }
                for k in 0..wake.panels_per_column() {
                    v = v + self.doublet_velocity(&wake.panel(s, k), p) * mu;
                }
            }
        }
        v
    }
}

/// Strength shed by a trailing edge: upper minus lower panel.
fn wake_strength(top: usize, bottom: Option<usize>, strengths: &[f64]) -> f64 {
    strengths[top] - bottom.map_or(0.0, |b| strengths[b])
}

/// Potential solution of one configuration.
struct Solution {
    /// Mesh of the configuration
    mesh: Mesh,
    /// Wake, for vortex-ring and panel methods
    wake: Option<Wake>,
    /// Strength per panel
    strengths: Vec<f64>,
    /// Solved as a half-model
    symmetric: bool,
    /// Outcome of the symmetry check
    report: SymmetryReport,
    /// Wake roll-up passes
    wake_iterations: usize,
    /// Free-stream direction
    dir: Vec3,
    /// Degrees
    alpha: f64,
}

/// Forces at unit speed and unit density, divided by the dynamic pressure.
struct Loads {
    /// Per panel force (m²) and its application point
    forces: Vec<(Vec3, Vec3)>,
    /// Pressure or loading coefficient per panel
    cp: Vec<f64>,
    /// Total force
    total: Vec3,
    /// Moment about the reference point
    moment: Vec3,
    /// Center of pressure x (m)
    x_cp: f64,
}

/// Vortex-lattice and panel solver for a plane.
pub struct WingSolver {
    /// Analyzed plane
    pub plane: Plane,
    /// Polar definition
    pub spec: WingPolarSpec,
    /// Numerical settings
    pub settings: WingSettings,
    /// Airfoils referenced by the sections
    foils: FoilLibrary,
    /// Section polars for the viscous drag and the envelope check
    polars: FoilPolars,
    /// Report points outside the section polars
    keep_out_points: bool,
    /// Linear-system backend
    linear: SharedSolver,
    /// Wake kept from the previous point and the alpha it was laid at
    wake_state: Option<(f64, Wake)>,
}

impl WingSolver {
    /// Solver with the default linear backend.
    pub fn new(plane: Plane, foils: FoilLibrary, polars: FoilPolars, spec: WingPolarSpec, settings: WingSettings) -> Self {
        Self {
            plane,
            spec,
            settings,
            foils,
            polars,
            keep_out_points: true,
            linear: default_solver(),
            wake_state: None,
        }
    }

    /// Substitute the linear-system backend.
    pub fn with_linear_solver(mut self, linear: SharedSolver) -> Self {
        self.linear = linear;
        self
    }

    /// Envelope handling follows the sweep options: points outside the
    /// section polars are kept (flagged) or rejected.
    pub fn with_sweep_options(mut self, options: &SweepOptions) -> Self {
        self.keep_out_points = options.keep_out_points;
        self
    }

    /// Mesh options for the selected method.
    fn mesh_options(&self) -> MeshOptions {
        MeshOptions::new(&self.settings, self.spec.method == WingMethod::Panel)
    }

    /// Reject planforms whose mesh would exceed the panel ceiling.
    fn check_panel_count(&self, plane: &Plane) -> AnalysisResult<()> {
        let count = count_panels(plane, &self.mesh_options());
        if count > self.settings.max_panels {
            return Err(AnalysisError::geometry(format!(
                "the number of panels ({}) exceeds the maximum ({})",
                count, self.settings.max_panels
            )));
        }
        Ok(())
    }

    /// Plane with the control deflections of a control polar applied.
    fn configured_plane(&self, control: f64) -> AnalysisResult<Cow<'_, Plane>> {
        if self.spec.polar_type == PolarType::Control && !self.spec.controls.is_empty() {
            Ok(Cow::Owned(self.plane.with_controls(&self.spec.controls, control)?))
        } else {
            Ok(Cow::Borrowed(&self.plane))
        }
    }

    /// Distance of the far wake end.
    fn far_distance(&self) -> f64 {
        100.0 * (self.plane.reference_span() + self.settings.wake_length * self.plane.reference_chord())
    }

    /// Mesh, wake and singularity strengths at `alpha` (degrees).
    fn solve_potential(&mut self, alpha: f64, control: f64, ctx: &mut RunContext) -> AnalysisResult<Solution> {
        ctx.check_cancel()?;
        let plane = self.configured_plane(control)?;
        self.check_panel_count(&plane)?;
        let report = plane.symmetry(self.spec.beta);
        if !report.symmetric {
            for reason in &report.reasons {
                log::debug!("asymmetric configuration: {}", reason);
            }
        }
        let mesh = Mesh::build(&plane, &self.foils, &self.mesh_options())?;
        let paired = mesh
            .panels
            .iter()
            .all(|p| p.mirror.is_some() || mesh.surfaces[p.surface].is_fin);
        let symmetric = report.symmetric && paired;
        drop(plane);

        let dir = freestream_direction(alpha.to_radians(), self.spec.beta.to_radians());
        let mut wake = match self.spec.method {
            WingMethod::Horseshoe | WingMethod::LiftingLine => None,
            _ => {
                let carried = self
                    .wake_state
                    .take()
                    .filter(|(a, w)| (*a - alpha).abs() < 1e-9 && w.columns.len() == mesh.strips.len());
                Some(match carried {
                    Some((_, w)) => w,
                    None => Wake::new(
                        &mesh,
                        dir,
                        self.settings.wake_panels,
                        self.settings.wake_length * self.plane.reference_chord(),
                        self.settings.wake_panel_factor,
                        self.far_distance(),
                    ),
                })
            }
        };

        let field = Field {
            mesh: &mesh,
            method: self.spec.method,
            dir,
            core: self.settings.core_size,
            ground: self.spec.ground_height.map(|h| -h),
        };
        let unknowns = Unknowns::new(&mesh, symmetric);
        let sigma: Vec<f64> = mesh
            .panels
            .iter()
            .map(|p| if p.is_thin() { 0.0 } else { -p.bc_normal.dot(&dir) })
            .collect();

        let relax = self.settings.wake_relaxation && wake.is_some();
        let passes = if relax { self.settings.max_wake_iterations } else { 0 };
        let mut strengths = vec![0.0; mesh.len()];
        let mut wake_iterations = 0;
        for pass in 0..=passes {
            ctx.check_cancel()?;
            strengths = Self::solve_strengths(&field, &unknowns, &sigma, wake.as_ref(), &*self.linear, ctx)?;
            if pass == passes {
                break;
            }
            ctx.log(format!("Relaxing the wake, pass {}...", pass + 1));
            if let Some(w) = wake.as_mut() {
                let snapshot = w.clone();
                w.relax(|p| field.velocity(p, &strengths, &sigma, Some(&snapshot)))?;
                if w.lines.iter().flatten().any(|p| !p.is_finite()) {
                    return Err(AnalysisError::wake("relaxed wake left the finite domain"));
                }
            }
            wake_iterations += 1;
        }
        if relax {
            if let Some(w) = &wake {
                self.wake_state = Some((alpha, w.clone()));
            }
        }

        Ok(Solution {
            mesh,
            wake,
            strengths,
            symmetric,
            report,
            wake_iterations,
            dir,
            alpha,
        })
    }

    /// Assemble and solve the boundary conditions for the strengths.
    fn solve_strengths(
        field: &Field,
        unknowns: &Unknowns,
        sigma: &[f64],
        wake: Option<&Wake>,
        linear: &dyn crate::linalg::LinearSolver,
        ctx: &mut RunContext,
    ) -> AnalysisResult<Vec<f64>> {
        let mesh = field.mesh;
        let n = unknowns.rows.len();
        if n == 0 {
            return Err(AnalysisError::geometry("no panel to solve"));
        }
        ctx.log("Creating the influence matrix...");
        let mut a = Array2::<f64>::zeros((n, n));
        let mut rhs = Array1::<f64>::zeros(n);
        for (r, &k) in unknowns.rows.iter().enumerate() {
            for q in 0..mesh.len() {
                if let Some(col) = unknowns.index[q] {
                    a[[r, col]] += field.panel_influence(q, k);
                }
            }
            let row = &mesh.panels[k];
            let mut b = if row.is_thin() { -field.dir.dot(&row.bc_normal) } else { 0.0 };
            for (q, src) in mesh.panels.iter().enumerate() {
                if sigma[q] == 0.0 {
                    continue;
                }
                b -= sigma[q]
                    * if row.is_thin() {
                        field.source_velocity(src, &row.control).dot(&row.bc_normal)
                    } else {
                        field.source_potential(src, &row.control)
                    };
            }
            rhs[r] = b;
        }

        if let Some(wake) = wake {
            ctx.log("Adding the wake contribution...");
            for (s, strip) in mesh.strips.iter().enumerate() {
                let targets: Vec<(usize, f64)> = std::iter::once((strip.te_top, 1.0))
                    .chain(strip.te_bottom.map(|b| (b, -1.0)))
                    .filter_map(|(p, f)| unknowns.index[p].map(|c| (c, f)))
                    .collect();
                if targets.is_empty() {
                    continue;
                }
                for kw in 0..wake.panels_per_column() {
                    let corners = wake.panel(s, kw);
                    for (r, &k) in unknowns.rows.iter().enumerate() {
                        let v = field.wake_influence(&corners, k);
                        for &(col, f) in &targets {
                            a[[r, col]] += f * v;
                        }
                    }
                }
            }
            if a.iter().any(|v| !v.is_finite()) {
                return Err(AnalysisError::wake("non-finite wake influence coefficient"));
            }
        }
        if a.iter().any(|v| !v.is_finite()) || rhs.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::geometry("non-finite influence coefficient"));
        }

        ctx.log("Solving the linear system...");
        let x = linear.solve(a, rhs.view())?;
        Ok((0..mesh.len()).map(|q| unknowns.index[q].map_or(0.0, |c| x[c])).collect())
    }

    /// Tangential gradient of the doublet strength on a thick panel.
    fn doublet_gradient(mesh: &Mesh, mu: &[f64], i: usize) -> Vec3 {
        let p = &mesh.panels[i];
        if p.kind == PanelKind::Tip {
            return Vec3::zero();
        }
        let n = p.normal;
        let centre = |j: usize| mesh.panels[j].center;
        let diff = |pair: (Option<usize>, Option<usize>)| -> Option<(Vec3, f64)> {
            match pair {
                (Some(a), Some(b)) => Some((centre(b) - centre(a), mu[b] - mu[a])),
                (Some(a), None) => Some((p.center - centre(a), mu[i] - mu[a])),
                (None, Some(b)) => Some((centre(b) - p.center, mu[b] - mu[i])),
                (None, None) => None,
            }
        };
        let tangential = |v: Vec3| v - n * v.dot(&n);
        let along = |(d, dm): (Vec3, f64)| {
            let t = tangential(d);
            let l2 = t.magnitude_sq();
            if l2 > 1e-24 { t * (dm / l2) } else { Vec3::zero() }
        };
        match (diff(mesh.chordwise_neighbours(i)), diff(mesh.spanwise_neighbours(i))) {
            (Some(c), Some(s)) => {
                let Some(t1) = tangential(c.0).normalized() else {
                    return along(s);
                };
                let t2 = n.cross(&t1);
                let (a11, a12) = (c.0.dot(&t1), c.0.dot(&t2));
                let (a21, a22) = (s.0.dot(&t1), s.0.dot(&t2));
                let det = a11 * a22 - a12 * a21;
                if det.abs() < 1e-12 * (a11 * a11 + a22 * a22) {
                    return along(c);
                }
                let g1 = (c.1 * a22 - a12 * s.1) / det;
                let g2 = (a11 * s.1 - a21 * c.1) / det;
                t1 * g1 + t2 * g2
            }
            (Some(c), None) => along(c),
            (None, Some(s)) => along(s),
            (None, None) => Vec3::zero(),
        }
    }

    /// Panel forces and pressure coefficients of a solution.
    fn loads(&self, sol: &Solution) -> Loads {
        let mesh = &sol.mesh;
        let v = sol.dir;
        let mut forces = Vec::with_capacity(mesh.len());
        let mut cp = Vec::with_capacity(mesh.len());
        for (i, p) in mesh.panels.iter().enumerate() {
            if p.is_thin() {
                let strip = &mesh.strips[p.strip];
                let upstream = match self.spec.method {
                    WingMethod::Horseshoe => 0.0,
                    _ => strip
                        .panels
                        .iter()
                        .position(|&j| j == i)
                        .and_then(|k| k.checked_sub(1))
                        .map_or(0.0, |k| sol.strengths[strip.panels[k]]),
                };
                let (a, b) = p.bound_vortex();
                // unit density and speed: force over dynamic pressure is twice the Kutta-Joukowski force
                let f = kutta_joukowski(1.0, &v, sol.strengths[i] - upstream, &(b - a)) * 2.0;
                cp.push(if p.area > 0.0 { f.dot(&p.normal) / p.area } else { 0.0 });
                forces.push((f, (a + b) * 0.5));
            } else {
                let g = Self::doublet_gradient(mesh, &sol.strengths, i);
                let vt = v - p.normal * v.dot(&p.normal) + g;
                let c = 1.0 - vt.magnitude_sq();
                cp.push(c);
                forces.push((p.normal * (-c * p.area), p.center));
            }
        }
        let total = forces.iter().fold(Vec3::zero(), |acc, (f, _)| acc + *f);
        let cog = self.plane.cog;
        let moment = forces
            .iter()
            .fold(Vec3::zero(), |acc, (f, at)| acc + (*at - cog).cross(f));
        let (lift_dir, _) = wind_axes(sol.alpha.to_radians(), self.spec.beta.to_radians());
        let lift_sum: f64 = forces.iter().map(|(f, _)| f.dot(&lift_dir)).sum();
        let x_cp = if lift_sum.abs() > 1e-12 {
            forces.iter().map(|(f, at)| at.x * f.dot(&lift_dir)).sum::<f64>() / lift_sum
        } else {
            cog.x
        };
        Loads {
            forces,
            cp,
            total,
            moment,
            x_cp,
        }
    }

    /// Strip circulations at unit speed.
    fn strip_circulation(&self, sol: &Solution) -> Vec<f64> {
        sol.mesh
            .strips
            .iter()
            .map(|s| match self.spec.method {
                WingMethod::Horseshoe => s.panels.iter().map(|&p| sol.strengths[p]).sum(),
                _ => wake_strength(s.te_top, s.te_bottom, &sol.strengths),
            })
            .collect()
    }

    /// Normal wash of the trailing vortex sheet at each strip in the Trefftz plane.
    fn trefftz_wash(&self, mesh: &Mesh, gamma: &[f64]) -> Vec<f64> {
        let core_sq = self.settings.core_size * self.settings.core_size;
        let mut edges: Vec<(f64, f64, f64)> = vec![];
        for group in mesh.trailing_groups() {
            let mut previous = 0.0;
            for (k, &s) in group.iter().enumerate() {
                let strip = &mesh.strips[s];
                if k == 0 {
                    edges.push((strip.te_a.y, strip.te_a.z, -gamma[s]));
                } else {
                    edges.push((strip.te_a.y, strip.te_a.z, previous - gamma[s]));
                }
                previous = gamma[s];
            }
            if let Some(&last) = group.last() {
                let strip = &mesh.strips[last];
                edges.push((strip.te_b.y, strip.te_b.z, gamma[last]));
            }
        }
        if let Some(h) = self.spec.ground_height {
            let images: Vec<_> = edges.iter().map(|&(y, z, g)| (y, -2.0 * h - z, -g)).collect();
            edges.extend(images);
        }
        mesh.strips
            .iter()
            .map(|strip| {
                let (n, _) = strip.trefftz_normal();
                let (cy, cz) = (0.5 * (strip.te_a.y + strip.te_b.y), 0.5 * (strip.te_a.z + strip.te_b.z));
                let (mut vy, mut vz) = (0.0, 0.0);
                for &(ey, ez, g) in &edges {
                    let (ry, rz) = (cy - ey, cz - ez);
                    let r2 = ry * ry + rz * rz + core_sq;
                    if r2 < 1e-24 {
                        continue;
                    }
                    vy -= g * rz / (2.0 * PI * r2);
                    vz += g * ry / (2.0 * PI * r2);
                }
                vy * n.y + vz * n.z
            })
            .collect()
    }

    /// Free-stream speed: from the weight for fixed-lift polars, otherwise the target or polar speed.
    fn speed_for(&self, cl: f64, target_speed: Option<f64>) -> AnalysisResult<f64> {
        match self.spec.polar_type {
            PolarType::FixedLift => speed_from_weight(
                self.plane.mass,
                self.spec.fluid.density,
                self.plane.reference_area(),
                cl,
            ),
            _ => {
                let v = target_speed.unwrap_or(self.spec.speed);
                if !(v > 0.0) {
                    return Err(AnalysisError::out_of_envelope(format!("free-stream speed {:.3} m/s", v)));
                }
                Ok(v)
            }
        }
    }

    /// Coefficients, strip distributions and warnings of a solution.
    fn assemble_result(
        &self,
        sol: &Solution,
        target_speed: Option<f64>,
        control: f64,
        ctx: &mut RunContext,
    ) -> AnalysisResult<(WingResult, Vec<String>)> {
        ctx.log("Computing forces...");
        let mesh = &sol.mesh;
        let loads = self.loads(sol);
        let area = self.plane.reference_area();
        let span = self.plane.reference_span();
        let mac = self.plane.reference_chord();
        let (lift_dir, drag_dir) = wind_axes(sol.alpha.to_radians(), self.spec.beta.to_radians());

        let cl = loads.total.dot(&lift_dir) / area;
        let cy = loads.total.y / area;
        let cm = loads.moment.y / (area * mac);
        let croll = loads.moment.x / (area * span);
        let cyaw = loads.moment.z / (area * span);
        let speed = self.speed_for(cl, target_speed)?;

        ctx.log("Computing induced drag...");
        let gamma = self.strip_circulation(sol);
        let wash = self.trefftz_wash(mesh, &gamma);
        let mut cdi = 0.0;
        let mut strips = Vec::with_capacity(mesh.strips.len());
        for (s, strip) in mesh.strips.iter().enumerate() {
            let (n, width) = strip.trefftz_normal();
            let di = -gamma[s] * wash[s] * width;
            cdi += di;
            let force = strip
                .panels
                .iter()
                .fold(Vec3::zero(), |acc, &p| acc + loads.forces[p].0);
            // section lift is taken normal to the free stream in the strip plane
            let normal_dir = (n - drag_dir * n.dot(&drag_dir)).normalized().unwrap_or(lift_dir);
            let strip_area = strip.chord * strip.width;
            strips.push(StripResult {
                surface: strip.surface,
                position: strip.quarter_chord,
                chord: strip.chord,
                width: strip.width,
                cl: if strip_area > 0.0 { force.dot(&normal_dir) / strip_area } else { 0.0 },
                cd_induced: if strip_area > 0.0 { di / strip_area } else { 0.0 },
                cd_viscous: 0.0,
                induced_angle: (0.5 * wash[s]).atan().to_degrees(),
                reynolds: self.spec.fluid.reynolds(speed, strip.chord),
                circulation: gamma[s],
                out_of_envelope: false,
            });
        }
        cdi /= area;

        let mut warnings = vec![];
        let mut cdv = 0.0;
        let mut out_of_envelope = false;
        if self.spec.viscous {
            ctx.log("Computing viscous drag...");
            for (s, strip) in mesh.strips.iter().enumerate() {
                let r = &mut strips[s];
                let c = self
                    .polars
                    .at_cl(&strip.foil_a, &strip.foil_b, strip.blend, r.cl, r.reynolds)?;
                if c.out_of_envelope {
                    if !self.keep_out_points {
                        return Err(AnalysisError::out_of_envelope(format!(
                            "strip {} at Cl = {:.3}, Re = {:.0} is outside the section polars",
                            s, r.cl, r.reynolds
                        )));
                    }
                    out_of_envelope = true;
                    r.out_of_envelope = true;
                }
                r.cd_viscous = c.cd;
                cdv += c.cd * strip.chord * strip.width;
            }
            cdv /= area;
            if out_of_envelope {
                let count = strips.iter().filter(|r| r.out_of_envelope).count();
                warnings.push(format!("{} strips outside the section polar envelope", count));
            }
        }

        let cd = cdi + cdv;
        let q = self.spec.fluid.dynamic_pressure(speed);
        let wing = &self.plane.wing.wing;
        Ok((
            WingResult {
                method: self.spec.method,
                alpha: sol.alpha,
                beta: self.spec.beta,
                speed,
                control,
                cl,
                cy,
                cdi,
                cdv,
                cd,
                cm,
                croll,
                cyaw,
                lift: cl * q * area,
                drag: cd * q * area,
                x_cp: loads.x_cp,
                efficiency: oswald_efficiency(cl, cdi, wing.aspect_ratio()),
                symmetric: sol.symmetric,
                symmetry_reasons: sol.report.reasons.clone(),
                wake_iterations: sol.wake_iterations,
                out_of_envelope,
                strips,
                panel_cp: loads.cp,
                strengths: sol.strengths.clone(),
            },
            warnings,
        ))
    }

    /// Lift coefficient of the potential solution.
    fn lift_of(&self, sol: &Solution) -> f64 {
        let (lift_dir, _) = wind_axes(sol.alpha.to_radians(), self.spec.beta.to_radians());
        self.loads(sol).total.dot(&lift_dir) / self.plane.reference_area()
    }

    /// Solve the point at `alpha` degrees and control value `control`.
    pub fn analyze(
        &mut self,
        alpha: f64,
        speed: Option<f64>,
        control: f64,
        ctx: &mut RunContext,
    ) -> AnalysisResult<PointOutcome<WingResult>> {
        let sol = self.solve_potential(alpha, control, ctx)?;
        let (result, warnings) = self.assemble_result(&sol, speed, control, ctx)?;
        if sol.wake.is_some() && self.settings.wake_relaxation {
            log::debug!("wake relaxed in {} passes", sol.wake_iterations);
        }
        Ok(PointOutcome {
            result,
            converged: true,
            iterations: sol.wake_iterations + 1,
            warnings,
        })
    }

    /// Angle of attack giving the target lift coefficient, by secant steps.
    pub fn analyze_cl(&mut self, cl_target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<WingResult>> {
        if self.spec.polar_type == PolarType::FixedLift && cl_target <= 0.0 {
            return Err(AnalysisError::NegativeLift { cl: cl_target });
        }
        let mut a0 = self.spec.alpha;
        let s0 = self.solve_potential(a0, 0.0, ctx)?;
        let mut c0 = self.lift_of(&s0);
        let mut a1 = a0 + 2.0;
        let mut best = s0;
        let mut iterations = 1;
        let mut converged = (c0 - cl_target).abs() < 1e-4;
        while !converged && iterations < 20 {
            ctx.check_cancel()?;
            let s1 = self.solve_potential(a1, 0.0, ctx)?;
            let c1 = self.lift_of(&s1);
            iterations += 1;
            best = s1;
            if (c1 - cl_target).abs() < 1e-4 {
                converged = true;
                break;
            }
            let slope = (c1 - c0) / (a1 - a0);
            if !slope.is_finite() || slope.abs() < 1e-9 {
                return Err(AnalysisError::Diverged {
                    iteration: iterations,
                    reason: "lift curve slope vanished while trimming".into(),
                });
            }
            let step = ((cl_target - c1) / slope).clamp(-5.0, 5.0);
            a0 = a1;
            c0 = c1;
            a1 += step;
        }
        let (result, mut warnings) = self.assemble_result(&best, None, 0.0, ctx)?;
        if !converged {
            warnings.push(format!("lift target {:.4} not reached, CL = {:.4}", cl_target, result.cl));
        }
        Ok(PointOutcome {
            result,
            converged,
            iterations,
            warnings,
        })
    }
}

impl PointSolver for WingSolver {
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
        if self.spec.method == WingMethod::LiftingLine {
            return Err(AnalysisError::geometry(
                "lifting-line polars are run by the lifting-line solver",
            ));
        }
        self.plane.validate()?;
        self.check_panel_count(&self.plane)?;
        let names: Vec<String> = self
            .plane
            .surfaces()
            .iter()
            .flat_map(|(_, p)| p.wing.foil_names())
            .map(str::to_string)
            .collect();
        if let Some(missing) = names.iter().find(|n| !self.foils.contains_key(n.as_str())) {
            return Err(AnalysisError::geometry(format!("foil {} is not loaded", missing)));
        }
        if self.spec.viscous {
            self.polars.check(names.iter().map(String::as_str))?;
        }
        ctx.log(format!(
            "Plane {}: {} panels, {:?} method",
            self.plane.name,
            count_panels(&self.plane, &self.mesh_options()),
            self.spec.method
        ));
        Ok(())
    }

    fn solve_point(&mut self, target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<WingResult>> {
        match self.spec.variable {
            SweepVariable::Cl => self.analyze_cl(target, ctx),
            SweepVariable::Speed => self.analyze(self.spec.alpha, Some(target), 0.0, ctx),
            SweepVariable::Control => self.analyze(self.spec.alpha, None, target, ctx),
            _ => self.analyze(target, None, 0.0, ctx),
        }
    }

    fn reset_state(&mut self) {
        self.wake_state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foil::Airfoil;
    use crate::progress::{CancelToken, NullSink};
    use crate::section_polar::SectionPolar;
    use crate::wing::Wing;

    fn library() -> FoilLibrary {
        let mut lib = FoilLibrary::new();
        lib.insert("naca0012".into(), Airfoil::naca4("0012", 40).unwrap());
        lib
    }

    fn polars() -> FoilPolars {
        let mut p = FoilPolars::new();
        p.insert("naca0012", SectionPolar::linear(5e5, 0.0, 0.008, 0.005, 0.0));
        p
    }

    fn solver(method: WingMethod, nx: usize, ny: usize) -> WingSolver {
        let plane = Plane::from_wing(Wing::rectangular("ar8", 8.0, 1.0, "naca0012", nx, ny), 10.0);
        let spec = WingPolarSpec {
            method,
            viscous: false,
            ..WingPolarSpec::default()
        };
        WingSolver::new(plane, library(), polars(), spec, WingSettings::default())
    }

    fn run(s: &mut WingSolver, alpha: f64) -> WingResult {
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        s.prepare(&mut ctx).unwrap();
        s.analyze(alpha, None, 0.0, &mut ctx).unwrap().result
    }

    #[test]
    fn test_horseshoe_rectangular_wing() {
        let r = run(&mut solver(WingMethod::Horseshoe, 4, 12), 5.0);
        assert!(r.cl > 0.36 && r.cl < 0.48, "CL = {}", r.cl);
        assert!(r.symmetric);
        let e = r.efficiency.unwrap();
        assert!(e > 0.8 && e < 1.05, "e = {}", e);
    }

    #[test]
    fn test_vortex_ring_rectangular_wing() {
        let r = run(&mut solver(WingMethod::VortexRing, 4, 12), 5.0);
        assert!(r.cl > 0.36 && r.cl < 0.48, "CL = {}", r.cl);
        assert!(r.cdi > 0.0);
        let e = r.efficiency.unwrap();
        assert!(e > 0.8 && e < 1.05, "e = {}", e);
        // symmetric loading
        let n = r.strips.len();
        assert!((r.strips[0].cl - r.strips[n - 1].cl).abs() < 1e-9);
    }

    #[test]
    fn test_vortex_ring_matches_horseshoe() {
        let ring = run(&mut solver(WingMethod::VortexRing, 4, 12), 5.0);
        let horseshoe = run(&mut solver(WingMethod::Horseshoe, 4, 12), 5.0);
        assert!(ring.cl > 0.0);
        assert!((ring.cl - horseshoe.cl).abs() < 0.05 * horseshoe.cl, "{} vs {}", ring.cl, horseshoe.cl);
        assert!((ring.cdi - horseshoe.cdi).abs() < 0.15 * horseshoe.cdi, "{} vs {}", ring.cdi, horseshoe.cdi);
    }

    #[test]
    fn test_symmetric_and_full_solves_agree() {
        let mut s = solver(WingMethod::VortexRing, 3, 6);
        let sym = run(&mut s, 4.0);
        // a negligible sideslip forces the full-span solve
        s.spec.beta = 1e-7;
        let full = run(&mut s, 4.0);
        assert!(sym.symmetric);
        assert!(!full.symmetric);
        assert!((sym.cl - full.cl).abs() < 1e-6, "{} vs {}", sym.cl, full.cl);
        assert!((sym.cdi - full.cdi).abs() < 1e-6);
    }

    #[test]
    fn test_zero_alpha_symmetric_section_no_lift() {
        let r = run(&mut solver(WingMethod::VortexRing, 3, 6), 0.0);
        assert!(r.cl.abs() < 1e-10);
    }

    #[test]
    fn test_panel_method_lift() {
        let r = run(&mut solver(WingMethod::Panel, 8, 8), 5.0);
        assert!(r.cl > 0.25 && r.cl < 0.6, "CL = {}", r.cl);
        assert!(r.cdi > 0.0);
    }

    #[test]
    fn test_ground_effect_increases_lift() {
        let mut s = solver(WingMethod::VortexRing, 3, 8);
        let free = run(&mut s, 4.0);
        s.spec.ground_height = Some(0.5);
        let ground = run(&mut s, 4.0);
        assert!(ground.cl > free.cl);
        assert!(ground.cdi < free.cdi);
    }

    #[test]
    fn test_panel_ceiling_rejected_before_assembly() {
        let mut s = solver(WingMethod::VortexRing, 40, 40);
        s.settings.max_panels = 1000;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let err = s.prepare(&mut ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::GeometryInvalid { .. }));
    }

    #[test]
    fn test_viscous_drag_from_polars() {
        let mut s = solver(WingMethod::VortexRing, 3, 8);
        s.spec.viscous = true;
        let r = run(&mut s, 3.0);
        assert!(r.cdv > 0.008 && r.cdv < 0.012, "CDv = {}", r.cdv);
        assert!((r.cd - r.cdi - r.cdv).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_lift_speed_and_negative_lift() {
        let mut s = solver(WingMethod::VortexRing, 3, 6);
        s.spec.polar_type = PolarType::FixedLift;
        let r = run(&mut s, 4.0);
        let expected = (2.0 * 10.0 * crate::constants::GRAVITY / (1.225 * 8.0 * r.cl)).sqrt();
        assert!((r.speed - expected).abs() < 1e-9);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let err = s.analyze(-3.0, None, 0.0, &mut ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::NegativeLift { .. }));
    }

    #[test]
    fn test_cl_target_trim() {
        let mut s = solver(WingMethod::Horseshoe, 3, 8);
        s.spec.variable = SweepVariable::Cl;
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        s.prepare(&mut ctx).unwrap();
        let out = s.solve_point(0.3, &mut ctx).unwrap();
        assert!(out.converged);
        assert!((out.result.cl - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_wake_relaxation_runs_all_passes() {
        let mut s = solver(WingMethod::VortexRing, 2, 4);
        s.settings.wake_relaxation = true;
        s.settings.wake_panels = 4;
        s.settings.max_wake_iterations = 2;
        let r = run(&mut s, 5.0);
        assert_eq!(r.wake_iterations, 2);
        assert!(r.cl > 0.2);
    }
}

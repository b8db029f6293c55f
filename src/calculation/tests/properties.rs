//! End-to-end checks of the sweep driver over the 2D and 3D engines.

use aerolab_calc::error::{AnalysisError, AnalysisResult, FailureKind};
use aerolab_calc::foil::Airfoil;
use aerolab_calc::foil_solver::{FoilPolarSpec, FoilResult, FoilSolver};
use aerolab_calc::mesh::FoilLibrary;
use aerolab_calc::panel3d::{WingMethod, WingPolarSpec, WingResult, WingSolver};
use aerolab_calc::plane::{PlacedWing, Plane};
use aerolab_calc::polar::{Polar, PointStatus, PolarType, SweepVariable};
use aerolab_calc::progress::{CancelToken, NullSink, ProgressSink, RunContext};
use aerolab_calc::section_polar::FoilPolars;
use aerolab_calc::settings::{FoilSettings, SweepOptions, WingSettings};
use aerolab_calc::sweep::{PointOutcome, PointSolver, run_sweep, sequence};
use aerolab_calc::vector::Vec3;
use aerolab_calc::wing::{Wing, WingFlap};

fn library() -> FoilLibrary {
    let mut lib = FoilLibrary::new();
    lib.insert("naca0012".into(), Airfoil::naca4("0012", 40).unwrap());
    lib
}

fn wing_solver(plane: Plane) -> WingSolver {
    let spec = WingPolarSpec {
        method: WingMethod::VortexRing,
        viscous: false,
        ..WingPolarSpec::default()
    };
    WingSolver::new(plane, library(), FoilPolars::new(), spec, WingSettings::default())
}

fn main_wing() -> Wing {
    Wing::rectangular("main", 2.0, 0.25, "naca0012", 3, 5)
}

fn foil_solver(viscous: bool, per_side: usize, reynolds: f64) -> FoilSolver {
    let spec = FoilPolarSpec {
        viscous,
        reynolds,
        ..FoilPolarSpec::default()
    };
    FoilSolver::new(Airfoil::naca4("0012", per_side).unwrap(), spec, FoilSettings::default())
}

#[test]
fn symmetric_airfoil_at_zero_incidence_has_no_lift() {
    let mut solver = foil_solver(false, 80, 1e6);
    let mut polar = Polar::new("naca0012", PolarType::FixedSpeed, SweepVariable::Alpha);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    run_sweep(&mut solver, &[0.0], &SweepOptions::foil(), &mut polar, &mut ctx).unwrap();
    let r = polar.converged().next().unwrap();
    assert!(r.cl.abs() < 1e-8);
}

#[test]
fn pressure_forces_match_integrated_lift() {
    let mut solver = foil_solver(false, 80, 1e6);
    let mut polar: Polar<FoilResult> = Polar::new("naca0012", PolarType::FixedSpeed, SweepVariable::Alpha);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    run_sweep(&mut solver, &sequence(-4.0, 8.0, 2.0), &SweepOptions::foil(), &mut polar, &mut ctx).unwrap();
    assert_eq!(polar.converged().count(), 7);
    for r in polar.converged() {
        assert!((r.cl - r.cl_circulation).abs() < 0.02 + 0.02 * r.cl.abs(), "alpha {}", r.alpha);
    }
}

#[test]
fn rerun_after_reset_is_idempotent() {
    let mut solver = foil_solver(true, 60, 5e5);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    solver.prepare(&mut ctx).unwrap();
    let first = solver.solve_point(3.0, &mut ctx).unwrap();
    solver.reset_state();
    let second = solver.solve_point(3.0, &mut ctx).unwrap();
    assert_eq!(first.converged, second.converged);
    assert!((first.result.cl - second.result.cl).abs() < 1e-12);
    assert!((first.result.cd - second.result.cd).abs() < 1e-12);
    assert!((first.result.cm - second.result.cm).abs() < 1e-12);
}

#[test]
fn one_asymmetric_flap_forces_full_span_solve() {
    let mut elevator = Wing::rectangular("elevator", 0.6, 0.1, "naca0012", 2, 3);
    elevator.flaps.push(WingFlap {
        panel: 0,
        hinge: 0.7,
        right_angle: 5.0,
        left_angle: 0.0,
    });
    let mut plane = Plane::from_wing(main_wing(), 1.0);
    plane.elevator = Some(PlacedWing {
        wing: elevator,
        position: Vec3::new(0.8, 0.0, 0.0),
        tilt: 0.0,
    });

    let mut solver = wing_solver(plane.clone());
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    solver.prepare(&mut ctx).unwrap();
    let r = solver.solve_point(3.0, &mut ctx).unwrap().result;
    assert!(!r.symmetric);
    assert_eq!(r.symmetry_reasons.len(), 1);
    assert!(r.croll.abs() > 1e-6);

    if let Some(e) = plane.elevator.as_mut() {
        e.wing.flaps[0].left_angle = 5.0;
    }
    let mut solver = wing_solver(plane);
    solver.prepare(&mut ctx).unwrap();
    let r = solver.solve_point(3.0, &mut ctx).unwrap().result;
    assert!(r.symmetric);
    assert!(r.croll.abs() < 1e-9);
}

#[test]
fn panel_ceiling_is_checked_before_assembly() {
    let mut solver = wing_solver(Plane::from_wing(Wing::rectangular("dense", 2.0, 0.25, "naca0012", 30, 30), 1.0));
    solver.settings.max_panels = 500;
    let mut polar = Polar::new("dense", PolarType::FixedSpeed, SweepVariable::Alpha);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    let err = run_sweep(&mut solver, &[0.0, 2.0], &SweepOptions::wing(), &mut polar, &mut ctx).unwrap_err();
    assert!(matches!(err, AnalysisError::GeometryInvalid { .. }));
    assert!(polar.is_empty());
}

/// Solves a different plane at each integer target.
struct PlaneSeries {
    solvers: Vec<WingSolver>,
}

impl PointSolver for PlaneSeries {
    type Output = WingResult;

    fn polar_type(&self) -> PolarType {
        PolarType::FixedSpeed
    }

    fn variable(&self) -> SweepVariable {
        SweepVariable::Alpha
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> AnalysisResult<()> {
        self.solvers.iter_mut().try_for_each(|s| s.prepare(ctx))
    }

    fn solve_point(&mut self, target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<WingResult>> {
        self.solvers[target as usize].solve_point(4.0, ctx)
    }

    fn reset_state(&mut self) {
        self.solvers.iter_mut().for_each(|s| s.reset_state());
    }
}

#[test]
fn duplicate_surface_fails_only_its_point() {
    let good = Plane::from_wing(main_wing(), 1.0);
    let mut duplicated = good.clone();
    duplicated.wing2 = Some(PlacedWing::at_origin(main_wing()));

    let mut series = PlaneSeries {
        solvers: vec![wing_solver(good.clone()), wing_solver(duplicated), wing_solver(good)],
    };
    let mut polar = Polar::new("series", PolarType::FixedSpeed, SweepVariable::Alpha);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    let summary = run_sweep(&mut series, &[0.0, 1.0, 2.0], &SweepOptions::wing(), &mut polar, &mut ctx).unwrap();

    assert_eq!(summary.converged, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(polar.points[1].status, PointStatus::Failed(FailureKind::SingularMatrix));
    assert!(polar.points[0].is_converged());
    assert!(polar.points[2].is_converged());
}

/// Requests cancellation when the sweep announces a given point.
struct CancelAt {
    token: CancelToken,
    marker: &'static str,
}

impl ProgressSink for CancelAt {
    fn message(&mut self, line: &str) {
        if line.starts_with("Calculating") && line.contains(self.marker) {
            self.token.cancel();
        }
    }
}

#[test]
fn cancel_keeps_completed_points() {
    let token = CancelToken::new();
    let mut sink = CancelAt {
        token: token.clone(),
        marker: "= 2.0000",
    };
    let mut ctx = RunContext::new(&mut sink, token);
    let mut solver = wing_solver(Plane::from_wing(main_wing(), 1.0));
    let mut polar = Polar::new("cancel", PolarType::FixedSpeed, SweepVariable::Alpha);
    let err = run_sweep(&mut solver, &sequence(0.0, 4.0, 1.0), &SweepOptions::wing(), &mut polar, &mut ctx).unwrap_err();
    assert_eq!(err, AnalysisError::Cancelled);
    assert_eq!(polar.len(), 2);
    assert!(polar.points.iter().all(|p| p.is_converged()));
    assert_eq!(polar.points[1].target, 1.0);
}

#[test]
fn viscous_angle_sweep_scenario() {
    let mut solver = foil_solver(true, 80, 200_000.0);
    let targets = sequence(-4.0, 12.0, 1.0);
    let mut polar = Polar::new("naca0012 Re 200k", PolarType::FixedSpeed, SweepVariable::Alpha);
    let mut sink = NullSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    let summary = run_sweep(&mut solver, &targets, &SweepOptions::foil(), &mut polar, &mut ctx).unwrap();

    assert_eq!(polar.len(), 17);
    assert_eq!(summary.converged + summary.unconverged + summary.skipped + summary.failed, 17);
    // below stall every point converges and lift keeps rising
    let attached: Vec<(f64, f64)> = polar
        .points
        .iter()
        .filter(|p| p.target <= 9.0)
        .map(|p| {
            assert!(p.is_converged(), "alpha {}: {:?} after {} iterations", p.target, p.status, p.iterations);
            let r = p.result.as_ref().unwrap();
            (r.alpha, r.cl)
        })
        .collect();
    assert_eq!(attached.len(), 14);
    assert!(attached.windows(2).all(|w| w[1].1 > w[0].1), "{:?}", attached);
    assert!(summary.converged >= 14, "{:?}", summary);
    assert!(polar.converged().all(|r| r.cd > 0.0));
}

//! Polar sweep driver.
//!
//! Any engine implementing [`PointSolver`] can be swept across a sequence
//! of targets. The driver owns the bookkeeping: classification of each
//! outcome, reset of carried state after a bad point, and the rule that
//! only invalid geometry and cancellation stop the sweep.

use crate::error::{AnalysisError, AnalysisResult, FailureKind};
use crate::polar::{OpPoint, Polar, PointStatus, PolarType, SweepVariable};
use crate::progress::RunContext;
use crate::settings::SweepOptions;

/// Result of one successful engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct PointOutcome<R> {
    /// Engine output for the point
    pub result: R,
    /// False when the iteration cap was hit
    pub converged: bool,
    /// Iterations spent
    pub iterations: usize,
    /// Warnings raised while solving
    pub warnings: Vec<String>,
}

/// An engine that solves one operating point at a time.
pub trait PointSolver {
    /// Result type of one point
    type Output;

    /// How speed and Reynolds number follow the lift.
    fn polar_type(&self) -> PolarType;

    /// Swept variable.
    fn variable(&self) -> SweepVariable;

    /// Checks run once before the first point (geometry, panel ceilings).
    fn prepare(&mut self, ctx: &mut RunContext) -> AnalysisResult<()>;

    /// Solve the point at `target` (interpreted per [`Self::variable`]).
    fn solve_point(&mut self, target: f64, ctx: &mut RunContext) -> AnalysisResult<PointOutcome<Self::Output>>;

    /// Drop carried boundary-layer or wake state.
    fn reset_state(&mut self);
}

/// Counts per status after a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Points that converged
    pub converged: usize,
    /// Points that hit the iteration cap
    pub unconverged: usize,
    /// Points skipped (negative lift, envelope, divergence)
    pub skipped: usize,
    /// Points that failed outright
    pub failed: usize,
}

/// Inclusive sequence from `start` to `end`, stepping by `|step|` in the
/// direction of `end`. The last value is included within 0.1% of a step.
pub fn sequence(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step == 0.0 || !step.is_finite() || (end - start).abs() < f64::EPSILON {
        return vec![start];
    }
    let step = if end < start { -step.abs() } else { step.abs() };
    let count = ((end - start) * 1.001 / step).abs() as usize;
    (0..=count).map(|i| start + i as f64 * step).collect()
}

/// Status recorded for a point that returned `err`.
fn status_for(err: &AnalysisError) -> PointStatus {
    match err.kind() {
        FailureKind::Unconverged => PointStatus::Unconverged,
        kind @ (FailureKind::NegativeLift | FailureKind::OutOfEnvelope | FailureKind::Diverged) => {
            PointStatus::Skipped(kind)
        }
        kind => PointStatus::Failed(kind),
    }
}

/// Column label of the swept variable.
fn label(variable: SweepVariable) -> &'static str {
    match variable {
        SweepVariable::Alpha => "Alpha",
        SweepVariable::Cl => "Cl",
        SweepVariable::Reynolds => "Re",
        SweepVariable::Speed => "QInf",
        SweepVariable::Control => "Control",
    }
}

/// Run `solver` over `targets`, appending one point per target to `polar`.
///
/// Returns `Err` only for `GeometryInvalid` or `Cancelled`; the points
/// completed before the stop stay in `polar` and the in-flight point is
/// discarded.
pub fn run_sweep<S: PointSolver>(
    solver: &mut S,
    targets: &[f64],
    options: &SweepOptions,
    polar: &mut Polar<S::Output>,
    ctx: &mut RunContext,
) -> AnalysisResult<SweepSummary> {
    ctx.log("Launching analysis...");
    solver.prepare(ctx)?;
    solver.reset_state();

    let name = label(solver.variable());
    let mut summary = SweepSummary::default();
    let mut needs_reset = false;

    for (i, &target) in targets.iter().enumerate() {
        if ctx.is_cancelled() {
            ctx.log("Analysis cancelled on user request...");
            return Err(AnalysisError::Cancelled);
        }
        if needs_reset || (i > 0 && options.reset_state_between_points) {
            solver.reset_state();
            needs_reset = false;
        }

        ctx.log(format!("Calculating {} = {:.4}...", name, target));

        let point = match solver.solve_point(target, ctx) {
            Ok(outcome) if outcome.converged => {
                summary.converged += 1;
                log::info!("{} = {:.4}: converged after {} iterations", name, target, outcome.iterations);
                OpPoint {
                    target,
                    status: PointStatus::Converged,
                    iterations: outcome.iterations,
                    warnings: outcome.warnings,
                    result: Some(outcome.result),
                }
            }
            Ok(outcome) => {
                summary.unconverged += 1;
                needs_reset = true;
                log::info!("{} = {:.4}: unconverged after {} iterations", name, target, outcome.iterations);
                OpPoint {
                    target,
                    status: PointStatus::Unconverged,
                    iterations: outcome.iterations,
                    warnings: outcome.warnings,
                    result: options.keep_out_points.then_some(outcome.result),
                }
            }
            Err(err) if err.stops_sweep() => {
                log::warn!("{} = {:.4}: {}; sweep stopped", name, target, err);
                ctx.log(format!("    ...{}", err));
                return Err(err);
            }
            Err(err) => {
                needs_reset = true;
                let status = status_for(&err);
                match status {
                    PointStatus::Unconverged => summary.unconverged += 1,
                    PointStatus::Skipped(_) => summary.skipped += 1,
                    _ => summary.failed += 1,
                }
                log::info!("{} = {:.4}: {}", name, target, err);
                ctx.log(format!("    ...{}", err));
                OpPoint {
                    target,
                    status,
                    iterations: 0,
                    warnings: vec![err.to_string()],
                    result: None,
                }
            }
        };
        polar.push(point);
    }

    ctx.log(if summary.unconverged + summary.skipped + summary.failed > 0 {
        "Analysis completed ...some points are unconverged"
    } else {
        "Analysis completed"
    });
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, CollectSink, NullSink};
    use approx::assert_relative_eq;

    /// Counts resets and fails on chosen targets.
    struct Scripted {
        resets: usize,
        solved: Vec<f64>,
        fail_at: Vec<(f64, AnalysisError)>,
        unconverged_at: Vec<f64>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                resets: 0,
                solved: vec![],
                fail_at: vec![],
                unconverged_at: vec![],
            }
        }
    }

    impl PointSolver for Scripted {
        type Output = f64;

        fn polar_type(&self) -> PolarType {
            PolarType::FixedSpeed
        }

        fn variable(&self) -> SweepVariable {
            SweepVariable::Alpha
        }

        fn prepare(&mut self, _ctx: &mut RunContext) -> AnalysisResult<()> {
            Ok(())
        }

        fn solve_point(&mut self, target: f64, _ctx: &mut RunContext) -> AnalysisResult<PointOutcome<f64>> {
            if let Some((_, e)) = self.fail_at.iter().find(|(t, _)| *t == target) {
                return Err(e.clone());
            }
            self.solved.push(target);
            Ok(PointOutcome {
                result: target * 0.1,
                converged: !self.unconverged_at.contains(&target),
                iterations: 5,
                warnings: vec![],
            })
        }

        fn reset_state(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn test_sequence_inclusive() {
        let s = sequence(-4.0, 12.0, 1.0);
        assert_eq!(s.len(), 17);
        assert_relative_eq!(s[16], 12.0);
        let d = sequence(2.0, 0.0, 0.5);
        assert_eq!(d, vec![2.0, 1.5, 1.0, 0.5, 0.0]);
        assert_eq!(sequence(3.0, 3.0, 1.0), vec![3.0]);
        // 0.1 steps accumulate rounding; the end point must survive
        assert_eq!(sequence(0.0, 1.0, 0.1).len(), 11);
    }

    #[test]
    fn test_failures_do_not_stop_sweep() {
        let mut solver = Scripted::new();
        solver.fail_at.push((1.0, AnalysisError::SingularMatrix { row: 2, pivot: 0.0 }));
        solver.fail_at.push((2.0, AnalysisError::NegativeLift { cl: -0.2 }));
        let mut polar = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let summary = run_sweep(&mut solver, &[0.0, 1.0, 2.0, 3.0], &SweepOptions::foil(), &mut polar, &mut ctx).unwrap();
        assert_eq!(summary.converged, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(polar.points[1].status, PointStatus::Failed(FailureKind::SingularMatrix));
        assert_eq!(polar.points[2].status, PointStatus::Skipped(FailureKind::NegativeLift));
        assert!(polar.points[3].is_converged());
        // initial reset plus one after each bad point
        assert_eq!(solver.resets, 3);
    }

    #[test]
    fn test_geometry_error_stops() {
        let mut solver = Scripted::new();
        solver.fail_at.push((1.0, AnalysisError::geometry("bad")));
        let mut polar = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let err = run_sweep(&mut solver, &[0.0, 1.0, 2.0], &SweepOptions::foil(), &mut polar, &mut ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::GeometryInvalid { .. }));
        assert_eq!(polar.len(), 1);
    }

    #[test]
    fn test_unconverged_data_follows_keep_out_points() {
        let mut solver = Scripted::new();
        solver.unconverged_at.push(1.0);
        let mut polar = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        let opts = SweepOptions {
            keep_out_points: false,
            ..SweepOptions::foil()
        };
        run_sweep(&mut solver, &[0.0, 1.0], &opts, &mut polar, &mut ctx).unwrap();
        assert_eq!(polar.points[1].status, PointStatus::Unconverged);
        assert!(polar.points[1].result.is_none());

        let mut kept = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        run_sweep(&mut solver, &[1.0], &SweepOptions::foil(), &mut kept, &mut ctx).unwrap();
        assert_eq!(kept.points[0].result, Some(0.1));
    }

    #[test]
    fn test_reset_between_points_option() {
        let mut solver = Scripted::new();
        let mut polar = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        let mut sink = CollectSink::default();
        let mut ctx = RunContext::new(&mut sink, CancelToken::new());
        run_sweep(&mut solver, &[0.0, 1.0, 2.0], &SweepOptions::wing(), &mut polar, &mut ctx).unwrap();
        assert_eq!(solver.resets, 3);
        drop(ctx);
        assert!(sink.lines.iter().any(|l| l.starts_with("Calculating Alpha = 2.0000")));
    }

    #[test]
    fn test_cancel_before_start() {
        let mut solver = Scripted::new();
        let mut polar = Polar::new("t", PolarType::FixedSpeed, SweepVariable::Alpha);
        let token = CancelToken::new();
        token.cancel();
        let mut sink = NullSink;
        let mut ctx = RunContext::new(&mut sink, token);
        let err = run_sweep(&mut solver, &[0.0, 1.0], &SweepOptions::foil(), &mut polar, &mut ctx).unwrap_err();
        assert_eq!(err, AnalysisError::Cancelled);
        assert!(polar.is_empty());
    }
}

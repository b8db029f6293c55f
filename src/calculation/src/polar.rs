//! Operating points and the polars that collect them.

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// How the flow condition is tied to the sweep variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PolarType {
    /// Fixed speed or Reynolds number (type 1)
    #[default]
    FixedSpeed,
    /// Lift balances weight: Re√Cl and M√Cl constant (type 2)
    FixedLift,
    /// Re·Cl constant (type 3, 2D only)
    RubberChord,
    /// Fixed angle of attack, speed or Reynolds swept (type 4)
    FixedAngle,
    /// Control deflections proportional to the sweep variable (3D only)
    Control,
}

/// Quantity stepped by the sweep driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SweepVariable {
    /// Angle of attack (degrees)
    #[default]
    Alpha,
    /// Target lift coefficient (2D)
    Cl,
    /// Reynolds number (2D fixed-angle polars)
    Reynolds,
    /// Free-stream speed (3D fixed-angle polars, m/s)
    Speed,
    /// Control variable (3D control polars)
    Control,
}

/// Terminal state of one operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointStatus {
    /// Residual below the tolerance
    Converged,
    /// Iteration cap reached; data kept only when out points are stored
    Unconverged,
    /// Trial condition rejected (negative lift, envelope, breakdown)
    Skipped(FailureKind),
    /// Hard numerical failure of this point
    Failed(FailureKind),
}

impl PointStatus {
    /// True for [`PointStatus::Converged`].
    pub fn is_converged(&self) -> bool {
        matches!(self, PointStatus::Converged)
    }
}

/// Coefficient access shared by the result types of every engine.
pub trait AeroCoefficients {
    /// Angle of attack (degrees)
    fn alpha(&self) -> f64;
    /// Lift coefficient
    fn cl(&self) -> f64;
    /// Drag coefficient
    fn cd(&self) -> f64;
    /// Moment coefficient
    fn cm(&self) -> f64;
    /// Free-stream speed for dimensional results (m/s)
    fn speed(&self) -> Option<f64> {
        None
    }
}

/// One entry of a polar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpPoint<R> {
    /// Value of the sweep variable
    pub target: f64,
    /// How the point ended
    pub status: PointStatus,
    /// Iterations spent on the point
    pub iterations: usize,
    /// Warnings raised while solving it
    pub warnings: Vec<String>,
    /// Full results; absent for failed points
    pub result: Option<R>,
}

impl<R> OpPoint<R> {
    /// True when the point converged.
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// Ordered sequence of operating points sharing one definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polar<R> {
    /// Display name
    pub name: String,
    /// How speed and Reynolds number follow the lift
    pub polar_type: PolarType,
    /// Swept variable
    pub variable: SweepVariable,
    /// Points in sweep order
    pub points: Vec<OpPoint<R>>,
}

impl<R> Polar<R> {
    /// Empty polar.
    pub fn new(name: impl Into<String>, polar_type: PolarType, variable: SweepVariable) -> Self {
        Self {
            name: name.into(),
            polar_type,
            variable,
            points: Vec::new(),
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when there are no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point.
    pub fn push(&mut self, point: OpPoint<R>) {
        self.points.push(point);
    }

    /// Converged points with their results.
    pub fn converged(&self) -> impl Iterator<Item = &R> {
        self.points
            .iter()
            .filter(|p| p.is_converged())
            .filter_map(|p| p.result.as_ref())
    }

    /// Points whose status matches `pred`.
    pub fn count_where(&self, pred: impl Fn(&PointStatus) -> bool) -> usize {
        self.points.iter().filter(|p| pred(&p.status)).count()
    }
}

impl<R: AeroCoefficients> Polar<R> {
    /// (alpha, Cl, Cd, Cm) of the converged points, in sweep order.
    pub fn coefficient_table(&self) -> Vec<[f64; 4]> {
        self.converged()
            .map(|r| [r.alpha(), r.cl(), r.cd(), r.cm()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(f64);

    impl AeroCoefficients for Row {
        fn alpha(&self) -> f64 {
            self.0
        }
        fn cl(&self) -> f64 {
            0.1 * self.0
        }
        fn cd(&self) -> f64 {
            0.01
        }
        fn cm(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_converged_filter() {
        let mut polar = Polar::new("test", PolarType::FixedSpeed, SweepVariable::Alpha);
        polar.push(OpPoint {
            target: 0.0,
            status: PointStatus::Converged,
            iterations: 3,
            warnings: vec![],
            result: Some(Row(0.0)),
        });
        polar.push(OpPoint {
            target: 1.0,
            status: PointStatus::Failed(FailureKind::SingularMatrix),
            iterations: 0,
            warnings: vec![],
            result: None,
        });
        polar.push(OpPoint {
            target: 2.0,
            status: PointStatus::Unconverged,
            iterations: 100,
            warnings: vec![],
            result: Some(Row(2.0)),
        });
        assert_eq!(polar.len(), 3);
        assert_eq!(polar.converged().count(), 1);
        assert_eq!(polar.coefficient_table(), vec![[0.0, 0.0, 0.01, 0.0]]);
        assert_eq!(polar.count_where(|s| matches!(s, PointStatus::Failed(_))), 1);
    }
}

//! Error types shared by every analysis engine.
//!
//! All failures are scoped to a single operating point. The sweep driver in
//! [`crate::sweep`] decides, from [`AnalysisError::stops_sweep`], whether a
//! failure ends the whole polar or only marks the current point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the crate.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failure raised while solving one operating point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Zero or near-zero pivot during the direct solve.
    #[error("singular influence matrix: pivot {pivot:.3e} at row {row}")]
    SingularMatrix {
        /// Elimination row where the pivot vanished
        row: usize,
        /// Magnitude of the rejected pivot
        pivot: f64,
    },

    /// Local speed too large for the Karman-Tsien correction.
    #[error("local speed too large, compressibility correction invalid at node {node} (Mach {mach:.3})")]
    CompressibilityInvalid {
        /// Surface node where the correction broke down
        node: usize,
        /// Free-stream Mach number in use
        mach: f64,
    },

    /// Trial condition produced non-physical lift.
    #[error("negative lift (CL = {cl:.5}) at trial condition")]
    NegativeLift {
        /// Computed lift coefficient
        cl: f64,
    },

    /// Iteration cap reached without meeting the residual tolerance.
    #[error("unconverged after {iterations} iterations (residual {residual:.3e})")]
    Unconverged {
        /// Iterations performed
        iterations: usize,
        /// Last residual
        residual: f64,
    },

    /// Requested condition outside the available section or flight data.
    #[error("outside the polar envelope: {reason}")]
    OutOfEnvelope {
        /// Human-readable reason
        reason: String,
    },

    /// Panel count, panel angle or mesh constraint violated.
    #[error("invalid geometry: {reason}")]
    GeometryInvalid {
        /// Human-readable reason
        reason: String,
    },

    /// Wake panels could not be added to the influence system.
    #[error("failed to add wake contribution: {reason}")]
    WakeContribution {
        /// Human-readable reason
        reason: String,
    },

    /// Non-finite values appeared during an iteration.
    #[error("numerical breakdown at iteration {iteration}: {reason}")]
    Diverged {
        /// Iteration where the breakdown was detected
        iteration: usize,
        /// Human-readable reason
        reason: String,
    },

    /// Cooperative cancellation requested by the caller.
    #[error("analysis cancelled on user request")]
    Cancelled,
}

/// Plain tag for an [`AnalysisError`], stored in operating point records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// [`AnalysisError::SingularMatrix`]
    SingularMatrix,
    /// [`AnalysisError::CompressibilityInvalid`]
    CompressibilityInvalid,
    /// [`AnalysisError::NegativeLift`]
    NegativeLift,
    /// [`AnalysisError::Unconverged`]
    Unconverged,
    /// [`AnalysisError::OutOfEnvelope`]
    OutOfEnvelope,
    /// [`AnalysisError::GeometryInvalid`]
    GeometryInvalid,
    /// [`AnalysisError::WakeContribution`]
    WakeContribution,
    /// [`AnalysisError::Diverged`]
    Diverged,
    /// [`AnalysisError::Cancelled`]
    Cancelled,
}

impl AnalysisError {
    /// Shorthand for a geometry error.
    pub fn geometry(reason: impl Into<String>) -> Self {
        Self::GeometryInvalid { reason: reason.into() }
    }

    /// Shorthand for an out-of-envelope error.
    pub fn out_of_envelope(reason: impl Into<String>) -> Self {
        Self::OutOfEnvelope { reason: reason.into() }
    }

    /// Shorthand for a wake failure.
    pub fn wake(reason: impl Into<String>) -> Self {
        Self::WakeContribution { reason: reason.into() }
    }

    /// Tag of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SingularMatrix { .. } => FailureKind::SingularMatrix,
            Self::CompressibilityInvalid { .. } => FailureKind::CompressibilityInvalid,
            Self::NegativeLift { .. } => FailureKind::NegativeLift,
            Self::Unconverged { .. } => FailureKind::Unconverged,
            Self::OutOfEnvelope { .. } => FailureKind::OutOfEnvelope,
            Self::GeometryInvalid { .. } => FailureKind::GeometryInvalid,
            Self::WakeContribution { .. } => FailureKind::WakeContribution,
            Self::Diverged { .. } => FailureKind::Diverged,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Only invalid geometry and cancellation end a sweep.
    pub fn stops_sweep(&self) -> bool {
        matches!(self, Self::GeometryInvalid { .. } | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_sweep() {
        assert!(AnalysisError::Cancelled.stops_sweep());
        assert!(AnalysisError::geometry("too many panels").stops_sweep());
        assert!(!AnalysisError::SingularMatrix { row: 3, pivot: 0.0 }.stops_sweep());
        assert!(!AnalysisError::NegativeLift { cl: -0.1 }.stops_sweep());
        assert!(!AnalysisError::wake("degenerate").stops_sweep());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            AnalysisError::out_of_envelope("alpha 25").kind(),
            FailureKind::OutOfEnvelope
        );
        assert_eq!(
            AnalysisError::CompressibilityInvalid { node: 1, mach: 0.9 }.kind(),
            FailureKind::CompressibilityInvalid
        );
    }

    #[test]
    fn test_display() {
        let e = AnalysisError::geometry("panel count 700 exceeds 600");
        assert_eq!(e.to_string(), "invalid geometry: panel count 700 exceeds 600");
    }
}

//! Dense linear system kernel shared by the 2D and 3D engines.
//!
//! Influence matrices are small enough (panel counts are capped) that a
//! direct LU factorization is the right tool. The default backend is
//! nalgebra's partial-pivoting LU; `lapack` adds a LAPACK `getrf` backend
//! through ndarray-linalg. Engines talk to the kernel through
//! [`LinearSolver`], so the backend can be swapped without touching
//! assembly code.
//!
//! Rows are equilibrated (scaled to unit max-norm) before factoring, so the
//! singularity test on the U diagonal is independent of the units of each
//! equation.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Dyn, linalg::LU};
use ndarray::{Array1, Array2, ArrayView1};

use crate::constants::limits;
use crate::error::{AnalysisError, AnalysisResult};

/// A factored matrix that can be solved against any number of right-hand sides.
pub trait Factorization: Send + Sync {
    /// Matrix dimension.
    fn dim(&self) -> usize;

    /// Solve A x = b.
    fn solve(&self, b: ArrayView1<f64>) -> AnalysisResult<Array1<f64>>;

    /// Solve A X = B column by column.
    fn solve_many(&self, b: &Array2<f64>) -> AnalysisResult<Array2<f64>> {
        let mut x = Array2::zeros(b.raw_dim());
        for (j, col) in b.columns().into_iter().enumerate() {
            let sol = self.solve(col)?;
            x.column_mut(j).assign(&sol);
        }
        Ok(x)
    }
}

/// Direct solver backend.
pub trait LinearSolver: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Factor `a`, consuming it.
    fn factorize(&self, a: Array2<f64>) -> AnalysisResult<Box<dyn Factorization>>;

    /// Factor and solve once.
    fn solve(&self, a: Array2<f64>, b: ArrayView1<f64>) -> AnalysisResult<Array1<f64>> {
        self.factorize(a)?.solve(b)
    }
}

/// Shared handle to the solver backend held by each engine.
pub type SharedSolver = Arc<dyn LinearSolver>;

/// Default backend.
pub fn default_solver() -> SharedSolver {
    Arc::new(DenseLu::default())
}

/// Reciprocal max-norm of each row, rejecting empty or non-finite rows.
fn row_scales(a: &Array2<f64>) -> AnalysisResult<Vec<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(AnalysisError::geometry(format!(
            "influence matrix is not square ({}x{})",
            n,
            a.ncols()
        )));
    }
    a.rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let m = row.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            if m > 0.0 && m.is_finite() {
                Ok(1.0 / m)
            } else {
                Err(AnalysisError::SingularMatrix { row: i, pivot: m })
            }
        })
        .collect()
}

/// Right-hand side length must match the matrix.
fn check_rhs(b: &ArrayView1<f64>, n: usize) -> AnalysisResult<()> {
    if b.len() != n {
        return Err(AnalysisError::geometry(format!(
            "right-hand side has {} rows, matrix has {}",
            b.len(),
            n
        )));
    }
    Ok(())
}

/// Reject solutions a near-singular pivot blew up.
fn finite(x: Array1<f64>) -> AnalysisResult<Array1<f64>> {
    match x.iter().position(|v| !v.is_finite()) {
        Some(row) => Err(AnalysisError::SingularMatrix { row, pivot: 0.0 }),
        None => Ok(x),
    }
}

/// Partial-pivoting LU (nalgebra) on the row-equilibrated matrix.
#[derive(Debug, Clone, Copy)]
pub struct DenseLu {
    /// U pivots smaller than this fraction of the largest U pivot are rejected
    pub pivot_ratio: f64,
}

impl Default for DenseLu {
    fn default() -> Self {
        Self {
            pivot_ratio: limits::SINGULAR_PIVOT_RATIO,
        }
    }
}

/// nalgebra LU factors with the row scaling applied to the matrix.
pub struct LuFactors {
    /// Factors of the scaled matrix
    lu: LU<f64, Dyn, Dyn>,
    /// Row scale factors, applied to each right-hand side
    scale: Vec<f64>,
}

impl DenseLu {
    /// Equilibrate, factor and check the U diagonal.
    pub fn decompose(&self, a: Array2<f64>) -> AnalysisResult<LuFactors> {
        let scale = row_scales(&a)?;
        let n = scale.len();
        let m = DMatrix::from_fn(n, n, |i, j| a[[i, j]] * scale[i]);
        let lu = m.lu();

        let u = lu.u();
        let diag = u.diagonal();
        let largest = diag.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let threshold = (largest * self.pivot_ratio).max(f64::MIN_POSITIVE);
        if let Some((row, pivot)) = diag
            .iter()
            .map(|v| v.abs())
            .enumerate()
            .find(|(_, v)| !(*v > threshold))
        {
            return Err(AnalysisError::SingularMatrix { row, pivot });
        }
        Ok(LuFactors { lu, scale })
    }
}

impl Factorization for LuFactors {
    fn dim(&self) -> usize {
        self.scale.len()
    }

    fn solve(&self, b: ArrayView1<f64>) -> AnalysisResult<Array1<f64>> {
        let n = self.dim();
        check_rhs(&b, n)?;
        let rhs = DVector::from_iterator(n, b.iter().zip(&self.scale).map(|(v, s)| v * s));
        let x = self
            .lu
            .solve(&rhs)
            .ok_or(AnalysisError::SingularMatrix { row: 0, pivot: 0.0 })?;
        finite(Array1::from_iter(x.iter().copied()))
    }
}

impl LinearSolver for DenseLu {
    fn name(&self) -> &'static str {
        "nalgebra-lu"
    }

    fn factorize(&self, a: Array2<f64>) -> AnalysisResult<Box<dyn Factorization>> {
        Ok(Box::new(self.decompose(a)?))
    }
}

/// LAPACK-backed factorization through ndarray-linalg.
#[cfg(feature = "lapack")]
pub mod lapack {
    use ndarray::{Array1, Array2, ArrayView1, Axis, OwnedRepr};
    use ndarray_linalg::{Factorize, LUFactorized, Solve};

    use super::{Factorization, LinearSolver, check_rhs, finite, row_scales};
    use crate::error::{AnalysisError, AnalysisResult};

    /// `getrf`/`getrs` on the row-equilibrated matrix.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LapackLu;

    /// LAPACK factors with their row scaling.
    struct LapackFactors {
        /// `getrf` output
        lu: LUFactorized<OwnedRepr<f64>>,
        /// Row scale factors
        scale: Array1<f64>,
    }

    impl Factorization for LapackFactors {
        fn dim(&self) -> usize {
            self.scale.len()
        }

        fn solve(&self, b: ArrayView1<f64>) -> AnalysisResult<Array1<f64>> {
            check_rhs(&b, self.dim())?;
            let rhs = &b * &self.scale;
            let x = self
                .lu
                .solve(&rhs)
                .map_err(|_| AnalysisError::SingularMatrix { row: 0, pivot: 0.0 })?;
            finite(x)
        }
    }

    impl LinearSolver for LapackLu {
        fn name(&self) -> &'static str {
            "lapack-getrf"
        }

        fn factorize(&self, mut a: Array2<f64>) -> AnalysisResult<Box<dyn Factorization>> {
            let scale = Array1::from(row_scales(&a)?);
            for (mut row, s) in a.axis_iter_mut(Axis(0)).zip(scale.iter()) {
                row *= *s;
            }
            let lu = a
                .factorize_into()
                .map_err(|_| AnalysisError::SingularMatrix { row: 0, pivot: 0.0 })?;
            Ok(Box::new(LapackFactors { lu, scale }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_solve_3x3() {
        let a = array![[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = array![8.0, -11.0, -3.0];
        let x = DenseLu::default().solve(a, b.view()).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pivoting_required() {
        // zero on the leading diagonal
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let x = DenseLu::default().solve(a, array![3.0, 4.0].view()).unwrap();
        assert_relative_eq!(x[0], 4.0);
        assert_relative_eq!(x[1], 3.0);
    }

    #[test]
    fn test_singular_detected() {
        let a = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]];
        let err = DenseLu::default().factorize(a).err().unwrap();
        assert!(matches!(err, AnalysisError::SingularMatrix { .. }));
    }

    #[test]
    fn test_zero_row_detected() {
        let a = array![[1.0, 2.0], [0.0, 0.0]];
        let err = DenseLu::default().factorize(a).err().unwrap();
        assert_eq!(err, AnalysisError::SingularMatrix { row: 1, pivot: 0.0 });
    }

    #[test]
    fn test_badly_scaled_rows_accepted() {
        // one equation in much larger units than the other: a global
        // max-entry pivot test would reject this well-conditioned system
        let a = array![[1e14, 2e14], [3e-2, -1e-2]];
        let b = array![5e14, 1e-2];
        let x = DenseLu::default().solve(a, b.view()).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_solve_many_matches_single() {
        let a = array![[4.0, 1.0], [2.0, 3.0]];
        let f = DenseLu::default().factorize(a).unwrap();
        let b = array![[1.0, 0.0], [0.0, 1.0]];
        let inv = f.solve_many(&b).unwrap();
        // inverse of [[4,1],[2,3]] = 1/10 [[3,-1],[-2,4]]
        assert_relative_eq!(inv[[0, 0]], 0.3, epsilon = 1e-12);
        assert_relative_eq!(inv[[0, 1]], -0.1, epsilon = 1e-12);
        assert_relative_eq!(inv[[1, 0]], -0.2, epsilon = 1e-12);
        assert_relative_eq!(inv[[1, 1]], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let f = DenseLu::default().factorize(Array2::eye(3)).unwrap();
        assert!(f.solve(array![1.0, 2.0].view()).is_err());
    }

    #[test]
    fn test_non_square_rejected() {
        assert!(DenseLu::default().factorize(Array2::zeros((2, 3))).is_err());
    }
}

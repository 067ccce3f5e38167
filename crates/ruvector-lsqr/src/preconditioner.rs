//! Right preconditioners for LSQR.
//!
//! LSQR with a right preconditioner `P` iterates on `min ||A P y - b||` and
//! recovers `x = P y`. A good `P` makes `A P` well conditioned; the classic
//! choice for tall least-squares problems is `P = R^{-1}`, where `R` is the
//! triangular factor of a QR decomposition of a row sketch `S A`.
//!
//! | Type | `P` | Cost per apply |
//! |------|-----|----------------|
//! | [`IdentityPreconditioner`] | `I` | none |
//! | [`DiagonalPreconditioner`] | `diag(d)` | O(n) |
//! | [`TriangularPreconditioner`] | `R^{-1}` | O(n^2) |
//!
//! Each preconditioner stores its data in, and applies in, a fixed
//! [`Precision`]; vectors handed to `apply` must already be in that
//! precision.

use tracing::debug;

use crate::error::{SolverError, ValidationError};
use crate::operator::LinearOperator;
use crate::precision::Precision;
use crate::traits::{ApplyMode, Preconditioner};
use crate::types::DenseMatrix;
use crate::vector::Vector;

fn check_operand(expected: Precision, n: usize, v: &Vector) -> Result<(), SolverError> {
    if v.precision() != expected {
        return Err(SolverError::PrecisionMismatch {
            expected,
            found: v.precision(),
        });
    }
    if v.len() != n {
        return Err(ValidationError::DimensionMismatch(format!(
            "preconditioner of size {n} applied to a vector of length {}",
            v.len()
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// `P = I`. Only checks the operand precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityPreconditioner {
    precision: Precision,
}

impl IdentityPreconditioner {
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }
}

impl Preconditioner for IdentityPreconditioner {
    fn precision(&self) -> Precision {
        self.precision
    }

    fn apply(&self, _mode: ApplyMode, v: &mut Vector) -> Result<(), SolverError> {
        check_operand(self.precision, v.len(), v)
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

// ---------------------------------------------------------------------------
// Diagonal
// ---------------------------------------------------------------------------

/// `P = diag(d)`; forward and transpose coincide.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalPreconditioner {
    diag: Vector,
}

impl DiagonalPreconditioner {
    /// Build from explicit diagonal entries, rounded into `precision`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NonFiniteValue`] if an entry is NaN or infinite
    /// (before or after rounding).
    pub fn new(precision: Precision, diag: &[f64]) -> Result<Self, SolverError> {
        let diag = Vector::from_f64(precision, diag);
        if let Some(i) = diag.to_f64_vec().iter().position(|d| !d.is_finite()) {
            return Err(ValidationError::NonFiniteValue(format!(
                "diagonal[{i}] is not representable in {precision}"
            ))
            .into());
        }
        Ok(Self { diag })
    }

    /// Column equilibration: `d_j = 1 / ||A e_j||`, or 1 for an empty column.
    pub fn from_column_norms(
        op: &LinearOperator,
        precision: Precision,
    ) -> Result<Self, SolverError> {
        let d: Vec<f64> = op
            .column_norms()
            .into_iter()
            .map(|n| if n > 0.0 { 1.0 / n } else { 1.0 })
            .collect();
        debug!(cols = d.len(), %precision, "built column-scaling preconditioner");
        Self::new(precision, &d)
    }

    /// Diagonal entries widened to `f64`.
    pub fn diagonal(&self) -> Vec<f64> {
        self.diag.to_f64_vec()
    }
}

impl Preconditioner for DiagonalPreconditioner {
    fn precision(&self) -> Precision {
        self.diag.precision()
    }

    fn apply(&self, _mode: ApplyMode, v: &mut Vector) -> Result<(), SolverError> {
        check_operand(self.diag.precision(), self.diag.len(), v)?;
        v.mul_elementwise(&self.diag)
    }

    fn name(&self) -> &'static str {
        "diagonal"
    }
}

// ---------------------------------------------------------------------------
// Triangular (R^{-1})
// ---------------------------------------------------------------------------

/// `P = R^{-1}` for a precomputed upper-triangular `R`.
///
/// Only the upper triangle of the supplied matrix is read. Forward apply is
/// back substitution with `R`, transpose apply is forward substitution with
/// `R^T`. Each solved component is rounded to the preconditioner precision
/// before it feeds the next one, emulating a triangular solve carried out
/// in that precision.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularPreconditioner {
    /// Column-major, values already rounded to `precision`.
    r: DenseMatrix<f64>,
    precision: Precision,
}

impl TriangularPreconditioner {
    /// Build from an upper-triangular factor.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if `r` is not square or is
    /// empty; [`SolverError::DegenerateInput`] if a diagonal entry is zero
    /// (after rounding) or an entry is not finite.
    pub fn new(r: &DenseMatrix<f64>, precision: Precision) -> Result<Self, SolverError> {
        if r.rows != r.cols || r.rows == 0 {
            return Err(ValidationError::DimensionMismatch(format!(
                "triangular factor must be square and non-empty, got {}x{}",
                r.rows, r.cols
            ))
            .into());
        }
        let n = r.rows;
        let mut stored = DenseMatrix::<f64>::zeros(n, n);
        for j in 0..n {
            for i in 0..=j {
                let value = precision.round(r.get(i, j));
                if !value.is_finite() {
                    return Err(SolverError::DegenerateInput {
                        stage: "preconditioner",
                        detail: format!("R[{i}, {j}] = {value} in {precision}"),
                    });
                }
                stored.set(i, j, value);
            }
            if stored.get(j, j) == 0.0 {
                return Err(SolverError::DegenerateInput {
                    stage: "preconditioner",
                    detail: format!("zero diagonal R[{j}, {j}] in {precision}"),
                });
            }
        }
        Ok(Self {
            r: stored,
            precision,
        })
    }

    /// Dimension of `R`.
    #[inline]
    pub fn dim(&self) -> usize {
        self.r.rows
    }

    /// `x = R^{-1} b`.
    fn back_substitute(&self, b: &mut [f64]) {
        let n = self.dim();
        for i in (0..n).rev() {
            let mut s = b[i];
            for j in i + 1..n {
                s -= self.r.get(i, j) * b[j];
            }
            b[i] = self.precision.round(s / self.r.get(i, i));
        }
    }

    /// `x = R^{-T} b`.
    fn forward_substitute(&self, b: &mut [f64]) {
        let n = self.dim();
        for i in 0..n {
            let col = self.r.column(i);
            let s: f64 = b[i] - col[..i].iter().zip(&b[..i]).map(|(r, x)| r * x).sum::<f64>();
            b[i] = self.precision.round(s / col[i]);
        }
    }
}

impl Preconditioner for TriangularPreconditioner {
    fn precision(&self) -> Precision {
        self.precision
    }

    fn apply(&self, mode: ApplyMode, v: &mut Vector) -> Result<(), SolverError> {
        check_operand(self.precision, self.dim(), v)?;
        let mut work = v.to_f64_vec();
        match mode {
            ApplyMode::Forward => self.back_substitute(&mut work),
            ApplyMode::Transpose => self.forward_substitute(&mut work),
        }
        v.copy_from(&Vector::Double(work))
    }

    fn name(&self) -> &'static str {
        "triangular"
    }
}

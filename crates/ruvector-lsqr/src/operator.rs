//! Linear operators over precision-tagged storage.
//!
//! [`LinearOperator`] is a tagged union over {Dense, Sparse} storage in each
//! of the four supported precisions. The variant is resolved once when the
//! operator is built; every product then dispatches through a single match
//! into a generic kernel.
//!
//! Products are strict about their operands: `x` and `y` must be stored in
//! the operator's precision and must have the lengths the orientation
//! requires. Precision conversion is the caller's job (see
//! [`Vector::copy_from`](crate::vector::Vector::copy_from)); the solver
//! workspace does it through explicit shadow buffers.

use half::{bf16, f16};

use crate::error::{SolverError, ValidationError};
use crate::precision::Precision;
use crate::types::{CsrMatrix, DenseMatrix, Op};
use crate::validation::{validate_csr_matrix, validate_dense_matrix};
use crate::vector::{Vector, VectorElement};

/// Dense storage in one of the supported precisions.
#[derive(Debug, Clone, PartialEq)]
pub enum DenseOperator {
    Half(DenseMatrix<f16>),
    BFloat16(DenseMatrix<bf16>),
    Single(DenseMatrix<f32>),
    Double(DenseMatrix<f64>),
}

/// Sparse CSR storage in one of the supported precisions.
#[derive(Debug, Clone, PartialEq)]
pub enum SparseOperator {
    Half(CsrMatrix<f16>),
    BFloat16(CsrMatrix<bf16>),
    Single(CsrMatrix<f32>),
    Double(CsrMatrix<f64>),
}

/// A matrix that can apply itself and its transpose to a [`Vector`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinearOperator {
    Dense(DenseOperator),
    Sparse(SparseOperator),
}

macro_rules! with_matrix {
    ($op:expr, $m:ident => $body:expr) => {
        match $op {
            LinearOperator::Dense(DenseOperator::Half($m)) => $body,
            LinearOperator::Dense(DenseOperator::BFloat16($m)) => $body,
            LinearOperator::Dense(DenseOperator::Single($m)) => $body,
            LinearOperator::Dense(DenseOperator::Double($m)) => $body,
            LinearOperator::Sparse(SparseOperator::Half($m)) => $body,
            LinearOperator::Sparse(SparseOperator::BFloat16($m)) => $body,
            LinearOperator::Sparse(SparseOperator::Single($m)) => $body,
            LinearOperator::Sparse(SparseOperator::Double($m)) => $body,
        }
    };
}

// ---------------------------------------------------------------------------
// Kernel plumbing
// ---------------------------------------------------------------------------

/// Element types that can back a [`LinearOperator`].
pub trait OperatorElement: VectorElement {
    fn wrap_dense(m: DenseMatrix<Self>) -> DenseOperator;
    fn wrap_sparse(m: CsrMatrix<Self>) -> SparseOperator;
}

macro_rules! impl_operator_element {
    ($t:ty, $variant:ident) => {
        impl OperatorElement for $t {
            #[inline]
            fn wrap_dense(m: DenseMatrix<Self>) -> DenseOperator {
                DenseOperator::$variant(m)
            }

            #[inline]
            fn wrap_sparse(m: CsrMatrix<Self>) -> SparseOperator {
                SparseOperator::$variant(m)
            }
        }
    };
}

impl_operator_element!(f16, Half);
impl_operator_element!(bf16, BFloat16);
impl_operator_element!(f32, Single);
impl_operator_element!(f64, Double);

impl<T: OperatorElement> From<CsrMatrix<T>> for LinearOperator {
    fn from(m: CsrMatrix<T>) -> Self {
        LinearOperator::Sparse(T::wrap_sparse(m))
    }
}

impl<T: OperatorElement> From<DenseMatrix<T>> for LinearOperator {
    fn from(m: DenseMatrix<T>) -> Self {
        LinearOperator::Dense(T::wrap_dense(m))
    }
}

/// The storage-specific half of an operator product.
trait Kernel {
    type Elem: OperatorElement;

    fn shape(&self) -> (usize, usize);
    fn stored(&self) -> usize;
    fn gemv_raw(&self, op: Op, alpha: f64, x: &[Self::Elem], beta: f64, y: &mut [Self::Elem]);
    fn recast(&self, precision: Precision) -> LinearOperator;
    fn col_norms(&self) -> Vec<f64>;
    fn check(&self) -> Result<(), ValidationError>;
}

impl<T: OperatorElement> Kernel for CsrMatrix<T> {
    type Elem = T;

    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn stored(&self) -> usize {
        self.nnz()
    }

    fn gemv_raw(&self, op: Op, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        self.gemv(op, alpha, x, beta, y);
    }

    fn recast(&self, precision: Precision) -> LinearOperator {
        match precision {
            Precision::Half => self.cast::<f16>().into(),
            Precision::BFloat16 => self.cast::<bf16>().into(),
            Precision::Single => self.cast::<f32>().into(),
            Precision::Double => self.cast::<f64>().into(),
        }
    }

    fn col_norms(&self) -> Vec<f64> {
        self.column_norms()
    }

    fn check(&self) -> Result<(), ValidationError> {
        validate_csr_matrix(self)
    }
}

impl<T: OperatorElement> Kernel for DenseMatrix<T> {
    type Elem = T;

    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn stored(&self) -> usize {
        self.nnz()
    }

    fn gemv_raw(&self, op: Op, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        self.gemv(op, alpha, x, beta, y);
    }

    fn recast(&self, precision: Precision) -> LinearOperator {
        match precision {
            Precision::Half => self.cast::<f16>().into(),
            Precision::BFloat16 => self.cast::<bf16>().into(),
            Precision::Single => self.cast::<f32>().into(),
            Precision::Double => self.cast::<f64>().into(),
        }
    }

    fn col_norms(&self) -> Vec<f64> {
        self.column_norms()
    }

    fn check(&self) -> Result<(), ValidationError> {
        validate_dense_matrix(self)
    }
}

fn apply_typed<M: Kernel>(
    m: &M,
    op: Op,
    alpha: f64,
    x: &Vector,
    beta: f64,
    y: &mut Vector,
) -> Result<(), SolverError> {
    let (rows, cols) = m.shape();
    let (x_len, y_len) = match op {
        Op::NoTrans => (cols, rows),
        Op::Trans => (rows, cols),
    };
    if x.len() != x_len || y.len() != y_len {
        return Err(ValidationError::DimensionMismatch(format!(
            "{op:?} product of a {rows}x{cols} operator needs x[{x_len}] and y[{y_len}], \
             got x[{}] and y[{}]",
            x.len(),
            y.len()
        ))
        .into());
    }
    let xs = x.as_slice::<M::Elem>()?;
    let ys = y.as_mut_slice::<M::Elem>()?;
    m.gemv_raw(op, alpha, xs, beta, ys);
    Ok(())
}

// ---------------------------------------------------------------------------
// LinearOperator
// ---------------------------------------------------------------------------

impl LinearOperator {
    /// `(rows, cols)`.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        with_matrix!(self, m => m.shape())
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.size().0
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.size().1
    }

    /// Stored entries: the non-zero count for sparse storage, `rows * cols`
    /// for dense storage.
    #[inline]
    pub fn nnz(&self) -> usize {
        with_matrix!(self, m => m.stored())
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self, LinearOperator::Sparse(_))
    }

    /// Storage precision.
    pub fn precision(&self) -> Precision {
        match self {
            LinearOperator::Dense(DenseOperator::Half(_))
            | LinearOperator::Sparse(SparseOperator::Half(_)) => Precision::Half,
            LinearOperator::Dense(DenseOperator::BFloat16(_))
            | LinearOperator::Sparse(SparseOperator::BFloat16(_)) => Precision::BFloat16,
            LinearOperator::Dense(DenseOperator::Single(_))
            | LinearOperator::Sparse(SparseOperator::Single(_)) => Precision::Single,
            LinearOperator::Dense(DenseOperator::Double(_))
            | LinearOperator::Sparse(SparseOperator::Double(_)) => Precision::Double,
        }
    }

    /// `y = alpha * A * x + beta * y`.
    ///
    /// # Errors
    ///
    /// [`SolverError::PrecisionMismatch`] if `x` or `y` is not stored in
    /// [`precision`](Self::precision); [`ValidationError::DimensionMismatch`]
    /// for wrong lengths.
    pub fn apply(
        &self,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &mut Vector,
    ) -> Result<(), SolverError> {
        self.apply_op(Op::NoTrans, alpha, x, beta, y)
    }

    /// `y = alpha * op(A) * x + beta * y`.
    pub fn apply_op(
        &self,
        op: Op,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &mut Vector,
    ) -> Result<(), SolverError> {
        with_matrix!(self, m => apply_typed(m, op, alpha, x, beta, y))
    }

    /// Borrowed view of `A^T`.
    #[inline]
    pub fn transpose(&self) -> Transposed<'_> {
        Transposed { inner: self }
    }

    /// Copy of this operator stored in `precision`, keeping the storage kind.
    pub fn cast(&self, precision: Precision) -> LinearOperator {
        with_matrix!(self, m => m.recast(precision))
    }

    /// Euclidean norm of every column.
    pub fn column_norms(&self) -> Vec<f64> {
        with_matrix!(self, m => m.col_norms())
    }

    /// Structural and finiteness checks on the stored matrix.
    pub fn validate(&self) -> Result<(), ValidationError> {
        with_matrix!(self, m => m.check())
    }
}

/// Transposed view of a [`LinearOperator`].
#[derive(Debug, Clone, Copy)]
pub struct Transposed<'a> {
    inner: &'a LinearOperator,
}

impl<'a> Transposed<'a> {
    /// `(cols, rows)` of the underlying operator.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        let (r, c) = self.inner.size();
        (c, r)
    }

    /// `y = alpha * A^T * x + beta * y`.
    pub fn apply(
        &self,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &mut Vector,
    ) -> Result<(), SolverError> {
        self.inner.apply_op(Op::Trans, alpha, x, beta, y)
    }

    /// The operator this view transposes.
    #[inline]
    pub fn transpose(&self) -> &'a LinearOperator {
        self.inner
    }
}

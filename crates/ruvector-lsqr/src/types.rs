//! Matrix storage and result types for the LSQR solver.
//!
//! Provides [`CsrMatrix`] (compressed sparse row) and [`DenseMatrix`]
//! (column-major) storage, both generic over a storage [`Element`], plus the
//! decision and report types a solve produces.
//!
//! Both matrix types expose a BLAS-style `gemv`:
//! `y = alpha * op(A) * x + beta * y`, where `op` is the identity or the
//! transpose. Row sums accumulate in `f64` and each output element is rounded
//! once into `T`. When `beta == 0` the previous contents of `y` are never
//! read, so uninitialised or non-finite destinations are safe.

use std::time::Duration;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{SolverError, ValidationError};
use crate::precision::Element;

/// Orientation of a matrix product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Op {
    /// `op(A) = A`.
    NoTrans,
    /// `op(A) = A^T`.
    Trans,
}

impl Op {
    /// The opposite orientation.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Op::NoTrans => Op::Trans,
            Op::Trans => Op::NoTrans,
        }
    }
}

/// Combine an accumulated product with the previous destination value.
#[inline]
fn blend<T: Element>(alpha: f64, acc: f64, beta: f64, y: T) -> T {
    if beta == 0.0 {
        T::from_f64(alpha * acc)
    } else {
        T::from_f64(alpha * acc + beta * y.to_f64())
    }
}

// ---------------------------------------------------------------------------
// CsrMatrix<T>
// ---------------------------------------------------------------------------

/// Compressed Sparse Row (CSR) matrix.
///
/// # Layout
///
/// For a matrix with `m` rows and `nnz` non-zeros:
/// - `row_ptr` has length `m + 1`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans indices `row_ptr[i]..row_ptr[i+1]`
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    /// Row pointers: `row_ptr[i]` is the start index in `col_indices`/`values`
    /// for row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices for each non-zero entry.
    pub col_indices: Vec<usize>,
    /// Values for each non-zero entry.
    pub values: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T> CsrMatrix<T> {
    /// Number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Number of stored entries in a specific row.
    #[inline]
    pub fn row_degree(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    /// Iterate over `(col_index, &value)` pairs for the given row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, &T)> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter())
    }
}

impl<T: Element> CsrMatrix<T> {
    /// Build a CSR matrix from COO (coordinate) triplets.
    ///
    /// Entries are sorted by (row, col). Duplicate positions are summed in
    /// `f64` and rounded once.
    ///
    /// # Errors
    ///
    /// [`ValidationError::IndexOutOfBounds`] or
    /// [`ValidationError::DimensionMismatch`] for a coordinate outside the
    /// declared shape.
    pub fn from_coo(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, T)>,
    ) -> Result<Self, SolverError> {
        let mut sorted: Vec<_> = entries.into_iter().collect();
        sorted.sort_unstable_by_key(|(r, c, _)| (*r, *c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut merged: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            if r >= rows {
                return Err(ValidationError::DimensionMismatch(format!(
                    "row index {r} out of bounds (rows={rows})"
                ))
                .into());
            }
            if c >= cols {
                return Err(ValidationError::IndexOutOfBounds {
                    index: c,
                    row: r,
                    cols,
                }
                .into());
            }
            if last == Some((r, c)) {
                if let Some(acc) = merged.last_mut() {
                    *acc += v.to_f64();
                }
                continue;
            }
            row_ptr[r + 1] += 1;
            col_indices.push(c);
            merged.push(v.to_f64());
            last = Some((r, c));
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Ok(Self {
            row_ptr,
            col_indices,
            values: merged.into_iter().map(T::from_f64).collect(),
            rows,
            cols,
        })
    }

    /// Square identity of dimension `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            row_ptr: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![T::from_f64(1.0); n],
            rows: n,
            cols: n,
        }
    }

    /// Copy of this matrix with every value rounded into `U`.
    pub fn cast<U: Element>(&self) -> CsrMatrix<U> {
        CsrMatrix {
            row_ptr: self.row_ptr.clone(),
            col_indices: self.col_indices.clone(),
            values: self.values.iter().map(|v| U::from_f64(v.to_f64())).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Transpose: produces `A^T` in CSR form.
    ///
    /// Two-pass counting sort in O(nnz + rows + cols) time.
    pub fn transpose(&self) -> CsrMatrix<T> {
        let nnz = self.nnz();
        let t_rows = self.cols;

        let mut row_ptr = vec![0usize; t_rows + 1];
        for &c in &self.col_indices {
            row_ptr[c + 1] += 1;
        }
        for i in 1..=t_rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        let mut col_indices = vec![0usize; nnz];
        let mut values = vec![T::default(); nnz];
        let mut cursor = row_ptr.clone();

        for row in 0..self.rows {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let c = self.col_indices[idx];
                let dest = cursor[c];
                col_indices[dest] = row;
                values[dest] = self.values[idx];
                cursor[c] += 1;
            }
        }

        CsrMatrix {
            row_ptr,
            col_indices,
            values,
            rows: t_rows,
            cols: self.rows,
        }
    }

    /// Euclidean norm of every column, accumulated in `f64`.
    pub fn column_norms(&self) -> Vec<f64> {
        let mut sq = vec![0.0f64; self.cols];
        for (&c, v) in self.col_indices.iter().zip(&self.values) {
            let v = v.to_f64();
            sq[c] += v * v;
        }
        sq.into_iter().map(f64::sqrt).collect()
    }

    /// `y = alpha * op(A) * x + beta * y`.
    ///
    /// The transposed product scatters row contributions into an `f64`
    /// accumulator instead of forming `A^T`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `x` and `y` have the lengths `op` requires.
    pub fn gemv(&self, op: Op, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        match op {
            Op::NoTrans => {
                debug_assert!(x.len() >= self.cols, "gemv: x too short for {} cols", self.cols);
                debug_assert!(y.len() >= self.rows, "gemv: y too short for {} rows", self.rows);
                self.gemv_rows(alpha, x, beta, &mut y[..self.rows]);
            }
            Op::Trans => {
                debug_assert!(x.len() >= self.rows, "gemv: x too short for {} rows", self.rows);
                debug_assert!(y.len() >= self.cols, "gemv: y too short for {} cols", self.cols);
                let mut acc = vec![0.0f64; self.cols];
                for (row, xi) in x.iter().take(self.rows).enumerate() {
                    let xi = xi.to_f64();
                    if xi == 0.0 {
                        continue;
                    }
                    for (c, v) in self.row_entries(row) {
                        acc[c] += v.to_f64() * xi;
                    }
                }
                for (yj, a) in y.iter_mut().zip(acc) {
                    *yj = blend(alpha, a, beta, *yj);
                }
            }
        }
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[T]) -> f64 {
        self.row_entries(row)
            .map(|(c, v)| v.to_f64() * x[c].to_f64())
            .sum()
    }

    #[cfg(not(feature = "parallel"))]
    fn gemv_rows(&self, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = blend(alpha, self.row_dot(i, x), beta, *yi);
        }
    }

    #[cfg(feature = "parallel")]
    fn gemv_rows(&self, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            *yi = blend(alpha, self.row_dot(i, x), beta, *yi);
        });
    }
}

// ---------------------------------------------------------------------------
// DenseMatrix<T>
// ---------------------------------------------------------------------------

/// Dense matrix in column-major order.
///
/// Element `(i, j)` lives at `data[i + j * rows]`, so each column is a
/// contiguous slice and the transposed product is a sequence of dot products.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    /// Column-major values, length `rows * cols`.
    pub data: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T: Element> DenseMatrix<T> {
    /// All-zero `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    /// Build from row-major `f64` values, rounding into `T`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if `values.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, values: &[f64]) -> Result<Self, SolverError> {
        if values.len() != rows * cols {
            return Err(ValidationError::DimensionMismatch(format!(
                "expected {} values for a {rows}x{cols} matrix, got {}",
                rows * cols,
                values.len()
            ))
            .into());
        }
        let mut m = Self::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                m.data[i + j * rows] = T::from_f64(values[i * cols + j]);
            }
        }
        Ok(m)
    }

    /// Element `(i, j)` widened to `f64`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i + j * self.rows].to_f64()
    }

    /// Overwrite element `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i + j * self.rows] = T::from_f64(value);
    }

    /// Column `j` as a contiguous slice.
    #[inline]
    pub fn column(&self, j: usize) -> &[T] {
        &self.data[j * self.rows..(j + 1) * self.rows]
    }

    /// Number of stored entries (every entry of a dense matrix).
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Copy of this matrix with every value rounded into `U`.
    pub fn cast<U: Element>(&self) -> DenseMatrix<U> {
        DenseMatrix {
            data: self.data.iter().map(|v| U::from_f64(v.to_f64())).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Euclidean norm of every column.
    pub fn column_norms(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|j| crate::vector::norm2_slice(self.column(j)))
            .collect()
    }

    /// `y = alpha * op(A) * x + beta * y`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `x` and `y` have the lengths `op` requires.
    pub fn gemv(&self, op: Op, alpha: f64, x: &[T], beta: f64, y: &mut [T]) {
        match op {
            Op::NoTrans => {
                debug_assert!(x.len() >= self.cols && y.len() >= self.rows);
                let mut acc = vec![0.0f64; self.rows];
                for (j, xj) in x.iter().take(self.cols).enumerate() {
                    let xj = xj.to_f64();
                    if xj == 0.0 {
                        continue;
                    }
                    for (a, v) in acc.iter_mut().zip(self.column(j)) {
                        *a += v.to_f64() * xj;
                    }
                }
                for (yi, a) in y.iter_mut().zip(acc) {
                    *yi = blend(alpha, a, beta, *yi);
                }
            }
            Op::Trans => {
                debug_assert!(x.len() >= self.rows && y.len() >= self.cols);
                for (j, yj) in y.iter_mut().take(self.cols).enumerate() {
                    let dot: f64 = self
                        .column(j)
                        .iter()
                        .zip(x)
                        .map(|(v, xi)| v.to_f64() * xi.to_f64())
                        .sum();
                    *yj = blend(alpha, dot, beta, *yj);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Solver result types
// ---------------------------------------------------------------------------

/// Outcome of one stopping-policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StoppingDecision {
    /// Keep iterating in the current restart segment.
    Continue,
    /// Relative residual fell below the tolerance.
    Converged,
    /// Residual progress stalled; restart from the current residual.
    Stagnated,
    /// The per-restart iteration cap was reached.
    MaxIterations,
    /// The Krylov subspace is exhausted (a bidiagonalization norm was
    /// exactly zero). The current iterate is the best the segment can do.
    Exhausted,
}

impl StoppingDecision {
    /// `true` for every decision that closes a restart segment.
    #[inline]
    pub fn is_stop(self) -> bool {
        !matches!(self, StoppingDecision::Continue)
    }
}

impl std::fmt::Display for StoppingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoppingDecision::Continue => write!(f, "continue"),
            StoppingDecision::Converged => write!(f, "converged"),
            StoppingDecision::Stagnated => write!(f, "stagnated"),
            StoppingDecision::MaxIterations => write!(f, "max-iterations"),
            StoppingDecision::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Per-iteration convergence snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConvergenceInfo {
    /// Global iteration index (1-based; 0 is the initial check).
    pub iteration: usize,
    /// Restart segment the iteration belongs to.
    pub restart: usize,
    /// Relative residual `||b - A x|| / ||b||` after the iteration.
    pub residual_norm: f64,
}

/// Result of a single [`run`](crate::lsqr::LsqrSolver::run) call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome {
    /// Decision that ended the run.
    pub decision: StoppingDecision,
    /// Iterations performed by this call.
    pub iterations: usize,
    /// Iterations performed by the solver so far, across all runs.
    pub total_iterations: usize,
    /// Restart segments closed so far.
    pub restarts: usize,
    /// Relative residual at the end of the call.
    pub relative_residual: f64,
}

/// Result returned by [`solve`](crate::lsqr::LsqrSolver::solve).
#[derive(Debug, Clone)]
pub struct LsqrReport {
    /// Solution vector, widened to `f64`.
    pub solution: Vec<f64>,
    /// Total iterations across every restart.
    pub iterations: usize,
    /// Restart segments closed.
    pub restarts: usize,
    /// Final relative residual.
    pub relative_residual: f64,
    /// Decision of the last run.
    pub decision: StoppingDecision,
    /// Wall-clock time taken.
    pub wall_time: Duration,
    /// Per-iteration convergence history.
    pub convergence_history: Vec<ConvergenceInfo>,
}

impl LsqrReport {
    /// `true` when the last run converged.
    #[inline]
    pub fn converged(&self) -> bool {
        self.decision == StoppingDecision::Converged
    }
}

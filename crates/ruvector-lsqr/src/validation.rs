//! Input validation for LSQR solves.
//!
//! All validation functions run eagerly before any computation begins, ensuring
//! callers receive clear diagnostics instead of mysterious numerical failures or
//! resource exhaustion. Every public function returns [`ValidationError`] on
//! failure, which converts into [`SolverError::InvalidInput`] via `From`.
//!
//! # Limits
//!
//! | Resource            | Limit         | Constant               |
//! |---------------------|---------------|------------------------|
//! | Rows / columns      | 10,000,000    | [`MAX_NODES`]          |
//! | Sparse nnz          | 100,000,000   | [`MAX_EDGES`]          |
//! | Dense entries       | 67,108,864    | [`MAX_DENSE_ENTRIES`]  |
//! | Iterations/restart  | 1,000,000     | [`MAX_ITERATIONS`]     |
//!
//! [`SolverError::InvalidInput`]: crate::error::SolverError::InvalidInput

use crate::error::ValidationError;
use crate::precision::Element;
use crate::types::{CsrMatrix, DenseMatrix, LsqrReport};
use crate::vector::Vector;

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

/// Maximum number of rows or columns.
pub const MAX_NODES: usize = 10_000_000;

/// Maximum number of stored entries in a sparse operator.
pub const MAX_EDGES: usize = 100_000_000;

/// Maximum number of entries in a dense operator.
pub const MAX_DENSE_ENTRIES: usize = 1 << 26;

/// Maximum per-restart iteration cap.
pub const MAX_ITERATIONS: usize = 1_000_000;

// ---------------------------------------------------------------------------
// Operator validation
// ---------------------------------------------------------------------------

/// Reject empty or oversized operator shapes.
///
/// # Errors
///
/// [`ValidationError::DimensionMismatch`] if `rows` or `cols` is zero,
/// [`ValidationError::MatrixTooLarge`] above [`MAX_NODES`].
pub fn validate_shape(rows: usize, cols: usize) -> Result<(), ValidationError> {
    if rows == 0 || cols == 0 {
        return Err(ValidationError::DimensionMismatch(format!(
            "operator must be non-empty, got {rows}x{cols}"
        )));
    }
    if rows > MAX_NODES || cols > MAX_NODES {
        return Err(ValidationError::MatrixTooLarge {
            rows,
            cols,
            max_dim: MAX_NODES,
        });
    }
    Ok(())
}

/// Validate the structural integrity of a CSR matrix.
///
/// Checks, in order:
///
/// 1. `rows` and `cols` are within [`MAX_NODES`].
/// 2. `nnz` is within [`MAX_EDGES`].
/// 3. `row_ptr` has length `rows + 1`, starts at 0, ends at `nnz`, and is
///    monotonically non-decreasing.
/// 4. `col_indices` and `values` have the same length.
/// 5. Every column index is below `cols` and every value is finite.
/// 6. Column indices are sorted within each row (warn only).
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation found.
pub fn validate_csr_matrix<T: Element>(matrix: &CsrMatrix<T>) -> Result<(), ValidationError> {
    if matrix.rows > MAX_NODES || matrix.cols > MAX_NODES {
        return Err(ValidationError::MatrixTooLarge {
            rows: matrix.rows,
            cols: matrix.cols,
            max_dim: MAX_NODES,
        });
    }

    let nnz = matrix.values.len();
    if nnz > MAX_EDGES {
        return Err(ValidationError::DimensionMismatch(format!(
            "nnz {nnz} exceeds maximum allowed {MAX_EDGES}"
        )));
    }

    if matrix.row_ptr.len() != matrix.rows + 1 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr length {} does not equal rows + 1 = {}",
            matrix.row_ptr.len(),
            matrix.rows + 1,
        )));
    }

    for i in 1..matrix.row_ptr.len() {
        if matrix.row_ptr[i] < matrix.row_ptr[i - 1] {
            return Err(ValidationError::NonMonotonicRowPtrs { position: i });
        }
    }

    if matrix.row_ptr[0] != 0 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr[0] = {} (expected 0)",
            matrix.row_ptr[0],
        )));
    }
    if matrix.row_ptr[matrix.rows] != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "values length {nnz} does not match row_ptr[rows] = {}",
            matrix.row_ptr[matrix.rows],
        )));
    }

    if matrix.col_indices.len() != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "col_indices length {} does not match values length {nnz}",
            matrix.col_indices.len(),
        )));
    }

    for row in 0..matrix.rows {
        let mut prev_col: Option<usize> = None;
        for (col, val) in matrix.row_entries(row) {
            if col >= matrix.cols {
                return Err(ValidationError::IndexOutOfBounds {
                    index: col,
                    row,
                    cols: matrix.cols,
                });
            }

            let val = val.to_f64();
            if !val.is_finite() {
                return Err(ValidationError::NonFiniteValue(format!(
                    "matrix[{row}, {col}] = {val}"
                )));
            }

            if let Some(pc) = prev_col {
                if col < pc {
                    tracing::warn!(
                        row = row,
                        "column indices not sorted within row (col {} follows {})",
                        col,
                        pc,
                    );
                }
            }
            prev_col = Some(col);
        }
    }

    Ok(())
}

/// Validate a dense column-major matrix: storage length and finiteness.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation found.
pub fn validate_dense_matrix<T: Element>(matrix: &DenseMatrix<T>) -> Result<(), ValidationError> {
    let entries = matrix.rows.saturating_mul(matrix.cols);
    if entries > MAX_DENSE_ENTRIES {
        return Err(ValidationError::MatrixTooLarge {
            rows: matrix.rows,
            cols: matrix.cols,
            max_dim: (MAX_DENSE_ENTRIES as f64).sqrt() as usize,
        });
    }
    if matrix.data.len() != entries {
        return Err(ValidationError::DimensionMismatch(format!(
            "dense storage holds {} values, expected {}x{} = {entries}",
            matrix.data.len(),
            matrix.rows,
            matrix.cols,
        )));
    }
    if let Some(pos) = matrix.data.iter().position(|v| !v.to_f64().is_finite()) {
        let (i, j) = (pos % matrix.rows.max(1), pos / matrix.rows.max(1));
        return Err(ValidationError::NonFiniteValue(format!(
            "matrix[{i}, {j}] = {}",
            matrix.data[pos].to_f64()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Vector validation
// ---------------------------------------------------------------------------

/// Validate a named vector's length and finiteness.
///
/// # Errors
///
/// [`ValidationError::DimensionMismatch`] or
/// [`ValidationError::NonFiniteValue`].
pub fn validate_vector(name: &str, v: &Vector, expected_len: usize) -> Result<(), ValidationError> {
    if v.len() != expected_len {
        return Err(ValidationError::DimensionMismatch(format!(
            "{name} length {} does not match expected {expected_len}",
            v.len(),
        )));
    }
    if let Some(i) = v.to_f64_vec().iter().position(|x| !x.is_finite()) {
        return Err(ValidationError::NonFiniteValue(format!(
            "{name}[{i}] = {}",
            v.get(i).unwrap_or(f64::NAN)
        )));
    }
    Ok(())
}

/// Validate a right-hand-side vector for a least-squares solve.
///
/// Same checks as [`validate_vector`]; additionally emits a
/// [`tracing::warn`] if every entry is zero (valid, but the solution is
/// trivially zero).
///
/// # Errors
///
/// Returns [`ValidationError`] on dimension mismatch or non-finite values.
pub fn validate_rhs(rhs: &Vector, expected_len: usize) -> Result<(), ValidationError> {
    validate_vector("rhs", rhs, expected_len)?;
    if !rhs.is_empty() && rhs.norm2() == 0.0 {
        tracing::warn!("rhs vector is all zeros; solution will be trivially zero");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter validation
// ---------------------------------------------------------------------------

/// Validate convergence parameters.
///
/// # Rules
///
/// - `tolerance` must be finite and in `(0.0, 1.0]`.
/// - `max_iterations` must be in `[1, MAX_ITERATIONS]`.
///
/// # Errors
///
/// Returns [`ValidationError::ParameterOutOfRange`] if either parameter is
/// outside its valid range.
pub fn validate_params(tolerance: f64, max_iterations: usize) -> Result<(), ValidationError> {
    if !tolerance.is_finite() || tolerance <= 0.0 || tolerance > 1.0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "tolerance".into(),
            value: format!("{tolerance:.2e}"),
            expected: "(0.0, 1.0]".into(),
        });
    }

    if max_iterations == 0 || max_iterations > MAX_ITERATIONS {
        return Err(ValidationError::ParameterOutOfRange {
            name: "max_iterations".into(),
            value: max_iterations.to_string(),
            expected: format!("[1, {MAX_ITERATIONS}]"),
        });
    }

    Ok(())
}

/// Validate the restart and stagnation parameters.
///
/// # Rules
///
/// - `stagnation_tolerance` must be finite and non-negative (0 disables
///   stagnation detection).
/// - `stagnation_window` must be at least 2.
/// - `max_restarts` must be at least 1.
///
/// # Errors
///
/// Returns [`ValidationError::ParameterOutOfRange`] on the first violation.
pub fn validate_restart_params(
    stagnation_tolerance: f64,
    stagnation_window: usize,
    max_restarts: usize,
) -> Result<(), ValidationError> {
    if !stagnation_tolerance.is_finite() || stagnation_tolerance < 0.0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "stagnation_tolerance".into(),
            value: format!("{stagnation_tolerance:.2e}"),
            expected: "finite, >= 0".into(),
        });
    }
    if stagnation_window < 2 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "stagnation_window".into(),
            value: stagnation_window.to_string(),
            expected: ">= 2".into(),
        });
    }
    if max_restarts == 0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "max_restarts".into(),
            value: "0".into(),
            expected: ">= 1".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output validation (post-solve)
// ---------------------------------------------------------------------------

/// Validate a report after a solve completes.
///
/// Catches silent numerical corruption: every solution entry and the final
/// relative residual must be finite.
///
/// # Errors
///
/// Returns [`ValidationError::NonFiniteValue`] if the output is corrupted.
pub fn validate_output(report: &LsqrReport) -> Result<(), ValidationError> {
    if let Some(i) = report.solution.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::NonFiniteValue(format!(
            "solution[{i}] = {}",
            report.solution[i]
        )));
    }
    if !report.relative_residual.is_finite() {
        return Err(ValidationError::NonFiniteValue(format!(
            "relative residual = {}",
            report.relative_residual
        )));
    }
    Ok(())
}

//! Error types for the LSQR crate.
//!
//! Setup errors (bad dimensions, unsupported precision combinations) are
//! raised before any arithmetic happens. Numerical breakdown during a run is
//! surfaced as an error instead of letting NaN or infinity flow into the
//! solution. All errors implement `std::error::Error` via `thiserror`.

use crate::precision::Precision;

/// Primary error type for solver operations.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// A zero or non-finite norm made the bidiagonalization undefined.
    #[error("degenerate input during {stage}: {detail}")]
    DegenerateInput {
        /// Which phase hit the degenerate norm (e.g. "initialize").
        stage: &'static str,
        /// Human-readable explanation.
        detail: String,
    },

    /// A numerical instability was detected (NaN, Inf, or a zero pivot).
    #[error("numerical instability at iteration {iteration}: {detail}")]
    NumericalInstability {
        /// Global iteration at which the instability was detected.
        iteration: usize,
        /// Human-readable explanation.
        detail: String,
    },

    /// The requested precision slots cannot be combined.
    #[error("unsupported precision configuration: {0}")]
    PrecisionConfiguration(String),

    /// A kernel received a buffer in a different precision than its operand.
    #[error("precision mismatch: expected {expected}, found {found}")]
    PrecisionMismatch {
        /// Precision the kernel operates in.
        expected: Precision,
        /// Precision of the offending buffer.
        found: Precision,
    },

    /// A shadow buffer was requested for a slot that does not allocate one.
    #[error("buffer '{0}' is not configured for this precision layout")]
    BufferNotConfigured(&'static str),

    /// The caller supplied invalid input (dimensions, parameters, etc.).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

/// Validation errors for solver inputs.
///
/// These are raised eagerly before any computation begins so that callers get
/// clear diagnostics rather than mysterious numerical failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Dimensions are inconsistent (zero-sized operator, vector length, ...).
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value detected: {0}")]
    NonFiniteValue(String),

    /// A column index is out of bounds for the declared number of columns.
    #[error("column index {index} out of bounds for {cols} columns (row {row})")]
    IndexOutOfBounds {
        /// Offending column index.
        index: usize,
        /// Row containing the offending entry.
        row: usize,
        /// Declared column count.
        cols: usize,
    },

    /// The `row_ptr` array is not monotonically non-decreasing.
    #[error("row_ptr is not monotonically non-decreasing at position {position}")]
    NonMonotonicRowPtrs {
        /// Position in `row_ptr` where the violation was detected.
        position: usize,
    },

    /// A parameter is outside its valid range.
    #[error("parameter out of range: {name} = {value} (expected {expected})")]
    ParameterOutOfRange {
        /// Name of the parameter.
        name: String,
        /// The invalid value (as a string for flexibility).
        value: String,
        /// Human-readable description of the valid range.
        expected: String,
    },

    /// Operator size exceeds the implementation limit.
    #[error("operator size {rows}x{cols} exceeds maximum supported {max_dim}x{max_dim}")]
    MatrixTooLarge {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
        /// Maximum supported dimension.
        max_dim: usize,
    },
}

//! Per-solve mutable state of the LSQR iteration.
//!
//! A [`Workspace`] owns every buffer and scalar one logical solve mutates.
//! It is sized once from the operator and the [`PrecisionConfig`] and lives
//! across all restart segments of the solve.
//!
//! # Buffer layout
//!
//! | Buffer | Length | Precision | Allocated |
//! |--------|--------|-----------|-----------|
//! | `u` | rows | solve | always |
//! | `v`, `w`, `temp` | cols | solve | always |
//! | operator copy | - | solve | iff solve != refine |
//! | `u_in` | rows | internal | iff internal != solve |
//! | `v_in`, `temp_in` + operator copy | cols | internal | iff internal != solve |
//! | `v_apply` | cols | precond_apply | iff precond_apply != solve |
//! | `temp_refine` | cols | refine | always |
//! | `true_sol`, `noisy_sol`, `true_error` | cols | refine | when diagnostics are supplied |
//!
//! Shadow accessors fail with [`SolverError::BufferNotConfigured`] when the
//! slot was not allocated, so a layout bug surfaces at the first use rather
//! than as a silent precision change.

use tracing::debug;

use crate::error::SolverError;
use crate::operator::LinearOperator;
use crate::precision::{Precision, PrecisionConfig};
use crate::traits::{ApplyMode, Preconditioner};
use crate::types::Op;
use crate::validation::{validate_shape, validate_vector};
use crate::vector::Vector;

/// Column-sized shadow used as the destination of a transposed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnSlot {
    V,
    Temp,
}

/// Internal-precision copies used for the two operator products per step.
#[derive(Debug, Clone)]
pub(crate) struct InternalShadow {
    pub(crate) op: LinearOperator,
    pub(crate) u_in: Vector,
    pub(crate) v_in: Vector,
    pub(crate) temp_in: Vector,
}

impl InternalShadow {
    /// `y = alpha * A x + beta * y` with `x` (cols) routed through `temp_in`
    /// and `y` (rows) through `u_in`.
    pub(crate) fn forward(
        &mut self,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &mut Vector,
    ) -> Result<(), SolverError> {
        self.temp_in.copy_from(x)?;
        if beta != 0.0 {
            self.u_in.copy_from(y)?;
        }
        self.op.apply(alpha, &self.temp_in, beta, &mut self.u_in)?;
        y.copy_from(&self.u_in)
    }

    /// `y = alpha * A^T x + beta * y` with `x` (rows) routed through `u_in`
    /// and `y` (cols) through the chosen column shadow.
    pub(crate) fn adjoint(
        &mut self,
        alpha: f64,
        x: &Vector,
        beta: f64,
        y: &mut Vector,
        slot: ColumnSlot,
    ) -> Result<(), SolverError> {
        self.u_in.copy_from(x)?;
        let y_in = match slot {
            ColumnSlot::V => &mut self.v_in,
            ColumnSlot::Temp => &mut self.temp_in,
        };
        if beta != 0.0 {
            y_in.copy_from(y)?;
        }
        self.op.transpose().apply(alpha, &self.u_in, beta, y_in)?;
        y.copy_from(y_in)
    }
}

/// Caller-supplied reference solutions, copied into refine precision.
#[derive(Debug, Clone)]
pub(crate) struct Diagnostics {
    pub(crate) true_sol: Option<Vector>,
    pub(crate) noisy_sol: Option<Vector>,
    /// Scratch for `sol - reference`.
    pub(crate) true_error: Vector,
}

/// Mutable state of one LSQR solve.
#[derive(Debug, Clone)]
pub struct Workspace {
    precision: PrecisionConfig,
    rows: usize,
    cols: usize,
    nnz: usize,

    pub(crate) u: Vector,
    pub(crate) v: Vector,
    pub(crate) w: Vector,
    pub(crate) temp: Vector,
    pub(crate) op_solve: Option<LinearOperator>,
    pub(crate) internal: Option<InternalShadow>,
    pub(crate) v_apply: Option<Vector>,
    pub(crate) temp_refine: Vector,
    pub(crate) diagnostics: Option<Diagnostics>,

    /// Bidiagonalization norm of the latest `v`.
    pub alpha: f64,
    /// Bidiagonalization norm of the latest `u`.
    pub beta: f64,
    /// Givens recurrence state.
    pub rho_bar: f64,
    /// Givens recurrence state; estimates the residual of the current segment.
    pub phi_bar: f64,
    /// Relative residual of the latest check.
    pub resnorm: f64,
    /// Relative residual of the check before that.
    pub resnorm_previous: f64,
    /// `||b||` of the original right-hand side.
    pub rhsnorm: f64,
    /// Iterations across every restart.
    pub completed_iterations: usize,
    /// Iterations in the current restart segment.
    pub completed_iterations_per_restart: usize,
    /// Restart segments closed.
    pub completed_restarts: usize,
    /// `true` while the current restart segment is open.
    pub new_restart_active: bool,
    /// Set by a step that met an exact-zero bidiagonalization norm.
    pub(crate) breakdown: bool,
}

impl Workspace {
    /// Allocate the workspace for `op`, which must already be stored in the
    /// refine precision.
    ///
    /// # Errors
    ///
    /// - [`SolverError::PrecisionConfiguration`] if `precision` breaks the
    ///   slot rules.
    /// - [`SolverError::PrecisionConfiguration`] if an operator entry does
    ///   not fit the solve or internal precision.
    /// - [`SolverError::PrecisionMismatch`] if `op` is not in the refine
    ///   precision.
    /// - [`SolverError::InvalidInput`] if the operator has a zero dimension.
    pub fn new(op: &LinearOperator, precision: PrecisionConfig) -> Result<Self, SolverError> {
        precision.validate()?;
        if op.precision() != precision.refine {
            return Err(SolverError::PrecisionMismatch {
                expected: precision.refine,
                found: op.precision(),
            });
        }
        let (rows, cols) = op.size();
        validate_shape(rows, cols)?;

        let op_solve = (precision.solve != precision.refine)
            .then(|| cast_operator(op, precision.solve, "solve"))
            .transpose()?;
        let internal = precision
            .has_internal_shadow()
            .then(|| -> Result<InternalShadow, SolverError> {
                Ok(InternalShadow {
                    op: cast_operator(op, precision.internal, "internal")?,
                    u_in: Vector::zeros(precision.internal, rows),
                    v_in: Vector::zeros(precision.internal, cols),
                    temp_in: Vector::zeros(precision.internal, cols),
                })
            })
            .transpose()?;
        let v_apply = precision
            .has_apply_shadow()
            .then(|| Vector::zeros(precision.precond_apply, cols));

        debug!(
            rows,
            cols,
            nnz = op.nnz(),
            sparse = op.is_sparse(),
            %precision,
            "allocated LSQR workspace"
        );

        Ok(Self {
            precision,
            rows,
            cols,
            nnz: op.nnz(),
            u: Vector::zeros(precision.solve, rows),
            v: Vector::zeros(precision.solve, cols),
            w: Vector::zeros(precision.solve, cols),
            temp: Vector::zeros(precision.solve, cols),
            op_solve,
            internal,
            v_apply,
            temp_refine: Vector::zeros(precision.refine, cols),
            diagnostics: None,
            alpha: 0.0,
            beta: 0.0,
            rho_bar: 0.0,
            phi_bar: 0.0,
            resnorm: f64::INFINITY,
            resnorm_previous: f64::INFINITY,
            rhsnorm: 0.0,
            completed_iterations: 0,
            completed_iterations_per_restart: 0,
            completed_restarts: 0,
            new_restart_active: false,
            breakdown: false,
        })
    }

    /// Attach reference solutions for error diagnostics. Either may be
    /// absent; the matching diagnostics are then skipped.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidInput`] if a reference has the wrong length or
    /// a non-finite entry.
    pub fn with_diagnostics(
        mut self,
        true_sol: Option<&Vector>,
        noisy_sol: Option<&Vector>,
    ) -> Result<Self, SolverError> {
        if true_sol.is_none() && noisy_sol.is_none() {
            self.diagnostics = None;
            return Ok(self);
        }
        let refine = self.precision.refine;
        let copy = |name: &str, v: Option<&Vector>| -> Result<Option<Vector>, SolverError> {
            match v {
                Some(v) => {
                    validate_vector(name, v, self.cols)?;
                    Ok(Some(v.cast(refine)))
                }
                None => Ok(None),
            }
        };
        let true_sol = copy("true_sol", true_sol)?;
        let noisy_sol = copy("noisy_sol", noisy_sol)?;
        self.diagnostics = Some(Diagnostics {
            true_sol,
            noisy_sol,
            true_error: Vector::zeros(refine, self.cols),
        });
        Ok(self)
    }

    #[inline]
    pub fn precision(&self) -> PrecisionConfig {
        self.precision
    }

    /// `(rows, cols)` of the operator.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Left bidiagonalization vector (rows, solve precision).
    pub fn u(&self) -> &Vector {
        &self.u
    }

    /// Right bidiagonalization vector (cols, solve precision).
    pub fn v(&self) -> &Vector {
        &self.v
    }

    /// Search direction (cols, solve precision).
    pub fn w(&self) -> &Vector {
        &self.w
    }

    #[inline]
    pub fn has_internal_shadow(&self) -> bool {
        self.internal.is_some()
    }

    #[inline]
    pub fn has_apply_shadow(&self) -> bool {
        self.v_apply.is_some()
    }

    /// `true` when the recurrence runs on its own solve-precision operator
    /// copy.
    #[inline]
    pub fn has_solve_operator(&self) -> bool {
        self.op_solve.is_some()
    }

    #[inline]
    pub fn has_diagnostics(&self) -> bool {
        self.diagnostics.is_some()
    }

    fn shadow(&self) -> Result<&InternalShadow, SolverError> {
        self.internal
            .as_ref()
            .ok_or(SolverError::BufferNotConfigured("internal shadow"))
    }

    /// Internal-precision shadow of `u`.
    pub fn u_in(&self) -> Result<&Vector, SolverError> {
        self.shadow().map(|s| &s.u_in)
    }

    /// Internal-precision shadow of `v`.
    pub fn v_in(&self) -> Result<&Vector, SolverError> {
        self.shadow().map(|s| &s.v_in)
    }

    /// Internal-precision shadow of `temp`.
    pub fn temp_in(&self) -> Result<&Vector, SolverError> {
        self.shadow().map(|s| &s.temp_in)
    }

    /// Internal-precision operator copy.
    pub fn internal_operator(&self) -> Result<&LinearOperator, SolverError> {
        self.shadow().map(|s| &s.op)
    }

    /// Preconditioner-precision shadow.
    pub fn v_apply(&self) -> Result<&Vector, SolverError> {
        self.v_apply
            .as_ref()
            .ok_or(SolverError::BufferNotConfigured("v_apply"))
    }

    /// Bytes held by vector buffers and operator copies (structure indices
    /// excluded).
    pub fn footprint_bytes(&self) -> usize {
        let vec_bytes = |v: &Vector| v.len() * v.precision().bytes();
        let op_bytes = |op: &LinearOperator| op.nnz() * op.precision().bytes();
        let mut total = [&self.u, &self.v, &self.w, &self.temp, &self.temp_refine]
            .iter()
            .map(|v| vec_bytes(v))
            .sum::<usize>();
        total += self.op_solve.as_ref().map_or(0, op_bytes);
        if let Some(s) = &self.internal {
            total += op_bytes(&s.op);
            total += vec_bytes(&s.u_in) + vec_bytes(&s.v_in) + vec_bytes(&s.temp_in);
        }
        total += self.v_apply.as_ref().map_or(0, vec_bytes);
        total
    }

    /// Close the current restart segment.
    pub(crate) fn close_segment(&mut self) {
        self.new_restart_active = false;
        self.completed_restarts += 1;
        self.completed_iterations_per_restart = 0;
        self.breakdown = false;
    }
}

/// Copy `op` into `precision`, rejecting copies whose entries overflowed.
fn cast_operator(
    op: &LinearOperator,
    precision: Precision,
    slot: &str,
) -> Result<LinearOperator, SolverError> {
    let copy = op.cast(precision);
    copy.validate().map_err(|e| {
        SolverError::PrecisionConfiguration(format!(
            "operator does not fit the {slot} precision {precision}: {e}"
        ))
    })?;
    Ok(copy)
}

/// Apply the preconditioner to a solve-precision vector, routing through
/// `v_apply` when the preconditioner has its own precision.
pub(crate) fn apply_precond(
    precond: &dyn Preconditioner,
    v_apply: Option<&mut Vector>,
    mode: ApplyMode,
    x: &mut Vector,
) -> Result<(), SolverError> {
    match v_apply {
        Some(shadow) => {
            shadow.copy_from(x)?;
            precond.apply(mode, shadow)?;
            x.copy_from(shadow)
        }
        None => precond.apply(mode, x),
    }
}

/// `y = alpha * op(A) x + beta * y` on solve-precision vectors, routed through
/// the internal shadow when one exists.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_operator(
    op_solve: &LinearOperator,
    internal: Option<&mut InternalShadow>,
    orient: Op,
    alpha: f64,
    x: &Vector,
    beta: f64,
    y: &mut Vector,
    slot: ColumnSlot,
) -> Result<(), SolverError> {
    match (internal, orient) {
        (Some(s), Op::NoTrans) => s.forward(alpha, x, beta, y),
        (Some(s), Op::Trans) => s.adjoint(alpha, x, beta, y, slot),
        (None, _) => op_solve.apply_op(orient, alpha, x, beta, y),
    }
}

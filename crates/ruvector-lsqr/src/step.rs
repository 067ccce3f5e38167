//! The LSQR recurrence: initialization and the two per-iteration steps.
//!
//! With a right preconditioner `P` the Golub-Kahan process runs on `A P`:
//!
//! ```text
//! init:    beta u = b            alpha v = P^T A^T u          w = v
//! step_1:  beta u = A P v - alpha u
//!          alpha v = P^T A^T u - beta v
//! step_2:  Givens rotation on (rho_bar, beta), x += (phi / rho) P w,
//!          w = v - (theta / rho) w
//! ```
//!
//! The recurrence vectors live in the solve precision. Operator products go
//! through the internal-precision shadow when one is configured, and the
//! preconditioner through its own shadow. The solution update in `step_2`
//! is carried out in the refine precision.
//!
//! An exact-zero `beta` or `alpha` in `step_1` means the Krylov subspace is
//! exhausted: normalization is skipped, the workspace is flagged, and the
//! stopping policy closes the segment after the pending `step_2` update.

use tracing::trace;

use crate::error::SolverError;
use crate::operator::LinearOperator;
use crate::traits::{ApplyMode, Preconditioner};
use crate::types::Op;
use crate::vector::Vector;
use crate::workspace::{apply_operator, apply_precond, ColumnSlot, Workspace};

fn require_finite(value: f64, what: &str, iteration: usize) -> Result<f64, SolverError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SolverError::NumericalInstability {
            iteration,
            detail: format!("{what} = {value}"),
        })
    }
}

/// Start a segment from `rhs` (the current residual, refine precision).
///
/// Resets `alpha`, `beta`, `rho_bar`, `phi_bar` and the breakdown flag.
///
/// # Errors
///
/// - [`SolverError::DegenerateInput`] if `||rhs||` is zero, or if
///   `P^T A^T u` vanishes (the right-hand side is orthogonal to the range
///   of `A P`).
/// - [`SolverError::NumericalInstability`] if either norm is NaN or
///   infinite.
pub fn initialize(
    ws: &mut Workspace,
    op: &LinearOperator,
    precond: &dyn Preconditioner,
    rhs: &Vector,
) -> Result<(), SolverError> {
    let Workspace {
        u,
        v,
        w,
        op_solve,
        internal,
        v_apply,
        alpha,
        beta,
        rho_bar,
        phi_bar,
        breakdown,
        ..
    } = ws;
    let a = op_solve.as_ref().unwrap_or(op);

    u.copy_from(rhs)?;
    *beta = require_finite(u.norm2(), "||b||", 0)?;
    if *beta == 0.0 {
        return Err(SolverError::DegenerateInput {
            stage: "initialize",
            detail: format!("||b|| = {beta}"),
        });
    }
    u.scale(1.0 / *beta);

    apply_operator(a, internal.as_mut(), Op::Trans, 1.0, u, 0.0, v, ColumnSlot::V)?;
    apply_precond(precond, v_apply.as_mut(), ApplyMode::Transpose, v)?;

    *alpha = require_finite(v.norm2(), "||P^T A^T u||", 0)?;
    if *alpha == 0.0 {
        return Err(SolverError::DegenerateInput {
            stage: "initialize",
            detail: format!("||P^T A^T u|| = {alpha}; rhs is orthogonal to range(A P)"),
        });
    }
    v.scale(1.0 / *alpha);
    w.copy_from(v)?;

    *phi_bar = *beta;
    *rho_bar = *alpha;
    *breakdown = false;
    trace!(alpha = *alpha, beta = *beta, "LSQR initialized");
    Ok(())
}

/// One bidiagonalization step: refresh `u`, `beta`, `v`, `alpha`.
///
/// `iteration` is the global index of the step, used in error reports.
///
/// # Errors
///
/// [`SolverError::NumericalInstability`] if a norm is NaN or infinite.
pub fn step_1(
    ws: &mut Workspace,
    op: &LinearOperator,
    precond: &dyn Preconditioner,
    iteration: usize,
) -> Result<(), SolverError> {
    let Workspace {
        u,
        v,
        temp,
        op_solve,
        internal,
        v_apply,
        alpha,
        beta,
        breakdown,
        ..
    } = ws;
    let a = op_solve.as_ref().unwrap_or(op);

    // u <- A P v - alpha u
    u.scale(*alpha);
    temp.copy_from(v)?;
    apply_precond(precond, v_apply.as_mut(), ApplyMode::Forward, temp)?;
    apply_operator(a, internal.as_mut(), Op::NoTrans, 1.0, temp, -1.0, u, ColumnSlot::Temp)?;

    *beta = require_finite(u.norm2(), "beta", iteration)?;
    if *beta > 0.0 {
        u.scale(1.0 / *beta);
    } else {
        *breakdown = true;
    }

    // v <- P^T A^T u - beta v
    apply_operator(a, internal.as_mut(), Op::Trans, 1.0, u, 0.0, temp, ColumnSlot::Temp)?;
    apply_precond(precond, v_apply.as_mut(), ApplyMode::Transpose, temp)?;
    temp.axpy(-*beta, v)?;

    *alpha = require_finite(temp.norm2(), "alpha", iteration)?;
    if *alpha > 0.0 {
        temp.scale(1.0 / *alpha);
    } else {
        *breakdown = true;
    }
    v.copy_from(temp)?;
    Ok(())
}

/// Givens update and solution accumulation: `sol += (phi / rho) P w`.
///
/// # Errors
///
/// [`SolverError::NumericalInstability`] if `rho` is zero or non-finite.
pub fn step_2(
    ws: &mut Workspace,
    precond: &dyn Preconditioner,
    sol: &mut Vector,
    iteration: usize,
) -> Result<(), SolverError> {
    let Workspace {
        v,
        w,
        temp,
        v_apply,
        temp_refine,
        alpha,
        beta,
        rho_bar,
        phi_bar,
        ..
    } = ws;

    let rho = require_finite(rho_bar.hypot(*beta), "rho", iteration)?;
    if rho == 0.0 {
        return Err(SolverError::NumericalInstability {
            iteration,
            detail: "rho = 0 (rho_bar and beta both vanished)".into(),
        });
    }
    let c = *rho_bar / rho;
    let s = *beta / rho;
    let theta = s * *alpha;
    *rho_bar = -c * *alpha;
    let phi = c * *phi_bar;
    *phi_bar = s * *phi_bar;

    // temp_refine <- P w
    match v_apply.as_mut() {
        Some(shadow) => {
            shadow.copy_from(w)?;
            precond.apply(ApplyMode::Forward, shadow)?;
            temp_refine.copy_from(shadow)?;
        }
        None => {
            temp.copy_from(w)?;
            precond.apply(ApplyMode::Forward, temp)?;
            temp_refine.copy_from(temp)?;
        }
    }
    sol.axpy(phi / rho, temp_refine)?;
    w.axpby(1.0, v, -theta / rho)?;

    trace!(iteration, rho, phi_bar = *phi_bar, "LSQR step");
    Ok(())
}

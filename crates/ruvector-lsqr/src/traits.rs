//! Extension seams of the solver.
//!
//! The LSQR driver is written against three traits:
//!
//! - [`Preconditioner`] - right preconditioner `P`, applied forward and
//!   transposed, in its own precision.
//! - [`SolveLogger`] - receives the per-iteration histories and the final
//!   iteration count.
//! - [`StagnationIndex`] - turns the sequence of relative residuals into a
//!   progress-rate measure that the stopping policy compares against the
//!   stagnation tolerance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::events::SolverEvent;
use crate::precision::Precision;
use crate::vector::Vector;

/// Direction in which a preconditioner is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyMode {
    /// `v <- P v`.
    Forward,
    /// `v <- P^T v`.
    Transpose,
}

/// A right preconditioner for `min ||A P y - b||`, with `x = P y`.
///
/// Implementations are shared read-only across a solve: `apply` may mutate
/// only the vector it is handed.
pub trait Preconditioner: fmt::Debug + Send + Sync {
    /// Precision the preconditioner stores its data in and applies in.
    fn precision(&self) -> Precision;

    /// Apply `P` or `P^T` to `v` in place.
    ///
    /// # Errors
    ///
    /// [`SolverError::PrecisionMismatch`] if `v` is not stored in
    /// [`precision`](Self::precision), or a dimension error for a wrong
    /// length.
    fn apply(&self, mode: ApplyMode, v: &mut Vector) -> Result<(), SolverError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str {
        "preconditioner"
    }
}

/// Sink for the structured history of a solve.
///
/// Iteration indices are global (they keep counting across restarts); index
/// 0 is the check performed before the first iteration.
pub trait SolveLogger {
    /// Relative residual `||b - A x|| / ||b||` at `iter`.
    fn set_relres_history(&mut self, iter: usize, value: f64);

    /// `||x - x_true|| / ||x_true||` at `iter`.
    fn set_true_error_history(&mut self, iter: usize, value: f64);

    /// Distance to the noisy reference at `iter`.
    fn set_noisy_error_history(&mut self, iter: usize, value: f64);

    /// Cosine similarities of `x` to the true and noisy references.
    fn set_similarity_history(&mut self, iter: usize, sim_true: f64, sim_noisy: f64);

    /// Stagnation index at `iter`.
    fn set_stagnation_history(&mut self, iter: usize, value: f64);

    /// Total completed iterations, published when a run finishes.
    fn set_completed_iterations(&mut self, count: usize);

    /// Whether true-error diagnostics should be computed.
    fn record_true_error(&self) -> bool;

    /// Whether noisy-error diagnostics should be computed.
    fn record_noisy_error(&self) -> bool;

    /// Whether the stagnation index should be recorded.
    fn record_stagnation(&self) -> bool;

    /// Observe a lifecycle event. Ignored by default.
    fn record_event(&mut self, _event: &SolverEvent) {}
}

/// Progress-rate detector over the relative-residual sequence.
///
/// The stopping policy feeds every measured relative residual through
/// [`observe`](Self::observe) and then reads [`index`](Self::index). The
/// driver calls [`reset`](Self::reset) at each restart boundary.
pub trait StagnationIndex: fmt::Debug + Send {
    /// Record the relative residual of the latest check.
    fn observe(&mut self, relative_residual: f64);

    /// Current progress rate. Larger means faster progress; `f64::INFINITY`
    /// means not enough samples to judge.
    fn index(&self) -> f64;

    /// Forget all samples.
    fn reset(&mut self);
}

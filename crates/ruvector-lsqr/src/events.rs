//! Lifecycle events emitted by the LSQR driver.
//!
//! Events go to [`SolveLogger::record_event`](crate::traits::SolveLogger::record_event)
//! as they happen, giving a caller the run's shape (when segments open and
//! close, and why) without parsing trace output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::precision::PrecisionConfig;
use crate::types::StoppingDecision;

/// Events emitted during a run.
///
/// Events are tagged with `#[serde(tag = "type")]` so they serialise as
/// `{ "type": "RunStarted", ... }` for easy ingestion into event stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SolverEvent {
    /// A call to `run` began.
    RunStarted {
        /// Index of the restart segment this run will open.
        restart: usize,
        /// Operator shape.
        rows: usize,
        cols: usize,
        /// Stored operator entries.
        nnz: usize,
        /// Precision slots of the solve.
        precision: PrecisionConfig,
    },

    /// The current solution already met a stopping criterion; no segment was
    /// opened.
    InitiallySatisfied {
        /// Decision reported by the initial check.
        decision: StoppingDecision,
        /// Relative residual of the current solution.
        relative_residual: f64,
    },

    /// One bidiagonalization + update step completed.
    IterationCompleted {
        /// Global iteration number (1-based).
        iteration: usize,
        /// Relative residual after the step.
        residual: f64,
        /// Wall time elapsed since the run began.
        elapsed: Duration,
    },

    /// A restart segment was closed.
    SegmentClosed {
        /// Index of the segment that closed.
        restart: usize,
        /// Decision that closed it.
        decision: StoppingDecision,
        /// Iterations performed in the segment.
        iterations: usize,
        /// Relative residual at close.
        relative_residual: f64,
    },
}

//! In-memory [`SolveLogger`] implementations.

use crate::events::SolverEvent;
use crate::traits::SolveLogger;

/// Store `value` at `iter`, padding skipped iterations with NaN.
fn put(history: &mut Vec<f64>, iter: usize, value: f64) {
    if history.len() <= iter {
        history.resize(iter + 1, f64::NAN);
    }
    history[iter] = value;
}

/// Records every history a solve produces, indexed by global iteration.
///
/// Histories are dense vectors; an index the solver never wrote (for
/// example a stagnation entry for an inactive segment) holds NaN.
#[derive(Debug, Clone, Default)]
pub struct HistoryLogger {
    record_true_error: bool,
    record_noisy_error: bool,
    record_stagnation: bool,
    relres: Vec<f64>,
    true_error: Vec<f64>,
    noisy_error: Vec<f64>,
    similarity: Vec<(f64, f64)>,
    stagnation: Vec<f64>,
    completed_iterations: usize,
    events: Vec<SolverEvent>,
}

impl HistoryLogger {
    /// Logger that records residuals only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable true-error diagnostics.
    pub fn with_true_error(mut self) -> Self {
        self.record_true_error = true;
        self
    }

    /// Enable noisy-error and similarity diagnostics.
    pub fn with_noisy_error(mut self) -> Self {
        self.record_noisy_error = true;
        self
    }

    /// Enable stagnation-index recording.
    pub fn with_stagnation(mut self) -> Self {
        self.record_stagnation = true;
        self
    }

    pub fn relres_history(&self) -> &[f64] {
        &self.relres
    }

    pub fn true_error_history(&self) -> &[f64] {
        &self.true_error
    }

    pub fn noisy_error_history(&self) -> &[f64] {
        &self.noisy_error
    }

    /// `(similarity to true, similarity to noisy)` per iteration.
    pub fn similarity_history(&self) -> &[(f64, f64)] {
        &self.similarity
    }

    pub fn stagnation_history(&self) -> &[f64] {
        &self.stagnation
    }

    /// Value last published by the driver.
    pub fn completed_iterations(&self) -> usize {
        self.completed_iterations
    }

    pub fn events(&self) -> &[SolverEvent] {
        &self.events
    }
}

impl SolveLogger for HistoryLogger {
    fn set_relres_history(&mut self, iter: usize, value: f64) {
        put(&mut self.relres, iter, value);
    }

    fn set_true_error_history(&mut self, iter: usize, value: f64) {
        put(&mut self.true_error, iter, value);
    }

    fn set_noisy_error_history(&mut self, iter: usize, value: f64) {
        put(&mut self.noisy_error, iter, value);
    }

    fn set_similarity_history(&mut self, iter: usize, sim_true: f64, sim_noisy: f64) {
        if self.similarity.len() <= iter {
            self.similarity.resize(iter + 1, (f64::NAN, f64::NAN));
        }
        self.similarity[iter] = (sim_true, sim_noisy);
    }

    fn set_stagnation_history(&mut self, iter: usize, value: f64) {
        put(&mut self.stagnation, iter, value);
    }

    fn set_completed_iterations(&mut self, count: usize) {
        self.completed_iterations = count;
    }

    fn record_true_error(&self) -> bool {
        self.record_true_error
    }

    fn record_noisy_error(&self) -> bool {
        self.record_noisy_error
    }

    fn record_stagnation(&self) -> bool {
        self.record_stagnation
    }

    fn record_event(&mut self, event: &SolverEvent) {
        self.events.push(event.clone());
    }
}

/// Discards everything. Useful for benchmarks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl SolveLogger for NullLogger {
    fn set_relres_history(&mut self, _iter: usize, _value: f64) {}
    fn set_true_error_history(&mut self, _iter: usize, _value: f64) {}
    fn set_noisy_error_history(&mut self, _iter: usize, _value: f64) {}
    fn set_similarity_history(&mut self, _iter: usize, _sim_true: f64, _sim_noisy: f64) {}
    fn set_stagnation_history(&mut self, _iter: usize, _value: f64) {}
    fn set_completed_iterations(&mut self, _count: usize) {}

    fn record_true_error(&self) -> bool {
        false
    }

    fn record_noisy_error(&self) -> bool {
        false
    }

    fn record_stagnation(&self) -> bool {
        false
    }
}

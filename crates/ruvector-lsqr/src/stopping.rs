//! Stopping policy: residual measurement, diagnostics and stagnation.
//!
//! After every step the policy recomputes `res = b - A x` explicitly in the
//! refine precision (never propagated incrementally), records the relative
//! residual and any requested diagnostics, and decides whether the current
//! restart segment goes on.
//!
//! Decisions are checked in a fixed order: converged, stagnated, per-restart
//! cap reached, Krylov subspace exhausted, otherwise continue.

use std::collections::VecDeque;

use tracing::{trace, warn};

use crate::config::LsqrConfig;
use crate::error::SolverError;
use crate::operator::LinearOperator;
use crate::traits::{SolveLogger, StagnationIndex};
use crate::types::StoppingDecision;
use crate::vector::Vector;
use crate::workspace::{Diagnostics, Workspace};

// ---------------------------------------------------------------------------
// Default stagnation index
// ---------------------------------------------------------------------------

/// Mean decrease of the relative residual per iteration over a sliding
/// window.
///
/// With samples `r_0 .. r_k` (at most `window` of them, newest last) the
/// index is `max(0, (r_0 - r_k) / k)`. A growing residual reads as zero
/// progress. Fewer than two samples give `f64::INFINITY`.
#[derive(Debug, Clone)]
pub struct WindowedProgress {
    window: usize,
    samples: VecDeque<f64>,
}

impl WindowedProgress {
    /// Window of `window` samples; values below 2 are raised to 2.
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }
}

impl StagnationIndex for WindowedProgress {
    fn observe(&mut self, relative_residual: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(relative_residual);
    }

    fn index(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => {
                ((first - last) / (self.samples.len() - 1) as f64).max(0.0)
            }
            _ => f64::INFINITY,
        }
    }

    fn reset(&mut self) {
        self.samples.clear();
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Evaluates the stopping criteria after each step.
#[derive(Debug)]
pub struct StoppingPolicy {
    tolerance: f64,
    iterations: usize,
    min_iterations: usize,
    stagnation_tolerance: f64,
    index: Box<dyn StagnationIndex>,
}

impl StoppingPolicy {
    /// Policy with the configured tolerances and a [`WindowedProgress`]
    /// index over `config.stagnation_window()` samples.
    pub fn from_config(config: &LsqrConfig) -> Self {
        Self {
            tolerance: config.tolerance(),
            iterations: config.iterations(),
            min_iterations: config.min_iterations(),
            stagnation_tolerance: config.stagnation_tolerance(),
            index: Box::new(WindowedProgress::new(config.stagnation_window())),
        }
    }

    /// Replace the stagnation index.
    pub fn with_index(mut self, index: Box<dyn StagnationIndex>) -> Self {
        self.index = index;
        self
    }

    /// Forget the stagnation samples; called at each restart boundary.
    pub fn reset(&mut self) {
        self.index.reset();
    }

    /// Measure the current solution and decide.
    ///
    /// `op`, `rhs`, `sol` and `res` must all be in the refine precision.
    /// On return `res` holds `rhs - op * sol` and `ws.resnorm` its norm
    /// relative to `ws.rhsnorm` (absolute when `rhsnorm` is zero).
    ///
    /// # Errors
    ///
    /// [`SolverError::NumericalInstability`] if the residual is not finite,
    /// or a kernel error if the buffers disagree in precision or length.
    pub fn check(
        &mut self,
        ws: &mut Workspace,
        op: &LinearOperator,
        rhs: &Vector,
        sol: &Vector,
        res: &mut Vector,
        logger: &mut dyn SolveLogger,
    ) -> Result<StoppingDecision, SolverError> {
        let iter = ws.completed_iterations;

        res.copy_from(rhs)?;
        op.apply(-1.0, sol, 1.0, res)?;

        let scale = if ws.rhsnorm > 0.0 { ws.rhsnorm } else { 1.0 };
        ws.resnorm_previous = ws.resnorm;
        ws.resnorm = res.norm2() / scale;
        if !ws.resnorm.is_finite() {
            return Err(SolverError::NumericalInstability {
                iteration: iter,
                detail: format!("relative residual = {}", ws.resnorm),
            });
        }
        logger.set_relres_history(iter, ws.resnorm);

        if let Some(diag) = ws.diagnostics.as_mut() {
            record_diagnostics(diag, sol, iter, logger)?;
        }

        self.index.observe(ws.resnorm);
        let progress = self.index.index() / ws.resnorm_previous;
        if ws.new_restart_active && logger.record_stagnation() {
            logger.set_stagnation_history(iter, progress);
        }
        let stagnates = progress < self.stagnation_tolerance
            && ws.new_restart_active
            && ws.completed_iterations_per_restart >= self.min_iterations;

        let decision = if ws.resnorm < self.tolerance {
            StoppingDecision::Converged
        } else if stagnates {
            warn!(
                iteration = iter,
                resnorm = ws.resnorm,
                progress,
                "LSQR stagnated; closing restart segment"
            );
            StoppingDecision::Stagnated
        } else if ws.completed_iterations_per_restart >= self.iterations {
            StoppingDecision::MaxIterations
        } else if ws.breakdown && ws.new_restart_active {
            StoppingDecision::Exhausted
        } else {
            StoppingDecision::Continue
        };

        trace!(iteration = iter, resnorm = ws.resnorm, %decision, "stopping check");
        Ok(decision)
    }
}

/// `||a - b||`, using `scratch` for the difference.
fn distance(scratch: &mut Vector, a: &Vector, b: &Vector) -> Result<f64, SolverError> {
    scratch.copy_from(a)?;
    scratch.axpy(-1.0, b)?;
    Ok(scratch.norm2())
}

/// Cosine similarity; 0 when either vector is zero.
fn cosine(a: &Vector, b: &Vector) -> Result<f64, SolverError> {
    let denom = a.norm2() * b.norm2();
    if denom > 0.0 {
        Ok(a.dot(b)? / denom)
    } else {
        Ok(0.0)
    }
}

#[inline]
fn nonzero(norm: f64) -> f64 {
    if norm > 0.0 {
        norm
    } else {
        1.0
    }
}

fn record_diagnostics(
    diag: &mut Diagnostics,
    sol: &Vector,
    iter: usize,
    logger: &mut dyn SolveLogger,
) -> Result<(), SolverError> {
    let Diagnostics {
        true_sol,
        noisy_sol,
        true_error,
    } = diag;

    match (true_sol.as_ref(), noisy_sol.as_ref()) {
        (Some(t), noisy) => {
            let t_norm = nonzero(t.norm2());
            if logger.record_true_error() {
                let err = distance(true_error, sol, t)? / t_norm;
                logger.set_true_error_history(iter, err);
            }
            if let Some(n) = noisy {
                if logger.record_noisy_error() {
                    let err = distance(true_error, sol, n)? / t_norm;
                    logger.set_noisy_error_history(iter, err);
                    logger.set_similarity_history(iter, cosine(t, sol)?, cosine(sol, n)?);
                }
            }
        }
        (None, Some(n)) => {
            if logger.record_noisy_error() {
                let err = distance(true_error, sol, n)? / nonzero(n.norm2());
                logger.set_noisy_error_history(iter, err);
            }
        }
        (None, None) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::HistoryLogger;
    use crate::precision::{Precision, PrecisionConfig};
    use crate::types::CsrMatrix;
    use approx::assert_relative_eq;

    /// Index that always reports zero progress.
    #[derive(Debug)]
    struct Stalled;

    impl StagnationIndex for Stalled {
        fn observe(&mut self, _relative_residual: f64) {}
        fn index(&self) -> f64 {
            0.0
        }
        fn reset(&mut self) {}
    }

    fn setup(b: &[f64]) -> (LinearOperator, Workspace, Vector, Vector, Vector) {
        let a: LinearOperator = CsrMatrix::<f64>::identity(b.len()).into();
        let mut ws = Workspace::new(&a, PrecisionConfig::default()).unwrap();
        let rhs = Vector::from_f64(Precision::Double, b);
        ws.rhsnorm = rhs.norm2();
        let sol = Vector::zeros(Precision::Double, b.len());
        let res = rhs.clone();
        (a, ws, rhs, sol, res)
    }

    #[test]
    fn windowed_progress() {
        let mut w = WindowedProgress::new(3);
        assert_eq!(w.index(), f64::INFINITY);
        w.observe(1.0);
        assert_eq!(w.index(), f64::INFINITY);
        w.observe(0.5);
        w.observe(0.25);
        assert_relative_eq!(w.index(), 0.375);
        w.observe(0.125);
        // window now [0.5, 0.25, 0.125]
        assert_relative_eq!(w.index(), 0.1875);
        w.observe(0.5);
        assert_eq!(w.index(), 0.0);
        w.reset();
        assert_eq!(w.index(), f64::INFINITY);
        assert_eq!(WindowedProgress::new(0).window(), 2);
    }

    #[test]
    fn initial_check_records_index_zero() {
        let (a, mut ws, rhs, sol, mut res) = setup(&[1.0, 2.0, 2.0]);
        let mut policy = StoppingPolicy::from_config(&LsqrConfig::default());
        let mut log = HistoryLogger::new();
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::Continue);
        assert_eq!(ws.resnorm, 1.0);
        assert_eq!(ws.resnorm_previous, f64::INFINITY);
        assert_eq!(log.relres_history(), &[1.0]);
        assert_eq!(res, rhs);
    }

    #[test]
    fn exact_solution_converges() {
        let (a, mut ws, rhs, _, mut res) = setup(&[1.0, 2.0, 2.0]);
        let sol = rhs.clone();
        let mut policy = StoppingPolicy::from_config(&LsqrConfig::default());
        let d = policy
            .check(&mut ws, &a, &rhs, &sol, &mut res, &mut HistoryLogger::new())
            .unwrap();
        assert_eq!(d, StoppingDecision::Converged);
        assert_eq!(ws.resnorm, 0.0);
    }

    #[test]
    fn zero_rhs_uses_absolute_residual() {
        let (a, mut ws, rhs, sol, mut res) = setup(&[0.0, 0.0]);
        assert_eq!(ws.rhsnorm, 0.0);
        let mut policy = StoppingPolicy::from_config(&LsqrConfig::default());
        let d = policy
            .check(&mut ws, &a, &rhs, &sol, &mut res, &mut HistoryLogger::new())
            .unwrap();
        assert_eq!(d, StoppingDecision::Converged);
    }

    #[test]
    fn stagnation_needs_active_segment_and_min_iterations() {
        let (a, mut ws, rhs, sol, mut res) = setup(&[1.0, 2.0, 2.0]);
        let config = LsqrConfig::default().with_min_iterations(3);
        let mut policy = StoppingPolicy::from_config(&config).with_index(Box::new(Stalled));
        let mut log = HistoryLogger::new().with_stagnation();

        // Inactive segment: never stagnates, history untouched.
        ws.completed_iterations_per_restart = 10;
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::Continue);
        assert!(log.stagnation_history().is_empty());

        ws.new_restart_active = true;
        ws.completed_iterations_per_restart = 2;
        ws.completed_iterations = 2;
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::Continue);
        assert_eq!(log.stagnation_history()[2], 0.0);

        ws.completed_iterations_per_restart = 3;
        ws.completed_iterations = 3;
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::Stagnated);
    }

    #[test]
    fn cap_then_breakdown() {
        let (a, mut ws, rhs, sol, mut res) = setup(&[1.0, 2.0, 2.0]);
        let config = LsqrConfig::new(1e-10, 4).with_stagnation_tolerance(0.0);
        let mut policy = StoppingPolicy::from_config(&config);
        let mut log = HistoryLogger::new();
        ws.new_restart_active = true;

        ws.breakdown = true;
        ws.completed_iterations_per_restart = 4;
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::MaxIterations);

        ws.completed_iterations_per_restart = 1;
        let d = policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(d, StoppingDecision::Exhausted);
    }

    #[test]
    fn diagnostics_against_true_and_noisy() {
        let (a, ws, rhs, _, mut res) = setup(&[3.0, 4.0]);
        let truth = Vector::from_f64(Precision::Double, &[3.0, 4.0]);
        let noisy = Vector::from_f64(Precision::Double, &[3.0, 0.0]);
        let mut ws = ws.with_diagnostics(Some(&truth), Some(&noisy)).unwrap();
        let sol = Vector::from_f64(Precision::Double, &[3.0, 4.0]);
        let mut policy = StoppingPolicy::from_config(&LsqrConfig::default());
        let mut log = HistoryLogger::new().with_true_error().with_noisy_error();

        policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert_eq!(log.true_error_history(), &[0.0]);
        // ||sol - noisy|| / ||true|| = 4 / 5
        assert_relative_eq!(log.noisy_error_history()[0], 0.8);
        let (sim_true, sim_noisy) = log.similarity_history()[0];
        assert_relative_eq!(sim_true, 1.0);
        assert_relative_eq!(sim_noisy, 0.6);
    }

    #[test]
    fn noisy_only_normalizes_by_noisy() {
        let (a, ws, rhs, sol, mut res) = setup(&[3.0, 4.0]);
        let noisy = Vector::from_f64(Precision::Double, &[0.0, 2.0]);
        let mut ws = ws.with_diagnostics(None, Some(&noisy)).unwrap();
        let mut policy = StoppingPolicy::from_config(&LsqrConfig::default());
        let mut log = HistoryLogger::new().with_true_error().with_noisy_error();

        policy.check(&mut ws, &a, &rhs, &sol, &mut res, &mut log).unwrap();
        assert!(log.true_error_history().is_empty());
        assert!(log.similarity_history().is_empty());
        assert_relative_eq!(log.noisy_error_history()[0], 1.0);
    }
}

//! Restarted, mixed-precision LSQR driver.
//!
//! [`LsqrSolver::run`] performs one restart segment:
//!
//! ```text
//! CHECK_INITIAL --satisfied--> DONE
//!      |
//!      | open segment, initialize from the residual
//!      v
//!  ITERATING --(step_1, step_2, check) != Continue--> close segment --> DONE
//! ```
//!
//! Each call closes at most one segment. [`LsqrSolver::solve`] repeats
//! `run` until the solution converges or `max_restarts` runs have been made,
//! restarting the Krylov process from the current residual every time.
//!
//! # Example
//!
//! ```
//! use ruvector_lsqr::config::LsqrConfig;
//! use ruvector_lsqr::logger::HistoryLogger;
//! use ruvector_lsqr::lsqr::LsqrSolver;
//! use ruvector_lsqr::precision::Precision;
//! use ruvector_lsqr::types::CsrMatrix;
//! use ruvector_lsqr::vector::Vector;
//!
//! // Overdetermined 3x2 system with exact solution [1, 2].
//! let a = CsrMatrix::<f64>::from_coo(3, 2, vec![
//!     (0, 0, 1.0), (1, 1, 1.0), (2, 0, 1.0), (2, 1, 1.0),
//! ]).unwrap();
//! let b = Vector::from_f64(Precision::Double, &[1.0, 2.0, 3.0]);
//!
//! let mut solver = LsqrSolver::new(LsqrConfig::default(), a.into(), &b).unwrap();
//! let report = solver.solve(&mut HistoryLogger::new()).unwrap();
//! assert!(report.converged());
//! assert!((report.solution[1] - 2.0).abs() < 1e-8);
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::config::LsqrConfig;
use crate::error::SolverError;
use crate::events::SolverEvent;
use crate::operator::LinearOperator;
use crate::step;
use crate::stopping::StoppingPolicy;
use crate::traits::{Preconditioner, SolveLogger, StagnationIndex};
use crate::types::{ConvergenceInfo, LsqrReport, RunOutcome, StoppingDecision};
use crate::validation::{validate_output, validate_rhs, validate_vector};
use crate::vector::Vector;
use crate::workspace::Workspace;

/// Phase of a single [`LsqrSolver::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CheckInitial,
    Iterating,
    Done(StoppingDecision),
}

/// LSQR solver for `min ||A x - b||` with restarts and mixed precision.
///
/// The solver owns the refine-precision operator, right-hand side,
/// solution and residual, together with the [`Workspace`] that persists
/// across restart segments.
#[derive(Debug)]
pub struct LsqrSolver {
    config: LsqrConfig,
    op: LinearOperator,
    rhs: Vector,
    sol: Vector,
    res: Vector,
    ws: Workspace,
    precond: Arc<dyn Preconditioner>,
    policy: StoppingPolicy,
    history: Vec<ConvergenceInfo>,
}

impl LsqrSolver {
    /// Set up a solve. The operator and `rhs` are converted to the refine
    /// precision if needed; the solution starts at zero.
    ///
    /// # Errors
    ///
    /// - [`SolverError::InvalidInput`] for out-of-range parameters, a
    ///   malformed operator, or an `rhs` of the wrong length.
    /// - [`SolverError::PrecisionConfiguration`] for an unsupported precision
    ///   layout, or an operator entry that overflows the solve or internal
    ///   precision.
    pub fn new(
        config: LsqrConfig,
        operator: LinearOperator,
        rhs: &Vector,
    ) -> Result<Self, SolverError> {
        config.validate()?;
        operator.validate()?;

        let precision = config.precision();
        let op = if operator.precision() == precision.refine {
            operator
        } else {
            operator.cast(precision.refine)
        };
        let (rows, cols) = op.size();
        validate_rhs(rhs, rows)?;
        let rhs = rhs.cast(precision.refine);

        let mut ws = Workspace::new(&op, precision)?;
        ws.rhsnorm = rhs.norm2();

        debug!(
            rows,
            cols,
            nnz = op.nnz(),
            tolerance = config.tolerance(),
            iterations = config.iterations(),
            precond = config.precond().name(),
            "LSQR solver configured"
        );

        Ok(Self {
            precond: config.precond(),
            policy: StoppingPolicy::from_config(&config),
            sol: Vector::zeros(precision.refine, cols),
            res: rhs.clone(),
            history: Vec::new(),
            config,
            op,
            rhs,
            ws,
        })
    }

    /// Start from `x0` instead of zero.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidInput`] if `x0` has the wrong length or a
    /// non-finite entry.
    pub fn with_initial_solution(mut self, x0: &Vector) -> Result<Self, SolverError> {
        validate_vector("initial solution", x0, self.op.cols())?;
        self.sol = x0.cast(self.config.precision().refine);
        Ok(self)
    }

    /// Track the error against a known true solution and/or a noisy
    /// reference. Either may be `None`.
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
        self.ws = self.ws.with_diagnostics(true_sol, noisy_sol)?;
        Ok(self)
    }

    /// Replace the default [`WindowedProgress`](crate::stopping::WindowedProgress)
    /// stagnation index.
    pub fn with_stagnation_index(mut self, index: Box<dyn StagnationIndex>) -> Self {
        self.policy = self.policy.with_index(index);
        self
    }

    #[inline]
    pub fn config(&self) -> &LsqrConfig {
        &self.config
    }

    /// Current solution (refine precision).
    #[inline]
    pub fn solution(&self) -> &Vector {
        &self.sol
    }

    /// Residual `b - A x` from the latest check (refine precision).
    #[inline]
    pub fn residual(&self) -> &Vector {
        &self.res
    }

    #[inline]
    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    /// Per-iteration history accumulated across every run.
    #[inline]
    pub fn convergence_history(&self) -> &[ConvergenceInfo] {
        &self.history
    }

    fn check(&mut self, logger: &mut dyn SolveLogger) -> Result<StoppingDecision, SolverError> {
        self.policy
            .check(&mut self.ws, &self.op, &self.rhs, &self.sol, &mut self.res, logger)
    }

    /// Run one restart segment.
    ///
    /// If the current solution already satisfies a stopping criterion the
    /// call returns without opening a segment. Otherwise the Krylov process
    /// is initialized from the current residual and iterated until the
    /// stopping policy returns a decision other than
    /// [`StoppingDecision::Continue`]; that segment is then closed.
    ///
    /// # Errors
    ///
    /// - [`SolverError::DegenerateInput`] if the residual is orthogonal to
    ///   the range of `A P`.
    /// - [`SolverError::NumericalInstability`] on a non-finite norm.
    pub fn run(&mut self, logger: &mut dyn SolveLogger) -> Result<RunOutcome, SolverError> {
        let start = Instant::now();
        let first_iteration = self.ws.completed_iterations;
        let (rows, cols) = self.ws.size();

        logger.record_event(&SolverEvent::RunStarted {
            restart: self.ws.completed_restarts,
            rows,
            cols,
            nnz: self.ws.nnz(),
            precision: self.ws.precision(),
        });

        let mut phase = Phase::CheckInitial;
        let decision = loop {
            phase = match phase {
                Phase::CheckInitial => {
                    let decision = self.check(logger)?;
                    if decision.is_stop() {
                        let resnorm = self.ws.resnorm;
                        debug!(%decision, resnorm, "LSQR: initial solution accepted");
                        logger.record_event(&SolverEvent::InitiallySatisfied {
                            decision,
                            relative_residual: self.ws.resnorm,
                        });
                        Phase::Done(decision)
                    } else {
                        step::initialize(&mut self.ws, &self.op, self.precond.as_ref(), &self.res)?;
                        self.ws.new_restart_active = true;
                        debug!(
                            restart = self.ws.completed_restarts,
                            resnorm = self.ws.resnorm,
                            "LSQR: segment opened"
                        );
                        Phase::Iterating
                    }
                }
                Phase::Iterating => {
                    let iteration = self.ws.completed_iterations + 1;
                    let precond = self.precond.as_ref();
                    let sol = &mut self.sol;
                    step::step_1(&mut self.ws, &self.op, precond, iteration)
                        .and_then(|()| step::step_2(&mut self.ws, precond, sol, iteration))
                        .map_err(|e| {
                            warn!(iteration, error = %e, "LSQR step failed");
                            e
                        })?;
                    self.ws.completed_iterations += 1;
                    self.ws.completed_iterations_per_restart += 1;

                    let decision = self.check(logger)?;
                    self.history.push(ConvergenceInfo {
                        iteration,
                        restart: self.ws.completed_restarts,
                        residual_norm: self.ws.resnorm,
                    });
                    logger.record_event(&SolverEvent::IterationCompleted {
                        iteration,
                        residual: self.ws.resnorm,
                        elapsed: start.elapsed(),
                    });
                    trace!(iteration, resnorm = self.ws.resnorm, "LSQR iteration");

                    if decision.is_stop() {
                        self.close_segment(decision, logger);
                        Phase::Done(decision)
                    } else {
                        Phase::Iterating
                    }
                }
                Phase::Done(decision) => break decision,
            };
        };

        logger.set_completed_iterations(self.ws.completed_iterations);
        Ok(RunOutcome {
            decision,
            iterations: self.ws.completed_iterations - first_iteration,
            total_iterations: self.ws.completed_iterations,
            restarts: self.ws.completed_restarts,
            relative_residual: self.ws.resnorm,
        })
    }

    fn close_segment(&mut self, decision: StoppingDecision, logger: &mut dyn SolveLogger) {
        let restart = self.ws.completed_restarts;
        let iterations = self.ws.completed_iterations_per_restart;
        self.ws.close_segment();
        self.policy.reset();
        debug!(
            restart,
            iterations,
            %decision,
            resnorm = self.ws.resnorm,
            "LSQR: segment closed"
        );
        logger.record_event(&SolverEvent::SegmentClosed {
            restart,
            decision,
            iterations,
            relative_residual: self.ws.resnorm,
        });
    }

    /// Call [`run`](Self::run) until convergence or `max_restarts` runs.
    ///
    /// A segment whose starting residual is orthogonal to the range of `A P`
    /// finds the current solution at the least-squares optimum. The loop
    /// then stops with [`StoppingDecision::Exhausted`], whether that
    /// solution came from earlier restarts, from
    /// [`with_initial_solution`](Self::with_initial_solution), or is the
    /// zero start.
    ///
    /// # Errors
    ///
    /// Any error from [`run`](Self::run) other than the optimum case above,
    /// or [`SolverError::InvalidInput`] if the final solution is not finite.
    pub fn solve(&mut self, logger: &mut dyn SolveLogger) -> Result<LsqrReport, SolverError> {
        let start = Instant::now();
        let mut decision = StoppingDecision::Continue;

        for _ in 0..self.config.max_restarts() {
            match self.run(logger) {
                Ok(outcome) => {
                    decision = outcome.decision;
                    if decision == StoppingDecision::Converged {
                        break;
                    }
                }
                Err(SolverError::DegenerateInput {
                    stage: "initialize",
                    detail,
                }) => {
                    debug!(%detail, "LSQR: residual orthogonal to range(A P), stopping");
                    decision = StoppingDecision::Exhausted;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let report = LsqrReport {
            solution: self.sol.to_f64_vec(),
            iterations: self.ws.completed_iterations,
            restarts: self.ws.completed_restarts,
            relative_residual: self.ws.resnorm,
            decision,
            wall_time: start.elapsed(),
            convergence_history: self.history.clone(),
        };
        validate_output(&report)?;

        debug!(
            iterations = report.iterations,
            restarts = report.restarts,
            resnorm = report.relative_residual,
            %decision,
            "LSQR solve finished"
        );
        Ok(report)
    }
}

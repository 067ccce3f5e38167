//! Solver configuration.
//!
//! [`LsqrConfig`] bundles the convergence parameters, the restart and
//! stagnation policy, the four precision slots and the preconditioner. It
//! deserialises from any serde format with every field optional:
//!
//! ```
//! use ruvector_lsqr::config::LsqrConfig;
//! use ruvector_lsqr::precision::Precision;
//!
//! let config: LsqrConfig = serde_json::from_str(
//!     r#"{ "tolerance": 1e-8, "precision": { "solve": "fp64", "internal": "fp32",
//!          "precond_apply": "fp64", "refine": "fp64" } }"#,
//! ).unwrap();
//! assert_eq!(config.iterations(), 500);
//! assert_eq!(config.precision().internal, Precision::Single);
//! assert!(config.validate().is_ok());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::precision::{Precision, PrecisionConfig};
use crate::preconditioner::IdentityPreconditioner;
use crate::traits::Preconditioner;
use crate::validation::{validate_params, validate_restart_params};

/// Default relative-residual tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;
/// Default per-restart iteration cap.
pub const DEFAULT_ITERATIONS: usize = 500;
/// Default minimum iterations before stagnation may be declared.
pub const DEFAULT_MIN_ITERATIONS: usize = 5;
/// Default stagnation tolerance.
pub const DEFAULT_STAGNATION_TOLERANCE: f64 = 1e-3;
/// Default stagnation window length.
pub const DEFAULT_STAGNATION_WINDOW: usize = 5;
/// Default number of `run` calls made by `solve`.
pub const DEFAULT_MAX_RESTARTS: usize = 10;

/// Configuration of an LSQR solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LsqrConfig {
    tolerance: f64,
    iterations: usize,
    min_iterations: usize,
    stagnation_tolerance: f64,
    stagnation_window: usize,
    max_restarts: usize,
    precision: PrecisionConfig,
    #[serde(skip)]
    precond: Option<Arc<dyn Preconditioner>>,
}

impl Default for LsqrConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            iterations: DEFAULT_ITERATIONS,
            min_iterations: DEFAULT_MIN_ITERATIONS,
            stagnation_tolerance: DEFAULT_STAGNATION_TOLERANCE,
            stagnation_window: DEFAULT_STAGNATION_WINDOW,
            max_restarts: DEFAULT_MAX_RESTARTS,
            precision: PrecisionConfig::default(),
            precond: None,
        }
    }
}

impl LsqrConfig {
    /// Configuration with the given tolerance and per-restart cap, defaults
    /// elsewhere.
    pub fn new(tolerance: f64, iterations: usize) -> Self {
        Self {
            tolerance,
            iterations,
            ..Self::default()
        }
    }

    // -- builders ---------------------------------------------------------

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_min_iterations(mut self, min_iterations: usize) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    pub fn with_stagnation_tolerance(mut self, stagnation_tolerance: f64) -> Self {
        self.stagnation_tolerance = stagnation_tolerance;
        self
    }

    pub fn with_stagnation_window(mut self, window: usize) -> Self {
        self.stagnation_window = window;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_precision(mut self, precision: PrecisionConfig) -> Self {
        self.precision = precision;
        self
    }

    /// Install a preconditioner. The `precond_apply` slot follows the
    /// preconditioner's own precision.
    pub fn with_preconditioner(mut self, precond: Arc<dyn Preconditioner>) -> Self {
        self.precision.precond_apply = precond.precision();
        self.precond = Some(precond);
        self
    }

    // -- accessors --------------------------------------------------------

    /// Relative-residual tolerance for convergence.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Iteration cap per restart segment.
    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterations a segment must complete before it can stagnate.
    #[inline]
    pub fn min_iterations(&self) -> usize {
        self.min_iterations
    }

    #[inline]
    pub fn stagnation_tolerance(&self) -> f64 {
        self.stagnation_tolerance
    }

    #[inline]
    pub fn stagnation_window(&self) -> usize {
        self.stagnation_window
    }

    #[inline]
    pub fn max_restarts(&self) -> usize {
        self.max_restarts
    }

    #[inline]
    pub fn precision(&self) -> PrecisionConfig {
        self.precision
    }

    /// The configured preconditioner, or the identity in the
    /// `precond_apply` precision.
    pub fn precond(&self) -> Arc<dyn Preconditioner> {
        match &self.precond {
            Some(p) => Arc::clone(p),
            None => Arc::new(IdentityPreconditioner::new(self.precision.precond_apply)),
        }
    }

    /// Check every parameter range and the precision rules.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidInput`] for an out-of-range parameter,
    /// [`SolverError::PrecisionConfiguration`] for an unsupported precision
    /// combination or a preconditioner whose precision disagrees with the
    /// `precond_apply` slot.
    pub fn validate(&self) -> Result<(), SolverError> {
        validate_params(self.tolerance, self.iterations)?;
        validate_restart_params(
            self.stagnation_tolerance,
            self.stagnation_window,
            self.max_restarts,
        )?;
        self.precision.validate()?;
        if let Some(p) = &self.precond {
            if p.precision() != self.precision.precond_apply {
                return Err(SolverError::PrecisionConfiguration(format!(
                    "preconditioner '{}' applies in {} but the precond_apply slot is {}",
                    p.name(),
                    p.precision(),
                    self.precision.precond_apply
                )));
            }
        }
        if self.min_iterations > self.iterations {
            tracing::warn!(
                min_iterations = self.min_iterations,
                iterations = self.iterations,
                "min_iterations exceeds the per-restart cap; stagnation can never trigger"
            );
        }
        Ok(())
    }

    /// Shorthand for a uniform precision layout.
    pub fn uniform(precision: Precision) -> Self {
        Self::default().with_precision(PrecisionConfig::uniform(precision))
    }
}

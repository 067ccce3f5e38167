//! Restarted, mixed-precision LSQR for the ruvector ecosystem.
//!
//! This crate solves linear least-squares problems `min ||A x - b||` with
//! Golub-Kahan bidiagonalization (LSQR), extended with a right
//! preconditioner, per-slot arithmetic precision, and restart on
//! stagnation. `A` may be a sparse CSR or a dense column-major matrix.
//!
//! # Precision slots
//!
//! | Slot | Used for | Allowed |
//! |------|----------|---------|
//! | `solve` | Krylov recurrence vectors `u, v, w` | fp32, fp64 |
//! | `internal` | the two operator products per step | any, not above `solve` |
//! | `precond_apply` | preconditioner application | the preconditioner's own |
//! | `refine` | solution, residual, convergence checks | fp32, fp64, not below `solve` |
//!
//! # Example
//!
//! ```rust
//! use ruvector_lsqr::config::LsqrConfig;
//! use ruvector_lsqr::logger::HistoryLogger;
//! use ruvector_lsqr::lsqr::LsqrSolver;
//! use ruvector_lsqr::precision::{Precision, PrecisionConfig};
//! use ruvector_lsqr::types::CsrMatrix;
//! use ruvector_lsqr::vector::Vector;
//!
//! // 4x2 overdetermined, consistent: x = [2, -1].
//! let a = CsrMatrix::<f64>::from_coo(4, 2, vec![
//!     (0, 0, 1.0), (1, 1, 1.0), (2, 0, 1.0), (2, 1, 1.0), (3, 0, 2.0),
//! ]).unwrap();
//! let b = Vector::from_f64(Precision::Double, &[2.0, -1.0, 1.0, 4.0]);
//!
//! // Products in fp32, everything else in fp64.
//! let config = LsqrConfig::new(1e-6, 100).with_precision(PrecisionConfig {
//!     internal: Precision::Single,
//!     ..PrecisionConfig::default()
//! });
//! let mut solver = LsqrSolver::new(config, a.into(), &b).unwrap();
//! let report = solver.solve(&mut HistoryLogger::new()).unwrap();
//! assert!(report.relative_residual < 1e-6);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod lsqr;
pub mod operator;
pub mod precision;
pub mod preconditioner;
pub mod step;
pub mod stopping;
pub mod traits;
pub mod types;
pub mod validation;
pub mod vector;
pub mod workspace;

pub use config::LsqrConfig;
pub use error::{SolverError, ValidationError};
pub use lsqr::LsqrSolver;
pub use operator::LinearOperator;
pub use precision::{Precision, PrecisionConfig};
pub use types::{LsqrReport, StoppingDecision};
pub use vector::Vector;

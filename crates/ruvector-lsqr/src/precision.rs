//! Precision tags and the scalar element trait.
//!
//! A solve is configured with four precision slots (see [`PrecisionConfig`]).
//! Each slot is a [`Precision`] tag chosen once at configuration time; the
//! algorithm itself is written against precision-tagged buffers
//! ([`Vector`](crate::vector::Vector)) and only the innermost kernels are
//! generic over [`Element`].
//!
//! # Arithmetic model
//!
//! Every element-wise result is computed in `f64` and rounded to the
//! destination precision on store. Reductions (norms, dot products, matvec
//! row sums) accumulate in `f64`. A low-precision slot therefore loses
//! accuracy exactly where its buffers are stored, which is what the
//! mixed-precision experiments measure.

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Floating-point storage precision of a buffer or operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    /// IEEE 754 binary16.
    #[serde(rename = "fp16")]
    Half,
    /// Brain floating point (8-bit exponent, 7-bit mantissa).
    #[serde(rename = "bf16")]
    BFloat16,
    /// IEEE 754 binary32.
    #[serde(rename = "fp32")]
    Single,
    /// IEEE 754 binary64.
    #[serde(rename = "fp64")]
    Double,
}

impl Precision {
    /// Size of one element in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Precision::Half | Precision::BFloat16 => 2,
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    /// Number of explicit mantissa bits, used to order precisions.
    #[inline]
    pub const fn mantissa_bits(self) -> u32 {
        match self {
            Precision::BFloat16 => 7,
            Precision::Half => 10,
            Precision::Single => 23,
            Precision::Double => 52,
        }
    }

    /// Machine epsilon of the format.
    pub fn epsilon(self) -> f64 {
        match self {
            Precision::Half => f16::EPSILON.to_f64(),
            Precision::BFloat16 => bf16::EPSILON.to_f64(),
            Precision::Single => f32::EPSILON as f64,
            Precision::Double => f64::EPSILON,
        }
    }

    /// `true` if `self` carries at least as many mantissa bits as `other`.
    #[inline]
    pub const fn at_least(self, other: Precision) -> bool {
        self.mantissa_bits() >= other.mantissa_bits()
    }

    /// Round an `f64` to the nearest value representable in this precision.
    #[inline]
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::Half => f16::from_f64(value).to_f64(),
            Precision::BFloat16 => bf16::from_f64(value).to_f64(),
            Precision::Single => value as f32 as f64,
            Precision::Double => value,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Half => write!(f, "fp16"),
            Precision::BFloat16 => write!(f, "bf16"),
            Precision::Single => write!(f, "fp32"),
            Precision::Double => write!(f, "fp64"),
        }
    }
}

impl FromStr for Precision {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fp16" | "f16" | "half" => Ok(Precision::Half),
            "bf16" | "bfloat16" => Ok(Precision::BFloat16),
            "fp32" | "f32" | "single" => Ok(Precision::Single),
            "fp64" | "f64" | "double" => Ok(Precision::Double),
            other => Err(SolverError::PrecisionConfiguration(format!(
                "unknown precision '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
    impl Sealed for half::f16 {}
    impl Sealed for half::bf16 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Scalar types that can back a [`Vector`](crate::vector::Vector) or a matrix.
///
/// Sealed: the closed set is `f16`, `bf16`, `f32`, `f64`.
pub trait Element:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static + sealed::Sealed
{
    /// Tag of this scalar type.
    const PRECISION: Precision;

    /// Round an `f64` into this type.
    fn from_f64(value: f64) -> Self;

    /// Widen to `f64` (exact for every supported type).
    fn to_f64(self) -> f64;
}

impl Element for f16 {
    const PRECISION: Precision = Precision::Half;

    #[inline]
    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl Element for bf16 {
    const PRECISION: Precision = Precision::BFloat16;

    #[inline]
    fn from_f64(value: f64) -> Self {
        bf16::from_f64(value)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }
}

impl Element for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

// ---------------------------------------------------------------------------
// PrecisionConfig
// ---------------------------------------------------------------------------

/// The four precision slots of one solve.
///
/// * `solve` - reference precision of the Krylov recurrence vectors.
/// * `internal` - precision of the two operator products per step.
/// * `precond_apply` - precision the preconditioner applies in.
/// * `refine` - precision of the solution, the residual and every
///   convergence measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    pub solve: Precision,
    pub internal: Precision,
    pub precond_apply: Precision,
    pub refine: Precision,
}

impl PrecisionConfig {
    /// Every slot in the same precision.
    pub const fn uniform(precision: Precision) -> Self {
        Self {
            solve: precision,
            internal: precision,
            precond_apply: precision,
            refine: precision,
        }
    }

    /// `true` when the internal products need their own shadow buffers.
    #[inline]
    pub fn has_internal_shadow(&self) -> bool {
        self.internal != self.solve
    }

    /// `true` when the preconditioner needs its own shadow buffer.
    #[inline]
    pub fn has_apply_shadow(&self) -> bool {
        self.precond_apply != self.solve
    }

    /// Reject precision combinations the solver does not support.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::PrecisionConfiguration`] when `solve` or
    /// `refine` is a 16-bit format, when `refine` is less precise than
    /// `solve`, or when `internal` is more precise than `solve`.
    pub fn validate(&self) -> Result<(), SolverError> {
        for (slot, p) in [("solve", self.solve), ("refine", self.refine)] {
            if !matches!(p, Precision::Single | Precision::Double) {
                return Err(SolverError::PrecisionConfiguration(format!(
                    "{slot} precision must be fp32 or fp64, got {p}"
                )));
            }
        }
        if !self.refine.at_least(self.solve) {
            return Err(SolverError::PrecisionConfiguration(format!(
                "refine precision {} is lower than solve precision {}",
                self.refine, self.solve
            )));
        }
        if !self.solve.at_least(self.internal) {
            return Err(SolverError::PrecisionConfiguration(format!(
                "internal precision {} exceeds solve precision {}",
                self.internal, self.solve
            )));
        }
        Ok(())
    }
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self::uniform(Precision::Double)
    }
}

impl fmt::Display for PrecisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "solve={} internal={} precond={} refine={}",
            self.solve, self.internal, self.precond_apply, self.refine
        )
    }
}

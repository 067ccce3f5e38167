//! Precision-tagged dense vectors and the level-1 kernels over them.
//!
//! [`Vector`] is a tagged union over the four supported storage types. The
//! precision of a buffer is fixed at allocation; every operation that writes
//! into a buffer rounds to that buffer's precision, while reductions
//! accumulate in `f64`.
//!
//! Binary kernels ([`Vector::copy_from`], [`Vector::axpy`],
//! [`Vector::axpby`], [`Vector::dot`]) accept operands of different
//! precisions. Mixing is how shadow buffers are filled and drained.

use half::{bf16, f16};

use crate::error::{SolverError, ValidationError};
use crate::precision::{Element, Precision};

/// Dispatch over the variants of a [`Vector`], binding the inner `Vec`.
macro_rules! with_slice {
    ($vec:expr, $s:ident => $body:expr) => {
        match $vec {
            Vector::Half($s) => $body,
            Vector::BFloat16($s) => $body,
            Vector::Single($s) => $body,
            Vector::Double($s) => $body,
        }
    };
}

/// A contiguous buffer with a fixed element count and storage precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    Half(Vec<f16>),
    BFloat16(Vec<bf16>),
    Single(Vec<f32>),
    Double(Vec<f64>),
}

/// Element types that map onto one [`Vector`] variant.
pub trait VectorElement: Element {
    /// Wrap an owned buffer in its variant.
    fn wrap(data: Vec<Self>) -> Vector;

    /// Borrow the buffer if `v` has this element type.
    fn view(v: &Vector) -> Option<&[Self]>;

    /// Mutably borrow the buffer if `v` has this element type.
    fn view_mut(v: &mut Vector) -> Option<&mut [Self]>;
}

macro_rules! impl_vector_element {
    ($t:ty, $variant:ident) => {
        impl VectorElement for $t {
            #[inline]
            fn wrap(data: Vec<Self>) -> Vector {
                Vector::$variant(data)
            }

            #[inline]
            fn view(v: &Vector) -> Option<&[Self]> {
                match v {
                    Vector::$variant(s) => Some(s.as_slice()),
                    _ => None,
                }
            }

            #[inline]
            fn view_mut(v: &mut Vector) -> Option<&mut [Self]> {
                match v {
                    Vector::$variant(s) => Some(s.as_mut_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_vector_element!(f16, Half);
impl_vector_element!(bf16, BFloat16);
impl_vector_element!(f32, Single);
impl_vector_element!(f64, Double);

impl Vector {
    /// A zero vector of length `len` in the given precision.
    pub fn zeros(precision: Precision, len: usize) -> Self {
        match precision {
            Precision::Half => Vector::Half(vec![f16::ZERO; len]),
            Precision::BFloat16 => Vector::BFloat16(vec![bf16::ZERO; len]),
            Precision::Single => Vector::Single(vec![0.0; len]),
            Precision::Double => Vector::Double(vec![0.0; len]),
        }
    }

    /// Round `values` into a new vector of the given precision.
    pub fn from_f64(precision: Precision, values: &[f64]) -> Self {
        let mut out = Self::zeros(precision, values.len());
        with_slice!(&mut out, s => {
            for (dst, &src) in s.iter_mut().zip(values) {
                *dst = Element::from_f64(src);
            }
        });
        out
    }

    /// Take ownership of a typed buffer.
    pub fn from_vec<T: VectorElement>(data: Vec<T>) -> Self {
        T::wrap(data)
    }

    #[inline]
    pub fn len(&self) -> usize {
        with_slice!(self, s => s.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage precision of this buffer.
    #[inline]
    pub fn precision(&self) -> Precision {
        match self {
            Vector::Half(_) => Precision::Half,
            Vector::BFloat16(_) => Precision::BFloat16,
            Vector::Single(_) => Precision::Single,
            Vector::Double(_) => Precision::Double,
        }
    }

    /// Element `i` widened to `f64`, or `None` when out of range.
    pub fn get(&self, i: usize) -> Option<f64> {
        with_slice!(self, s => s.get(i).map(|x| x.to_f64()))
    }

    /// Widen every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_slice!(self, s => s.iter().map(|x| x.to_f64()).collect())
    }

    /// Copy of this vector rounded to `precision`.
    pub fn cast(&self, precision: Precision) -> Self {
        let mut out = Self::zeros(precision, self.len());
        with_slice!(&mut out, dst => with_slice!(self, src => cast_into(src, dst)));
        out
    }

    /// Typed view of the buffer.
    ///
    /// # Errors
    ///
    /// [`SolverError::PrecisionMismatch`] if `T` is not this vector's type.
    pub fn as_slice<T: VectorElement>(&self) -> Result<&[T], SolverError> {
        let found = self.precision();
        T::view(self).ok_or(SolverError::PrecisionMismatch {
            expected: T::PRECISION,
            found,
        })
    }

    /// Mutable typed view of the buffer.
    ///
    /// # Errors
    ///
    /// [`SolverError::PrecisionMismatch`] if `T` is not this vector's type.
    pub fn as_mut_slice<T: VectorElement>(&mut self) -> Result<&mut [T], SolverError> {
        let found = self.precision();
        T::view_mut(self).ok_or(SolverError::PrecisionMismatch {
            expected: T::PRECISION,
            found,
        })
    }

    /// Overwrite every element with `value` (rounded).
    pub fn fill(&mut self, value: f64) {
        with_slice!(self, s => {
            let v = Element::from_f64(value);
            s.iter_mut().for_each(|x| *x = v);
        });
    }

    /// `self <- src`, rounding into this vector's precision.
    pub fn copy_from(&mut self, src: &Vector) -> Result<(), SolverError> {
        check_len("copy", self.len(), src.len())?;
        with_slice!(self, dst => with_slice!(src, s => cast_into(s, dst)));
        Ok(())
    }

    /// Euclidean norm, accumulated in `f64`.
    pub fn norm2(&self) -> f64 {
        with_slice!(self, s => norm2_slice(s))
    }

    /// Inner product, accumulated in `f64`.
    pub fn dot(&self, other: &Vector) -> Result<f64, SolverError> {
        check_len("dot", self.len(), other.len())?;
        Ok(with_slice!(self, a => with_slice!(other, b => dot_slices(a, b))))
    }

    /// `self <- alpha * self`.
    pub fn scale(&mut self, alpha: f64) {
        with_slice!(self, s => {
            for x in s.iter_mut() {
                *x = Element::from_f64(alpha * x.to_f64());
            }
        });
    }

    /// `self <- alpha * x + self`.
    pub fn axpy(&mut self, alpha: f64, x: &Vector) -> Result<(), SolverError> {
        self.axpby(alpha, x, 1.0)
    }

    /// `self <- alpha * x + beta * self`, rounded once per element.
    pub fn axpby(&mut self, alpha: f64, x: &Vector, beta: f64) -> Result<(), SolverError> {
        check_len("axpby", self.len(), x.len())?;
        with_slice!(self, y => with_slice!(x, xs => axpby_slices(alpha, xs, beta, y)));
        Ok(())
    }

    /// `self <- d .* self` (element-wise product).
    pub fn mul_elementwise(&mut self, d: &Vector) -> Result<(), SolverError> {
        check_len("mul_elementwise", self.len(), d.len())?;
        with_slice!(self, y => with_slice!(d, ds => {
            for (yi, di) in y.iter_mut().zip(ds.iter()) {
                *yi = Element::from_f64(di.to_f64() * yi.to_f64());
            }
        }));
        Ok(())
    }

    /// `true` if every element is finite.
    pub fn is_finite(&self) -> bool {
        with_slice!(self, s => s.iter().all(|x| x.to_f64().is_finite()))
    }
}

#[inline]
fn check_len(op: &str, expected: usize, found: usize) -> Result<(), SolverError> {
    if expected != found {
        return Err(ValidationError::DimensionMismatch(format!(
            "{op}: length {found} does not match destination length {expected}"
        ))
        .into());
    }
    Ok(())
}

#[inline]
fn cast_into<S: Element, D: Element>(src: &[S], dst: &mut [D]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = D::from_f64(s.to_f64());
    }
}

/// Euclidean norm with `dnrm2`-style scaling.
///
/// Squares are accumulated relative to the largest magnitude seen so far,
/// so entries above `f64::MAX.sqrt()` do not overflow and tiny entries do
/// not underflow. A NaN or infinite entry makes the result non-finite.
pub(crate) fn norm2_slice<T: Element>(s: &[T]) -> f64 {
    let mut scale = 0.0f64;
    let mut ssq = 1.0f64;
    for x in s {
        let v = x.to_f64();
        if !v.is_finite() {
            return if v.is_nan() { v } else { f64::INFINITY };
        }
        if v == 0.0 {
            continue;
        }
        let a = v.abs();
        if scale < a {
            let r = scale / a;
            ssq = 1.0 + ssq * r * r;
            scale = a;
        } else {
            let r = a / scale;
            ssq += r * r;
        }
    }
    scale * ssq.sqrt()
}

#[inline]
fn dot_slices<A: Element, B: Element>(a: &[A], b: &[B]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x.to_f64() * y.to_f64()).sum()
}

#[inline]
fn axpby_slices<X: Element, Y: Element>(alpha: f64, x: &[X], beta: f64, y: &mut [Y]) {
    if beta == 0.0 {
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi = Y::from_f64(alpha * xi.to_f64());
        }
    } else {
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi = Y::from_f64(alpha * xi.to_f64() + beta * yi.to_f64());
        }
    }
}

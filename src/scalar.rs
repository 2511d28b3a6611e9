//! Element types the block kernels operate on.
//!
//! Implemented for `f32`, `f64` and `Complex64`. Zero and one tests are
//! exact comparisons: the kernels branch on them to skip a division or a
//! multiplication, never to approximate.

use num_complex::Complex64;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Trait bounds needed for the CG kernels and reductions.
pub trait Scalar:
    Copy
    + Default
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + PartialEq
    + Debug
{
    fn zero() -> Self;
    fn one() -> Self;
    /// Complex conjugate; identity for real types.
    fn conj(self) -> Self;
    /// Magnitude, widened to f64.
    fn abs_val(self) -> f64;
    fn from_f64(v: f64) -> Self;
    /// Real part, widened to f64.
    fn real(self) -> f64;
    fn is_finite(self) -> bool;

    fn is_zero(self) -> bool {
        self == Self::zero()
    }

    fn is_nonzero(self) -> bool {
        !self.is_zero()
    }
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn conj(self) -> Self {
        self
    }
    fn abs_val(self) -> f64 {
        self.abs()
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn real(self) -> f64 {
        self
    }
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

impl Scalar for f32 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn conj(self) -> Self {
        self
    }
    fn abs_val(self) -> f64 {
        self.abs() as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn real(self) -> f64 {
        self as f64
    }
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

impl Scalar for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }
    fn abs_val(self) -> f64 {
        self.norm()
    }
    fn from_f64(v: f64) -> Self {
        Complex64::new(v, 0.0)
    }
    fn real(self) -> f64 {
        self.re
    }
    fn is_finite(self) -> bool {
        Complex64::is_finite(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_counts_as_zero() {
        assert!((-0.0f64).is_zero());
        assert!(Complex64::new(-0.0, 0.0).is_zero());
    }

    #[test]
    fn complex_conj_flips_imaginary() {
        let z = Complex64::new(1.0, 2.0);
        assert_eq!(Scalar::conj(z), Complex64::new(1.0, -2.0));
        assert_eq!(Scalar::abs_val(Complex64::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn one_is_exact() {
        assert_eq!(<f32 as Scalar>::one(), 1.0);
        assert!(<f64 as Scalar>::one().is_nonzero());
        assert!(!Scalar::is_finite(f64::NAN));
    }
}

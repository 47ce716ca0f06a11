//! Float trait abstraction for f32/f64 support.
//!
//! The solver is written once against [`TnvFloat`] so that the same kernel
//! runs in single precision (the default, matching the reference solver) or
//! in double precision for verification runs.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::{Debug, Display};
use std::iter::Sum;

/// Trait alias for floating point types supported by the TNV solver.
///
/// This trait combines all the bounds needed by the kernel:
/// - Basic float operations (Float, NumAssign)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Debug/Display for diagnostics
/// - Send + Sync so worker bands can be moved into the thread pool
pub trait TnvFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Display + Send + Sync + 'static
{
    /// Singular values at or below this floor are treated as zero.
    const TINY: Self;

    /// Sentinel "infinite" residual used before the first iteration.
    const LARGE: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;
}

impl TnvFloat for f32 {
    const TINY: Self = 1e-8;
    const LARGE: Self = 1e8;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }
}

impl TnvFloat for f64 {
    const TINY: Self = 1e-8;
    const LARGE: Self = 1e8;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }
}

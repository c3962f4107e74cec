//! Real scalar types the solver works with.

use core::fmt::Debug;
use num_traits::Float;

/// A real floating point type usable as matrix element.
///
/// The factorization runs in a reduced precision type ([`f32`]), while residuals and the
/// refined solution are computed in the full precision type ([`f64`]).
pub trait Real:
    Float + bytemuck::Pod + Debug + Default + Send + Sync + core::iter::Sum + 'static
{
    /// Human readable name, used in log messages.
    const NAME: &'static str;

    /// Converts from the full precision type, rounding to nearest.
    fn demote(value: f64) -> Self;
    /// Converts to the full precision type. Exact.
    fn promote(self) -> f64;
}

impl Real for f32 {
    const NAME: &'static str = "f32";

    #[inline(always)]
    fn demote(value: f64) -> Self {
        value as f32
    }
    #[inline(always)]
    fn promote(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const NAME: &'static str = "f64";

    #[inline(always)]
    fn demote(value: f64) -> Self {
        value
    }
    #[inline(always)]
    fn promote(self) -> f64 {
        self
    }
}

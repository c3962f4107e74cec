//! `hplai` is a distributed dense LU solver in the style of the HPL-AI benchmark.
//!
//! The matrix is distributed block-cyclically over a 2D process grid and factored in reduced
//! precision (`f32`) with partial pivoting, one panel at a time. Full precision (`f64`) is then
//! recovered with iterative refinement.
//!
//! The heart of the crate is the panel factorization in [`linalg::pfact`]: a left-looking,
//! one-column-ahead algorithm whose pivot search, row swap and pivot-row broadcast are merged
//! into a single bidirectional exchange per column. The pivots of a panel are compressed into a
//! permutation list by [`linalg::pivot_index`] and applied to the trailing matrix by
//! [`linalg::laswp`].
//!
//! Processes talk to each other only through the [`comm::Communicator`] trait. The crate ships an
//! in-process implementation, [`comm::LocalUniverse`], that runs every rank on its own thread.
//!
//! ```
//! use hplai::comm::LocalUniverse;
//! use hplai::linalg::refine::{self, RefineParams};
//! use hplai::{Context, ContextParams};
//! use std::time::Duration;
//!
//! let n = 24;
//! let a = |i: usize, j: usize| if i == j { 4.0 } else { 1.0 / (1 + i + j) as f64 };
//! let b = vec![1.0; n];
//!
//! let solutions = LocalUniverse::run(4, Duration::from_secs(30), |comm| {
//!     let ctx = Context::new(comm, 2, 2, ContextParams::default()).unwrap();
//!     refine::solve(&ctx, n, 4, a, &b, RefineParams::default())
//! });
//! for solution in solutions {
//!     let (x, info) = solution.unwrap();
//!     assert!(info.converged);
//!     assert_eq!(x.len(), n);
//! }
//! ```

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(non_snake_case)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use core::sync::atomic::AtomicUsize;
use equator::{assert, debug_assert};

pub mod comm;
pub mod context;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod linalg;
pub mod mat;
pub mod real;
pub mod utils;

pub use dyn_stack;
pub use reborrow;

pub use context::{Context, ContextParams};
pub use error::SolveError;
pub use grid::Grid;
pub use mat::{Mat, MatMut, MatRef};
pub use real::Real;

#[cfg(feature = "perf-warn")]
#[macro_export]
#[doc(hidden)]
macro_rules! __perf_warn {
    ($name: ident) => {{
        #[inline(always)]
        #[allow(non_snake_case)]
        fn $name() -> &'static ::core::sync::atomic::AtomicBool {
            static $name: ::core::sync::atomic::AtomicBool =
                ::core::sync::atomic::AtomicBool::new(false);
            &$name
        }
        $name()
            .compare_exchange(
                false,
                true,
                ::core::sync::atomic::Ordering::Relaxed,
                ::core::sync::atomic::Ordering::Relaxed,
            )
            .is_ok()
    }};
}

/// Parallelism strategy used by the kernels of a single rank.
///
/// This only controls threading *inside* a process. Cooperation between processes always goes
/// through a [`comm::Communicator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism.
    ///
    /// The code is executed sequentially on the thread that calls the kernel.
    None,
    /// Rayon parallelism. Only available with the `rayon` feature.
    ///
    /// The contained value is a hint about the number of threads to use. A value of `0` is
    /// treated as `rayon::current_num_threads()`.
    #[cfg(feature = "rayon")]
    #[cfg_attr(docsrs, doc(cfg(feature = "rayon")))]
    Rayon(usize),
}

/// 0: None
/// n >= 1: Rayon(n - 1)
static GLOBAL_PARALLELISM: AtomicUsize = AtomicUsize::new(0);

fn encode_parallelism(parallelism: Parallelism) -> usize {
    match parallelism {
        Parallelism::None => 0,
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(n) => n.saturating_add(1),
    }
}

fn decode_parallelism(value: usize) -> Parallelism {
    match value {
        0 => Parallelism::None,
        #[cfg(feature = "rayon")]
        n => Parallelism::Rayon(n - 1),
        #[cfg(not(feature = "rayon"))]
        _ => unreachable!(),
    }
}

/// Sets the global parallelism settings, used by [`ContextParams::default`].
pub fn set_global_parallelism(parallelism: Parallelism) {
    GLOBAL_PARALLELISM.store(
        encode_parallelism(parallelism),
        core::sync::atomic::Ordering::Relaxed,
    );
}

/// Gets the global parallelism settings.
///
/// Defaults to [`Parallelism::None`], since ranks of a [`comm::LocalUniverse`] already run on
/// separate threads.
pub fn get_global_parallelism() -> Parallelism {
    decode_parallelism(GLOBAL_PARALLELISM.load(core::sync::atomic::Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;

    #[test]
    fn parallelism_encoding_round_trip() {
        assert!(encode_parallelism(Parallelism::None) == 0);
        assert!(decode_parallelism(0) == Parallelism::None);
        #[cfg(feature = "rayon")]
        for n in [0, 1, 3, 64] {
            let p = Parallelism::Rayon(n);
            assert!(decode_parallelism(encode_parallelism(p)) == p);
        }
    }
}

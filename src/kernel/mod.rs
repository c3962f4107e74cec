//! Dense kernels consumed by the factorization.
//!
//! The distributed routines never loop over matrix entries for arithmetic themselves; they call
//! into a [`Kernel`], picked once when the [`crate::Context`] is built. Two implementations are
//! provided:
//! - [`ReferenceKernel`] runs plain loops on the calling thread,
//! - [`ParallelKernel`] hands the matrix products to the `gemm` crate, solves triangular systems
//!   by blocks with the same products, and splits matrix-vector products by rows with rayon.
//!
//! The level 1 and level 2 operations perform every floating point operation in the same order
//! in both implementations. The level 3 operations of [`ParallelKernel`] accumulate in a
//! different order, so their results only agree with [`ReferenceKernel`] up to rounding. Each
//! implementation is deterministic on its own.

use crate::{
    mat::{MatMut, MatRef},
    Parallelism, Real,
};

mod parallel;
mod reference;

pub use parallel::ParallelKernel;
pub use reference::ReferenceKernel;

/// Dense kernel interface, column-major with leading dimensions.
pub trait Kernel<T: Real>: Send + Sync + core::fmt::Debug {
    /// `x = alpha * x`.
    fn scal(&self, alpha: T, x: &mut [T]);

    /// `y = x`.
    fn copy(&self, x: &[T], y: &mut [T]);

    /// Solves `L * x = b` in place, where `L` is the unit lower triangular part of `l`.
    ///
    /// The diagonal and the strictly upper part of `l` are not accessed.
    fn trsv_unit_lower(&self, l: MatRef<'_, T>, x: &mut [T]);

    /// Solves `U * x = b` in place, where `U` is the upper triangular part of `u`.
    fn trsv_upper(&self, u: MatRef<'_, T>, x: &mut [T]);

    /// `y = beta * y + alpha * A * x`.
    ///
    /// When `beta` is zero, `y` is not read.
    fn gemv(&self, alpha: T, a: MatRef<'_, T>, x: &[T], beta: T, y: &mut [T]);

    /// Solves `L * X = B` in place, where `L` is the unit lower triangular part of `l`.
    fn trsm_unit_lower(&self, l: MatRef<'_, T>, b: MatMut<'_, T>);

    /// `C = beta * C + alpha * A * B`.
    ///
    /// When `beta` is zero, `C` is not read.
    fn gemm(&self, alpha: T, a: MatRef<'_, T>, b: MatRef<'_, T>, beta: T, c: MatMut<'_, T>);
}

/// Selects the kernel implementation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelStrategy {
    /// Plain loops on the calling thread.
    Reference,
    /// Matrix products go through the `gemm` crate, and the other operations are split across
    /// threads.
    Parallel(Parallelism),
}

impl Default for KernelStrategy {
    #[inline]
    fn default() -> Self {
        match crate::get_global_parallelism() {
            Parallelism::None => Self::Reference,
            #[cfg(feature = "rayon")]
            par => Self::Parallel(par),
        }
    }
}

/// Kernels for both precisions, built from a single [`KernelStrategy`].
#[derive(Debug)]
pub struct Kernels {
    f32: Box<dyn Kernel<f32>>,
    f64: Box<dyn Kernel<f64>>,
}

impl Kernels {
    /// Instantiates the kernels for `strategy`.
    pub fn new(strategy: KernelStrategy) -> Self {
        match strategy {
            KernelStrategy::Reference => Self {
                f32: Box::new(ReferenceKernel),
                f64: Box::new(ReferenceKernel),
            },
            KernelStrategy::Parallel(parallelism) => Self {
                f32: Box::new(ParallelKernel::new(parallelism)),
                f64: Box::new(ParallelKernel::new(parallelism)),
            },
        }
    }

    /// Returns the kernel of the reduced precision type.
    #[inline]
    pub fn reduced(&self) -> &dyn Kernel<f32> {
        &*self.f32
    }

    /// Returns the kernel of the full precision type.
    #[inline]
    pub fn full(&self) -> &dyn Kernel<f64> {
        &*self.f64
    }
}

/// Maps a scalar type to its kernel inside a [`Kernels`] set.
pub trait SelectKernel: Real {
    /// Returns the kernel for `Self`.
    fn select(kernels: &Kernels) -> &dyn Kernel<Self>;
}

impl SelectKernel for f32 {
    #[inline]
    fn select(kernels: &Kernels) -> &dyn Kernel<Self> {
        kernels.reduced()
    }
}

impl SelectKernel for f64 {
    #[inline]
    fn select(kernels: &Kernels) -> &dyn Kernel<Self> {
        kernels.full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, mat::Mat};
    use assert_approx_eq::assert_approx_eq;
    use rand::random;
    use reborrow::*;

    fn strategies() -> Vec<KernelStrategy> {
        let mut out = vec![KernelStrategy::Reference];
        #[cfg(feature = "rayon")]
        out.push(KernelStrategy::Parallel(Parallelism::Rayon(4)));
        out.push(KernelStrategy::Parallel(Parallelism::None));
        out
    }

    fn naive_gemm(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Mat<f64> {
        Mat::from_fn(a.nrows(), b.ncols(), |i, j| {
            (0..a.ncols()).map(|k| a.read(i, k) * b.read(k, j)).sum()
        })
    }

    #[test]
    fn gemm_matches_naive() {
        for strategy in strategies() {
            let kernels = Kernels::new(strategy);
            let kernel = kernels.full();
            for (m, n, k) in [(1, 1, 1), (7, 5, 3), (40, 33, 17), (3, 64, 0)] {
                let a = Mat::from_fn(m, k, |_, _| random::<f64>());
                let b = Mat::from_fn(k, n, |_, _| random::<f64>());
                let c0 = Mat::from_fn(m, n, |_, _| random::<f64>());
                let mut c = c0.clone();
                kernel.gemm(-1.0, a.as_ref(), b.as_ref(), 2.0, c.as_mut());
                let ab = naive_gemm(a.as_ref(), b.as_ref());
                for j in 0..n {
                    for i in 0..m {
                        assert_approx_eq!(c.read(i, j), 2.0 * c0.read(i, j) - ab.read(i, j));
                    }
                }
            }
        }
    }

    #[test]
    fn gemm_with_transposed_rhs() {
        let kernels = Kernels::new(KernelStrategy::Reference);
        let a = Mat::from_fn(6, 4, |_, _| random::<f64>());
        let bt = Mat::from_fn(5, 4, |_, _| random::<f64>());
        let mut c = Mat::zeros(6, 5);
        kernels
            .full()
            .gemm(1.0, a.as_ref(), bt.as_ref().transpose(), 0.0, c.as_mut());
        let expected = naive_gemm(a.as_ref(), bt.as_ref().transpose());
        for j in 0..5 {
            for i in 0..6 {
                assert_approx_eq!(c.read(i, j), expected.read(i, j));
            }
        }
    }

    #[test]
    fn triangular_solves_invert_products() {
        for strategy in strategies() {
            let kernels = Kernels::new(strategy);
            let kernel = kernels.full();
            let n = 12;
            let l = Mat::from_fn(n, n, |i, j| if i > j { random::<f64>() } else { 7.0 });
            let u = Mat::from_fn(n, n, |i, j| match i.cmp(&j) {
                core::cmp::Ordering::Less => random::<f64>(),
                core::cmp::Ordering::Equal => 2.0 + random::<f64>(),
                core::cmp::Ordering::Greater => 7.0,
            });
            let x = (0..n).map(|_| random::<f64>()).collect::<Vec<_>>();

            let unit_l = Mat::from_fn(n, n, |i, j| match i.cmp(&j) {
                core::cmp::Ordering::Less => 0.0,
                core::cmp::Ordering::Equal => 1.0,
                core::cmp::Ordering::Greater => l.read(i, j),
            });
            let mut b = vec![0.0; n];
            kernel.gemv(1.0, unit_l.as_ref(), &x, 0.0, &mut b);
            kernel.trsv_unit_lower(l.as_ref(), &mut b);
            for i in 0..n {
                assert_approx_eq!(b[i], x[i]);
            }

            let upper = Mat::from_fn(n, n, |i, j| if i <= j { u.read(i, j) } else { 0.0 });
            let mut b = vec![0.0; n];
            kernel.gemv(1.0, upper.as_ref(), &x, 0.0, &mut b);
            kernel.trsv_upper(u.as_ref(), &mut b);
            for i in 0..n {
                assert_approx_eq!(b[i], x[i]);
            }

            let rhs = Mat::from_fn(n, 9, |_, _| random::<f64>());
            let mut b = naive_gemm(unit_l.as_ref(), rhs.as_ref());
            kernel.trsm_unit_lower(l.as_ref(), b.as_mut());
            for j in 0..9 {
                for i in 0..n {
                    assert_approx_eq!(b.read(i, j), rhs.read(i, j));
                }
            }
        }
    }

    #[test]
    fn strategies_agree() {
        let a = Mat::from_fn(57, 31, |_, _| random::<f32>());
        let b = Mat::from_fn(31, 23, |_, _| random::<f32>());
        let x = (0..31).map(|_| random::<f32>()).collect::<Vec<_>>();

        let mut results = Vec::new();
        for strategy in strategies() {
            let kernels = Kernels::new(strategy);
            let kernel = f32::select(&kernels);
            let mut c = Mat::zeros(57, 23);
            kernel.gemm(1.0, a.as_ref(), b.as_ref(), 0.0, c.as_mut());
            let mut y = vec![1.0f32; 57];
            kernel.gemv(-1.0, a.as_ref(), &x, 1.0, &mut y);
            kernel.scal(0.5, &mut y);
            let mut y2 = vec![0.0f32; 57];
            kernel.copy(&y, &mut y2);
            results.push((c, y2));
        }
        for (c, y) in &results[1..] {
            for j in 0..23 {
                for i in 0..57 {
                    assert_approx_eq!(c.read(i, j), results[0].0.read(i, j), 1e-3);
                }
            }
            // level 2 operations keep the same order of operations
            assert!(y == &results[0].1);
        }
    }

    #[test]
    fn blocked_triangular_solve_matches_reference() {
        let n = 150;
        let nrhs = 70;
        let l = Mat::from_fn(n, n, |i, j| {
            if i > j {
                (random::<f64>() - 0.5) / n as f64
            } else {
                f64::NAN
            }
        });
        let unit_l = Mat::from_fn(n, n, |i, j| match i.cmp(&j) {
            core::cmp::Ordering::Less => 0.0,
            core::cmp::Ordering::Equal => 1.0,
            core::cmp::Ordering::Greater => l.read(i, j),
        });
        let x = Mat::from_fn(n, nrhs, |_, _| random::<f64>());
        let rhs = naive_gemm(unit_l.as_ref(), x.as_ref());

        let reference = Kernels::new(KernelStrategy::Reference);
        let mut expected = rhs.clone();
        reference.full().trsm_unit_lower(l.as_ref(), expected.as_mut());

        for strategy in strategies() {
            let kernels = Kernels::new(strategy);
            let mut b = rhs.clone();
            kernels.full().trsm_unit_lower(l.as_ref(), b.as_mut());
            for j in 0..nrhs {
                for i in 0..n {
                    assert_approx_eq!(b.read(i, j), expected.read(i, j), 1e-12);
                    assert_approx_eq!(b.read(i, j), x.read(i, j), 1e-12);
                }
            }

            // strided operands, as seen by the trailing update
            let a = Mat::from_fn(n, n, |_, _| random::<f64>());
            let mut c = Mat::from_fn(n + 3, nrhs, |_, _| random::<f64>());
            let c0 = c.clone();
            kernels.full().gemm(
                -1.0,
                a.as_ref().submatrix(1, 2, n - 1, n - 2),
                x.as_ref().submatrix(2, 0, n - 2, nrhs),
                1.0,
                c.as_mut().submatrix_mut(3, 0, n - 1, nrhs),
            );
            let ab = naive_gemm(
                a.as_ref().submatrix(1, 2, n - 1, n - 2),
                x.as_ref().submatrix(2, 0, n - 2, nrhs),
            );
            for j in 0..nrhs {
                for i in 0..n + 3 {
                    let expected = if i < 3 || i >= n + 2 {
                        c0.read(i, j)
                    } else {
                        c0.read(i, j) - ab.read(i - 3, j)
                    };
                    assert_approx_eq!(c.read(i, j), expected, 1e-10);
                }
            }
        }
    }

    #[test]
    fn zero_beta_ignores_output() {
        let kernels = Kernels::new(KernelStrategy::Reference);
        let a = Mat::from_fn(3, 2, |i, j| (i + j) as f64);
        let mut y = vec![f64::NAN; 3];
        kernels.full().gemv(1.0, a.as_ref(), &[1.0, 1.0], 0.0, &mut y);
        assert!(y == [1.0, 3.0, 5.0]);
        let mut c = Mat::from_fn(3, 1, |_, _| f64::NAN);
        let b = Mat::from_fn(2, 1, |_, _| 1.0);
        kernels
            .full()
            .gemm(1.0, a.as_ref(), b.as_ref(), 0.0, c.as_mut().rb_mut());
        assert!(c.as_slice() == &[1.0, 3.0, 5.0][..]);
    }
}

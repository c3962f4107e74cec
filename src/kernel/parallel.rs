use super::{reference, Kernel};
use crate::{
    assert,
    mat::{MatMut, MatRef},
    utils::thread::{join_raw, parallelism_degree},
    Parallelism, Real,
};
use reborrow::*;

/// Below this many rows, the operation is not split any further.
const MIN_SPLIT: usize = 32;

/// Kernel backed by the `gemm` crate for level 3 operations, and splitting level 2 operations by
/// rows.
#[derive(Copy, Clone, Debug)]
pub struct ParallelKernel {
    parallelism: Parallelism,
}

impl ParallelKernel {
    /// Creates a kernel that uses the given parallelism.
    #[inline]
    pub fn new(parallelism: Parallelism) -> Self {
        Self { parallelism }
    }

    /// Returns the parallelism of the kernel.
    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }
}

#[inline]
fn gemm_parallelism(parallelism: Parallelism) -> gemm::Parallelism {
    match parallelism {
        Parallelism::None => gemm::Parallelism::None,
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(0) => gemm::Parallelism::Rayon(rayon::current_num_threads()),
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(n_threads) => gemm::Parallelism::Rayon(n_threads),
    }
}

fn gemv_rec<T: Real>(
    alpha: T,
    a: MatRef<'_, T>,
    x: &[T],
    beta: T,
    y: &mut [T],
    parallelism: Parallelism,
) {
    let m = y.len();
    if m < 2 * MIN_SPLIT || parallelism_degree(parallelism) == 1 {
        return reference::gemv(alpha, a, x, beta, y);
    }
    let mid = m / 2;
    let (y_top, y_bot) = y.split_at_mut(mid);
    let a_top = a.subrows(0, mid);
    let a_bot = a.subrows(mid, m - mid);
    join_raw(
        |par| gemv_rec(alpha, a_top, x, beta, y_top, par),
        |par| gemv_rec(alpha, a_bot, x, beta, y_bot, par),
        parallelism,
    );
}

/// Computes `c := beta * c + alpha * a * b`. The content of `c` is not read when `beta` is zero.
fn gemm_impl<T: Real>(
    alpha: T,
    a: MatRef<'_, T>,
    b: MatRef<'_, T>,
    beta: T,
    mut c: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    let m = c.nrows();
    let n = c.ncols();
    let k = a.ncols();
    if m == 0 || n == 0 || k == 0 {
        return reference::gemm(alpha, a, b, beta, c);
    }

    // the three views start at their `(0, 0)` element and span their strides, and `c` does not
    // alias the inputs since it is borrowed mutably.
    unsafe {
        gemm::gemm(
            m,
            n,
            k,
            c.as_ptr_mut(),
            c.ld() as isize,
            1,
            beta != T::zero(),
            a.as_ptr(),
            a.col_stride() as isize,
            a.row_stride() as isize,
            b.as_ptr(),
            b.col_stride() as isize,
            b.row_stride() as isize,
            beta,
            alpha,
            false,
            false,
            false,
            gemm_parallelism(parallelism),
        )
    }
}

/// Solves `l * x = b` in place, splitting the rows in two halves and updating the bottom half of
/// the right hand side with a matrix product.
fn trsm_rec<T: Real>(l: MatRef<'_, T>, mut b: MatMut<'_, T>, parallelism: Parallelism) {
    let m = b.nrows();
    if m <= MIN_SPLIT {
        for j in 0..b.ncols() {
            reference::trsv_unit_lower(l, b.col_as_slice_mut(j));
        }
        return;
    }

    let mid = m / 2;
    let rest = m - mid;
    trsm_rec(
        l.submatrix(0, 0, mid, mid),
        b.rb_mut().subrows_mut(0, mid),
        parallelism,
    );
    let x_top = b.rb().subrows(0, mid).to_owned();
    gemm_impl(
        -T::one(),
        l.submatrix(mid, 0, rest, mid),
        x_top.as_ref(),
        T::one(),
        b.rb_mut().subrows_mut(mid, rest),
        parallelism,
    );
    trsm_rec(
        l.submatrix(mid, mid, rest, rest),
        b.subrows_mut(mid, rest),
        parallelism,
    );
}

impl<T: Real> Kernel<T> for ParallelKernel {
    #[inline]
    fn scal(&self, alpha: T, x: &mut [T]) {
        x.iter_mut().for_each(|x| *x = *x * alpha);
    }

    #[inline]
    fn copy(&self, x: &[T], y: &mut [T]) {
        y.copy_from_slice(x);
    }

    #[inline]
    fn trsv_unit_lower(&self, l: MatRef<'_, T>, x: &mut [T]) {
        reference::trsv_unit_lower(l, x)
    }

    #[inline]
    fn trsv_upper(&self, u: MatRef<'_, T>, x: &mut [T]) {
        reference::trsv_upper(u, x)
    }

    fn gemv(&self, alpha: T, a: MatRef<'_, T>, x: &[T], beta: T, y: &mut [T]) {
        assert!(all(a.nrows() == y.len(), a.ncols() == x.len()));
        gemv_rec(alpha, a, x, beta, y, self.parallelism)
    }

    fn trsm_unit_lower(&self, l: MatRef<'_, T>, b: MatMut<'_, T>) {
        assert!(all(l.nrows() == b.nrows(), l.ncols() == b.nrows()));
        trsm_rec(l, b, self.parallelism)
    }

    fn gemm(&self, alpha: T, a: MatRef<'_, T>, b: MatRef<'_, T>, beta: T, mut c: MatMut<'_, T>) {
        assert!(all(
            a.nrows() == c.nrows(),
            b.ncols() == c.ncols(),
            a.ncols() == b.nrows()
        ));
        gemm_impl(alpha, a, b, beta, c.rb_mut(), self.parallelism)
    }
}

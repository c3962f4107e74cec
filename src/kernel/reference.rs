use super::Kernel;
use crate::{
    assert,
    mat::{MatMut, MatRef},
    Real,
};

/// Kernel running plain loops on the calling thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct ReferenceKernel;

#[inline(always)]
fn axpy<T: Real>(alpha: T, x: &[T], y: &mut [T]) {
    for (y, &x) in y.iter_mut().zip(x) {
        *y = *y + alpha * x;
    }
}

pub(crate) fn gemv<T: Real>(alpha: T, a: MatRef<'_, T>, x: &[T], beta: T, y: &mut [T]) {
    assert!(all(a.nrows() == y.len(), a.ncols() == x.len()));
    if beta == T::zero() {
        y.fill(T::zero());
    } else if beta != T::one() {
        y.iter_mut().for_each(|y| *y = *y * beta);
    }
    if a.row_stride() == 1 {
        for (j, &xj) in x.iter().enumerate() {
            axpy(alpha * xj, a.col_as_slice(j), y);
        }
    } else {
        for (j, &xj) in x.iter().enumerate() {
            let alpha_xj = alpha * xj;
            for (i, y) in y.iter_mut().enumerate() {
                *y = *y + alpha_xj * a.read(i, j);
            }
        }
    }
}

pub(crate) fn gemm<T: Real>(
    alpha: T,
    a: MatRef<'_, T>,
    b: MatRef<'_, T>,
    beta: T,
    mut c: MatMut<'_, T>,
) {
    assert!(all(
        a.nrows() == c.nrows(),
        b.ncols() == c.ncols(),
        a.ncols() == b.nrows()
    ));
    let k = a.ncols();
    let mut bj = vec![T::zero(); k];
    for j in 0..c.ncols() {
        for (p, bj) in bj.iter_mut().enumerate() {
            *bj = b.read(p, j);
        }
        gemv(alpha, a, &bj, beta, c.col_as_slice_mut(j));
    }
}

pub(crate) fn trsv_unit_lower<T: Real>(l: MatRef<'_, T>, x: &mut [T]) {
    let n = x.len();
    assert!(all(l.nrows() >= n, l.ncols() >= n));
    for j in 0..n {
        let xj = x[j];
        if xj == T::zero() {
            continue;
        }
        for i in j + 1..n {
            x[i] = x[i] - xj * l.read(i, j);
        }
    }
}

pub(crate) fn trsv_upper<T: Real>(u: MatRef<'_, T>, x: &mut [T]) {
    let n = x.len();
    assert!(all(u.nrows() >= n, u.ncols() >= n));
    for j in (0..n).rev() {
        let xj = x[j] / u.read(j, j);
        x[j] = xj;
        for i in 0..j {
            x[i] = x[i] - xj * u.read(i, j);
        }
    }
}

impl<T: Real> Kernel<T> for ReferenceKernel {
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
        trsv_unit_lower(l, x)
    }

    #[inline]
    fn trsv_upper(&self, u: MatRef<'_, T>, x: &mut [T]) {
        trsv_upper(u, x)
    }

    #[inline]
    fn gemv(&self, alpha: T, a: MatRef<'_, T>, x: &[T], beta: T, y: &mut [T]) {
        gemv(alpha, a, x, beta, y)
    }

    fn trsm_unit_lower(&self, l: MatRef<'_, T>, mut b: MatMut<'_, T>) {
        assert!(all(l.nrows() == b.nrows(), l.ncols() == b.nrows()));
        for j in 0..b.ncols() {
            trsv_unit_lower(l, b.col_as_slice_mut(j));
        }
    }

    fn gemm(&self, alpha: T, a: MatRef<'_, T>, b: MatRef<'_, T>, beta: T, c: MatMut<'_, T>) {
        #[cfg(feature = "perf-warn")]
        if b.row_stride() != 1 && crate::__perf_warn!(GEMM_WARN) {
            log::warn!(target: "hplai_perf", "gemm prefers a column-major right-hand side. Found a transposed one.");
        }
        gemm(alpha, a, b, beta, c)
    }
}

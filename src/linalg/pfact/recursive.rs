use super::{left_looking, Panel, PanelInfo, Scratch};
use crate::{
    comm::{CommError, Communicator},
    kernel::Kernel,
    utils::div_ceil,
    Real,
};
use reborrow::*;

/// Width of the pieces a panel of width `n` is split into: `n / ndiv`, rounded up to a multiple
/// of `nbmin`.
#[inline]
fn piece_width(n: usize, nbmin: usize, ndiv: usize) -> usize {
    Ord::min(n, div_ceil(div_ceil(n, nbmin), ndiv) * nbmin)
}

/// Factors panel columns `icoff..icoff + n`, splitting them into pieces until they are at most
/// `nbmin` wide.
pub(super) fn factor<T: Real, C: Communicator + ?Sized>(
    col: &C,
    kernel: &dyn Kernel<T>,
    panel: &mut Panel<'_, T>,
    scratch: &mut Scratch<'_, T>,
    n: usize,
    icoff: usize,
    nbmin: usize,
    ndiv: usize,
    info: &mut PanelInfo,
) -> Result<(), CommError> {
    if n <= nbmin {
        return left_looking::factor(col, kernel, panel, scratch, n, icoff, info);
    }

    let curr = panel.is_current();
    let mp = panel.a.nrows();
    let (mut ii, mut m) = if curr { (icoff, mp - icoff) } else { (0, mp) };
    let width = piece_width(n, nbmin, ndiv);

    let mut nn = 0;
    while nn < n {
        let jb = Ord::min(n - nn, width);
        let jj = icoff + nn;

        if nn > 0 {
            // U12 = L11^-1 A12, on every process of the column.
            {
                let (left, right) = panel.l1.rb_mut().split_at_col_mut(jj);
                let l11 = left.into_const().submatrix(icoff, icoff, nn, nn);
                kernel.trsm_unit_lower(l11, right.submatrix_mut(icoff, 0, nn, jb));
            }
            // A22 -= L21 U12 on the active rows.
            {
                let u12 = panel.l1.rb().submatrix(icoff, jj, nn, jb);
                let (left, right) = panel.a.rb_mut().split_at_col_mut(jj);
                let l21 = left.into_const().submatrix(ii, icoff, m, nn);
                kernel.gemm(
                    -T::one(),
                    l21,
                    u12,
                    T::one(),
                    right.submatrix_mut(ii, 0, m, jb),
                );
            }
            if curr {
                let u12 = panel.l1.rb().submatrix(icoff, jj, nn, jb);
                panel
                    .a
                    .rb_mut()
                    .submatrix_mut(icoff, jj, nn, jb)
                    .copy_from(u12);
            }
        }

        factor(col, kernel, panel, scratch, jb, jj, nbmin, ndiv, info)?;

        if curr {
            ii += jb;
            m -= jb;
        }
        nn += jb;
    }
    Ok(())
}

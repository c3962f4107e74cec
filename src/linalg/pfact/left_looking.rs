use super::{pivot::local_max, swap::swap_broadcast, Panel, PanelInfo, Scratch};
use crate::{
    comm::{CommError, Communicator},
    kernel::Kernel,
    Real,
};
use reborrow::*;

fn find_local_max<T: Real>(
    panel: &Panel<'_, T>,
    scratch: &mut Scratch<'_, T>,
    owner: usize,
    col: usize,
    first: usize,
    len: usize,
) {
    local_max(
        panel.a.rb(),
        col,
        first,
        len,
        owner,
        |r| panel.global_row(r),
        &mut scratch.work,
    );
}

fn pivot_swap<T: Real, C: Communicator + ?Sized>(
    col: &C,
    panel: &mut Panel<'_, T>,
    scratch: &mut Scratch<'_, T>,
    ii: usize,
    jj: usize,
) -> Result<T, CommError> {
    swap_broadcast(
        col,
        panel.prow,
        panel.a.rb_mut(),
        ii,
        jj,
        panel.l1.rb_mut(),
        &mut *panel.dpiv,
        &mut scratch.work,
        &mut *scratch.send,
        &mut *scratch.recv,
    )
}

fn scale_below<T: Real>(
    kernel: &dyn Kernel<T>,
    panel: &mut Panel<'_, T>,
    pivot: T,
    jj: usize,
    first: usize,
    len: usize,
    info: &mut PanelInfo,
) {
    if pivot != T::zero() {
        let col = &mut panel.a.col_as_slice_mut(jj)[first..first + len];
        kernel.scal(pivot.recip(), col);
    } else if info.zero_pivot.is_none() {
        info.zero_pivot = Some(jj);
    }
}

/// Factors panel columns `icoff..icoff + n`, one column ahead.
///
/// On the current process row, the active rows are `icoff..`, since the rows above hold finished
/// pivots. On the other process rows, all local rows are active.
pub(super) fn factor<T: Real, C: Communicator + ?Sized>(
    col: &C,
    kernel: &dyn Kernel<T>,
    panel: &mut Panel<'_, T>,
    scratch: &mut Scratch<'_, T>,
    n: usize,
    icoff: usize,
    info: &mut PanelInfo,
) -> Result<(), CommError> {
    if n == 0 {
        return Ok(());
    }
    let me = col.rank();
    let curr = panel.is_current();
    let mp = panel.a.nrows();

    // ii: pivot position, iip1: first row below it, mm1: number of rows from iip1 on.
    let (mut ii, mut iip1, mut mm1) = if curr {
        (icoff, icoff + 1, mp - icoff - 1)
    } else {
        (0, 0, mp)
    };
    let m = if curr { mp - icoff } else { mp };
    let mut jj = icoff;

    find_local_max(panel, scratch, me, jj, ii, m);

    for _ in 1..n {
        let pivot = pivot_swap(col, panel, scratch, ii, jj)?;
        let kk = jj + 1 - icoff;

        // U part of the next column.
        {
            let (left, right) = panel.l1.rb_mut().split_at_col_mut(jj + 1);
            let l11 = left.into_const().submatrix(icoff, icoff, kk, kk);
            let u = &mut right.into_col_as_slice_mut(0)[icoff..icoff + kk];
            kernel.trsv_unit_lower(l11, u);
        }

        scale_below(kernel, panel, pivot, jj, iip1, mm1, info);

        // Update of the next column, followed by its local pivot search.
        {
            let u = &panel.l1.rb().col_as_slice(jj + 1)[icoff..icoff + kk];
            let (left, right) = panel.a.rb_mut().split_at_col_mut(jj + 1);
            let l21 = left.into_const().submatrix(iip1, icoff, mm1, kk);
            let next = &mut right.into_col_as_slice_mut(0)[iip1..iip1 + mm1];
            kernel.gemv(-T::one(), l21, u, T::one(), next);
        }
        find_local_max(panel, scratch, me, jj + 1, iip1, mm1);

        if curr {
            let u = &panel.l1.rb().col_as_slice(jj + 1)[icoff..icoff + kk];
            let top = &mut panel.a.col_as_slice_mut(jj + 1)[icoff..icoff + kk];
            kernel.copy(u, top);

            ii = iip1;
            iip1 += 1;
            mm1 -= 1;
        }
        jj += 1;
    }

    let pivot = pivot_swap(col, panel, scratch, ii, jj)?;
    scale_below(kernel, panel, pivot, jj, iip1, mm1, info);
    Ok(())
}

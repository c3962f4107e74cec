//! Blocked LU factorization of a distributed matrix.
//!
//! The factorization is right-looking, without look-ahead. For every panel of `nb` columns:
//! 1. the process column owning the panel factors it with [`pfact`],
//! 2. the factored panel, its `L1` block and its pivots are broadcast along every process row,
//! 3. every process compresses the pivots with [`pivot_index::build`] and applies them to its
//!    trailing columns with [`laswp::apply`], which also hands it the `U` block,
//! 4. `U` is solved against `L1`, and the trailing matrix is updated with `A -= L U`,
//! 5. the panel's process row stores `U` in its top rows.
//!
//! The interchanges of a panel are never applied to the columns on its left. The factors are
//! therefore only meaningful together with the pivot sequence of every panel, replayed in order,
//! which is what [`LuFactors::solve_in_place`] does.

use super::{
    dist::DistMatrix,
    laswp::{self, LaswpParams, ULayout},
    pfact::{pfact, pfact_req, Panel, PfactParams},
    pivot_index::{self, PivotIndex},
};
use crate::{
    assert,
    comm::{broadcast, Communicator, Tag},
    context::Context,
    error::SolveError,
    grid::{global_to_local, numroc, owner},
    kernel::{Kernel, SelectKernel},
    mat::{Mat, MatRef},
    utils::as_bytes_mut,
    Real,
};
use dyn_stack::{GlobalPodBuffer, PodStack};

/// Factorization parameters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct FactorParams {
    /// Panel factorization.
    pub pfact: PfactParams,
    /// Row interchanges in the trailing matrix.
    pub laswp: LaswpParams,
}

impl FactorParams {
    #[inline]
    pub fn with_pfact(mut self, pfact: PfactParams) -> Self {
        self.pfact = pfact;
        self
    }

    #[inline]
    pub fn with_laswp(mut self, laswp: LaswpParams) -> Self {
        self.laswp = laswp;
        self
    }
}

/// Information about a factorization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FactorInfo {
    /// First global column whose pivot is exactly zero. The matrix is singular if this is set.
    pub singular_column: Option<usize>,
}

/// Pivots of a factorization, known to every process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LuFactors {
    n: usize,
    nb: usize,
    pivots: Vec<usize>,
    info: FactorInfo,
}

impl LuFactors {
    /// Dimension of the factored matrix.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Block size of the factorization.
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Pivot sequence: during the factorization of the panel containing column `j`, rows `j` and
    /// `pivots[j]` were interchanged.
    #[inline]
    pub fn pivots(&self) -> &[usize] {
        &self.pivots
    }

    #[inline]
    pub fn info(&self) -> FactorInfo {
        self.info
    }

    /// Solves `A x = rhs` in place, where `lu` is the assembled factored matrix.
    ///
    /// # Panics
    /// Panics if the dimensions do not match.
    #[track_caller]
    pub fn solve_in_place<T: Real>(&self, kernel: &dyn Kernel<T>, lu: MatRef<'_, T>, rhs: &mut [T]) {
        let n = self.n;
        assert!(all(lu.nrows() == n, lu.ncols() == n, rhs.len() == n));

        for (p, dpiv) in self.pivots.chunks(self.nb).enumerate() {
            let j = p * self.nb;
            let jb = dpiv.len();
            for (k, &piv) in dpiv.iter().enumerate() {
                rhs.swap(j + k, piv);
            }
            let (top, below) = rhs.split_at_mut(j + jb);
            let top = &mut top[j..];
            kernel.trsv_unit_lower(lu.submatrix(j, j, jb, jb), top);
            kernel.gemv(
                -T::one(),
                lu.submatrix(j + jb, j, n - j - jb, jb),
                top,
                T::one(),
                below,
            );
        }
        kernel.trsv_upper(lu, rhs);
    }
}

/// Factors `a` in place with partial pivoting.
///
/// Every rank of the context must call this function with its part of the same matrix. A zero
/// pivot does not stop the factorization; it is reported in [`FactorInfo::singular_column`].
pub fn factor<T: SelectKernel, C: Communicator>(
    ctx: &Context<C>,
    a: &mut DistMatrix<T>,
    params: FactorParams,
) -> Result<LuFactors, SolveError> {
    let grid = ctx.grid();
    if a.nrows() != a.ncols() {
        return Err(SolveError::InvalidParameter("the matrix must be square"));
    }
    assert!(a.is_on(grid));

    let n = a.nrows();
    let nb = a.nb();
    let kernel = ctx.kernel::<T>();
    let (nprow, npcol) = (grid.nprow(), grid.npcol());
    let (myrow, mycol) = (grid.myrow(), grid.mycol());
    let row = grid.row_comm();
    let col = grid.col_comm();
    let (mp, nq) = (a.local().nrows(), a.local().ncols());

    let req = pfact_req::<T>(nb)
        .map_err(|_| SolveError::InvalidParameter("panel workspace size overflow"))?;
    let mut mem = GlobalPodBuffer::new(req);

    let mut pivots = Vec::with_capacity(n);
    let mut info = FactorInfo::default();
    let mut ipid = PivotIndex::new();

    let mut j = 0;
    while j < n {
        let jb = Ord::min(nb, n - j);
        let prow = owner(j, nb, nprow);
        let pcol = owner(j, nb, npcol);
        // local rows from global row j on, and local columns right of the panel.
        let ii0 = numroc(j, nb, myrow, nprow);
        let mpl = mp - ii0;
        let nq0 = numroc(j + jb, nb, mycol, npcol);
        let nn = nq - nq0;

        let mut lpanel = Mat::<T>::zeros(mpl, jb);
        let mut l1 = Mat::<T>::zeros(jb, jb);
        let mut meta = vec![0u64; jb + 1];
        if mycol == pcol {
            let jl = global_to_local(j, nb, npcol);
            let mut dpiv = vec![0usize; jb];
            let panel = Panel::new(
                grid,
                a.local_mut().submatrix_mut(ii0, jl, mpl, jb),
                l1.as_mut(),
                &mut dpiv,
                j,
                nb,
            );
            let panel_info = pfact(ctx, panel, params.pfact, PodStack::new(&mut mem))?;

            lpanel
                .as_mut()
                .copy_from(a.local().submatrix(ii0, jl, mpl, jb));
            for (m, &p) in meta.iter_mut().zip(&dpiv) {
                *m = p as u64;
            }
            meta[jb] = panel_info.zero_pivot.map_or(u64::MAX, |k| k as u64);
        }
        broadcast(&row, pcol, Tag::PANEL, as_bytes_mut(lpanel.as_slice_mut()))?;
        broadcast(&row, pcol, Tag::PANEL, as_bytes_mut(l1.as_slice_mut()))?;
        broadcast(&row, pcol, Tag::PANEL, as_bytes_mut(&mut meta))?;

        let dpiv = meta[..jb].iter().map(|&p| p as usize).collect::<Vec<_>>();
        if meta[jb] != u64::MAX && info.singular_column.is_none() {
            let column = j + meta[jb] as usize;
            log::warn!(target: "hplai", "zero pivot in column {column}, the matrix is singular");
            info.singular_column = Some(column);
        }

        if nn > 0 {
            pivot_index::build(&dpiv, j, &mut ipid);
            let plan = laswp::plan(&ipid, j, jb);
            let layout = params.laswp.layout;
            let mut u = match layout {
                ULayout::Normal => Mat::zeros(jb, nn),
                ULayout::Transposed => Mat::zeros(nn, jb),
            };
            laswp::apply(
                &col,
                &plan,
                nb,
                a.local_mut().submatrix_mut(ii0, nq0, mpl, nn),
                u.as_mut(),
                params.laswp,
            )?;
            if layout == ULayout::Transposed {
                #[cfg(feature = "perf-warn")]
                if crate::__perf_warn!(TRANSPOSED_U_WARN) {
                    log::warn!(target: "hplai_perf", "the trailing update works on a normal U. Transposing it.");
                }
                u = u.as_ref().transpose().to_owned();
            }

            kernel.trsm_unit_lower(l1.as_ref(), u.as_mut());
            let r0 = numroc(j + jb, nb, myrow, nprow) - ii0;
            kernel.gemm(
                -T::one(),
                lpanel.as_ref().subrows(r0, mpl - r0),
                u.as_ref(),
                T::one(),
                a.local_mut().submatrix_mut(ii0 + r0, nq0, mpl - r0, nn),
            );
            if myrow == prow {
                a.local_mut()
                    .submatrix_mut(ii0, nq0, jb, nn)
                    .copy_from(u.as_ref());
            }
        }

        pivots.extend_from_slice(&dpiv);
        log::debug!(
            target: "hplai",
            "{} panel {}..{} of {} done on ({}, {}), {} trailing local columns",
            T::NAME,
            j,
            j + jb,
            n,
            myrow,
            mycol,
            nn,
        );
        j += jb;
    }

    Ok(LuFactors {
        n,
        nb,
        pivots,
        info,
    })
}

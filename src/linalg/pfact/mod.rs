//! Distributed panel factorization with partial pivoting.
//!
//! A panel is a block column of `jb` columns, starting at global row `ia`, whose rows are spread
//! over the processes of one process column. Factoring it computes, in place:
//! - the multipliers `L` below the diagonal,
//! - the upper triangle `U` of the top `jb x jb` block,
//! - the pivot record `dpiv`, where `dpiv[k]` is the global row swapped into row `ia + k`,
//! - the `L1` buffer, a replica of the factored top block held by every process of the column.
//!
//! The top `jb` rows must belong to a single block, so that the process row `prow` owning row
//! `ia` holds them all as its first local panel rows.
//!
//! Two variants are provided, selected through [`PfactParams::variant`]. The left-looking loop
//! handles one column per step and runs one column ahead: the next column is updated and its
//! local pivot candidate is computed right after the current column is scaled, so the pivot
//! search of every column costs a single exchange along the process column. The recursive
//! variant splits the panel, applies the finished parts to the remaining ones with level 3
//! kernels, and uses the left-looking loop at the leaves.

use crate::{
    assert,
    comm::{CommError, Communicator},
    context::Context,
    grid::{local_to_global, numroc, owner, Grid},
    kernel::SelectKernel,
    mat::MatMut,
    Real,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};

pub mod pivot;
pub mod swap;

mod left_looking;
mod recursive;

use pivot::{wire_len, WorkVector};

/// Panel factorization algorithm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PfactVariant {
    /// One column per step, one column ahead.
    #[default]
    LeftLooking,
    /// Recursive splitting with left-looking leaves.
    Recursive,
}

/// Panel factorization parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct PfactParams {
    /// Algorithm.
    pub variant: PfactVariant,
    /// Widest panel handled by a leaf of the recursive variant.
    pub nbmin: usize,
    /// Number of pieces the recursive variant splits a panel into.
    pub ndiv: usize,
}

impl Default for PfactParams {
    #[inline]
    fn default() -> Self {
        Self {
            variant: PfactVariant::LeftLooking,
            nbmin: 4,
            ndiv: 2,
        }
    }
}

impl PfactParams {
    /// Returns the parameters of the recursive variant.
    #[inline]
    pub fn recursive(nbmin: usize, ndiv: usize) -> Self {
        Self {
            variant: PfactVariant::Recursive,
            nbmin,
            ndiv,
        }
    }
}

/// Information about a factored panel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelInfo {
    /// First panel column whose pivot is exactly zero. Its multipliers are left unscaled.
    pub zero_pivot: Option<usize>,
}

/// The local part of a panel, along with its metadata.
pub struct Panel<'a, T> {
    a: MatMut<'a, T>,
    l1: MatMut<'a, T>,
    dpiv: &'a mut [usize],
    ia: usize,
    nb: usize,
    prow: usize,
    pcol: usize,
    myrow: usize,
    nprow: usize,
    ii0: usize,
}

impl<'a, T: Real> Panel<'a, T> {
    /// Creates the panel of the calling process.
    ///
    /// `a` holds the local rows of the block column whose global index is at least `ia`, in
    /// increasing order, and its width is the panel width `jb`. `l1` is a `jb x jb` buffer and
    /// `dpiv` has length `jb`.
    ///
    /// # Panics
    /// Panics if the shapes do not agree, or if rows `ia..ia + jb` do not lie in a single block
    /// of size `nb`.
    #[track_caller]
    pub fn new<C: Communicator>(
        grid: &Grid<C>,
        a: MatMut<'a, T>,
        l1: MatMut<'a, T>,
        dpiv: &'a mut [usize],
        ia: usize,
        nb: usize,
    ) -> Self {
        let jb = a.ncols();
        assert!(all(nb > 0, ia % nb + jb <= nb));
        assert!(all(l1.nrows() == jb, l1.ncols() == jb, dpiv.len() == jb));

        let nprow = grid.nprow();
        let myrow = grid.myrow();
        let prow = owner(ia, nb, nprow);
        if myrow == prow {
            assert!(a.nrows() >= jb);
        }
        Self {
            a,
            l1,
            dpiv,
            ia,
            nb,
            prow,
            pcol: grid.mycol(),
            myrow,
            nprow,
            ii0: numroc(ia, nb, myrow, nprow),
        }
    }

    /// Panel width.
    #[inline]
    pub fn jb(&self) -> usize {
        self.a.ncols()
    }

    /// Global index of the first panel row.
    #[inline]
    pub fn ia(&self) -> usize {
        self.ia
    }

    /// Process row owning the top `jb` rows.
    #[inline]
    pub fn prow(&self) -> usize {
        self.prow
    }

    /// Process column owning the panel.
    #[inline]
    pub fn pcol(&self) -> usize {
        self.pcol
    }

    /// Whether the calling process owns the top rows.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.myrow == self.prow
    }

    /// Global index of local panel row `row`.
    #[inline]
    pub fn global_row(&self, row: usize) -> usize {
        local_to_global(self.ii0 + row, self.nb, self.myrow, self.nprow)
    }
}

/// Scratch buffers of one panel factorization.
pub(crate) struct Scratch<'s, T> {
    pub work: WorkVector<'s, T>,
    pub send: &'s mut [u8],
    pub recv: &'s mut [u8],
}

/// Computes the size and alignment of the workspace required by [`pfact`] for a panel of
/// width `jb`.
pub fn pfact_req<T: Real>(jb: usize) -> Result<StackReq, SizeOverflow> {
    let wire = StackReq::try_new::<u8>(wire_len::<T>(jb))?;
    StackReq::try_all_of([StackReq::try_new::<T>(2 * jb)?, wire, wire])
}

/// Factors `panel` in place, in cooperation with the other processes of the caller's process
/// column.
///
/// Every process of the column must call this function with its own part of the same panel.
/// On success, every process holds the factored top block in `L1` and the pivot record in
/// `dpiv`, while the panel rows hold the factors of the local rows.
///
/// A zero pivot does not stop the factorization; it is reported in [`PanelInfo::zero_pivot`].
pub fn pfact<T: SelectKernel, C: Communicator>(
    ctx: &Context<C>,
    mut panel: Panel<'_, T>,
    params: PfactParams,
    stack: PodStack<'_>,
) -> Result<PanelInfo, CommError> {
    let grid = ctx.grid();
    assert!(grid.mycol() == panel.pcol);
    let col = grid.col_comm();
    let kernel = ctx.kernel::<T>();
    let jb = panel.jb();

    let (rows, stack) = stack.make_raw::<T>(2 * jb);
    let (send, stack) = stack.make_raw::<u8>(wire_len::<T>(jb));
    let (recv, _) = stack.make_raw::<u8>(wire_len::<T>(jb));
    let mut scratch = Scratch {
        work: WorkVector::new(rows, jb, col.rank()),
        send,
        recv,
    };

    let mut info = PanelInfo::default();
    match params.variant {
        PfactVariant::LeftLooking => {
            left_looking::factor(&col, kernel, &mut panel, &mut scratch, jb, 0, &mut info)?
        }
        PfactVariant::Recursive => recursive::factor(
            &col,
            kernel,
            &mut panel,
            &mut scratch,
            jb,
            0,
            Ord::max(params.nbmin, 1),
            Ord::max(params.ndiv, 2),
            &mut info,
        )?,
    }

    log::debug!(
        target: "hplai",
        "{} panel at row {} width {} factored on process row {}, zero pivot {:?}",
        T::NAME,
        panel.ia,
        jb,
        panel.myrow,
        info.zero_pivot,
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{
        comm::LocalUniverse,
        context::ContextParams,
        grid::global_to_local,
        kernel::KernelStrategy,
        mat::Mat,
        SolveError,
    };
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::{GlobalPodBuffer, PodStack};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use reborrow::*;
    use std::time::Duration;

    macro_rules! make_stack {
        ($req: expr $(,)?) => {
            PodStack::new(&mut GlobalPodBuffer::new($req.unwrap()))
        };
    }

    struct Factored {
        rows: Vec<(usize, Vec<f64>)>,
        l1: Mat<f64>,
        dpiv: Vec<usize>,
        info: PanelInfo,
    }

    /// Serial partial pivoting on rows `ia..` of `a`, with ties going to the lowest row.
    fn serial_lu(a: &Mat<f64>, ia: usize) -> (Mat<f64>, Vec<usize>) {
        let mut a = a.clone();
        let (m, jb) = (a.nrows(), a.ncols());
        let mut dpiv = Vec::new();
        for k in 0..jb {
            let r = ia + k;
            let mut p = r;
            for i in r + 1..m {
                if a.read(i, k).abs() > a.read(p, k).abs() {
                    p = i;
                }
            }
            dpiv.push(p);
            for j in 0..jb {
                let (x, y) = (a.read(r, j), a.read(p, j));
                a.write(r, j, y);
                a.write(p, j, x);
            }
            let pivot = a.read(r, k);
            for i in r + 1..m {
                if pivot != 0.0 {
                    a.write(i, k, a.read(i, k) / pivot);
                }
                let l = a.read(i, k);
                for j in k + 1..jb {
                    a.write(i, j, a.read(i, j) - l * a.read(r, j));
                }
            }
        }
        (a, dpiv)
    }

    /// Factors `a` on every process of the first grid column, except on `dropped`, which returns
    /// before taking part.
    fn try_factor_distributed(
        a: &Mat<f64>,
        ia: usize,
        nb: usize,
        nprow: usize,
        npcol: usize,
        params: PfactParams,
        dropped: Option<usize>,
    ) -> Vec<Result<Option<Factored>, SolveError>> {
        let (m, jb) = (a.nrows(), a.ncols());
        LocalUniverse::run(nprow * npcol, Duration::from_secs(30), |comm| {
            let ctx = Context::new(
                comm,
                nprow,
                npcol,
                ContextParams::default().with_kernel(KernelStrategy::Reference),
            )?;
            let grid = ctx.grid();
            if grid.mycol() != 0 || dropped == Some(grid.world().rank()) {
                return Ok::<_, SolveError>(None);
            }
            let (myrow, nprow) = (grid.myrow(), grid.nprow());
            let ii0 = numroc(ia, nb, myrow, nprow);
            let mp = numroc(m, nb, myrow, nprow) - ii0;
            let mut local = Mat::from_fn(mp, jb, |r, j| {
                a.read(local_to_global(ii0 + r, nb, myrow, nprow), j)
            });
            let mut l1 = Mat::zeros(jb, jb);
            let mut dpiv = vec![0; jb];

            let panel = Panel::new(grid, local.as_mut(), l1.as_mut(), &mut dpiv, ia, nb);
            let info = pfact(&ctx, panel, params, make_stack!(pfact_req::<f64>(jb)))?;

            let rows = (0..mp)
                .map(|r| {
                    let g = local_to_global(ii0 + r, nb, myrow, nprow);
                    (g, (0..jb).map(|j| local.read(r, j)).collect())
                })
                .collect();
            Ok(Some(Factored {
                rows,
                l1,
                dpiv,
                info,
            }))
        })
    }

    fn factor_distributed(
        a: &Mat<f64>,
        ia: usize,
        nb: usize,
        nprow: usize,
        npcol: usize,
        params: PfactParams,
    ) -> Vec<Option<Factored>> {
        try_factor_distributed(a, ia, nb, nprow, npcol, params, None)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    fn check_against_serial(a: &Mat<f64>, ia: usize, nb: usize, nprow: usize, params: PfactParams) {
        let (expected, expected_dpiv) = serial_lu(a, ia);
        let jb = a.ncols();
        let results = factor_distributed(a, ia, nb, nprow, 1, params);
        let mut seen = 0;
        for f in results.into_iter().flatten() {
            assert!(f.dpiv == expected_dpiv);
            assert!(f.info.zero_pivot.is_none());
            for i in 0..jb {
                for j in 0..jb {
                    assert_approx_eq!(f.l1.read(i, j), expected.read(ia + i, j), 1e-10);
                }
            }
            for (g, row) in &f.rows {
                assert!(*g >= ia);
                for j in 0..jb {
                    assert_approx_eq!(row[j], expected.read(*g, j), 1e-10);
                }
                seen += 1;
            }
        }
        assert!(seen == a.nrows() - ia);
    }

    fn random_panel(m: usize, jb: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(m, jb, |_, _| rng.gen::<f64>() * 2.0 - 1.0)
    }

    #[test]
    fn left_looking_matches_serial_lu() {
        for nprow in 1..=4 {
            for (m, nb, ia, jb) in [(40, 8, 0, 8), (37, 4, 4, 4), (29, 6, 13, 5), (9, 8, 8, 1)] {
                let a = random_panel(m, jb, (nprow * 100 + m) as u64);
                check_against_serial(&a, ia, nb, nprow, PfactParams::default());
            }
        }
    }

    #[test]
    fn recursive_matches_serial_lu() {
        for nprow in [1, 2, 3] {
            for (nbmin, ndiv) in [(1, 2), (2, 2), (3, 3), (16, 2)] {
                let a = random_panel(50, 12, (nprow * 10 + nbmin) as u64);
                check_against_serial(&a, 0, 12, nprow, PfactParams::recursive(nbmin, ndiv));
            }
        }
    }

    #[test]
    fn missing_process_fails_the_whole_column() {
        let a = random_panel(36, 6, 11);
        for params in [PfactParams::default(), PfactParams::recursive(2, 2)] {
            for dropped in 0..3 {
                let out = try_factor_distributed(&a, 0, 6, 3, 1, params, Some(dropped));
                assert!(matches!(out[dropped], Ok(None)));
                for (rank, r) in out.iter().enumerate() {
                    if rank != dropped {
                        assert!(matches!(r, Err(SolveError::Comm(_))));
                    }
                }
            }
        }
    }

    #[test]
    fn only_the_panel_column_takes_part() {
        let a = random_panel(30, 5, 7);
        let (expected, expected_dpiv) = serial_lu(&a, 0);
        let results = factor_distributed(&a, 0, 5, 2, 2, PfactParams::default());
        assert!(results.iter().filter(|r| r.is_some()).count() == 2);
        for f in results.into_iter().flatten() {
            assert!(f.dpiv == expected_dpiv);
            assert_approx_eq!(f.l1.read(4, 4), expected.read(4, 4), 1e-10);
        }
    }

    #[test]
    fn factorization_is_deterministic() {
        let a = random_panel(64, 8, 3);
        let first = factor_distributed(&a, 0, 8, 3, 1, PfactParams::default());
        let second = factor_distributed(&a, 0, 8, 3, 1, PfactParams::default());
        for (x, y) in first.into_iter().zip(second) {
            let (x, y) = (x.unwrap(), y.unwrap());
            assert!(x.dpiv == y.dpiv);
            assert!(x.rows == y.rows);
            assert!(x.l1.as_slice() == y.l1.as_slice());
        }
    }

    #[test]
    fn zero_column_is_reported_without_scaling() {
        let mut a = random_panel(24, 4, 11);
        for i in 0..24 {
            a.write(i, 0, 0.0);
        }
        for variant in [PfactParams::default(), PfactParams::recursive(1, 2)] {
            let results = factor_distributed(&a, 0, 4, 2, 1, variant);
            for f in results.into_iter().flatten() {
                assert!(f.info.zero_pivot == Some(0));
                assert!(f.dpiv[0] == 0);
                assert!(f.l1.read(0, 0) == 0.0);
                for (_, row) in &f.rows {
                    assert!(row.iter().all(|x| x.is_finite()));
                }
            }
        }
    }

    #[test]
    fn panel_maps_local_rows_to_global() {
        let out = LocalUniverse::run(3, Duration::from_secs(10), |comm| {
            let grid = Grid::new(comm, 3, 1)?;
            let (ia, nb) = (8, 4);
            let ii0 = numroc(ia, nb, grid.myrow(), 3);
            let mut a = Mat::<f32>::zeros(numroc(30, nb, grid.myrow(), 3) - ii0, 2);
            let mut l1 = Mat::zeros(2, 2);
            let mut dpiv = vec![0; 2];
            let panel = Panel::new(&grid, a.as_mut(), l1.as_mut(), &mut dpiv, ia, nb);
            let rows = (0..panel.a.nrows())
                .map(|r| panel.global_row(r))
                .collect::<Vec<_>>();
            Ok::<_, SolveError>((panel.prow(), panel.is_current(), rows))
        });
        for (myrow, r) in out.into_iter().enumerate() {
            let (prow, curr, rows) = r.unwrap();
            assert!(all(prow == 2, curr == (myrow == 2)));
            for g in rows {
                assert!(all(g >= 8, owner(g, 4, 3) == myrow));
                assert!(global_to_local(g, 4, 3) >= numroc(8, 4, myrow, 3));
            }
        }
    }
}

//! Block-cyclically distributed dense matrix.

use crate::{
    assert,
    comm::{gatherv, CommError, Communicator, Tag},
    grid::{local_to_global, numroc, Grid},
    mat::{Mat, MatMut, MatRef},
    utils::{as_bytes, as_bytes_mut},
    Real,
};
use core::mem::size_of;

/// Matrix whose `nb x nb` blocks are dealt cyclically over a process grid, in both dimensions.
///
/// Each process stores its blocks in a single local column-major matrix, in increasing global
/// order.
#[derive(Clone)]
pub struct DistMatrix<T> {
    nrows: usize,
    ncols: usize,
    nb: usize,
    nprow: usize,
    npcol: usize,
    myrow: usize,
    mycol: usize,
    local: Mat<T>,
}

impl<T: Real> DistMatrix<T> {
    /// Creates the local part of an `nrows x ncols` matrix whose element `(i, j)` is `f(i, j)`.
    ///
    /// `f` is only evaluated on the elements owned by the calling process.
    #[track_caller]
    pub fn from_fn<C: Communicator>(
        grid: &Grid<C>,
        nrows: usize,
        ncols: usize,
        nb: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        assert!(nb > 0);
        let (nprow, npcol) = (grid.nprow(), grid.npcol());
        let (myrow, mycol) = (grid.myrow(), grid.mycol());
        let local = Mat::from_fn(
            numroc(nrows, nb, myrow, nprow),
            numroc(ncols, nb, mycol, npcol),
            |i, j| {
                f(
                    local_to_global(i, nb, myrow, nprow),
                    local_to_global(j, nb, mycol, npcol),
                )
            },
        );
        Self {
            nrows,
            ncols,
            nb,
            nprow,
            npcol,
            myrow,
            mycol,
            local,
        }
    }

    /// Number of global rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of global columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Block size.
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Whether the matrix is laid out over `grid`.
    #[inline]
    pub fn is_on<C: Communicator>(&self, grid: &Grid<C>) -> bool {
        self.nprow == grid.nprow()
            && self.npcol == grid.npcol()
            && self.myrow == grid.myrow()
            && self.mycol == grid.mycol()
    }

    /// Local part of the matrix.
    #[inline]
    pub fn local(&self) -> MatRef<'_, T> {
        self.local.as_ref()
    }

    /// Local part of the matrix.
    #[inline]
    pub fn local_mut(&mut self) -> MatMut<'_, T> {
        self.local.as_mut()
    }

    /// Assembles the global matrix on world rank `root`, which receives `Some`. Every other
    /// rank receives `None`.
    pub fn gather<C: Communicator>(
        &self,
        grid: &Grid<C>,
        root: usize,
    ) -> Result<Option<Mat<T>>, CommError> {
        assert!(self.is_on(grid));
        let world = grid.world();
        let size = world.size();
        let (nprow, npcol, nb) = (self.nprow, self.npcol, self.nb);
        let local_len = |rank: usize| {
            numroc(self.nrows, nb, rank / npcol, nprow) * numroc(self.ncols, nb, rank % npcol, npcol)
        };
        let counts = (0..size)
            .map(|r| local_len(r) * size_of::<T>())
            .collect::<Vec<_>>();

        let is_root = world.rank() == root;
        let mut all = vec![T::zero(); if is_root { (0..size).map(local_len).sum() } else { 0 }];
        gatherv(
            world,
            root,
            Tag::GATHER,
            &counts,
            as_bytes(self.local.as_slice()),
            as_bytes_mut(&mut all),
        )?;
        if !is_root {
            return Ok(None);
        }

        let mut out = Mat::zeros(self.nrows, self.ncols);
        let mut start = 0;
        for rank in 0..size {
            let (prow, pcol) = (rank / npcol, rank % npcol);
            let mp = numroc(self.nrows, nb, prow, nprow);
            let nq = numroc(self.ncols, nb, pcol, npcol);
            let block = MatRef::from_column_major_slice(&all[start..start + mp * nq], mp, nq);
            for j in 0..nq {
                let gj = local_to_global(j, nb, pcol, npcol);
                for i in 0..mp {
                    out.write(local_to_global(i, nb, prow, nprow), gj, block.read(i, j));
                }
            }
            start += mp * nq;
        }
        Ok(Some(out))
    }
}

//! 2D process grid and block-cyclic index arithmetic.
//!
//! Ranks are laid out row-major: the process at grid coordinates `(myrow, mycol)` has world rank
//! `myrow * npcol + mycol`. A global matrix index `g` with block size `nb` is owned by process
//! `(g / nb) % nprocs` along that dimension, where it lives at local index
//! `(g / (nb * nprocs)) * nb + g % nb`.

use crate::{
    assert,
    comm::{Communicator, ScopedComm},
    error::SolveError,
};

/// Number of indices of `0..n` owned by process `iproc` out of `nprocs`, when distributing
/// blocks of size `nb` cyclically starting at process `0`.
#[inline]
pub fn numroc(n: usize, nb: usize, iproc: usize, nprocs: usize) -> usize {
    debug_assert!(iproc < nprocs);
    let nblocks = n / nb;
    let mut count = (nblocks / nprocs) * nb;
    let extra = nblocks % nprocs;
    if iproc < extra {
        count += nb;
    } else if iproc == extra {
        count += n % nb;
    }
    count
}

/// Process owning global index `g`.
#[inline]
pub fn owner(g: usize, nb: usize, nprocs: usize) -> usize {
    (g / nb) % nprocs
}

/// Local index of global index `g` on its owner.
#[inline]
pub fn global_to_local(g: usize, nb: usize, nprocs: usize) -> usize {
    (g / (nb * nprocs)) * nb + g % nb
}

/// Global index of local index `l` on process `iproc`.
#[inline]
pub fn local_to_global(l: usize, nb: usize, iproc: usize, nprocs: usize) -> usize {
    ((l / nb) * nprocs + iproc) * nb + l % nb
}

/// 2D process grid over a world communicator.
#[derive(Debug)]
pub struct Grid<C> {
    comm: C,
    nprow: usize,
    npcol: usize,
    myrow: usize,
    mycol: usize,
}

impl<C: Communicator> Grid<C> {
    /// Arranges the ranks of `comm` into an `nprow` by `npcol` grid.
    pub fn new(comm: C, nprow: usize, npcol: usize) -> Result<Self, SolveError> {
        if nprow == 0 || npcol == 0 || nprow * npcol != comm.size() {
            return Err(SolveError::InvalidGrid {
                nprow,
                npcol,
                size: comm.size(),
            });
        }
        let rank = comm.rank();
        Ok(Self {
            nprow,
            npcol,
            myrow: rank / npcol,
            mycol: rank % npcol,
            comm,
        })
    }

    /// Number of process rows.
    #[inline]
    pub fn nprow(&self) -> usize {
        self.nprow
    }

    /// Number of process columns.
    #[inline]
    pub fn npcol(&self) -> usize {
        self.npcol
    }

    /// Grid row of the calling process.
    #[inline]
    pub fn myrow(&self) -> usize {
        self.myrow
    }

    /// Grid column of the calling process.
    #[inline]
    pub fn mycol(&self) -> usize {
        self.mycol
    }

    /// World rank of the process at `(row, col)`.
    #[inline]
    #[track_caller]
    pub fn rank_of(&self, row: usize, col: usize) -> usize {
        assert!(all(row < self.nprow, col < self.npcol));
        row * self.npcol + col
    }

    /// The world communicator.
    #[inline]
    pub fn world(&self) -> &C {
        &self.comm
    }

    /// Consumes the grid and returns the world communicator.
    #[inline]
    pub fn into_comm(self) -> C {
        self.comm
    }

    /// Communicator over the processes of the caller's grid row, ranked by grid column.
    #[inline]
    pub fn row_comm(&self) -> ScopedComm<'_, C> {
        ScopedComm::new(&self.comm, self.myrow * self.npcol, 1, self.npcol)
    }

    /// Communicator over the processes of the caller's grid column, ranked by grid row.
    #[inline]
    pub fn col_comm(&self) -> ScopedComm<'_, C> {
        ScopedComm::new(&self.comm, self.mycol, self.npcol, self.nprow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::comm::LocalUniverse;
    use std::time::Duration;

    #[test]
    fn block_cyclic_maps_are_inverse() {
        for (n, nb, nprocs) in [(17, 3, 2), (64, 8, 4), (5, 8, 3), (30, 1, 7)] {
            let mut counts = vec![0; nprocs];
            for g in 0..n {
                let p = owner(g, nb, nprocs);
                let l = global_to_local(g, nb, nprocs);
                assert!(local_to_global(l, nb, p, nprocs) == g);
                assert!(l == counts[p]);
                counts[p] += 1;
            }
            for (p, &count) in counts.iter().enumerate() {
                assert!(numroc(n, nb, p, nprocs) == count);
            }
        }
    }

    #[test]
    fn numroc_counts_rows_before_a_global_index() {
        // the local offset of the first row >= ia is the number of rows owned below ia.
        let (nb, nprocs) = (4, 3);
        for ia in 0..40 {
            for p in 0..nprocs {
                let below = (0..ia).filter(|&g| owner(g, nb, nprocs) == p).count();
                assert!(numroc(ia, nb, p, nprocs) == below);
            }
        }
    }

    #[test]
    fn grid_coordinates() {
        let out = LocalUniverse::run(6, Duration::from_secs(10), |comm| {
            let grid = Grid::new(comm, 2, 3)?;
            let row = grid.row_comm();
            let col = grid.col_comm();
            assert!(grid.rank_of(grid.myrow(), grid.mycol()) == grid.world().rank());
            Ok::<_, SolveError>((
                grid.myrow(),
                grid.mycol(),
                row.rank(),
                row.size(),
                col.rank(),
                col.size(),
            ))
        });
        for (rank, r) in out.into_iter().enumerate() {
            let (myrow, mycol, rr, rs, cr, cs) = r.unwrap();
            assert!(all(myrow == rank / 3, mycol == rank % 3));
            assert!(all(rr == mycol, rs == 3, cr == myrow, cs == 2));
        }
    }

    #[test]
    fn mismatched_grid_is_rejected() {
        let out = LocalUniverse::run(4, Duration::from_secs(10), |comm| {
            Grid::new(comm, 3, 2).map(|_| ())
        });
        for r in out {
            assert!(matches!(r, Err(SolveError::InvalidGrid { size: 4, .. })));
        }
    }
}

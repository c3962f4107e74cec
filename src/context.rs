//! Per-process state.
//!
//! A [`Context`] is created once per rank at startup, passed by reference to every distributed
//! routine, and dropped at shutdown. It owns the grid, and with it the communicator, and the
//! kernels selected for the run. There is no global communicator or device state.

use crate::{
    comm::Communicator,
    error::SolveError,
    grid::Grid,
    kernel::{Kernel, KernelStrategy, Kernels, SelectKernel},
};

/// Configuration of a [`Context`].
#[derive(Default, Copy, Clone, Debug)]
#[non_exhaustive]
pub struct ContextParams {
    /// Kernel implementation used by this rank.
    pub kernel: KernelStrategy,
}

impl ContextParams {
    /// Returns the parameters with the given kernel strategy.
    #[inline]
    pub fn with_kernel(mut self, kernel: KernelStrategy) -> Self {
        self.kernel = kernel;
        self
    }
}

/// State shared by the distributed routines of one rank.
#[derive(Debug)]
pub struct Context<C> {
    grid: Grid<C>,
    kernels: Kernels,
}

impl<C: Communicator> Context<C> {
    /// Builds the grid over `comm` and instantiates the kernels.
    pub fn new(
        comm: C,
        nprow: usize,
        npcol: usize,
        params: ContextParams,
    ) -> Result<Self, SolveError> {
        let grid = Grid::new(comm, nprow, npcol)?;
        log::debug!(
            target: "hplai",
            "rank {} at ({}, {}) of a {}x{} grid, kernel {:?}",
            grid.world().rank(),
            grid.myrow(),
            grid.mycol(),
            nprow,
            npcol,
            params.kernel,
        );
        Ok(Self {
            grid,
            kernels: Kernels::new(params.kernel),
        })
    }

    /// The process grid.
    #[inline]
    pub fn grid(&self) -> &Grid<C> {
        &self.grid
    }

    /// The kernel for scalar type `T`.
    #[inline]
    pub fn kernel<T: SelectKernel>(&self) -> &dyn Kernel<T> {
        T::select(&self.kernels)
    }

    /// Tears the context down and returns the communicator.
    #[inline]
    pub fn into_comm(self) -> C {
        self.grid.into_comm()
    }
}

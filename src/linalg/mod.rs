//! Distributed linear algebra routines.
//!
//! - [`pfact`] factors one panel across a process column.
//! - [`pivot_index`] compresses the pivots of a panel into a permutation list.
//! - [`laswp`] applies that list to the trailing columns.
//! - [`pgesv`] drives the blocked factorization of a whole [`dist::DistMatrix`].
//! - [`refine`] solves a linear system to full precision from a reduced precision factorization.

pub mod dist;
pub mod laswp;
pub mod pfact;
pub mod pgesv;
pub mod pivot_index;
pub mod refine;

//! Error types.

use crate::comm::CommError;

/// Failure of a distributed factorization or solve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SolveError {
    /// A communication step failed. The distributed state is inconsistent and the whole
    /// computation must be abandoned.
    Comm(CommError),
    /// The process grid does not match the number of ranks.
    InvalidGrid {
        nprow: usize,
        npcol: usize,
        size: usize,
    },
    /// The matrix is exactly singular: the pivot of global column `column` is zero.
    Singular { column: usize },
    /// Block size or matrix dimension not usable.
    InvalidParameter(&'static str),
}

impl core::fmt::Display for SolveError {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for SolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolveError::Comm(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommError> for SolveError {
    #[inline]
    fn from(value: CommError) -> Self {
        Self::Comm(value)
    }
}

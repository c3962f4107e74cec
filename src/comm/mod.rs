//! Message passing substrate.
//!
//! Ranks cooperate exclusively through a [`Communicator`]: blocking, tagged, point-to-point
//! transfers of byte buffers whose length both sides know in advance. Collectives are built on
//! top of it as free functions, so they work the same on the world communicator and on the
//! process row/column views returned by [`crate::Grid::row_comm`] and
//! [`crate::Grid::col_comm`].
//!
//! Every failure is reported as a [`CommError`] and is fatal to the operation that observed it.
//! Nothing in the crate retries a transfer.

use crate::assert;

mod local;

pub use local::{LocalComm, LocalUniverse};

/// Message tag, used to catch mismatched send/receive pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

impl Tag {
    /// Pivot reduction and pivot row distribution.
    pub const PIVOT: Tag = Tag(1);
    /// Panel broadcast along a process row.
    pub const PANEL: Tag = Tag(2);
    /// Displaced rows scattered from the panel's process row.
    pub const SPREAD: Tag = Tag(3);
    /// Ring circulation of `U` rows.
    pub const ROLL: Tag = Tag(4);
    /// Rows gathered to a root.
    pub const GATHER: Tag = Tag(5);
    /// Generic broadcast.
    pub const BCAST: Tag = Tag(6);
    /// Point-to-point transfer of displaced rows.
    pub const SWAP: Tag = Tag(7);
}

/// Failure of a communication operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommError {
    /// No message arrived from `peer` before the receive deadline.
    Timeout { peer: usize },
    /// `peer` hung up.
    Disconnected { peer: usize },
    /// The message from `peer` carried an unexpected tag.
    TagMismatch {
        peer: usize,
        expected: Tag,
        found: Tag,
    },
    /// The message from `peer` did not have the expected length in bytes.
    SizeMismatch {
        peer: usize,
        expected: usize,
        found: usize,
    },
    /// `rank` is not a member of a communicator with `size` ranks.
    InvalidRank { rank: usize, size: usize },
}

impl core::fmt::Display for CommError {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for CommError {}

/// Blocking point-to-point communication between the ranks of a group.
pub trait Communicator {
    /// Rank of the calling process in the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Sends `data` to `dst`.
    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), CommError>;

    /// Receives exactly `data.len()` bytes from `src` into `data`.
    fn recv(&self, src: usize, tag: Tag, data: &mut [u8]) -> Result<(), CommError>;

    /// Sends `send` to `dst` while receiving `recv` from `src`.
    ///
    /// Implementations must not deadlock when `dst` performs the matching call with the roles
    /// reversed.
    fn sendrecv(
        &self,
        dst: usize,
        send: &[u8],
        src: usize,
        recv: &mut [u8],
        tag: Tag,
    ) -> Result<(), CommError>;
}

impl<C: Communicator + ?Sized> Communicator for &C {
    #[inline]
    fn rank(&self) -> usize {
        (**self).rank()
    }
    #[inline]
    fn size(&self) -> usize {
        (**self).size()
    }
    #[inline]
    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), CommError> {
        (**self).send(dst, tag, data)
    }
    #[inline]
    fn recv(&self, src: usize, tag: Tag, data: &mut [u8]) -> Result<(), CommError> {
        (**self).recv(src, tag, data)
    }
    #[inline]
    fn sendrecv(
        &self,
        dst: usize,
        send: &[u8],
        src: usize,
        recv: &mut [u8],
        tag: Tag,
    ) -> Result<(), CommError> {
        (**self).sendrecv(dst, send, src, recv, tag)
    }
}

/// View of a strided subset of the ranks of a communicator.
///
/// Local rank `i` maps to rank `first + i * stride` of the parent. Process rows and process
/// columns of a row-major grid are both of this shape.
pub struct ScopedComm<'a, C: ?Sized> {
    parent: &'a C,
    first: usize,
    stride: usize,
    size: usize,
    rank: usize,
}

impl<'a, C: Communicator + ?Sized> ScopedComm<'a, C> {
    /// Creates the view. The calling process must be one of its members.
    ///
    /// # Panics
    /// Panics if the calling rank of `parent` is not a member of the view, or if the view
    /// addresses ranks past the end of `parent`.
    #[track_caller]
    pub fn new(parent: &'a C, first: usize, stride: usize, size: usize) -> Self {
        assert!(all(size > 0, stride > 0));
        assert!(first + (size - 1) * stride < parent.size());
        let me = parent.rank();
        assert!(me >= first);
        let rank = (me - first) / stride;
        assert!(all(rank < size, first + rank * stride == me));
        Self {
            parent,
            first,
            stride,
            size,
            rank,
        }
    }

    /// Rank in the parent communicator of local rank `rank`.
    #[inline]
    pub fn parent_rank(&self, rank: usize) -> Result<usize, CommError> {
        if rank < self.size {
            Ok(self.first + rank * self.stride)
        } else {
            Err(CommError::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }
}

impl<C: Communicator + ?Sized> Communicator for ScopedComm<'_, C> {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), CommError> {
        self.parent.send(self.parent_rank(dst)?, tag, data)
    }

    fn recv(&self, src: usize, tag: Tag, data: &mut [u8]) -> Result<(), CommError> {
        self.parent.recv(self.parent_rank(src)?, tag, data)
    }

    fn sendrecv(
        &self,
        dst: usize,
        send: &[u8],
        src: usize,
        recv: &mut [u8],
        tag: Tag,
    ) -> Result<(), CommError> {
        self.parent.sendrecv(
            self.parent_rank(dst)?,
            send,
            self.parent_rank(src)?,
            recv,
            tag,
        )
    }
}

/// Exchanges buffers with `peer`: `send` goes out while `recv` is filled with the peer's
/// buffer.
#[inline]
pub fn exchange<C: Communicator + ?Sized>(
    comm: &C,
    peer: usize,
    tag: Tag,
    send: &[u8],
    recv: &mut [u8],
) -> Result<(), CommError> {
    comm.sendrecv(peer, send, peer, recv, tag)
}

/// Broadcasts `data` from `root` to every rank of `comm` along a binomial tree.
///
/// On non-root ranks, `data` is overwritten with the root's buffer, which must have the same
/// length everywhere.
pub fn broadcast<C: Communicator + ?Sized>(
    comm: &C,
    root: usize,
    tag: Tag,
    data: &mut [u8],
) -> Result<(), CommError> {
    let size = comm.size();
    if size == 1 {
        return Ok(());
    }
    let rel = (comm.rank() + size - root) % size;

    let mut mask = 1;
    while mask < size {
        if rel & mask != 0 {
            comm.recv((rel - mask + root) % size, tag, data)?;
            break;
        }
        mask <<= 1;
    }
    mask >>= 1;
    while mask > 0 {
        if rel + mask < size {
            comm.send((rel + mask + root) % size, tag, data)?;
        }
        mask >>= 1;
    }
    Ok(())
}

/// Scatters variable sized blocks from `root` along a binomial tree.
///
/// `counts[r]` is the length in bytes of the block destined to rank `r`, and must be identical
/// on every rank. On the root, `send` holds the blocks concatenated in rank order; it is ignored
/// elsewhere. Every rank, the root included, receives its own block in `recv`.
pub fn scatterv<C: Communicator + ?Sized>(
    comm: &C,
    root: usize,
    tag: Tag,
    counts: &[usize],
    send: &[u8],
    recv: &mut [u8],
) -> Result<(), CommError> {
    let size = comm.size();
    assert!(all(counts.len() == size, root < size));
    let rank = comm.rank();
    assert!(recv.len() == counts[rank]);

    // blocks are laid out by relative rank, so that every subtree owns a contiguous range.
    let count_rel = |rel: usize| counts[(rel + root) % size];
    let span = |rel: usize, len: usize| (rel..rel + len).map(count_rel).sum::<usize>();
    let rel = (rank + size - root) % size;

    let mut mask = 1;
    while mask < size && rel & mask == 0 {
        mask <<= 1;
    }
    let subtree_len = Ord::min(mask, size - rel);

    let mut buf;
    if rel == 0 {
        let total = counts.iter().sum::<usize>();
        assert!(send.len() == total);
        buf = Vec::with_capacity(total);
        for r in 0..size {
            let abs = (r + root) % size;
            let start = counts[..abs].iter().sum::<usize>();
            buf.extend_from_slice(&send[start..start + counts[abs]]);
        }
    } else {
        buf = vec![0u8; span(rel, subtree_len)];
        comm.recv((rel - mask + root) % size, tag, &mut buf)?;
    }

    mask >>= 1;
    while mask > 0 {
        if rel + mask < size {
            let child = rel + mask;
            let child_len = Ord::min(mask, size - child);
            let start = span(rel, mask);
            let len = span(child, child_len);
            comm.send((child + root) % size, tag, &buf[start..start + len])?;
        }
        mask >>= 1;
    }
    recv.copy_from_slice(&buf[..counts[rank]]);
    Ok(())
}

/// Gathers variable sized blocks to `root`.
///
/// `counts[r]` is the length in bytes of the block sent by rank `r`. On the root, `recv` holds
/// the blocks concatenated in rank order after the call; it is ignored elsewhere.
pub fn gatherv<C: Communicator + ?Sized>(
    comm: &C,
    root: usize,
    tag: Tag,
    counts: &[usize],
    send: &[u8],
    recv: &mut [u8],
) -> Result<(), CommError> {
    let size = comm.size();
    let rank = comm.rank();
    assert!(all(counts.len() == size, root < size, send.len() == counts[rank]));
    if rank != root {
        return comm.send(root, tag, send);
    }
    assert!(recv.len() == counts.iter().sum::<usize>());
    let mut start = 0;
    for (r, &count) in counts.iter().enumerate() {
        let block = &mut recv[start..start + count];
        if r == root {
            block.copy_from_slice(send);
        } else {
            comm.recv(r, tag, block)?;
        }
        start += count;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(20);

    #[test]
    fn broadcast_from_every_root() {
        for size in [1, 2, 3, 5, 8] {
            for root in 0..size {
                let out = LocalUniverse::run(size, TIMEOUT, |comm| {
                    let mut data = if comm.rank() == root {
                        vec![root as u8 + 1; 5]
                    } else {
                        vec![0u8; 5]
                    };
                    broadcast(&comm, root, Tag::BCAST, &mut data).map(|()| data)
                });
                for data in out {
                    assert!(data.unwrap() == vec![root as u8 + 1; 5]);
                }
            }
        }
    }

    #[test]
    fn scatter_and_gather_variable_blocks() {
        for size in [1, 2, 3, 6, 7] {
            for root in [0, size / 2, size - 1] {
                let counts = (0..size).map(|r| (r * 3) % 4).collect::<Vec<_>>();
                let out = LocalUniverse::run(size, TIMEOUT, |comm| {
                    let rank = comm.rank();
                    let send = if rank == root {
                        (0..size)
                            .flat_map(|r| vec![r as u8; counts[r]])
                            .collect::<Vec<_>>()
                    } else {
                        Vec::new()
                    };
                    let mut mine = vec![0xffu8; counts[rank]];
                    scatterv(&comm, root, Tag::SPREAD, &counts, &send, &mut mine)?;
                    assert!(mine.iter().all(|&b| b == rank as u8));

                    let mut gathered = vec![0u8; if rank == root { send.len() } else { 0 }];
                    gatherv(&comm, root, Tag::GATHER, &counts, &mine, &mut gathered)?;
                    if rank == root {
                        assert!(gathered == send);
                    }
                    Ok::<_, CommError>(())
                });
                for r in out {
                    r.unwrap();
                }
            }
        }
    }

    #[test]
    fn scoped_views_address_rows_and_columns() {
        // 2x3 grid, row-major ranks.
        let out = LocalUniverse::run(6, TIMEOUT, |comm| {
            let (myrow, mycol) = (comm.rank() / 3, comm.rank() % 3);
            let row = ScopedComm::new(&comm, myrow * 3, 1, 3);
            let col = ScopedComm::new(&comm, mycol, 3, 2);
            assert!(all(row.rank() == mycol, col.rank() == myrow));

            let mut from_row_root = [comm.rank() as u8];
            broadcast(&row, 0, Tag::BCAST, &mut from_row_root)?;
            let mut from_peer = [0u8];
            exchange(&col, 1 - myrow, Tag::SWAP, &[comm.rank() as u8], &mut from_peer)?;
            Ok::<_, CommError>((from_row_root[0], from_peer[0]))
        });
        for (rank, r) in out.into_iter().enumerate() {
            let (root, peer) = r.unwrap();
            assert!(root as usize == (rank / 3) * 3);
            assert!(peer as usize == (rank + 3) % 6);
        }
    }

    #[test]
    fn invalid_rank_is_reported() {
        let out = LocalUniverse::run(2, TIMEOUT, |comm| {
            let col = ScopedComm::new(&comm, comm.rank(), 2, 1);
            col.send(1, Tag::SWAP, &[])
        });
        for r in out {
            assert!(r == Err(CommError::InvalidRank { rank: 1, size: 1 }));
        }
    }
}

//! Pivot reduction and swap-broadcast.
//!
//! The work vectors of a process column are reduced with a bidirectional butterfly: at step `k`
//! every process exchanges its work vector with the process whose rank differs in bit `k`, and
//! both keep the better candidate. Since the current row travels in the same message as the
//! candidate, after `log2(P)` exchanges every process holds the pivot row *and* the row it
//! replaces, so the swap itself needs no further communication. When `P` is not a power of two,
//! the ranks above the largest power of two first hand their work vector to a partner below it,
//! and receive the final result from that partner at the end.

use super::pivot::WorkVector;
use crate::{
    assert,
    comm::{exchange, CommError, Communicator, Tag},
    mat::MatMut,
    Real,
};

/// Reduces the work vectors of all the ranks of `col`, so that every rank ends up with the same
/// winning candidate, its row, and the current row.
///
/// `send` and `recv` are scratch buffers of [`super::pivot::wire_len`] bytes.
pub fn reduce_pivot<T: Real, C: Communicator + ?Sized>(
    col: &C,
    work: &mut WorkVector<'_, T>,
    send: &mut [u8],
    recv: &mut [u8],
) -> Result<(), CommError> {
    let size = col.size();
    let rank = col.rank();
    if size == 1 {
        return Ok(());
    }

    let mut p2 = 1;
    while 2 * p2 <= size {
        p2 *= 2;
    }
    let extra = size - p2;

    if rank >= p2 {
        let partner = rank - p2;
        work.encode(send);
        col.send(partner, Tag::PIVOT, send)?;
        col.recv(partner, Tag::PIVOT, recv)?;
        work.combine_encoded(recv);
        return Ok(());
    }

    if rank < extra {
        col.recv(rank + p2, Tag::PIVOT, recv)?;
        work.combine_encoded(recv);
    }
    let mut mask = 1;
    while mask < p2 {
        work.encode(send);
        exchange(col, rank ^ mask, Tag::PIVOT, send, recv)?;
        work.combine_encoded(recv);
        mask <<= 1;
    }
    if rank < extra {
        work.encode(send);
        col.send(rank + p2, Tag::PIVOT, send)?;
    }
    Ok(())
}

#[inline]
fn write_row<T: Real>(a: &mut MatMut<'_, T>, row: usize, values: &[T]) {
    for (j, &v) in values.iter().enumerate() {
        a.write(row, j, v);
    }
}

#[inline]
fn read_row<T: Real>(a: &MatMut<'_, T>, row: usize, out: &mut [T]) {
    for (j, out) in out.iter_mut().enumerate() {
        *out = a.read(row, j);
    }
}

/// Finds the pivot of panel column `jj` across the process column, moves it into position and
/// records it.
///
/// On entry, `work` holds the local candidate of the column. `ii` is the local row of the pivot
/// position, meaningful on the process row `prow` only. On exit:
/// - on the owner of the pivot row, that row holds the former current row,
/// - on `prow`, row `ii` holds the pivot row,
/// - on every process, row `jj` of `l1` holds the pivot row and `dpiv[jj]` its global index.
///
/// Returns the signed pivot value.
pub fn swap_broadcast<T: Real, C: Communicator + ?Sized>(
    col: &C,
    prow: usize,
    mut a: MatMut<'_, T>,
    ii: usize,
    jj: usize,
    mut l1: MatMut<'_, T>,
    dpiv: &mut [usize],
    work: &mut WorkVector<'_, T>,
    send: &mut [u8],
    recv: &mut [u8],
) -> Result<T, CommError> {
    let me = col.rank();
    let curr = me == prow;

    if !work.candidate.is_sentinel() {
        read_row(&a, work.candidate.local_row, work.max_row);
    }
    if curr {
        read_row(&a, ii, work.cur_row);
        work.has_current = true;
    }

    reduce_pivot(col, work, send, recv)?;

    let winner = work.candidate;
    assert!(all(!winner.is_sentinel(), work.has_current));

    if me == winner.owner {
        write_row(&mut a, winner.local_row, work.cur_row);
    }
    if curr {
        write_row(&mut a, ii, work.max_row);
    }
    write_row(&mut l1, jj, work.max_row);
    dpiv[jj] = winner.global_row;

    Ok(work.max_row[jj])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{
        comm::LocalUniverse,
        linalg::pfact::pivot::{wire_len, Candidate},
    };
    use std::time::Duration;

    #[test]
    fn butterfly_agrees_on_every_column_size() {
        for size in 1..=7 {
            let jb = 3;
            let out = LocalUniverse::run(size, Duration::from_secs(20), |comm| {
                let rank = comm.rank();
                let mut rows = vec![0.0f64; 2 * jb];
                let mut work = WorkVector::new(&mut rows, jb, rank);
                // ranks 1 and size - 1 tie on magnitude, the lower global row must win.
                let value = if rank == 1 || rank + 1 == size {
                    -10.0
                } else {
                    rank as f64
                };
                work.candidate = Candidate {
                    value,
                    global_row: 100 - rank,
                    local_row: rank,
                    owner: rank,
                };
                work.max_row.fill(rank as f64);
                if rank == 0 {
                    work.cur_row.fill(42.0);
                    work.has_current = true;
                }
                let mut send = vec![0u8; wire_len::<f64>(jb)];
                let mut recv = vec![0u8; wire_len::<f64>(jb)];
                reduce_pivot(&comm, &mut work, &mut send, &mut recv)?;
                Ok::<_, CommError>((
                    *work.candidate(),
                    work.max_row().to_vec(),
                    work.cur_row().map(|r| r.to_vec()),
                ))
            });

            let expected_owner = if size == 1 { 0 } else { size - 1 };
            for r in out {
                let (c, max_row, cur_row) = r.unwrap();
                assert!(c.owner == expected_owner);
                assert!(max_row == vec![expected_owner as f64; jb]);
                assert!(cur_row == Some(vec![42.0; jb]));
            }
        }
    }
}

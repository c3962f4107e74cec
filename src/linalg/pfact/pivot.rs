//! Local pivot search and the work vector exchanged during the pivot reduction.

use crate::{assert, mat::MatRef, Real};
use core::mem::size_of;

/// Number of header words in front of the rows of a work vector on the wire: global row, local
/// row, owner process row and a flag telling whether the current row is present.
pub const WORK_HEADER: usize = 4;

/// Pivot candidate reported by one process.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate<T> {
    /// Signed value of the candidate entry.
    pub value: T,
    /// Global row of the candidate, [`usize::MAX`] if the process had no row to offer.
    pub global_row: usize,
    /// Row of the candidate inside the local panel of its owner.
    pub local_row: usize,
    /// Process row owning the candidate.
    pub owner: usize,
}

impl<T: Real> Candidate<T> {
    /// Candidate of a process whose column segment is empty. It never wins against a row that
    /// exists.
    #[inline]
    pub fn sentinel(owner: usize) -> Self {
        Self {
            value: T::zero(),
            global_row: usize::MAX,
            local_row: 0,
            owner,
        }
    }

    /// Whether the process offers an actual row.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.global_row == usize::MAX
    }

    /// Returns `true` if `other` should be chosen over `self` as pivot.
    ///
    /// Larger magnitudes win and ties go to the lower global row, which makes the choice
    /// independent of the order in which candidates are combined. `NaN` magnitudes are larger
    /// than any number, so that they surface instead of being silently skipped.
    #[inline]
    pub fn is_beaten_by(&self, other: &Self) -> bool {
        let mine = self.value.abs();
        let theirs = other.value.abs();
        match (mine.is_nan(), theirs.is_nan()) {
            (false, false) => {
                theirs > mine || (theirs == mine && other.global_row < self.global_row)
            }
            (true, false) => false,
            (false, true) => true,
            (true, true) => other.global_row < self.global_row,
        }
    }
}

/// Pivot search state of one process for the current column.
///
/// Holds the local candidate, a copy of its full panel row, and, once known, a copy of the
/// current row, i.e. the row sitting at the pivot position before the swap. Both rows span the
/// whole panel width, so that a single message carries everything needed to perform the swap on
/// every process.
pub struct WorkVector<'a, T> {
    pub(crate) candidate: Candidate<T>,
    pub(crate) max_row: &'a mut [T],
    pub(crate) cur_row: &'a mut [T],
    pub(crate) has_current: bool,
}

/// Length in bytes of an encoded work vector for a panel of width `jb`.
#[inline]
pub fn wire_len<T>(jb: usize) -> usize {
    WORK_HEADER * size_of::<u64>() + (1 + 2 * jb) * size_of::<T>()
}

#[inline]
fn put_word(out: &mut [u8], idx: usize, value: u64) {
    out[idx * 8..idx * 8 + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_word(bytes: &[u8], idx: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[idx * 8..idx * 8 + 8]);
    u64::from_le_bytes(word)
}

#[inline]
fn to_index(word: u64) -> usize {
    if word == u64::MAX {
        usize::MAX
    } else {
        word as usize
    }
}

impl<'a, T: Real> WorkVector<'a, T> {
    /// Creates a work vector over `rows`, which must hold `2 * jb` elements.
    #[track_caller]
    pub fn new(rows: &'a mut [T], jb: usize, owner: usize) -> Self {
        assert!(rows.len() == 2 * jb);
        let (max_row, cur_row) = rows.split_at_mut(jb);
        Self {
            candidate: Candidate::sentinel(owner),
            max_row,
            cur_row,
            has_current: false,
        }
    }

    /// The candidate currently held.
    #[inline]
    pub fn candidate(&self) -> &Candidate<T> {
        &self.candidate
    }

    /// Panel width.
    #[inline]
    pub fn jb(&self) -> usize {
        self.max_row.len()
    }

    /// Row of the candidate, once known.
    #[inline]
    pub fn max_row(&self) -> &[T] {
        &*self.max_row
    }

    /// Current row, once known.
    #[inline]
    pub fn cur_row(&self) -> Option<&[T]> {
        if self.has_current {
            Some(&*self.cur_row)
        } else {
            None
        }
    }

    /// Encodes the work vector into `out`, which must be [`wire_len`] bytes long.
    pub(crate) fn encode(&self, out: &mut [u8]) {
        let jb = self.jb();
        assert!(out.len() == wire_len::<T>(jb));
        let c = &self.candidate;
        put_word(out, 0, c.global_row as u64);
        put_word(out, 1, c.local_row as u64);
        put_word(out, 2, c.owner as u64);
        put_word(out, 3, self.has_current as u64);

        let (value, rows) = out[WORK_HEADER * 8..].split_at_mut(size_of::<T>());
        value.copy_from_slice(bytemuck::bytes_of(&c.value));
        let (max_row, cur_row) = rows.split_at_mut(jb * size_of::<T>());
        max_row.copy_from_slice(bytemuck::cast_slice(&*self.max_row));
        cur_row.copy_from_slice(bytemuck::cast_slice(&*self.cur_row));
    }

    /// Merges an encoded work vector received from a peer.
    ///
    /// The peer's candidate and row replace ours if it wins, and its current row is taken if we
    /// do not have it yet. Both sides of an exchange end up with identical contents.
    pub(crate) fn combine_encoded(&mut self, bytes: &[u8]) {
        let jb = self.jb();
        assert!(bytes.len() == wire_len::<T>(jb));
        let header = WORK_HEADER * 8;
        let sz = size_of::<T>();
        let theirs = Candidate {
            value: bytemuck::pod_read_unaligned::<T>(&bytes[header..header + sz]),
            global_row: to_index(get_word(bytes, 0)),
            local_row: get_word(bytes, 1) as usize,
            owner: get_word(bytes, 2) as usize,
        };
        let rows = &bytes[header + sz..];
        let (max_row, cur_row) = rows.split_at(jb * sz);

        if self.candidate.is_beaten_by(&theirs) {
            self.candidate = theirs;
            bytemuck::cast_slice_mut::<T, u8>(self.max_row).copy_from_slice(max_row);
        }
        if get_word(bytes, 3) != 0 && !self.has_current {
            bytemuck::cast_slice_mut::<T, u8>(self.cur_row).copy_from_slice(cur_row);
            self.has_current = true;
        }
    }
}

/// Scans `len` entries of column `col` of `a`, starting at row `first`, for the entry of largest
/// magnitude, and reports it as the local candidate of `work`.
///
/// `global_row` maps a row of `a` to its global index. Among equal magnitudes the first one
/// wins, which is also the one with the lowest global index. An empty segment reports the
/// sentinel candidate, and a segment of zeros reports a value of exactly zero.
pub fn local_max<T: Real>(
    a: MatRef<'_, T>,
    col: usize,
    first: usize,
    len: usize,
    owner: usize,
    global_row: impl Fn(usize) -> usize,
    work: &mut WorkVector<'_, T>,
) {
    work.has_current = false;
    if len == 0 {
        work.candidate = Candidate::sentinel(owner);
        return;
    }
    assert!(first + len <= a.nrows());
    let segment = a.col_as_slice(col);
    let segment = &segment[first..first + len];

    let mut imax = 0;
    let mut max = segment[0].abs();
    for (i, x) in segment.iter().enumerate().skip(1) {
        let abs = x.abs();
        if abs > max || (abs.is_nan() && !max.is_nan()) {
            imax = i;
            max = abs;
        }
    }

    let local_row = first + imax;
    work.candidate = Candidate {
        value: segment[imax],
        global_row: global_row(local_row),
        local_row,
        owner,
    };
}

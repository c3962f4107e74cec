//! Compression of a panel's pivot record into a permutation list.
//!
//! The panel factorization records its pivots as a sequence of elementary swaps: for column `k`,
//! rows `ia + k` and `dpiv[k]` are exchanged, in order. Applying that sequence to the trailing
//! matrix one swap at a time would move some rows several times, each move costing a message when
//! the two rows live on different processes.
//!
//! [`build`] follows every row through the sequence instead, and produces the list of pairs
//! `(src, dst)` meaning "the original row `src` ends up in row `dst`". The pairs are meant to be
//! applied simultaneously, so every row moves at most once. The first `jb` pairs are in canonical
//! order: pair `k` is the one whose destination is `ia + k`, i.e. it names the source of row `k`
//! of the `U` block. The remaining pairs move the rows displaced out of the top block.

use crate::assert;

/// Permutation list of a panel, as pairs `(src, dst)` of global row indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PivotIndex {
    ipid: Vec<usize>,
}

impl PivotIndex {
    /// Returns an empty list.
    #[inline]
    pub fn new() -> Self {
        Self { ipid: Vec::new() }
    }

    /// Returns the list as a flat slice `[src0, dst0, src1, dst1, ...]`.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.ipid
    }

    /// Number of pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.ipid.len() / 2
    }

    /// Whether the list holds no pair.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ipid.is_empty()
    }

    /// Returns pair `k`.
    #[inline]
    #[track_caller]
    pub fn pair(&self, k: usize) -> (usize, usize) {
        (self.ipid[2 * k], self.ipid[2 * k + 1])
    }

    /// Iterates over the pairs.
    #[inline]
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ipid.chunks_exact(2).map(|p| (p[0], p[1]))
    }
}

#[inline]
fn find_dst(ipid: &[usize], len: usize, row: usize) -> Option<usize> {
    (1..len).step_by(2).find(|&j| ipid[j] == row)
}

/// Builds the permutation list of the pivot record `dpiv` of a panel starting at global row
/// `ia`, into `out`.
///
/// `dpiv[k]` must be at least `ia + k`, as produced by the panel factorization.
///
/// # Panics
/// Panics if the list length leaves `[2 * jb, 4 * jb]`, which can only happen on a malformed
/// pivot record.
pub fn build(dpiv: &[usize], ia: usize, out: &mut PivotIndex) {
    let jb = dpiv.len();
    let ipid = &mut out.ipid;
    ipid.clear();
    if jb == 0 {
        return;
    }
    ipid.resize(4 * jb, 0);

    ipid[0] = dpiv[0];
    ipid[1] = ia;
    let mut len = 2;
    if dpiv[0] != ia {
        ipid[2] = ia;
        ipid[3] = dpiv[0];
        len = 4;
    }

    for (i, &dst) in dpiv.iter().enumerate().skip(1) {
        let src = ia + i;
        debug_assert!(dst >= src);
        let lst;
        let mut off;

        if src == dst {
            match find_dst(ipid, len, src) {
                Some(j) => {
                    lst = j - 1;
                    off = 0;
                }
                None => {
                    assert!(len + 2 <= ipid.len());
                    lst = len;
                    off = 2;
                    ipid[lst] = src;
                }
            }
            ipid[lst + 1] = dst;
        } else {
            let fnds = find_dst(ipid, len, src);
            let fndd = find_dst(ipid, len, dst);
            match fnds {
                Some(j) => {
                    ipid[j] = dst;
                    off = 0;
                }
                None => {
                    assert!(len + 2 <= ipid.len());
                    ipid[len] = src;
                    ipid[len + 1] = dst;
                    off = 2;
                }
            }
            match fndd {
                Some(j) => lst = j - 1,
                None => {
                    assert!(len + off + 2 <= ipid.len());
                    lst = len + off;
                    ipid[lst] = dst;
                    off += 2;
                }
            }
            ipid[lst + 1] = src;
        }

        let canonical = 2 * i;
        if lst != canonical {
            ipid.swap(lst, canonical);
            ipid.swap(lst + 1, canonical + 1);
        }
        len += off;
    }

    assert!(all(len >= 2 * jb, len <= 4 * jb));
    ipid.truncate(len);
}

/// Applies the pivot record `dpiv` of a panel starting at global row `ia` to `rows`, indexed by
/// global row, one elementary swap at a time.
pub fn apply_sequential<T>(dpiv: &[usize], ia: usize, rows: &mut [T]) {
    for (k, &p) in dpiv.iter().enumerate() {
        rows.swap(ia + k, p);
    }
}

/// Applies `ipid` to `rows`, indexed by global row, moving every listed row at once.
pub fn apply<T: Copy>(ipid: &PivotIndex, rows: &mut [T]) {
    let moved = ipid.pairs().map(|(src, _)| rows[src]).collect::<Vec<_>>();
    for ((_, dst), value) in ipid.pairs().zip(moved) {
        rows[dst] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use proptest::prelude::*;

    fn ipid_of(dpiv: &[usize], ia: usize) -> PivotIndex {
        let mut out = PivotIndex::new();
        build(dpiv, ia, &mut out);
        out
    }

    #[test]
    fn chain_through_the_top_block() {
        let ipid = ipid_of(&[2, 1, 5], 0);
        assert!(ipid.as_slice() == &[2, 0, 1, 1, 5, 2, 0, 5][..]);
        assert!(ipid.pair(3) == (0, 5));
    }

    #[test]
    fn no_row_moves() {
        let ipid = ipid_of(&[7, 8, 9, 10], 7);
        assert!(ipid.len() == 4);
        for (k, pair) in ipid.pairs().enumerate() {
            assert!(pair == (7 + k, 7 + k));
        }
    }

    #[test]
    fn rows_moving_within_the_top_block() {
        // 0 <-> 3, then 1 <-> 3, which brings the original row 0 into row 1.
        let ipid = ipid_of(&[3, 3, 2, 3], 0);
        assert!(ipid.len() == 4);
        let mut rows = (0..6).collect::<Vec<_>>();
        apply(&ipid, &mut rows);
        let mut expected = (0..6).collect::<Vec<_>>();
        apply_sequential(&[3, 3, 2, 3], 0, &mut expected);
        assert!(rows == expected);
        assert!(rows == [3, 0, 2, 1, 4, 5]);
    }

    #[test]
    fn longest_list() {
        let ipid = ipid_of(&[10, 11, 12], 0);
        assert!(ipid.len() == 6);
        assert!(ipid.pairs().take(3).eq([(10, 0), (11, 1), (12, 2)]));
        let displaced = ipid.pairs().skip(3).collect::<Vec<_>>();
        assert!(displaced.len() == 3);
        for k in 0..3 {
            assert!(displaced.contains(&(k, 10 + k)));
        }
    }

    #[test]
    fn empty_record() {
        assert!(ipid_of(&[], 3).is_empty());
    }

    fn pivot_record() -> impl Strategy<Value = (usize, Vec<usize>)> {
        (0usize..20, 1usize..16).prop_flat_map(|(ia, jb)| {
            let dpiv = (0..jb)
                .map(|k| (ia + k)..(ia + jb + 24))
                .collect::<Vec<_>>();
            (Just(ia), dpiv)
        })
    }

    proptest! {
        #[test]
        fn simultaneous_application_matches_swaps((ia, dpiv) in pivot_record()) {
            let jb = dpiv.len();
            let ipid = ipid_of(&dpiv, ia);
            prop_assert!(ipid.len() >= jb && ipid.len() <= 2 * jb);

            for k in 0..jb {
                prop_assert_eq!(ipid.pair(k).1, ia + k);
            }

            let n = ia + jb + 24;
            let mut by_pairs = (0..n).collect::<Vec<_>>();
            let mut by_swaps = by_pairs.clone();
            apply(&ipid, &mut by_pairs);
            apply_sequential(&dpiv, ia, &mut by_swaps);
            prop_assert_eq!(by_pairs, by_swaps);

            for (src, dst) in ipid.pairs().skip(jb) {
                prop_assert!(src >= ia && src < ia + jb);
                prop_assert!(dst >= ia + jb);
            }
        }
    }
}

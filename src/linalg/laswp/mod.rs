//! Application of a panel's row interchanges to the trailing columns.
//!
//! Once a panel is factored, its permutation list (see [`crate::linalg::pivot_index`]) has to be
//! applied to every column right of it. Within a process column, the rows involved fall in two
//! groups:
//! - the `jb` rows that end up in the top block form `U`, which every process of the column needs
//!   for the trailing update,
//! - the top block rows that are pushed out of it, the *displaced* rows, which only their new
//!   owner needs.
//!
//! [`plan`] splits the list into these two groups, and [`apply`] moves the rows, either with
//! [`LaswpStrategy::SpreadRoll`] or with [`LaswpStrategy::GatherBroadcast`]. The top block rows of
//! the panel's process row are left untouched: they are overwritten with the final `U` once the
//! triangular solve is done.

use crate::{
    assert,
    comm::{CommError, Communicator},
    grid::{global_to_local, numroc, owner},
    linalg::pivot_index::PivotIndex,
    mat::{MatMut, MatRef},
    Real,
};

mod gather_bcast;
mod spread_roll;

/// How rows are moved between the processes of a column.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LaswpStrategy {
    /// The displaced rows are scattered along a binomial tree from the panel's process row, then
    /// the pieces of `U` circulate along a ring in both directions.
    #[default]
    SpreadRoll,
    /// The pieces of `U` are gathered on the panel's process row and broadcast from there, and
    /// the displaced rows are sent directly to their owners.
    GatherBroadcast,
}

/// Storage of the `U` block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ULayout {
    /// `jb x nn`.
    #[default]
    Normal,
    /// `nn x jb`.
    Transposed,
}

/// Row interchange parameters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct LaswpParams {
    pub strategy: LaswpStrategy,
    pub layout: ULayout,
}

impl LaswpParams {
    #[inline]
    pub fn with_strategy(mut self, strategy: LaswpStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    pub fn with_layout(mut self, layout: ULayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Row movements implied by a permutation list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaswpPlan {
    ia: usize,
    u_src: Vec<usize>,
    displaced: Vec<(usize, usize)>,
}

impl LaswpPlan {
    /// Global index of the first panel row.
    #[inline]
    pub fn ia(&self) -> usize {
        self.ia
    }

    /// Panel width.
    #[inline]
    pub fn jb(&self) -> usize {
        self.u_src.len()
    }

    /// Global row whose content becomes row `k` of `U`.
    #[inline]
    pub fn u_source(&self, k: usize) -> usize {
        self.u_src[k]
    }

    /// Displaced rows, as pairs of an offset inside the top block and the global destination.
    #[inline]
    pub fn displaced(&self) -> &[(usize, usize)] {
        &self.displaced
    }
}

/// Splits the permutation list of a panel of width `jb` starting at global row `ia`.
#[track_caller]
pub fn plan(ipid: &PivotIndex, ia: usize, jb: usize) -> LaswpPlan {
    assert!(ipid.len() >= jb);
    let mut u_src = Vec::with_capacity(jb);
    let mut displaced = Vec::with_capacity(ipid.len() - jb);
    for (k, (src, dst)) in ipid.pairs().enumerate() {
        if k < jb {
            assert!(dst == ia + k);
            u_src.push(src);
        } else {
            assert!(all(src >= ia, src < ia + jb, dst >= ia + jb));
            displaced.push((src - ia, dst));
        }
    }
    LaswpPlan {
        ia,
        u_src,
        displaced,
    }
}

/// Placement of the local rows of the calling process.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RowMap {
    nb: usize,
    nprow: usize,
    myrow: usize,
    prow: usize,
    ii0: usize,
}

impl RowMap {
    #[inline]
    fn new(ia: usize, nb: usize, myrow: usize, nprow: usize) -> Self {
        Self {
            nb,
            nprow,
            myrow,
            prow: owner(ia, nb, nprow),
            ii0: numroc(ia, nb, myrow, nprow),
        }
    }

    #[inline]
    fn owner(&self, g: usize) -> usize {
        owner(g, self.nb, self.nprow)
    }

    /// Local row of global row `g`, which the calling process must own.
    #[inline]
    fn local(&self, g: usize) -> usize {
        debug_assert!(self.owner(g) == self.myrow);
        global_to_local(g, self.nb, self.nprow) - self.ii0
    }
}

impl LaswpPlan {
    /// Rows of `U` whose source lives on process row `p`, in increasing order.
    fn u_rows_of<'a>(&'a self, map: &'a RowMap, p: usize) -> impl Iterator<Item = usize> + 'a {
        (0..self.jb()).filter(move |&k| map.owner(self.u_src[k]) == p)
    }

    /// Displaced rows bound for process row `p`.
    fn displaced_to<'a>(
        &'a self,
        map: &'a RowMap,
        p: usize,
    ) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.displaced
            .iter()
            .copied()
            .filter(move |&(_, dst)| map.owner(dst) == p)
    }
}

#[inline]
fn push_row<T: Real>(a: MatRef<'_, T>, row: usize, out: &mut Vec<T>) {
    out.extend((0..a.ncols()).map(|j| a.read(row, j)));
}

#[inline]
fn write_row<T: Real>(a: &mut MatMut<'_, T>, row: usize, values: &[T]) {
    for (j, &v) in values.iter().enumerate() {
        a.write(row, j, v);
    }
}

#[inline]
fn write_u_row<T: Real>(u: &mut MatMut<'_, T>, layout: ULayout, k: usize, values: &[T]) {
    match layout {
        ULayout::Normal => write_row(u, k, values),
        ULayout::Transposed => u.col_as_slice_mut(k).copy_from_slice(values),
    }
}

/// Packs the rows of `U` owned by the calling process, in increasing order.
fn pack_u_piece<T: Real>(plan: &LaswpPlan, map: &RowMap, a: MatRef<'_, T>) -> Vec<T> {
    let mut out = Vec::new();
    for k in plan.u_rows_of(map, map.myrow) {
        push_row(a, map.local(plan.u_src[k]), &mut out);
    }
    out
}

/// Number of elements of the piece of `U` contributed by process row `p`.
#[inline]
fn u_piece_len(plan: &LaswpPlan, map: &RowMap, p: usize, nn: usize) -> usize {
    plan.u_rows_of(map, p).count() * nn
}

/// Writes the piece of `U` contributed by process row `p`.
fn write_u_piece<T: Real>(
    plan: &LaswpPlan,
    map: &RowMap,
    u: &mut MatMut<'_, T>,
    layout: ULayout,
    nn: usize,
    p: usize,
    piece: &[T],
) {
    if nn == 0 {
        return;
    }
    for (k, values) in plan.u_rows_of(map, p).zip(piece.chunks_exact(nn)) {
        write_u_row(u, layout, k, values);
    }
}

/// Packs the displaced rows bound for process row `p`. Only meaningful on the panel's process
/// row, which holds the top block.
fn pack_displaced<T: Real>(plan: &LaswpPlan, map: &RowMap, a: MatRef<'_, T>, p: usize) -> Vec<T> {
    let mut out = Vec::new();
    for (top, _) in plan.displaced_to(map, p) {
        push_row(a, top, &mut out);
    }
    out
}

/// Writes the displaced rows received by the calling process.
fn write_displaced<T: Real>(plan: &LaswpPlan, map: &RowMap, a: &mut MatMut<'_, T>, rows: &[T]) {
    let nn = a.ncols();
    if nn == 0 {
        return;
    }
    for ((_, dst), values) in plan.displaced_to(map, map.myrow).zip(rows.chunks_exact(nn)) {
        write_row(a, map.local(dst), values);
    }
}

/// Applies the row movements of `plan` to the local trailing columns of the calling process.
///
/// Every process of the column `col`, ranked by process row, must call this function. `a` holds
/// the local rows whose global index is at least `plan.ia()`, restricted to the trailing
/// columns, and `nb` is the row block size. On return, `u` holds `U` on every process, laid out
/// according to `params.layout`, and the displaced rows have been written to their new position.
///
/// # Panics
/// Panics if `u` does not have the shape required by the layout.
pub fn apply<T: Real, C: Communicator + ?Sized>(
    col: &C,
    plan: &LaswpPlan,
    nb: usize,
    a: MatMut<'_, T>,
    u: MatMut<'_, T>,
    params: LaswpParams,
) -> Result<(), CommError> {
    let (jb, nn) = (plan.jb(), a.ncols());
    match params.layout {
        ULayout::Normal => assert!(all(u.nrows() == jb, u.ncols() == nn)),
        ULayout::Transposed => assert!(all(u.nrows() == nn, u.ncols() == jb)),
    }
    let map = RowMap::new(plan.ia, nb, col.rank(), col.size());
    if map.myrow == map.prow {
        assert!(all(plan.ia % nb + jb <= nb, a.nrows() >= jb));
    }

    match params.strategy {
        LaswpStrategy::SpreadRoll => spread_roll::apply(col, plan, &map, a, u, params.layout),
        LaswpStrategy::GatherBroadcast => {
            gather_bcast::apply(col, plan, &map, a, u, params.layout)
        }
    }
}

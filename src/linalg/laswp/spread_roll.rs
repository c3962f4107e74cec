use super::{
    pack_displaced, pack_u_piece, u_piece_len, write_displaced, write_u_piece, LaswpPlan, RowMap,
    ULayout,
};
use crate::{
    comm::{scatterv, CommError, Communicator, Tag},
    mat::{MatMut, MatRef},
    utils::{as_bytes, as_bytes_mut},
    Real,
};
use core::mem::size_of;
use reborrow::*;

/// Scatters the displaced rows from the panel's process row, returning the ones bound for the
/// calling process.
fn spread<T: Real, C: Communicator + ?Sized>(
    col: &C,
    plan: &LaswpPlan,
    map: &RowMap,
    a: MatRef<'_, T>,
) -> Result<Vec<T>, CommError> {
    let nprow = col.size();
    let nn = a.ncols();
    let counts = (0..nprow)
        .map(|p| plan.displaced_to(map, p).count() * nn * size_of::<T>())
        .collect::<Vec<_>>();

    let mut send = Vec::new();
    if map.myrow == map.prow {
        for p in 0..nprow {
            send.extend(pack_displaced(plan, map, a, p));
        }
    }
    let mut mine = vec![T::zero(); counts[map.myrow] / size_of::<T>()];
    scatterv(
        col,
        map.prow,
        Tag::SPREAD,
        &counts,
        as_bytes(&send),
        as_bytes_mut(&mut mine),
    )?;
    Ok(mine)
}

/// Circulates the pieces of `U` until every process holds all of them.
///
/// Pieces travel both ways around the ring: after `ceil((P - 1) / 2)` forward steps and
/// `floor((P - 1) / 2)` backward steps, each process has received the piece of every other one.
fn roll<T: Real, C: Communicator + ?Sized>(
    col: &C,
    plan: &LaswpPlan,
    map: &RowMap,
    a: MatRef<'_, T>,
) -> Result<Vec<Vec<T>>, CommError> {
    let nprow = col.size();
    let me = map.myrow;
    let nn = a.ncols();

    let mut pieces = vec![Vec::new(); nprow];
    pieces[me] = pack_u_piece(plan, map, a);

    let next = (me + 1) % nprow;
    let prev = (me + nprow - 1) % nprow;
    let forward = nprow / 2;
    let backward = (nprow - 1) / 2;

    for step in 1..=forward {
        let outgoing = (me + nprow - (step - 1)) % nprow;
        let incoming = (me + nprow - step) % nprow;
        let mut buf = vec![T::zero(); u_piece_len(plan, map, incoming, nn)];
        col.sendrecv(
            next,
            as_bytes(&pieces[outgoing]),
            prev,
            as_bytes_mut(&mut buf),
            Tag::ROLL,
        )?;
        pieces[incoming] = buf;
    }
    for step in 1..=backward {
        let outgoing = (me + step - 1) % nprow;
        let incoming = (me + step) % nprow;
        let mut buf = vec![T::zero(); u_piece_len(plan, map, incoming, nn)];
        col.sendrecv(
            prev,
            as_bytes(&pieces[outgoing]),
            next,
            as_bytes_mut(&mut buf),
            Tag::ROLL,
        )?;
        pieces[incoming] = buf;
    }
    Ok(pieces)
}

pub(super) fn apply<T: Real, C: Communicator + ?Sized>(
    col: &C,
    plan: &LaswpPlan,
    map: &RowMap,
    mut a: MatMut<'_, T>,
    mut u: MatMut<'_, T>,
    layout: ULayout,
) -> Result<(), CommError> {
    let nn = a.ncols();
    let displaced = spread(col, plan, map, a.rb())?;
    let pieces = roll(col, plan, map, a.rb())?;

    for (p, piece) in pieces.iter().enumerate() {
        write_u_piece(plan, map, &mut u, layout, nn, p, piece);
    }
    write_displaced(plan, map, &mut a, &displaced);
    Ok(())
}

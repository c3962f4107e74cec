use super::{
    pack_displaced, pack_u_piece, u_piece_len, write_displaced, write_u_piece, LaswpPlan, RowMap,
    ULayout,
};
use crate::{
    comm::{broadcast, gatherv, CommError, Communicator, Tag},
    mat::MatMut,
    utils::{as_bytes, as_bytes_mut},
    Real,
};
use core::mem::size_of;
use reborrow::*;

pub(super) fn apply<T: Real, C: Communicator + ?Sized>(
    col: &C,
    plan: &LaswpPlan,
    map: &RowMap,
    mut a: MatMut<'_, T>,
    mut u: MatMut<'_, T>,
    layout: ULayout,
) -> Result<(), CommError> {
    let nprow = col.size();
    let nn = a.ncols();
    let jb = plan.jb();
    let root = map.prow;
    let is_root = map.myrow == root;

    // U, assembled on the root in the order of the contributing process rows.
    let lens = (0..nprow)
        .map(|p| u_piece_len(plan, map, p, nn))
        .collect::<Vec<_>>();
    let counts = lens.iter().map(|len| len * size_of::<T>()).collect::<Vec<_>>();
    let piece = pack_u_piece(plan, map, a.rb());
    let mut assembled = vec![T::zero(); jb * nn];
    let mut nothing = [0u8; 0];
    let recv: &mut [u8] = if is_root {
        as_bytes_mut(&mut assembled)
    } else {
        &mut nothing
    };
    gatherv(col, root, Tag::GATHER, &counts, as_bytes(&piece), recv)?;
    broadcast(col, root, Tag::BCAST, as_bytes_mut(&mut assembled))?;

    let mut start = 0;
    for (p, &len) in lens.iter().enumerate() {
        write_u_piece(
            plan,
            map,
            &mut u,
            layout,
            nn,
            p,
            &assembled[start..start + len],
        );
        start += len;
    }

    // displaced rows, straight from the root to their owner.
    if is_root {
        for p in (0..nprow).filter(|&p| p != root) {
            let rows = pack_displaced(plan, map, a.rb(), p);
            if !rows.is_empty() {
                col.send(p, Tag::SWAP, as_bytes(&rows))?;
            }
        }
        let own = pack_displaced(plan, map, a.rb(), root);
        write_displaced(plan, map, &mut a, &own);
    } else {
        let len = plan.displaced_to(map, map.myrow).count() * nn;
        if len > 0 {
            let mut rows = vec![T::zero(); len];
            col.recv(root, Tag::SWAP, as_bytes_mut(&mut rows))?;
            write_displaced(plan, map, &mut a, &rows);
        }
    }
    Ok(())
}

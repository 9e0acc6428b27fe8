use mesh_advect::mesh_error::MeshAdvectError;
use mesh_advect::structured::{IMAX, IMIN, JMAX, JMIN, StructuredDomainBoundaries};
use mesh_advect::DebugInvariants;
use proptest::prelude::*;

const N: i64 = 4;

/// Node extents of block `(bx, by)` in a grid of `N`-zone cubes.
fn cube_extents(bx: i64, by: i64) -> [i64; 6] {
    [bx * N, (bx + 1) * N, by * N, (by + 1) * N, 0, N]
}

fn grid_3x3() -> StructuredDomainBoundaries {
    let mut sdb = StructuredDomainBoundaries::new(9);
    for b in 0..9 {
        let (bx, by) = ((b % 3) as i64, (b / 3) as i64);
        sdb.set_indices_for_rect_grid(b, cube_extents(bx, by)).unwrap();
    }
    assert_eq!(sdb.calculate_boundaries().unwrap(), 12);
    sdb
}

#[test]
fn ghost_depth_is_exactly_one() {
    let sdb = grid_3x3();
    for b in 0..9 {
        let (bx, by) = (b % 3, b / 3);
        let boundary = sdb.boundary(b).unwrap();
        assert_eq!(boundary.oldzdims(), [4, 4, 4]);
        let grow = |c: usize| if c == 1 { 2 } else { 1 };
        assert_eq!(
            boundary.newzdims(),
            [4 + grow(bx), 4 + grow(by), 4],
            "block {b}"
        );
        assert_eq!(
            boundary.newndims(),
            [5 + grow(bx), 5 + grow(by), 5],
            "block {b}"
        );
    }
    let centre = sdb.boundary(4).unwrap();
    assert_eq!(centre.neighbors.len(), 4);
    let faces: u8 = centre.neighbors.iter().fold(0, |f, n| f | n.face);
    assert_eq!(faces, IMIN | IMAX | JMIN | JMAX);
    sdb.validate_invariants().unwrap();
}

#[test]
fn finish_twice_changes_nothing() {
    let mut sdb = grid_3x3();
    let before = sdb.clone();
    sdb.finish();
    sdb.finish();
    assert_eq!(sdb, before);
}

#[test]
fn ghost_mask_marks_the_added_layers() {
    let sdb = grid_3x3();
    let mask = sdb.ghost_zone_mask(4).unwrap();
    assert_eq!(mask.len(), 6 * 6 * 4);
    assert_eq!(mask.iter().filter(|&&m| m == 1).count(), (36 - 16) * 4);
    let corner = sdb.ghost_zone_mask(0).unwrap();
    assert_eq!(corner.iter().filter(|&&m| m == 1).count(), (25 - 16) * 4);
}

#[test]
fn exchanged_ghosts_carry_neighbor_values() {
    let sdb = grid_3x3();
    // Every zone stores its global (i, j, k) packed into one number.
    let pack = |[i, j, k]: [i64; 3]| (i * 10_000 + j * 100 + k) as f64;
    let fields: Vec<Vec<f64>> = (0..9)
        .map(|b| {
            let bd = sdb.boundary(b).unwrap();
            let e = bd.oldzextents;
            let mut f = vec![0.0; bd.oldncells()];
            for k in e[4]..=e[5] {
                for j in e[2]..=e[3] {
                    for i in e[0]..=e[1] {
                        f[bd.old_cell_index([i, j, k]).unwrap()] = pack([i, j, k]);
                    }
                }
            }
            f
        })
        .collect();
    let out = sdb.exchange_zone_field(&fields).unwrap();

    let centre = sdb.boundary(4).unwrap();
    let g = &out[4];
    for (ijk, want) in [
        ([3, 5, 2], [3, 5, 2]), // IMIN ghost, from block 3
        ([8, 6, 0], [8, 6, 0]), // IMAX ghost, from block 5
        ([5, 3, 1], [5, 3, 1]), // JMIN ghost, from block 1
        ([4, 8, 3], [4, 8, 3]), // JMAX ghost, from block 7
    ] {
        let idx = centre.new_cell_index(ijk).unwrap();
        assert!(g.exists[idx]);
        assert_eq!(g.values[idx], pack(want));
    }
    // The (i, j) corner column has no face neighbor: filled from the
    // closest existing zone, which is the block's own corner zone.
    let idx = centre.new_cell_index([3, 3, 2]).unwrap();
    assert!(!g.exists[idx]);
    assert_eq!(g.values[idx], pack([4, 4, 2]));
}

#[test]
fn out_of_range_blocks_are_reported() {
    let mut sdb = StructuredDomainBoundaries::new(2);
    assert!(matches!(
        sdb.set_extents(5, [0, 1, 0, 1, 0, 1]),
        Err(MeshAdvectError::BlockOutOfRange { block: 5, n_blocks: 2 })
    ));
    sdb.set_extents(0, [0, 4, 0, 4, 0, 4]).unwrap();
    assert!(sdb.add_neighbor(0, 7, 0, [1, 2, 3], [4, 4, 0, 4, 0, 4]).is_err());
}

// ---------------------------------------------------------------------------
// Reciprocity under arbitrary connect / disconnect sequences
// ---------------------------------------------------------------------------

fn face_between(a: usize, b: usize) -> Option<[i64; 6]> {
    let (ax, ay) = ((a % 3) as i64, (a / 3) as i64);
    let (bx, by) = ((b % 3) as i64, (b / 3) as i64);
    let (ea, eb) = (cube_extents(ax, ay), cube_extents(bx, by));
    if (ax - bx).abs() + (ay - by).abs() != 1 {
        return None;
    }
    let mut f = [0; 6];
    for d in 0..3 {
        f[2 * d] = ea[2 * d].max(eb[2 * d]);
        f[2 * d + 1] = ea[2 * d + 1].min(eb[2 * d + 1]);
    }
    Some(f)
}

fn connect(sdb: &mut StructuredDomainBoundaries, a: usize, b: usize) {
    let Some(face) = face_between(a, b) else {
        return;
    };
    let slot_a = sdb.boundary(a).unwrap().neighbors.len();
    let slot_b = sdb.boundary(b).unwrap().neighbors.len();
    sdb.add_neighbor(a, b, slot_b, [1, 2, 3], face).unwrap();
    sdb.add_neighbor(b, a, slot_a, [1, 2, 3], face).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn reciprocity_survives_add_delete_sequences(
        ops in prop::collection::vec((0usize..9, 0usize..9, any::<bool>()), 0..40)
    ) {
        let mut sdb = grid_3x3();
        for (a, b, add) in ops {
            if add {
                connect(&mut sdb, a, b);
            } else {
                sdb.disconnect(a, b).unwrap();
            }
            sdb.finish();
            prop_assert!(sdb.validate_invariants().is_ok(), "{:?}", sdb.validate_invariants());
        }
        for b in 0..9 {
            let bd = sdb.boundary(b).unwrap();
            let old = bd.oldzdims();
            let new = bd.newzdims();
            for axis in 0..3 {
                let grow = bd.expand[2 * axis] as usize + bd.expand[2 * axis + 1] as usize;
                prop_assert_eq!(new[axis], old[axis] + grow);
            }
        }
    }
}

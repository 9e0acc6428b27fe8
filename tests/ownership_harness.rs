//! Discrete-event harness: ranks are seeded on threads (the seeding sum is a
//! collective), then stepped round-robin on one thread without blocking so
//! every message-step boundary can be audited.
mod util;

use hashbrown::HashMap;
use mesh_advect::advect::{Advector, CurveId, IntegralCurve, ParallelAdvection};
use mesh_advect::algs::communicator::RayonComm;
use mesh_advect::geometry::rectilinear::RectilinearLocator;
use mesh_advect::DebugInvariants;
use util::*;

type Rank<A> = ParallelAdvection<RayonComm, RectilinearLocator, A>;

fn seeded<A>(n: usize, owners: &[usize], advector: A, seeds: &[IntegralCurve]) -> Vec<Rank<A>>
where
    A: Advector + Clone + Send,
{
    let comms = world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let advector = advector.clone();
                s.spawn(move || {
                    let own = ownership_for(&comm, owners, 1);
                    let loc = slab_locator(1, owners.len()).restrict_to(&own);
                    let mut alg = ParallelAdvection::new(comm, loc, advector, own, default_config()).unwrap();
                    alg.initialize(seeds.iter().cloned()).unwrap();
                    alg
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// No curve id is active on two ranks at once.
fn audit<A: Advector>(ranks: &[Rank<A>], round: usize) {
    let mut holder: HashMap<CurveId, usize> = HashMap::new();
    for (r, alg) in ranks.iter().enumerate() {
        alg.validate_invariants().unwrap();
        for (id, counter) in alg.active_keys() {
            if let Some(prev) = holder.insert(id, r) {
                panic!("round {round}: {id} (counter {counter}) active on ranks {prev} and {r}");
            }
        }
    }
}

fn drive<A: Advector>(ranks: &mut [Rank<A>]) -> usize {
    let mut round = 0;
    audit(ranks, round);
    while !ranks.iter().all(|r| r.is_quiescent()) {
        round += 1;
        assert!(round < 10_000, "no quiescence after {round} rounds");
        for r in 0..ranks.len() {
            ranks[r].step(false).unwrap();
            audit(ranks, round);
        }
    }
    round
}

#[test]
fn at_most_one_owner_with_curves_crossing_both_ways() {
    let owners = [0, 1, 2, 1, 0];
    let seeds: Vec<IntegralCurve> = (0..25).map(|i| seed(i, 0.11 + 0.19 * i as f64)).collect();
    // Even ids drift right, odd ids drift left.
    let advector = |c: &mut IntegralCurve| {
        let dx = if c.id.0 % 2 == 0 { 0.35 } else { -0.35 };
        let [x, y, z] = c.location;
        c.move_to([x + dx, y, z], c.time + 1.0);
    };
    let mut ranks = seeded(3, &owners, advector, &seeds);
    let claimed: i64 = ranks.iter().map(|r| r.active_curves().len() as i64).sum();
    assert_eq!(claimed, seeds.len() as i64);

    drive(&mut ranks);

    let mut ids: Vec<u64> = ranks
        .iter_mut()
        .flat_map(|r| r.take_terminated())
        .map(|c| c.id.0)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..25).collect::<Vec<_>>());
    for r in &ranks {
        assert_eq!(r.global_total(), 0);
        assert!(r.pending_acks().is_empty());
    }
}

#[test]
fn small_batches_interleave_without_double_ownership() {
    let owners = [0, 1, 0, 1];
    let seeds: Vec<IntegralCurve> = (0..12).map(|i| seed(i, 0.15 + 0.3 * i as f64)).collect();
    let comms = world(2);
    let mut ranks: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let seeds = &seeds;
                s.spawn(move || {
                    let own = ownership_for(&comm, &owners, 1);
                    let loc = slab_locator(1, owners.len()).restrict_to(&own);
                    let cfg = default_config().with_max_count(1);
                    let mut alg = ParallelAdvection::new(comm, loc, drift(0.45), own, cfg).unwrap();
                    alg.initialize(seeds.iter().cloned()).unwrap();
                    alg
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let rounds = drive(&mut ranks);
    assert!(rounds > 1);
    let terminated: usize = ranks.iter().map(|r| r.terminated_curves().len()).sum();
    assert_eq!(terminated, seeds.len());
}

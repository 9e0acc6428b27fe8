#![allow(dead_code)]
use mesh_advect::{
    advect::{AdvectConfig, IntegralCurve, CurveId},
    algs::communicator::{Communicator, RayonComm},
    geometry::rectilinear::{RectilinearBlock, RectilinearLocator},
    topology::{DomainId, DomainOwnership},
};
use std::time::Duration;

/// Blocking receives in tests give up after this long instead of hanging.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Unit slab `[x0, x0 + 1] x [0, 1] x [0, 1]` with 4 cells per axis.
pub fn slab(x0: f64) -> RectilinearBlock {
    RectilinearBlock::uniform([x0, 0.0, 0.0], [0.25; 3], [5, 5, 5]).unwrap()
}

/// `n` unit slabs along x at every time step; block `b` starts at `x = b`.
pub fn slab_locator(n_time_steps: usize, n_blocks: usize) -> RectilinearLocator {
    let mut loc = RectilinearLocator::new(n_time_steps, n_blocks);
    for ts in 0..n_time_steps as u32 {
        for b in 0..n_blocks as u32 {
            loc.insert(DomainId::new(b, ts), slab(b as f64)).unwrap();
        }
    }
    loc
}

pub fn seed(id: u64, x: f64) -> IntegralCurve {
    IntegralCurve::new(CurveId(id), [x, 0.5, 0.5], 0.0, 0)
}

/// Move `+dx` along x per step, one time unit per step.
pub fn drift(dx: f64) -> impl FnMut(&mut IntegralCurve) + Send + Clone {
    move |c: &mut IntegralCurve| {
        let [x, y, z] = c.location;
        c.move_to([x + dx, y, z], c.time + 1.0);
    }
}

pub fn world(n: usize) -> Vec<RayonComm> {
    RayonComm::world_with_timeout(n, TEST_TIMEOUT)
}

/// Run `f(comm)` for every rank of a fresh in-process world, one thread per rank.
pub fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(RayonComm) -> T + Sync,
{
    let comms = world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                let f = &f;
                s.spawn(move || f(c))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

pub fn default_config() -> AdvectConfig {
    AdvectConfig::default().with_max_steps(1_000)
}

pub fn ownership_for(comm: &impl Communicator, owners: &[usize], n_time_steps: usize) -> DomainOwnership {
    DomainOwnership::from_owners(owners, n_time_steps, comm.rank(), comm.size()).unwrap()
}

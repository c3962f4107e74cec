use hplai::{
    comm::LocalUniverse,
    linalg::refine::{self, RefineParams},
    Context, ContextParams,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

fn main() {
    let (nprow, npcol) = (2, 3);
    let n = 500;
    let nb = 32;

    // diagonally dominant, so the reduced precision factors are good enough to refine from
    let mut rng = StdRng::seed_from_u64(0);
    let entries = (0..n * n)
        .map(|_| rng.gen::<f64>() - 0.5)
        .collect::<Vec<_>>();
    let a = |i: usize, j: usize| entries[i + n * j] + if i == j { n as f64 / 4.0 } else { 0.0 };
    let b = (0..n).map(|_| rng.gen::<f64>()).collect::<Vec<_>>();

    let start = Instant::now();
    let results = LocalUniverse::run(nprow * npcol, Duration::from_secs(600), |comm| {
        let ctx = Context::new(comm, nprow, npcol, ContextParams::default())?;
        refine::solve(&ctx, n, nb, a, &b, RefineParams::default())
    });
    let elapsed = start.elapsed();

    let (x, info) = match results.into_iter().next() {
        Some(Ok(solution)) => solution,
        Some(Err(err)) => panic!("solve failed: {err}"),
        None => unreachable!(),
    };
    let residual = (0..n)
        .map(|i| ((0..n).map(|j| a(i, j) * x[j]).sum::<f64>() - b[i]).abs())
        .fold(0.0, f64::max);

    println!("n = {n}, nb = {nb}, grid = {nprow}x{npcol}, time = {elapsed:?}");
    println!(
        "refinement steps = {}, scaled residual = {:e}, converged = {}",
        info.iterations, info.residual, info.converged,
    );
    println!("max |Ax - b| = {residual:e}");
    assert!(info.converged);
}

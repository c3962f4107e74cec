use criterion::{criterion_group, criterion_main, Criterion};
use dyn_stack::{GlobalPodBuffer, PodStack};
use hplai::{
    comm::LocalUniverse,
    kernel::{KernelStrategy, Kernels},
    linalg::{
        dist::DistMatrix,
        pfact::{pfact, pfact_req, Panel, PfactParams},
        pgesv::{factor, FactorParams},
        pivot_index::{self, PivotIndex},
        refine::{self, RefineParams},
    },
    Context, ContextParams, Mat,
};
use rand::random;
use std::time::Duration;

fn single_rank_context() -> Context<hplai::comm::LocalComm> {
    let comm = LocalUniverse::comms(1, Duration::from_secs(60)).remove(0);
    Context::new(
        comm,
        1,
        1,
        ContextParams::default().with_kernel(KernelStrategy::Reference),
    )
    .unwrap()
}

pub fn kernels(c: &mut Criterion) {
    let kernels = Kernels::new(KernelStrategy::Reference);
    for n in [32, 128, 256] {
        let a = Mat::from_fn(n, n, |_, _| random::<f32>());
        let b = Mat::from_fn(n, n, |_, _| random::<f32>());
        let mut dst = Mat::<f32>::zeros(n, n);
        c.bench_function(&format!("ref-gemm-f32-{n}"), |bencher| {
            bencher.iter(|| {
                kernels
                    .reduced()
                    .gemm(1.0, a.as_ref(), b.as_ref(), 0.0, dst.as_mut());
            })
        });
    }
}

pub fn panel(c: &mut Criterion) {
    let ctx = single_rank_context();
    for (m, nb) in [(256, 32), (1024, 64), (4096, 64)] {
        let mat = Mat::from_fn(m, nb, |_, _| random::<f32>());
        let mut copy = mat.clone();
        let mut l1 = Mat::zeros(nb, nb);
        let mut dpiv = vec![0; nb];
        let mut mem = GlobalPodBuffer::new(pfact_req::<f32>(nb).unwrap());

        for (name, params) in [
            ("left", PfactParams::default()),
            ("rec", PfactParams::recursive(8, 2)),
        ] {
            c.bench_function(&format!("pfact-{name}-{m}x{nb}"), |bencher| {
                bencher.iter(|| {
                    copy.as_mut().copy_from(mat.as_ref());
                    let panel = Panel::new(
                        ctx.grid(),
                        copy.as_mut(),
                        l1.as_mut(),
                        &mut dpiv,
                        0,
                        nb,
                    );
                    pfact(&ctx, panel, params, PodStack::new(&mut mem)).unwrap();
                })
            });
        }
    }
}

pub fn pipid(c: &mut Criterion) {
    for jb in [32, 128, 512] {
        let dpiv = (0..jb)
            .map(|k| k + random::<usize>() % (4 * jb - k))
            .collect::<Vec<_>>();
        let mut ipid = PivotIndex::new();
        c.bench_function(&format!("pipid-{jb}"), |bencher| {
            bencher.iter(|| pivot_index::build(&dpiv, 0, &mut ipid))
        });
    }
}

pub fn driver(c: &mut Criterion) {
    for (nprow, npcol) in [(1, 1), (2, 2)] {
        for n in [256, 512] {
            let a = Mat::from_fn(n, n, |_, _| random::<f64>());
            let b = (0..n).map(|_| random::<f64>()).collect::<Vec<_>>();

            c.bench_function(&format!("pgesv-{nprow}x{npcol}-{n}"), |bencher| {
                bencher.iter(|| {
                    LocalUniverse::run(nprow * npcol, Duration::from_secs(600), |comm| {
                        let ctx = Context::new(comm, nprow, npcol, ContextParams::default())?;
                        let mut dist =
                            DistMatrix::from_fn(ctx.grid(), n, n, 32, |i, j| a.read(i, j) as f32);
                        factor(&ctx, &mut dist, FactorParams::default()).map(|_| ())
                    })
                })
            });

            c.bench_function(&format!("solve-{nprow}x{npcol}-{n}"), |bencher| {
                bencher.iter(|| {
                    LocalUniverse::run(nprow * npcol, Duration::from_secs(600), |comm| {
                        let ctx = Context::new(comm, nprow, npcol, ContextParams::default())?;
                        refine::solve(&ctx, n, 32, |i, j| a.read(i, j), &b, RefineParams::default())
                    })
                })
            });
        }
    }
}

criterion_group!(benches, kernels, panel, pipid, driver);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use mesh_sweep::algs::communicator::NoComm;
use mesh_sweep::config::{GeometryType, SweepOptions};
use mesh_sweep::sweep::fluds::AlphaPass;
use mesh_sweep::sweep::{AngularQuadrature, LocationGraph, SweepGroupset, SweepOrdering, SweepPlan};
use mesh_sweep::topology::generators::{orthogonal_2d, orthogonal_3d};
use mesh_sweep::topology::{FaceHistogram, Vector3};

fn bench_ordering(c: &mut Criterion) {
    let omega = Vector3::new(0.5, 0.3, 0.8).normalized();
    let mut group = c.benchmark_group("sweep_ordering");
    for &n in &[16usize, 32, 64] {
        let grid = orthogonal_2d(n, n, |_| 0, 0).unwrap();
        group.bench_with_input(BenchmarkId::new("quad", n * n), &grid, |b, g| {
            b.iter(|| SweepOrdering::build(black_box(g), omega).unwrap())
        });
    }
    for &n in &[8usize, 16] {
        let grid = orthogonal_3d(n, n, n, |_| 0, 0).unwrap();
        group.bench_with_input(BenchmarkId::new("hex", n * n * n), &grid, |b, g| {
            b.iter(|| SweepOrdering::build(black_box(g), omega).unwrap())
        });
    }
    group.finish();
}

fn bench_alpha_pass(c: &mut Criterion) {
    let omega = Vector3::new(-0.4, 0.6, 0.7).normalized();
    let mut group = c.benchmark_group("alpha_pass");
    for &n in &[8usize, 16] {
        let grid = orthogonal_3d(n, n, n, |_| 0, 0).unwrap();
        let plan = SweepPlan::new(SweepOrdering::build(&grid, omega).unwrap(), LocationGraph::serial(0));
        let histogram = FaceHistogram::from_grid(&grid);
        group.bench_function(BenchmarkId::new("hex", n * n * n), |b| {
            b.iter(|| AlphaPass::run(&grid, &plan, &histogram).unwrap())
        });
    }
    group.finish();
}

fn bench_init_flux_buffers(c: &mut Criterion) {
    let grid = orthogonal_2d(32, 32, |_| 0, 0).unwrap();
    let options = SweepOptions {
        geometry: GeometryType::TwoDCartesian,
        ..Default::default()
    };
    c.bench_function("init_flux_buffers/quad_1024_s8", |b| {
        b.iter(|| {
            let quadrature = AngularQuadrature::product_uniform(2, 8).unwrap();
            let mut gs = SweepGroupset::new(quadrature, 4, 1, options.clone()).unwrap();
            gs.init_flux_buffers(&grid, &NoComm).unwrap();
            gs
        })
    });
}

criterion_group!(benches, bench_ordering, bench_alpha_pass, bench_init_flux_buffers);
criterion_main!(benches);

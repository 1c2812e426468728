mod util;

use std::sync::Arc;

use mesh_sweep::prelude::*;
use mesh_sweep::topology::generators::{orthogonal_2d, slab_chain};
use util::{Attenuation, assert_same_values, run_ranks};

fn slab_options() -> SweepOptions {
    SweepOptions {
        geometry: GeometryType::OneDSlab,
        ..Default::default()
    }
}

fn plane_options(aggregation: AngleAggregationType) -> SweepOptions {
    SweepOptions {
        geometry: GeometryType::TwoDCartesian,
        aggregation,
        ..Default::default()
    }
}

#[test]
fn lagged_faces_carry_last_sweeps_values() {
    let grid = util::interlocked_pair();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X]);
    let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    let boundaries =
        BoundaryMap::new().with(0, Arc::new(IsotropicBoundary::new(vec![1.0])));
    let mut kernel = Attenuation::new(0.0, 0.0);

    // cell 1 runs first and reads cell 0 through the lagged face
    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(1, 0, 0)], 0.0);
    assert_eq!(kernel.cell_psi[&(0, 0, 0)], 0.5);

    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(1, 0, 0)], 0.5);
    assert_eq!(kernel.cell_psi[&(0, 0, 0)], 0.5);

    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(1, 0, 0)], 0.5);
    assert_eq!(kernel.cell_psi[&(0, 0, 0)], 0.75);
}

#[test]
fn zeroing_lagged_values_restarts_the_iteration() {
    let grid = util::interlocked_pair();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X]);
    let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    let boundaries =
        BoundaryMap::new().with(0, Arc::new(IsotropicBoundary::new(vec![1.0])));
    let mut kernel = Attenuation::new(0.0, 0.0);

    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    gs.aggregation_mut().unwrap().zero_incoming_delayed();
    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(1, 0, 0)], 0.0);
}

#[test]
fn chain_attenuates_along_the_sweep() {
    let grid = slab_chain(3, |_| 0, 0).unwrap();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X]);
    let mut gs = SweepGroupset::new(quadrature, 2, 2, slab_options()).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();

    let tally = Arc::new(LeakageTally::new());
    let boundaries = BoundaryMap::new()
        .with(0, Arc::new(IsotropicBoundary::new(vec![8.0, 16.0])))
        .with(1, tally.clone());
    let mut kernel = Attenuation::new(1.0, 0.0);
    let report = gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();

    // 3 cells, 2 directions, 2 group subsets
    assert_eq!(report.cells_solved, 3 * 2 * 2);
    assert_eq!(report.angle_sets_executed, 2 * 2);
    assert_eq!(report.messages_sent, 0);

    // +x halves the inflow in each cell, per group
    assert_eq!(kernel.cell_psi[&(0, 0, 0)], 4.0);
    assert_eq!(kernel.cell_psi[&(2, 0, 0)], 1.0);
    assert_eq!(kernel.cell_psi[&(2, 0, 1)], 2.0);
    assert_eq!(tally.get(0, 0), 1.0);
    assert_eq!(tally.get(0, 1), 2.0);
    // -x sees a vacuum at x-max
    assert_eq!(kernel.cell_psi[&(0, 1, 0)], 0.0);
    assert_eq!(tally.get(1, 0), 0.0);
}

#[test]
fn rank_cycle_lags_one_sweep() {
    let per_rank = run_ranks(2, |comm| {
        let grid = util::interlocked_across_ranks(comm.rank());
        let quadrature = AngularQuadrature::from_omegas(&[Vector3::X]);
        let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
        gs.init_flux_buffers(&grid, &comm).unwrap();
        let boundaries =
            BoundaryMap::new().with(0, Arc::new(IsotropicBoundary::new(vec![1.0])));
        let mut kernel = Attenuation::new(0.0, 0.0);
        let gid = comm.rank() as u64;
        (0..3)
            .map(|_| {
                gs.sweep(&grid, &comm, &mut kernel, &boundaries).unwrap();
                kernel.cell_psi[&(gid, 0, 0)]
            })
            .collect::<Vec<_>>()
    });
    // rank 1 reads cell 0 through the lagged edge; cell 0 averages the
    // boundary with cell 1's value of the same sweep
    assert_eq!(per_rank[1], vec![0.0, 0.5, 0.75]);
    assert_eq!(per_rank[0], vec![0.5, 0.75, 0.875]);
}

#[test]
fn reflecting_wall_returns_last_sweeps_leakage() {
    let grid = slab_chain(3, |_| 0, 0).unwrap();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X]);
    let wall = Arc::new(ReflectingBoundary::new(Vector3::X, &quadrature).unwrap());
    let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    let boundaries = BoundaryMap::new()
        .with(0, Arc::new(IsotropicBoundary::new(vec![1.0])))
        .with(1, wall.clone());
    let mut kernel = Attenuation::new(0.0, 0.0);

    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(2, 0, 0)], 1.0);
    assert_eq!(kernel.cell_psi[&(2, 1, 0)], 0.0);
    assert_eq!(kernel.cell_psi[&(0, 1, 0)], 0.0);

    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(2, 1, 0)], 1.0);
    assert_eq!(kernel.cell_psi[&(0, 1, 0)], 1.0);

    wall.clear();
    gs.sweep(&grid, &NoComm, &mut kernel, &boundaries).unwrap();
    assert_eq!(kernel.cell_psi[&(0, 1, 0)], 0.0);
}

fn sweep_on_ranks(
    ranks: usize,
    owner: fn(u64, usize) -> usize,
    aggregation: AngleAggregationType,
    scheduling: SchedulingAlgorithm,
) -> std::collections::BTreeMap<(u64, usize, usize), f64> {
    sweep_grid_on_ranks((4, 3), 2, ranks, owner, aggregation, scheduling)
}

fn sweep_grid_on_ranks(
    (nx, ny): (usize, usize),
    sweeps: usize,
    ranks: usize,
    owner: fn(u64, usize) -> usize,
    aggregation: AngleAggregationType,
    scheduling: SchedulingAlgorithm,
) -> std::collections::BTreeMap<(u64, usize, usize), f64> {
    let results = run_ranks(ranks, |comm| {
        let rank = comm.rank();
        let grid = orthogonal_2d(nx, ny, |g| owner(g, ranks), rank).unwrap();
        let quadrature = AngularQuadrature::product_uniform(2, 4).unwrap();
        let options = SweepOptions {
            scheduling,
            eager_limit: 16,
            ..plane_options(aggregation)
        };
        let mut gs = SweepGroupset::new(quadrature, 3, 2, options).unwrap();
        gs.init_flux_buffers(&grid, &comm).unwrap();
        let boundaries = BoundaryMap::new()
            .with(0, Arc::new(IsotropicBoundary::new(vec![1.0, 2.0, 3.0])))
            .with(2, Arc::new(IsotropicBoundary::new(vec![0.5, 0.5, 0.5])));
        let mut kernel = Attenuation::new(0.5, 1.0);
        for _ in 0..sweeps {
            gs.sweep(&grid, &comm, &mut kernel, &boundaries).unwrap();
        }
        kernel.cell_psi
    });
    results.into_iter().flatten().collect()
}

fn columns(g: u64, ranks: usize) -> usize {
    ((g % 4) as usize * ranks) / 4
}

fn rows(g: u64, ranks: usize) -> usize {
    ((g / 4) as usize * ranks) / 3
}

#[test]
fn partitioned_sweep_matches_serial() {
    let serial = sweep_on_ranks(1, columns, AngleAggregationType::Single, SchedulingAlgorithm::DepthOfGraph);
    assert_eq!(serial.len(), 12 * 8 * 3);

    let two = sweep_on_ranks(2, columns, AngleAggregationType::Single, SchedulingAlgorithm::DepthOfGraph);
    assert_same_values(&two, &serial);

    let three = sweep_on_ranks(3, rows, AngleAggregationType::Single, SchedulingAlgorithm::FirstIn);
    assert_same_values(&three, &serial);
}

fn checkerboard(g: u64, ranks: usize) -> usize {
    (((g % 4) + (g / 4)) as usize) % ranks
}

#[test]
fn checkerboard_partition_converges_to_serial() {
    let run = |ranks| {
        sweep_grid_on_ranks(
            (4, 4),
            20,
            ranks,
            checkerboard,
            AngleAggregationType::Single,
            SchedulingAlgorithm::DepthOfGraph,
        )
    };
    let serial = run(1);
    assert_eq!(serial.len(), 16 * 8 * 3);
    // every interior face crosses ranks, so one rank edge per direction is
    // lagged; the lag drains once the sweep count exceeds the longest cell path
    assert_same_values(&run(2), &serial);
}

#[test]
fn polar_aggregation_matches_single() {
    let single = sweep_on_ranks(1, columns, AngleAggregationType::Single, SchedulingAlgorithm::DepthOfGraph);
    let polar = sweep_on_ranks(2, columns, AngleAggregationType::Polar, SchedulingAlgorithm::DepthOfGraph);
    assert_same_values(&polar, &single);
}

#[test]
fn auxiliary_sets_share_the_primary_layout() {
    let grid = orthogonal_2d(3, 3, |_| 0, 0).unwrap();
    let quadrature = AngularQuadrature::product_uniform(2, 4).unwrap();
    let mut gs =
        SweepGroupset::new(quadrature, 4, 2, plane_options(AngleAggregationType::Polar)).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    let agg = gs.aggregation().unwrap();

    // 4 azimuths x 2 hemispheres, one set per group subset
    assert_eq!(agg.clusters().len(), 8);
    assert_eq!(agg.num_angle_sets(), 16);
    assert_eq!(agg.angle_set_groups().len(), 4);

    let sets: Vec<_> = agg.angle_sets().collect();
    for pair in sets.chunks(2) {
        let (primary, aux) = (pair[0], pair[1]);
        assert!(primary.is_primary());
        assert!(!aux.is_primary());
        assert!(Arc::ptr_eq(primary.common(), aux.common()));
        assert_eq!(primary.angles(), aux.angles());
        assert_eq!(aux.subset().first, 2);
    }
    assert!(!Arc::ptr_eq(sets[0].common(), sets[2].common()));
}

#[test]
fn aggregation_policies_check_their_preconditions() {
    let grid = orthogonal_2d(2, 2, |_| 0, 0).unwrap();

    let arbitrary = AngularQuadrature::from_omegas(&[Vector3::X, Vector3::Y]);
    let mut gs = SweepGroupset::new(arbitrary, 1, 1, plane_options(AngleAggregationType::Polar))
        .unwrap();
    let err = gs.init_flux_buffers(&grid, &NoComm).unwrap_err();
    assert!(matches!(err, SweepError::IncompatibleAggregation { aggregation: "polar", .. }));

    let product = AngularQuadrature::product_uniform(2, 4).unwrap();
    let mut gs =
        SweepGroupset::new(product.clone(), 1, 1, plane_options(AngleAggregationType::Azimuthal))
            .unwrap();
    let err = gs.init_flux_buffers(&grid, &NoComm).unwrap_err();
    assert!(matches!(err, SweepError::IncompatibleAggregation { aggregation: "azimuthal", .. }));
    assert!(!gs.is_initialized());

    let cylindrical = SweepOptions {
        geometry: GeometryType::TwoDCylindrical,
        aggregation: AngleAggregationType::Azimuthal,
        ..Default::default()
    };
    let mut gs = SweepGroupset::new(product, 1, 1, cylindrical).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    // per polar level: azimuths above pi/2 and the rest
    assert_eq!(gs.aggregation().unwrap().clusters().len(), 4);
}

#[test]
fn sweep_before_init_is_rejected() {
    let grid = slab_chain(2, |_| 0, 0).unwrap();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X]);
    let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
    let mut kernel = Attenuation::default();
    let err = gs
        .sweep(&grid, &NoComm, &mut kernel, &BoundaryMap::new())
        .unwrap_err();
    assert!(matches!(err, SweepError::NotInitialized));

    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    gs.make_group_subsets(1).unwrap();
    assert!(!gs.is_initialized());
}

#[test]
fn short_kernel_output_is_reported() {
    let grid = slab_chain(2, |_| 0, 0).unwrap();
    let quadrature = AngularQuadrature::from_omegas(&[Vector3::X]);
    let mut gs = SweepGroupset::new(quadrature, 2, 1, slab_options()).unwrap();
    gs.init_flux_buffers(&grid, &NoComm).unwrap();
    let mut kernel = |req: &CellSolveRequest<'_>| {
        req.outgoing
            .iter()
            .map(|&f| FaceValues::new(f, vec![0.0; 1]))
            .collect::<Vec<_>>()
    };
    let err = gs
        .sweep(&grid, &NoComm, &mut kernel, &BoundaryMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SweepError::KernelOutputMismatch { expected: 2, got: 1, .. }
    ));
}

#[test]
fn scheduler_offers_deepest_sets_first() {
    let results = run_ranks(2, |comm| {
        let grid = slab_chain(4, |g| (g / 2) as usize, comm.rank()).unwrap();
        let quadrature = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X]);
        let mut gs = SweepGroupset::new(quadrature, 1, 1, slab_options()).unwrap();
        gs.init_flux_buffers(&grid, &comm).unwrap();
        let order = gs.scheduler().unwrap().execution_order().to_vec();
        let mut kernel = Attenuation::new(0.0, 1.0);
        let report = gs
            .sweep(&grid, &comm, &mut kernel, &BoundaryMap::new())
            .unwrap();
        (order, report)
    });
    // rank 0 is upstream for +x (set 0), rank 1 for -x (set 1)
    assert_eq!(results[0].0, vec![0, 1]);
    assert_eq!(results[1].0, vec![1, 0]);
    for (_, report) in &results {
        assert_eq!(report.cells_solved, 4);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.messages_received, 1);
    }
}

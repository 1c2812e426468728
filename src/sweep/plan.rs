//! Sweep plans (SPDS): the local ordering plus the rank-level graph for one
//! representative direction.

use std::sync::Arc;

use super::location_graph::LocationGraph;
use super::ordering::SweepOrdering;
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::config::SweepOptions;
use crate::sweep_error::SweepError;
use crate::topology::{SweepGrid, Vector3};

/// Tags used by the location-dependency all-gather during setup.
pub const LOCATION_TAGS: ExchangeTags = ExchangeTags::from_base(CommTag::new(0x0100));

#[derive(Clone, Debug)]
pub struct SweepPlan {
    ordering: SweepOrdering,
    locations: LocationGraph,
}

impl SweepPlan {
    pub fn new(ordering: SweepOrdering, locations: LocationGraph) -> Self {
        Self {
            ordering,
            locations,
        }
    }

    /// Order the local cells for `omega` and build the rank-level graph.
    pub fn build<G, C>(
        grid: &G,
        omega: Vector3,
        comm: &C,
        allow_cycles: bool,
    ) -> Result<Self, SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
    {
        let ordering = SweepOrdering::build(grid, omega)?;
        let locations = LocationGraph::build(&ordering, comm, LOCATION_TAGS, allow_cycles)?;
        Ok(Self::new(ordering, locations))
    }

    pub fn ordering(&self) -> &SweepOrdering {
        &self.ordering
    }

    pub fn locations(&self) -> &LocationGraph {
        &self.locations
    }

    pub fn omega(&self) -> Vector3 {
        self.ordering.omega()
    }
}

#[cfg(feature = "rayon")]
fn build_orderings<G>(grid: &G, omegas: &[Vector3]) -> Result<Vec<SweepOrdering>, SweepError>
where
    G: SweepGrid + Sync + ?Sized,
{
    use rayon::prelude::*;
    omegas
        .par_iter()
        .map(|&omega| SweepOrdering::build(grid, omega))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn build_orderings<G>(grid: &G, omegas: &[Vector3]) -> Result<Vec<SweepOrdering>, SweepError>
where
    G: SweepGrid + Sync + ?Sized,
{
    omegas
        .iter()
        .map(|&omega| SweepOrdering::build(grid, omega))
        .collect()
}

/// One plan per representative direction. Local orderings are independent
/// (and built in parallel with the `rayon` feature); the rank-level graphs
/// are then built one after another since each is a collective.
pub fn build_sweep_orderings<G, C>(
    grid: &G,
    omegas: &[Vector3],
    comm: &C,
    options: &SweepOptions,
) -> Result<Vec<Arc<SweepPlan>>, SweepError>
where
    G: SweepGrid + Sync + ?Sized,
    C: Communicator,
{
    let orderings = build_orderings(grid, omegas)?;
    let mut plans = Vec::with_capacity(orderings.len());
    for ordering in orderings {
        let locations =
            LocationGraph::build(&ordering, comm, LOCATION_TAGS, options.allow_cycles)?;
        plans.push(Arc::new(SweepPlan::new(ordering, locations)));
    }
    log::debug!(
        "[rank {}] built {} sweep orderings over {} local cells",
        comm.rank(),
        plans.len(),
        grid.num_local_cells()
    );
    Ok(plans)
}

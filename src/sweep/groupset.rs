//! Groupset facade: the entry points a transport solver calls.

use super::aggregation::{AngleAggregation, make_group_subsets};
use super::angle_set::GroupSubset;
use super::boundary::BoundaryMap;
use super::kernel::SweepChunk;
use super::quadrature::AngularQuadrature;
use super::scheduler::{SweepReport, SweepScheduler};
use crate::algs::communicator::Communicator;
use crate::config::SweepOptions;
use crate::sweep_error::SweepError;
use crate::topology::SweepGrid;

/// A set of energy groups swept with one quadrature.
///
/// ```
/// use mesh_sweep::prelude::*;
/// use mesh_sweep::topology::generators::slab_chain;
///
/// let grid = slab_chain(4, |_| 0, 0).unwrap();
/// let quadrature = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X]);
/// let options = SweepOptions { geometry: GeometryType::OneDSlab, ..Default::default() };
/// let mut gs = SweepGroupset::new(quadrature, 2, 1, options).unwrap();
/// gs.init_flux_buffers(&grid, &NoComm).unwrap();
///
/// let mut kernel = |req: &CellSolveRequest<'_>| {
///     req.outgoing
///         .iter()
///         .map(|&f| FaceValues::new(f, vec![1.0; req.face_len(f)]))
///         .collect::<Vec<_>>()
/// };
/// let report = gs.sweep(&grid, &NoComm, &mut kernel, &BoundaryMap::new()).unwrap();
/// assert_eq!(report.cells_solved, 8);
/// ```
#[derive(Debug)]
pub struct SweepGroupset {
    quadrature: AngularQuadrature,
    num_groups: usize,
    subsets: Vec<GroupSubset>,
    options: SweepOptions,
    aggregation: Option<AngleAggregation>,
    scheduler: Option<SweepScheduler>,
}

impl SweepGroupset {
    pub fn new(
        quadrature: AngularQuadrature,
        num_groups: usize,
        num_group_subsets: usize,
        options: SweepOptions,
    ) -> Result<Self, SweepError> {
        options.validate()?;
        let subsets = make_group_subsets(num_groups, num_group_subsets)?;
        Ok(Self {
            quadrature,
            num_groups,
            subsets,
            options,
            aggregation: None,
            scheduler: None,
        })
    }

    pub fn quadrature(&self) -> &AngularQuadrature {
        &self.quadrature
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn group_subsets(&self) -> &[GroupSubset] {
        &self.subsets
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    pub fn aggregation(&self) -> Option<&AngleAggregation> {
        self.aggregation.as_ref()
    }

    pub fn aggregation_mut(&mut self) -> Option<&mut AngleAggregation> {
        self.aggregation.as_mut()
    }

    pub fn scheduler(&self) -> Option<&SweepScheduler> {
        self.scheduler.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.aggregation.is_some()
    }

    /// Build sweep orderings, FLUDS and angle sets. Collective over `comm`.
    pub fn init_flux_buffers<G, C>(&mut self, grid: &G, comm: &C) -> Result<(), SweepError>
    where
        G: SweepGrid + Sync + ?Sized,
        C: Communicator,
    {
        let aggregation =
            AngleAggregation::build(grid, comm, &self.quadrature, &self.subsets, &self.options)?;
        self.scheduler = Some(SweepScheduler::new(&aggregation, &self.options));
        self.aggregation = Some(aggregation);
        Ok(())
    }

    /// Sweep every direction and group once. Lagged values written by this
    /// sweep are read by the next one.
    pub fn sweep<G, C, K>(
        &mut self,
        grid: &G,
        comm: &C,
        kernel: &mut K,
        boundaries: &BoundaryMap,
    ) -> Result<SweepReport, SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
        K: SweepChunk + ?Sized,
    {
        let (Some(aggregation), Some(scheduler)) = (self.aggregation.as_mut(), &self.scheduler)
        else {
            return Err(SweepError::NotInitialized);
        };
        scheduler.sweep(aggregation, grid, comm, kernel, boundaries)
    }

    /// Drop every plan and buffer; `init_flux_buffers` must run again.
    pub fn reset_sweep_orderings(&mut self) {
        self.aggregation = None;
        self.scheduler = None;
    }

    /// Change the group split. Takes effect at the next `init_flux_buffers`.
    pub fn make_group_subsets(&mut self, num_group_subsets: usize) -> Result<(), SweepError> {
        self.subsets = make_group_subsets(self.num_groups, num_group_subsets)?;
        self.reset_sweep_orderings();
        Ok(())
    }
}

//! Angle aggregation: which directions share a sweep plan, and how the
//! resulting angle sets are built and grouped.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use itertools::Itertools;

use super::angle_set::{AngleSet, GroupSubset};
use super::fluds::{BETA_TAGS, FludsCommonData};
use super::plan::build_sweep_orderings;
use super::quadrature::{AngularQuadrature, QuadratureKind};
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::exchange::all_reduce_max;
use crate::config::{AngleAggregationType, GeometryType, SweepOptions};
use crate::sweep_error::SweepError;
use crate::topology::{FaceHistogram, GridAttributes, SweepGrid, Vector3};

/// Tags for the message-count agreement during setup.
pub const AGGREGATION_TAGS: ExchangeTags = ExchangeTags::from_base(CommTag::new(0x0120));

/// Directions that share one sweep plan; the plan is built for the first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectionCluster {
    pub directions: Vec<usize>,
}

impl DirectionCluster {
    pub fn representative(&self) -> usize {
        self.directions[0]
    }
}

fn incompatible(policy: AngleAggregationType, reason: impl Into<String>) -> SweepError {
    let e = SweepError::IncompatibleAggregation {
        aggregation: policy.name(),
        reason: reason.into(),
    };
    log::error!("{e}");
    e
}

/// Group direction indices into clusters that can share a sweep ordering.
pub fn associate_sweep_orderings(
    quadrature: &AngularQuadrature,
    attributes: GridAttributes,
    geometry: GeometryType,
    policy: AngleAggregationType,
) -> Result<Vec<DirectionCluster>, SweepError> {
    if quadrature.is_empty() {
        return Err(SweepError::InvalidConfiguration(
            "quadrature without directions cannot be swept".into(),
        ));
    }

    let clusters: Vec<Vec<usize>> = match policy {
        AngleAggregationType::Single => (0..quadrature.len()).map(|n| vec![n]).collect(),

        AngleAggregationType::Polar => {
            if !(attributes.orthogonal || attributes.dimension == 2 || attributes.extruded) {
                return Err(incompatible(
                    policy,
                    "grid must be orthogonal, two-dimensional or extruded",
                ));
            }
            let QuadratureKind::Product { polar, azimuthal } = quadrature.kind() else {
                return Err(incompatible(policy, "requires a product quadrature"));
            };
            let (upward, downward): (Vec<usize>, Vec<usize>) =
                (0..polar.len()).partition(|&p| polar[p] > FRAC_PI_2);
            let mut out = Vec::new();
            for a in 0..azimuthal.len() {
                for side in [&upward, &downward] {
                    if !side.is_empty() {
                        out.push(
                            side.iter()
                                .filter_map(|&p| quadrature.angle_index(p, a))
                                .collect(),
                        );
                    }
                }
            }
            out
        }

        AngleAggregationType::Azimuthal => {
            if !geometry.is_curvilinear() {
                return Err(incompatible(
                    policy,
                    "geometry must be 1-D spherical or 2-D cylindrical",
                ));
            }
            let QuadratureKind::Product { polar, azimuthal } = quadrature.kind() else {
                return Err(incompatible(policy, "requires a product quadrature"));
            };
            let mut out = Vec::new();
            for p in 0..polar.len() {
                let (wide, narrow): (Vec<usize>, Vec<usize>) = (0..azimuthal.len())
                    .filter_map(|a| quadrature.angle_index(p, a))
                    .partition(|&d| quadrature.direction(d).azimuthal > FRAC_PI_2);
                out.extend([wide, narrow].into_iter().filter(|c| !c.is_empty()));
            }
            out
        }
    };

    Ok(clusters
        .into_iter()
        .map(|directions| DirectionCluster { directions })
        .collect())
}

/// Angle-set group of a direction: its xy quadrant, folded onto `groups`.
pub fn angle_set_group_of(omega: Vector3, groups: usize) -> usize {
    if groups <= 1 {
        return 0;
    }
    let quadrant = match (omega.x >= 0.0, omega.y >= 0.0) {
        (true, true) => 0,
        (false, true) => 1,
        (false, false) => 2,
        (true, false) => 3,
    };
    quadrant % groups
}

/// Split `num_groups` groups into `num_subsets` contiguous subsets of
/// near-equal size; the first subsets take the remainder.
pub fn make_group_subsets(
    num_groups: usize,
    num_subsets: usize,
) -> Result<Vec<GroupSubset>, SweepError> {
    if num_groups == 0 || num_subsets == 0 {
        return Err(SweepError::InvalidConfiguration(format!(
            "cannot split {num_groups} groups into {num_subsets} subsets"
        )));
    }
    let n = num_subsets.min(num_groups);
    let (base, extra) = (num_groups / n, num_groups % n);
    let mut first = 0;
    Ok((0..n)
        .map(|i| {
            let num_groups = base + usize::from(i < extra);
            let s = GroupSubset { first, num_groups };
            first += num_groups;
            s
        })
        .collect())
}

#[derive(Debug, Default)]
pub struct AngleSetGroup {
    angle_sets: Vec<AngleSet>,
}

impl AngleSetGroup {
    pub fn angle_sets(&self) -> &[AngleSet] {
        &self.angle_sets
    }

    pub fn angle_sets_mut(&mut self) -> &mut [AngleSet] {
        &mut self.angle_sets
    }
}

/// Every angle set of a groupset, grouped for scheduling.
#[derive(Debug)]
pub struct AngleAggregation {
    groups: Vec<AngleSetGroup>,
    clusters: Vec<DirectionCluster>,
    max_messages: usize,
}

impl AngleAggregation {
    /// Build plans, FLUDS and angle sets for every direction cluster and
    /// group subset. Collective over `comm`.
    pub fn build<G, C>(
        grid: &G,
        comm: &C,
        quadrature: &AngularQuadrature,
        subsets: &[GroupSubset],
        options: &SweepOptions,
    ) -> Result<Self, SweepError>
    where
        G: SweepGrid + Sync + ?Sized,
        C: Communicator,
    {
        options.validate()?;
        let clusters = associate_sweep_orderings(
            quadrature,
            grid.attributes(),
            options.geometry,
            options.aggregation,
        )?;
        let omegas: Vec<Vector3> = clusters
            .iter()
            .map(|c| quadrature.direction(c.representative()).omega)
            .collect();
        let plans = build_sweep_orderings(grid, &omegas, comm, options)?;
        let histogram = FaceHistogram::from_grid(grid);

        let num_groups = options.angle_set_group_count();
        let mut groups: Vec<AngleSetGroup> =
            (0..num_groups).map(|_| AngleSetGroup::default()).collect();
        let mut next_id = 0;
        for (cluster, plan) in clusters.iter().zip(plans) {
            let common = Arc::new(FludsCommonData::build(
                grid,
                Arc::clone(&plan),
                &histogram,
                comm,
                BETA_TAGS,
            )?);
            let omegas: Vec<Vector3> = cluster
                .directions
                .iter()
                .map(|&d| quadrature.direction(d).omega)
                .collect();
            let group = angle_set_group_of(plan.omega(), num_groups);
            for (s, subset) in subsets.iter().enumerate() {
                groups[group].angle_sets.push(AngleSet::new(
                    next_id,
                    cluster.directions.clone(),
                    omegas.clone(),
                    *subset,
                    Arc::clone(&common),
                    s == 0,
                    options.eager_limit,
                ));
                next_id += 1;
            }
        }

        let mut agg = Self {
            groups,
            clusters,
            max_messages: 0,
        };
        let local_max = agg.angle_sets().map(|a| a.buffer().max_messages()).max().unwrap_or(0);
        agg.max_messages = all_reduce_max(comm, AGGREGATION_TAGS, local_max)?;
        options.check_tag_span(next_id.saturating_mul(agg.max_messages))?;
        let (base, max) = (CommTag::new(options.tag_base), agg.max_messages);
        for set in agg.angle_sets_mut() {
            set.assign_tags(base, max)?;
        }

        log::debug!(
            "[rank {}] {} aggregation: {} clusters, {} angle sets in {} groups, up to {} messages per peer",
            comm.rank(),
            options.aggregation.name(),
            agg.clusters.len(),
            next_id,
            agg.groups.len(),
            agg.max_messages
        );
        Ok(agg)
    }

    pub fn clusters(&self) -> &[DirectionCluster] {
        &self.clusters
    }

    pub fn angle_set_groups(&self) -> &[AngleSetGroup] {
        &self.groups
    }

    /// Messages per peer per angle set, agreed over all ranks.
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// All angle sets, ordered by id.
    pub fn angle_sets(&self) -> impl Iterator<Item = &AngleSet> {
        self.groups
            .iter()
            .flat_map(|g| g.angle_sets.iter())
            .sorted_by_key(|a| a.id())
    }

    pub fn angle_sets_mut(&mut self) -> impl Iterator<Item = &mut AngleSet> {
        self.groups.iter_mut().flat_map(|g| g.angle_sets.iter_mut())
    }

    pub fn num_angle_sets(&self) -> usize {
        self.groups.iter().map(|g| g.angle_sets.len()).sum()
    }

    /// Angle set with id `id`.
    pub fn angle_set_mut(&mut self, id: usize) -> Option<&mut AngleSet> {
        self.angle_sets_mut().find(|a| a.id() == id)
    }

    pub fn zero_incoming_delayed(&mut self) {
        for set in self.angle_sets_mut() {
            set.fluds_mut().zero_incoming_delayed();
        }
    }

    pub fn zero_outgoing_delayed(&mut self) {
        for set in self.angle_sets_mut() {
            set.fluds_mut().zero_outgoing_delayed();
        }
    }
}

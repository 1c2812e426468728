//! The sweep layer: orderings, flux data structures, angle sets and the
//! scheduler that executes them.

pub mod aggregation;
pub mod angle_set;
pub mod boundary;
pub mod fluds;
pub mod groupset;
pub mod kernel;
pub mod location_graph;
pub mod ordering;
pub mod orientation;
pub mod plan;
pub mod quadrature;
pub mod scheduler;
pub mod sweep_buffer;

pub use aggregation::{AngleAggregation, AngleSetGroup, DirectionCluster, associate_sweep_orderings};
pub use angle_set::{AngleSet, AngleSetStatus, GroupSubset};
pub use boundary::{
    BoundaryMap, IsotropicBoundary, LeakageTally, ReflectingBoundary, SweepBoundary, VacuumBoundary,
};
pub use groupset::SweepGroupset;
pub use kernel::{CellSolveRequest, FaceValues, SweepChunk};
pub use location_graph::LocationGraph;
pub use ordering::SweepOrdering;
pub use orientation::FaceOrientation;
pub use plan::{SweepPlan, build_sweep_orderings};
pub use quadrature::{AngularQuadrature, Direction};
pub use scheduler::{SweepReport, SweepScheduler};
pub use sweep_buffer::MessagePlan;

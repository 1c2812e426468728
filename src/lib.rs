#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-sweep
//!
//! mesh-sweep schedules the sweep phase of a discrete-ordinates transport
//! solver on unstructured, partitioned meshes. For every direction, each
//! local cell is visited in an order consistent with its upwind/downwind
//! dependencies, across ranks, with cyclic dependencies broken by lagged
//! data and cross-rank face data exchanged asynchronously.
//!
//! ## Features
//! - Per-direction sweep orderings with cycle detection and breaking
//!   (local cell graph and rank-level graph)
//! - Flux data structures (FLUDS): slot allocation for local faces and
//!   negotiation of the non-local face layout with neighbouring ranks
//! - Angle aggregation (single, polar, azimuthal) and group subsets
//! - A depth-of-graph scheduler that overlaps communication of some angle
//!   sets with execution of others on one thread of control
//! - Pluggable communication backends (serial, in-process mailbox, MPI)
//!
//! ## Usage
//! Add `mesh-sweep` as a dependency in your `Cargo.toml` and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-sweep = "0.3"
//! # Optional features:
//! # features = ["mpi-support","rayon"]
//! ```
//!
//! The per-cell numerical kernel is supplied by the caller through
//! [`sweep::SweepChunk`]; the crate only moves data.
//!
//! ## Determinism
//!
//! Sweep orderings, cycle breaking and angle-set construction are
//! deterministic: every rank derives the same rank-level graph and the same
//! angle-set ids, which is what lets message tags line up without extra
//! negotiation.

pub mod algs;
pub mod config;
pub mod debug_invariants;
pub mod sweep;
pub mod sweep_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::config::{AngleAggregationType, GeometryType, SchedulingAlgorithm, SweepOptions};
    pub use crate::sweep::{
        AngularQuadrature, BoundaryMap, CellSolveRequest, FaceValues, IsotropicBoundary,
        LeakageTally, ReflectingBoundary, SweepBoundary, SweepChunk, SweepGroupset, SweepReport,
        VacuumBoundary,
    };
    pub use crate::sweep_error::SweepError;
    pub use crate::topology::{
        Cell, Face, FaceNeighbor, GridAttributes, LocalGrid, SweepGrid, Vector3,
    };
}

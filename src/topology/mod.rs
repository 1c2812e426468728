//! Mesh topology as seen by the sweep layer.
//!
//! The sweep layer never owns geometry generation or partitioning; it reads a
//! partition through the [`SweepGrid`] trait. This module provides:
//! - `Vector3` for directions and normals,
//! - `Cell` / `Face` / `FaceNeighbor`, the per-cell connectivity record,
//! - `LocalGrid`, a validated in-memory partition,
//! - structured generators used by tests and benches,
//! - `FaceHistogram`, the face-size binning used by flux buffers.

pub mod cell;
pub mod face_histogram;
pub mod generators;
pub mod grid;
pub mod vector;

pub use cell::{Cell, CellShape, Face, FaceNeighbor, GlobalCellId};
pub use face_histogram::{FaceCategory, FaceHistogram};
pub use grid::{GridAttributes, LocalGrid, SweepGrid};
pub use vector::Vector3;

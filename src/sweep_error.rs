//! SweepError: unified error type for mesh-sweep public APIs
//!
//! Variants are grouped by where the failure originates:
//! - topology errors: the mesh handed to the sweep layer is inconsistent,
//! - protocol errors: a neighbour rank sent something we cannot use,
//! - policy/configuration errors: the requested options cannot be honoured,
//! - runtime errors: the kernel or the schedule misbehaved mid-sweep.
//!
//! All of them are fatal for the sweep in progress; nothing is retried.

use thiserror::Error;

/// Unified error type for mesh-sweep operations.
#[derive(Debug, Error)]
pub enum SweepError {
    // ----- topology -------------------------------------------------------
    /// An incoming local face had no claimed slot in the upstream lock box.
    #[error(
        "lock box slot not found: cell {cell} face {face} expected upstream cell {upstream_cell} face {upstream_face} in category {category}"
    )]
    LockBoxSlotNotFound {
        cell: u64,
        face: usize,
        upstream_cell: u64,
        upstream_face: usize,
        category: usize,
    },
    /// A lagged incoming face whose upstream cell never claimed a delayed slot.
    #[error("delayed slot not found: cell {cell} face {face} expected upstream cell {upstream_cell}")]
    DelayedSlotNotFound {
        cell: u64,
        face: usize,
        upstream_cell: u64,
    },
    /// Slots were claimed during the alpha pass but never consumed downstream.
    #[error("{count} lock box slot(s) left claimed in face category {category}")]
    UnconsumedSlots { category: usize, count: usize },
    /// No face of the neighbour shares the vertex set of this face.
    #[error("associated face not found: cell {cell} face {face} has no match on neighbour cell {neighbor}")]
    AssociatedFaceNotFound { cell: u64, face: usize, neighbor: u64 },
    /// A vertex of this face does not appear on the associated face.
    #[error("associated vertex not found: cell {cell} face {face} vertex {vertex}")]
    AssociatedVertexNotFound { cell: u64, face: usize, vertex: u64 },
    /// The dependency graph stalled and no edge could be removed.
    #[error("dependency cycle could not be broken: {remaining} vertices left unordered")]
    UnbreakableCycle { remaining: usize },
    /// A local cell index outside `0..num_local_cells`.
    #[error("invalid local cell index {index} (grid has {num_cells} local cells)")]
    InvalidCellIndex { index: usize, num_cells: usize },
    /// Grid consistency check failed.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
    /// A face dof count that no face category covers.
    #[error("no face category for faces with {num_dofs} dofs")]
    FaceCategoryNotFound { num_dofs: usize },
    /// A remote incoming face whose neighbour cell was not in the predecessor's views.
    #[error("cell {cell} not found in the cell views received from rank {rank}")]
    MissingPredecessorCell { rank: usize, cell: u64 },
    /// A remote incoming face that negotiation never resolved.
    #[error("remote incoming face left unresolved: cell {cell} face {face}")]
    UnresolvedRemoteFace { cell: u64, face: usize },

    // ----- protocol -------------------------------------------------------
    /// Communication with a neighbour failed.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A payload whose byte length disagrees with its announced length.
    #[error("wire length mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    WireLengthMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A compact cell-view stream that does not decode.
    #[error("malformed cell view stream: {0}")]
    MalformedCellViews(String),
    /// A partition/rank id not present in the location graph.
    #[error("rank {partition} is not a known dependency of rank {rank}")]
    UnknownPartition { rank: usize, partition: usize },

    // ----- policy / configuration -----------------------------------------
    /// The aggregation policy cannot be applied to this quadrature or geometry.
    #[error("{aggregation} aggregation is not applicable: {reason}")]
    IncompatibleAggregation {
        aggregation: &'static str,
        reason: String,
    },
    /// The rank-level dependency graph has cycles and cycles are not allowed.
    #[error("rank-level sweep dependencies contain cycles ({edges} edge(s) would need lagging) and cycles are not allowed")]
    CyclesNotAllowed { edges: usize },
    /// Options that cannot be used together or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Sweep requested before flux buffers were initialised.
    #[error("flux buffers are not initialised; call init_flux_buffers first")]
    NotInitialized,

    // ----- runtime --------------------------------------------------------
    /// The kernel did not return exactly the downwind values it was asked for.
    #[error("kernel output mismatch on cell {cell} face {face}: expected {expected} values, got {got}")]
    KernelOutputMismatch {
        cell: u64,
        face: usize,
        expected: usize,
        got: usize,
    },
    /// A buffer access fell outside the allocated region.
    #[error("flux buffer index out of range: {0}")]
    BufferIndexOutOfRange(String),
    /// The scheduler made no progress for longer than the configured timeout.
    #[error("sweep stalled: {pending} angle set(s) still pending after {elapsed_ms} ms")]
    Stalled { pending: usize, elapsed_ms: u128 },
}

impl SweepError {
    /// Wrap a communication failure message for `neighbor`.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        SweepError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }

    /// Whether this error comes from data sent by another rank.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SweepError::CommError { .. }
                | SweepError::WireLengthMismatch { .. }
                | SweepError::MalformedCellViews(_)
                | SweepError::UnknownPartition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comm_error_displays_neighbor_and_source() {
        let e = SweepError::comm(3, "peer vanished");
        assert_eq!(e.to_string(), "communication error with rank 3: peer vanished");
        assert!(e.is_protocol());
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn policy_errors_are_not_protocol_errors() {
        let e = SweepError::CyclesNotAllowed { edges: 2 };
        assert!(!e.is_protocol());
    }
}

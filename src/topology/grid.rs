//! The mesh-provider contract: what the sweep layer asks of a partitioned grid.

use serde::{Deserialize, Serialize};

use super::cell::{Cell, FaceNeighbor};
use crate::debug_invariants::DebugInvariants;
use crate::sweep_error::SweepError;

/// Grid-wide properties that gate aggregation policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridAttributes {
    pub dimension: usize,
    /// Every face normal is axis aligned.
    pub orthogonal: bool,
    /// Built by extruding a 2-D mesh along z.
    pub extruded: bool,
}

/// Read-only view of the local part of a partitioned grid.
pub trait SweepGrid {
    /// Rank that owns the local cells.
    fn rank(&self) -> usize;
    fn attributes(&self) -> GridAttributes;
    /// Local cells, indexed by local id.
    fn local_cells(&self) -> &[Cell];

    fn num_local_cells(&self) -> usize {
        self.local_cells().len()
    }

    fn cell(&self, local_id: usize) -> Result<&Cell, SweepError> {
        let cells = self.local_cells();
        cells.get(local_id).ok_or(SweepError::InvalidCellIndex {
            index: local_id,
            num_cells: cells.len(),
        })
    }
}

/// In-memory grid partition.
#[derive(Clone, Debug, Default)]
pub struct LocalGrid {
    rank: usize,
    attributes: GridAttributes,
    cells: Vec<Cell>,
}

impl LocalGrid {
    /// Build and validate a grid partition.
    pub fn new(
        rank: usize,
        attributes: GridAttributes,
        cells: Vec<Cell>,
    ) -> Result<Self, SweepError> {
        let grid = Self {
            rank,
            attributes,
            cells,
        };
        grid.validate_invariants()?;
        Ok(grid)
    }
}

impl SweepGrid for LocalGrid {
    fn rank(&self) -> usize {
        self.rank
    }
    fn attributes(&self) -> GridAttributes {
        self.attributes
    }
    fn local_cells(&self) -> &[Cell] {
        &self.cells
    }
}

impl DebugInvariants for LocalGrid {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LocalGrid");
    }

    fn validate_invariants(&self) -> Result<(), SweepError> {
        let n = self.cells.len();
        for (i, cell) in self.cells.iter().enumerate() {
            if cell.local_id != i {
                return Err(SweepError::InvalidGrid(format!(
                    "cell {} stored at {i} has local id {}",
                    cell.global_id, cell.local_id
                )));
            }
            if cell.partition != self.rank {
                return Err(SweepError::InvalidGrid(format!(
                    "cell {} belongs to rank {} but is local to rank {}",
                    cell.global_id, cell.partition, self.rank
                )));
            }
            for (f, face) in cell.faces.iter().enumerate() {
                match face.neighbor {
                    FaceNeighbor::Local { cell: nb } if nb >= n || nb == i => {
                        return Err(SweepError::InvalidGrid(format!(
                            "cell {} face {f} has bad local neighbour {nb}",
                            cell.global_id
                        )));
                    }
                    FaceNeighbor::Remote { rank, .. } if rank == self.rank => {
                        return Err(SweepError::InvalidGrid(format!(
                            "cell {} face {f} names its own rank as remote",
                            cell.global_id
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::cell::{CellShape, Face};
    use crate::topology::vector::Vector3;

    fn cell(local_id: usize, neighbor: FaceNeighbor) -> Cell {
        Cell {
            global_id: local_id as u64,
            local_id,
            partition: 0,
            shape: CellShape::Slab,
            faces: vec![Face::new(Vector3::X, vec![1], neighbor)],
        }
    }

    #[test]
    fn rejects_self_neighbour() {
        let err = LocalGrid::new(0, GridAttributes::default(), vec![cell(0, FaceNeighbor::Local { cell: 0 })]);
        assert!(matches!(err, Err(SweepError::InvalidGrid(_))));
    }

    #[test]
    fn rejects_remote_on_own_rank() {
        let nb = FaceNeighbor::Remote { rank: 0, global_id: 7 };
        assert!(LocalGrid::new(0, GridAttributes::default(), vec![cell(0, nb)]).is_err());
    }

    #[test]
    fn cell_lookup_is_checked() {
        let g = LocalGrid::new(0, GridAttributes::default(), vec![cell(0, FaceNeighbor::Boundary { id: 0 })]).unwrap();
        assert!(g.cell(0).is_ok());
        assert!(matches!(
            g.cell(3),
            Err(SweepError::InvalidCellIndex { index: 3, num_cells: 1 })
        ));
    }
}

//! Basic structured grid generators (slab chain, quad and hex boxes) with a
//! caller-supplied cell owner, producing the local partition of one rank.
//!
//! Boundary ids: 0 = x-min, 1 = x-max, 2 = y-min, 3 = y-max, 4 = z-min,
//! 5 = z-max. Cells are unit sized; only topology and normals matter to the
//! sweep layer.

use std::collections::HashMap;

use super::cell::{Cell, CellShape, Face, FaceNeighbor, GlobalCellId};
use super::grid::{GridAttributes, LocalGrid};
use super::vector::Vector3;
use crate::sweep_error::SweepError;

/// One face of a global cell before partitioning.
struct FaceSpec {
    normal: Vector3,
    vertex_ids: Vec<u64>,
    across: Across,
}

enum Across {
    Cell(GlobalCellId),
    Boundary(u64),
}

fn invalid(message: impl Into<String>) -> SweepError {
    SweepError::InvalidGrid(message.into())
}

fn build_partition<F>(
    global_cells: Vec<(GlobalCellId, CellShape, Vec<FaceSpec>)>,
    owner: F,
    rank: usize,
    attributes: GridAttributes,
) -> Result<LocalGrid, SweepError>
where
    F: Fn(GlobalCellId) -> usize,
{
    let local_ids: HashMap<GlobalCellId, usize> = global_cells
        .iter()
        .filter(|(gid, _, _)| owner(*gid) == rank)
        .enumerate()
        .map(|(local, (gid, _, _))| (*gid, local))
        .collect();

    let mut cells = Vec::with_capacity(local_ids.len());
    for (gid, shape, specs) in global_cells {
        if owner(gid) != rank {
            continue;
        }
        let faces = specs
            .into_iter()
            .map(|spec| {
                let neighbor = match spec.across {
                    Across::Boundary(id) => FaceNeighbor::Boundary { id },
                    Across::Cell(nb) => match local_ids.get(&nb) {
                        Some(&cell) => FaceNeighbor::Local { cell },
                        None => FaceNeighbor::Remote {
                            rank: owner(nb),
                            global_id: nb,
                        },
                    },
                };
                Face::new(spec.normal, spec.vertex_ids, neighbor)
            })
            .collect();
        cells.push(Cell {
            global_id: gid,
            local_id: cells.len(),
            partition: rank,
            shape,
            faces,
        });
    }
    LocalGrid::new(rank, attributes, cells)
}

/// 1-D chain of `num_cells` slabs along x.
pub fn slab_chain<F>(num_cells: usize, owner: F, rank: usize) -> Result<LocalGrid, SweepError>
where
    F: Fn(GlobalCellId) -> usize,
{
    if num_cells == 0 {
        return Err(invalid("slab chain needs at least one cell"));
    }
    let n = num_cells as u64;
    let cells = (0..n)
        .map(|i| {
            let west = if i == 0 { Across::Boundary(0) } else { Across::Cell(i - 1) };
            let east = if i + 1 == n { Across::Boundary(1) } else { Across::Cell(i + 1) };
            let faces = vec![
                FaceSpec { normal: -Vector3::X, vertex_ids: vec![i], across: west },
                FaceSpec { normal: Vector3::X, vertex_ids: vec![i + 1], across: east },
            ];
            (i, CellShape::Slab, faces)
        })
        .collect();
    let attributes = GridAttributes {
        dimension: 1,
        orthogonal: true,
        extruded: false,
    };
    build_partition(cells, owner, rank, attributes)
}

/// `nx × ny` quads; cell `(i, j)` has global id `j * nx + i`.
pub fn orthogonal_2d<F>(nx: usize, ny: usize, owner: F, rank: usize) -> Result<LocalGrid, SweepError>
where
    F: Fn(GlobalCellId) -> usize,
{
    if nx == 0 || ny == 0 {
        return Err(invalid(format!("empty quad grid {nx}x{ny}")));
    }
    let (nx, ny) = (nx as u64, ny as u64);
    let v = |i: u64, j: u64| j * (nx + 1) + i;
    let c = |i: u64, j: u64| j * nx + i;
    let mut cells = Vec::with_capacity((nx * ny) as usize);
    for j in 0..ny {
        for i in 0..nx {
            let across = |nb: Option<u64>, bid: u64| nb.map_or(Across::Boundary(bid), Across::Cell);
            let faces = vec![
                FaceSpec {
                    normal: -Vector3::Y,
                    vertex_ids: vec![v(i, j), v(i + 1, j)],
                    across: across((j > 0).then(|| c(i, j - 1)), 2),
                },
                FaceSpec {
                    normal: Vector3::X,
                    vertex_ids: vec![v(i + 1, j), v(i + 1, j + 1)],
                    across: across((i + 1 < nx).then(|| c(i + 1, j)), 1),
                },
                FaceSpec {
                    normal: Vector3::Y,
                    vertex_ids: vec![v(i + 1, j + 1), v(i, j + 1)],
                    across: across((j + 1 < ny).then(|| c(i, j + 1)), 3),
                },
                FaceSpec {
                    normal: -Vector3::X,
                    vertex_ids: vec![v(i, j + 1), v(i, j)],
                    across: across((i > 0).then(|| c(i - 1, j)), 0),
                },
            ];
            cells.push((c(i, j), CellShape::Polygon, faces));
        }
    }
    let attributes = GridAttributes {
        dimension: 2,
        orthogonal: true,
        extruded: false,
    };
    build_partition(cells, owner, rank, attributes)
}

/// `nx × ny × nz` hexes; cell `(i, j, k)` has global id `(k * ny + j) * nx + i`.
pub fn orthogonal_3d<F>(
    nx: usize,
    ny: usize,
    nz: usize,
    owner: F,
    rank: usize,
) -> Result<LocalGrid, SweepError>
where
    F: Fn(GlobalCellId) -> usize,
{
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(invalid(format!("empty hex grid {nx}x{ny}x{nz}")));
    }
    let (nx, ny, nz) = (nx as u64, ny as u64, nz as u64);
    let v = |i: u64, j: u64, k: u64| (k * (ny + 1) + j) * (nx + 1) + i;
    let c = |i: u64, j: u64, k: u64| (k * ny + j) * nx + i;
    let mut cells = Vec::with_capacity((nx * ny * nz) as usize);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let across = |nb: Option<u64>, bid: u64| nb.map_or(Across::Boundary(bid), Across::Cell);
                let faces = vec![
                    FaceSpec {
                        normal: -Vector3::X,
                        vertex_ids: vec![v(i, j, k), v(i, j + 1, k), v(i, j + 1, k + 1), v(i, j, k + 1)],
                        across: across((i > 0).then(|| c(i - 1, j, k)), 0),
                    },
                    FaceSpec {
                        normal: Vector3::X,
                        vertex_ids: vec![v(i + 1, j, k), v(i + 1, j, k + 1), v(i + 1, j + 1, k + 1), v(i + 1, j + 1, k)],
                        across: across((i + 1 < nx).then(|| c(i + 1, j, k)), 1),
                    },
                    FaceSpec {
                        normal: -Vector3::Y,
                        vertex_ids: vec![v(i, j, k), v(i, j, k + 1), v(i + 1, j, k + 1), v(i + 1, j, k)],
                        across: across((j > 0).then(|| c(i, j - 1, k)), 2),
                    },
                    FaceSpec {
                        normal: Vector3::Y,
                        vertex_ids: vec![v(i, j + 1, k), v(i + 1, j + 1, k), v(i + 1, j + 1, k + 1), v(i, j + 1, k + 1)],
                        across: across((j + 1 < ny).then(|| c(i, j + 1, k)), 3),
                    },
                    FaceSpec {
                        normal: -Vector3::Z,
                        vertex_ids: vec![v(i, j, k), v(i + 1, j, k), v(i + 1, j + 1, k), v(i, j + 1, k)],
                        across: across((k > 0).then(|| c(i, j, k - 1)), 4),
                    },
                    FaceSpec {
                        normal: Vector3::Z,
                        vertex_ids: vec![v(i, j, k + 1), v(i, j + 1, k + 1), v(i + 1, j + 1, k + 1), v(i + 1, j, k + 1)],
                        across: across((k + 1 < nz).then(|| c(i, j, k + 1)), 5),
                    },
                ];
                cells.push((c(i, j, k), CellShape::Polyhedron, faces));
            }
        }
    }
    let attributes = GridAttributes {
        dimension: 3,
        orthogonal: true,
        extruded: true,
    };
    build_partition(cells, owner, rank, attributes)
}

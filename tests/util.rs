#![allow(dead_code)]
use std::collections::BTreeMap;

use mesh_sweep::algs::communicator::RayonComm;
use mesh_sweep::sweep::{CellSolveRequest, FaceValues, SweepChunk};
use mesh_sweep::topology::{
    Cell, CellShape, Face, FaceNeighbor, GridAttributes, LocalGrid, Vector3,
};

/// Run `f` on `size` ranks, one thread each, sharing a private mailbox.
/// Results come back in rank order.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(RayonComm) -> T + Sync,
{
    let comms = RayonComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Toy transport kernel: the cell value of group `g` is the mean of the
/// per-face upwind averages plus `source * (g + 1)`, divided by
/// `1 + sigma`. Every outgoing dof carries the cell value.
#[derive(Debug, Default)]
pub struct Attenuation {
    pub sigma: f64,
    pub source: f64,
    /// `(global cell id, angle, group) -> value` of the latest solve.
    pub cell_psi: BTreeMap<(u64, usize, usize), f64>,
}

impl Attenuation {
    pub fn new(sigma: f64, source: f64) -> Self {
        Self {
            sigma,
            source,
            cell_psi: BTreeMap::new(),
        }
    }
}

impl SweepChunk for Attenuation {
    fn solve(&mut self, req: &CellSolveRequest<'_>) -> Vec<FaceValues> {
        let g = req.num_groups;
        let mut cell_value = vec![0.0; g];
        for (gi, value) in cell_value.iter_mut().enumerate() {
            let face_means: Vec<f64> = req
                .upwind
                .iter()
                .map(|fv| {
                    let dofs = fv.psi.len() / g;
                    fv.psi.iter().skip(gi).step_by(g).sum::<f64>() / dofs as f64
                })
                .collect();
            let upwind = if face_means.is_empty() {
                0.0
            } else {
                face_means.iter().sum::<f64>() / face_means.len() as f64
            };
            let group = req.group_start + gi;
            *value = (upwind + self.source * (group + 1) as f64) / (1.0 + self.sigma);
            self.cell_psi
                .insert((req.cell.global_id, req.angle, group), *value);
        }
        req.outgoing
            .iter()
            .map(|&f| {
                let dofs = req.face_len(f) / g;
                let psi = (0..dofs).flat_map(|_| cell_value.iter().copied()).collect();
                FaceValues::new(f, psi)
            })
            .collect()
    }
}

fn face(normal: Vector3, vertex_ids: &[u64], neighbor: FaceNeighbor) -> Face {
    Face::new(normal, vertex_ids.to_vec(), neighbor)
}

fn cell(global_id: u64, faces: Vec<Face>) -> Cell {
    Cell {
        global_id,
        local_id: global_id as usize,
        partition: 0,
        shape: CellShape::Polygon,
        faces,
    }
}

const ONE_D: GridAttributes = GridAttributes {
    dimension: 1,
    orthogonal: true,
    extruded: false,
};

/// Two interlocking cells: along +x, cell 0 feeds cell 1 through face
/// `{1, 2}` and cell 1 feeds cell 0 through face `{3, 4}`. Cell 0 sees
/// boundary 0 upwind, cell 1 leaves through boundary 1.
pub fn interlocked_pair() -> LocalGrid {
    let a = cell(
        0,
        vec![
            face(-Vector3::X, &[0], FaceNeighbor::Boundary { id: 0 }),
            face(Vector3::X, &[1, 2], FaceNeighbor::Local { cell: 1 }),
            face(-Vector3::X, &[3, 4], FaceNeighbor::Local { cell: 1 }),
        ],
    );
    let b = cell(
        1,
        vec![
            face(-Vector3::X, &[1, 2], FaceNeighbor::Local { cell: 0 }),
            face(Vector3::X, &[3, 4], FaceNeighbor::Local { cell: 0 }),
            face(Vector3::X, &[5], FaceNeighbor::Boundary { id: 1 }),
        ],
    );
    LocalGrid::new(0, ONE_D, vec![a, b]).expect("valid grid")
}

/// [`interlocked_pair`] split over two ranks: cell 0 lives on rank 0 and
/// cell 1 on rank 1, so the rank graph has a two-rank cycle.
pub fn interlocked_across_ranks(rank: usize) -> LocalGrid {
    let (global_id, faces) = if rank == 0 {
        let other = FaceNeighbor::Remote { rank: 1, global_id: 1 };
        (
            0,
            vec![
                face(-Vector3::X, &[0], FaceNeighbor::Boundary { id: 0 }),
                face(Vector3::X, &[1, 2], other),
                face(-Vector3::X, &[3, 4], other),
            ],
        )
    } else {
        let other = FaceNeighbor::Remote { rank: 0, global_id: 0 };
        (
            1,
            vec![
                face(-Vector3::X, &[1, 2], other),
                face(Vector3::X, &[3, 4], other),
                face(Vector3::X, &[5], FaceNeighbor::Boundary { id: 1 }),
            ],
        )
    };
    let only = Cell {
        global_id,
        local_id: 0,
        partition: rank,
        shape: CellShape::Polygon,
        faces,
    };
    LocalGrid::new(rank, ONE_D, vec![only]).expect("valid grid")
}

/// Two cells whose shared face points `-x` from both sides: each sees the
/// other as upwind along `+x` and no cell feeds the shared face.
pub fn mutually_upwind_pair() -> LocalGrid {
    let a = cell(
        0,
        vec![
            face(-Vector3::X, &[0], FaceNeighbor::Boundary { id: 0 }),
            face(-Vector3::X, &[1], FaceNeighbor::Local { cell: 1 }),
        ],
    );
    let b = cell(
        1,
        vec![
            face(-Vector3::X, &[1], FaceNeighbor::Local { cell: 0 }),
            face(Vector3::X, &[2], FaceNeighbor::Boundary { id: 1 }),
        ],
    );
    LocalGrid::new(0, ONE_D, vec![a, b]).expect("valid grid")
}

/// Assert two cell-value maps agree entry by entry.
pub fn assert_same_values(
    got: &BTreeMap<(u64, usize, usize), f64>,
    want: &BTreeMap<(u64, usize, usize), f64>,
) {
    assert_eq!(
        got.keys().collect::<Vec<_>>(),
        want.keys().collect::<Vec<_>>(),
        "solved cells differ"
    );
    for (k, w) in want {
        let g = got[k];
        assert!((g - w).abs() < 1e-12, "{k:?}: got {g}, want {w}");
    }
}

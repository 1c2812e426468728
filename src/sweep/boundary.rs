//! Sweep boundaries: incoming angular flux on domain-boundary faces.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use super::quadrature::AngularQuadrature;
use crate::sweep_error::SweepError;
use crate::topology::{GlobalCellId, Vector3};

/// The boundary face dof a value belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundaryFaceRef {
    pub cell: GlobalCellId,
    pub face: usize,
    pub dof: usize,
    /// First group of the values passed alongside.
    pub group_start: usize,
}

pub trait SweepBoundary: Send + Sync {
    /// Fill `out` with the incoming flux of direction `angle` for groups
    /// `face.group_start..face.group_start + out.len()`.
    fn incoming_psi(&self, face: &BoundaryFaceRef, angle: usize, out: &mut [f64]);

    /// Outgoing flux leaving through the boundary. Ignored by default.
    fn store_outgoing(&self, _face: &BoundaryFaceRef, _angle: usize, _psi: &[f64]) {}

    /// Called once on every rank after a sweep completed.
    fn finish_sweep(&self) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct VacuumBoundary;

impl SweepBoundary for VacuumBoundary {
    fn incoming_psi(&self, _face: &BoundaryFaceRef, _angle: usize, out: &mut [f64]) {
        out.fill(0.0);
    }
}

/// Same incoming value for every direction, per group. Groups past the end
/// of `values` see zero.
#[derive(Clone, Debug, Default)]
pub struct IsotropicBoundary {
    pub values: Vec<f64>,
}

impl IsotropicBoundary {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

impl SweepBoundary for IsotropicBoundary {
    fn incoming_psi(&self, face: &BoundaryFaceRef, _angle: usize, out: &mut [f64]) {
        for (g, v) in out.iter_mut().enumerate() {
            *v = self.values.get(face.group_start + g).copied().unwrap_or(0.0);
        }
    }
}

/// Vacuum boundary that sums the flux leaving through it, per direction
/// and group.
#[derive(Debug, Default)]
pub struct LeakageTally {
    leakage: Mutex<BTreeMap<(usize, usize), f64>>,
}

impl LeakageTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated outgoing flux of `(angle, group)`.
    pub fn get(&self, angle: usize, group: usize) -> f64 {
        self.leakage.lock().get(&(angle, group)).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> BTreeMap<(usize, usize), f64> {
        self.leakage.lock().clone()
    }

    pub fn clear(&self) {
        self.leakage.lock().clear();
    }
}

impl SweepBoundary for LeakageTally {
    fn incoming_psi(&self, _face: &BoundaryFaceRef, _angle: usize, out: &mut [f64]) {
        out.fill(0.0);
    }

    fn store_outgoing(&self, face: &BoundaryFaceRef, angle: usize, psi: &[f64]) {
        let mut tally = self.leakage.lock();
        for (g, &v) in psi.iter().enumerate() {
            *tally.entry((angle, face.group_start + g)).or_default() += v;
        }
    }
}

/// `(cell, face, dof, angle, group)`
type ReflectedKey = (GlobalCellId, usize, usize, usize, usize);

/// Specular reflection about a plane with outward `normal`.
///
/// Outgoing flux of direction `ω` is recorded under the reflected direction
/// `ω - 2(ω·n)n`. Incoming flux is read from the previous sweep, so the
/// boundary never gates angle-set readiness; faces not yet written see zero.
#[derive(Debug)]
pub struct ReflectingBoundary {
    normal: Vector3,
    reflected: Vec<usize>,
    psi_new: Mutex<HashMap<ReflectedKey, f64>>,
    psi_old: Mutex<HashMap<ReflectedKey, f64>>,
}

impl ReflectingBoundary {
    /// Fails when some direction has no mirror image in `quadrature`.
    pub fn new(normal: Vector3, quadrature: &AngularQuadrature) -> Result<Self, SweepError> {
        const TOLERANCE: f64 = 1.0e-8;
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(SweepError::InvalidConfiguration(
                "reflecting boundary needs a non-zero normal".into(),
            ));
        }
        let normal = normal.normalized();
        let omegas: Vec<Vector3> = quadrature.directions().iter().map(|d| d.omega).collect();
        let reflected = omegas
            .iter()
            .enumerate()
            .map(|(angle, &omega)| {
                let mirror = omega - normal * (2.0 * omega.dot(normal));
                omegas
                    .iter()
                    .position(|&o| (o - mirror).norm() < TOLERANCE)
                    .ok_or_else(|| {
                        SweepError::InvalidConfiguration(format!(
                            "direction {angle} has no reflection about {normal:?}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            normal,
            reflected,
            psi_new: Mutex::new(HashMap::new()),
            psi_old: Mutex::new(HashMap::new()),
        })
    }

    pub fn normal(&self) -> Vector3 {
        self.normal
    }

    /// Index of the mirror image of direction `angle`.
    pub fn reflected_angle(&self, angle: usize) -> Option<usize> {
        self.reflected.get(angle).copied()
    }

    /// Forget both sweeps of stored flux.
    pub fn clear(&self) {
        self.psi_new.lock().clear();
        self.psi_old.lock().clear();
    }
}

impl SweepBoundary for ReflectingBoundary {
    fn incoming_psi(&self, face: &BoundaryFaceRef, angle: usize, out: &mut [f64]) {
        let old = self.psi_old.lock();
        for (g, v) in out.iter_mut().enumerate() {
            let key = (face.cell, face.face, face.dof, angle, face.group_start + g);
            *v = old.get(&key).copied().unwrap_or(0.0);
        }
    }

    fn store_outgoing(&self, face: &BoundaryFaceRef, angle: usize, psi: &[f64]) {
        let Some(target) = self.reflected_angle(angle) else {
            return;
        };
        let mut new = self.psi_new.lock();
        for (g, &v) in psi.iter().enumerate() {
            new.insert((face.cell, face.face, face.dof, target, face.group_start + g), v);
        }
    }

    fn finish_sweep(&self) {
        let new = self.psi_new.lock();
        let mut old = self.psi_old.lock();
        old.extend(new.iter().map(|(k, v)| (*k, *v)));
    }
}

/// Boundaries by boundary id; ids without an entry are vacuum.
#[derive(Clone, Default)]
pub struct BoundaryMap {
    boundaries: HashMap<u64, Arc<dyn SweepBoundary>>,
}

impl BoundaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, boundary: Arc<dyn SweepBoundary>) -> &mut Self {
        self.boundaries.insert(id, boundary);
        self
    }

    pub fn with(mut self, id: u64, boundary: Arc<dyn SweepBoundary>) -> Self {
        self.insert(id, boundary);
        self
    }

    pub fn get(&self, id: u64) -> &dyn SweepBoundary {
        static VACUUM: VacuumBoundary = VacuumBoundary;
        self.boundaries
            .get(&id)
            .map_or(&VACUUM as &dyn SweepBoundary, |b| b.as_ref())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.boundaries.contains_key(&id)
    }

    /// Notify every boundary that a sweep completed.
    pub fn finish_sweep(&self) {
        for boundary in self.boundaries.values() {
            boundary.finish_sweep();
        }
    }
}

impl std::fmt::Debug for BoundaryMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.boundaries.keys().collect();
        ids.sort();
        f.debug_struct("BoundaryMap").field("ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(group_start: usize) -> BoundaryFaceRef {
        BoundaryFaceRef {
            cell: 0,
            face: 0,
            dof: 0,
            group_start,
        }
    }

    #[test]
    fn missing_ids_are_vacuum() {
        let map = BoundaryMap::new().with(2, Arc::new(IsotropicBoundary::new(vec![1.0, 2.0, 3.0])));
        let mut out = [9.0; 2];
        map.get(7).incoming_psi(&face(0), 0, &mut out);
        assert_eq!(out, [0.0, 0.0]);
        map.get(2).incoming_psi(&face(1), 4, &mut out);
        assert_eq!(out, [2.0, 3.0]);
        map.get(2).incoming_psi(&face(2), 4, &mut out);
        assert_eq!(out, [3.0, 0.0]);
    }

    #[test]
    fn leakage_accumulates_per_angle_and_group() {
        let tally = Arc::new(LeakageTally::new());
        let map = BoundaryMap::new().with(0, tally.clone());
        map.get(0).store_outgoing(&face(2), 1, &[0.5, 0.25]);
        map.get(0).store_outgoing(&face(2), 1, &[0.5, 0.25]);
        assert_eq!(tally.get(1, 2), 1.0);
        assert_eq!(tally.get(1, 3), 0.5);
        assert_eq!(tally.get(0, 2), 0.0);
    }

    #[test]
    fn reflection_pairs_mirror_directions() {
        let q = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X, Vector3::Y]);
        let wall = ReflectingBoundary::new(Vector3::X, &q).unwrap();
        assert_eq!(wall.reflected_angle(0), Some(1));
        assert_eq!(wall.reflected_angle(1), Some(0));
        assert_eq!(wall.reflected_angle(2), Some(2));

        let lopsided = AngularQuadrature::from_omegas(&[Vector3::X, Vector3::Y]);
        assert!(matches!(
            ReflectingBoundary::new(Vector3::X, &lopsided),
            Err(SweepError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn reflected_flux_arrives_one_sweep_later() {
        let q = AngularQuadrature::from_omegas(&[Vector3::X, -Vector3::X]);
        let wall = ReflectingBoundary::new(Vector3::X, &q).unwrap();
        wall.store_outgoing(&face(1), 0, &[2.0, 3.0]);

        let mut out = [9.0; 2];
        wall.incoming_psi(&face(1), 1, &mut out);
        assert_eq!(out, [0.0, 0.0]);

        wall.finish_sweep();
        wall.incoming_psi(&face(1), 1, &mut out);
        assert_eq!(out, [2.0, 3.0]);
        wall.incoming_psi(&face(1), 0, &mut out);
        assert_eq!(out, [0.0, 0.0]);
        wall.incoming_psi(&face(2), 1, &mut out);
        assert_eq!(out, [3.0, 0.0]);
    }
}

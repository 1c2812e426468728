//! Upwind/downwind classification of faces for one direction.

use crate::topology::{Cell, Face, Vector3};

/// `|ω·n|` at or below this is treated as grazing.
pub const ORIENTATION_TOLERANCE: f64 = 1.0e-12;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FaceOrientation {
    /// ω·n < 0: flux enters the cell through this face.
    Incoming,
    /// ω·n > 0: flux leaves the cell through this face.
    Outgoing,
    /// Grazing incidence; carries no dependency.
    Parallel,
}

#[inline]
pub fn classify_face(omega: Vector3, face: &Face) -> FaceOrientation {
    let mu = omega.dot(face.normal);
    if mu > ORIENTATION_TOLERANCE {
        FaceOrientation::Outgoing
    } else if mu < -ORIENTATION_TOLERANCE {
        FaceOrientation::Incoming
    } else {
        FaceOrientation::Parallel
    }
}

pub fn classify_cell(omega: Vector3, cell: &Cell) -> Vec<FaceOrientation> {
    cell.faces.iter().map(|f| classify_face(omega, f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::FaceNeighbor;

    #[test]
    fn sign_of_mu_decides() {
        let b = FaceNeighbor::Boundary { id: 0 };
        let east = Face::new(Vector3::X, vec![0], b);
        let north = Face::new(Vector3::Y, vec![1], b);
        let omega = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(classify_face(omega, &east), FaceOrientation::Outgoing);
        assert_eq!(classify_face(-omega, &east), FaceOrientation::Incoming);
        assert_eq!(classify_face(omega, &north), FaceOrientation::Parallel);
    }
}

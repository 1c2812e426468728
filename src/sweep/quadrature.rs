//! Angular quadrature as seen by the sweep layer: a list of directions and,
//! for product sets, the polar/azimuthal structure aggregation policies need.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::sweep_error::SweepError;
use crate::topology::Vector3;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub omega: Vector3,
    pub weight: f64,
    /// Polar angle from +z, in `[0, π]`.
    pub polar: f64,
    /// Azimuthal angle from +x, in `[0, 2π)`.
    pub azimuthal: f64,
}

impl Direction {
    pub fn from_omega(omega: Vector3, weight: f64) -> Self {
        let omega = omega.normalized();
        let polar = omega.z.clamp(-1.0, 1.0).acos();
        let mut azimuthal = omega.y.atan2(omega.x);
        if azimuthal < 0.0 {
            azimuthal += 2.0 * PI;
        }
        Self {
            omega,
            weight,
            polar,
            azimuthal,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QuadratureKind {
    /// Tensor product; direction `a * polar.len() + p` pairs azimuth `a`
    /// with polar level `p`.
    Product { polar: Vec<f64>, azimuthal: Vec<f64> },
    Arbitrary,
}

#[derive(Clone, Debug)]
pub struct AngularQuadrature {
    directions: Vec<Direction>,
    kind: QuadratureKind,
}

impl AngularQuadrature {
    /// Unstructured set of unit directions with equal weights.
    pub fn from_omegas(omegas: &[Vector3]) -> Self {
        let w = if omegas.is_empty() { 0.0 } else { 1.0 / omegas.len() as f64 };
        Self {
            directions: omegas.iter().map(|&o| Direction::from_omega(o, w)).collect(),
            kind: QuadratureKind::Arbitrary,
        }
    }

    /// Product set from polar and azimuthal angles (radians).
    pub fn product(polar: &[f64], azimuthal: &[f64], weights: &[f64]) -> Result<Self, SweepError> {
        let n = polar.len() * azimuthal.len();
        if n == 0 {
            return Err(SweepError::InvalidConfiguration(
                "product quadrature needs polar and azimuthal angles".into(),
            ));
        }
        if weights.len() != n {
            return Err(SweepError::InvalidConfiguration(format!(
                "product quadrature with {n} directions got {} weights",
                weights.len()
            )));
        }
        let mut directions = Vec::with_capacity(n);
        for &phi in azimuthal {
            for &theta in polar {
                directions.push(Direction {
                    omega: Vector3::from_angles(theta, phi),
                    weight: weights[directions.len()],
                    polar: theta,
                    azimuthal: phi,
                });
            }
        }
        Ok(Self {
            directions,
            kind: QuadratureKind::Product {
                polar: polar.to_vec(),
                azimuthal: azimuthal.to_vec(),
            },
        })
    }

    /// Equal-weight product set: polar cosines at interval midpoints on
    /// `[-1, 1]`, azimuths at interval midpoints on `[0, 2π)`.
    pub fn product_uniform(n_polar: usize, n_azimuthal: usize) -> Result<Self, SweepError> {
        let polar: Vec<f64> = (0..n_polar)
            .map(|p| (1.0 - (2 * p + 1) as f64 / n_polar as f64).acos())
            .collect();
        let azimuthal: Vec<f64> = (0..n_azimuthal)
            .map(|a| (2 * a + 1) as f64 * PI / n_azimuthal as f64)
            .collect();
        let n = n_polar * n_azimuthal;
        let weights = vec![if n == 0 { 0.0 } else { 4.0 * PI / n as f64 }; n];
        Self::product(&polar, &azimuthal, &weights)
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn direction(&self, index: usize) -> &Direction {
        &self.directions[index]
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn kind(&self) -> &QuadratureKind {
        &self.kind
    }

    pub fn is_product(&self) -> bool {
        matches!(self.kind, QuadratureKind::Product { .. })
    }

    /// Direction index of polar level `p` at azimuth `a` (product sets only).
    pub fn angle_index(&self, p: usize, a: usize) -> Option<usize> {
        match &self.kind {
            QuadratureKind::Product { polar, azimuthal } if p < polar.len() && a < azimuthal.len() => {
                Some(a * polar.len() + p)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_numbering_is_azimuth_major() {
        let q = AngularQuadrature::product_uniform(2, 4).unwrap();
        assert_eq!(q.len(), 8);
        assert_eq!(q.angle_index(1, 2), Some(5));
        let d = q.direction(5);
        assert!(d.polar > PI / 2.0);
        assert!((d.omega.norm() - 1.0).abs() < 1e-12);
        assert_eq!(q.angle_index(2, 0), None);
    }

    #[test]
    fn omega_angles_recovered() {
        let d = Direction::from_omega(Vector3::new(0.0, -1.0, 0.0), 1.0);
        assert!((d.polar - PI / 2.0).abs() < 1e-12);
        assert!((d.azimuthal - 1.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn weight_count_checked() {
        assert!(AngularQuadrature::product(&[0.5], &[0.1, 0.2], &[1.0]).is_err());
        assert!(AngularQuadrature::product_uniform(0, 4).is_err());
    }
}

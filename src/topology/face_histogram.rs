//! Face-size histogram: groups faces with the same dof count into categories
//! so each local flux buffer has a single slot stride.

use std::collections::BTreeMap;

use super::grid::SweepGrid;
use crate::sweep_error::SweepError;

/// Index of a face category; categories are ordered by increasing face size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceCategory(usize);

impl FaceCategory {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceHistogram {
    sizes: Vec<usize>,
    counts: Vec<usize>,
}

impl FaceHistogram {
    /// Bin every local face by its dof count.
    pub fn from_grid<G: SweepGrid + ?Sized>(grid: &G) -> Self {
        Self::from_sizes(
            grid.local_cells()
                .iter()
                .flat_map(|c| c.faces.iter().map(|f| f.num_dofs())),
        )
    }

    pub fn from_sizes(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut bins: BTreeMap<usize, usize> = BTreeMap::new();
        for s in sizes {
            *bins.entry(s).or_default() += 1;
        }
        let (sizes, counts) = bins.into_iter().unzip();
        Self { sizes, counts }
    }

    pub fn num_categories(&self) -> usize {
        self.sizes.len()
    }

    pub fn categories(&self) -> impl Iterator<Item = FaceCategory> + '_ {
        (0..self.sizes.len()).map(FaceCategory)
    }

    /// Category holding faces with `num_dofs` dofs.
    pub fn category(&self, num_dofs: usize) -> Result<FaceCategory, SweepError> {
        self.sizes
            .binary_search(&num_dofs)
            .map(FaceCategory)
            .map_err(|_| SweepError::FaceCategoryNotFound { num_dofs })
    }

    /// Dofs per slot in `cat`.
    pub fn stride(&self, cat: FaceCategory) -> usize {
        self.sizes[cat.0]
    }

    /// Faces binned into `cat`.
    pub fn count(&self, cat: FaceCategory) -> usize {
        self.counts[cat.0]
    }

    pub fn largest_face(&self) -> usize {
        self.sizes.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_sorted_by_size() {
        let h = FaceHistogram::from_sizes([4, 3, 3, 4, 4, 6]);
        assert_eq!(h.num_categories(), 3);
        let c3 = h.category(3).unwrap();
        let c6 = h.category(6).unwrap();
        assert_eq!(c3.index(), 0);
        assert_eq!(c6.index(), 2);
        assert_eq!(h.stride(c6), 6);
        assert_eq!(h.count(h.category(4).unwrap()), 3);
        assert_eq!(h.largest_face(), 6);
    }

    #[test]
    fn unknown_size_is_an_error() {
        let h = FaceHistogram::from_sizes([2]);
        assert!(matches!(
            h.category(5),
            Err(SweepError::FaceCategoryNotFound { num_dofs: 5 })
        ));
    }
}

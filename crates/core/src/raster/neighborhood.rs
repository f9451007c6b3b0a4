//! Neighborhood kernels for focal operations

use crate::error::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Defines a neighborhood pattern around a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Neighborhood {
    /// 3x3 neighborhood (8 neighbors + center)
    Queen3x3,
    /// 3x3 without corners (4 neighbors + center)
    Rook3x3,
    /// Custom square neighborhood of given radius
    Square(usize),
}

impl Neighborhood {
    /// Get the radius of the neighborhood
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 | Neighborhood::Rook3x3 => 1,
            Neighborhood::Square(r) => *r,
        }
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Queen3x3 => dr.abs() <= 1 && dc.abs() <= 1,
            Neighborhood::Rook3x3 => (dr.abs() <= 1 && dc == 0) || (dr == 0 && dc.abs() <= 1),
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
        }
    }
}

/// Fixed-shape weight grid used for neighborhood convolution.
///
/// The grid is square with odd side `2 * radius + 1`; weight `(radius, radius)`
/// is the center cell.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodKernel {
    weights: Array2<f64>,
}

impl NeighborhoodKernel {
    /// Unit weights over `neighborhood`, with the center cell optionally zeroed
    pub fn unit(neighborhood: Neighborhood, include_center: bool) -> Self {
        let radius = neighborhood.radius();
        let size = radius * 2 + 1;
        let r = radius as isize;
        let weights = Array2::from_shape_fn((size, size), |(i, j)| {
            let dr = i as isize - r;
            let dc = j as isize - r;
            let center = dr == 0 && dc == 0;
            if neighborhood.contains(dr, dc) && (include_center || !center) {
                1.0
            } else {
                0.0
            }
        });
        Self { weights }
    }

    /// 3x3 square of ones
    pub fn square3(include_center: bool) -> Self {
        Self::unit(Neighborhood::Queen3x3, include_center)
    }

    /// Kernel from explicit weights; the grid must be square with odd side
    pub fn from_weights(weights: Array2<f64>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows != cols || rows % 2 == 0 {
            return Err(Error::InvalidParameter {
                name: "kernel",
                value: format!("{}x{}", rows, cols),
                reason: "kernel must be square with odd side".to_string(),
            });
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "kernel",
                value: "non-finite weight".to_string(),
                reason: "all kernel weights must be finite".to_string(),
            });
        }
        Ok(Self { weights })
    }

    /// Kernel radius
    pub fn radius(&self) -> usize {
        self.weights.nrows() / 2
    }

    /// (dr, dc, weight) for every non-zero weight
    pub fn taps(&self) -> Vec<(isize, isize, f64)> {
        let r = self.radius() as isize;
        self.weights
            .indexed_iter()
            .filter(|&(_, &w)| w != 0.0)
            .map(|((i, j), &w)| (i as isize - r, j as isize - r, w))
            .collect()
    }

    /// Underlying weight grid
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }
}

impl Default for NeighborhoodKernel {
    fn default() -> Self {
        Self::square3(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_kernel_taps() {
        assert_eq!(NeighborhoodKernel::square3(true).taps().len(), 9);
        let no_center = NeighborhoodKernel::square3(false);
        assert_eq!(no_center.taps().len(), 8);
        assert!(no_center.taps().iter().all(|&(dr, dc, _)| dr != 0 || dc != 0));
    }

    #[test]
    fn test_rook_kernel() {
        let k = NeighborhoodKernel::unit(Neighborhood::Rook3x3, false);
        assert_eq!(k.taps().len(), 4);
        assert_eq!(k.radius(), 1);
    }

    #[test]
    fn test_from_weights_validation() {
        assert!(NeighborhoodKernel::from_weights(Array2::ones((2, 2))).is_err());
        assert!(NeighborhoodKernel::from_weights(Array2::ones((3, 5))).is_err());
        let k = NeighborhoodKernel::from_weights(Array2::from_elem((5, 5), 0.5)).unwrap();
        assert_eq!(k.radius(), 2);
        assert_eq!(k.taps().len(), 25);
    }
}

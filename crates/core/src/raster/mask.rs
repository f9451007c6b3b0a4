//! Boolean validity masks

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use ndarray::{Array2, Zip};

/// Per-pixel validity grid; `true` marks a valid pixel.
///
/// A masked pixel is excluded from every reduction and from median
/// composition. Masks only ever combine by logical AND.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    /// Mask with every pixel valid
    pub fn all_valid(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), true),
        }
    }

    /// Mask with every pixel masked
    pub fn all_masked(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), false),
        }
    }

    /// Wrap an existing boolean grid
    pub fn from_array(data: Array2<bool>) -> Self {
        Self { data }
    }

    /// Build a mask from row-major data
    pub fn from_vec(data: Vec<bool>, rows: usize, cols: usize) -> Result<Self> {
        let data = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
            Error::InvalidDimensions {
                width: cols,
                height: rows,
            }
        })?;
        Ok(Self { data })
    }

    /// Valid where the raster holds a non-nodata value
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            data: raster.data().mapv(|v| !raster.is_nodata(v)),
        }
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Whether the pixel at (row, col) is valid; out-of-range pixels are not
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.data.get((row, col)).copied().unwrap_or(false)
    }

    /// Number of valid pixels
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Whether no pixel is valid
    pub fn is_fully_masked(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Logical AND with another mask of the same shape
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        if self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&other.data)
            .for_each(|a, &b| *a = *a && b);
        Ok(Mask { data })
    }

    /// Underlying boolean grid
    pub fn data(&self) -> &Array2<bool> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_is_intersection() {
        let a = Mask::from_vec(vec![true, true, false, false], 2, 2).unwrap();
        let b = Mask::from_vec(vec![true, false, true, false], 2, 2).unwrap();
        let c = a.and(&b).unwrap();
        assert!(c.is_valid(0, 0));
        assert!(!c.is_valid(0, 1));
        assert!(!c.is_valid(1, 0));
        assert!(!c.is_valid(1, 1));
        assert_eq!(c.count_valid(), 1);
    }

    #[test]
    fn test_and_shape_mismatch() {
        let a = Mask::all_valid(2, 2);
        let b = Mask::all_valid(3, 2);
        assert!(a.and(&b).is_err());
    }

    #[test]
    fn test_from_raster() {
        let mut r: Raster<f64> = Raster::filled(2, 2, 1.0);
        r.set(0, 1, f64::NAN).unwrap();
        let m = Mask::from_raster(&r);
        assert_eq!(m.count_valid(), 3);
        assert!(!m.is_valid(0, 1));
        assert!(!Mask::all_masked(2, 2).is_valid(0, 0));
        assert!(Mask::all_masked(2, 2).is_fully_masked());
    }
}

//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform and CRS).
///
/// # Type Parameters
///
/// - `T`: The cell value type, must implement [`RasterElement`]
///
/// # Example
///
/// ```ignore
/// use thermogis_core::Raster;
///
/// // 100x100 reflectance band filled with zeros
/// let mut band: Raster<f64> = Raster::new(100, 100);
/// band.set(10, 20, 0.27)?;
/// let value = band.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a zero-filled raster of another element type sharing this
    /// raster's georeferencing
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Build a raster of another element type from row-major data, sharing
    /// this raster's georeferencing and shape
    pub fn derive<U: RasterElement>(&self, data: Vec<U>, nodata: Option<U>) -> Result<Raster<U>> {
        let (rows, cols) = self.shape();
        let mut output = self.with_same_meta::<U>(rows, cols);
        output.data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        output.nodata = nodata;
        Ok(output)
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Whether the grid is in geographic (degree) coordinates
    pub fn is_geographic(&self) -> bool {
        self.crs.as_ref().is_some_and(CRS::is_geographic)
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Y coordinate of the grid centre (latitude for geographic grids)
    pub fn center_y(&self) -> f64 {
        let (_, min_y, _, max_y) = self.bounds();
        (min_y + max_y) / 2.0
    }

    /// Convert pixel coordinates to map coordinates (pixel centre)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Whether the cell at (row, col) holds a valid value
    pub fn is_valid_at(&self, row: usize, col: usize) -> bool {
        self.data
            .get((row, col))
            .is_some_and(|&v| !self.is_nodata(v))
    }

    /// Number of cells holding a valid value
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }
}

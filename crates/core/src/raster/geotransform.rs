//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG), metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Length of one degree of arc on the mean sphere, metres.
const METRES_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// Imagery delivered to the pipeline is north-up, so no rotation terms are
/// carried and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Convert pixel coordinates to map coordinates
    ///
    /// Returns the coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Convert map coordinates to fractional pixel coordinates (col, row)
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-15 || self.pixel_height.abs() < 1e-15 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Y coordinates of the top and bottom edges of a row
    pub fn row_edges(&self, row: usize) -> (f64, f64) {
        let top = self.origin_y + row as f64 * self.pixel_height;
        (top, top + self.pixel_height)
    }

    /// Get the cell size (assumes square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Ground area of one cell in square metres.
    ///
    /// For projected grids the cell area is constant. For geographic grids
    /// (degrees) the area of the spherical quadrilateral is used,
    /// `R² · Δλ · |sin φ_top − sin φ_bottom|`, which shrinks toward the poles.
    pub fn cell_area_m2(&self, row: usize, geographic: bool) -> f64 {
        if !geographic {
            return (self.pixel_width * self.pixel_height).abs();
        }
        let (top, bottom) = self.row_edges(row);
        let dlon = self.pixel_width.abs().to_radians();
        let band = (top.to_radians().sin() - bottom.to_radians().sin()).abs();
        EARTH_RADIUS_M * EARTH_RADIUS_M * dlon * band
    }

    /// Approximate ground resolution of a cell in metres.
    ///
    /// Geographic grids are converted at `reference_lat` (typically the grid's
    /// centre latitude).
    pub fn ground_resolution_m(&self, geographic: bool, reference_lat: f64) -> f64 {
        if geographic {
            self.cell_size() * METRES_PER_DEGREE * reference_lat.to_radians().cos().abs()
        } else {
            self.cell_size()
        }
    }

    /// Calculate the bounding box for a raster of given dimensions
    /// as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

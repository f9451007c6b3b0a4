//! Area-of-interest geometry

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Mask};
use geo::{Area, BoundingRect, Intersects};
use geo_types::{Coord, Line, LineString, Point, Polygon};

/// A named, closed polygon bounding the analysis region.
///
/// Vertices are (longitude, latitude) pairs, or (x, y) in the raster CRS for
/// projected grids. The ring is closed implicitly. The region is used both as
/// a spatial filter and as the aggregation zone: a pixel belongs to the region
/// when its centre lies inside or on the boundary of the polygon.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    polygon: Polygon<f64>,
}

impl Region {
    /// Build and validate a region.
    ///
    /// # Errors
    /// [`Error::InvalidGeometry`] when the ring has fewer than 3 distinct
    /// vertices, zero area, non-finite coordinates, or intersects itself.
    pub fn new(name: impl Into<String>, vertices: &[(f64, f64)]) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| Error::InvalidGeometry {
            region: name.clone(),
            reason,
        };

        if vertices.iter().any(|&(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(invalid("vertex coordinates must be finite".to_string()));
        }

        // Drop repeated consecutive vertices and an explicit closing vertex.
        let mut ring: Vec<(f64, f64)> = Vec::with_capacity(vertices.len());
        for &v in vertices {
            if ring.last() != Some(&v) {
                ring.push(v);
            }
        }
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        let mut distinct = ring.clone();
        distinct.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(invalid(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        if has_self_intersection(&ring) {
            return Err(invalid("polygon ring intersects itself".to_string()));
        }

        let exterior: LineString<f64> = ring.iter().map(|&(x, y)| Coord { x, y }).collect();
        let polygon = Polygon::new(exterior, vec![]);

        if polygon.unsigned_area() <= f64::EPSILON {
            return Err(invalid("polygon has zero area".to_string()));
        }

        Ok(Self { name, polygon })
    }

    /// Axis-aligned rectangle from west/south/east/north bounds
    pub fn rectangle(name: impl Into<String>, west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        Self::new(
            name,
            &[(west, north), (west, south), (east, south), (east, north)],
        )
    }

    /// Region name, used in artifact names and error context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying polygon
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Exterior ring vertices (closed: last equals first)
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        self.polygon.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    /// Whether a map coordinate lies inside or on the boundary
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.polygon.intersects(&Point::new(x, y))
    }

    /// Mask of the pixels whose centres fall inside the region
    pub fn coverage(&self, transform: &GeoTransform, rows: usize, cols: usize) -> Mask {
        let mut mask = Mask::all_masked(rows, cols);
        let Some(bbox) = self.polygon.bounding_rect() else {
            return mask;
        };

        // Restrict the scan to the pixel window of the bounding box.
        let (c0, r0) = transform.geo_to_pixel(bbox.min().x, bbox.max().y);
        let (c1, r1) = transform.geo_to_pixel(bbox.max().x, bbox.min().y);
        let (row_start, row_end) = pixel_window(r0, r1, rows);
        let (col_start, col_end) = pixel_window(c0, c1, cols);

        let data: Vec<bool> = (0..rows)
            .flat_map(|row| {
                (0..cols).map(move |col| (row, col))
            })
            .map(|(row, col)| {
                if row < row_start || row >= row_end || col < col_start || col >= col_end {
                    return false;
                }
                let (x, y) = transform.pixel_to_geo(col, row);
                self.contains_point(x, y)
            })
            .collect();

        if let Ok(m) = Mask::from_vec(data, rows, cols) {
            mask = m;
        }
        mask
    }
}

/// Clamp a fractional pixel span to `[0, len)` with one pixel of slack.
fn pixel_window(a: f64, b: f64, len: usize) -> (usize, usize) {
    if !a.is_finite() || !b.is_finite() {
        return (0, len);
    }
    let lo = a.min(b).floor() - 1.0;
    let hi = a.max(b).ceil() + 1.0;
    let lo = lo.max(0.0) as usize;
    let hi = (hi.max(0.0) as usize).min(len);
    (lo.min(len), hi)
}

/// O(n²) check of every pair of non-adjacent edges of an open ring.
fn has_self_intersection(ring: &[(f64, f64)]) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(ring[i], ring[(i + 1) % n]))
        .collect();
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent edges share a vertex by construction.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return true;
            }
        }
    }
    false
}

//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod image;
mod mask;
mod neighborhood;

pub use element::RasterElement;
pub use geotransform::{GeoTransform, EARTH_RADIUS_M};
pub use grid::Raster;
pub use image::RasterImage;
pub use mask::Mask;
pub use neighborhood::{Neighborhood, NeighborhoodKernel};

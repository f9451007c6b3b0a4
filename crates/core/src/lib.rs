//! # ThermoGIS Core
//!
//! Core types, traits and I/O for the ThermoGIS urban heat analysis library.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `RasterImage`: Named, pixel-aligned bands with an optional validity mask
//! - `Mask`: Boolean validity grid
//! - `Region`: Area-of-interest polygon used for filtering and aggregation
//! - `GeoTransform` / `CRS`: Georeferencing
//! - Algorithm trait for a consistent API
//! - GeoTIFF band I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Mask, Neighborhood, NeighborhoodKernel, Raster, RasterElement, RasterImage};
pub use vector::Region;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Mask, Raster, RasterElement, RasterImage};
    pub use crate::vector::Region;
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in ThermoGIS.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

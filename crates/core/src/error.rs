//! Error types for ThermoGIS

use thiserror::Error;

/// Main error type for ThermoGIS operations
///
/// Per-pixel numerical problems never surface here; they mask the pixel.
/// The region- and training-level variants abort the enclosing operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band not found: {0}")]
    MissingBand(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("No imagery available: {reason}")]
    NoImagery { reason: String },

    #[error("Empty region: no valid pixels of band '{band}' in region '{region}' ({pixels_in_region} pixels inside the region, all masked)")]
    EmptyRegion {
        region: String,
        band: String,
        pixels_in_region: usize,
    },

    #[error("Insufficient training data: {samples} samples with {distinct_classes} distinct classes (need at least {min_samples} samples and 2 classes)")]
    InsufficientTrainingData {
        samples: usize,
        distinct_classes: usize,
        min_samples: usize,
    },

    #[error("Invalid geometry for region '{region}': {reason}")]
    InvalidGeometry { region: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ThermoGIS operations
pub type Result<T> = std::result::Result<T, Error>;

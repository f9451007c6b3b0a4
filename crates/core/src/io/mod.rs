//! GeoTIFF band I/O
//!
//! Single-band GeoTIFFs are the exchange format for scene bands and for
//! exported analysis rasters. Values are widened to `f64` on read and
//! written back as 32-bit float.

mod geotiff;

pub use geotiff::{read_band, read_band_from_buffer, write_band, write_band_to_buffer};

//! Imagery preprocessing and heat index derivation
//!
//! - Band scaling: digital numbers to reflectance / Kelvin
//! - Cloud mask: QA-bit validity, intersected with existing masks
//! - Median composite over a time series
//! - Indices: NDVI, fractional vegetation, emissivity
//! - Thermal: land surface temperature, UHI, UTFVI and the full index chain

mod cloud_mask;
mod composite;
mod indices;
mod scaling;
mod thermal;

pub use cloud_mask::{apply_cloud_mask, cloud_mask, CloudMask, CloudMaskParams};
pub use composite::median_composite;
pub use indices::{
    emissivity, emissivity_from_urban, fractional_vegetation, ndvi, ndvi_extrema,
    normalized_difference, EMISSIVITY_BASE, EMISSIVITY_SLOPE,
};
pub use scaling::{scale_bands, BandScaler, ScalingParams};
pub use thermal::{
    land_surface_temperature, uhi_index, utfvi_index, IndexParams, IndexPipeline, IndexSet,
    EMITTED_WAVELENGTH_UM, KELVIN_OFFSET, RHO_UM_K,
};

use thermogis_core::raster::RasterImage;
use thermogis_core::Result;

/// Scale a raw scene and apply its QA cloud mask
pub fn prepare_scene(
    raw: &RasterImage,
    scaling: &ScalingParams,
    clouds: &CloudMaskParams,
) -> Result<RasterImage> {
    apply_cloud_mask(scale_bands(raw, scaling)?, clouds)
}

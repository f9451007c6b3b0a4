//! Vegetation indices and surface emissivity
//!
//! All indices operate on single-band rasters and write NaN wherever an
//! input is nodata or the formula is singular at that pixel.

use crate::pixelwise::{map_valid, zip_valid};
use crate::statistics::{zonal_accumulate, Reducer};
use thermogis_core::raster::Raster;
use thermogis_core::{Region, Result};

/// Emissivity of fully vegetated minus bare surface, scaled by FV
pub const EMISSIVITY_SLOPE: f64 = 0.004;
/// Emissivity of bare (urban) surface
pub const EMISSIVITY_BASE: f64 = 0.986;

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Pixels where the denominator vanishes, either input is nodata, or the
/// result leaves [-1, 1] (possible with negative reflectance) are set to NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    zip_valid(band_a, band_b, |a, b| {
        let sum = a + b;
        if sum.abs() < 1e-10 {
            return None;
        }
        let nd = (a - b) / sum;
        (-1.0..=1.0).contains(&nd).then_some(nd)
    })
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// # Arguments
/// * `nir` - Near-infrared band (Landsat 8/9: `SR_B5`)
/// * `red` - Red band (Landsat 8/9: `SR_B4`)
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Minimum and maximum NDVI over the region at the given nominal scale.
///
/// # Errors
/// [`thermogis_core::Error::EmptyRegion`] when no valid NDVI pixel lies in
/// the region.
pub fn ndvi_extrema(ndvi: &Raster<f64>, region: &Region, scale: f64) -> Result<(f64, f64)> {
    let acc = zonal_accumulate(ndvi, "NDVI", region, scale)?;
    Ok((acc.finish(Reducer::Min), acc.finish(Reducer::Max)))
}

/// Fractional vegetation cover
///
/// `FV = ((NDVI - min) / (max - min))²`
///
/// Lies in [0, 1] for NDVI within [min, max]. A degenerate range
/// (`max <= min`) masks every pixel.
pub fn fractional_vegetation(ndvi: &Raster<f64>, ndvi_min: f64, ndvi_max: f64) -> Result<Raster<f64>> {
    let range = ndvi_max - ndvi_min;
    let degenerate = !range.is_finite() || range <= f64::EPSILON;
    map_valid(ndvi, |v| {
        if degenerate {
            return None;
        }
        let scaled = (v - ndvi_min) / range;
        Some(scaled * scaled)
    })
}

/// Land surface emissivity from fractional vegetation
///
/// `EM = FV * 0.004 + 0.986`
pub fn emissivity(fv: &Raster<f64>) -> Result<Raster<f64>> {
    map_valid(fv, |f| Some(f * EMISSIVITY_SLOPE + EMISSIVITY_BASE))
}

/// Emissivity approximated from a binary urban state.
///
/// `EM = urban * 0.004 + 0.986`. Used for the reference-period LST that
/// seeds the cellular-automaton projection. Masked states give NaN.
pub fn emissivity_from_urban(urban: &Raster<u8>) -> Result<Raster<f64>> {
    let template = urban.with_same_meta::<f64>(urban.rows(), urban.cols());
    zip_valid(&template, urban, |_, u| {
        Some(f64::from(u) * EMISSIVITY_SLOPE + EMISSIVITY_BASE)
    })
}

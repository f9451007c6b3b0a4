//! Area-weighted share of a region exceeding a threshold

use super::zonal::sample_mask;
use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use thermogis_core::raster::Raster;
use thermogis_core::{Error, Region, Result};
use tracing::debug;

/// UTFVI above which a pixel is considered thermally critical
pub const DEFAULT_UTFVI_THRESHOLD: f64 = 0.05;

/// Outcome of [`critical_area`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalAreaResult {
    pub threshold: f64,
    /// Area of valid in-region pixels above the threshold, m²
    pub critical_area_m2: f64,
    /// Area of all valid in-region pixels, m²
    pub total_area_m2: f64,
    /// `100 * critical / total`, in [0, 100]
    pub percentage: f64,
    pub critical_pixels: usize,
    pub valid_pixels: usize,
}

/// Ground area of every cell in square metres.
///
/// Constant for projected grids; varies with latitude for geographic grids.
pub fn pixel_area(band: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = band.shape();
    let geographic = band.is_geographic();
    let transform = *band.transform();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| vec![transform.cell_area_m2(row, geographic); cols])
        .collect();
    crate::pixelwise::build_output(band, data)
}

/// Share of the region's valid area where `band > threshold`.
///
/// Critical and total area are summed over the same pixels: inside the
/// region (at the sampling scale) and valid in `band`.
///
/// # Errors
/// [`Error::EmptyRegion`] when no valid pixel lies in the region.
pub fn critical_area(
    band: &Raster<f64>,
    band_name: &str,
    region: &Region,
    scale: f64,
    threshold: f64,
) -> Result<CriticalAreaResult> {
    let inside = sample_mask(band, region, scale)?;
    let areas = pixel_area(band)?;
    let (rows, cols) = band.shape();

    let (critical_area_m2, total_area_m2, critical_pixels, valid_pixels) = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut acc = (0.0, 0.0, 0usize, 0usize);
            for col in 0..cols {
                let v = unsafe { band.get_unchecked(row, col) };
                if !inside.is_valid(row, col) || band.is_nodata(v) {
                    continue;
                }
                let a = unsafe { areas.get_unchecked(row, col) };
                acc.1 += a;
                acc.3 += 1;
                if v > threshold {
                    acc.0 += a;
                    acc.2 += 1;
                }
            }
            acc
        })
        .collect::<Vec<_>>()
        .into_iter()
        .fold((0.0, 0.0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2, a.3 + b.3));

    if valid_pixels == 0 || total_area_m2 <= 0.0 {
        return Err(Error::EmptyRegion {
            region: region.name().to_string(),
            band: band_name.to_string(),
            pixels_in_region: inside.count_valid(),
        });
    }

    let percentage = (100.0 * critical_area_m2 / total_area_m2).clamp(0.0, 100.0);
    debug!(
        band = band_name,
        threshold, critical_pixels, valid_pixels, percentage, "critical area"
    );

    Ok(CriticalAreaResult {
        threshold,
        critical_area_m2,
        total_area_m2,
        percentage,
        critical_pixels,
        valid_pixels,
    })
}

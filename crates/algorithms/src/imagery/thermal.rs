//! Land surface temperature and heat indices

use super::indices::{emissivity, fractional_vegetation, ndvi, ndvi_extrema};
use crate::pixelwise::{map_valid, zip_valid};
use crate::statistics::zonal_accumulate;
use serde::{Deserialize, Serialize};
use thermogis_core::raster::{Raster, RasterImage};
use thermogis_core::{Error, Region, Result};
use tracing::{debug, info, instrument};

/// Effective wavelength of emitted radiance (µm), Landsat 8 band 10
pub const EMITTED_WAVELENGTH_UM: f64 = 11.5;
/// h·c/σ (µm·K)
pub const RHO_UM_K: f64 = 14380.0;
/// Kelvin to Celsius offset
pub const KELVIN_OFFSET: f64 = 273.15;

/// Land surface temperature (°C) from brightness temperature and emissivity
///
/// `LST = tb / (1 + (λ · tb / ρ) · ln(em)) − 273.15`, λ = 11.5 µm, ρ = 14380 µm·K
///
/// Pixels with `tb <= 0`, `em <= 0`, or a non-positive denominator are
/// masked.
///
/// # Arguments
/// * `tb` - Brightness temperature in Kelvin (Landsat 8/9: scaled `ST_B10`)
/// * `em` - Surface emissivity
pub fn land_surface_temperature(tb: &Raster<f64>, em: &Raster<f64>) -> Result<Raster<f64>> {
    zip_valid(tb, em, |t, e| lst_kernel(t, e))
}

pub(crate) fn lst_kernel(tb: f64, em: f64) -> Option<f64> {
    if tb <= 0.0 || em <= 0.0 {
        return None;
    }
    let denom = 1.0 + (EMITTED_WAVELENGTH_UM * tb / RHO_UM_K) * em.ln();
    if denom <= 0.0 {
        return None;
    }
    Some(tb / denom - KELVIN_OFFSET)
}

/// Urban heat island index, a z-score of LST
///
/// `UHI = (LST − mean) / std`. A vanishing `std` masks every pixel.
pub fn uhi_index(lst: &Raster<f64>, mean: f64, std_dev: f64) -> Result<Raster<f64>> {
    let degenerate = !std_dev.is_finite() || std_dev.abs() < 1e-12;
    map_valid(lst, |t| (!degenerate).then(|| (t - mean) / std_dev))
}

/// Urban thermal field variance index
///
/// `UTFVI = (LST − mean) / LST`. Pixels with `|LST| < epsilon` are masked.
pub fn utfvi_index(lst: &Raster<f64>, mean: f64, epsilon: f64) -> Result<Raster<f64>> {
    map_valid(lst, |t| (t.abs() >= epsilon).then(|| (t - mean) / t))
}

/// Band names and tolerances for [`IndexPipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Near-infrared band
    pub nir_band: String,
    /// Red band
    pub red_band: String,
    /// Thermal band in Kelvin
    pub thermal_band: String,
    /// UTFVI is masked where |LST| is below this (°C)
    pub utfvi_epsilon: f64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            nir_band: "SR_B5".to_string(),
            red_band: "SR_B4".to_string(),
            thermal_band: "ST_B10".to_string(),
            utfvi_epsilon: 1e-3,
        }
    }
}

/// Every raster and region statistic produced by one [`IndexPipeline`] run
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub ndvi: Raster<f64>,
    pub ndvi_min: f64,
    pub ndvi_max: f64,
    pub fv: Raster<f64>,
    pub em: Raster<f64>,
    /// Land surface temperature, °C
    pub lst: Raster<f64>,
    pub lst_mean: f64,
    pub lst_std: f64,
    pub uhi: Raster<f64>,
    pub utfvi: Raster<f64>,
}

impl IndexSet {
    /// Bundle NDVI, EM and LST as a classifier input image
    pub fn predictor_image(&self) -> Result<RasterImage> {
        RasterImage::from_bands([
            ("NDVI", self.ndvi.clone()),
            ("EM", self.em.clone()),
            ("LST", self.lst.clone()),
        ])
    }
}

/// NDVI → FV → EM → LST → UHI/UTFVI over a composite
#[derive(Debug, Clone, Default)]
pub struct IndexPipeline {
    params: IndexParams,
}

impl IndexPipeline {
    pub fn new(params: IndexParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Run the full index chain over `composite`, normalizing against
    /// statistics of `region` at nominal `scale` (metres).
    ///
    /// # Errors
    /// - [`Error::MissingBand`] if a configured band is absent
    /// - [`Error::EmptyRegion`] if NDVI or LST has no valid pixel in the region
    #[instrument(skip_all, fields(region = region.name(), scale = scale))]
    pub fn run(&self, composite: &RasterImage, region: &Region, scale: f64) -> Result<IndexSet> {
        let p = &self.params;
        if p.utfvi_epsilon.is_nan() || p.utfvi_epsilon < 0.0 {
            return Err(Error::InvalidParameter {
                name: "utfvi_epsilon",
                value: p.utfvi_epsilon.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }

        let nir = composite.masked_band(&p.nir_band)?;
        let red = composite.masked_band(&p.red_band)?;
        let tb = composite.masked_band(&p.thermal_band)?;

        let ndvi = ndvi(&nir, &red)?;
        let (ndvi_min, ndvi_max) = ndvi_extrema(&ndvi, region, scale)?;
        debug!(ndvi_min, ndvi_max, "NDVI extrema");

        let fv = fractional_vegetation(&ndvi, ndvi_min, ndvi_max)?;
        let em = emissivity(&fv)?;
        let lst = land_surface_temperature(&tb, &em)?;

        let stats = zonal_accumulate(&lst, "LST", region, scale)?;
        let lst_mean = stats.mean();
        let lst_std = stats.std_dev();
        info!(lst_mean, lst_std, pixels = stats.count(), "LST statistics");

        let uhi = uhi_index(&lst, lst_mean, lst_std)?;
        let utfvi = utfvi_index(&lst, lst_mean, p.utfvi_epsilon)?;

        Ok(IndexSet {
            ndvi,
            ndvi_min,
            ndvi_max,
            fv,
            em,
            lst,
            lst_mean,
            lst_std,
            uhi,
            utfvi,
        })
    }
}

//! Digital-number to physical-unit scaling

use crate::pixelwise::map_valid;
use serde::{Deserialize, Serialize};
use thermogis_core::raster::RasterImage;
use thermogis_core::{Algorithm, Error, Result};
use tracing::debug;

/// Band scaling algorithm
#[derive(Debug, Clone, Default)]
pub struct BandScaler;

/// Gain/bias pairs applied by [`scale_bands`].
///
/// Defaults are the Landsat 8/9 Collection 2 Level-2 factors: surface
/// reflectance `dn * 0.0000275 - 0.2`, surface temperature (Kelvin)
/// `dn * 0.00341802 + 149.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingParams {
    /// Name prefix of optical (reflectance) bands
    pub optical_prefix: String,
    pub optical_gain: f64,
    pub optical_bias: f64,
    /// Name prefix of thermal bands
    pub thermal_prefix: String,
    pub thermal_gain: f64,
    pub thermal_bias: f64,
}

impl Default for ScalingParams {
    fn default() -> Self {
        Self {
            optical_prefix: "SR_B".to_string(),
            optical_gain: 0.0000275,
            optical_bias: -0.2,
            thermal_prefix: "ST_B".to_string(),
            thermal_gain: 0.00341802,
            thermal_bias: 149.0,
        }
    }
}

impl ScalingParams {
    /// Gain and bias for a band, or `None` if the band is not scaled
    pub fn factors_for(&self, band: &str) -> Option<(f64, f64)> {
        if band.starts_with(&self.optical_prefix) {
            Some((self.optical_gain, self.optical_bias))
        } else if band.starts_with(&self.thermal_prefix) {
            Some((self.thermal_gain, self.thermal_bias))
        } else {
            None
        }
    }
}

impl Algorithm for BandScaler {
    type Input = RasterImage;
    type Output = RasterImage;
    type Params = ScalingParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BandScaler"
    }

    fn description(&self) -> &'static str {
        "Convert optical bands to reflectance and thermal bands to Kelvin"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        scale_bands(&input, &params)
    }
}

/// Scale optical and thermal bands to physical units.
///
/// Bands matching neither prefix (e.g. `QA_PIXEL`) are copied unchanged, and
/// the image mask is carried over. Reflectance may exceed 1 near saturation;
/// no clamping is applied.
pub fn scale_bands(image: &RasterImage, params: &ScalingParams) -> Result<RasterImage> {
    let mut scaled = RasterImage::new();
    for (name, band) in image.bands() {
        let band = match params.factors_for(name) {
            Some((gain, bias)) => {
                debug!(band = name, gain, bias, "scaling band");
                map_valid(band, |dn| Some(dn * gain + bias))?
            }
            None => band.clone(),
        };
        scaled = scaled.with_band(name, band)?;
    }
    match image.mask() {
        Some(mask) => scaled.with_mask(mask.clone()),
        None => Ok(scaled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use thermogis_core::raster::{Mask, Raster};

    fn raw_scene() -> RasterImage {
        RasterImage::from_bands([
            ("SR_B4", Raster::filled(2, 2, 10_000.0)),
            ("ST_B10", Raster::filled(2, 2, 44_000.0)),
            ("QA_PIXEL", Raster::filled(2, 2, 21_824.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_optical_and_thermal_factors() {
        let scaled = scale_bands(&raw_scene(), &ScalingParams::default()).unwrap();
        assert_relative_eq!(scaled.band("SR_B4").unwrap().get(0, 0).unwrap(), 0.075, epsilon = 1e-12);
        assert_relative_eq!(
            scaled.band("ST_B10").unwrap().get(1, 1).unwrap(),
            44_000.0 * 0.00341802 + 149.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_qa_band_untouched_and_order_kept() {
        let scaled = BandScaler.execute_default(raw_scene()).unwrap();
        assert_eq!(scaled.band("QA_PIXEL").unwrap().get(0, 1).unwrap(), 21_824.0);
        assert_eq!(scaled.band_names(), vec!["SR_B4", "ST_B10", "QA_PIXEL"]);
    }

    #[test]
    fn test_mask_carried_over() {
        let image = raw_scene()
            .with_mask(Mask::from_vec(vec![true, false, true, true], 2, 2).unwrap())
            .unwrap();
        let scaled = scale_bands(&image, &ScalingParams::default()).unwrap();
        assert!(!scaled.is_unmasked(0, 1));
        assert!(scaled.is_unmasked(1, 1));
    }
}

//! QA-bit cloud and shadow masking

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use thermogis_core::raster::{Mask, RasterImage};
use thermogis_core::{Algorithm, Error, Result};
use tracing::debug;

/// Cloud masking algorithm
#[derive(Debug, Clone, Default)]
pub struct CloudMask;

/// QA band layout used by [`cloud_mask`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Name of the bit-packed quality band
    pub qa_band: String,
    /// Bit flagging cloud shadow (Landsat C2: 3)
    pub shadow_bit: u8,
    /// Bit flagging cloud (Landsat C2: 5)
    pub cloud_bit: u8,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            qa_band: "QA_PIXEL".to_string(),
            shadow_bit: 3,
            cloud_bit: 5,
        }
    }
}

impl CloudMaskParams {
    fn rejected_bits(&self) -> Result<u64> {
        let bit = |b: u8, name: &'static str| {
            if b < 64 {
                Ok(1u64 << b)
            } else {
                Err(Error::InvalidParameter {
                    name,
                    value: b.to_string(),
                    reason: "QA bit position must be below 64".to_string(),
                })
            }
        };
        Ok(bit(self.shadow_bit, "shadow_bit")? | bit(self.cloud_bit, "cloud_bit")?)
    }
}

impl Algorithm for CloudMask {
    type Input = RasterImage;
    type Output = RasterImage;
    type Params = CloudMaskParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "CloudMask"
    }

    fn description(&self) -> &'static str {
        "Mask pixels flagged as cloud or cloud shadow in the QA band"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        apply_cloud_mask(input, &params)
    }
}

/// Validity mask from the QA band.
///
/// A pixel is valid only when both the cloud and the shadow bits are unset.
/// NaN or negative QA values are invalid.
pub fn cloud_mask(image: &RasterImage, params: &CloudMaskParams) -> Result<Mask> {
    let qa = image.band(&params.qa_band)?;
    let rejected = params.rejected_bits()?;
    let (rows, cols) = qa.shape();

    let data: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![false; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { qa.get_unchecked(row, col) };
                if !v.is_finite() || v < 0.0 {
                    continue;
                }
                *out = (v as u64) & rejected == 0;
            }
            row_data
        })
        .collect();

    let mask = Mask::from_vec(data, rows, cols)?;
    debug!(valid = mask.count_valid(), total = rows * cols, "cloud mask");
    Ok(mask)
}

/// Intersect the image mask with the QA cloud mask
pub fn apply_cloud_mask(image: RasterImage, params: &CloudMaskParams) -> Result<RasterImage> {
    let mask = cloud_mask(&image, params)?;
    image.with_mask(mask)
}

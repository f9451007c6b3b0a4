//! Per-pixel median compositing of a scene time series

use crate::maybe_rayon::*;
use ndarray::Array2;
use thermogis_core::raster::{Mask, RasterImage};
use thermogis_core::{Error, Result};
use tracing::{debug, info};

/// Median of the finite values in `values`; the two middle values are
/// averaged for even counts.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn validate_series(images: &[RasterImage]) -> Result<()> {
    let Some(first) = images.first() else {
        return Err(Error::NoImagery {
            reason: "empty image sequence".to_string(),
        });
    };
    let (rows, cols) = first.shape();
    for image in &images[1..] {
        if image.shape() != (rows, cols) {
            let (ar, ac) = image.shape();
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar,
                ac,
            });
        }
        for name in first.band_names() {
            if !image.has_band(name) {
                return Err(Error::MissingBand(name.to_string()));
            }
        }
    }
    Ok(())
}

/// Build a single median image from a time series of masked scenes.
///
/// For every band of the first image, each output pixel is the median over
/// the images in which that pixel is unmasked and finite. A pixel that is
/// masked in every image stays masked in the composite.
///
/// # Errors
/// - [`Error::NoImagery`] if `images` is empty or every pixel is masked in
///   every image
/// - [`Error::SizeMismatch`] / [`Error::MissingBand`] if the scenes are not
///   aligned with the first one
pub fn median_composite(images: &[RasterImage]) -> Result<RasterImage> {
    validate_series(images)?;
    let first = &images[0];
    let (rows, cols) = first.shape();

    let valid: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| images.iter().any(|img| img.is_unmasked(row, col)))
                .collect::<Vec<_>>()
        })
        .collect();
    let mask = Mask::from_vec(valid, rows, cols)?;
    if mask.is_fully_masked() {
        return Err(Error::NoImagery {
            reason: format!("all pixels masked in all {} images", images.len()),
        });
    }

    info!(images = images.len(), rows, cols, "building median composite");

    let mut composite = RasterImage::new();
    for (name, template) in first.bands() {
        let series = images
            .iter()
            .map(|img| img.band(name))
            .collect::<Result<Vec<_>>>()?;

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut buffer = Vec::with_capacity(series.len());
                let mut row_data = vec![f64::NAN; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    buffer.clear();
                    for (img, band) in images.iter().zip(&series) {
                        if !img.is_unmasked(row, col) {
                            continue;
                        }
                        let v = unsafe { band.get_unchecked(row, col) };
                        if !band.is_nodata(v) {
                            buffer.push(v);
                        }
                    }
                    if let Some(m) = median(&mut buffer) {
                        *out = m;
                    }
                }
                row_data
            })
            .collect();

        let mut band = template.with_same_meta::<f64>(rows, cols);
        band.set_nodata(Some(f64::NAN));
        *band.data_mut() = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        composite = composite.with_band(name, band)?;
    }

    debug!(valid_pixels = mask.count_valid(), "composite mask");
    composite.with_mask(mask)
}

//! Row-parallel per-pixel kernels shared by the index and projection passes.
//!
//! Every kernel writes NaN where an input is nodata or where the pixel
//! function declines to produce a value, so singular pixels end up masked.

use crate::maybe_rayon::*;
use ndarray::Array2;
use thermogis_core::raster::{Raster, RasterElement};
use thermogis_core::{Error, Result};

pub(crate) fn check_dimensions<A: RasterElement, B: RasterElement>(
    a: &Raster<A>,
    b: &Raster<B>,
) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}

/// Wrap row-major `data` in a NaN-nodata raster sharing `template`'s georeferencing
pub(crate) fn build_output<T: RasterElement>(template: &Raster<T>, data: Vec<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Apply `f` to every valid pixel of `band`
pub(crate) fn map_valid<F>(band: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> Option<f64> + Sync + Send,
{
    let (rows, cols) = band.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { band.get_unchecked(row, col) };
                if band.is_nodata(v) {
                    continue;
                }
                if let Some(result) = f(v).filter(|r| r.is_finite()) {
                    *out = result;
                }
            }
            row_data
        })
        .collect();
    build_output(band, data)
}

/// Apply `f` to every pixel where both `a` and `b` are valid
pub(crate) fn zip_valid<B, F>(a: &Raster<f64>, b: &Raster<B>, f: F) -> Result<Raster<f64>>
where
    B: RasterElement,
    F: Fn(f64, B) -> Option<f64> + Sync + Send,
{
    check_dimensions(a, b)?;
    let (rows, cols) = a.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if a.is_nodata(va) || b.is_nodata(vb) {
                    continue;
                }
                if let Some(result) = f(va, vb).filter(|r| r.is_finite()) {
                    *out = result;
                }
            }
            row_data
        })
        .collect();
    build_output(a, data)
}

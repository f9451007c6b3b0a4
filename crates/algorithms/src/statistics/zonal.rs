//! Zonal statistics over an area-of-interest polygon
//!
//! Every reducer is served by one mergeable accumulator, so a band is reduced
//! tile by tile and the partial results combined.

use serde::{Deserialize, Serialize};
use std::fmt;
use thermogis_core::raster::{Mask, Raster, RasterImage};
use thermogis_core::{Error, Region, Result};
use thermogis_parallel::TiledProcessor;
use tracing::debug;

/// Available zonal reducers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    Mean,
    /// Population standard deviation
    StdDev,
    Min,
    Max,
    Sum,
}

impl Reducer {
    pub const ALL: [Reducer; 5] = [
        Reducer::Mean,
        Reducer::StdDev,
        Reducer::Min,
        Reducer::Max,
        Reducer::Sum,
    ];
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Mean => "mean",
            Reducer::StdDev => "stdDev",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// Partial aggregate of a band over part of a region.
///
/// `identity()` is the empty aggregate and `merge` is associative and
/// commutative (up to floating-point rounding). Mean and M2 are merged with
/// the pairwise update of Chan et al.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalAccumulator {
    count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for ZonalAccumulator {
    fn default() -> Self {
        Self::identity()
    }
}

impl ZonalAccumulator {
    /// The empty aggregate
    pub fn identity() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add one value (Welford update)
    pub fn push(mut self, value: f64) -> Self {
        self.count += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self
    }

    /// Combine two partial aggregates
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let count = self.count + other.count;
        let n = count as f64;
        let delta = other.mean - self.mean;
        Self {
            count,
            sum: self.sum + other.sum,
            mean: self.mean + delta * n_b / n,
            m2: self.m2 + other.m2 + delta * delta * n_a * n_b / n,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Number of values aggregated
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }

    /// Final value of `reducer`; NaN for an empty aggregate
    pub fn finish(&self, reducer: Reducer) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        match reducer {
            Reducer::Mean => self.mean(),
            Reducer::StdDev => self.std_dev(),
            Reducer::Min => self.min,
            Reducer::Max => self.max,
            Reducer::Sum => self.sum,
        }
    }
}

/// Pixel stride that approximates a nominal `scale` (metres) on this grid.
///
/// The native resolution of geographic grids is measured at the grid's
/// centre latitude. A scale at or below the native resolution gives 1.
pub fn sampling_stride(band: &Raster<f64>, scale: f64) -> Result<usize> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: "nominal scale must be a positive number of metres".to_string(),
        });
    }
    let native = band
        .transform()
        .ground_resolution_m(band.is_geographic(), band.center_y());
    if !native.is_finite() || native <= 0.0 {
        return Ok(1);
    }
    Ok(((scale / native).round() as usize).max(1))
}

/// Region coverage thinned to the sampling grid for `scale`
pub(crate) fn sample_mask(band: &Raster<f64>, region: &Region, scale: f64) -> Result<Mask> {
    let (rows, cols) = band.shape();
    let stride = sampling_stride(band, scale)?;
    let coverage = region.coverage(band.transform(), rows, cols);
    if stride == 1 {
        return Ok(coverage);
    }
    let grid = Mask::from_array(ndarray::Array2::from_shape_fn((rows, cols), |(r, c)| {
        r % stride == 0 && c % stride == 0
    }));
    coverage.and(&grid)
}

/// Aggregate every valid pixel of `band` inside `region`.
///
/// # Errors
/// [`Error::EmptyRegion`] when no valid pixel falls inside the region. The
/// error carries the region name, `band_name`, and how many (masked) pixels
/// the region covered.
pub fn zonal_accumulate(
    band: &Raster<f64>,
    band_name: &str,
    region: &Region,
    scale: f64,
) -> Result<ZonalAccumulator> {
    let inside = sample_mask(band, region, scale)?;
    let (rows, cols) = band.shape();
    let data = band.data();

    let acc = TiledProcessor::default().reduce(
        rows,
        cols,
        ZonalAccumulator::identity,
        |acc, row, col| {
            let v = data[[row, col]];
            if inside.is_valid(row, col) && !band.is_nodata(v) {
                acc.push(v)
            } else {
                acc
            }
        },
        ZonalAccumulator::merge,
    );

    debug!(
        region = region.name(),
        band = band_name,
        count = acc.count(),
        "zonal reduction"
    );

    if acc.is_empty() {
        return Err(Error::EmptyRegion {
            region: region.name().to_string(),
            band: band_name.to_string(),
            pixels_in_region: inside.count_valid(),
        });
    }
    Ok(acc)
}

/// Reduce one band over a region to a scalar
pub fn zonal_statistic(
    band: &Raster<f64>,
    band_name: &str,
    region: &Region,
    scale: f64,
    reducer: Reducer,
) -> Result<f64> {
    Ok(zonal_accumulate(band, band_name, region, scale)?.finish(reducer))
}

/// Reduce every band of an image over a region, honouring the image mask.
///
/// Returns one (band name, value) pair per band, in band order.
pub fn zonal_statistics_image(
    image: &RasterImage,
    region: &Region,
    scale: f64,
    reducer: Reducer,
) -> Result<Vec<(String, f64)>> {
    image
        .band_names()
        .into_iter()
        .map(|name| {
            let band = image.masked_band(name)?;
            let value = zonal_statistic(&band, name, region, scale, reducer)?;
            Ok((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use thermogis_core::{GeoTransform, CRS};

    fn band(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 30.0, 30.0, -30.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn whole(rows: usize, cols: usize) -> Region {
        Region::rectangle("aoi", 0.0, 0.0, cols as f64 * 30.0, rows as f64 * 30.0).unwrap()
    }

    #[test]
    fn test_all_reducers() {
        let b = band(vec![1.0, 2.0, 3.0, 4.0, f64::NAN, 6.0], 2, 3);
        let r = whole(2, 3);
        let get = |red| zonal_statistic(&b, "B", &r, 30.0, red).unwrap();
        assert_relative_eq!(get(Reducer::Mean), 3.2);
        assert_relative_eq!(get(Reducer::Sum), 16.0);
        assert_relative_eq!(get(Reducer::Min), 1.0);
        assert_relative_eq!(get(Reducer::Max), 6.0);
        // population variance of [1,2,3,4,6] is 2.96
        assert_relative_eq!(get(Reducer::StdDev), 2.96f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let values: Vec<f64> = (0..97).map(|i| ((i * 37) % 101) as f64 * 0.25 - 3.0).collect();
        let whole = values
            .iter()
            .fold(ZonalAccumulator::identity(), |a, &v| a.push(v));
        let (left, right) = values.split_at(40);
        let a = left.iter().fold(ZonalAccumulator::identity(), |a, &v| a.push(v));
        let b = right.iter().fold(ZonalAccumulator::identity(), |a, &v| a.push(v));

        for merged in [a.merge(b), b.merge(a)] {
            assert_eq!(merged.count(), whole.count());
            for reducer in Reducer::ALL {
                assert_relative_eq!(
                    merged.finish(reducer),
                    whole.finish(reducer),
                    epsilon = 1e-9
                );
            }
        }
        assert_eq!(ZonalAccumulator::identity().merge(a), a);
    }

    #[test]
    fn test_region_restricts_pixels() {
        let b = band(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        // left column only
        let left = Region::rectangle("left", 0.0, 0.0, 30.0, 60.0).unwrap();
        assert_relative_eq!(
            zonal_statistic(&b, "B", &left, 30.0, Reducer::Sum).unwrap(),
            4.0
        );
    }

    #[test]
    fn test_fully_masked_region_is_empty_region() {
        let b = band(vec![f64::NAN; 6], 2, 3);
        let err = zonal_statistic(&b, "LST", &whole(2, 3), 30.0, Reducer::Mean).unwrap_err();
        match err {
            Error::EmptyRegion {
                region,
                band,
                pixels_in_region,
            } => {
                assert_eq!(region, "aoi");
                assert_eq!(band, "LST");
                assert_eq!(pixels_in_region, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scale_sets_stride() {
        let b = band((0..16).map(f64::from).collect(), 4, 4);
        assert_eq!(sampling_stride(&b, 30.0).unwrap(), 1);
        assert_eq!(sampling_stride(&b, 60.0).unwrap(), 2);
        assert!(sampling_stride(&b, 0.0).is_err());
        // rows/cols 0 and 2 only: values 0, 2, 8, 10
        assert_relative_eq!(
            zonal_statistic(&b, "B", &whole(4, 4), 60.0, Reducer::Sum).unwrap(),
            20.0
        );
    }

    #[test]
    fn test_geographic_stride_uses_centre_latitude() {
        // ~0.00027° ≈ 30 m at the equator, ~15 m at 60°
        let mut b = Raster::filled(10, 10, 1.0);
        b.set_transform(GeoTransform::new(0.0, 60.0014, 0.00027, -0.00027));
        b.set_crs(Some(CRS::wgs84()));
        assert_eq!(sampling_stride(&b, 30.0).unwrap(), 2);
    }

    #[test]
    fn test_image_statistics_honour_mask() {
        let image = RasterImage::from_bands([
            ("A", band(vec![1.0, 3.0], 1, 2)),
            ("B", band(vec![10.0, 20.0], 1, 2)),
        ])
        .unwrap()
        .with_mask(Mask::from_vec(vec![true, false], 1, 2).unwrap())
        .unwrap();
        let stats = zonal_statistics_image(&image, &whole(1, 2), 30.0, Reducer::Mean).unwrap();
        assert_eq!(stats, vec![("A".to_string(), 1.0), ("B".to_string(), 10.0)]);
    }
}

//! Region statistics for derived rasters
//!
//! - **zonal**: mean / stdDev / min / max / sum over a region, reduced tile by tile
//! - **critical_area**: area-weighted share of a region above a threshold

mod critical_area;
mod zonal;

pub use critical_area::{critical_area, pixel_area, CriticalAreaResult, DEFAULT_UTFVI_THRESHOLD};
pub use zonal::{
    sampling_stride, zonal_accumulate, zonal_statistic, zonal_statistics_image, Reducer,
    ZonalAccumulator,
};
pub(crate) use zonal::sample_mask;

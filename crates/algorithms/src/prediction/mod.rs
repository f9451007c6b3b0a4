//! Projected land surface temperature for simulated urban states
//!
//! A projection adds a temperature increment to every urban pixel of a
//! baseline LST raster, then recomputes the heat indices and their region
//! statistics so the result can be compared with the baseline.

use crate::imagery::{uhi_index, utfvi_index};
use crate::pixelwise::zip_valid;
use crate::simulation::{NON_URBAN, URBAN};
use crate::statistics::{
    critical_area, zonal_accumulate, CriticalAreaResult, ZonalAccumulator, DEFAULT_UTFVI_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use thermogis_core::raster::Raster;
use thermogis_core::{Error, Region, Result};
use tracing::{info, instrument};

/// Warming applied to urban pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TemperatureIncrement {
    /// `delta` °C regardless of how many iterations produced the state
    Uniform { delta: f64 },
    /// `delta` °C per simulation iteration
    PerIteration { delta: f64 },
}

impl Default for TemperatureIncrement {
    fn default() -> Self {
        TemperatureIncrement::Uniform { delta: 5.0 }
    }
}

impl TemperatureIncrement {
    /// Increment for a state produced by `iterations` steps
    pub fn delta_for(&self, iterations: usize) -> f64 {
        match *self {
            TemperatureIncrement::Uniform { delta } => delta,
            TemperatureIncrement::PerIteration { delta } => delta * iterations as f64,
        }
    }
}

/// Parameters for [`evaluate_projection`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    pub increment: TemperatureIncrement,
    /// UTFVI is masked where |LST| is below this (°C)
    pub utfvi_epsilon: f64,
    /// UTFVI above this counts as critical
    pub critical_threshold: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            increment: TemperatureIncrement::default(),
            utfvi_epsilon: 1e-3,
            critical_threshold: DEFAULT_UTFVI_THRESHOLD,
        }
    }
}

/// Region statistics of an LST raster and its derived heat indices.
///
/// UHI and UTFVI statistics are NaN, and `critical_utfvi` is `None`, when
/// every in-region pixel of that index is masked (e.g. UHI of a uniform LST).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatSummary {
    pub lst_mean: f64,
    pub lst_std: f64,
    pub uhi_mean: f64,
    pub uhi_std: f64,
    pub utfvi_mean: f64,
    pub utfvi_std: f64,
    pub critical_utfvi: Option<CriticalAreaResult>,
}

impl HeatSummary {
    /// Summarize already-computed LST, UHI and UTFVI rasters over `region`
    ///
    /// # Errors
    /// [`Error::EmptyRegion`] only when the LST itself has no valid pixel in
    /// the region.
    pub fn compute(
        lst: &Raster<f64>,
        uhi: &Raster<f64>,
        utfvi: &Raster<f64>,
        region: &Region,
        scale: f64,
        critical_threshold: f64,
    ) -> Result<Self> {
        let lst_stats = zonal_accumulate(lst, "LST", region, scale)?;
        let uhi_stats = allow_masked(zonal_accumulate(uhi, "UHI", region, scale))?
            .unwrap_or_else(ZonalAccumulator::identity);
        let utfvi_stats = allow_masked(zonal_accumulate(utfvi, "UTFVI", region, scale))?
            .unwrap_or_else(ZonalAccumulator::identity);
        Ok(Self {
            lst_mean: lst_stats.mean(),
            lst_std: lst_stats.std_dev(),
            uhi_mean: uhi_stats.mean(),
            uhi_std: uhi_stats.std_dev(),
            utfvi_mean: utfvi_stats.mean(),
            utfvi_std: utfvi_stats.std_dev(),
            critical_utfvi: allow_masked(critical_area(utfvi, "UTFVI", region, scale, critical_threshold))?,
        })
    }
}

/// A derived index that is masked everywhere in the region is not an error
fn allow_masked<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::EmptyRegion { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Projected rasters and their summary
#[derive(Debug, Clone)]
pub struct Projection {
    /// Increment actually applied to urban pixels, °C
    pub delta: f64,
    pub lst: Raster<f64>,
    pub uhi: Raster<f64>,
    pub utfvi: Raster<f64>,
    pub summary: HeatSummary,
}

/// `baseline + urban × delta`; masked where either input is masked
pub fn project_lst(baseline: &Raster<f64>, urban: &Raster<u8>, delta: f64) -> Result<Raster<f64>> {
    if !delta.is_finite() {
        return Err(Error::InvalidParameter {
            name: "delta",
            value: delta.to_string(),
            reason: "temperature increment must be finite".to_string(),
        });
    }
    zip_valid(baseline, urban, |t, u| match u {
        URBAN => Some(t + delta),
        NON_URBAN => Some(t),
        _ => None,
    })
}

/// Project LST for a simulated urban state and recompute the heat indices.
///
/// UHI and UTFVI of the projection are normalized by the projection's own
/// region mean and standard deviation. `iterations` is the number of
/// simulation steps behind `urban`, used by
/// [`TemperatureIncrement::PerIteration`].
///
/// # Errors
/// [`Error::EmptyRegion`] when the projected LST has no valid pixel in the
/// region.
#[instrument(skip_all, fields(region = region.name(), iterations = iterations))]
pub fn evaluate_projection(
    baseline_lst: &Raster<f64>,
    urban: &Raster<u8>,
    iterations: usize,
    region: &Region,
    scale: f64,
    params: &ProjectionParams,
) -> Result<Projection> {
    let delta = params.increment.delta_for(iterations);
    let lst = project_lst(baseline_lst, urban, delta)?;

    let stats = zonal_accumulate(&lst, "LST", region, scale)?;
    let uhi = uhi_index(&lst, stats.mean(), stats.std_dev())?;
    let utfvi = utfvi_index(&lst, stats.mean(), params.utfvi_epsilon)?;
    let summary = HeatSummary::compute(&lst, &uhi, &utfvi, region, scale, params.critical_threshold)?;

    info!(
        delta,
        lst_mean = summary.lst_mean,
        critical_pct = summary.critical_utfvi.map(|c| c.percentage),
        "projection evaluated"
    );
    Ok(Projection {
        delta,
        lst,
        uhi,
        utfvi,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::MASKED;
    use approx::assert_relative_eq;
    use thermogis_core::GeoTransform;

    fn lst(values: Vec<f64>) -> Raster<f64> {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_transform(GeoTransform::new(0.0, 30.0, 30.0, -30.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn urban(values: Vec<u8>) -> Raster<u8> {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_transform(GeoTransform::new(0.0, 30.0, 30.0, -30.0));
        r.set_nodata(Some(MASKED));
        r
    }

    #[test]
    fn test_increment_policies() {
        assert_eq!(TemperatureIncrement::Uniform { delta: 5.0 }.delta_for(10), 5.0);
        assert_eq!(TemperatureIncrement::PerIteration { delta: 0.5 }.delta_for(4), 2.0);
    }

    #[test]
    fn test_project_lst_adds_delta_to_urban() {
        let out = project_lst(&lst(vec![20.0, 20.0, f64::NAN, 20.0]), &urban(vec![1, 0, 1, MASKED]), 5.0)
            .unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 25.0);
        assert_eq!(out.get(0, 1).unwrap(), 20.0);
        assert!(out.get(0, 2).unwrap().is_nan());
        assert!(out.get(0, 3).unwrap().is_nan());
    }

    #[test]
    fn test_evaluate_projection_summary() {
        let base = lst(vec![20.0, 20.0, 20.0, 20.0]);
        let state = urban(vec![1, 1, 0, 0]);
        let region = Region::rectangle("aoi", 0.0, 0.0, 120.0, 30.0).unwrap();
        let p = evaluate_projection(&base, &state, 3, &region, 30.0, &ProjectionParams::default())
            .unwrap();

        assert_eq!(p.delta, 5.0);
        assert_relative_eq!(p.summary.lst_mean, 22.5);
        assert_relative_eq!(p.summary.lst_std, 2.5);
        assert_relative_eq!(p.summary.uhi_mean, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.summary.uhi_std, 1.0, epsilon = 1e-12);
        // UTFVI of urban cells: 2.5 / 25 = 0.1 > 0.05
        assert_relative_eq!(p.summary.critical_utfvi.unwrap().percentage, 50.0);
    }

    #[test]
    fn test_uniform_projection_masks_uhi_without_failing() {
        let base = lst(vec![20.0; 4]);
        let state = urban(vec![0; 4]);
        let region = Region::rectangle("aoi", 0.0, 0.0, 120.0, 30.0).unwrap();
        let p = evaluate_projection(&base, &state, 1, &region, 30.0, &ProjectionParams::default())
            .unwrap();

        assert_relative_eq!(p.summary.lst_mean, 20.0);
        assert_eq!(p.summary.lst_std, 0.0);
        assert_eq!(p.uhi.valid_count(), 0);
        assert!(p.summary.uhi_mean.is_nan());
        assert!(p.summary.uhi_std.is_nan());
        // UTFVI stays defined: (20 - 20) / 20 = 0
        assert_eq!(p.summary.utfvi_mean, 0.0);
        assert_eq!(p.summary.critical_utfvi.unwrap().critical_pixels, 0);
    }

    #[test]
    fn test_fully_masked_projection_is_empty_region() {
        let base = lst(vec![f64::NAN; 2]);
        let state = urban(vec![1, 0]);
        let region = Region::rectangle("aoi", 0.0, 0.0, 60.0, 30.0).unwrap();
        assert!(matches!(
            evaluate_projection(&base, &state, 1, &region, 30.0, &ProjectionParams::default()),
            Err(Error::EmptyRegion { .. })
        ));
    }

    #[test]
    fn test_per_iteration_scales_with_iterations() {
        let base = lst(vec![20.0, 20.0]);
        let state = urban(vec![1, 0]);
        let region = Region::rectangle("aoi", 0.0, 0.0, 60.0, 30.0).unwrap();
        let params = ProjectionParams {
            increment: TemperatureIncrement::PerIteration { delta: 0.5 },
            ..ProjectionParams::default()
        };
        let p = evaluate_projection(&base, &state, 4, &region, 30.0, &params).unwrap();
        assert_eq!(p.delta, 2.0);
        assert_eq!(p.lst.get(0, 0).unwrap(), 22.0);
    }

    #[test]
    fn test_increment_serde_tagging() {
        let json = serde_json::to_string(&TemperatureIncrement::PerIteration { delta: 1.5 }).unwrap();
        assert_eq!(json, r#"{"policy":"per_iteration","delta":1.5}"#);
        let back: TemperatureIncrement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TemperatureIncrement::PerIteration { delta: 1.5 });
    }
}

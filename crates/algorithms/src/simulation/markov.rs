//! Two-state urban land-cover transition

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use thermogis_core::raster::Raster;
use thermogis_core::{Algorithm, Error, Result};
use tracing::debug;

/// Urban cell value
pub const URBAN: u8 = 1;
/// Non-urban cell value
pub const NON_URBAN: u8 = 0;
/// Masked cell value (state nodata)
pub const MASKED: u8 = 255;

/// Urbanization threshold and transition probabilities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkovParams {
    /// Pixels with NDVI strictly below this are urban
    pub urban_ndvi_threshold: f64,
    /// Probability an urban pixel stays urban
    pub p_stay: f64,
    /// Probability a non-urban pixel becomes urban
    pub p_convert: f64,
}

impl Default for MarkovParams {
    fn default() -> Self {
        Self {
            urban_ndvi_threshold: 0.3,
            p_stay: 0.9,
            p_convert: 0.1,
        }
    }
}

impl MarkovParams {
    fn validate(&self) -> Result<()> {
        for (name, p) in [("p_stay", self.p_stay), ("p_convert", self.p_convert)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidParameter {
                    name,
                    value: p.to_string(),
                    reason: "probability must lie in [0, 1]".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Binary urban state and the probabilities that produced it
#[derive(Debug, Clone)]
pub struct TransitionState {
    /// 1 = urban, 0 = non-urban, 255 = masked
    pub state: Raster<u8>,
    pub p_stay: f64,
    pub p_convert: f64,
}

impl TransitionState {
    /// Number of urban cells
    pub fn urban_count(&self) -> usize {
        urban_count(&self.state)
    }
}

/// Count of cells equal to [`URBAN`]
pub fn urban_count(state: &Raster<u8>) -> usize {
    state.data().iter().filter(|&&v| v == URBAN).count()
}

/// Threshold NDVI into an urban state raster.
///
/// `NDVI < threshold` is urban; masked NDVI gives a masked state cell.
pub fn urban_state_from_ndvi(ndvi: &Raster<f64>, threshold: f64) -> Result<Raster<u8>> {
    if !threshold.is_finite() {
        return Err(Error::InvalidParameter {
            name: "urban_ndvi_threshold",
            value: threshold.to_string(),
            reason: "must be finite".to_string(),
        });
    }
    let (rows, cols) = ndvi.shape();
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let v = unsafe { ndvi.get_unchecked(row, col) };
                    if ndvi.is_nodata(v) {
                        MASKED
                    } else if v < threshold {
                        URBAN
                    } else {
                        NON_URBAN
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();
    ndvi.derive(data, Some(MASKED))
}

/// One independent per-pixel transition step.
///
/// `next = round(u · p_stay + (1 − u) · p_convert)`, with halves rounded
/// up. There is no spatial interaction, and the two probabilities are not a
/// row-normalized transition matrix: with the defaults every urban pixel
/// stays urban and every non-urban pixel stays non-urban.
///
/// # Errors
/// [`Error::InvalidParameter`] if either probability is outside [0, 1].
pub fn markov_transition(state: &Raster<u8>, params: &MarkovParams) -> Result<TransitionState> {
    params.validate()?;
    let (rows, cols) = state.shape();
    let stay = params.p_stay.round() as u8;
    let convert = params.p_convert.round() as u8;

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| match unsafe { state.get_unchecked(row, col) } {
                    URBAN => stay,
                    NON_URBAN => convert,
                    _ => MASKED,
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let next = state.derive(data, Some(MASKED))?;
    debug!(
        before = urban_count(state),
        after = urban_count(&next),
        "markov transition"
    );
    Ok(TransitionState {
        state: next,
        p_stay: params.p_stay,
        p_convert: params.p_convert,
    })
}

/// Markov transition algorithm
#[derive(Debug, Clone, Default)]
pub struct MarkovTransition;

impl Algorithm for MarkovTransition {
    type Input = Raster<u8>;
    type Output = TransitionState;
    type Params = MarkovParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MarkovTransition"
    }

    fn description(&self) -> &'static str {
        "Per-pixel urban/non-urban transition with fixed probabilities"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        markov_transition(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(values: Vec<u8>) -> Raster<u8> {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_nodata(Some(MASKED));
        r
    }

    #[test]
    fn test_urban_threshold_is_strict() {
        let ndvi = Raster::from_vec(vec![0.1, 0.3, 0.6, f64::NAN], 1, 4).unwrap();
        let s = urban_state_from_ndvi(&ndvi, 0.3).unwrap();
        assert_eq!(s.data().as_slice().unwrap(), &[URBAN, NON_URBAN, NON_URBAN, MASKED]);
        assert_eq!(s.nodata(), Some(MASKED));
    }

    #[test]
    fn test_default_probabilities_preserve_state() {
        let s = state(vec![1, 0, 255, 1]);
        let next = markov_transition(&s, &MarkovParams::default()).unwrap();
        assert_eq!(next.state.data().as_slice().unwrap(), &[1, 0, 255, 1]);
        assert_eq!(next.urban_count(), 2);
        assert_eq!(next.p_stay, 0.9);
    }

    #[test]
    fn test_output_is_binary() {
        let s = state(vec![1, 0, 1, 0]);
        for (p_stay, p_convert) in [(0.2, 0.7), (0.5, 0.5), (1.0, 0.0), (0.0, 1.0)] {
            let params = MarkovParams {
                p_stay,
                p_convert,
                ..MarkovParams::default()
            };
            let next = markov_transition(&s, &params).unwrap();
            assert!(next.state.data().iter().all(|&v| v == URBAN || v == NON_URBAN));
        }
        // 0.2 rounds to 0, 0.7 to 1
        let flip = MarkovParams {
            p_stay: 0.2,
            p_convert: 0.7,
            ..MarkovParams::default()
        };
        let next = markov_transition(&s, &flip).unwrap();
        assert_eq!(next.state.data().as_slice().unwrap(), &[0, 1, 0, 1]);
    }

    #[test]
    fn test_invalid_probability() {
        let s = state(vec![1]);
        let params = MarkovParams {
            p_convert: 1.5,
            ..MarkovParams::default()
        };
        assert!(matches!(
            markov_transition(&s, &params),
            Err(Error::InvalidParameter { name: "p_convert", .. })
        ));
    }

    #[test]
    fn test_algorithm_trait() {
        let out = MarkovTransition
            .execute(state(vec![1, 0]), MarkovParams::default())
            .unwrap();
        assert_eq!(out.urban_count(), 1);
    }
}

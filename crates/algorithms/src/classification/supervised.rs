//! Random-forest prediction of land-surface-temperature classes
//!
//! LST is discretized into ordered classes, a bounded set of pixels is drawn
//! from the region, and a forest learns the class from NDVI and emissivity.
//! The fitted model can then classify any aligned image.

use super::confusion::{ClassMetrics, ConfusionMatrix};
use super::forest::{ForestParams, RandomForest};
use crate::maybe_rayon::*;
use crate::statistics::sample_mask;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thermogis_core::raster::{Raster, RasterImage};
use thermogis_core::{Error, Region, Result};
use tracing::{debug, info, instrument};

/// Maps LST (°C) onto ordered classes:
/// `class = clamp(floor((LST + offset) / bin_width), 0, num_classes − 1)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstDiscretization {
    pub offset: f64,
    pub bin_width: f64,
    pub num_classes: usize,
}

impl Default for LstDiscretization {
    /// 30 classes spanning roughly −7 °C to 37.5 °C
    fn default() -> Self {
        Self {
            offset: 7.0,
            bin_width: 1.482_758_620_69,
            num_classes: 30,
        }
    }
}

impl LstDiscretization {
    fn validate(&self) -> Result<()> {
        if !self.offset.is_finite() {
            return Err(Error::InvalidParameter {
                name: "offset",
                value: self.offset.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        if !self.bin_width.is_finite() || self.bin_width <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "bin_width",
                value: self.bin_width.to_string(),
                reason: "must be a positive number of degrees".to_string(),
            });
        }
        if self.num_classes < 2 {
            return Err(Error::InvalidParameter {
                name: "num_classes",
                value: self.num_classes.to_string(),
                reason: "need at least two classes".to_string(),
            });
        }
        Ok(())
    }

    /// Class of a single LST value; `None` for non-finite input
    pub fn class_of(&self, lst: f64) -> Option<usize> {
        if !lst.is_finite() {
            return None;
        }
        let raw = ((lst + self.offset) / self.bin_width).floor();
        Some(raw.clamp(0.0, (self.num_classes - 1) as f64) as usize)
    }

    /// Discretize a whole LST raster; masked pixels stay NaN
    pub fn discretize(&self, lst: &Raster<f64>) -> Result<Raster<f64>> {
        self.validate()?;
        crate::pixelwise::map_valid(lst, |t| self.class_of(t).map(|c| c as f64))
    }
}

/// Parameters for [`train_classifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub discretization: LstDiscretization,
    /// Maximum number of training pixels
    pub num_pixels: usize,
    /// Fewer sampled pixels than this is an error
    pub min_samples: usize,
    /// Seed of the pixel draw
    pub seed: u64,
    pub forest: ForestParams,
    /// Predictor bands, in feature order
    pub input_bands: Vec<String>,
    /// Band discretized into the training label
    pub label_band: String,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            discretization: LstDiscretization::default(),
            num_pixels: 10_000,
            min_samples: 20,
            seed: 0,
            forest: ForestParams::default(),
            input_bands: vec!["NDVI".to_string(), "EM".to_string()],
            label_band: "LST".to_string(),
        }
    }
}

/// Pixels drawn for training
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    /// One row of predictor values per pixel
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    /// (row, col) of every sampled pixel, row-major order
    pub pixels: Vec<(usize, usize)>,
}

impl TrainingSample {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn distinct_classes(&self) -> usize {
        self.labels.iter().collect::<BTreeSet<_>>().len()
    }
}

/// Draw up to `num_pixels` pixels uniformly without replacement from the
/// region, keeping only pixels where every input band and the label are valid.
///
/// # Errors
/// [`Error::MissingBand`] if a configured band is absent.
pub fn sample_training_pixels(
    image: &RasterImage,
    region: &Region,
    scale: f64,
    params: &ClassifierParams,
) -> Result<TrainingSample> {
    params.discretization.validate()?;
    let inputs = params
        .input_bands
        .iter()
        .map(|name| image.masked_band(name))
        .collect::<Result<Vec<_>>>()?;
    let label = image.masked_band(&params.label_band)?;
    let inside = sample_mask(&label, region, scale)?;
    let (rows, cols) = label.shape();

    let candidates: Vec<(usize, usize)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .filter(|&col| {
                    inside.is_valid(row, col)
                        && label.is_valid_at(row, col)
                        && inputs.iter().all(|b| b.is_valid_at(row, col))
                })
                .map(|col| (row, col))
                .collect::<Vec<_>>()
        })
        .collect();

    let amount = params.num_pixels.min(candidates.len());
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut picked = rand::seq::index::sample(&mut rng, candidates.len(), amount).into_vec();
    picked.sort_unstable();

    let mut sample = TrainingSample {
        features: Vec::with_capacity(amount),
        labels: Vec::with_capacity(amount),
        pixels: Vec::with_capacity(amount),
    };
    for i in picked {
        let (row, col) = candidates[i];
        let lst = unsafe { label.get_unchecked(row, col) };
        let Some(class) = params.discretization.class_of(lst) else {
            continue;
        };
        sample
            .features
            .push(inputs.iter().map(|b| unsafe { b.get_unchecked(row, col) }).collect());
        sample.labels.push(class);
        sample.pixels.push((row, col));
    }

    debug!(
        candidates = candidates.len(),
        sampled = sample.len(),
        classes = sample.distinct_classes(),
        "training pixels drawn"
    );
    Ok(sample)
}

/// Resubstitution metrics of a freshly trained classifier
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub distinct_classes: usize,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub kappa: f64,
    pub class_metrics: Vec<ClassMetrics>,
}

/// A fitted forest plus the band order and discretization it was trained with
#[derive(Debug, Clone)]
pub struct TrainedClassifier {
    forest: RandomForest,
    input_bands: Vec<String>,
    discretization: LstDiscretization,
}

impl TrainedClassifier {
    pub fn input_bands(&self) -> &[String] {
        &self.input_bands
    }

    pub fn discretization(&self) -> &LstDiscretization {
        &self.discretization
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    /// Predicted class for one feature row (in `input_bands` order)
    pub fn predict(&self, features: &[f64]) -> usize {
        self.forest.predict(features)
    }

    /// Predicted-class raster for `image` inside `region`.
    ///
    /// Pixels outside the region, masked by the image, or with any invalid
    /// input band are NaN.
    ///
    /// # Errors
    /// [`Error::MissingBand`] if the image lacks one of the input bands.
    pub fn classify(&self, image: &RasterImage, region: &Region) -> Result<Raster<f64>> {
        let inputs = self
            .input_bands
            .iter()
            .map(|name| image.masked_band(name))
            .collect::<Result<Vec<_>>>()?;
        let template = &inputs[0];
        let (rows, cols) = template.shape();
        let inside = region.coverage(template.transform(), rows, cols);

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut features = vec![0.0; inputs.len()];
                let mut row_data = vec![f64::NAN; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    if !inside.is_valid(row, col) {
                        continue;
                    }
                    let mut valid = true;
                    for (f, band) in features.iter_mut().zip(&inputs) {
                        let v = unsafe { band.get_unchecked(row, col) };
                        if band.is_nodata(v) {
                            valid = false;
                            break;
                        }
                        *f = v;
                    }
                    if valid {
                        *out = self.forest.predict(&features) as f64;
                    }
                }
                row_data
            })
            .collect();

        crate::pixelwise::build_output(template, data)
    }
}

/// Train a classifier on pixels drawn from `image` inside `region`.
///
/// `image` must carry the input bands and the label band (NDVI, EM and LST
/// by default). The report is computed on the training sample itself.
///
/// # Errors
/// - [`Error::InsufficientTrainingData`] when fewer than `min_samples` pixels
///   are drawn or they span fewer than two classes
/// - [`Error::MissingBand`] for an absent band
#[instrument(skip_all, fields(region = region.name(), num_pixels = params.num_pixels))]
pub fn train_classifier(
    image: &RasterImage,
    region: &Region,
    scale: f64,
    params: &ClassifierParams,
) -> Result<(TrainedClassifier, TrainingReport)> {
    if params.input_bands.is_empty() {
        return Err(Error::InvalidParameter {
            name: "input_bands",
            value: "[]".to_string(),
            reason: "classifier needs at least one predictor band".to_string(),
        });
    }

    let sample = sample_training_pixels(image, region, scale, params)?;
    let distinct_classes = sample.distinct_classes();
    if sample.len() < params.min_samples || distinct_classes < 2 {
        return Err(Error::InsufficientTrainingData {
            samples: sample.len(),
            distinct_classes,
            min_samples: params.min_samples,
        });
    }

    let n_classes = params.discretization.num_classes;
    let forest = RandomForest::fit(&sample.features, &sample.labels, n_classes, &params.forest)?;

    let predicted: Vec<usize> = sample
        .features
        .par_iter()
        .map(|row| forest.predict(row))
        .collect();
    let confusion = ConfusionMatrix::from_labels(&sample.labels, &predicted, n_classes)?;
    let report = TrainingReport {
        samples: sample.len(),
        distinct_classes,
        accuracy: confusion.accuracy(),
        kappa: confusion.kappa(),
        class_metrics: confusion.class_metrics(),
        confusion,
    };
    info!(
        samples = report.samples,
        classes = report.distinct_classes,
        accuracy = report.accuracy,
        kappa = report.kappa,
        "classifier trained"
    );

    let classifier = TrainedClassifier {
        forest,
        input_bands: params.input_bands.clone(),
        discretization: params.discretization,
    };
    Ok((classifier, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermogis_core::GeoTransform;

    fn band(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 30.0, 30.0, -30.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    /// Vegetated left half is cool, built-up right half is hot
    fn predictors(rows: usize, cols: usize) -> RasterImage {
        let n = rows * cols;
        let urban = |i: usize| (i % cols) >= cols / 2;
        let ndvi = (0..n)
            .map(|i| if urban(i) { 0.1 + 0.001 * (i / cols) as f64 } else { 0.6 })
            .collect();
        let em = (0..n).map(|i| if urban(i) { 0.986 } else { 0.99 }).collect();
        let lst = (0..n).map(|i| if urban(i) { 35.0 } else { 20.0 }).collect();
        RasterImage::from_bands([
            ("NDVI", band(ndvi, rows, cols)),
            ("EM", band(em, rows, cols)),
            ("LST", band(lst, rows, cols)),
        ])
        .unwrap()
    }

    fn aoi(rows: usize, cols: usize) -> Region {
        Region::rectangle("aoi", 0.0, 0.0, cols as f64 * 30.0, rows as f64 * 30.0).unwrap()
    }

    fn small_forest() -> ClassifierParams {
        ClassifierParams {
            forest: ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            },
            ..ClassifierParams::default()
        }
    }

    #[test]
    fn test_discretization_bins() {
        let d = LstDiscretization::default();
        assert_eq!(d.class_of(-50.0), Some(0));
        assert_eq!(d.class_of(-7.0), Some(0));
        // (20 + 7) / 1.4827... = 18.2
        assert_eq!(d.class_of(20.0), Some(18));
        assert_eq!(d.class_of(80.0), Some(29));
        assert_eq!(d.class_of(f64::NAN), None);
    }

    #[test]
    fn test_discretize_raster_keeps_mask() {
        let lst = band(vec![20.0, f64::NAN], 1, 2);
        let classes = LstDiscretization::default().discretize(&lst).unwrap();
        assert_eq!(classes.get(0, 0).unwrap(), 18.0);
        assert!(classes.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_sample_is_bounded_and_seeded() {
        let image = predictors(10, 10);
        let params = ClassifierParams {
            num_pixels: 25,
            ..ClassifierParams::default()
        };
        let a = sample_training_pixels(&image, &aoi(10, 10), 30.0, &params).unwrap();
        let b = sample_training_pixels(&image, &aoi(10, 10), 30.0, &params).unwrap();
        assert_eq!(a.len(), 25);
        assert_eq!(a.pixels, b.pixels);
        let unique: BTreeSet<_> = a.pixels.iter().collect();
        assert_eq!(unique.len(), 25);
    }

    #[test]
    fn test_sample_skips_invalid_pixels() {
        let mut image = predictors(4, 4);
        let mut ndvi = image.band("NDVI").unwrap().clone();
        ndvi.set(0, 0, f64::NAN).unwrap();
        image = image.with_band("NDVI", ndvi).unwrap();
        let sample =
            sample_training_pixels(&image, &aoi(4, 4), 30.0, &ClassifierParams::default()).unwrap();
        assert_eq!(sample.len(), 15);
        assert!(!sample.pixels.contains(&(0, 0)));
    }

    #[test]
    fn test_train_and_classify() {
        let (rows, cols) = (10, 10);
        let image = predictors(rows, cols);
        let region = aoi(rows, cols);
        let (classifier, report) =
            train_classifier(&image, &region, 30.0, &small_forest()).unwrap();

        assert_eq!(report.samples, 100);
        assert_eq!(report.distinct_classes, 2);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(classifier.input_bands(), ["NDVI", "EM"]);

        let classes = classifier.classify(&image, &region).unwrap();
        let hot = LstDiscretization::default().class_of(35.0).unwrap() as f64;
        let cool = LstDiscretization::default().class_of(20.0).unwrap() as f64;
        assert_eq!(classes.get(0, 0).unwrap(), cool);
        assert_eq!(classes.get(0, cols - 1).unwrap(), hot);
    }

    #[test]
    fn test_classify_outside_region_is_nan() {
        let image = predictors(4, 4);
        let (classifier, _) = train_classifier(
            &image,
            &aoi(4, 4),
            30.0,
            &ClassifierParams {
                min_samples: 4,
                ..small_forest()
            },
        )
        .unwrap();
        // top row only
        let strip = Region::rectangle("strip", 0.0, 90.0, 120.0, 120.0).unwrap();
        let classes = classifier.classify(&image, &strip).unwrap();
        assert_eq!(classes.valid_count(), 4);
        assert!(classes.get(3, 0).unwrap().is_nan());
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let n = 36;
        let image = RasterImage::from_bands([
            ("NDVI", band(vec![0.5; n], 6, 6)),
            ("EM", band(vec![0.99; n], 6, 6)),
            ("LST", band(vec![25.0; n], 6, 6)),
        ])
        .unwrap();
        let err = train_classifier(&image, &aoi(6, 6), 30.0, &small_forest()).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientTrainingData {
                samples: 36,
                distinct_classes: 1,
                min_samples: 20
            }
        ));
    }

    #[test]
    fn test_too_few_pixels_is_insufficient() {
        let image = predictors(3, 4);
        assert!(matches!(
            train_classifier(&image, &aoi(3, 4), 30.0, &small_forest()),
            Err(Error::InsufficientTrainingData { samples: 12, .. })
        ));
    }
}

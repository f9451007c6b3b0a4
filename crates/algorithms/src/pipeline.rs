//! End-to-end urban heat island analysis
//!
//! One run takes the raw scenes of the current period and of an earlier
//! reference period and produces:
//!
//! 1. LST, UHI and UTFVI of the current median composite with their region
//!    statistics and the critical UTFVI share
//! 2. A random forest predicting LST classes from NDVI and emissivity,
//!    applied to the prediction region
//! 3. A Markov projection of the reference period's urban state applied to
//!    the current LST, and its heat summary
//! 4. A cellular-automaton projection grown from the same reference urban
//!    state, and its heat summary
//!
//! Every raster meant for export is returned as a [`RasterArtifact`] named
//! `<Region>_<Index>_<Year>`.

use crate::classification::{train_classifier, ClassifierParams, TrainedClassifier, TrainingReport};
use crate::imagery::{
    emissivity_from_urban, land_surface_temperature, median_composite, ndvi, prepare_scene,
    CloudMaskParams, IndexParams, IndexPipeline, IndexSet, ScalingParams,
};
use crate::prediction::{evaluate_projection, HeatSummary, Projection, ProjectionParams, TemperatureIncrement};
use crate::simulation::{
    markov_transition, urban_count, urban_state_from_ndvi, CaOutcome, CaParams, CellularAutomaton,
    MarkovParams,
};
use crate::statistics::{zonal_accumulate, DEFAULT_UTFVI_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thermogis_core::raster::{Raster, RasterImage};
use thermogis_core::{Region, Result};
use tracing::{info, info_span, instrument};

const LST_PALETTE: [&str; 29] = [
    "040274", "040281", "0502a3", "0502b8", "0502ce", "0502e6", "0602ff", "235cb1", "307ef3",
    "269db1", "30c8e2", "32d3ef", "3be285", "3ff38f", "86e26f", "3ae237", "b5e22e", "d6e21f",
    "fff705", "ffd611", "ffb613", "ff8b13", "ff6e08", "ff500d", "ff0000", "de0101", "c21301",
    "a71001", "911003",
];

const HEAT_PALETTE: [&str; 8] = [
    "313695", "74add1", "fed976", "feb24c", "fd8d3c", "fc4e2a", "e31a1c", "b10026",
];

/// Display range and palette attached to an exported raster.
///
/// Never computed; carried from configuration to the artifact untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationConfig {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl VisualizationConfig {
    pub fn new(min: f64, max: f64, palette: &[&str]) -> Self {
        Self {
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
        }
    }
}

fn default_visualizations() -> BTreeMap<String, VisualizationConfig> {
    BTreeMap::from([
        ("LST".to_string(), VisualizationConfig::new(7.0, 50.0, &LST_PALETTE)),
        ("UHI".to_string(), VisualizationConfig::new(-4.0, 4.0, &HEAT_PALETTE)),
        ("UTFVI".to_string(), VisualizationConfig::new(-1.0, 0.3, &HEAT_PALETTE)),
        ("LST_Class".to_string(), VisualizationConfig::new(0.0, 29.0, &LST_PALETTE)),
        ("Urban".to_string(), VisualizationConfig::new(0.0, 1.0, &["green", "red"])),
    ])
}

/// Every setting of an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Used as the `<Region>` part of artifact names
    pub region_name: String,
    /// Area of interest, (lon, lat) or projected (x, y) vertices
    pub aoi: Vec<(f64, f64)>,
    /// Region the classifier is applied to; the AOI when absent
    pub prediction_aoi: Option<Vec<(f64, f64)>>,
    /// Year of the current scenes
    pub year: i32,
    /// Year of the reference scenes the Markov and CA projections start from
    pub reference_year: i32,
    /// Year labelled on Markov projections
    pub projection_year: i32,
    /// Nominal scale of region reductions, metres
    pub scale: f64,
    pub scaling: ScalingParams,
    pub cloud: CloudMaskParams,
    pub indices: IndexParams,
    pub classifier: ClassifierParams,
    pub markov: MarkovParams,
    pub ca: CaParams,
    pub markov_increment: TemperatureIncrement,
    pub ca_increment: TemperatureIncrement,
    /// UTFVI above this is critical
    pub critical_threshold: f64,
    /// Visualization per index family (`LST`, `UHI`, `UTFVI`, `LST_Class`, `Urban`)
    pub visualization: BTreeMap<String, VisualizationConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            region_name: "Region".to_string(),
            aoi: Vec::new(),
            prediction_aoi: None,
            year: 2022,
            reference_year: 2017,
            projection_year: 2027,
            scale: 30.0,
            scaling: ScalingParams::default(),
            cloud: CloudMaskParams::default(),
            indices: IndexParams::default(),
            classifier: ClassifierParams::default(),
            markov: MarkovParams::default(),
            ca: CaParams::default(),
            markov_increment: TemperatureIncrement::Uniform { delta: 5.0 },
            ca_increment: TemperatureIncrement::Uniform { delta: 5.0 },
            critical_threshold: DEFAULT_UTFVI_THRESHOLD,
            visualization: default_visualizations(),
        }
    }
}

/// A raster ready for export
#[derive(Debug, Clone)]
pub struct RasterArtifact {
    /// `<Region>_<Index>_<Year>`
    pub name: String,
    pub index: String,
    pub year: i32,
    pub raster: Raster<f64>,
    pub scale: f64,
    pub region: String,
    pub visualization: Option<VisualizationConfig>,
}

/// Classifier outcome in the report
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierSummary {
    pub training: TrainingReport,
    pub predicted_class_mean: f64,
    pub predicted_class_std: f64,
}

/// Markov projection outcome in the report
#[derive(Debug, Clone, Serialize)]
pub struct MarkovSummary {
    pub urban_before: usize,
    pub urban_after: usize,
    pub delta: f64,
    pub heat: HeatSummary,
}

/// Cellular-automaton projection outcome in the report
#[derive(Debug, Clone, Serialize)]
pub struct CaSummary {
    pub reference_lst_mean: f64,
    pub iterations_run: usize,
    pub converged: bool,
    pub urban_counts: Vec<usize>,
    pub delta: f64,
    pub heat: HeatSummary,
}

/// Numeric results of an analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub region: String,
    pub year: i32,
    pub reference_year: i32,
    pub ndvi_min: f64,
    pub ndvi_max: f64,
    pub current: HeatSummary,
    pub classifier: ClassifierSummary,
    pub markov: MarkovSummary,
    pub cellular_automaton: CaSummary,
    /// Names of the artifacts produced alongside the report
    pub artifacts: Vec<String>,
}

/// Report plus the rasters to export
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub report: AnalysisReport,
    pub artifacts: Vec<RasterArtifact>,
}

/// Urban state as 0/1 floats with NaN where masked
fn state_to_f64(state: &Raster<u8>) -> Result<Raster<f64>> {
    let data = state
        .data()
        .iter()
        .map(|&v| if state.is_nodata(v) { f64::NAN } else { f64::from(v) })
        .collect();
    state.derive(data, Some(f64::NAN))
}

/// Urban heat island analysis over one region
#[derive(Debug, Clone, Default)]
pub struct UhiAnalysis {
    config: AnalysisConfig,
}

impl UhiAnalysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn artifact(&self, index: &str, family: &str, year: i32, raster: Raster<f64>) -> RasterArtifact {
        RasterArtifact {
            name: format!("{}_{}_{}", self.config.region_name, index, year),
            index: index.to_string(),
            year,
            raster,
            scale: self.config.scale,
            region: self.config.region_name.clone(),
            visualization: self.config.visualization.get(family).cloned(),
        }
    }

    fn projection_artifacts(&self, suffix: &str, year: i32, p: &Projection) -> Vec<RasterArtifact> {
        vec![
            self.artifact(&format!("LST_{suffix}"), "LST", year, p.lst.clone()),
            self.artifact(&format!("UHI_{suffix}"), "UHI", year, p.uhi.clone()),
            self.artifact(&format!("UTFVI_{suffix}"), "UTFVI", year, p.utfvi.clone()),
        ]
    }

    fn projection_params(&self, increment: TemperatureIncrement) -> ProjectionParams {
        ProjectionParams {
            increment,
            utfvi_epsilon: self.config.indices.utfvi_epsilon,
            critical_threshold: self.config.critical_threshold,
        }
    }

    /// Scale, cloud-mask and median-composite a scene series
    pub fn composite(&self, scenes: &[RasterImage]) -> Result<RasterImage> {
        let prepared = scenes
            .iter()
            .map(|scene| prepare_scene(scene, &self.config.scaling, &self.config.cloud))
            .collect::<Result<Vec<_>>>()?;
        median_composite(&prepared)
    }

    /// Current-period indices and their heat summary
    pub fn current_indices(&self, scenes: &[RasterImage], region: &Region) -> Result<(IndexSet, HeatSummary)> {
        let _span = info_span!("current", year = self.config.year).entered();
        let composite = self.composite(scenes)?;
        let set = IndexPipeline::new(self.config.indices.clone()).run(&composite, region, self.config.scale)?;
        let summary = HeatSummary::compute(
            &set.lst,
            &set.uhi,
            &set.utfvi,
            region,
            self.config.scale,
            self.config.critical_threshold,
        )?;
        Ok((set, summary))
    }

    /// Train on the current indices and classify the prediction region
    pub fn classify(
        &self,
        set: &IndexSet,
        region: &Region,
        target: &Region,
    ) -> Result<(TrainedClassifier, ClassifierSummary, Raster<f64>)> {
        let image = set.predictor_image()?;
        let (classifier, training) = train_classifier(&image, region, self.config.scale, &self.config.classifier)?;
        let classes = classifier.classify(&image, target)?;
        let stats = zonal_accumulate(&classes, "LST_Class", target, self.config.scale)?;
        let summary = ClassifierSummary {
            training,
            predicted_class_mean: stats.mean(),
            predicted_class_std: stats.std_dev(),
        };
        Ok((classifier, summary, classes))
    }

    /// Reference-period LST with emissivity approximated from the urban state,
    /// and that urban state
    pub fn reference_state(&self, scenes: &[RasterImage]) -> Result<(Raster<f64>, Raster<u8>)> {
        let _span = info_span!("reference", year = self.config.reference_year).entered();
        let p = &self.config.indices;
        let composite = self.composite(scenes)?;
        let nir = composite.masked_band(&p.nir_band)?;
        let red = composite.masked_band(&p.red_band)?;
        let tb = composite.masked_band(&p.thermal_band)?;

        let urban = urban_state_from_ndvi(&ndvi(&nir, &red)?, self.config.markov.urban_ndvi_threshold)?;
        let em = emissivity_from_urban(&urban)?;
        let lst = land_surface_temperature(&tb, &em)?;
        Ok((lst, urban))
    }

    /// Run the whole analysis
    ///
    /// # Errors
    /// Any stage failure aborts the run: invalid AOI geometry, no usable
    /// imagery in either period, an empty region, or too little training data.
    #[instrument(skip_all, fields(region = %self.config.region_name))]
    pub fn run(&self, current: &[RasterImage], reference: &[RasterImage]) -> Result<AnalysisOutput> {
        let cfg = &self.config;
        let region = Region::new(cfg.region_name.clone(), &cfg.aoi)?;
        let target = match &cfg.prediction_aoi {
            Some(vertices) => Region::new(format!("{}_prediction", cfg.region_name), vertices)?,
            None => region.clone(),
        };

        let (set, current_summary) = self.current_indices(current, &region)?;
        info!(
            lst_mean = current_summary.lst_mean,
            critical_pct = current_summary.critical_utfvi.map(|c| c.percentage),
            "current period summarized"
        );

        let mut artifacts = vec![
            self.artifact("LST", "LST", cfg.year, set.lst.clone()),
            self.artifact("UHI", "UHI", cfg.year, set.uhi.clone()),
            self.artifact("UTFVI", "UTFVI", cfg.year, set.utfvi.clone()),
        ];

        let (_, classifier, classes) = self.classify(&set, &region, &target)?;
        artifacts.push(self.artifact("LST_Class", "LST_Class", cfg.year, classes));

        let (reference_lst, reference_urban) = self.reference_state(reference)?;

        // Markov: one step from the reference urban state, warming the current LST
        let next = markov_transition(&reference_urban, &cfg.markov)?;
        let markov_projection = evaluate_projection(
            &set.lst,
            &next.state,
            1,
            &region,
            cfg.scale,
            &self.projection_params(cfg.markov_increment),
        )?;
        artifacts.extend(self.projection_artifacts("Markov", cfg.projection_year, &markov_projection));
        let markov = MarkovSummary {
            urban_before: urban_count(&reference_urban),
            urban_after: next.urban_count(),
            delta: markov_projection.delta,
            heat: markov_projection.summary,
        };

        // Cellular automaton: grow the reference urban state towards the current year
        let reference_lst_mean = zonal_accumulate(&reference_lst, "LST", &region, cfg.scale)?.mean();
        let CaOutcome {
            state: grown,
            iterations_run,
            converged,
            urban_counts,
        } = CellularAutomaton::new(cfg.ca).run(&reference_urban)?;
        let ca_projection = evaluate_projection(
            &reference_lst,
            &grown,
            iterations_run,
            &region,
            cfg.scale,
            &self.projection_params(cfg.ca_increment),
        )?;
        artifacts.push(self.artifact("Urban", "Urban", cfg.reference_year, state_to_f64(&reference_urban)?));
        artifacts.push(self.artifact("Urban_CA", "Urban", cfg.year, state_to_f64(&grown)?));
        artifacts.extend(self.projection_artifacts("CA", cfg.year, &ca_projection));
        let cellular_automaton = CaSummary {
            reference_lst_mean,
            iterations_run,
            converged,
            urban_counts,
            delta: ca_projection.delta,
            heat: ca_projection.summary,
        };

        let report = AnalysisReport {
            region: cfg.region_name.clone(),
            year: cfg.year,
            reference_year: cfg.reference_year,
            ndvi_min: set.ndvi_min,
            ndvi_max: set.ndvi_max,
            current: current_summary,
            classifier,
            markov,
            cellular_automaton,
            artifacts: artifacts.iter().map(|a| a.name.clone()).collect(),
        };
        info!(artifacts = artifacts.len(), "analysis complete");
        Ok(AnalysisOutput { report, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::URBAN;

    #[test]
    fn test_default_visualizations() {
        let cfg = AnalysisConfig::default();
        let lst = &cfg.visualization["LST"];
        assert_eq!((lst.min, lst.max), (7.0, 50.0));
        assert_eq!(lst.palette.len(), 29);
        assert_eq!(cfg.visualization["UTFVI"].max, 0.3);
    }

    #[test]
    fn test_artifact_naming() {
        let analysis = UhiAnalysis::new(AnalysisConfig {
            region_name: "Istanbul".to_string(),
            ..AnalysisConfig::default()
        });
        let a = analysis.artifact("UHI", "UHI", 2022, Raster::filled(1, 1, 0.0));
        assert_eq!(a.name, "Istanbul_UHI_2022");
        assert_eq!(a.scale, 30.0);
        assert_eq!(a.visualization.map(|v| v.min), Some(-4.0));
    }

    #[test]
    fn test_state_to_f64() {
        let mut s = Raster::from_vec(vec![URBAN, 0, 255], 1, 3).unwrap();
        s.set_nodata(Some(255));
        let f = state_to_f64(&s).unwrap();
        assert_eq!(f.get(0, 0).unwrap(), 1.0);
        assert_eq!(f.get(0, 1).unwrap(), 0.0);
        assert!(f.get(0, 2).unwrap().is_nan());
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let cfg: AnalysisConfig = serde_json::from_str(
            r#"{
                "region_name": "Ankara",
                "aoi": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
                "ca": { "iterations": 3 },
                "ca_increment": { "policy": "per_iteration", "delta": 0.5 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.region_name, "Ankara");
        assert_eq!(cfg.aoi.len(), 3);
        assert_eq!(cfg.ca.iterations, 3);
        assert_eq!(cfg.ca.growth_threshold, 1.0);
        assert_eq!(cfg.ca_increment, TemperatureIncrement::PerIteration { delta: 0.5 });
        assert_eq!(cfg.scale, 30.0);
        assert_eq!(cfg.classifier.num_pixels, 10_000);
    }

    #[test]
    fn test_invalid_aoi_fails_before_processing() {
        let analysis = UhiAnalysis::new(AnalysisConfig {
            aoi: vec![(0.0, 0.0), (1.0, 1.0)],
            ..AnalysisConfig::default()
        });
        assert!(matches!(
            analysis.run(&[], &[]),
            Err(thermogis_core::Error::InvalidGeometry { .. })
        ));
    }
}

//! # ThermoGIS Algorithms
//!
//! Urban heat island analysis for Landsat-style scenes.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: Band scaling, QA cloud masking, median composites, NDVI,
//!   fractional vegetation, emissivity, LST, UHI and UTFVI
//! - **statistics**: Zonal reducers over a region and critical-area analysis
//! - **classification**: Random forest prediction of LST classes from NDVI/EM
//! - **simulation**: Markov land-cover transition and cellular-automaton growth
//! - **prediction**: Projected LST and heat summaries for simulated states
//! - **pipeline**: End-to-end analysis run producing artifacts and a report

pub(crate) mod maybe_rayon;
pub(crate) mod pixelwise;

pub mod classification;
pub mod imagery;
pub mod pipeline;
pub mod prediction;
pub mod simulation;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        train_classifier, ClassifierParams, LstDiscretization, TrainedClassifier, TrainingReport,
    };
    pub use crate::imagery::{
        apply_cloud_mask, cloud_mask, emissivity, fractional_vegetation,
        land_surface_temperature, median_composite, ndvi, scale_bands, uhi_index, utfvi_index,
        CloudMaskParams, IndexPipeline, IndexSet, ScalingParams,
    };
    pub use crate::pipeline::{
        AnalysisConfig, AnalysisOutput, AnalysisReport, RasterArtifact, UhiAnalysis,
        VisualizationConfig,
    };
    pub use crate::prediction::{
        evaluate_projection, HeatSummary, ProjectionParams, TemperatureIncrement,
    };
    pub use crate::simulation::{
        markov_transition, urban_state_from_ndvi, CaOutcome, CaParams, CellularAutomaton,
        MarkovParams, TransitionState,
    };
    pub use crate::statistics::{critical_area, zonal_statistic, CriticalAreaResult, Reducer};
    pub use thermogis_core::prelude::*;
}

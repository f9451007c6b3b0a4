//! Supervised prediction of land-surface-temperature classes
//!
//! - **Random forest**: CART trees with Gini splits, bootstrap rows and
//!   random feature subsets, trained in parallel
//! - **Confusion matrix**: accuracy, Cohen's kappa, per-class metrics
//! - **Supervised**: LST discretization, pixel sampling, training, and
//!   classification of target images

mod confusion;
mod forest;
mod supervised;

pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use forest::{DecisionTree, ForestParams, RandomForest};
pub use supervised::{
    sample_training_pixels, train_classifier, ClassifierParams, LstDiscretization,
    TrainedClassifier, TrainingReport, TrainingSample,
};

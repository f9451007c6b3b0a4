//! Random forest of CART trees with Gini splits
//!
//! Trees are stored as `Vec<Node>` arenas and grown iteratively. Each tree
//! sees a bootstrap draw of the training rows and a random subset of
//! `ceil(sqrt(n_features))` features at every split. Trees train in parallel
//! from per-tree seeds drawn from one master `ChaCha8Rng`, so a forest is
//! reproducible for a given seed regardless of thread count.

use crate::maybe_rayon::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thermogis_core::{Error, Result};
use tracing::{debug, instrument};

/// Forest hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees
    pub n_trees: usize,
    /// Maximum depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum number of rows in each leaf
    pub min_samples_leaf: usize,
    /// Share of the rows drawn (with replacement) for each tree
    pub bag_fraction: f64,
    /// Master seed
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_leaf: 1,
            bag_fraction: 0.5,
            seed: 0,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "n_trees",
                value: "0".to_string(),
                reason: "forest needs at least one tree".to_string(),
            });
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::InvalidParameter {
                name: "min_samples_leaf",
                value: "0".to_string(),
                reason: "leaves must hold at least one sample".to_string(),
            });
        }
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "bag_fraction",
                value: self.bag_fraction.to_string(),
                reason: "must lie in (0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: usize,
    },
}

/// Gini impurity `1 - Σ p²`
fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

/// Index of the largest count; ties go to the lowest class
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = class;
        }
    }
    best
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Best Gini split over a random subset of `max_features` columns.
///
/// Each candidate column is sorted once and scanned left to right with
/// incremental class counts. `None` when every candidate column is constant
/// over `rows` or no threshold satisfies `min_leaf`.
fn find_best_split(
    columns: &[Vec<f64>],
    labels: &[usize],
    rows: &[usize],
    parent_counts: &[usize],
    max_features: usize,
    min_leaf: usize,
    rng: &mut impl Rng,
) -> Option<Split> {
    let n = rows.len();
    let n_features = columns.len();
    let parent = gini(parent_counts, n);

    // Partial Fisher-Yates over feature indices
    let mut order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }

    let mut best: Option<(f64, usize, f64)> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);

    for &feature in &order[..take] {
        let column = &columns[feature];
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (column[r], labels[r])));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = vec![0usize; parent_counts.len()];
        let mut right = parent_counts.to_vec();

        for i in 0..n - 1 {
            let (value, class) = sorted[i];
            left[class] += 1;
            right[class] -= 1;

            let next = sorted[i + 1].0;
            if value == next {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let decrease = n as f64 * parent
                - n_left as f64 * gini(&left, n_left)
                - n_right as f64 * gini(&right, n_right);
            if best.map_or(true, |(d, _, _)| decrease > d) {
                best = Some((decrease, feature, (value + next) / 2.0));
            }
        }
    }

    let (_, feature, threshold) = best?;
    let (left, right) = rows
        .iter()
        .partition(|&&r| columns[feature][r] <= threshold);
    Some(Split {
        feature,
        threshold,
        left,
        right,
    })
}

/// A single fitted CART tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn fit(
        columns: &[Vec<f64>],
        labels: &[usize],
        rows: Vec<usize>,
        n_classes: usize,
        max_features: usize,
        params: &ForestParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut stack = vec![(0usize, rows, 0usize)];

        while let Some((slot, rows, depth)) = stack.pop() {
            let mut counts = vec![0usize; n_classes];
            for &r in &rows {
                counts[labels[r]] += 1;
            }
            let class = majority(&counts);

            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let too_deep = params.max_depth.is_some_and(|d| depth >= d);
            let too_small = rows.len() < 2 * params.min_samples_leaf;
            if pure || too_deep || too_small {
                nodes[slot] = Node::Leaf { class };
                continue;
            }

            match find_best_split(
                columns,
                labels,
                &rows,
                &counts,
                max_features,
                params.min_samples_leaf,
                rng,
            ) {
                Some(split) => {
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { class });
                    nodes.push(Node::Leaf { class });
                    nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    stack.push((right, split.right, depth + 1));
                    stack.push((left, split.left, depth + 1));
                }
                None => nodes[slot] = Node::Leaf { class },
            }
        }

        Self { nodes }
    }

    /// Predicted class for one feature vector
    pub fn predict(&self, features: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Number of nodes in the arena
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// A fitted random forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    /// Fit a forest on row-major `features` and zero-based `labels`.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for invalid `params`, an empty or ragged
    /// dataset, non-finite feature values, or labels `>= n_classes`.
    #[instrument(skip_all, fields(n_trees = params.n_trees, n_samples = features.len()))]
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self> {
        params.validate()?;
        let invalid = |reason: String| Error::InvalidParameter {
            name: "training data",
            value: format!("{} rows", features.len()),
            reason,
        };

        let n_samples = features.len();
        if n_samples == 0 || labels.len() != n_samples {
            return Err(invalid(format!(
                "need one label per row, got {} labels",
                labels.len()
            )));
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(invalid("rows have no features".to_string()));
        }
        if let Some(i) = features
            .iter()
            .position(|row| row.len() != n_features || row.iter().any(|v| !v.is_finite()))
        {
            return Err(invalid(format!("row {} is ragged or non-finite", i)));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(invalid(format!("label {} outside 0..{}", bad, n_classes)));
        }

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|f| features.iter().map(|row| row[f]).collect())
            .collect();
        let max_features = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);
        let draw_count = ((n_samples as f64) * params.bag_fraction).ceil().max(1.0) as usize;

        let mut master = ChaCha8Rng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();

        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let rows: Vec<usize> = (0..draw_count)
                    .map(|_| rng.gen_range(0..n_samples))
                    .collect();
                DecisionTree::fit(
                    &columns,
                    labels,
                    rows,
                    n_classes,
                    max_features,
                    params,
                    &mut rng,
                )
            })
            .collect();

        debug!(
            n_trees = trees.len(),
            n_features,
            n_classes,
            max_features,
            draw_count,
            "random forest trained"
        );

        Ok(Self {
            trees,
            n_features,
            n_classes,
        })
    }

    /// Majority vote over all trees; ties go to the lowest class
    pub fn predict(&self, features: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict(features)] += 1;
        }
        majority(&votes)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let class = i % 3;
            let jitter = (i / 3) as f64 * 0.01;
            features.push(vec![class as f64 * 2.0 + jitter, 0.5 - jitter]);
            labels.push(class);
        }
        (features, labels)
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5, 0], 5), 0.0);
        assert!((gini(&[5, 5], 10) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_majority_ties_low_class() {
        assert_eq!(majority(&[2, 3, 3]), 1);
        assert_eq!(majority(&[0, 0]), 0);
    }

    #[test]
    fn test_separable_training_accuracy() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, 3, &ForestParams::default()).unwrap();
        assert_eq!(forest.n_trees(), 100);
        let correct = features
            .iter()
            .zip(&labels)
            .filter(|&(x, &y)| forest.predict(x) == y)
            .count();
        assert_eq!(correct, features.len());
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let (features, labels) = separable();
        let params = ForestParams {
            n_trees: 10,
            seed: 7,
            ..ForestParams::default()
        };
        let a = RandomForest::fit(&features, &labels, 3, &params).unwrap();
        let b = RandomForest::fit(&features, &labels, 3, &params).unwrap();
        for x in &features {
            assert_eq!(a.predict(x), b.predict(x));
        }
        let sizes_a: Vec<_> = a.trees.iter().map(DecisionTree::n_nodes).collect();
        let sizes_b: Vec<_> = b.trees.iter().map(DecisionTree::n_nodes).collect();
        assert_eq!(sizes_a, sizes_b);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let (features, labels) = separable();
        let params = ForestParams {
            n_trees: 1,
            max_depth: Some(1),
            bag_fraction: 1.0,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&features, &labels, 3, &params).unwrap();
        assert!(forest.trees[0].n_nodes() <= 3);
    }

    #[test]
    fn test_invalid_inputs() {
        let params = ForestParams::default();
        assert!(RandomForest::fit(&[], &[], 2, &params).is_err());
        assert!(RandomForest::fit(&[vec![f64::NAN]], &[0], 2, &params).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[5], 2, &params).is_err());
        let no_trees = ForestParams {
            n_trees: 0,
            ..params
        };
        assert!(RandomForest::fit(&[vec![1.0]], &[0], 2, &no_trees).is_err());
    }
}

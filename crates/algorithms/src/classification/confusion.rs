//! Confusion matrix and agreement metrics

use serde::Serialize;
use std::fmt;
use thermogis_core::{Error, Result};

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[true_class][predicted_class]` counts how many samples
/// with true label `true_class` were predicted as `predicted_class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: usize,
    /// TP / (TP + FP); 0 if the class was never predicted
    pub precision: f64,
    /// TP / (TP + FN); 0 if the class never occurs
    pub recall: f64,
    pub f1: f64,
    /// Number of true samples in this class
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from true and predicted labels.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for empty or unequal label slices, or a
    /// label outside `0..n_classes`.
    pub fn from_labels(true_labels: &[usize], predicted: &[usize], n_classes: usize) -> Result<Self> {
        if true_labels.is_empty() || true_labels.len() != predicted.len() {
            return Err(Error::InvalidParameter {
                name: "labels",
                value: format!("{} true / {} predicted", true_labels.len(), predicted.len()),
                reason: "need the same non-zero number of true and predicted labels".to_string(),
            });
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            if t >= n_classes || p >= n_classes {
                return Err(Error::InvalidParameter {
                    name: "labels",
                    value: format!("({}, {})", t, p),
                    reason: format!("labels must lie in 0..{}", n_classes),
                });
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    fn diagonal(&self) -> usize {
        (0..self.n_classes).map(|i| self.matrix[i][i]).sum()
    }

    fn row_total(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    fn col_total(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    /// Overall accuracy: proportion of correct predictions
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.diagonal() as f64 / total as f64
        }
    }

    /// Cohen's kappa, `(p_o - p_e) / (1 - p_e)`.
    ///
    /// When chance agreement is already perfect (a single class in both
    /// labelings) kappa is 1 for full agreement and 0 otherwise.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let observed = self.diagonal() as f64 / n;
        let expected: f64 = (0..self.n_classes)
            .map(|c| self.row_total(c) as f64 * self.col_total(c) as f64)
            .sum::<f64>()
            / (n * n);
        if (1.0 - expected).abs() < 1e-12 {
            return if (observed - 1.0).abs() < 1e-12 { 1.0 } else { 0.0 };
        }
        (observed - expected) / (1.0 - expected)
    }

    /// Per-class precision, recall, F1, and support
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted = self.col_total(c);
                let support = self.row_total(c);
                let precision = if predicted == 0 {
                    0.0
                } else {
                    tp as f64 / predicted as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Matrix rows, indexed `[true][predicted]`
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_matrix() {
        // True: [0,0,0, 1,1,1, 2,2,2]
        // Pred: [0,0,1, 1,1,2, 2,2,0]
        let cm = ConfusionMatrix::from_labels(
            &[0, 0, 0, 1, 1, 1, 2, 2, 2],
            &[0, 0, 1, 1, 1, 2, 2, 2, 0],
            3,
        )
        .unwrap();
        assert_relative_eq!(cm.accuracy(), 6.0 / 9.0);
        // p_e = 3 * (3 * 3) / 81 = 1/3, kappa = (2/3 - 1/3) / (2/3) = 0.5
        assert_relative_eq!(cm.kappa(), 0.5, epsilon = 1e-12);

        let m = cm.class_metrics();
        assert_relative_eq!(m[0].precision, 2.0 / 3.0);
        assert_relative_eq!(m[0].recall, 2.0 / 3.0);
        assert_eq!(m[0].support, 3);
    }

    #[test]
    fn test_perfect_agreement() {
        let cm = ConfusionMatrix::from_labels(&[0, 1, 1, 2], &[0, 1, 1, 2], 4).unwrap();
        assert_relative_eq!(cm.accuracy(), 1.0);
        assert_relative_eq!(cm.kappa(), 1.0);
        // class 3 never occurs
        assert_eq!(cm.class_metrics()[3].support, 0);
        assert_eq!(cm.class_metrics()[3].f1, 0.0);
    }

    #[test]
    fn test_single_class_kappa() {
        let cm = ConfusionMatrix::from_labels(&[1, 1], &[1, 1], 2).unwrap();
        assert_relative_eq!(cm.kappa(), 1.0);
    }

    #[test]
    fn test_invalid_labels() {
        assert!(ConfusionMatrix::from_labels(&[], &[], 3).is_err());
        assert!(ConfusionMatrix::from_labels(&[0, 1], &[0], 3).is_err());
        assert!(ConfusionMatrix::from_labels(&[0, 3], &[0, 1], 3).is_err());
    }

    #[test]
    fn test_display() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 2).unwrap();
        let output = format!("{cm}");
        assert!(output.contains("pred_"));
        assert!(output.contains("true_"));
    }
}

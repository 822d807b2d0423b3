use serde::Serialize;

use crate::data::model::Value;

/// Counts of (true label, predicted label) pairs. Rows are true labels,
/// columns predictions, both in ascending label order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<Value>,
    pub matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from class indices into `labels`. Indices out of range are
    /// ignored.
    pub fn from_indices(labels: Vec<Value>, truth: &[usize], predicted: &[usize]) -> Self {
        let k = labels.len();
        let mut matrix = vec![vec![0usize; k]; k];
        for (&t, &p) in truth.iter().zip(predicted) {
            if t < k && p < k {
                matrix[t][p] += 1;
            }
        }
        ConfusionMatrix { labels, matrix }
    }

    /// Number of test rows per true label.
    pub fn row_sums(&self) -> Vec<usize> {
        self.matrix.iter().map(|r| r.iter().sum()).collect()
    }

    /// Number of predictions per label.
    pub fn column_sums(&self) -> Vec<usize> {
        (0..self.labels.len())
            .map(|c| self.matrix.iter().map(|r| r[c]).sum())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.row_sums().iter().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.labels.len()).map(|i| self.matrix[i][i]).sum();
        correct as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: Value,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 plus accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Derive the report from a confusion matrix. Zero divisions yield 0.
    /// Labels that neither occur nor get predicted are listed but left out
    /// of the averages.
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let supports = cm.row_sums();
        let predicted = cm.column_sums();

        let classes: Vec<ClassMetrics> = cm
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = cm.matrix[i][i];
                let precision = ratio(tp, predicted[i]);
                let recall = ratio(tp, supports[i]);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support: supports[i],
                }
            })
            .collect();

        let active: Vec<usize> = (0..classes.len())
            .filter(|&i| supports[i] > 0 || predicted[i] > 0)
            .collect();
        let total = cm.total();

        let mean = |f: fn(&ClassMetrics) -> f64| {
            if active.is_empty() {
                0.0
            } else {
                active.iter().map(|&i| f(&classes[i])).sum::<f64>() / active.len() as f64
            }
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            }
        };

        let macro_avg = AverageMetrics {
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support: total,
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        ClassificationReport {
            accuracy: cm.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

/// Model stage: encoding, splitting, classifiers and evaluation.
///
/// ```text
///   RecordTable ──► FittedEncoder ──► features ──► Classifier ──► labels
///        │               ▲                                        │
///        │               └──── InputRow (predict) ───────────────►│
///        └──► train_test_split ──► held-out rows ──► metrics ◄────┘
/// ```

pub mod encoder;
pub mod forest;
pub mod metrics;
pub mod model;
pub mod split;
pub mod tree;

use crate::error::PipelineError;

/// A multi-class classifier over dense `f64` feature rows. Labels are class
/// indices in `0..n_classes`.
pub trait Classifier: std::fmt::Debug + Send + Sync {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<(), PipelineError>;

    /// Class probabilities, one per class.
    fn predict_proba(&self, row: &[f64]) -> Vec<f64>;

    fn n_classes(&self) -> usize;

    /// Most probable class; ties go to the lowest index.
    fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }
}

pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

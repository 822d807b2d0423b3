use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::tree::{DecisionTree, TreeParams};
use super::Classifier;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Resample rows with replacement for each tree.
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Bagged ensemble of [`DecisionTree`]s, each considering `sqrt(features)`
/// candidates per split. Probabilities are the mean over trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    n_classes: usize,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        RandomForest {
            params,
            trees: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        if self.params.n_trees == 0 {
            return Err(PipelineError::InvalidConfig(
                "a forest needs at least one tree".to_string(),
            ));
        }
        let n = x.len();
        if n == 0 {
            return Err(PipelineError::InsufficientRows { rows: 0, required: 1 });
        }
        let n_features = x[0].len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);

        let mut master = StdRng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_trees);
        for _ in 0..self.params.n_trees {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let samples: Vec<usize> = if self.params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let mut tree = DecisionTree::new(TreeParams {
                max_depth: self.params.max_depth,
                min_samples_split: self.params.min_samples_split,
                max_features: Some(max_features),
                seed: 0,
            });
            tree.fit_samples(x, y, n_classes, samples, &mut rng)?;
            trees.push(tree);
        }

        log::debug!(
            "fitted {} trees on {n} rows x {n_features} features",
            trees.len()
        );
        self.trees = trees;
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        if self.trees.is_empty() {
            return proba;
        }
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.1;
            x.push(vec![1.0 + jitter, 1.0 - jitter, (i % 2) as f64]);
            y.push(0);
            x.push(vec![5.0 + jitter, 5.0 - jitter, (i % 2) as f64]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn test_separates_blobs() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        });
        forest.fit(&x, &y, 2).unwrap();
        assert_eq!(forest.trees().len(), 25);
        assert_eq!(forest.predict(&[1.1, 0.9, 0.0]), 0);
        assert_eq!(forest.predict(&[5.2, 4.8, 1.0]), 1);

        let proba = forest.predict_proba(&[5.0, 5.0, 0.0]);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs();
        let probe = [3.0, 3.0, 1.0];
        let fit = |seed| {
            let mut f = RandomForest::new(ForestParams {
                n_trees: 10,
                seed,
                ..ForestParams::default()
            });
            f.fit(&x, &y, 2).unwrap();
            f.predict_proba(&probe)
        };
        assert_eq!(fit(3), fit(3));
    }

    #[test]
    fn test_zero_trees_rejected() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 0,
            ..ForestParams::default()
        });
        assert!(matches!(forest.fit(&x, &y, 2), Err(PipelineError::InvalidConfig(_))));
    }
}

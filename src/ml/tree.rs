use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::Classifier;
use crate::error::PipelineError;

/// Smallest impurity decrease that counts as an improvement.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features examined per split; `None` means all of them.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART classification tree with Gini impurity.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    params: TreeParams,
    nodes: Vec<Node>,
    n_classes: usize,
}

struct FitData<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_features: usize,
}

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

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        DecisionTree {
            params,
            nodes: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Fit on a (possibly repeated) sample of row indices.
    pub(crate) fn fit_samples(
        &mut self,
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        mut samples: Vec<usize>,
        rng: &mut StdRng,
    ) -> Result<(), PipelineError> {
        if samples.is_empty() || x.len() != y.len() {
            return Err(PipelineError::InsufficientRows {
                rows: samples.len(),
                required: 1,
            });
        }
        let n_features = x[samples[0]].len();
        if let Some(bad) = samples.iter().find(|&&i| x[i].len() != n_features) {
            return Err(PipelineError::SchemaMismatch(format!(
                "row {bad} has {} features, expected {n_features}",
                x[*bad].len()
            )));
        }

        self.nodes.clear();
        self.n_classes = n_classes;
        let data = FitData { x, y, n_features };
        self.build(&data, &mut samples, 0, rng);
        Ok(())
    }

    fn push_leaf(&mut self, counts: &[usize], n: usize) -> usize {
        let proba = counts
            .iter()
            .map(|&c| if n == 0 { 0.0 } else { c as f64 / n as f64 })
            .collect();
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn build(
        &mut self,
        data: &FitData<'_>,
        samples: &mut [usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let n = samples.len();
        let mut counts = vec![0usize; self.n_classes];
        for &i in samples.iter() {
            counts[data.y[i]] += 1;
        }

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_deep = self.params.max_depth.is_some_and(|d| depth >= d);
        if pure || too_deep || n < self.params.min_samples_split.max(2) {
            return self.push_leaf(&counts, n);
        }

        let Some((feature, threshold)) = self.best_split(data, samples, &counts, rng) else {
            return self.push_leaf(&counts, n);
        };

        let mut mid = 0;
        for k in 0..n {
            if data.x[samples[k]][feature] <= threshold {
                samples.swap(mid, k);
                mid += 1;
            }
        }

        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: Vec::new() });
        let (lo, hi) = samples.split_at_mut(mid);
        let left = self.build(data, lo, depth + 1, rng);
        let right = self.build(data, hi, depth + 1, rng);
        self.nodes[at] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        at
    }

    /// Best `(feature, threshold)` by weighted child Gini, if any split
    /// lowers the impurity. Constant features do not use up the
    /// `max_features` budget.
    fn best_split(
        &self,
        data: &FitData<'_>,
        samples: &[usize],
        counts: &[usize],
        rng: &mut StdRng,
    ) -> Option<(usize, f64)> {
        let n = samples.len();
        let mut features: Vec<usize> = (0..data.n_features).collect();
        let budget = match self.params.max_features {
            Some(m) => {
                features.shuffle(rng);
                m.clamp(1, data.n_features.max(1))
            }
            None => data.n_features,
        };

        let parent = gini(counts, n);
        let mut best: Option<(f64, usize, f64)> = None;
        let mut order = samples.to_vec();
        let mut examined = 0;

        for &f in &features {
            if examined >= budget {
                break;
            }
            order.sort_by(|&a, &b| data.x[a][f].total_cmp(&data.x[b][f]));
            if data.x[order[0]][f] == data.x[order[n - 1]][f] {
                continue;
            }
            examined += 1;

            let mut left = vec![0usize; counts.len()];
            let mut right = counts.to_vec();
            for k in 0..n - 1 {
                let class = data.y[order[k]];
                left[class] += 1;
                right[class] -= 1;

                let here = data.x[order[k]][f];
                let next = data.x[order[k + 1]][f];
                if here == next {
                    continue;
                }
                let (nl, nr) = (k + 1, n - k - 1);
                let impurity =
                    (nl as f64 * gini(&left, nl) + nr as f64 * gini(&right, nr)) / n as f64;
                if best.map_or(true, |(b, _, _)| impurity < b - MIN_GAIN) {
                    let mut threshold = (here + next) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some((impurity, f, threshold));
                }
            }
        }

        best.filter(|(impurity, _, _)| *impurity < parent - MIN_GAIN)
            .map(|(_, f, t)| (f, t))
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.fit_samples(x, y, n_classes, (0..x.len()).collect(), &mut rng)
    }

    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        if self.nodes.is_empty() {
            return vec![0.0; self.n_classes];
        }
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { proba } => return proba.clone(),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    at = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

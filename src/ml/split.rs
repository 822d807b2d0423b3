use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::PipelineError;

/// Row positions of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Map positions onto other indices (e.g. rows of the source table).
    pub fn remap(&self, indices: &[usize]) -> Split {
        Split {
            train: self.train.iter().map(|&i| indices[i]).collect(),
            test: self.test.iter().map(|&i| indices[i]).collect(),
        }
    }
}

/// Shuffle `0..n` with `seed` and hold out `ceil(n * test_fraction)` rows.
///
/// Both partitions must end up non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split, PipelineError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InsufficientRows { rows: n, required: 2 });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = order.split_off(n_test);
    Ok(Split { train, test: order })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seventy_thirty() {
        let split = train_test_split(100, 0.3, 42).unwrap();
        assert_eq!(split.train.len(), 70);
        assert_eq!(split.test.len(), 30);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        assert_eq!(train_test_split(57, 0.3, 42).unwrap(), train_test_split(57, 0.3, 42).unwrap());
        assert_ne!(train_test_split(57, 0.3, 42).unwrap(), train_test_split(57, 0.3, 7).unwrap());
    }

    #[test]
    fn test_two_rows_split_one_one() {
        let split = train_test_split(2, 0.3, 42).unwrap();
        assert_eq!((split.train.len(), split.test.len()), (1, 1));
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(
            train_test_split(1, 0.3, 42),
            Err(PipelineError::InsufficientRows { .. })
        ));
    }

    #[test]
    fn test_bad_fraction() {
        assert!(matches!(
            train_test_split(10, 1.0, 42),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_remap() {
        let split = Split {
            train: vec![0, 2],
            test: vec![1],
        };
        let remapped = split.remap(&[10, 20, 30]);
        assert_eq!(remapped.train, vec![10, 30]);
        assert_eq!(remapped.test, vec![20]);
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::encoder::{FittedEncoder, InputRow, TrainingSchema, UnseenCategory};
use super::forest::{ForestParams, RandomForest};
use super::metrics::{ClassificationReport, ConfusionMatrix};
use super::split::{train_test_split, Split};
use super::tree::{DecisionTree, TreeParams};
use super::{argmax, Classifier};
use crate::data::model::{RecordTable, Value};
use crate::data::schema::{ENGAGEMENT_LEVEL, PLAYER_ID};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    RandomForest,
    DecisionTree,
}

/// Training options. Defaults predict `EngagementLevel` with a 100-tree
/// forest on a seeded 70/30 split, ignoring the player identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub target: String,
    /// Columns never used as features.
    pub exclude: Vec<String>,
    pub test_fraction: f64,
    pub seed: u64,
    pub classifier: ClassifierKind,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            target: ENGAGEMENT_LEVEL.to_string(),
            exclude: vec![PLAYER_ID.to_string()],
            test_fraction: 0.3,
            seed: 42,
            classifier: ClassifierKind::RandomForest,
            n_trees: 100,
            max_depth: None,
        }
    }
}

impl ModelConfig {
    fn build_classifier(&self) -> Box<dyn Classifier> {
        match self.classifier {
            ClassifierKind::RandomForest => Box::new(RandomForest::new(ForestParams {
                n_trees: self.n_trees,
                max_depth: self.max_depth,
                seed: self.seed,
                ..ForestParams::default()
            })),
            ClassifierKind::DecisionTree => Box::new(DecisionTree::new(TreeParams {
                max_depth: self.max_depth,
                seed: self.seed,
                ..TreeParams::default()
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub test_rows: usize,
    pub classification: ClassificationReport,
    pub confusion: ConfusionMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelProbability {
    pub label: Value,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Value,
    pub probabilities: Vec<LabelProbability>,
    /// Categorical inputs the model never saw; encoded as all zeros.
    pub unseen: Vec<UnseenCategory>,
    /// Input columns the model does not use.
    pub ignored: Vec<String>,
}

/// Shape of a training run, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub target: String,
    pub classifier: ClassifierKind,
    pub classes: Vec<Value>,
    pub features: TrainingSchema,
    pub train_rows: usize,
    pub test_rows: usize,
}

// ---------------------------------------------------------------------------
// Trained model
// ---------------------------------------------------------------------------

/// A fitted classifier together with everything needed to feed it: the
/// encoder vocabulary, the class labels and the held-out rows. Lives for
/// one session and is never persisted.
#[derive(Debug)]
pub struct TrainedModel {
    target: String,
    kind: ClassifierKind,
    encoder: FittedEncoder,
    /// Ascending; classifier outputs index into this.
    classes: Vec<Value>,
    classifier: Box<dyn Classifier>,
    /// Indices into the source table.
    split: Split,
    source_rows: usize,
    source_columns: Vec<String>,
}

fn class_index(classes: &[Value], label: &Value) -> Result<usize, PipelineError> {
    classes.binary_search(label).map_err(|_| {
        PipelineError::SchemaMismatch(format!("label '{label}' was not seen during training"))
    })
}

/// Fit a classifier that predicts `config.target` from every other column.
///
/// Fails if the target is missing, if fewer than two rows carry a target
/// value, or if the target has fewer than two distinct values.
pub fn train(table: &RecordTable, config: &ModelConfig) -> Result<TrainedModel, PipelineError> {
    let (target_col, _) = table.schema().require(&config.target)?;

    if table.len() < 2 {
        return Err(PipelineError::InsufficientRows {
            rows: table.len(),
            required: 2,
        });
    }

    let labelled: Vec<usize> = (0..table.len())
        .filter(|&r| !table.value(r, target_col).is_null())
        .collect();
    if labelled.len() < 2 {
        return Err(PipelineError::InsufficientRows {
            rows: labelled.len(),
            required: 2,
        });
    }

    let classes: Vec<Value> = table
        .unique_values(&config.target)
        .map(|set| set.iter().filter(|v| !v.is_null()).cloned().collect())
        .unwrap_or_default();
    if classes.len() < 2 {
        return Err(PipelineError::InsufficientLabelDiversity {
            column: config.target.clone(),
            distinct: classes.len(),
        });
    }

    for col in &config.exclude {
        if table.schema().index_of(col).is_none() {
            log::debug!("excluded column '{col}' is not in the table");
        }
    }

    let encoder = FittedEncoder::fit(table, &config.target, &config.exclude);
    let split =
        train_test_split(labelled.len(), config.test_fraction, config.seed)?.remap(&labelled);

    let x_train = encoder.encode_table(table, &split.train)?;
    let y_train = split
        .train
        .iter()
        .map(|&r| class_index(&classes, table.value(r, target_col)))
        .collect::<Result<Vec<usize>, PipelineError>>()?;

    let mut classifier = config.build_classifier();
    classifier.fit(&x_train, &y_train, classes.len())?;

    log::info!(
        "trained {:?} on {} rows ({} held out), {} features, classes {:?}",
        config.classifier,
        split.train.len(),
        split.test.len(),
        encoder.schema().len(),
        classes.iter().map(|c| c.to_string()).collect::<Vec<_>>()
    );

    Ok(TrainedModel {
        target: config.target.clone(),
        kind: config.classifier,
        encoder,
        classes,
        classifier,
        split,
        source_rows: table.len(),
        source_columns: table.column_names(),
    })
}

impl TrainedModel {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Labels the model can output, ascending.
    pub fn classes(&self) -> &[Value] {
        &self.classes
    }

    pub fn training_schema(&self) -> &TrainingSchema {
        self.encoder.schema()
    }

    pub fn encoder(&self) -> &FittedEncoder {
        &self.encoder
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            target: self.target.clone(),
            classifier: self.kind,
            classes: self.classes.clone(),
            features: self.encoder.schema().clone(),
            train_rows: self.split.train.len(),
            test_rows: self.split.test.len(),
        }
    }

    /// Score the held-out rows of `table`, which must be the table the
    /// model was trained on.
    pub fn evaluate(&self, table: &RecordTable) -> Result<EvaluationReport, PipelineError> {
        if table.len() != self.source_rows || table.column_names() != self.source_columns {
            return Err(PipelineError::SchemaMismatch(format!(
                "model was trained on {} rows of {:?}, got {} rows of {:?}",
                self.source_rows,
                self.source_columns,
                table.len(),
                table.column_names()
            )));
        }
        let (target_col, _) = table.schema().require(&self.target)?;

        let x_test = self.encoder.encode_table(table, &self.split.test)?;
        let truth = self
            .split
            .test
            .iter()
            .map(|&r| class_index(&self.classes, table.value(r, target_col)))
            .collect::<Result<Vec<usize>, PipelineError>>()?;
        let predicted: Vec<usize> = x_test.iter().map(|row| self.classifier.predict(row)).collect();

        let confusion = ConfusionMatrix::from_indices(self.classes.clone(), &truth, &predicted);
        let classification = ClassificationReport::from_confusion(&confusion);
        log::info!(
            "held-out accuracy {:.3} on {} rows",
            classification.accuracy,
            truth.len()
        );

        Ok(EvaluationReport {
            test_rows: truth.len(),
            classification,
            confusion,
        })
    }

    fn label_features(&self, features: &[f64]) -> (Value, Vec<LabelProbability>) {
        let proba = self.classifier.predict_proba(features);
        let label = self.classes[argmax(&proba).min(self.classes.len() - 1)].clone();
        let probabilities = self
            .classes
            .iter()
            .zip(proba)
            .map(|(label, probability)| LabelProbability {
                label: label.clone(),
                probability,
            })
            .collect();
        (label, probabilities)
    }

    /// Predict the label of one raw record.
    ///
    /// The record is encoded with the training vocabulary: absent fields are
    /// zero, extra fields are ignored and unseen categories encode as all
    /// zeros (reported in [`Prediction::unseen`]).
    pub fn predict(&self, input: &InputRow) -> Result<Prediction, PipelineError> {
        let encoded = self.encoder.encode_input(input)?;
        for miss in &encoded.unseen {
            log::warn!(
                "'{}' was never seen for column '{}' during training; encoding it as all zeros",
                miss.value,
                miss.column
            );
        }
        let (label, probabilities) = self.label_features(&encoded.features);
        Ok(Prediction {
            label,
            probabilities,
            unseen: encoded.unseen,
            ignored: encoded.ignored,
        })
    }

    /// Predict from a row that is already dummy-encoded, reindexing it onto
    /// the training schema first.
    pub fn predict_encoded(&self, encoded: &BTreeMap<String, f64>) -> Value {
        let aligned = self.encoder.schema().align(encoded);
        if !aligned.dropped.is_empty() {
            log::debug!("dropping features unknown to the model: {:?}", aligned.dropped);
        }
        self.label_features(&aligned.features).0
    }
}

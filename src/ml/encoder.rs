//! One-hot encoding with a vocabulary learned once at training time.
//!
//! The fitted encoder is reused verbatim for prediction input, so a single
//! hand-entered record always lands on the exact feature layout the
//! classifier was trained on.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::data::model::{ColumnType, RecordTable, Value};
use crate::error::PipelineError;

/// A raw, unencoded record keyed by column name.
pub type InputRow = BTreeMap<String, Value>;

/// How one source column maps onto features.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodedField {
    /// Numeric or bool column carried through as a single feature.
    Passthrough { column: String, dtype: ColumnType },
    /// Categorical column expanded to one indicator per known category.
    OneHot { column: String, categories: Vec<Value> },
}

impl EncodedField {
    pub fn column(&self) -> &str {
        match self {
            EncodedField::Passthrough { column, .. } | EncodedField::OneHot { column, .. } => {
                column
            }
        }
    }

    fn width(&self) -> usize {
        match self {
            EncodedField::Passthrough { .. } => 1,
            EncodedField::OneHot { categories, .. } => categories.len(),
        }
    }
}

/// Indicator feature name for `category` of `column`.
pub fn indicator_name(column: &str, category: &Value) -> String {
    format!("{column}_{category}")
}

// ---------------------------------------------------------------------------
// Training schema
// ---------------------------------------------------------------------------

/// The exact ordered feature names a model was fit against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TrainingSchema {
    names: Vec<String>,
}

/// A dummy-encoded row projected onto a [`TrainingSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    pub features: Vec<f64>,
    /// Input columns with no place in the schema.
    pub dropped: Vec<String>,
}

impl TrainingSchema {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Reindex an already-encoded row: reorder to the schema, fill missing
    /// features with 0 and drop unknown ones.
    pub fn align(&self, encoded: &BTreeMap<String, f64>) -> Aligned {
        let positions: HashMap<&str, usize> = self
            .names
            .iter()
            .enumerate()
            .rev()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut features = vec![0.0; self.names.len()];
        let mut dropped = Vec::new();
        for (name, value) in encoded {
            match positions.get(name.as_str()) {
                Some(&i) => features[i] = *value,
                None => dropped.push(name.clone()),
            }
        }
        Aligned { features, dropped }
    }
}

// ---------------------------------------------------------------------------
// Fitted encoder
// ---------------------------------------------------------------------------

/// Categorical value at predict time that was never seen during fitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnseenCategory {
    pub column: String,
    pub value: Value,
}

/// A prediction input row encoded against the training vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedInput {
    pub features: Vec<f64>,
    /// Encoded as all-zero indicators for their field.
    pub unseen: Vec<UnseenCategory>,
    /// Input columns the model does not use.
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedEncoder {
    fields: Vec<EncodedField>,
    schema: TrainingSchema,
}

impl FittedEncoder {
    /// Learn the feature layout of `table`, skipping `target` and `exclude`.
    ///
    /// Pass-through columns come first in schema order, followed by the
    /// indicator blocks of categorical columns in schema order. Categories
    /// are sorted ascending; nulls never get an indicator.
    pub fn fit(table: &RecordTable, target: &str, exclude: &[String]) -> Self {
        let mut passthrough = Vec::new();
        let mut one_hot = Vec::new();

        for field in table.schema().fields() {
            if field.name == target || exclude.contains(&field.name) {
                continue;
            }
            match field.dtype {
                ColumnType::Categorical => {
                    let categories = table
                        .unique_values(&field.name)
                        .map(|set| set.iter().filter(|v| !v.is_null()).cloned().collect())
                        .unwrap_or_default();
                    one_hot.push(EncodedField::OneHot {
                        column: field.name.clone(),
                        categories,
                    });
                }
                dtype => passthrough.push(EncodedField::Passthrough {
                    column: field.name.clone(),
                    dtype,
                }),
            }
        }

        let fields: Vec<EncodedField> = passthrough.into_iter().chain(one_hot).collect();
        let names = fields
            .iter()
            .flat_map(|f| match f {
                EncodedField::Passthrough { column, .. } => vec![column.clone()],
                EncodedField::OneHot { column, categories } => categories
                    .iter()
                    .map(|c| indicator_name(column, c))
                    .collect(),
            })
            .collect();

        FittedEncoder {
            fields,
            schema: TrainingSchema { names },
        }
    }

    pub fn fields(&self) -> &[EncodedField] {
        &self.fields
    }

    pub fn schema(&self) -> &TrainingSchema {
        &self.schema
    }

    /// Write one field's features into `out`. Returns `false` when a
    /// categorical value has no indicator.
    fn encode_value(
        field: &EncodedField,
        value: &Value,
        out: &mut [f64],
    ) -> Result<bool, PipelineError> {
        if value.is_null() {
            return Ok(true);
        }
        match field {
            EncodedField::Passthrough { column, dtype } => {
                let number = match dtype {
                    ColumnType::Bool => value.coerce(ColumnType::Bool).map(|v| match v {
                        Value::Bool(true) => 1.0,
                        _ => 0.0,
                    }),
                    _ => value.coerce(ColumnType::Float).and_then(|v| v.as_f64()),
                };
                match number {
                    Some(n) => {
                        out[0] = n;
                        Ok(true)
                    }
                    None => Err(PipelineError::SchemaMismatch(format!(
                        "value '{value}' for '{column}' is not {dtype}"
                    ))),
                }
            }
            EncodedField::OneHot { categories, .. } => {
                let key = value.coerce(ColumnType::Categorical).unwrap_or(Value::Null);
                match categories.binary_search(&key) {
                    Ok(i) => {
                        out[i] = 1.0;
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            }
        }
    }

    /// Encode the given rows of `table`. The table must carry every source
    /// column the encoder was fitted on.
    pub fn encode_table(
        &self,
        table: &RecordTable,
        rows: &[usize],
    ) -> Result<Vec<Vec<f64>>, PipelineError> {
        let columns = self
            .fields
            .iter()
            .map(|f| table.schema().require(f.column()).map(|(idx, _)| idx))
            .collect::<Result<Vec<usize>, PipelineError>>()?;

        rows.iter()
            .map(|&row| {
                let mut features = vec![0.0; self.schema.len()];
                let mut offset = 0;
                for (field, &col) in self.fields.iter().zip(&columns) {
                    let width = field.width();
                    let out = &mut features[offset..offset + width];
                    Self::encode_value(field, table.value(row, col), out)?;
                    offset += width;
                }
                Ok(features)
            })
            .collect()
    }

    /// Encode a hand-entered record against the learned vocabulary.
    ///
    /// Missing fields encode as zeros, unknown columns are ignored, and an
    /// unseen category leaves its field's indicators all zero.
    pub fn encode_input(&self, input: &InputRow) -> Result<EncodedInput, PipelineError> {
        let mut features = vec![0.0; self.schema.len()];
        let mut unseen = Vec::new();
        let mut offset = 0;
        for field in &self.fields {
            let width = field.width();
            if let Some(value) = input.get(field.column()) {
                let out = &mut features[offset..offset + width];
                let known = Self::encode_value(field, value, out)?;
                if !known {
                    unseen.push(UnseenCategory {
                        column: field.column().to_string(),
                        value: value.clone(),
                    });
                }
            }
            offset += width;
        }

        let ignored = input
            .keys()
            .filter(|k| !self.fields.iter().any(|f| f.column() == k.as_str()))
            .cloned()
            .collect();

        Ok(EncodedInput {
            features,
            unseen,
            ignored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players() -> RecordTable {
        let columns = ["PlayerID", "Age", "GameDifficulty", "GameGenre", "EngagementLevel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec![Value::Integer(1), Value::Integer(20), "Hard".into(), "RPG".into(), "High".into()],
            vec![
                Value::Integer(2),
                Value::Integer(35),
                "Easy".into(),
                "Sports".into(),
                "Low".into(),
            ],
            vec![Value::Integer(3), Value::Null, "Medium".into(), Value::Null, "Medium".into()],
        ];
        RecordTable::from_rows(columns, rows).unwrap()
    }

    fn encoder() -> FittedEncoder {
        FittedEncoder::fit(&players(), "EngagementLevel", &["PlayerID".to_string()])
    }

    fn row(pairs: &[(&str, Value)]) -> InputRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_feature_layout() {
        assert_eq!(
            encoder().schema().names(),
            &[
                "Age",
                "GameDifficulty_Easy",
                "GameDifficulty_Hard",
                "GameDifficulty_Medium",
                "GameGenre_RPG",
                "GameGenre_Sports",
            ]
        );
    }

    #[test]
    fn test_encode_table_nulls_are_zero() {
        let x = encoder().encode_table(&players(), &[0, 2]).unwrap();
        assert_eq!(x[0], vec![20.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(x[1], vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_encode_table_needs_source_columns() {
        let enc = encoder();
        let other =
            RecordTable::from_rows(vec!["Age".to_string()], vec![vec![Value::Integer(1)]]).unwrap();
        let err = enc.encode_table(&other, &[0]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_input_sets_one_indicator_per_field() {
        let encoded = encoder()
            .encode_input(&row(&[
                ("Age", Value::Integer(25)),
                ("GameDifficulty", "Easy".into()),
                ("GameGenre", "Sports".into()),
            ]))
            .unwrap();
        assert_eq!(encoded.features, vec![25.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(encoded.unseen.is_empty());
        assert!(encoded.ignored.is_empty());
    }

    #[test]
    fn test_input_unseen_category_is_all_zero() {
        let encoded = encoder()
            .encode_input(&row(&[
                ("GameDifficulty", "Nightmare".into()),
                ("GameGenre", "RPG".into()),
                ("Location", "Asia".into()),
            ]))
            .unwrap();
        assert_eq!(encoded.features, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            encoded.unseen,
            vec![UnseenCategory {
                column: "GameDifficulty".to_string(),
                value: "Nightmare".into()
            }]
        );
        assert_eq!(encoded.ignored, vec!["Location".to_string()]);
    }

    #[test]
    fn test_input_numeric_strings_accepted() {
        let encoded = encoder()
            .encode_input(&row(&[("Age", "41".into())]))
            .unwrap();
        assert_eq!(encoded.features[0], 41.0);

        let err = encoder()
            .encode_input(&row(&[("Age", "forty".into())]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_align_reindexes() {
        let schema = encoder().schema().clone();
        let mut dummies = BTreeMap::new();
        dummies.insert("GameGenre_RPG".to_string(), 1.0);
        dummies.insert("Age".to_string(), 30.0);
        dummies.insert("Gender_Male".to_string(), 1.0);

        let aligned = schema.align(&dummies);
        assert_eq!(aligned.features, vec![30.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(aligned.dropped, vec!["Gender_Male".to_string()]);
    }
}

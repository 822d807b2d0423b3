use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::{ColumnType, RecordTable, Value};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Filter predicate: which rows a single column lets through
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Row value must be one of `values`. An empty set matches nothing.
    Membership { values: BTreeSet<Value> },
    /// Row value must be numeric and lie within `[low, high]`.
    Range { low: f64, high: f64 },
}

impl Predicate {
    pub fn membership<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::Membership {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(low: f64, high: f64) -> Self {
        Predicate::Range { low, high }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Membership { values } => values.contains(value),
            Predicate::Range { low, high } => value
                .as_f64()
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
        }
    }

    /// Check the predicate against the column's type and convert membership
    /// values to that type, so `5` finds `5.0` in a float column and `"7"`
    /// in a categorical one. Values the column cannot hold are dropped.
    fn resolve(&self, column: &str, dtype: ColumnType) -> Result<Resolved, PipelineError> {
        match self {
            Predicate::Membership { values } => Ok(Resolved::Members(
                values.iter().filter_map(|v| v.coerce(dtype)).collect(),
            )),
            Predicate::Range { low, high } => {
                if !dtype.is_numeric() {
                    return Err(PipelineError::InvalidFilter {
                        column: column.to_string(),
                        reason: format!("range predicate on {dtype} column"),
                    });
                }
                if low.is_nan() || high.is_nan() || low > high {
                    return Err(PipelineError::InvalidFilter {
                        column: column.to_string(),
                        reason: format!("empty range [{low}, {high}]"),
                    });
                }
                Ok(Resolved::Range(Predicate::range(*low, *high)))
            }
        }
    }
}

/// A predicate bound to one column's type.
enum Resolved {
    Members(BTreeSet<Value>),
    Range(Predicate),
}

impl Resolved {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Resolved::Members(values) => values.contains(value),
            Resolved::Range(range) => range.matches(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter set: conjunction of per-column predicates
// ---------------------------------------------------------------------------

/// Per-column predicates, AND-ed together. A column absent from the set is
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    predicates: BTreeMap<String, Predicate>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, predicate: Predicate) -> Self {
        self.insert(column, predicate);
        self
    }

    /// Insert or replace the predicate for `column`.
    pub fn insert(&mut self, column: impl Into<String>, predicate: Predicate) -> Option<Predicate> {
        self.predicates.insert(column.into(), predicate)
    }

    pub fn remove(&mut self, column: &str) -> Option<Predicate> {
        self.predicates.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Predicate> {
        self.predicates.get(column)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Predicate> {
        self.predicates.get_mut(column)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.predicates.iter().map(|(c, p)| (c.as_str(), p))
    }

    /// Union of two sets; on a column present in both, `other` wins.
    pub fn merged(&self, other: &FilterSet) -> FilterSet {
        let mut out = self.clone();
        for (col, pred) in other.iter() {
            out.insert(col, pred.clone());
        }
        out
    }
}

/// Initialise a [`FilterSet`] that lets every non-null row through: all
/// values selected for categorical/bool columns, the full observed range for
/// numeric ones.
pub fn init_filter_state(table: &RecordTable) -> FilterSet {
    let mut filters = FilterSet::new();
    for field in table.schema().fields() {
        let Some(values) = table.unique_values(&field.name) else {
            continue;
        };
        if field.dtype.is_numeric() {
            let mut nums = values.iter().filter_map(Value::as_f64);
            let Some(first) = nums.next() else {
                continue;
            };
            let (low, high) = nums.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
            filters.insert(field.name.clone(), Predicate::range(low, high));
        } else {
            filters.insert(
                field.name.clone(),
                Predicate::Membership {
                    values: values.clone(),
                },
            );
        }
    }
    filters
}

/// Return indices of rows that pass all predicates, in table order.
///
/// Every filtered column must exist, and range predicates must target
/// numeric columns. An empty result is not an error.
pub fn filtered_indices(
    table: &RecordTable,
    filters: &FilterSet,
) -> Result<Vec<usize>, PipelineError> {
    let mut resolved = Vec::with_capacity(filters.len());
    for (col, pred) in filters.iter() {
        let (idx, field) = table.schema().require(col)?;
        resolved.push((idx, pred.resolve(col, field.dtype)?));
    }

    Ok(table
        .records()
        .iter()
        .enumerate()
        .filter(|(_, rec)| {
            resolved
                .iter()
                .all(|(idx, pred)| pred.matches(&rec.values[*idx]))
        })
        .map(|(i, _)| i)
        .collect())
}

/// Materialise the filtered subset as a new table.
pub fn apply(table: &RecordTable, filters: &FilterSet) -> Result<RecordTable, PipelineError> {
    if filters.is_empty() {
        return Ok(table.clone());
    }
    let indices = filtered_indices(table, filters)?;
    log::debug!("filter kept {}/{} rows", indices.len(), table.len());
    Ok(table.select(&indices))
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::model::{RecordTable, Value};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Grouped aggregates
// ---------------------------------------------------------------------------

/// Aggregation applied to each group. Sum and mean name their value column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", content = "column", rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    Sum(String),
    Mean(String),
}

/// Order of the groups in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    /// Order in which keys first occur in the table.
    #[default]
    FirstSeen,
    /// Natural key order (years, ages, labels).
    KeyAscending,
    /// Largest aggregate first; ties keep first-seen order.
    ValueDescending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry {
    pub key: Value,
    pub value: f64,
    /// Rows that fell in the group.
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedAggregate {
    pub group_column: String,
    pub aggregation: Aggregation,
    pub entries: Vec<GroupEntry>,
}

impl GroupedAggregate {
    pub fn keys(&self) -> Vec<&Value> {
        self.entries.iter().map(|e| &e.key).collect()
    }

    pub fn get(&self, key: &Value) -> Option<f64> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.value)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.value).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct Acc {
    rows: usize,
    sum: f64,
    n: usize,
}

/// Collect row indices per non-null key, in first-seen order.
fn group_rows(table: &RecordTable, key_col: usize) -> Vec<(Value, Vec<usize>)> {
    let mut index: HashMap<&Value, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<usize>)> = Vec::new();
    for (row, rec) in table.records().iter().enumerate() {
        let key = &rec.values[key_col];
        if key.is_null() {
            continue;
        }
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push((key.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row);
    }
    groups
}

fn sort_groups<T>(
    items: &mut [T],
    order: KeyOrder,
    key: impl Fn(&T) -> &Value,
    value: impl Fn(&T) -> f64,
) {
    match order {
        KeyOrder::FirstSeen => {}
        KeyOrder::KeyAscending => items.sort_by(|a, b| key(a).cmp(key(b))),
        KeyOrder::ValueDescending => items.sort_by(|a, b| value(b).total_cmp(&value(a))),
    }
}

/// Aggregate `table` per distinct value of `group_column`.
///
/// Null group keys and groups without rows are omitted, never zero-filled.
/// Nulls in the value column are skipped; a mean group with no numeric
/// values is dropped.
pub fn group_by(
    table: &RecordTable,
    group_column: &str,
    aggregation: &Aggregation,
    order: KeyOrder,
) -> Result<GroupedAggregate, PipelineError> {
    let (key_col, _) = table.schema().require(group_column)?;
    let value_col = match aggregation {
        Aggregation::Count => None,
        Aggregation::Sum(col) | Aggregation::Mean(col) => {
            Some(table.schema().require_numeric(col)?)
        }
    };

    let mut entries: Vec<GroupEntry> = group_rows(table, key_col)
        .into_iter()
        .filter_map(|(key, rows)| {
            let mut acc = Acc {
                rows: rows.len(),
                ..Acc::default()
            };
            if let Some(col) = value_col {
                let values = rows
                    .iter()
                    .filter_map(|&r| table.value(r, col).as_f64())
                    .filter(|v| !v.is_nan());
                for v in values {
                    acc.sum += v;
                    acc.n += 1;
                }
            }
            let value = match aggregation {
                Aggregation::Count => acc.rows as f64,
                Aggregation::Sum(_) => acc.sum,
                Aggregation::Mean(_) if acc.n == 0 => return None,
                Aggregation::Mean(_) => acc.sum / acc.n as f64,
            };
            Some(GroupEntry {
                key,
                value,
                rows: acc.rows,
            })
        })
        .collect();

    sort_groups(&mut entries, order, |e| &e.key, |e| e.value);

    Ok(GroupedAggregate {
        group_column: group_column.to_string(),
        aggregation: aggregation.clone(),
        entries,
    })
}

/// Row count per distinct value.
pub fn value_counts(
    table: &RecordTable,
    column: &str,
    order: KeyOrder,
) -> Result<GroupedAggregate, PipelineError> {
    group_by(table, column, &Aggregation::Count, order)
}

// ---------------------------------------------------------------------------
// Descriptive statistics
// ---------------------------------------------------------------------------

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn sorted_numbers<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<f64> {
    let mut nums: Vec<f64> = values.filter_map(Value::as_f64).filter(|v| !v.is_nan()).collect();
    nums.sort_by(f64::total_cmp);
    nums
}

/// Summary statistics of one numeric column. Statistics are `None` when the
/// column has no values (and `std` when it has fewer than two).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    fn from_sorted(column: &str, nums: &[f64]) -> Self {
        let count = nums.len();
        let mean = (count > 0).then(|| nums.iter().sum::<f64>() / count as f64);
        let std = match (mean, count) {
            (Some(m), n) if n > 1 => {
                let ss: f64 = nums.iter().map(|v| (v - m).powi(2)).sum();
                Some((ss / (n - 1) as f64).sqrt())
            }
            _ => None,
        };
        ColumnSummary {
            column: column.to_string(),
            count,
            mean,
            std,
            min: nums.first().copied(),
            q25: quantile(nums, 0.25),
            median: quantile(nums, 0.5),
            q75: quantile(nums, 0.75),
            max: nums.last().copied(),
        }
    }
}

/// One [`ColumnSummary`] per numeric column, in schema order.
pub fn describe(table: &RecordTable) -> Vec<ColumnSummary> {
    table
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.dtype.is_numeric())
        .map(|(col, f)| {
            let nums = sorted_numbers(table.records().iter().map(|r| &r.values[col]));
            ColumnSummary::from_sorted(&f.name, &nums)
        })
        .collect()
}

/// Five-number summary of a value column within one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub key: Value,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Distribution of `value_column` per group (box-plot data). Groups whose
/// values are all null are omitted. `ValueDescending` orders by median.
pub fn box_summary(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
    order: KeyOrder,
) -> Result<Vec<BoxSummary>, PipelineError> {
    let (key_col, _) = table.schema().require(group_column)?;
    let value_col = table.schema().require_numeric(value_column)?;

    let mut boxes: Vec<BoxSummary> = group_rows(table, key_col)
        .into_iter()
        .filter_map(|(key, rows)| {
            let nums = sorted_numbers(rows.iter().map(|&r| table.value(r, value_col)));
            Some(BoxSummary {
                key,
                count: nums.len(),
                min: *nums.first()?,
                q1: quantile(&nums, 0.25)?,
                median: quantile(&nums, 0.5)?,
                q3: quantile(&nums, 0.75)?,
                max: *nums.last()?,
            })
        })
        .collect();

    sort_groups(&mut boxes, order, |b| &b.key, |b| b.median);
    Ok(boxes)
}

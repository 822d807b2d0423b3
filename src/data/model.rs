use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Value – a single cell in a record table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common dataframe dtypes.
/// Used as a `BTreeMap` / `BTreeSet` key downstream so `Value` must be `Ord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

// Equality follows `Ord`, so floats compare by bit pattern like `Hash`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            // Mixed numerics compare by magnitude, integers first on ties.
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b).then(std::cmp::Ordering::Less),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)).then(std::cmp::Ordering::Greater),
            (String(a), String(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    /// Interpret the value as an `f64` (numeric columns, range filters).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert the value to the representation used by a column of `dtype`.
    ///
    /// Returns `None` when the value cannot live in such a column
    /// (e.g. a non-numeric string in a float column).
    pub fn coerce(&self, dtype: ColumnType) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }
        match dtype {
            ColumnType::Categorical => match self {
                Value::String(_) => Some(self.clone()),
                other => Some(Value::String(other.to_string())),
            },
            ColumnType::Bool => match self {
                Value::Bool(_) => Some(self.clone()),
                Value::String(s) if s == "true" || s == "false" => Some(Value::Bool(s == "true")),
                _ => None,
            },
            ColumnType::Integer => match self {
                Value::Integer(_) => Some(self.clone()),
                Value::Float(v) if v.fract() == 0.0 => Some(Value::Integer(*v as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                _ => None,
            },
            ColumnType::Float => match self {
                Value::Float(_) => Some(self.clone()),
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Schema – ordered, typed column descriptors
// ---------------------------------------------------------------------------

/// Declared type of a column, inferred once when the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Bool,
    Categorical,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Infer the narrowest type that holds every non-null value.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
        let (mut seen, mut bools, mut ints, mut floats) = (0usize, 0usize, 0usize, 0usize);
        for v in values {
            match v {
                Value::Null => continue,
                Value::Bool(_) => bools += 1,
                Value::Integer(_) => ints += 1,
                Value::Float(_) => floats += 1,
                Value::String(_) => {}
            }
            seen += 1;
        }
        if seen == 0 {
            ColumnType::Categorical
        } else if bools == seen {
            ColumnType::Bool
        } else if ints == seen {
            ColumnType::Integer
        } else if ints + floats == seen {
            ColumnType::Float
        } else {
            ColumnType::Categorical
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Categorical => "categorical",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: ColumnType,
}

/// Ordered list of `(name, type)` pairs. All column access goes through it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self, PipelineError> {
        let mut names = BTreeSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }
        Ok(Schema { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Look up a column, failing with [`PipelineError::MissingColumn`].
    pub fn require(&self, name: &str) -> Result<(usize, &Field), PipelineError> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Like [`Schema::require`] but also checks the column is numeric.
    pub fn require_numeric(&self, name: &str) -> Result<usize, PipelineError> {
        let (idx, field) = self.require(name)?;
        if !field.dtype.is_numeric() {
            return Err(PipelineError::ColumnType {
                column: name.to_string(),
                expected: "numeric".to_string(),
                actual: field.dtype,
            });
        }
        Ok(idx)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// RecordTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// One row, aligned positionally with the table's [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    pub values: Vec<Value>,
}

/// The full parsed dataset with pre-computed column indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    schema: Schema,
    records: Vec<Record>,
    /// For each column the sorted set of unique values.
    unique_values: BTreeMap<String, BTreeSet<Value>>,
}

impl RecordTable {
    /// Build a table from raw rows, inferring and normalising column types.
    ///
    /// Every row must have exactly `columns.len()` cells.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, PipelineError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "row {i} has {} cells but there are {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }

        let fields = columns
            .into_iter()
            .enumerate()
            .map(|(col, name)| Field {
                name,
                dtype: ColumnType::infer(rows.iter().map(|r| &r[col])),
            })
            .collect();
        let schema = Schema::new(fields)?;

        let records = rows
            .into_iter()
            .map(|row| Record {
                values: row
                    .into_iter()
                    .zip(schema.fields())
                    .map(|(v, f)| v.coerce(f.dtype).unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();

        Ok(Self::with_schema(schema, records))
    }

    /// Assemble a table whose records are already normalised to `schema`.
    fn with_schema(schema: Schema, records: Vec<Record>) -> Self {
        let mut unique_values: BTreeMap<String, BTreeSet<Value>> = schema
            .names()
            .map(|n| (n.to_string(), BTreeSet::new()))
            .collect();
        for rec in &records {
            for (field, val) in schema.fields().iter().zip(&rec.values) {
                if let Some(set) = unique_values.get_mut(&field.name) {
                    set.insert(val.clone());
                }
            }
        }
        RecordTable {
            schema,
            records,
            unique_values,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.names().map(str::to_string).collect()
    }

    pub fn unique_values(&self, column: &str) -> Option<&BTreeSet<Value>> {
        self.unique_values.get(column)
    }

    /// Cell at `(row, col)`; `col` is a schema index.
    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.records[row].values[col]
    }

    /// All values of one column in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, PipelineError> {
        let (idx, _) = self.schema.require(name)?;
        Ok(self.records.iter().map(|r| &r.values[idx]).collect())
    }

    /// Order-preserving subset of rows. Out-of-range indices are skipped.
    pub fn select(&self, indices: &[usize]) -> RecordTable {
        let records = indices
            .iter()
            .filter_map(|&i| self.records.get(i).cloned())
            .collect();
        Self::with_schema(self.schema.clone(), records)
    }

    /// The first `n` records (fewer if the table is shorter).
    pub fn head(&self, n: usize) -> &[Record] {
        &self.records[..n.min(self.records.len())]
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

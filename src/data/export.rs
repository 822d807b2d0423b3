use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::model::{ColumnType, RecordTable, Value};

/// Write a table to `path`, choosing the format from the extension.
pub fn write_file(table: &RecordTable, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "parquet" | "pq" => write_parquet(table, path),
        "csv" => write_csv(table, path),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

/// CSV with a header row; nulls become empty cells.
pub fn write_csv(table: &RecordTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    writer
        .write_record(table.schema().names())
        .context("writing CSV header")?;
    for rec in table.records() {
        writer
            .write_record(rec.values.iter().map(|v| match v {
                Value::Null => String::new(),
                other => other.to_string(),
            }))
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV file")?;
    Ok(())
}

fn column_array(table: &RecordTable, col: usize, dtype: ColumnType) -> ArrayRef {
    let cells = table.records().iter().map(|r| &r.values[col]);
    match dtype {
        ColumnType::Integer => Arc::new(Int64Array::from(
            cells
                .map(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            cells.map(Value::as_f64).collect::<Vec<_>>(),
        )),
        ColumnType::Bool => Arc::new(BooleanArray::from(
            cells
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Categorical => Arc::new(StringArray::from(
            cells
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Single-batch Parquet file with one nullable Arrow column per field.
pub fn write_parquet(table: &RecordTable, path: &Path) -> Result<()> {
    let fields: Vec<Field> = table
        .schema()
        .fields()
        .iter()
        .map(|f| {
            let dtype = match f.dtype {
                ColumnType::Integer => DataType::Int64,
                ColumnType::Float => DataType::Float64,
                ColumnType::Bool => DataType::Boolean,
                ColumnType::Categorical => DataType::Utf8,
            };
            Field::new(f.name.as_str(), dtype, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let columns: Vec<ArrayRef> = table
        .schema()
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| column_array(table, i, f.dtype))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

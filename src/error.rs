use thiserror::Error;

use crate::data::model::ColumnType;

/// Recoverable failures of a single pipeline section.
///
/// None of these abort a run: the runner records them against the section
/// that produced them and carries on with the rest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    #[error("column '{column}' is {actual}, expected {expected}")]
    ColumnType {
        column: String,
        expected: String,
        actual: ColumnType,
    },

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("target column '{column}' has {distinct} distinct value(s), at least 2 are required")]
    InsufficientLabelDiversity { column: String, distinct: usize },

    #[error("{rows} usable row(s), at least {required} are required")]
    InsufficientRows { rows: usize, required: usize },

    #[error("invalid filter on '{column}': {reason}")]
    InvalidFilter { column: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

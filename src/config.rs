use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregation, KeyOrder};
use crate::data::filter::FilterSet;
use crate::data::generator::DEFAULT_SEED;
use crate::data::model::Value;
use crate::data::schema::{DatasetKind, ENGAGEMENT_LEVEL};
use crate::ml::encoder::InputRow;
use crate::ml::model::ModelConfig;

/// Rows synthesised when no file is given.
pub const DEFAULT_ROWS: usize = 500;

/// Rows shown in the data preview.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

fn default_rows() -> usize {
    DEFAULT_ROWS
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_true() -> bool {
    true
}

/// Where the record table comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// CSV, JSON or Parquet file.
    File { path: PathBuf },
    /// Seeded synthetic table of the configured dataset kind.
    Synthetic {
        #[serde(default = "default_rows")]
        rows: usize,
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic {
            rows: DEFAULT_ROWS,
            seed: DEFAULT_SEED,
        }
    }
}

/// One grouped aggregate to compute over the filtered table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub group_column: String,
    #[serde(default = "count")]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub order: KeyOrder,
}

fn count() -> Aggregation {
    Aggregation::Count
}

impl AggregationRequest {
    pub fn new(group_column: &str, aggregation: Aggregation, order: KeyOrder) -> Self {
        AggregationRequest {
            group_column: group_column.to_string(),
            aggregation,
            order,
        }
    }
}

/// Distribution of a numeric column per group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRequest {
    pub group_column: String,
    pub value_column: String,
    #[serde(default)]
    pub order: KeyOrder,
}

/// Everything one pipeline run needs. Missing sections in a config file
/// fall back to the defaults below; `model: null` skips the model stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetKind,
    pub source: SourceConfig,
    pub filters: FilterSet,
    pub aggregations: Vec<AggregationRequest>,
    pub boxes: Vec<BoxRequest>,
    #[serde(default = "default_true")]
    pub describe: bool,
    /// Leading rows of the filtered table to include in the report.
    pub sample_rows: usize,
    pub model: Option<ModelConfig>,
    /// Raw record to classify once the model is trained.
    pub predict: Option<InputRow>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::player_dashboard()
    }
}

impl PipelineConfig {
    /// Player-engagement dashboard: genre and engagement distributions,
    /// playtime by engagement level, and an engagement classifier applied
    /// to one sample player.
    pub fn player_dashboard() -> Self {
        let predict: InputRow = [
            ("Age", Value::Integer(25)),
            ("PlayTimeHours", Value::Float(50.0)),
            ("InGamePurchases", Value::Integer(0)),
            ("SessionsPerWeek", Value::Integer(10)),
            ("GameDifficulty", Value::from("Easy")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        PipelineConfig {
            dataset: DatasetKind::PlayerEngagement,
            source: SourceConfig::default(),
            filters: FilterSet::new(),
            aggregations: vec![
                AggregationRequest::new(
                    "GameGenre",
                    Aggregation::Count,
                    KeyOrder::ValueDescending,
                ),
                AggregationRequest::new(
                    ENGAGEMENT_LEVEL,
                    Aggregation::Count,
                    KeyOrder::ValueDescending,
                ),
                AggregationRequest::new(
                    "GameGenre",
                    Aggregation::Mean("PlayTimeHours".to_string()),
                    KeyOrder::FirstSeen,
                ),
                AggregationRequest::new("Age", Aggregation::Count, KeyOrder::KeyAscending),
            ],
            boxes: vec![BoxRequest {
                group_column: ENGAGEMENT_LEVEL.to_string(),
                value_column: "PlayTimeHours".to_string(),
                order: KeyOrder::KeyAscending,
            }],
            describe: true,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            model: Some(ModelConfig::default()),
            predict: Some(predict),
        }
    }

    /// Game-sales dashboard: sales by genre and platform, releases per year.
    pub fn sales_dashboard() -> Self {
        PipelineConfig {
            dataset: DatasetKind::GameSales,
            source: SourceConfig::default(),
            filters: FilterSet::new(),
            aggregations: vec![
                AggregationRequest::new(
                    "Genre",
                    Aggregation::Sum("Global_Sales".to_string()),
                    KeyOrder::ValueDescending,
                ),
                AggregationRequest::new(
                    "Platform",
                    Aggregation::Sum("Global_Sales".to_string()),
                    KeyOrder::ValueDescending,
                ),
                AggregationRequest::new("Year", Aggregation::Count, KeyOrder::KeyAscending),
                AggregationRequest::new(
                    "Genre",
                    Aggregation::Mean("Critic_Score".to_string()),
                    KeyOrder::FirstSeen,
                ),
            ],
            boxes: vec![BoxRequest {
                group_column: "Platform".to_string(),
                value_column: "Global_Sales".to_string(),
                order: KeyOrder::KeyAscending,
            }],
            describe: true,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            model: None,
            predict: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing pipeline config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json(&text).with_context(|| format!("in {}", path.display()))?;
        log::info!("loaded pipeline config from {}", path.display());
        Ok(config)
    }
}

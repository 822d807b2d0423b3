//! One full run: Source → Filter → {Aggregation, Model}.
//!
//! Every section's result is captured as an [`Outcome`], so a failing chart
//! or a model that cannot train is reported next to the sections that did
//! work instead of aborting the run.

use std::fmt::Display;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::aggregate::{
    box_summary, describe, group_by, BoxSummary, ColumnSummary, GroupedAggregate,
};
use crate::config::{BoxRequest, PipelineConfig, SourceConfig};
use crate::data::cache::SourceCache;
use crate::data::filter::FilterSet;
use crate::data::generator::generate;
use crate::data::model::{Field, Record, RecordTable};
use crate::data::schema::{DatasetKind, SchemaReport};
use crate::error::PipelineError;
use crate::ml::model::{EvaluationReport, Prediction, TrainingSummary};
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Section outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok(T),
    Failed { error: String },
}

impl<T> Outcome<T> {
    /// Capture a section result, logging the failure under `section`.
    pub fn capture<E: Display>(section: &str, result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(e) => {
                let error = e.to_string();
                log::error!("{section}: {error}");
                Outcome::Failed { error }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Failed { error } => Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub dataset: DatasetKind,
    pub description: String,
    pub rows: usize,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSummary {
    pub total_rows: usize,
    pub visible_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxGroups {
    pub group_column: String,
    pub value_column: String,
    pub groups: Vec<BoxSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    pub summary: TrainingSummary,
    pub evaluation: EvaluationReport,
}

/// Plain data for the presentation layer. Sections after a failed source
/// are left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub source: Outcome<SourceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Outcome<SchemaReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Outcome<FilterSummary>>,
    /// Leading rows of the filtered table, in `source.fields` order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<Record>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Outcome<GroupedAggregate>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<Outcome<BoxGroups>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub describe: Option<Vec<ColumnSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Outcome<ModelReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Outcome<Prediction>>,
}

impl DashboardReport {
    fn source_failed(error: String) -> Self {
        DashboardReport {
            source: Outcome::Failed { error },
            schema: None,
            filter: None,
            sample: Vec::new(),
            aggregations: Vec::new(),
            boxes: Vec::new(),
            describe: None,
            model: None,
            prediction: None,
        }
    }

    /// Errors of every failed section, labelled by section.
    pub fn failures(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut note = |name: String, error: Option<&str>| {
            if let Some(e) = error {
                out.push((name, e.to_string()));
            }
        };
        note("source".to_string(), self.source.error());
        note("schema".to_string(), self.schema.as_ref().and_then(Outcome::error));
        note("filter".to_string(), self.filter.as_ref().and_then(Outcome::error));
        for (i, agg) in self.aggregations.iter().enumerate() {
            note(format!("aggregations[{i}]"), agg.error());
        }
        for (i, b) in self.boxes.iter().enumerate() {
            note(format!("boxes[{i}]"), b.error());
        }
        note("model".to_string(), self.model.as_ref().and_then(Outcome::error));
        note("prediction".to_string(), self.prediction.as_ref().and_then(Outcome::error));
        out
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Load the configured table, through `cache` for files.
pub fn load_source(
    config: &PipelineConfig,
    cache: &mut SourceCache,
) -> Result<(Arc<RecordTable>, String)> {
    match &config.source {
        SourceConfig::File { path } => Ok((cache.load(path)?, path.display().to_string())),
        SourceConfig::Synthetic { rows, seed } => {
            let table = generate(config.dataset, *rows, *seed)?;
            log::info!("generated {rows} synthetic {:?} rows (seed {seed})", config.dataset);
            Ok((Arc::new(table), format!("synthetic (seed {seed})")))
        }
    }
}

fn box_section(table: &RecordTable, request: &BoxRequest) -> Outcome<BoxGroups> {
    let result = box_summary(
        table,
        &request.group_column,
        &request.value_column,
        request.order,
    )
    .map(|groups| BoxGroups {
        group_column: request.group_column.clone(),
        value_column: request.value_column.clone(),
        groups,
    });
    let section = format!("box {}/{}", request.group_column, request.value_column);
    Outcome::capture(&section, result)
}

/// Run every configured section once and collect the results.
pub fn run(config: &PipelineConfig, cache: &mut SourceCache) -> DashboardReport {
    let (dataset, description) = match load_source(config, cache) {
        Ok(loaded) => loaded,
        Err(e) => {
            let error = format!("{e:#}");
            log::error!("source: {error}");
            return DashboardReport::source_failed(error);
        }
    };

    let source = Outcome::Ok(SourceSummary {
        dataset: config.dataset,
        description,
        rows: dataset.len(),
        fields: dataset.schema().fields().to_vec(),
    });
    let schema = Outcome::capture("schema", config.dataset.validate(&dataset).into_result());

    let mut state = PipelineState::new();
    state.set_dataset(Arc::clone(&dataset));
    state.filters = config.filters.clone();
    let filter = Outcome::capture(
        "filter",
        state.refilter().map(|()| FilterSummary {
            total_rows: dataset.len(),
            visible_rows: state.visible_indices.len(),
        }),
    );
    if !filter.is_ok() {
        // Downstream sections see the unfiltered table.
        state.filters = FilterSet::new();
        state.visible_indices = (0..dataset.len()).collect();
    }
    if state.visible_indices.is_empty() {
        log::warn!("filters matched no rows");
    }

    let table = match state.filtered_table() {
        Ok(table) => table,
        Err(e) => return DashboardReport::source_failed(e.to_string()),
    };

    let sample = table.head(config.sample_rows).to_vec();
    let aggregations = config
        .aggregations
        .iter()
        .map(|req| {
            Outcome::capture(
                &format!("aggregate {}", req.group_column),
                group_by(&table, &req.group_column, &req.aggregation, req.order),
            )
        })
        .collect();
    let boxes = config.boxes.iter().map(|req| box_section(&table, req)).collect();
    let describe = config.describe.then(|| describe(&table));

    let mut model = None;
    let mut prediction = None;
    if let Some(model_config) = &config.model {
        let trained = state.train(model_config).and_then(|evaluation| {
            let summary = state
                .model
                .as_ref()
                .map(|m| m.summary())
                .ok_or_else(|| PipelineError::EmptyResult("no trained model".to_string()))?;
            Ok(ModelReport { summary, evaluation })
        });
        model = Some(Outcome::capture("model", trained));

        if let Some(input) = &config.predict {
            prediction = Some(Outcome::capture("prediction", state.predict(input)));
        }
    }

    let report = DashboardReport {
        source,
        schema: Some(schema),
        filter: Some(filter),
        sample,
        aggregations,
        boxes,
        describe,
        model,
        prediction,
    };
    let failures = report.failures();
    if failures.is_empty() {
        log::info!("pipeline finished, all sections ok");
    } else {
        log::info!("pipeline finished, {} section(s) failed", failures.len());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregation, KeyOrder};
    use crate::config::{AggregationRequest, DEFAULT_SAMPLE_ROWS};
    use crate::data::model::Value;
    use crate::data::filter::Predicate;
    use crate::ml::model::ModelConfig;

    fn small_player_config() -> PipelineConfig {
        PipelineConfig {
            source: SourceConfig::Synthetic { rows: 80, seed: 42 },
            model: Some(ModelConfig {
                n_trees: 10,
                ..ModelConfig::default()
            }),
            ..PipelineConfig::player_dashboard()
        }
    }

    #[test]
    fn test_player_dashboard_runs_clean() {
        let report = run(&small_player_config(), &mut SourceCache::new());
        assert!(report.failures().is_empty(), "{:?}", report.failures());
        assert_eq!(report.aggregations.len(), 4);
        assert_eq!(report.filter.as_ref().and_then(Outcome::ok).unwrap().visible_rows, 80);
        let model = report.model.as_ref().and_then(Outcome::ok).unwrap();
        assert_eq!(model.evaluation.test_rows, 24);
        assert!(report.prediction.as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_sample_holds_leading_filtered_rows() {
        let mut config = small_player_config();
        config.model = None;
        config.filters = FilterSet::new().with("GameDifficulty", Predicate::membership(["Hard"]));
        let report = run(&config, &mut SourceCache::new());

        assert_eq!(report.sample.len(), DEFAULT_SAMPLE_ROWS);
        let fields = &report.source.ok().unwrap().fields;
        let difficulty = fields.iter().position(|f| f.name == "GameDifficulty").unwrap();
        assert!(report
            .sample
            .iter()
            .all(|r| r.values[difficulty] == Value::from("Hard")));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["sample"][0].is_array());
    }

    #[test]
    fn test_sales_dashboard_has_no_model() {
        let config = PipelineConfig {
            source: SourceConfig::Synthetic { rows: 50, seed: 1 },
            ..PipelineConfig::sales_dashboard()
        };
        let report = run(&config, &mut SourceCache::new());
        assert!(report.failures().is_empty(), "{:?}", report.failures());
        assert!(report.model.is_none());
        assert!(report.prediction.is_none());
    }

    #[test]
    fn test_failing_section_does_not_stop_siblings() {
        let mut config = small_player_config();
        config.aggregations = vec![
            AggregationRequest::new("NoSuchColumn", Aggregation::Count, KeyOrder::FirstSeen),
            AggregationRequest::new(
                "GameGenre",
                Aggregation::Sum("Gender".to_string()),
                KeyOrder::FirstSeen,
            ),
            AggregationRequest::new("GameGenre", Aggregation::Count, KeyOrder::FirstSeen),
        ];
        config.model = Some(ModelConfig {
            target: "Missing".to_string(),
            ..ModelConfig::default()
        });

        let report = run(&config, &mut SourceCache::new());
        assert!(!report.aggregations[0].is_ok());
        assert!(!report.aggregations[1].is_ok());
        assert!(report.aggregations[2].is_ok());
        assert!(!report.model.as_ref().unwrap().is_ok());
        // No model, so nothing to predict with.
        assert!(!report.prediction.as_ref().unwrap().is_ok());
        assert!(report.describe.is_some());
    }

    #[test]
    fn test_missing_file_fails_only_source() {
        let config = PipelineConfig {
            source: SourceConfig::File {
                path: "/no/such/players.csv".into(),
            },
            ..PipelineConfig::player_dashboard()
        };
        let report = run(&config, &mut SourceCache::new());
        assert!(report.source.error().is_some());
        assert!(report.schema.is_none());
        assert!(report.aggregations.is_empty());
        assert_eq!(report.failures().len(), 1);
    }

    #[test]
    fn test_empty_filter_result_is_not_fatal() {
        let mut config = small_player_config();
        config.filters =
            FilterSet::new().with("GameGenre", Predicate::membership(Vec::<&str>::new()));
        let report = run(&config, &mut SourceCache::new());

        assert_eq!(report.filter.as_ref().and_then(Outcome::ok).unwrap().visible_rows, 0);
        for agg in &report.aggregations {
            assert!(agg.ok().unwrap().is_empty());
        }
        assert!(!report.model.as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_invalid_filter_falls_back_to_all_rows() {
        let mut config = small_player_config();
        config.filters = FilterSet::new().with("Gender", Predicate::range(0.0, 1.0));
        let report = run(&config, &mut SourceCache::new());
        assert!(!report.filter.as_ref().unwrap().is_ok());
        let genres = report.aggregations[0].ok().unwrap();
        assert_eq!(genres.total(), 80.0);
    }

    #[test]
    fn test_schema_mismatch_is_reported() {
        let config = PipelineConfig {
            dataset: DatasetKind::GameSales,
            ..small_player_config()
        };
        // Generates a sales table, so only the player-specific sections fail.
        let report = run(&config, &mut SourceCache::new());
        assert!(report.schema.as_ref().unwrap().is_ok());
        assert!(!report.aggregations[0].is_ok());
    }
}

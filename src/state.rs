use std::collections::BTreeSet;
use std::sync::Arc;

use crate::data::filter::{filtered_indices, init_filter_state, FilterSet, Predicate};
use crate::data::model::{RecordTable, Value};
use crate::error::PipelineError;
use crate::ml::encoder::InputRow;
use crate::ml::model::{train, EvaluationReport, ModelConfig, Prediction, TrainedModel};

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Session state held by the caller and passed between stages. Nothing here
/// is global; dropping the state ends the session.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Loaded dataset (None until a source is set).
    pub dataset: Option<Arc<RecordTable>>,

    /// Per-column filter predicates.
    pub filters: FilterSet,

    /// Indices of rows passing the current filters (cached).
    pub visible_indices: Vec<usize>,

    /// Model trained on the filtered table, if any.
    pub model: Option<TrainedModel>,

    /// Status / error message for the presentation layer.
    pub status_message: Option<String>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a newly loaded dataset and open every filter.
    pub fn set_dataset(&mut self, dataset: Arc<RecordTable>) {
        self.filters = init_filter_state(&dataset);
        self.visible_indices = (0..dataset.len()).collect();
        self.model = None;
        self.status_message = Some(format!(
            "{} rows x {} columns",
            dataset.len(),
            dataset.schema().len()
        ));
        self.dataset = Some(dataset);
    }

    fn dataset(&self) -> Result<&Arc<RecordTable>, PipelineError> {
        self.dataset
            .as_ref()
            .ok_or_else(|| PipelineError::EmptyResult("no dataset loaded".to_string()))
    }

    /// Recompute `visible_indices` after a filter change. On error the
    /// previous selection is kept and the message recorded.
    pub fn refilter(&mut self) -> Result<(), PipelineError> {
        let Some(ds) = &self.dataset else {
            return Ok(());
        };
        match filtered_indices(ds, &self.filters) {
            Ok(indices) => {
                log::debug!("{} of {} rows visible", indices.len(), ds.len());
                self.visible_indices = indices;
                self.status_message = None;
                Ok(())
            }
            Err(e) => {
                self.status_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn set_filter(&mut self, column: &str, predicate: Predicate) -> Result<(), PipelineError> {
        self.filters.insert(column, predicate);
        self.refilter()
    }

    /// Drop the predicate on `column`, leaving it unconstrained.
    pub fn clear_filter(&mut self, column: &str) -> Result<(), PipelineError> {
        self.filters.remove(column);
        self.refilter()
    }

    /// Toggle a single value in a column's membership filter. A column that
    /// had no membership filter starts from an empty selection.
    pub fn toggle_filter_value(
        &mut self,
        column: &str,
        value: &Value,
    ) -> Result<(), PipelineError> {
        if !matches!(self.filters.get(column), Some(Predicate::Membership { .. })) {
            self.filters.insert(column, Predicate::Membership { values: BTreeSet::new() });
        }
        if let Some(Predicate::Membership { values }) = self.filters.get_mut(column) {
            if !values.remove(value) {
                values.insert(value.clone());
            }
        }
        self.refilter()
    }

    /// Select all values in a column.
    pub fn select_all(&mut self, column: &str) -> Result<(), PipelineError> {
        let all = self
            .dataset()?
            .unique_values(column)
            .cloned()
            .ok_or_else(|| PipelineError::MissingColumn {
                column: column.to_string(),
            })?;
        self.filters.insert(column, Predicate::Membership { values: all });
        self.refilter()
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) -> Result<(), PipelineError> {
        self.filters.insert(column, Predicate::Membership { values: BTreeSet::new() });
        self.refilter()
    }

    /// The visible rows as their own table.
    pub fn filtered_table(&self) -> Result<RecordTable, PipelineError> {
        Ok(self.dataset()?.select(&self.visible_indices))
    }

    /// Train on the filtered table and evaluate on its held-out rows. The
    /// previous model is kept if training fails.
    pub fn train(&mut self, config: &ModelConfig) -> Result<EvaluationReport, PipelineError> {
        let table = self.filtered_table()?;
        let result = train(&table, config).and_then(|model| {
            let report = model.evaluate(&table)?;
            Ok((model, report))
        });
        match result {
            Ok((model, report)) => {
                self.status_message = Some(format!(
                    "trained on {} rows, accuracy {:.3}",
                    model.split().train.len(),
                    report.classification.accuracy
                ));
                self.model = Some(model);
                Ok(report)
            }
            Err(e) => {
                self.status_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn predict(&self, input: &InputRow) -> Result<Prediction, PipelineError> {
        self.model
            .as_ref()
            .ok_or_else(|| PipelineError::EmptyResult("no trained model".to_string()))?
            .predict(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generator::generate_players;

    fn loaded() -> PipelineState {
        let mut state = PipelineState::new();
        state.set_dataset(Arc::new(generate_players(60, 3).unwrap()));
        state
    }

    #[test]
    fn test_set_dataset_shows_everything() {
        let state = loaded();
        assert_eq!(state.visible_indices.len(), 60);
        assert!(state.filters.get("GameGenre").is_some());
        assert!(state.model.is_none());
    }

    #[test]
    fn test_select_none_then_toggle() {
        let mut state = loaded();
        state.select_none("GameDifficulty").unwrap();
        assert!(state.visible_indices.is_empty());

        state.toggle_filter_value("GameDifficulty", &"Hard".into()).unwrap();
        let table = state.filtered_table().unwrap();
        assert!(!table.is_empty());
        assert!(table
            .column("GameDifficulty")
            .unwrap()
            .iter()
            .all(|v| **v == Value::from("Hard")));

        state.toggle_filter_value("GameDifficulty", &"Hard".into()).unwrap();
        assert!(state.visible_indices.is_empty());

        state.select_all("GameDifficulty").unwrap();
        assert_eq!(state.visible_indices.len(), 60);
    }

    #[test]
    fn test_bad_filter_keeps_previous_rows() {
        let mut state = loaded();
        let err = state.set_filter("GameGenre", Predicate::range(0.0, 1.0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFilter { .. }));
        assert_eq!(state.visible_indices.len(), 60);
        assert!(state.status_message.is_some());

        state.clear_filter("GameGenre").unwrap();
        assert_eq!(state.visible_indices.len(), 60);
    }

    #[test]
    fn test_train_then_predict() {
        let mut state = loaded();
        assert!(state.predict(&InputRow::new()).is_err());

        let config = ModelConfig {
            n_trees: 10,
            ..ModelConfig::default()
        };
        let report = state.train(&config).unwrap();
        assert_eq!(report.test_rows, 18);

        let prediction = state.predict(&InputRow::new()).unwrap();
        assert!(state.model.as_ref().unwrap().classes().contains(&prediction.label));
    }

    #[test]
    fn test_failed_training_keeps_session() {
        let mut state = loaded();
        state.select_none("EngagementLevel").unwrap();
        assert!(state.train(&ModelConfig::default()).is_err());
        assert!(state.model.is_none());
        assert!(state.status_message.is_some());
    }

    #[test]
    fn test_no_dataset() {
        let mut state = PipelineState::new();
        assert!(state.refilter().is_ok());
        assert!(state.filtered_table().is_err());
        assert!(state.select_all("Age").is_err());
    }
}

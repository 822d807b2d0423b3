use serde::{Deserialize, Serialize};

use super::model::{ColumnType, RecordTable};
use crate::error::PipelineError;

/// The two dataset layouts the dashboards understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    PlayerEngagement,
    GameSales,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Numeric,
    Categorical,
    Any,
}

impl Expect {
    fn accepts(self, dtype: ColumnType) -> bool {
        match self {
            Expect::Numeric => dtype.is_numeric(),
            // Numeric codes are acceptable category labels.
            Expect::Categorical | Expect::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExpectedColumn {
    pub name: &'static str,
    pub expect: Expect,
    pub required: bool,
}

const fn col(name: &'static str, expect: Expect, required: bool) -> ExpectedColumn {
    ExpectedColumn {
        name,
        expect,
        required,
    }
}

pub const PLAYER_ID: &str = "PlayerID";
pub const ENGAGEMENT_LEVEL: &str = "EngagementLevel";

const PLAYER_COLUMNS: &[ExpectedColumn] = &[
    col(PLAYER_ID, Expect::Any, true),
    col("Age", Expect::Numeric, true),
    col("Gender", Expect::Categorical, false),
    col("Location", Expect::Categorical, false),
    col("GameGenre", Expect::Categorical, true),
    col("PlayTimeHours", Expect::Numeric, true),
    col("InGamePurchases", Expect::Numeric, true),
    col("GameDifficulty", Expect::Categorical, true),
    col("SessionsPerWeek", Expect::Numeric, true),
    col("AvgSessionDurationMinutes", Expect::Numeric, false),
    col("PlayerLevel", Expect::Numeric, false),
    col("AchievementsUnlocked", Expect::Numeric, false),
    col(ENGAGEMENT_LEVEL, Expect::Categorical, true),
];

const SALES_COLUMNS: &[ExpectedColumn] = &[
    col("Name", Expect::Categorical, true),
    col("Platform", Expect::Categorical, true),
    col("Year", Expect::Numeric, true),
    col("Genre", Expect::Categorical, true),
    col("NA_Sales", Expect::Numeric, true),
    col("EU_Sales", Expect::Numeric, true),
    col("JP_Sales", Expect::Numeric, true),
    col("Other_Sales", Expect::Numeric, true),
    col("Global_Sales", Expect::Numeric, true),
    col("Critic_Score", Expect::Numeric, true),
];

impl DatasetKind {
    pub fn columns(self) -> &'static [ExpectedColumn] {
        match self {
            DatasetKind::PlayerEngagement => PLAYER_COLUMNS,
            DatasetKind::GameSales => SALES_COLUMNS,
        }
    }

    /// Check a loaded table against this layout.
    pub fn validate(self, table: &RecordTable) -> SchemaReport {
        let mut report = SchemaReport::default();
        for expected in self.columns() {
            match table.schema().require(expected.name) {
                Ok((_, field)) => {
                    if !expected.expect.accepts(field.dtype) {
                        report.mistyped.push(MistypedColumn {
                            column: expected.name.to_string(),
                            actual: field.dtype,
                        });
                    }
                }
                Err(_) if expected.required => report.missing.push(expected.name.to_string()),
                Err(_) => {}
            }
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MistypedColumn {
    pub column: String,
    pub actual: ColumnType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaReport {
    pub missing: Vec<String>,
    pub mistyped: Vec<MistypedColumn>,
}

impl SchemaReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.mistyped.is_empty()
    }

    /// Turn the first problem into an error, or pass the report through.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if let Some(column) = self.missing.first() {
            return Err(PipelineError::MissingColumn {
                column: column.clone(),
            });
        }
        if let Some(bad) = self.mistyped.first() {
            return Err(PipelineError::ColumnType {
                column: bad.column.clone(),
                expected: "numeric".to_string(),
                actual: bad.actual,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generator::{generate_players, generate_sales};
    use crate::data::model::Value;

    #[test]
    fn test_generated_tables_conform() {
        assert!(DatasetKind::PlayerEngagement.validate(&generate_players(20, 1).unwrap()).is_ok());
        assert!(DatasetKind::GameSales.validate(&generate_sales(20, 1).unwrap()).is_ok());
    }

    #[test]
    fn test_missing_and_mistyped_columns() {
        let table = RecordTable::from_rows(
            vec!["Name".to_string(), "Year".to_string()],
            vec![vec!["Tetris".into(), "unknown".into()]],
        )
        .unwrap();
        let report = DatasetKind::GameSales.validate(&table);
        assert!(!report.is_ok());
        assert!(report.missing.contains(&"Platform".to_string()));
        assert_eq!(report.mistyped[0].column, "Year");

        let err = report.into_result().unwrap_err();
        assert_eq!(
            err,
            PipelineError::MissingColumn {
                column: "Platform".to_string()
            }
        );
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let names = [
            "PlayerID",
            "Age",
            "GameGenre",
            "PlayTimeHours",
            "InGamePurchases",
            "GameDifficulty",
            "SessionsPerWeek",
            "EngagementLevel",
        ];
        let row: Vec<Value> = vec![
            Value::Integer(1),
            Value::Integer(30),
            "RPG".into(),
            Value::Float(3.0),
            Value::Integer(0),
            "Easy".into(),
            Value::Integer(4),
            "Low".into(),
        ];
        let table =
            RecordTable::from_rows(names.iter().map(|s| s.to_string()).collect(), vec![row])
                .unwrap();
        assert!(DatasetKind::PlayerEngagement.validate(&table).is_ok());
    }
}

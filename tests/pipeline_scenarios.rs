use std::collections::BTreeMap;
use std::io::Write;

use rusty_arcade::aggregate::{group_by, value_counts, Aggregation, KeyOrder};
use rusty_arcade::config::{PipelineConfig, SourceConfig};
use rusty_arcade::data::cache::SourceCache;
use rusty_arcade::data::export::write_csv;
use rusty_arcade::data::filter::{apply, FilterSet, Predicate};
use rusty_arcade::data::generator::generate_players;
use rusty_arcade::data::loader::load_csv_reader;
use rusty_arcade::data::model::{RecordTable, Value};
use rusty_arcade::ml::encoder::{indicator_name, EncodedField, InputRow};
use rusty_arcade::ml::model::{train, ModelConfig};
use rusty_arcade::pipeline::run;

fn fast_model() -> ModelConfig {
    ModelConfig {
        n_trees: 20,
        ..ModelConfig::default()
    }
}

fn row(pairs: &[(&str, Value)]) -> InputRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn genre_distribution_of_ten_rows() {
    let csv = "PlayerID,GameGenre,PlayTimeHours\n\
               1,Action,3.5\n2,RPG,10\n3,Action,1\n4,Sports,7\n5,RPG,2\n\
               6,Action,8\n7,Sports,4\n8,RPG,6\n9,Action,9\n10,Sports,5\n";
    let table = load_csv_reader(csv.as_bytes()).unwrap();

    let filtered = apply(&table, &FilterSet::new()).unwrap();
    let genres = value_counts(&filtered, "GameGenre", KeyOrder::FirstSeen).unwrap();

    assert_eq!(genres.entries.len(), 3);
    assert_eq!(genres.total(), 10.0);
    let (action, rpg, sports) = (Value::from("Action"), Value::from("RPG"), Value::from("Sports"));
    assert_eq!(genres.keys(), vec![&action, &rpg, &sports]);
    assert_eq!(genres.get(&"Action".into()), Some(4.0));
}

fn two_class_table(rows: usize) -> RecordTable {
    let columns = ["Sessions", "Difficulty", "Churned"].iter().map(|s| s.to_string()).collect();
    let data = (0..rows)
        .map(|i| {
            vec![
                Value::Integer((i % 20) as i64),
                Value::from(["Easy", "Medium", "Hard"][i % 3]),
                Value::from(if i % 20 < 8 { "yes" } else { "no" }),
            ]
        })
        .collect();
    RecordTable::from_rows(columns, data).unwrap()
}

#[test]
fn two_class_confusion_matches_test_split() {
    let table = two_class_table(100);
    let config = ModelConfig {
        target: "Churned".to_string(),
        exclude: Vec::new(),
        ..fast_model()
    };
    let model = train(&table, &config).unwrap();
    let report = model.evaluate(&table).unwrap();

    assert_eq!(model.split().test.len(), 30);
    assert_eq!(report.confusion.matrix.len(), 2);
    assert!(report.confusion.matrix.iter().all(|r| r.len() == 2));
    assert_eq!(report.confusion.labels, vec![Value::from("no"), Value::from("yes")]);

    let (target, _) = table.schema().require("Churned").unwrap();
    let expected: Vec<usize> = report
        .confusion
        .labels
        .iter()
        .map(|label| {
            model
                .split()
                .test
                .iter()
                .filter(|&&r| table.value(r, target) == label)
                .count()
        })
        .collect();
    assert_eq!(report.confusion.row_sums(), expected);
    assert_eq!(report.classification.classes[0].support, expected[0]);
}

#[test]
fn unseen_category_still_predicts_known_label() {
    let table = generate_players(120, 42).unwrap();
    let model = train(&table, &fast_model()).unwrap();

    let input = row(&[
        ("Age", Value::Integer(30)),
        ("GameDifficulty", "Nightmare".into()),
        ("GameGenre", "Rhythm".into()),
        ("SessionsPerWeek", Value::Integer(12)),
    ]);
    let prediction = model.predict(&input).unwrap();

    assert!(model.classes().contains(&prediction.label));
    assert_eq!(prediction.unseen.len(), 2);
    let total: f64 = prediction.probabilities.iter().map(|p| p.probability).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn filters_compose() {
    let table = generate_players(200, 11).unwrap();
    let bases = [
        FilterSet::new(),
        FilterSet::new().with("GameDifficulty", Predicate::membership(["Easy", "Hard"])),
        FilterSet::new()
            .with("Age", Predicate::range(20.0, 40.0))
            .with("Gender", Predicate::membership(["Female"])),
    ];
    let extras = [
        ("SessionsPerWeek", Predicate::range(5.0, 15.0)),
        ("GameGenre", Predicate::membership(["RPG", "Strategy", "Action"])),
        ("Location", Predicate::membership(Vec::<&str>::new())),
    ];

    for base in &bases {
        for (column, extra) in &extras {
            let single = FilterSet::new().with(*column, extra.clone());
            let stepwise = apply(&apply(&table, base).unwrap(), &single).unwrap();
            let combined = apply(&table, &base.merged(&single)).unwrap();
            assert_eq!(stepwise.records(), combined.records(), "{column}");
        }
    }
}

#[test]
fn empty_filter_set_is_identity() {
    let table = generate_players(75, 2).unwrap();
    let out = apply(&table, &FilterSet::new()).unwrap();
    assert_eq!(out, table);
}

#[test]
fn training_is_deterministic() {
    let table = generate_players(150, 8).unwrap();
    let first = train(&table, &fast_model()).unwrap();
    let second = train(&table, &fast_model()).unwrap();

    assert_eq!(first.split(), second.split());
    assert_eq!(first.training_schema(), second.training_schema());
    assert_eq!(first.evaluate(&table).unwrap(), second.evaluate(&table).unwrap());
}

#[test]
fn predictions_are_always_training_labels() {
    let table = generate_players(120, 5).unwrap();
    let model = train(&table, &fast_model()).unwrap();

    let inputs = [
        InputRow::new(),
        row(&[("Age", Value::Integer(90)), ("PlayTimeHours", Value::Float(1e6))]),
        row(&[("SessionsPerWeek", Value::Integer(-3)), ("Mood", "Happy".into())]),
        row(&[("GameGenre", Value::Null), ("GameDifficulty", "Hard".into())]),
    ];
    for input in &inputs {
        let prediction = model.predict(input).unwrap();
        assert!(model.classes().contains(&prediction.label));
        assert!(!prediction.label.is_null());
    }
}

#[test]
fn one_hot_sets_one_indicator_per_field() {
    let table = generate_players(100, 3).unwrap();
    let model = train(&table, &fast_model()).unwrap();
    let encoder = model.encoder();
    let schema = model.training_schema();

    let input = row(&[
        ("Age", Value::Integer(33)),
        ("GameDifficulty", "Medium".into()),
        ("GameGenre", "Puzzle".into()),
        ("Gender", "Female".into()),
    ]);
    let encoded = encoder.encode_input(&input).unwrap();
    assert_eq!(encoded.features.len(), schema.len());

    for field in encoder.fields() {
        let EncodedField::OneHot { column, categories } = field else {
            continue;
        };
        let ones: Vec<&Value> = categories
            .iter()
            .filter(|c| {
                let at = schema.position(&indicator_name(column, c)).unwrap();
                encoded.features[at] == 1.0
            })
            .collect();
        match input.get(column.as_str()) {
            Some(v) if categories.contains(v) => assert_eq!(ones, vec![v], "{column}"),
            // Unseen ("Puzzle") or absent: the whole block is zero.
            _ => assert!(ones.is_empty(), "{column}"),
        }
    }
    assert_eq!(encoded.features[schema.position("Age").unwrap()], 33.0);

    // The same row projected from dummy columns lands on the same features.
    let mut dummies: BTreeMap<String, f64> = BTreeMap::new();
    dummies.insert("Age".to_string(), 33.0);
    dummies.insert("GameDifficulty_Medium".to_string(), 1.0);
    dummies.insert("Gender_Female".to_string(), 1.0);
    dummies.insert("GameGenre_Puzzle".to_string(), 1.0);
    let aligned = schema.align(&dummies);
    assert_eq!(aligned.features, encoded.features);
    assert_eq!(aligned.dropped, vec!["GameGenre_Puzzle".to_string()]);
}

// ---------------------------------------------------------------------------
// End to end through files
// ---------------------------------------------------------------------------

#[test]
fn csv_source_runs_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players.csv");
    write_csv(&generate_players(90, 4).unwrap(), &path).unwrap();

    let config = PipelineConfig {
        source: SourceConfig::File { path: path.clone() },
        model: Some(fast_model()),
        ..PipelineConfig::player_dashboard()
    };
    let mut cache = SourceCache::new();
    let first = run(&config, &mut cache);
    let second = run(&config, &mut cache);

    assert!(first.failures().is_empty(), "{:?}", first.failures());
    assert_eq!(cache.hits(), 1);
    assert_eq!(first, second);
}

#[test]
fn missing_columns_fail_only_their_sections() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "PlayerID,Age,GameGenre,EngagementLevel").unwrap();
    for i in 0..30 {
        let level = ["Low", "Medium", "High"][i % 3];
        let genre = ["RPG", "Sports"][i % 2];
        writeln!(file, "{i},{},{genre},{level}", 18 + i).unwrap();
    }
    file.flush().unwrap();

    let config = PipelineConfig {
        source: SourceConfig::File {
            path: file.path().to_path_buf(),
        },
        model: Some(fast_model()),
        ..PipelineConfig::player_dashboard()
    };
    let report = run(&config, &mut SourceCache::new());

    assert!(report.source.is_ok());
    assert!(!report.schema.as_ref().unwrap().is_ok());
    // Genre counts only need GameGenre.
    assert!(report.aggregations[0].is_ok());
    // Mean playtime per genre needs a column the file lacks.
    assert!(!report.aggregations[2].is_ok());
    assert!(report.model.as_ref().unwrap().is_ok());
    assert!(report.prediction.as_ref().unwrap().is_ok());
}

#[test]
fn mean_by_group_on_filtered_table() {
    let table = generate_players(100, 6).unwrap();
    let hard = apply(
        &table,
        &FilterSet::new().with("GameDifficulty", Predicate::membership(["Hard"])),
    )
    .unwrap();
    let means = group_by(
        &hard,
        "EngagementLevel",
        &Aggregation::Mean("PlayTimeHours".to_string()),
        KeyOrder::KeyAscending,
    )
    .unwrap();

    let keys = means.keys();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert!(means.entries.iter().all(|e| e.rows > 0 && e.value >= 0.0));
}

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::model::{RecordTable, Value};
use super::schema::DatasetKind;
use crate::error::PipelineError;

/// Seed used by the dashboards when no file is supplied.
pub const DEFAULT_SEED: u64 = 42;

const GENDERS: &[&str] = &["Male", "Female"];
const LOCATIONS: &[&str] = &["USA", "Europe", "Asia", "Other"];
const PLAYER_GENRES: &[&str] = &["Action", "RPG", "Simulation", "Sports", "Strategy"];
const DIFFICULTIES: &[&str] = &["Easy", "Medium", "Hard"];

const PLATFORMS: &[&str] = &["PS4", "XOne", "Switch", "PC", "3DS"];
const SALES_GENRES: &[&str] = &[
    "Action",
    "Shooter",
    "Sports",
    "Role-Playing",
    "Platform",
    "Puzzle",
    "Racing",
];

/// Box-Muller transform for a normal draw.
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(1e-15);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn pick(rng: &mut StdRng, options: &[&str]) -> Value {
    options
        .choose(rng)
        .map(|s| Value::from(*s))
        .unwrap_or(Value::Null)
}

fn build(kind: DatasetKind, rows: Vec<Vec<Value>>) -> Result<RecordTable, PipelineError> {
    let columns = kind.columns().iter().map(|c| c.name.to_string()).collect();
    RecordTable::from_rows(columns, rows)
}

/// Synthetic player-engagement table.
///
/// `EngagementLevel` is a noisy function of weekly sessions and session
/// length, so a classifier has something to learn.
pub fn generate_players(rows: usize, seed: u64) -> Result<RecordTable, PipelineError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let data = (0..rows)
        .map(|i| {
            let sessions: i64 = rng.gen_range(0..=19);
            let duration: i64 = rng.gen_range(10..=179);
            let score = 0.6 * sessions as f64 / 19.0
                + 0.4 * duration as f64 / 179.0
                + gauss(&mut rng, 0.0, 0.05);
            let engagement = if score < 0.35 {
                "Low"
            } else if score > 0.6 {
                "High"
            } else {
                "Medium"
            };

            vec![
                Value::Integer(9000 + i as i64),
                Value::Integer(rng.gen_range(15..=49)),
                pick(&mut rng, GENDERS),
                pick(&mut rng, LOCATIONS),
                pick(&mut rng, PLAYER_GENRES),
                Value::Float(round2(rng.gen_range(0.0..24.0))),
                Value::Integer(rng.gen_bool(0.2) as i64),
                pick(&mut rng, DIFFICULTIES),
                Value::Integer(sessions),
                Value::Integer(duration),
                Value::Integer(rng.gen_range(1..=99)),
                Value::Integer(rng.gen_range(0..=49)),
                Value::from(engagement),
            ]
        })
        .collect();

    build(DatasetKind::PlayerEngagement, data)
}

/// Synthetic game-sales table. About one critic score in twenty is missing.
pub fn generate_sales(rows: usize, seed: u64) -> Result<RecordTable, PipelineError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let data = (0..rows)
        .map(|i| {
            let mut regional = [0.0f64; 4];
            for r in regional.iter_mut() {
                *r = round2(rng.gen::<f64>().powi(3) * 5.0);
            }
            let global = round2(regional.iter().sum());
            let critic = if rng.gen_bool(0.05) {
                Value::Null
            } else {
                Value::Integer(rng.gen_range(30..=98))
            };

            vec![
                Value::String(format!("Game {i:04}")),
                pick(&mut rng, PLATFORMS),
                Value::Integer(rng.gen_range(2000..=2016)),
                pick(&mut rng, SALES_GENRES),
                Value::Float(regional[0]),
                Value::Float(regional[1]),
                Value::Float(regional[2]),
                Value::Float(regional[3]),
                Value::Float(global),
                critic,
            ]
        })
        .collect();

    build(DatasetKind::GameSales, data)
}

/// Generate a table of the given layout.
pub fn generate(kind: DatasetKind, rows: usize, seed: u64) -> Result<RecordTable, PipelineError> {
    match kind {
        DatasetKind::PlayerEngagement => generate_players(rows, seed),
        DatasetKind::GameSales => generate_sales(rows, seed),
    }
}

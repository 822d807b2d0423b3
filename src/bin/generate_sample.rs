use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use rusty_arcade::data::export::write_file;
use rusty_arcade::data::generator::{generate, DEFAULT_SEED};
use rusty_arcade::data::schema::DatasetKind;

/// Usage: generate_sample [players|sales] [rows] [out.(parquet|csv)]
fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let kind = match args.next().as_deref() {
        None | Some("players") => DatasetKind::PlayerEngagement,
        Some("sales") => DatasetKind::GameSales,
        Some(other) => bail!("unknown dataset '{other}', expected 'players' or 'sales'"),
    };
    let rows: usize = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid row count '{n}'"))?,
        None => 1000,
    };
    let output_path = args.next().map(PathBuf::from).unwrap_or_else(|| match kind {
        DatasetKind::PlayerEngagement => PathBuf::from("players.parquet"),
        DatasetKind::GameSales => PathBuf::from("sales.parquet"),
    });

    let table = generate(kind, rows, DEFAULT_SEED)?;
    write_file(&table, &output_path)?;

    println!(
        "Wrote {} rows ({} columns) to {}",
        table.len(),
        table.schema().len(),
        output_path.display()
    );
    Ok(())
}

/// Data layer: core types, loading, generation and filtering.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet        generator (seeded)
///        │                              │
///        ▼                              │
///   ┌──────────┐   ┌─────────┐          │
///   │  loader   │◄──│  cache  │          │
///   └──────────┘   └─────────┘          │
///        │                              │
///        ▼                              ▼
///   ┌─────────────┐
///   │ RecordTable │  Schema + Vec<Record>, unique values per column
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  AND of column predicates → row subset
///   └──────────┘
/// ```

pub mod cache;
pub mod export;
pub mod filter;
pub mod generator;
pub mod loader;
pub mod model;
pub mod schema;

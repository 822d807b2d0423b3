//! Headless analysis core for game-player and game-sales tables.
//!
//! ```text
//!   Source ──► Filter ──┬──► Aggregation
//!                       └──► Model (encode → split → fit → evaluate → predict)
//! ```
//!
//! [`pipeline::run`] drives one pass over a [`config::PipelineConfig`];
//! [`state::PipelineState`] holds the same stages for interactive callers.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod state;

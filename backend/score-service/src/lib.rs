pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod jobs;
pub mod models;
pub mod services;

pub use config::{Config, RunMode};
pub use db::{InMemoryScoreStore, PgScoreStore, ScoreGateway, ScoreStore};
pub use error::{AggregationError, BatchError, StoreError};
pub use jobs::{ScoreBatchConfig, ScoreBatchJob};
pub use models::{BatchOutcome, BatchResult, EntityKind, KindStats};

// ============================================
// Background Jobs Module
// ============================================
//
// The score batch can be triggered via:
// - CronJob (Kubernetes) with --mode batch
// - Internal HTTP API (POST /internal/score-batch)

pub mod score_batch;

pub use score_batch::{ScoreBatchConfig, ScoreBatchJob};

// ============================================
// Score Batch Job
// ============================================
//
// Recomputes overall scores and popularity ranks for every entity kind.
// Designed to run from a Kubernetes CronJob (--mode batch) or on demand via
// the internal HTTP trigger.
//
// Workflow per kind:
// 1. List entities (with creation order) and finalized pillar ratings
// 2. Aggregate ratings into per-pillar averages
// 3. Persist pillar scores and the weighted overall score per entity
// 4. Rank the freshly written scores and persist ranks

use crate::config::{parse_var_or, ConfigError};
use crate::db::{ScoreGateway, ScoreStore};
use crate::error::{BatchError, StoreError};
use crate::models::{
    BatchResult, EntityKind, EntityOrder, KindStats, PillarMap, PillarScore, RankInput,
};
use crate::services::{aggregate_pillars, assign_ranks, overall_score, UNRANKED};
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use resilience::RetryConfig;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Score batch job configuration
#[derive(Debug, Clone)]
pub struct ScoreBatchConfig {
    /// Entities of one kind written concurrently
    pub max_concurrency: usize,
    /// Retry policy applied to every store call
    pub retry: RetryConfig,
}

impl Default for ScoreBatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            retry: RetryConfig::default(),
        }
    }
}

impl ScoreBatchConfig {
    /// Create config from environment variables, falling back to defaults
    /// for unset variables and rejecting malformed ones
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let jitter_ratio: f64 = parse_var_or(
            "SCORE_BATCH_JITTER_RATIO",
            defaults.retry.jitter_ratio,
            "ratio in [0, 1]",
        )?;
        if !(0.0..=1.0).contains(&jitter_ratio) {
            return Err(ConfigError::Invalid {
                key: "SCORE_BATCH_JITTER_RATIO",
                expected: "ratio in [0, 1]",
                value: jitter_ratio.to_string(),
            });
        }

        let retry = RetryConfig {
            max_retries: parse_var_or(
                "SCORE_BATCH_MAX_RETRIES",
                defaults.retry.max_retries,
                "u32",
            )?,
            initial_backoff: Duration::from_millis(parse_var_or(
                "SCORE_BATCH_INITIAL_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
                "u64",
            )?),
            jitter_ratio,
            ..defaults.retry
        };

        Ok(Self {
            max_concurrency: parse_var_or(
                "SCORE_BATCH_MAX_CONCURRENCY",
                defaults.max_concurrency,
                "usize",
            )?,
            retry,
        })
    }
}

/// Score batch job runner
pub struct ScoreBatchJob {
    gateway: ScoreGateway,
    config: ScoreBatchConfig,
}

impl ScoreBatchJob {
    pub fn new(store: Arc<dyn ScoreStore>, config: ScoreBatchConfig) -> Self {
        let gateway = ScoreGateway::new(store, config.retry.clone());
        Self { gateway, config }
    }

    /// Run one full pass over every kind.
    ///
    /// Kinds are processed concurrently and fail independently; the result
    /// always carries an entry for each kind.
    pub async fn run(&self) -> BatchResult {
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!(
            max_concurrency = self.concurrency(),
            max_retries = self.config.retry.max_retries,
            "Starting score batch"
        );

        let outcomes = join_all(EntityKind::ALL.iter().map(|&kind| self.run_kind(kind))).await;
        let per_type: BTreeMap<EntityKind, KindStats> =
            EntityKind::ALL.iter().copied().zip(outcomes).collect();
        let success = per_type.values().all(|stats| stats.success);

        let result = BatchResult {
            per_type,
            total_duration_ms: start_time.elapsed().as_millis() as u64,
            success,
            started_at,
            completed_at: Utc::now(),
        };

        if result.success {
            info!(
                total_duration_ms = result.total_duration_ms,
                "Score batch completed"
            );
        } else {
            let failed: Vec<&str> = result
                .per_type
                .iter()
                .filter(|(_, stats)| !stats.success)
                .map(|(kind, _)| kind.as_str())
                .collect();
            warn!(
                total_duration_ms = result.total_duration_ms,
                failed_kinds = ?failed,
                "Score batch completed with failures"
            );
        }

        result
    }

    /// Process a single kind, converting a kind-level failure into stats
    pub async fn run_kind(&self, kind: EntityKind) -> KindStats {
        let start_time = Instant::now();

        let mut stats = match self.process_kind(kind).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(kind = %kind, error = %e, "Score batch failed for kind");
                KindStats::failed(e.to_string())
            }
        };
        stats.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            kind = %kind,
            success = stats.success,
            updated = stats.updated_count,
            ranked = stats.ranked_count,
            failed = stats.failed_count,
            duration_ms = stats.duration_ms,
            "Kind processed"
        );
        stats
    }

    async fn process_kind(&self, kind: EntityKind) -> Result<KindStats, BatchError> {
        let entities = self
            .gateway
            .list_entity_ids_with_creation_order(kind)
            .await
            .map_err(|source| BatchError::ListEntities { kind, source })?;
        let ratings = self
            .gateway
            .list_ratings_for_kind(kind)
            .await
            .map_err(|source| BatchError::ListRatings { kind, source })?;

        let aggregation = aggregate_pillars(&ratings, None);
        let mut stats = KindStats {
            success: true,
            ..Default::default()
        };

        let known: HashSet<Uuid> = entities.iter().map(|e| e.entity_id).collect();
        let orphans = aggregation
            .entities
            .keys()
            .chain(aggregation.rejected.keys())
            .filter(|id| !known.contains(id))
            .count();
        if orphans > 0 {
            warn!(kind = %kind, orphans, "Ignoring ratings for unknown entities");
        }

        let mut pending = Vec::with_capacity(entities.len());
        for entity in &entities {
            match aggregation.rejected.get(&entity.entity_id) {
                Some(reason) => {
                    stats.failed_count += 1;
                    warn!(
                        kind = %kind,
                        entity_id = %entity.entity_id,
                        error = %reason,
                        "Skipping entity with malformed ratings"
                    );
                }
                None => pending.push(entity.clone()),
            }
        }

        // Scores for the whole kind commit before any rank is computed
        let written: Vec<(Uuid, Result<RankInput, StoreError>)> = stream::iter(pending)
            .map(|entity| {
                let pillars = aggregation
                    .entities
                    .get(&entity.entity_id)
                    .cloned()
                    .unwrap_or_default();
                async move {
                    let result = self.persist_score(kind, &entity, &pillars).await;
                    (entity.entity_id, result)
                }
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut rank_inputs = Vec::with_capacity(written.len());
        for (entity_id, result) in written {
            match result {
                Ok(input) => {
                    stats.updated_count += 1;
                    rank_inputs.push(input);
                }
                Err(e) => {
                    stats.failed_count += 1;
                    warn!(
                        kind = %kind,
                        entity_id = %entity_id,
                        error = %e,
                        "Skipping entity: score write failed"
                    );
                }
            }
        }

        let ranks = assign_ranks(&rank_inputs);
        let rank_writes: Vec<(Uuid, i32, Result<(), StoreError>)> = stream::iter(ranks)
            .map(|(entity_id, rank)| async move {
                (entity_id, rank, self.persist_rank(kind, entity_id, rank).await)
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        for (entity_id, rank, result) in rank_writes {
            match result {
                Ok(()) if rank != UNRANKED => stats.ranked_count += 1,
                Ok(()) => {}
                Err(e) => {
                    stats.failed_count += 1;
                    warn!(
                        kind = %kind,
                        entity_id = %entity_id,
                        rank,
                        error = %e,
                        "Rank write failed"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Write pillar scores then the overall score; returns the ranking input
    async fn persist_score(
        &self,
        kind: EntityKind,
        entity: &EntityOrder,
        pillars: &PillarMap,
    ) -> Result<RankInput, StoreError> {
        let pillar_scores: Vec<PillarScore> = pillars
            .iter()
            .map(|(&pillar_id, stats)| PillarScore {
                pillar_id,
                avg_score: stats.avg_score,
                rater_count: stats.rater_count,
            })
            .collect();
        self.gateway
            .write_pillar_scores(kind, entity.entity_id, &pillar_scores)
            .await?;

        let score = overall_score(pillars);
        self.gateway
            .write_entity_score(kind, entity.entity_id, score)
            .await?;

        Ok(RankInput {
            entity_id: entity.entity_id,
            overall_score: score,
            rater_count: pillars.values().map(|p| p.rater_count).sum(),
            created_at: entity.created_at,
        })
    }

    async fn persist_rank(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        rank: i32,
    ) -> Result<(), StoreError> {
        self.gateway.write_entity_rank(kind, entity_id, rank).await
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrency.max(1)
    }
}

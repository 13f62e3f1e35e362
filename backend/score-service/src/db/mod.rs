//! Persistence gateway for the score batch.
//!
//! [`ScoreStore`] is the narrow read/write contract against the durable store;
//! [`ScoreGateway`] wraps every call with bounded retries for transient faults.

mod memory;
mod postgres;

pub use memory::{InMemoryScoreStore, StoredEntity};
pub use postgres::PgScoreStore;

use crate::error::StoreError;
use crate::models::{EntityKind, EntityOrder, PillarScore, RatingRow};
use async_trait::async_trait;
use resilience::{with_retry, RetryConfig};
use std::sync::Arc;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Every finalized pillar rating for entities of `kind`, with pillar weights
    async fn list_ratings_for_kind(&self, kind: EntityKind) -> Result<Vec<RatingRow>, StoreError>;

    async fn list_entity_ids_with_creation_order(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<EntityOrder>, StoreError>;

    async fn write_entity_score(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError>;

    async fn write_entity_rank(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        rank: i32,
    ) -> Result<(), StoreError>;

    /// Replace the stored pillar scores of one entity with `pillars`
    async fn write_pillar_scores(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        pillars: Vec<PillarScore>,
    ) -> Result<(), StoreError>;
}

/// Store access with retry on transient failures
#[derive(Clone)]
pub struct ScoreGateway {
    store: Arc<dyn ScoreStore>,
    retry: RetryConfig,
}

impl ScoreGateway {
    pub fn new(store: Arc<dyn ScoreStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn list_ratings_for_kind(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<RatingRow>, StoreError> {
        with_retry(&self.retry, || self.store.list_ratings_for_kind(kind)).await
    }

    pub async fn list_entity_ids_with_creation_order(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<EntityOrder>, StoreError> {
        with_retry(&self.retry, || {
            self.store.list_entity_ids_with_creation_order(kind)
        })
        .await
    }

    pub async fn write_entity_score(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        with_retry(&self.retry, || {
            self.store.write_entity_score(kind, entity_id, score)
        })
        .await
    }

    pub async fn write_entity_rank(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        rank: i32,
    ) -> Result<(), StoreError> {
        with_retry(&self.retry, || {
            self.store.write_entity_rank(kind, entity_id, rank)
        })
        .await
    }

    pub async fn write_pillar_scores(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        pillars: &[PillarScore],
    ) -> Result<(), StoreError> {
        with_retry(&self.retry, || {
            self.store
                .write_pillar_scores(kind, entity_id, pillars.to_vec())
        })
        .await
    }
}

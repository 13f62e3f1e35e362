use super::ScoreStore;
use crate::error::StoreError;
use crate::models::{EntityKind, EntityOrder, PillarScore, RatingRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub created_at: DateTime<Utc>,
    pub overall_score: f64,
    pub rank: i32,
}

#[derive(Debug, Clone, Copy)]
struct PillarTemplate {
    kind: EntityKind,
    weight: f64,
}

/// (kind, entity, pillar, user)
type RatingKey = (EntityKind, Uuid, Uuid, Uuid);

#[derive(Default)]
struct MemoryState {
    entities: HashMap<EntityKind, BTreeMap<Uuid, StoredEntity>>,
    pillars: HashMap<Uuid, PillarTemplate>,
    ratings: BTreeMap<RatingKey, f64>,
    pillar_scores: HashMap<(EntityKind, Uuid), Vec<PillarScore>>,
    unavailable_kinds: HashSet<EntityKind>,
    unavailable_ratings: HashSet<EntityKind>,
    transient_failures: u32,
    rejected_writes: HashSet<Uuid>,
    calls: u32,
}

/// Score store held in memory, with fault injection hooks.
///
/// Mirrors the PostgreSQL store's contract: writes to unknown entities fail
/// with `NotFound`, ratings upsert per (user, entity, pillar), pillar score
/// writes replace the entity's previous records.
#[derive(Default)]
pub struct InMemoryScoreStore {
    state: Mutex<MemoryState>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entity(&self, kind: EntityKind, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().entities.entry(kind).or_default().insert(
            id,
            StoredEntity {
                created_at,
                overall_score: 0.0,
                rank: 0,
            },
        );
        id
    }

    pub fn insert_pillar(&self, kind: EntityKind, weight: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .pillars
            .insert(id, PillarTemplate { kind, weight });
        id
    }

    /// Insert or replace one user's finalized score for a pillar
    pub fn rate(
        &self,
        kind: EntityKind,
        user_id: Uuid,
        entity_id: Uuid,
        pillar_id: Uuid,
        score: f64,
    ) {
        self.state
            .lock()
            .ratings
            .insert((kind, entity_id, pillar_id, user_id), score);
    }

    pub fn entity(&self, kind: EntityKind, entity_id: Uuid) -> Option<StoredEntity> {
        self.state
            .lock()
            .entities
            .get(&kind)
            .and_then(|entities| entities.get(&entity_id))
            .cloned()
    }

    pub fn pillar_scores(&self, kind: EntityKind, entity_id: Uuid) -> Vec<PillarScore> {
        self.state
            .lock()
            .pillar_scores
            .get(&(kind, entity_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Every listing call for `kind` fails with a connectivity fault
    pub fn make_kind_unavailable(&self, kind: EntityKind) {
        self.state.lock().unavailable_kinds.insert(kind);
    }

    /// Only the ratings listing for `kind` fails with a connectivity fault
    pub fn make_ratings_unavailable(&self, kind: EntityKind) {
        self.state.lock().unavailable_ratings.insert(kind);
    }

    /// The next `count` calls of any kind fail with a connection reset
    pub fn fail_next_calls(&self, count: u32) {
        self.state.lock().transient_failures = count;
    }

    /// Writes for `entity_id` fail with a non-retryable constraint error
    pub fn reject_writes_for(&self, entity_id: Uuid) {
        self.state.lock().rejected_writes.insert(entity_id);
    }

    pub fn call_count(&self) -> u32 {
        self.state.lock().calls
    }

    fn begin_call(state: &mut MemoryState) -> Result<(), StoreError> {
        state.calls += 1;
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(StoreError::Unavailable {
                code: None,
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }

    fn begin_listing(state: &mut MemoryState, kind: EntityKind) -> Result<(), StoreError> {
        Self::begin_call(state)?;
        if state.unavailable_kinds.contains(&kind) {
            return Err(StoreError::Unavailable {
                code: Some("08001".to_string()),
                message: format!("can't reach database server for {kind}"),
            });
        }
        Ok(())
    }

    fn begin_write(
        state: &mut MemoryState,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<(), StoreError> {
        Self::begin_call(state)?;
        if state.rejected_writes.contains(&entity_id) {
            return Err(StoreError::InvalidData(format!(
                "write for {kind} {entity_id} violates a check constraint"
            )));
        }
        let known = state
            .entities
            .get(&kind)
            .is_some_and(|entities| entities.contains_key(&entity_id));
        if !known {
            return Err(StoreError::NotFound(format!("{kind} {entity_id}")));
        }
        Ok(())
    }

    fn stored_mut(
        state: &mut MemoryState,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<&mut StoredEntity, StoreError> {
        state
            .entities
            .get_mut(&kind)
            .and_then(|entities| entities.get_mut(&entity_id))
            .ok_or_else(|| StoreError::NotFound(format!("{kind} {entity_id}")))
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn list_ratings_for_kind(&self, kind: EntityKind) -> Result<Vec<RatingRow>, StoreError> {
        let mut state = self.state.lock();
        Self::begin_listing(&mut state, kind)?;
        if state.unavailable_ratings.contains(&kind) {
            return Err(StoreError::Unavailable {
                code: Some("08006".to_string()),
                message: format!("connection closed while reading {kind} ratings"),
            });
        }

        let rows = state
            .ratings
            .iter()
            .filter(|((rating_kind, ..), _)| *rating_kind == kind)
            .filter_map(|(&(_, entity_id, pillar_id, _), &score)| {
                state
                    .pillars
                    .get(&pillar_id)
                    .filter(|template| template.kind == kind)
                    .map(|template| RatingRow {
                        entity_id,
                        pillar_id,
                        pillar_weight: template.weight,
                        score,
                    })
            })
            .collect();
        Ok(rows)
    }

    async fn list_entity_ids_with_creation_order(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<EntityOrder>, StoreError> {
        let mut state = self.state.lock();
        Self::begin_listing(&mut state, kind)?;

        let mut rows: Vec<EntityOrder> = state
            .entities
            .get(&kind)
            .map(|entities| {
                entities
                    .iter()
                    .map(|(&entity_id, stored)| EntityOrder {
                        entity_id,
                        created_at: stored.created_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        Ok(rows)
    }

    async fn write_entity_score(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        Self::begin_write(&mut state, kind, entity_id)?;
        Self::stored_mut(&mut state, kind, entity_id)?.overall_score = score;
        Ok(())
    }

    async fn write_entity_rank(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        rank: i32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        Self::begin_write(&mut state, kind, entity_id)?;
        Self::stored_mut(&mut state, kind, entity_id)?.rank = rank;
        Ok(())
    }

    async fn write_pillar_scores(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        pillars: Vec<PillarScore>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        Self::begin_write(&mut state, kind, entity_id)?;
        state.pillar_scores.insert((kind, entity_id), pillars);
        Ok(())
    }
}

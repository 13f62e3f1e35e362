use super::ScoreStore;
use crate::error::StoreError;
use crate::models::{EntityKind, EntityOrder, PillarScore, RatingRow};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const LIST_RATINGS_SQL: &str = r#"
SELECT
    r.entity_id,
    r.pillar_id,
    p.weight AS pillar_weight,
    r.final_score AS score
FROM user_pillar_ratings AS r
INNER JOIN rating_pillar_templates AS p
    ON p.id = r.pillar_id
WHERE r.entity_kind = $1
  AND p.kind = $2
ORDER BY r.entity_id, r.pillar_id, r.user_id
"#;

const UPSERT_PILLAR_SCORES_SQL: &str = r#"
INSERT INTO entity_pillar_scores
    (entity_kind, entity_id, pillar_id, avg_score, rater_count, computed_at)
SELECT $1, $2, pillar_id, avg_score, rater_count, NOW()
FROM UNNEST($3::uuid[], $4::float8[], $5::int4[]) AS s(pillar_id, avg_score, rater_count)
ON CONFLICT (entity_kind, entity_id, pillar_id) DO UPDATE
SET avg_score = EXCLUDED.avg_score,
    rater_count = EXCLUDED.rater_count,
    computed_at = EXCLUDED.computed_at
"#;

const DELETE_STALE_PILLAR_SCORES_SQL: &str = r#"
DELETE FROM entity_pillar_scores
WHERE entity_kind = $1
  AND entity_id = $2
  AND pillar_id <> ALL($3::uuid[])
"#;

/// PostgreSQL-backed score store
#[derive(Clone)]
pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn list_ratings_for_kind(&self, kind: EntityKind) -> Result<Vec<RatingRow>, StoreError> {
        let rows = sqlx::query_as::<_, RatingRow>(LIST_RATINGS_SQL)
            .bind(kind.as_str())
            .bind(kind.pillar_kind())
            .fetch_all(&self.pool)
            .await?;

        debug!(kind = %kind, rows = rows.len(), "Loaded pillar ratings");
        Ok(rows)
    }

    async fn list_entity_ids_with_creation_order(
        &self,
        kind: EntityKind,
    ) -> Result<Vec<EntityOrder>, StoreError> {
        let sql = format!(
            "SELECT id AS entity_id, created_at FROM {} ORDER BY created_at ASC, id ASC",
            kind.table_name()
        );

        let rows = sqlx::query_as::<_, EntityOrder>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn write_entity_score(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET overall_score = $1 WHERE id = $2",
            kind.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(score)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{} {}", kind, entity_id)));
        }
        Ok(())
    }

    async fn write_entity_rank(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        rank: i32,
    ) -> Result<(), StoreError> {
        let sql = format!("UPDATE {} SET rank = $1 WHERE id = $2", kind.table_name());

        let result = sqlx::query(&sql)
            .bind(rank)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{} {}", kind, entity_id)));
        }
        Ok(())
    }

    async fn write_pillar_scores(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        pillars: Vec<PillarScore>,
    ) -> Result<(), StoreError> {
        let pillar_ids: Vec<Uuid> = pillars.iter().map(|p| p.pillar_id).collect();
        let averages: Vec<f64> = pillars.iter().map(|p| p.avg_score).collect();
        let counts = pillars
            .iter()
            .map(|p| {
                i32::try_from(p.rater_count).map_err(|_| {
                    StoreError::InvalidData(format!(
                        "rater count {} does not fit the store",
                        p.rater_count
                    ))
                })
            })
            .collect::<Result<Vec<i32>, _>>()?;

        // Upsert then prune: a concurrent run may hold the same keys.
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_PILLAR_SCORES_SQL)
            .bind(kind.as_str())
            .bind(entity_id)
            .bind(&pillar_ids)
            .bind(&averages)
            .bind(&counts)
            .execute(&mut *tx)
            .await?;

        sqlx::query(DELETE_STALE_PILLAR_SCORES_SQL)
            .bind(kind.as_str())
            .bind(entity_id)
            .bind(&pillar_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

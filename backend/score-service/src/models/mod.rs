use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Rated entity population. Each kind is aggregated and ranked on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    #[serde(rename = "series")]
    Series,
    #[serde(rename = "characters")]
    Character,
    #[serde(rename = "seasons")]
    Season,
    #[serde(rename = "episodes")]
    Episode,
}

impl EntityKind {
    /// Fixed processing order for a batch run
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Series,
        EntityKind::Character,
        EntityKind::Season,
        EntityKind::Episode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Series => "series",
            EntityKind::Character => "characters",
            EntityKind::Season => "seasons",
            EntityKind::Episode => "episodes",
        }
    }

    /// Kind tag used by pillar templates
    pub fn pillar_kind(&self) -> &'static str {
        match self {
            EntityKind::Series => "SERIES",
            EntityKind::Character => "CHARACTER",
            EntityKind::Season => "SEASON",
            EntityKind::Episode => "EPISODE",
        }
    }

    /// Table holding the entities of this kind
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finalized user rating of a pillar, joined with the pillar's weight
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RatingRow {
    pub entity_id: Uuid,
    pub pillar_id: Uuid,
    pub pillar_weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EntityOrder {
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Aggregated ratings of one pillar on one entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarStats {
    pub avg_score: f64,
    pub rater_count: u32,
    pub weight: f64,
}

/// Pillar → stats for one entity. Pillars nobody rated are absent.
pub type PillarMap = BTreeMap<Uuid, PillarStats>;

/// Persisted per-pillar score record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarScore {
    pub pillar_id: Uuid,
    pub avg_score: f64,
    pub rater_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankInput {
    pub entity_id: Uuid,
    pub overall_score: f64,
    pub rater_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one kind within a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    pub success: bool,
    pub updated_count: u32,
    pub ranked_count: u32,
    pub failed_count: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KindStats {
    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub per_type: BTreeMap<EntityKind, KindStats>,
    pub total_duration_ms: u64,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Distinguishes a degraded run (some kinds failed) from a total failure
    pub fn outcome(&self) -> BatchOutcome {
        let succeeded = self.per_type.values().filter(|s| s.success).count();
        if succeeded == self.per_type.len() {
            BatchOutcome::Succeeded
        } else if succeeded == 0 {
            BatchOutcome::Failed
        } else {
            BatchOutcome::Degraded
        }
    }
}

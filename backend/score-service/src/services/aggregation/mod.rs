// ============================================
// Pillar Aggregator
// ============================================
//
// Rolls raw user pillar ratings up into per-entity pillar averages.
// Pillars without raters never appear in the output, so the scorer can tell
// "not rated" apart from "rated 0".

use crate::error::AggregationError;
use crate::models::{PillarMap, PillarStats, RatingRow};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const MIN_VALUE: f64 = 0.0;
const MAX_VALUE: f64 = 10.0;

/// Aggregated pillars per entity, plus entities whose data was rejected
#[derive(Debug, Default)]
pub struct Aggregation {
    pub entities: HashMap<Uuid, PillarMap>,
    pub rejected: HashMap<Uuid, AggregationError>,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: u32,
    weight: f64,
}

/// Aggregate ratings of one kind.
///
/// `only` restricts the work to a single entity; `None` processes every
/// entity that appears in `ratings`.
pub fn aggregate_pillars(ratings: &[RatingRow], only: Option<Uuid>) -> Aggregation {
    let mut sums: HashMap<Uuid, BTreeMap<Uuid, Accumulator>> = HashMap::new();
    let mut rejected: HashMap<Uuid, AggregationError> = HashMap::new();

    for row in ratings {
        if only.is_some_and(|id| id != row.entity_id) {
            continue;
        }
        if rejected.contains_key(&row.entity_id) {
            continue;
        }
        if let Err(e) = validate(row) {
            rejected.insert(row.entity_id, e);
            sums.remove(&row.entity_id);
            continue;
        }

        let acc = sums
            .entry(row.entity_id)
            .or_default()
            .entry(row.pillar_id)
            .or_default();
        acc.sum += row.score;
        acc.count += 1;
        acc.weight = row.pillar_weight;
    }

    let entities = sums
        .into_iter()
        .map(|(entity_id, pillars)| {
            let pillars = pillars
                .into_iter()
                .filter(|(_, acc)| acc.count > 0)
                .map(|(pillar_id, acc)| {
                    (
                        pillar_id,
                        PillarStats {
                            avg_score: acc.sum / acc.count as f64,
                            rater_count: acc.count,
                            weight: acc.weight,
                        },
                    )
                })
                .collect();
            (entity_id, pillars)
        })
        .collect();

    Aggregation { entities, rejected }
}

fn validate(row: &RatingRow) -> Result<(), AggregationError> {
    if !in_range(row.pillar_weight) {
        return Err(AggregationError::InvalidWeight {
            pillar_id: row.pillar_id,
            weight: row.pillar_weight,
        });
    }
    if !in_range(row.score) {
        return Err(AggregationError::InvalidScore {
            pillar_id: row.pillar_id,
            score: row.score,
        });
    }
    Ok(())
}

fn in_range(value: f64) -> bool {
    value.is_finite() && (MIN_VALUE..=MAX_VALUE).contains(&value)
}

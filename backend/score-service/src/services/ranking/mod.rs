use crate::models::RankInput;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Rank of entities that nobody has rated
pub const UNRANKED: i32 = 0;

/// Assign dense, unique ranks to one kind's population.
///
/// Rated entities (score above zero or at least one rater) are ordered by
/// score descending, then creation time ascending, then id ascending, and get
/// ranks `1..=n`. Everything else gets [`UNRANKED`].
pub fn assign_ranks(entries: &[RankInput]) -> HashMap<Uuid, i32> {
    let (mut ranked, unranked): (Vec<&RankInput>, Vec<&RankInput>) = entries
        .iter()
        .partition(|e| e.overall_score > 0.0 || e.rater_count > 0);

    ranked.sort_by(|a, b| compare_for_rank(a, b));

    let mut ranks = HashMap::with_capacity(entries.len());
    for (index, entry) in ranked.into_iter().enumerate() {
        ranks.insert(entry.entity_id, index as i32 + 1);
    }
    for entry in unranked {
        ranks.insert(entry.entity_id, UNRANKED);
    }
    ranks
}

fn compare_for_rank(a: &RankInput, b: &RankInput) -> Ordering {
    b.overall_score
        .total_cmp(&a.overall_score)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

//! End-to-end batch runs against the in-memory store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use score_service::{
    BatchOutcome, EntityKind, InMemoryScoreStore, ScoreBatchConfig, ScoreBatchJob,
};
use std::sync::Arc;
use uuid::Uuid;

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn job(store: &Arc<InMemoryScoreStore>) -> ScoreBatchJob {
    ScoreBatchJob::new(store.clone(), ScoreBatchConfig::default())
}

#[tokio::test]
async fn weighted_mean_and_pillar_scores_are_persisted() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Series;
    let series = store.insert_entity(kind, at(0));
    let story = store.insert_pillar(kind, 2.0);
    let visuals = store.insert_pillar(kind, 1.0);
    let ignored = store.insert_pillar(kind, 0.0);

    store.rate(kind, Uuid::new_v4(), series, story, 7.0);
    store.rate(kind, Uuid::new_v4(), series, story, 9.0);
    store.rate(kind, Uuid::new_v4(), series, visuals, 6.0);
    store.rate(kind, Uuid::new_v4(), series, ignored, 1.0);

    let result = job(&store).run().await;

    assert!(result.success);
    let stored = store.entity(kind, series).unwrap();
    assert_eq!(stored.overall_score, 7.33);
    assert_eq!(stored.rank, 1);

    let mut pillars = store.pillar_scores(kind, series);
    pillars.sort_by(|a, b| {
        b.rater_count
            .cmp(&a.rater_count)
            .then(a.avg_score.total_cmp(&b.avg_score))
    });
    assert_eq!(pillars.len(), 3);
    assert_eq!(pillars[0].pillar_id, story);
    assert_eq!(pillars[0].avg_score, 8.0);
    assert_eq!(pillars[0].rater_count, 2);
    assert!(pillars.iter().any(|p| p.pillar_id == ignored && p.avg_score == 1.0));
}

#[tokio::test]
async fn entity_without_ratings_gets_zero_score_and_rank() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Episode;
    let rated = store.insert_entity(kind, at(0));
    let unrated = store.insert_entity(kind, at(1));
    let pillar = store.insert_pillar(kind, 1.0);
    store.rate(kind, Uuid::new_v4(), rated, pillar, 5.0);

    let result = job(&store).run().await;

    let stats = &result.per_type[&kind];
    assert_eq!(stats.updated_count, 2);
    assert_eq!(stats.ranked_count, 1);

    let stored = store.entity(kind, unrated).unwrap();
    assert_eq!(stored.overall_score, 0.0);
    assert_eq!(stored.rank, 0);
    assert!(store.pillar_scores(kind, unrated).is_empty());
}

#[tokio::test]
async fn ties_are_ranked_by_creation_order() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Character;
    let pillar = store.insert_pillar(kind, 1.0);
    let b = store.insert_entity(kind, at(10));
    let a = store.insert_entity(kind, at(5));
    let c = store.insert_entity(kind, at(0));

    store.rate(kind, Uuid::new_v4(), a, pillar, 9.0);
    store.rate(kind, Uuid::new_v4(), b, pillar, 9.0);
    store.rate(kind, Uuid::new_v4(), c, pillar, 8.5);

    job(&store).run().await;

    assert_eq!(store.entity(kind, a).unwrap().rank, 1);
    assert_eq!(store.entity(kind, b).unwrap().rank, 2);
    assert_eq!(store.entity(kind, c).unwrap().rank, 3);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let store = Arc::new(InMemoryScoreStore::new());
    let mut ids = Vec::new();
    for kind in EntityKind::ALL {
        let pillar = store.insert_pillar(kind, 1.5);
        for i in 0..5 {
            let entity = store.insert_entity(kind, at(i));
            store.rate(kind, Uuid::new_v4(), entity, pillar, (i % 3) as f64 * 3.3);
            ids.push((kind, entity));
        }
    }

    let job = job(&store);
    job.run().await;
    let first: Vec<_> = ids
        .iter()
        .map(|&(kind, id)| (store.entity(kind, id), store.pillar_scores(kind, id)))
        .collect();

    let second_result = job.run().await;
    let second: Vec<_> = ids
        .iter()
        .map(|&(kind, id)| (store.entity(kind, id), store.pillar_scores(kind, id)))
        .collect();

    assert!(second_result.success);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn failing_kind_does_not_affect_the_others() {
    let store = Arc::new(InMemoryScoreStore::new());
    for kind in EntityKind::ALL {
        let entity = store.insert_entity(kind, at(0));
        let pillar = store.insert_pillar(kind, 1.0);
        store.rate(kind, Uuid::new_v4(), entity, pillar, 6.0);
    }
    store.make_kind_unavailable(EntityKind::Season);

    let result = job(&store).run().await;

    assert!(!result.success);
    assert_eq!(result.outcome(), BatchOutcome::Degraded);
    assert_eq!(result.per_type.len(), 4);

    let seasons = &result.per_type[&EntityKind::Season];
    assert!(!seasons.success);
    assert_eq!(seasons.updated_count, 0);
    assert!(seasons.error.as_deref().unwrap().contains("seasons"));

    for kind in [EntityKind::Series, EntityKind::Character, EntityKind::Episode] {
        let stats = &result.per_type[&kind];
        assert!(stats.success, "{kind} should succeed");
        assert_eq!(stats.updated_count, 1);
        assert_eq!(stats.ranked_count, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn ratings_listing_failure_marks_kind_failed() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Episode;
    let episode = store.insert_entity(kind, at(0));
    let pillar = store.insert_pillar(kind, 1.0);
    store.rate(kind, Uuid::new_v4(), episode, pillar, 9.5);
    let series = store.insert_entity(EntityKind::Series, at(0));
    store.make_ratings_unavailable(kind);

    let result = job(&store).run().await;

    assert_eq!(result.outcome(), BatchOutcome::Degraded);
    let episodes = &result.per_type[&kind];
    assert!(!episodes.success);
    assert_eq!(episodes.updated_count, 0);
    assert!(episodes
        .error
        .as_deref()
        .unwrap()
        .contains("Failed to list episodes ratings"));

    let untouched = store.entity(kind, episode).unwrap();
    assert_eq!(untouched.overall_score, 0.0);
    assert_eq!(untouched.rank, 0);
    assert!(result.per_type[&EntityKind::Series].success);
    assert!(store.entity(EntityKind::Series, series).is_some());
}

#[tokio::test(start_paused = true)]
async fn transient_store_failures_are_retried() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Series;
    let entity = store.insert_entity(kind, at(0));
    let pillar = store.insert_pillar(kind, 1.0);
    store.rate(kind, Uuid::new_v4(), entity, pillar, 4.25);
    store.fail_next_calls(2);

    let result = job(&store).run().await;

    assert!(result.success);
    assert_eq!(store.entity(kind, entity).unwrap().overall_score, 4.25);
    assert_eq!(store.entity(kind, entity).unwrap().rank, 1);
}

#[tokio::test]
async fn malformed_weight_skips_only_that_entity() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Season;
    let good_pillar = store.insert_pillar(kind, 1.0);
    let bad_pillar = store.insert_pillar(kind, 11.0);
    let good = store.insert_entity(kind, at(0));
    let bad = store.insert_entity(kind, at(1));

    store.rate(kind, Uuid::new_v4(), good, good_pillar, 8.0);
    store.rate(kind, Uuid::new_v4(), bad, good_pillar, 9.0);
    store.rate(kind, Uuid::new_v4(), bad, bad_pillar, 9.0);

    let result = job(&store).run().await;

    let stats = &result.per_type[&kind];
    assert!(stats.success);
    assert_eq!(stats.updated_count, 1);
    assert_eq!(stats.failed_count, 1);
    assert_eq!(store.entity(kind, good).unwrap().rank, 1);

    let skipped = store.entity(kind, bad).unwrap();
    assert_eq!(skipped.overall_score, 0.0);
    assert_eq!(skipped.rank, 0);
    assert!(store.pillar_scores(kind, bad).is_empty());
}

#[tokio::test]
async fn rejected_write_keeps_previous_values() {
    let store = Arc::new(InMemoryScoreStore::new());
    let kind = EntityKind::Character;
    let pillar = store.insert_pillar(kind, 1.0);
    let first = store.insert_entity(kind, at(0));
    let second = store.insert_entity(kind, at(1));
    store.rate(kind, Uuid::new_v4(), first, pillar, 5.0);
    store.rate(kind, Uuid::new_v4(), second, pillar, 7.0);

    let job = job(&store);
    job.run().await;
    assert_eq!(store.entity(kind, second).unwrap().rank, 1);

    store.rate(kind, Uuid::new_v4(), second, pillar, 1.0);
    store.reject_writes_for(second);
    let result = job.run().await;

    let stats = &result.per_type[&kind];
    assert!(stats.success);
    assert_eq!(stats.updated_count, 1);
    assert_eq!(stats.failed_count, 1);

    let kept = store.entity(kind, second).unwrap();
    assert_eq!(kept.overall_score, 7.0);
    assert_eq!(kept.rank, 1);
    assert_eq!(store.entity(kind, first).unwrap().rank, 1);
}

use crate::models::PillarMap;

const MAX_SCORE: f64 = 10.0;

/// Weighted mean of an entity's rated pillars, rounded to 2 decimals.
///
/// Pillars with no raters are excluded from both sides of the ratio. Returns 0
/// when the present pillars carry no weight at all.
pub fn overall_score(pillars: &PillarMap) -> f64 {
    let (weighted_sum, total_weight) = pillars
        .values()
        .filter(|p| p.rater_count > 0)
        .fold((0.0, 0.0), |(sum, weight), p| {
            (sum + p.avg_score * p.weight, weight + p.weight)
        });

    if total_weight <= 0.0 {
        return 0.0;
    }

    round2(weighted_sum / total_weight).clamp(0.0, MAX_SCORE)
}

/// Round half up to 2 decimal places.
///
/// Rounds the exact binary value the way the display layer's `toFixed(2)`
/// does: `2.675` is stored as 2.67499… and becomes `2.67`, while true halves
/// such as `0.125` round up to `0.13`.
pub fn round2(value: f64) -> f64 {
    // Only multiples of 1/8 can sit exactly on a hundredths half; for those
    // the scaled value is exact and `round` is half-up for non-negatives.
    if (value * 8.0).fract() == 0.0 {
        return (value * 100.0).round() / 100.0;
    }
    format!("{:.2}", value).parse().unwrap_or(value)
}

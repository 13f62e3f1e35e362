pub mod aggregation;
pub mod ranking;
pub mod scoring;

pub use aggregation::{aggregate_pillars, Aggregation};
pub use ranking::{assign_ranks, UNRANKED};
pub use scoring::{overall_score, round2};

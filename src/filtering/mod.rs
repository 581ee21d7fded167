// DANS : src/filtering/mod.rs

pub mod aggregator;

pub use aggregator::{AggregateStats, Aggregator, RejectReason, Verdict, MAX_OUTPUT_OVER_QUOTE};

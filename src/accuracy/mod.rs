pub mod repo;
pub mod tracker;

pub use tracker::{AccuracyRecord, AccuracyTracker, Tally};

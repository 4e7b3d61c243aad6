// warden-core/src/domain/scoring/mod.rs

pub mod criticality;

pub use criticality::{CriticalityBucket, CriticalityScore, CriticalityScorer};

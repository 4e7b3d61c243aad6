// warden-core/src/domain/governance/mod.rs

pub mod masking;

pub use masking::MaskingStrategy;

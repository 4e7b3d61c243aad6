// warden/src/commands/mod.rs

pub mod anomaly;
pub mod context;
pub mod fix;
pub mod issues;
pub mod output;
pub mod revalidate;
pub mod rules;
pub mod run;
pub mod score;
pub mod translate;

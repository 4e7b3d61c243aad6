// warden-core/src/domain/quality/mod.rs

pub mod catalog;
pub mod classify;
pub mod result;
pub mod rule;
pub mod source;

pub use catalog::RuleCatalog;
pub use classify::{Classification, PlannedQuery};
pub use result::{ExecutionError, ExecutionErrorKind, Outcome, RuleExecutionResult};
pub use rule::{
    CompareOp, Dimension, Metric, ProtectionRequirements, Rule, RuleKind, RuleScope, Severity,
};
pub use source::DataSourceDescriptor;

// warden-core/src/application/mod.rs

pub mod anomaly;
pub mod autofix;
pub mod cancellation;
pub mod engine;
pub mod lifecycle;
pub mod ports;
pub mod scheduler;
pub mod verification;

pub mod pipeline;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Le CLI fait simplement :
// `use warden_core::application::{run_quality_checks, RuleEngine, IssueLifecycleManager};`
// sans connaître la structure interne des fichiers.

pub use anomaly::AnomalyService;
pub use autofix::AutoFixService;
pub use cancellation::{CancellationToken, SourceCancellation};
pub use engine::{ExecutionContext, RuleEngine, SourceLimiter};
pub use lifecycle::{IssueLifecycleManager, RevalidationReport};
pub use pipeline::{QualityPipeline, RunSummary, run_quality_checks};
pub use scheduler::{JobHandle, Scheduler};
pub use verification::FixValidator;

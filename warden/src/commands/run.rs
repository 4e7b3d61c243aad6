// warden/src/commands/run.rs
//
// USE CASE: Execute the rules and update issues.

use std::path::Path;

use warden_core::application::{QualityPipeline, run_quality_checks};

use super::context::ProjectContext;

pub async fn execute(project_dir: &Path, select: Option<String>) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    println!("🔌 {} data sources, {} rules", ctx.config.sources.len(), ctx.rules.len());

    let scheduler = ctx.scheduler();
    let lifecycle = ctx.lifecycle();
    let anomaly = ctx.anomaly();
    let pipeline = QualityPipeline {
        rules: &ctx.rules,
        scheduler: &scheduler,
        history: ctx.store.as_ref(),
        lifecycle: &lifecycle,
        anomaly: Some(&anomaly),
    };

    let summary = run_quality_checks(&pipeline, select.as_deref()).await?;
    if !summary.issues.is_empty() {
        println!("🗂️  {} issues need attention (warden issues list)", summary.issues.len());
    }

    if summary.success {
        println!("\n✨ SUCCESS! All rules passed.");
        Ok(())
    } else {
        eprintln!(
            "\n❌ FAILURE. {} rules failed, {} could not run.",
            summary.failed, summary.errors
        );
        // Exit with error code for CI/CD
        std::process::exit(1);
    }
}

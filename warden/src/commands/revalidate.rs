// warden/src/commands/revalidate.rs
//
// USE CASE: Re-validation pass over resolved protection issues.

use std::path::Path;

use super::context::ProjectContext;

pub async fn execute(project_dir: &Path) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    println!("🔎 Re-validating resolved protection issues...");

    let report = ctx.lifecycle().revalidate(&ctx.rules, &ctx.validator()).await?;
    for id in &report.confirmed {
        println!("    ✅ {} still verified", id);
    }
    for id in &report.reopened {
        println!("    🔁 {} reopened", id);
    }
    for id in &report.skipped {
        println!("    ⏭️  {} skipped (rule missing or no protection requirement)", id);
    }
    println!(
        "✨ {} checked, {} confirmed, {} reopened.",
        report.checked,
        report.confirmed.len(),
        report.reopened.len()
    );
    Ok(())
}

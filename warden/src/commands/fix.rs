// warden/src/commands/fix.rs
//
// USE CASE: Auto-fix preview (dry run) and confirmed execution.

use std::path::Path;

use anyhow::Context;
use uuid::Uuid;
use warden_core::domain::remediation::FixType;

use super::context::ProjectContext;

fn parse(issue: &str, fix: &str) -> anyhow::Result<(Uuid, FixType)> {
    let id = Uuid::parse_str(issue).with_context(|| format!("'{}' is not an issue id", issue))?;
    let fix: FixType = fix.parse().map_err(anyhow::Error::msg)?;
    Ok((id, fix))
}

pub async fn preview(project_dir: &Path, issue: &str, raw_fix: &str) -> anyhow::Result<()> {
    let (id, fix) = parse(issue, raw_fix)?;
    let ctx = ProjectContext::load(project_dir)?;
    let preview = ctx.autofix().preview(id, &fix).await?;

    println!("🔍 Dry run for issue {}: {}", preview.issue_id, preview.fix_type);
    println!("   Affected rows: {}", preview.affected_rows);
    println!("   SQL: {}", preview.sql_preview);
    for w in &preview.warnings {
        println!("   ⚠️  {}", w);
    }
    if !preview.strategy_options.is_empty() {
        println!("   Alternatives: {}", preview.strategy_options.join(", "));
    }
    println!("   Apply with: warden fix execute --issue {} --fix {} --confirmed", preview.issue_id, raw_fix);
    Ok(())
}

pub async fn execute(project_dir: &Path, issue: &str, fix: &str, confirmed: bool) -> anyhow::Result<()> {
    let (id, fix) = parse(issue, fix)?;
    let ctx = ProjectContext::load(project_dir)?;
    let outcome = ctx.autofix().execute(id, &fix, confirmed).await?;
    println!("🛠️  {} applied: {} rows changed.", outcome.fix_type, outcome.rows_affected);
    Ok(())
}

// warden/src/commands/issues.rs
//
// USE CASE: List, acknowledge and resolve issues.

use std::path::Path;

use anyhow::Context;
use uuid::Uuid;
use warden_core::domain::issue::IssueFilter;

use super::context::ProjectContext;
use super::output::{clip, table};

pub struct ListOptions {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub bucket: Option<String>,
    pub source: Option<String>,
    pub rule: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl ListOptions {
    fn filter(&self) -> anyhow::Result<IssueFilter> {
        Ok(IssueFilter {
            status: self.status.as_deref().map(str::parse).transpose().map_err(anyhow::Error::msg)?,
            severity: self.severity.as_deref().map(str::parse).transpose().map_err(anyhow::Error::msg)?,
            bucket: self.bucket.as_deref().map(str::parse).transpose().map_err(anyhow::Error::msg)?,
            source: self.source.as_deref().map(str::parse).transpose().map_err(anyhow::Error::msg)?,
            rule_id: self.rule.clone(),
        })
    }
}

pub fn list(project_dir: &Path, options: ListOptions) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let page = ctx.lifecycle().list(&options.filter()?, options.offset, options.limit)?;

    let mut t = table(&["Id", "Status", "Score", "Bucket", "Source", "Rule", "Last seen", "Description"]);
    for issue in &page.items {
        t.add_row(vec![
            issue.id.to_string(),
            issue.status.to_string(),
            issue.criticality.score.to_string(),
            issue.criticality.bucket.to_string(),
            issue.source.to_string(),
            issue.rule_id.clone(),
            issue.last_seen_at.format("%Y-%m-%d %H:%M").to_string(),
            clip(issue.headline(), 60),
        ]);
    }
    println!("{t}");
    println!("   {} of {} issues", page.items.len(), page.total);
    if page.has_more() {
        println!("   more with --offset {}", page.offset + page.items.len());
    }
    Ok(())
}

fn parse_id(id: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("'{}' is not an issue id", id))
}

pub fn acknowledge(project_dir: &Path, id: &str) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let issue = ctx.lifecycle().acknowledge(parse_id(id)?)?;
    println!("👀 Issue {} acknowledged.", issue.id);
    Ok(())
}

pub fn resolve(project_dir: &Path, id: &str) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let issue = ctx.lifecycle().resolve(parse_id(id)?)?;
    println!("✅ Issue {} resolved.", issue.id);
    if issue.source == warden_core::domain::issue::IssueSource::Protection {
        println!("   Protection fixes are re-checked on the next `warden revalidate`.");
    }
    Ok(())
}

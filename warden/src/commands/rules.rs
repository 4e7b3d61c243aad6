// warden/src/commands/rules.rs
//
// USE CASE: Browse the rule catalogue.

use std::path::Path;

use super::context::ProjectContext;
use super::output::table;

pub fn execute(project_dir: &Path, all: bool, offset: usize, limit: usize) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let page = ctx.rules.page(offset, limit, !all);

    let mut t = table(&["Rule", "Check", "Dimension", "Severity", "Scope", "Dialect", "Enabled"]);
    for rule in &page.items {
        t.add_row(vec![
            rule.id.clone(),
            rule.kind.name().to_string(),
            format!("{:?}", rule.dimension).to_lowercase(),
            rule.severity.to_string(),
            rule.scope.label(),
            rule.dialect.to_string(),
            if rule.enabled { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{t}");
    println!("   {} of {} rules", page.items.len(), page.total);
    if page.has_more() {
        println!("   more with --offset {}", page.offset + page.items.len());
    }
    Ok(())
}

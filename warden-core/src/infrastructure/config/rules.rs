// warden-core/src/infrastructure/config/rules.rs

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use super::project::load_fragment;
use crate::domain::project::ProjectConfig;
use crate::domain::quality::{Rule, RuleCatalog};
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;

#[derive(Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

fn is_rule_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// Loads every `rules: [...]` file under the configured rule paths.
/// Invalid rules and duplicate ids stop the load: a half-loaded catalogue would silently skip checks.
#[instrument(skip(project_dir, config))]
pub fn load_rules(project_dir: &Path, config: &ProjectConfig) -> Result<RuleCatalog, WardenError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for rule_path in &config.rule_paths {
        let root = project_dir.join(rule_path);
        if !root.exists() {
            debug!(path = ?root, "Rule path does not exist, skipping");
            continue;
        }
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| InfrastructureError::Io(std::io::Error::other(e.to_string())))?;
            if entry.file_type().is_file() && is_rule_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    let mut rules = Vec::new();
    for file in &files {
        let parsed: RulesFile = load_fragment(file)?;
        for rule in parsed.rules {
            rule.check().map_err(|e| {
                InfrastructureError::ConfigError(format!("{} (in {:?})", e, file))
            })?;
            rules.push(rule);
        }
    }

    let catalog = RuleCatalog::new(rules)?;
    info!(files = files.len(), rules = catalog.len(), enabled = catalog.enabled().len(), "Rules loaded");
    Ok(catalog)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> ProjectConfig {
        serde_yaml::from_str("name: shop\nversion: \"1\"\n").unwrap()
    }

    const GOOD: &str = r#"
rules:
  - id: orders_not_empty
    dimension: completeness
    severity: high
    scope: { source: wh, table: orders }
    check: { type: threshold, metric: row_count, operator: ">=", threshold: 1 }
  - id: email_nulls
    dimension: completeness
    enabled: false
    scope: { source: wh, table: customers, column: email }
    check: { type: threshold, metric: null_rate, operator: "<=", threshold: 0.05 }
"#;

    #[test]
    fn test_walks_nested_rule_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("rules/sales"))?;
        fs::write(dir.path().join("rules/sales/orders.yml"), GOOD)?;
        fs::write(dir.path().join("rules/README.md"), "not a rule file")?;

        let catalog = load_rules(dir.path(), &project())?;
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.enabled().len(), 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_ids_across_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("rules"))?;
        fs::write(dir.path().join("rules/a.yml"), GOOD)?;
        fs::write(dir.path().join("rules/b.yaml"), GOOD)?;
        let err = load_rules(dir.path(), &project()).unwrap_err();
        assert!(matches!(err, WardenError::Domain(DomainError::InvalidRule { .. })));
        Ok(())
    }

    #[test]
    fn test_invalid_rule_names_the_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("rules"))?;
        fs::write(
            dir.path().join("rules/bad.yml"),
            "rules:\n  - id: p\n    dimension: validity\n    scope: { source: wh, table: t }\n    check: { type: pattern, regex: '^a' }\n",
        )?;
        let err = load_rules(dir.path(), &project()).unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
        Ok(())
    }
}

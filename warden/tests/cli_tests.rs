use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Abstraction for managing the Warden test environment.
struct WardenTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl WardenTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .context("Workspace root not found")?
            .join("demos/quality_project");

        let dest = tmp.path().join("quality_project");
        Self::copy_dir(&project_root, &dest)?;
        Self::seed(&dest.join("data/shop.duckdb"))?;

        Ok(Self { _tmp: tmp, root: dest })
    }

    fn copy_dir(src: &PathBuf, dst: &PathBuf) -> std::io::Result<()> {
        let mut options = fs_extra::dir::CopyOptions::new();
        options.skip_exist = true;
        options.content_only = true;

        std::fs::create_dir_all(dst)?;
        fs_extra::dir::copy(src, dst, &options)
            .map(|_| ())
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    /// 20 customers (4 without email, SSN in clear text), 10 orders (2 negative amounts).
    fn seed(db: &PathBuf) -> Result<()> {
        let conn = duckdb::Connection::open(db)?;
        conn.execute_batch(
            "CREATE TABLE customers AS
                SELECT i AS id,
                       CASE WHEN i % 5 = 0 THEN NULL ELSE 'user' || CAST(i AS VARCHAR) || '@shop.com' END AS email,
                       '123-45-' || lpad(CAST(i AS VARCHAR), 4, '0') AS ssn
                FROM range(1, 21) t(i);
             CREATE TABLE orders AS
                SELECT i AS id,
                       (i % 20) + 1 AS customer_id,
                       CASE WHEN i <= 2 THEN -5.0 ELSE 10.0 * i END AS amount,
                       now()::TIMESTAMP AS created_at
                FROM range(1, 11) t(i);",
        )?;
        Ok(())
    }

    fn warden(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("warden"));
        cmd.current_dir(&self.root);
        cmd
    }

    fn state(&self) -> Result<serde_json::Value> {
        let raw = std::fs::read_to_string(self.root.join(".warden/state.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn issue_id(&self, rule_id: &str) -> Result<String> {
        let state = self.state()?;
        state["issues"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|i| i["rule_id"] == rule_id)
            .and_then(|i| i["id"].as_str())
            .map(str::to_string)
            .with_context(|| format!("No issue for rule {}", rule_id))
    }

    fn issue_status(&self, rule_id: &str) -> Result<String> {
        let state = self.state()?;
        state["issues"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|i| i["rule_id"] == rule_id)
            .and_then(|i| i["status"].as_str())
            .map(str::to_string)
            .with_context(|| format!("No issue for rule {}", rule_id))
    }
}

#[test]
fn test_run_reports_failures_and_opens_issues() -> Result<()> {
    let env = WardenTestEnv::new()?;

    env.warden()
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("✅ customers_not_empty"))
        .stdout(predicate::str::contains("❌ email_null_rate"))
        .stdout(predicate::str::contains("❌ no_negative_amounts"))
        .stdout(predicate::str::contains("✅ orders_fresh"))
        .stderr(predicate::str::contains("FAILURE"));

    assert_eq!(env.issue_status("email_null_rate")?, "open");
    assert_eq!(env.issue_status("ssn_encrypted")?, "open");
    assert!(env.issue_id("customers_not_empty").is_err());

    env.warden()
        .args(["issues", "list", "--source", "protection"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ssn_encrypted"))
        .stdout(predicate::str::contains("email_null_rate").not());
    Ok(())
}

#[test]
fn test_run_select_unknown_rule_fails() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden()
        .args(["run", "--select", "does_not_exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does_not_exist"));
    Ok(())
}

#[test]
fn test_run_select_disabled_rule_is_refused() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden()
        .args(["run", "--select", "orders_match_customers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule_disabled"))
        .stdout(predicate::str::contains("SUCCESS").not());
    Ok(())
}

#[test]
fn test_rules_hides_disabled_unless_all() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden()
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("email_format"))
        .stdout(predicate::str::contains("orders_match_customers").not());

    env.warden()
        .args(["rules", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("orders_match_customers"));
    Ok(())
}

#[test]
fn test_translate_filter_clause_for_sql_server() -> Result<()> {
    Command::new(assert_cmd::cargo::cargo_bin!("warden"))
        .args([
            "translate",
            "SELECT COUNT(*) FILTER (WHERE amount < 0) AS failing_rows FROM orders",
            "--from",
            "postgres",
            "--to",
            "mssql",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SUM(CASE WHEN"))
        .stdout(predicate::str::contains("FILTER").not());
    Ok(())
}

#[test]
fn test_score_command() -> Result<()> {
    Command::new(assert_cmd::cargo::cargo_bin!("warden"))
        .args(["score", "--severity", "critical", "--rows", "5000", "--revenue", "60000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("90 (critical)"));

    Command::new(assert_cmd::cargo::cargo_bin!("warden"))
        .args(["score", "--severity", "catastrophic"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_fix_requires_confirmation() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden().arg("run").assert().failure();
    let issue = env.issue_id("email_null_rate")?;

    env.warden()
        .args(["fix", "preview", "--issue", &issue, "--fix", "fill_nulls:unknown@shop.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Affected rows: 4"));

    env.warden()
        .args(["fix", "execute", "--issue", &issue, "--fix", "fill_nulls:unknown@shop.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("confirmation_missing"));

    env.warden()
        .args(["fix", "execute", "--issue", &issue, "--fix", "fill_nulls:unknown@shop.com", "--confirmed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 rows changed"));

    // Auto-fix leaves the issue alone; the next run resolves it.
    assert_eq!(env.issue_status("email_null_rate")?, "open");
    env.warden().args(["run", "--select", "email_null_rate"]).assert().success();
    assert_eq!(env.issue_status("email_null_rate")?, "resolved");
    Ok(())
}

#[test]
fn test_revalidate_reopens_unprotected_column() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden().arg("run").assert().failure();
    let issue = env.issue_id("ssn_encrypted")?;

    env.warden().args(["issues", "resolve", &issue]).assert().success();
    assert_eq!(env.issue_status("ssn_encrypted")?, "resolved");

    // SSNs are still clear text: the resolution does not hold.
    env.warden()
        .arg("revalidate")
        .assert()
        .success()
        .stdout(predicate::str::contains("reopened"));
    assert_eq!(env.issue_status("ssn_encrypted")?, "open");
    Ok(())
}

#[test]
fn test_missing_project_config_is_reported() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    Command::new(assert_cmd::cargo::cargo_bin!("warden"))
        .current_dir(tmp.path())
        .arg("rules")
        .assert()
        .failure()
        .stderr(predicate::str::contains("warden.yaml"));
    Ok(())
}

// warden/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Data quality rules: execution, issue lifecycle and fix verification", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project directory (contains warden.yaml)
    #[arg(long, default_value = ".", global = true)]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🚀 Executes the enabled rules and updates issues
    Run {
        /// Run only one rule (ex: "email_not_null")
        #[arg(long, short)]
        select: Option<String>,
    },

    /// 📋 Lists the rule catalogue
    Rules {
        /// Include disabled rules
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        page: PageArgs,
    },

    /// 🔀 Translates a SQL query between dialects (no execution)
    Translate {
        sql: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// 🎯 Computes a criticality score
    Score {
        #[arg(long, default_value = "medium")]
        severity: String,
        #[arg(long, default_value = "0")]
        rows: u64,
        /// Estimated dollars at risk
        #[arg(long)]
        revenue: Option<f64>,
        /// Structural "table has at least one row" check
        #[arg(long)]
        empty_table: bool,
    },

    /// 🗂️ Lists and transitions issues
    Issues {
        #[command(subcommand)]
        action: IssueAction,
    },

    /// 🔁 Re-checks resolved protection issues against live data
    Revalidate,

    /// 📈 Trains anomaly models and lists predictions
    Anomaly {
        #[command(subcommand)]
        action: AnomalyAction,
    },

    /// 🛠️ Previews or applies an auto-fix for an issue
    Fix {
        #[command(subcommand)]
        action: FixAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(long, default_value = "50")]
    pub limit: usize,
}

#[derive(Subcommand)]
pub enum IssueAction {
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        /// critical | medium | low | informational
        #[arg(long)]
        bucket: Option<String>,
        /// rule_failure | rule_health | anomaly | protection
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        rule: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    Ack {
        id: String,
    },
    Resolve {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AnomalyAction {
    /// Retrains one rule, or every statistical rule
    Train {
        #[arg(long)]
        rule: Option<String>,
        /// z_score | seasonal | isolation
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        window_days: Option<u32>,
    },
    /// Recent predictions above a score
    List {
        #[arg(long)]
        rule: Option<String>,
        #[arg(long, default_value = "1.0")]
        min_score: f64,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum FixAction {
    Preview {
        #[arg(long)]
        issue: String,
        /// delete_null_rows | fill_nulls:<value> | trim_whitespace | mask_column:<strategy>
        #[arg(long)]
        fix: String,
    },
    Execute {
        #[arg(long)]
        issue: String,
        #[arg(long)]
        fix: String,
        /// Required: applies the mutation previewed by `fix preview`
        #[arg(long)]
        confirmed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["warden", "run"]);
        assert_eq!(args.project_dir.to_string_lossy(), ".");
        match args.command {
            Commands::Run { select } => {
                assert_eq!(select, None);
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_select() -> Result<()> {
        let args = Cli::parse_from(["warden", "run", "--select", "email_not_null", "--project-dir", "/tmp"]);
        assert_eq!(args.project_dir.to_string_lossy(), "/tmp");
        match args.command {
            Commands::Run { select } => {
                assert_eq!(select, Some("email_not_null".to_string()));
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_issue_list_filters() -> Result<()> {
        let args = Cli::parse_from(["warden", "issues", "list", "--status", "open", "--limit", "5"]);
        match args.command {
            Commands::Issues {
                action: IssueAction::List { status, page, .. },
            } => {
                assert_eq!(status.as_deref(), Some("open"));
                assert_eq!(page.limit, 5);
                assert_eq!(page.offset, 0);
                Ok(())
            }
            _ => bail!("Expected Issues List command"),
        }
    }

    #[test]
    fn test_cli_parse_fix_execute_defaults_to_unconfirmed() -> Result<()> {
        let args = Cli::parse_from(["warden", "fix", "execute", "--issue", "x", "--fix", "trim_whitespace"]);
        match args.command {
            Commands::Fix {
                action: FixAction::Execute { confirmed, fix, .. },
            } => {
                assert!(!confirmed);
                assert_eq!(fix, "trim_whitespace");
                Ok(())
            }
            _ => bail!("Expected Fix Execute command"),
        }
    }
}

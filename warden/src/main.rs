// warden/src/main.rs

mod cli;
mod commands;

use clap::Parser;

use cli::{AnomalyAction, Cli, Commands, FixAction, IssueAction};
use warden_core::domain::error::DomainError;
use warden_core::WardenError;
use warden_core::infrastructure::error::InfrastructureError;

#[tokio::main]
async fn main() {
    // RUST_LOG=debug warden run ... pour voir les détails
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        report(e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.project_dir;

    match cli.command {
        // --- USE CASE: RUN RULES ---
        Commands::Run { select } => commands::run::execute(&project_dir, select).await,

        // --- USE CASE: RULE CATALOGUE ---
        Commands::Rules { all, page } => commands::rules::execute(&project_dir, all, page.offset, page.limit),

        // --- USE CASE: DIALECT TRANSLATION ---
        Commands::Translate { sql, from, to } => commands::translate::execute(&sql, &from, &to),

        // --- USE CASE: CRITICALITY ---
        Commands::Score {
            severity,
            rows,
            revenue,
            empty_table,
        } => commands::score::execute(&severity, rows, revenue, empty_table),

        // --- USE CASE: ISSUES ---
        Commands::Issues { action } => match action {
            IssueAction::List {
                status,
                severity,
                bucket,
                source,
                rule,
                page,
            } => commands::issues::list(
                &project_dir,
                commands::issues::ListOptions {
                    status,
                    severity,
                    bucket,
                    source,
                    rule,
                    offset: page.offset,
                    limit: page.limit,
                },
            ),
            IssueAction::Ack { id } => commands::issues::acknowledge(&project_dir, &id),
            IssueAction::Resolve { id } => commands::issues::resolve(&project_dir, &id),
        },

        Commands::Revalidate => commands::revalidate::execute(&project_dir).await,

        // --- USE CASE: ANOMALY MODELS ---
        Commands::Anomaly { action } => match action {
            AnomalyAction::Train {
                rule,
                model,
                window_days,
            } => commands::anomaly::train(&project_dir, rule, model, window_days),
            AnomalyAction::List { rule, min_score, limit } => {
                commands::anomaly::list(&project_dir, rule, min_score, limit)
            }
        },

        // --- USE CASE: AUTO-FIX ---
        Commands::Fix { action } => match action {
            FixAction::Preview { issue, fix } => commands::fix::preview(&project_dir, &issue, &fix).await,
            FixAction::Execute { issue, fix, confirmed } => {
                commands::fix::execute(&project_dir, &issue, &fix, confirmed).await
            }
        },
    }
}

/// Config and domain errors carry miette diagnostics (code + help); everything else prints its chain.
fn report(e: anyhow::Error) {
    let chain: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
    let e = match e.downcast::<WardenError>() {
        Ok(WardenError::Domain(domain)) => return eprintln!("{:?}", miette::Report::new(domain)),
        Ok(WardenError::Infrastructure(infra)) => return eprintln!("{:?}", miette::Report::new(infra)),
        Ok(other) => anyhow::Error::new(other),
        Err(e) => e,
    };
    let e = match e.downcast::<InfrastructureError>() {
        Ok(infra) => return eprintln!("{:?}", miette::Report::new(infra)),
        Err(e) => e,
    };
    let e = match e.downcast::<DomainError>() {
        Ok(domain) => return eprintln!("{:?}", miette::Report::new(domain)),
        Err(e) => e,
    };
    eprintln!("❌ Error: {}", e);
    for cause in chain {
        eprintln!("   caused by: {}", cause);
    }
}

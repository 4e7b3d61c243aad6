// warden/src/commands/score.rs
//
// USE CASE: Criticality score of a hypothetical failure.

use warden_core::domain::quality::Severity;
use warden_core::domain::scoring::CriticalityScorer;

pub fn execute(severity: &str, rows: u64, revenue: Option<f64>, empty_table: bool) -> anyhow::Result<()> {
    let severity: Severity = severity.parse().map_err(anyhow::Error::msg)?;
    let score = CriticalityScorer::score(severity, rows, revenue, empty_table);
    println!("{} ({})", score.score, score.bucket);
    Ok(())
}

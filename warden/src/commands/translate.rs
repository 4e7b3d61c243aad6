// warden/src/commands/translate.rs
//
// USE CASE: Show how a query reads in another dialect (no execution).

use warden_core::domain::dialect::{Dialect, DialectTranslator};

pub fn execute(sql: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let from: Dialect = from.parse().map_err(anyhow::Error::msg)?;
    let to: Dialect = to.parse().map_err(anyhow::Error::msg)?;

    let translation = DialectTranslator::new().translate_with_report(sql, from, to);
    println!("{}", translation.sql);

    if !translation.applied.is_empty() {
        let idioms: Vec<String> = translation.applied.iter().map(|i| i.to_string()).collect();
        eprintln!("🔀 {} -> {}: {}", from, to, idioms.join(", "));
    }
    for note in &translation.notes {
        eprintln!("⚠️  {}", note);
    }
    Ok(())
}

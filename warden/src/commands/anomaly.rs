// warden/src/commands/anomaly.rs
//
// USE CASE: Batch training of anomaly models, listing of predictions.

use std::path::Path;

use chrono::Utc;
use warden_core::domain::anomaly::ModelKind;

use super::context::ProjectContext;
use super::output::table;

pub fn train(
    project_dir: &Path,
    rule: Option<String>,
    model: Option<String>,
    window_days: Option<u32>,
) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let service = ctx.anomaly();
    let kind: Option<ModelKind> = model.as_deref().map(str::parse).transpose().map_err(anyhow::Error::msg)?;
    let now = Utc::now();

    println!("🧠 Training anomaly models...");
    match rule {
        Some(id) => {
            let rule = ctx.rules.require(&id)?;
            let model = service.train(rule, kind, window_days, now)?;
            println!("    ✅ {}: {} model on {} points", id, model.kind, model.points);
        }
        None => {
            let trained = service.train_all(&ctx.rules, now);
            if trained.is_empty() {
                println!("    No statistical_anomaly rules; use --rule to train any other rule.");
            }
            for (id, outcome) in trained {
                match outcome {
                    Ok(model) => println!("    ✅ {}: {} model on {} points", id, model.kind, model.points),
                    Err(e) => eprintln!("    ⚠️  {}: {}", id, e),
                }
            }
        }
    }
    Ok(())
}

pub fn list(project_dir: &Path, rule: Option<String>, min_score: f64, limit: usize) -> anyhow::Result<()> {
    let ctx = ProjectContext::load(project_dir)?;
    let predictions = ctx.anomaly().recent(rule.as_deref(), min_score, limit)?;

    let mut t = table(&["When", "Rule", "Observed", "Expected", "Score", "Confidence", "Anomaly"]);
    for p in &predictions {
        t.add_row(vec![
            p.predicted_at.format("%Y-%m-%d %H:%M").to_string(),
            p.rule_id.clone(),
            format!("{:.4}", p.observed_value),
            format!("{:.4}", p.predicted_value),
            format!("{:.2}", p.score),
            format!("{:.2}", p.confidence),
            if p.is_anomaly { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{t}");
    Ok(())
}

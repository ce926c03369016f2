//! `remedy plan` — enumerate planned attempts without side effects.

use std::path::PathBuf;

use anyhow::Result;
use remedy_core::config::RemedyConfig;

pub async fn run(project: PathBuf, config: RemedyConfig, json: bool) -> Result<()> {
    let orchestrator = super::build_orchestrator(&project, config)?;
    let attempts = orchestrator.plan_only().await?;

    if json {
        let entries: Vec<serde_json::Value> = attempts
            .iter()
            .map(|attempt| {
                serde_json::json!({
                    "package": attempt.package.full_name(),
                    "workspace": attempt.workspace.name,
                    "installed": attempt.installed.to_string(),
                    "advisory": attempt.alert.id,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("Nothing to remediate.");
        return Ok(());
    }
    for attempt in &attempts {
        println!(
            "{}\t{}\t{}\t{}",
            attempt.package.full_name(),
            attempt.workspace.name,
            attempt.installed,
            attempt.alert.id
        );
    }
    Ok(())
}

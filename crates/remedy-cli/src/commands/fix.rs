//! `remedy fix` — run one remediation pass.

use std::path::PathBuf;

use anyhow::Result;
use remedy_core::config::RemedyConfig;
use tracing::info;

pub async fn run(project: PathBuf, config: RemedyConfig) -> Result<()> {
    let orchestrator = super::build_orchestrator(&project, config)?;
    let report = orchestrator.run().await?;
    info!(
        fixed = report.fixed,
        attempts = report.attempts,
        "remediation run complete"
    );

    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    if report.stopped_at_limit {
        eprintln!("attempt limit reached; run again to continue");
    }

    if report.fixed {
        println!(
            "Fixed vulnerable dependencies ({} attempt{}).",
            report.attempts,
            if report.attempts == 1 { "" } else { "s" }
        );
    } else if report.attempts == 0 && report.warnings.is_empty() {
        println!("No vulnerable dependencies found.");
    } else {
        println!("No dependencies were fixed.");
    }
    Ok(())
}

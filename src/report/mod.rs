pub mod json;

use crate::harness::{CheckStatus, JobOutcome, SmokeSummary};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

fn status_label(status: CheckStatus) -> colored::ColoredString {
    match status {
        CheckStatus::Pass => "PASS".green().bold(),
        CheckStatus::Warn => "WARN".yellow().bold(),
        CheckStatus::Fail => "FAIL".red().bold(),
    }
}

/// Print the human-readable run summary.
pub fn render_table(summary: &SmokeSummary) {
    println!();
    println!("{}", "Smoke Summary".bold());
    println!("  Started: {}", summary.started_at);
    println!("  Base URL: {}", summary.base_url.cyan());
    println!(
        "  Job: {} {} epochs={}",
        summary.params.symbol.cyan(),
        summary.params.model_type.cyan(),
        summary.params.epochs
    );
    println!();

    for check in &summary.checks {
        println!(
            "  {} {:<12} {:<28} {} ({}ms)",
            status_label(check.status),
            check.step,
            check.endpoint,
            check.detail,
            check.duration_ms
        );
    }

    println!();
    match &summary.job {
        JobOutcome::NotStarted => println!("  Job: not started"),
        JobOutcome::Succeeded { artifact_path } => println!(
            "  Job: {} (artifact: {})",
            "succeeded".green(),
            artifact_path.as_deref().unwrap_or("(none)")
        ),
        JobOutcome::Failed { error } => println!("  Job: {} ({})", "failed".red(), error),
        JobOutcome::TimedOut { waited_secs } => {
            println!("  Job: {} after {}s", "timed out".red(), waited_secs)
        }
    }

    if !summary.classifications.is_empty() {
        println!("  Classifications:");
        for classification in &summary.classifications {
            println!("    - {:?}", classification);
        }
    }

    let verdict = if summary.passed() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    println!(
        "  Result: {} (pass={} warn={} fail={})",
        verdict, summary.counts.pass, summary.counts.warn, summary.counts.fail
    );
}

/// Load a previously saved summary for re-rendering.
pub fn load(path: &Path) -> Result<SmokeSummary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read summary: {}", path.display()))?;
    let summary: SmokeSummary = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse summary: {}", path.display()))?;
    Ok(summary)
}

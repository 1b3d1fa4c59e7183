use crate::harness::SmokeSummary;
use anyhow::{Context, Result};
use std::path::Path;

/// Serialize the summary; to a file when a path is given, stdout otherwise.
pub fn write(summary: &SmokeSummary, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;

    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("JSON summary saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{CheckCounts, JobOutcome, SmokeParams, SmokeSummary};

    fn sample_summary() -> SmokeSummary {
        SmokeSummary {
            started_at: "2026-08-25T10:00:00Z".into(),
            base_url: "http://127.0.0.1:8420".into(),
            params: SmokeParams {
                symbol: "AAPL".into(),
                model_type: "lstm".into(),
                epochs: 1,
                job_kind: "deep-learning".into(),
                health_timeout_secs: 30,
                job_timeout_secs: 600,
            },
            checks: vec![],
            counts: CheckCounts::default(),
            job: JobOutcome::TimedOut { waited_secs: 600 },
            classifications: vec![],
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke_summary.json");
        write(&sample_summary(), Some(&path)).unwrap();

        let loaded = crate::report::load(&path).unwrap();
        assert_eq!(loaded.base_url, "http://127.0.0.1:8420");
        assert_eq!(loaded.job, JobOutcome::TimedOut { waited_secs: 600 });
    }
}

use crate::client::Api;
use crate::harness::types::{JobHandle, JobOutcome, JobStatus};
use crate::harness::SmokeOptions;
use log::warn;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Instant;

/// Field names an enqueue response may carry the job identifier under,
/// consulted in order; first present, non-empty value wins.
pub const JOB_ID_ALIASES: &[&str] = &["id", "job_id", "jobId"];

/// Field names a failed job may carry its human-readable error under.
pub const JOB_ERROR_ALIASES: &[&str] = &["error", "detail", "message", "reason"];

/// Field names a finished job may carry its result artifact path under.
pub const ARTIFACT_ALIASES: &[&str] = &["model_path", "artifact_path", "output_path"];

pub fn train_path(job_kind: &str) -> String {
    format!("/api/jobs/{}/train", job_kind)
}

pub fn job_path(job_id: &str) -> String {
    format!("/api/jobs/{}", job_id)
}

/// First non-empty value among `aliases`, stringified and trimmed.
pub fn extract_alias(payload: &Value, aliases: &[&str]) -> Option<String> {
    let map = payload.as_object()?;
    for key in aliases {
        let value = match map.get(*key) {
            Some(Value::Null) | None => continue,
            Some(Value::String(text)) => text.trim().to_string(),
            Some(other) => other.to_string(),
        };
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

pub fn extract_job_id(payload: &Value) -> Option<String> {
    extract_alias(payload, JOB_ID_ALIASES)
}

pub fn extract_job_error(payload: &Value) -> Option<String> {
    extract_alias(payload, JOB_ERROR_ALIASES)
}

pub fn extract_artifact_path(payload: &Value) -> Option<String> {
    extract_alias(payload, ARTIFACT_ALIASES)
}

fn extract_status_text(payload: &Value) -> String {
    payload
        .as_object()
        .and_then(|map| map.get("status"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Job failures caused by an uninstalled runtime package, e.g.
/// "No module named 'torch'".
pub fn is_missing_dependency(error: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r#"(?i)no module named ['"]?\w+"#).expect("static regex"));
    pattern.is_match(error)
}

/// Enqueue one training job. Err carries the operator-facing reason.
pub async fn submit(api: &dyn Api, opts: &SmokeOptions) -> Result<JobHandle, String> {
    let body = json!({
        "symbol": opts.symbol,
        "model_type": opts.model_type,
        "epochs": opts.epochs,
    });
    let response = api
        .post_json(&train_path(&opts.job_kind), opts.submit_timeout, &body)
        .await;
    if !response.ok {
        let reason = if response.error.is_empty() {
            "enqueue request failed".to_string()
        } else {
            response.error.clone()
        };
        return Err(reason);
    }
    match extract_job_id(&response.payload) {
        Some(id) => Ok(JobHandle::new(id)),
        None => Err(format!(
            "enqueue response missing job id: {}",
            response.payload
        )),
    }
}

/// Poll the job until a terminal status or the job deadline. Transient
/// polling errors are logged and retried; they never abort the loop.
pub async fn poll(api: &dyn Api, handle: &mut JobHandle, opts: &SmokeOptions) -> JobOutcome {
    let path = job_path(&handle.id);
    let deadline = Instant::now() + opts.job_timeout;
    loop {
        let response = api.get_json(&path, opts.request_timeout).await;
        if !response.ok {
            warn!("job poll error ({}), retrying until deadline", response.error);
        } else if !response.payload.is_object() {
            warn!("job poll returned a non-object payload, retrying until deadline");
        } else {
            if let Some(artifact) = extract_artifact_path(&response.payload) {
                handle.artifact_path = Some(artifact);
            }
            handle.status = JobStatus::parse(&extract_status_text(&response.payload));
            match handle.status {
                JobStatus::Success => {
                    return JobOutcome::Succeeded {
                        artifact_path: handle.artifact_path.clone(),
                    };
                }
                JobStatus::Failed => {
                    let error = extract_job_error(&response.payload)
                        .unwrap_or_else(|| "job reported failure without detail".to_string());
                    handle.error = Some(error.clone());
                    return JobOutcome::Failed { error };
                }
                _ => {}
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(opts.job_poll).await;
    }
    JobOutcome::TimedOut {
        waited_secs: opts.job_timeout.as_secs(),
    }
}

use serde::{Deserialize, Serialize};

/// Outcome of a single smoke check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One entry in the run's ordered check sequence. Append-only: a correction
/// is a new entry, never an edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub step: String,
    pub status: CheckStatus,
    pub endpoint: String,
    pub detail: String,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn new(
        step: &str,
        status: CheckStatus,
        endpoint: &str,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step: step.to_string(),
            status,
            endpoint: endpoint.to_string(),
            detail: detail.into(),
            duration_ms,
        }
    }
}

/// Server-reported job state, normalized case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "success" | "completed" => JobStatus::Success,
            "failed" | "error" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// The single tracked job of a smoke run. Mutated only by re-fetching
/// status from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub artifact_path: Option<String>,
}

impl JobHandle {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            error: None,
            artifact_path: None,
        }
    }
}

/// Harness-local job verdict. A timeout is the harness's own judgment and
/// is kept distinct from a server-reported failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    NotStarted,
    Succeeded { artifact_path: Option<String> },
    Failed { error: String },
    TimedOut { waited_secs: u64 },
}

/// Coarse triage labels attached to the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    ApiContractInconsistent,
    BackendDown,
    JobTimeout,
    MissingDependency,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
}

impl CheckCounts {
    pub fn tally(checks: &[CheckResult]) -> Self {
        let mut counts = CheckCounts::default();
        for check in checks {
            match check.status {
                CheckStatus::Pass => counts.pass += 1,
                CheckStatus::Warn => counts.warn += 1,
                CheckStatus::Fail => counts.fail += 1,
            }
        }
        counts
    }
}

/// Invocation parameters recorded into the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeParams {
    pub symbol: String,
    pub model_type: String,
    pub epochs: u32,
    pub job_kind: String,
    pub health_timeout_secs: u64,
    pub job_timeout_secs: u64,
}

/// Produced exactly once per smoke run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeSummary {
    pub started_at: String,
    pub base_url: String,
    pub params: SmokeParams,
    pub checks: Vec<CheckResult>,
    pub counts: CheckCounts,
    pub job: JobOutcome,
    pub classifications: Vec<Classification>,
}

impl SmokeSummary {
    /// Overall verdict: any FAIL sinks the run; WARNs never do.
    pub fn passed(&self) -> bool {
        self.counts.fail == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

pub mod health;
pub mod job;
pub mod types;
pub mod universe;

use crate::client::Api;
use crate::config::OpsConfig;
use log::info;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

pub use types::{
    CheckCounts, CheckResult, CheckStatus, Classification, JobHandle, JobOutcome, JobStatus,
    SmokeParams, SmokeSummary,
};

/// Parameters for one smoke run.
#[derive(Debug, Clone)]
pub struct SmokeOptions {
    pub base_url: String,
    pub symbol: String,
    pub model_type: String,
    pub epochs: u32,
    pub job_kind: String,
    pub health_timeout: Duration,
    pub health_poll: Duration,
    pub health_call_timeout: Duration,
    pub request_timeout: Duration,
    pub submit_timeout: Duration,
    pub job_timeout: Duration,
    pub job_poll: Duration,
    pub skip_job: bool,
}

impl Default for SmokeOptions {
    fn default() -> Self {
        Self::from_config(&OpsConfig::default())
    }
}

impl SmokeOptions {
    pub fn from_config(config: &OpsConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            symbol: "AAPL".to_string(),
            model_type: "lstm".to_string(),
            epochs: 1,
            job_kind: "deep-learning".to_string(),
            health_timeout: config.health_timeout,
            health_poll: config.health_poll,
            health_call_timeout: config.health_call_timeout,
            request_timeout: config.request_timeout,
            submit_timeout: config.submit_timeout,
            job_timeout: config.job_timeout,
            job_poll: config.job_poll,
            skip_job: false,
        }
    }

    fn params(&self) -> SmokeParams {
        SmokeParams {
            symbol: self.symbol.clone(),
            model_type: self.model_type.clone(),
            epochs: self.epochs,
            job_kind: self.job_kind.clone(),
            health_timeout_secs: self.health_timeout.as_secs(),
            job_timeout_secs: self.job_timeout.as_secs(),
        }
    }
}

const STATUS_PATH: &str = "/api/status";

/// Drives the fixed check sequence against a backend and accumulates the
/// run's single result list. One harness instance produces one summary.
pub struct SmokeHarness<'a> {
    api: &'a dyn Api,
    opts: SmokeOptions,
    checks: Vec<CheckResult>,
    classifications: BTreeSet<Classification>,
}

impl<'a> SmokeHarness<'a> {
    pub fn new(api: &'a dyn Api, opts: SmokeOptions) -> Self {
        Self {
            api,
            opts,
            checks: Vec::new(),
            classifications: BTreeSet::new(),
        }
    }

    /// Run HEALTH -> STATUS -> UNIVERSE -> JOB_SUBMIT -> JOB_POLL.
    /// Sequential; each step's outcome gates whether later steps run.
    pub async fn run(mut self) -> SmokeSummary {
        let started_at = chrono::Utc::now().to_rfc3339();

        if !self.check_health().await {
            self.classifications.insert(Classification::BackendDown);
            return self.finish(started_at, JobOutcome::NotStarted);
        }

        self.check_api_status().await;

        let universe = universe::check(self.api, self.opts.request_timeout).await;
        self.checks.push(universe);

        if self.opts.skip_job {
            self.checks.push(CheckResult::new(
                "job_submit",
                CheckStatus::Warn,
                &format!("POST {}", job::train_path(&self.opts.job_kind)),
                "skipped by flag",
                0,
            ));
            return self.finish(started_at, JobOutcome::NotStarted);
        }

        let job_outcome = self.run_job().await;
        self.finish(started_at, job_outcome)
    }

    async fn check_health(&mut self) -> bool {
        let (healthy, elapsed, detail) = health::wait_healthy(
            self.api,
            self.opts.health_timeout,
            self.opts.health_poll,
            self.opts.health_call_timeout,
        )
        .await;
        let detail = if healthy {
            format!("healthy in {:.1}s", elapsed.as_secs_f64())
        } else {
            format!(
                "not healthy after {}s ({})",
                self.opts.health_timeout.as_secs(),
                detail
            )
        };
        self.checks.push(CheckResult::new(
            "health",
            if healthy {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
            &format!("GET {}", health::HEALTH_PATH),
            detail,
            elapsed.as_millis() as u64,
        ));
        healthy
    }

    async fn check_api_status(&mut self) {
        let started = Instant::now();
        let response = self
            .api
            .get_json(STATUS_PATH, self.opts.request_timeout)
            .await;
        let ok = response.ok && response.payload.is_object();
        if !ok {
            self.classifications
                .insert(Classification::ApiContractInconsistent);
        }
        self.checks.push(CheckResult::new(
            "api_status",
            if ok { CheckStatus::Pass } else { CheckStatus::Fail },
            &format!("GET {}", STATUS_PATH),
            if ok {
                "ok".to_string()
            } else if response.error.is_empty() {
                "unexpected response".to_string()
            } else {
                response.error.clone()
            },
            started.elapsed().as_millis() as u64,
        ));
    }

    async fn run_job(&mut self) -> JobOutcome {
        let endpoint = format!("POST {}", job::train_path(&self.opts.job_kind));
        let started = Instant::now();
        let mut handle = match job::submit(self.api, &self.opts).await {
            Ok(handle) => {
                info!("job enqueued id={}", handle.id);
                self.checks.push(CheckResult::new(
                    "job_submit",
                    CheckStatus::Pass,
                    &endpoint,
                    format!("job enqueued id={}", handle.id),
                    started.elapsed().as_millis() as u64,
                ));
                handle
            }
            Err(reason) => {
                self.classifications
                    .insert(Classification::ApiContractInconsistent);
                self.checks.push(CheckResult::new(
                    "job_submit",
                    CheckStatus::Fail,
                    &endpoint,
                    reason,
                    started.elapsed().as_millis() as u64,
                ));
                return JobOutcome::NotStarted;
            }
        };

        let endpoint = format!("GET {}", job::job_path(&handle.id));
        let started = Instant::now();
        let outcome = job::poll(self.api, &mut handle, &self.opts).await;
        let (status, detail) = match &outcome {
            JobOutcome::Succeeded { artifact_path } => (
                CheckStatus::Pass,
                match artifact_path {
                    Some(path) => format!("job succeeded, artifact {}", path),
                    None => "job succeeded".to_string(),
                },
            ),
            JobOutcome::Failed { error } => {
                if job::is_missing_dependency(error) {
                    self.classifications.insert(Classification::MissingDependency);
                }
                (CheckStatus::Fail, format!("job failed: {}", error))
            }
            JobOutcome::TimedOut { waited_secs } => {
                self.classifications.insert(Classification::JobTimeout);
                (
                    CheckStatus::Fail,
                    format!("no terminal status within {}s job timeout", waited_secs),
                )
            }
            JobOutcome::NotStarted => (CheckStatus::Fail, "job never started".to_string()),
        };
        self.checks.push(CheckResult::new(
            "job_poll",
            status,
            &endpoint,
            detail,
            started.elapsed().as_millis() as u64,
        ));
        outcome
    }

    fn finish(self, started_at: String, job: JobOutcome) -> SmokeSummary {
        let counts = CheckCounts::tally(&self.checks);
        SmokeSummary {
            started_at,
            base_url: self.opts.base_url.clone(),
            params: self.opts.params(),
            checks: self.checks,
            counts,
            job,
            classifications: self.classifications.into_iter().collect(),
        }
    }
}

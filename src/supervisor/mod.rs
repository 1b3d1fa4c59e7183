pub mod allowlist;
pub mod host;
pub mod probe;

pub use host::HostProbe;
pub use probe::{PortOwner, SystemProbe};

use crate::client::Api;
use crate::config::{KillPolicy, OpsConfig};
use crate::harness::health;
use allowlist::is_safe_to_kill;
use log::{info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("backend did not become healthy within {timeout_secs}s: {last_detail}")]
    HealthTimeout {
        timeout_secs: u64,
        last_detail: String,
    },

    #[error("port {port} is held by pid {pid} ({cmdline}); refusing to terminate it")]
    ForeignProcess {
        port: u16,
        pid: u32,
        cmdline: String,
    },

    #[error("failed to launch backend: {detail}")]
    LaunchFailed { detail: String },

    #[error("system probe failed: {detail}")]
    ProbeFailed { detail: String },
}

/// Successful `ensure_running` outcome.
#[derive(Debug, Clone)]
pub struct Healthy {
    pub waited: Duration,
    /// False when an already-running backend answered the first probe.
    pub launched: bool,
}

/// Successful `stop` outcome. `terminated_pid` is None when there was
/// nothing to stop.
#[derive(Debug, Clone)]
pub struct Stopped {
    pub terminated_pid: Option<u32>,
}

/// Snapshot for the `status` command.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub healthy: bool,
    pub detail: String,
    pub owner: Option<PortOwner>,
    /// Whether the port owner matches the allowlist. None when the port
    /// is free.
    pub managed: Option<bool>,
}

/// Lifecycle manager for the backend process. Health is always judged
/// through the HTTP endpoint; the process table is consulted only when
/// the endpoint does not answer.
pub struct Supervisor<'a> {
    config: &'a OpsConfig,
    api: &'a dyn Api,
    probe: &'a dyn SystemProbe,
}

impl<'a> Supervisor<'a> {
    pub fn new(config: &'a OpsConfig, api: &'a dyn Api, probe: &'a dyn SystemProbe) -> Self {
        Self { config, api, probe }
    }

    fn may_terminate(&self, owner: &PortOwner, force: bool) -> bool {
        force
            || self.config.kill_policy == KillPolicy::Force
            || is_safe_to_kill(owner, &self.config.allowlist)
    }

    /// Bring the backend up and wait for `/health` to pass. Never
    /// terminates a port owner the allowlist does not cover unless
    /// `force` is set.
    pub async fn ensure_running(&self, force: bool) -> Result<Healthy, SupervisorError> {
        let started = Instant::now();

        if health::health_once(self.api, self.config.health_call_timeout)
            .await
            .is_ok()
        {
            info!("backend already healthy at {}", self.config.base_url);
            return Ok(Healthy {
                waited: started.elapsed(),
                launched: false,
            });
        }

        // Unhealthy but the port may still be occupied, by a stale
        // instance of ours or by an unrelated process.
        let owner = self
            .probe
            .find_port_owner(self.config.port)
            .await
            .map_err(|e| SupervisorError::ProbeFailed {
                detail: e.to_string(),
            })?;
        if let Some(owner) = owner {
            if !self.may_terminate(&owner, force) {
                return Err(SupervisorError::ForeignProcess {
                    port: self.config.port,
                    pid: owner.pid,
                    cmdline: owner.cmdline,
                });
            }
            warn!(
                "replacing unhealthy listener pid {} on port {}",
                owner.pid, self.config.port
            );
            self.probe
                .terminate(owner.pid)
                .await
                .map_err(|e| SupervisorError::ProbeFailed {
                    detail: e.to_string(),
                })?;
        }

        self.probe
            .spawn_backend(&self.config.backend, &self.config.host, self.config.port)
            .await
            .map_err(|e| SupervisorError::LaunchFailed {
                detail: e.to_string(),
            })?;

        let (healthy, _, last_detail) = health::wait_healthy(
            self.api,
            self.config.health_timeout,
            self.config.health_poll,
            self.config.health_call_timeout,
        )
        .await;
        if !healthy {
            return Err(SupervisorError::HealthTimeout {
                timeout_secs: self.config.health_timeout.as_secs(),
                last_detail,
            });
        }
        Ok(Healthy {
            waited: started.elapsed(),
            launched: true,
        })
    }

    /// Stop the backend. Idempotent: a free port with no recorded pid is
    /// a successful no-op.
    pub async fn stop(&self, force: bool) -> Result<Stopped, SupervisorError> {
        let owner = self
            .probe
            .find_port_owner(self.config.port)
            .await
            .map_err(|e| SupervisorError::ProbeFailed {
                detail: e.to_string(),
            })?;

        let target = match owner {
            Some(owner) => owner,
            None => match self.recorded_owner().await {
                // An unreadable command line here means the recorded
                // process is gone (or the pid was recycled beyond
                // recognition): the pid file is stale, not foreign.
                Some(owner) if owner.cmdline.trim().is_empty() => {
                    self.clear_pid_file();
                    return Ok(Stopped {
                        terminated_pid: None,
                    });
                }
                Some(owner) => owner,
                None => {
                    return Ok(Stopped {
                        terminated_pid: None,
                    })
                }
            },
        };

        if !self.may_terminate(&target, force) {
            return Err(SupervisorError::ForeignProcess {
                port: self.config.port,
                pid: target.pid,
                cmdline: target.cmdline,
            });
        }

        self.probe
            .terminate(target.pid)
            .await
            .map_err(|e| SupervisorError::ProbeFailed {
                detail: e.to_string(),
            })?;
        self.clear_pid_file();
        Ok(Stopped {
            terminated_pid: Some(target.pid),
        })
    }

    pub async fn status(&self) -> Result<BackendStatus, SupervisorError> {
        let (healthy, detail) =
            match health::health_once(self.api, self.config.health_call_timeout).await {
                Ok(()) => (true, "healthy".to_string()),
                Err(detail) => (false, detail),
            };
        let owner = self
            .probe
            .find_port_owner(self.config.port)
            .await
            .map_err(|e| SupervisorError::ProbeFailed {
                detail: e.to_string(),
            })?;
        let managed = owner
            .as_ref()
            .map(|owner| is_safe_to_kill(owner, &self.config.allowlist));
        Ok(BackendStatus {
            healthy,
            detail,
            owner,
            managed,
        })
    }

    /// Fallback for `stop` when the port is already free: the pid file
    /// left by the last launch. A pid whose process no longer exists
    /// yields an empty command line and is treated as stale by `stop`,
    /// so a recycled pid is never killed blindly.
    async fn recorded_owner(&self) -> Option<PortOwner> {
        let raw = std::fs::read_to_string(&self.config.backend.pid_file).ok()?;
        let pid: u32 = raw.trim().parse().ok()?;
        let cmdline = self.probe.command_line(pid).await;
        Some(PortOwner { pid, cmdline })
    }

    fn clear_pid_file(&self) {
        if let Err(e) = std::fs::remove_file(&self.config.backend.pid_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "could not remove {}: {}",
                    self.config.backend.pid_file.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedApi;
    use crate::client::ApiResponse;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProbe {
        owner: Mutex<Option<PortOwner>>,
        cmdlines: Mutex<HashMap<u32, String>>,
        terminated: Mutex<Vec<u32>>,
        spawned: Mutex<u32>,
    }

    impl FakeProbe {
        fn with_owner(pid: u32, cmdline: &str) -> Self {
            let probe = Self::default();
            *probe.owner.lock().unwrap() = Some(PortOwner {
                pid,
                cmdline: cmdline.to_string(),
            });
            probe
        }

        fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }

        fn spawn_count(&self) -> u32 {
            *self.spawned.lock().unwrap()
        }
    }

    #[async_trait]
    impl SystemProbe for FakeProbe {
        async fn find_port_owner(&self, _port: u16) -> Result<Option<PortOwner>> {
            Ok(self.owner.lock().unwrap().clone())
        }

        async fn command_line(&self, pid: u32) -> String {
            self.cmdlines
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .unwrap_or_default()
        }

        async fn terminate(&self, pid: u32) -> Result<()> {
            self.terminated.lock().unwrap().push(pid);
            *self.owner.lock().unwrap() = None;
            Ok(())
        }

        async fn spawn_backend(
            &self,
            _command: &crate::config::BackendCommand,
            _host: &str,
            _port: u16,
        ) -> Result<u32> {
            *self.spawned.lock().unwrap() += 1;
            Ok(999)
        }
    }

    fn quick_config() -> OpsConfig {
        let mut config = OpsConfig::default();
        config.health_timeout = Duration::from_millis(20);
        config.health_poll = Duration::from_millis(1);
        config.health_call_timeout = Duration::from_millis(50);
        config.allowlist = vec!["cli.main".to_string()];
        config
    }

    fn down() -> ApiResponse {
        ApiResponse::transport_error("connection refused")
    }

    #[tokio::test]
    async fn healthy_backend_is_left_alone() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push_ok("/health", json!({"status": "healthy"}));
        let probe = FakeProbe::default();

        let healthy = Supervisor::new(&config, &api, &probe)
            .ensure_running(false)
            .await
            .unwrap();
        assert!(!healthy.launched);
        assert_eq!(probe.spawn_count(), 0);
    }

    #[tokio::test]
    async fn launches_when_port_is_free() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push("/health", down());
        api.push_ok("/health", json!({"status": "healthy"}));
        let probe = FakeProbe::default();

        let healthy = Supervisor::new(&config, &api, &probe)
            .ensure_running(false)
            .await
            .unwrap();
        assert!(healthy.launched);
        assert_eq!(probe.spawn_count(), 1);
        assert!(probe.terminated().is_empty());
    }

    #[tokio::test]
    async fn refuses_to_replace_foreign_listener() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push("/health", down());
        let probe = FakeProbe::with_owner(4321, "nginx: master process");

        let err = Supervisor::new(&config, &api, &probe)
            .ensure_running(false)
            .await
            .unwrap_err();
        match err {
            SupervisorError::ForeignProcess { pid, .. } => assert_eq!(pid, 4321),
            other => panic!("expected ForeignProcess, got {:?}", other),
        }
        assert!(probe.terminated().is_empty());
        assert_eq!(probe.spawn_count(), 0);
    }

    #[tokio::test]
    async fn force_replaces_foreign_listener() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push("/health", down());
        api.push_ok("/health", json!({"status": "ok"}));
        let probe = FakeProbe::with_owner(4321, "nginx: master process");

        let healthy = Supervisor::new(&config, &api, &probe)
            .ensure_running(true)
            .await
            .unwrap();
        assert!(healthy.launched);
        assert_eq!(probe.terminated(), vec![4321]);
        assert_eq!(probe.spawn_count(), 1);
    }

    #[tokio::test]
    async fn stale_managed_listener_is_replaced() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push("/health", down());
        api.push_ok("/health", json!({"status": "healthy"}));
        let probe = FakeProbe::with_owner(777, "python -m cli.main server --port 8420");

        let healthy = Supervisor::new(&config, &api, &probe)
            .ensure_running(false)
            .await
            .unwrap();
        assert!(healthy.launched);
        assert_eq!(probe.terminated(), vec![777]);
    }

    #[tokio::test]
    async fn launch_that_never_gets_healthy_times_out() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push("/health", down());
        let probe = FakeProbe::default();

        let err = Supervisor::new(&config, &api, &probe)
            .ensure_running(false)
            .await
            .unwrap_err();
        match err {
            SupervisorError::HealthTimeout { last_detail, .. } => {
                assert_eq!(last_detail, "connection refused")
            }
            other => panic!("expected HealthTimeout, got {:?}", other),
        }
        assert_eq!(probe.spawn_count(), 1);
    }

    #[tokio::test]
    async fn stop_with_nothing_running_is_a_no_op() {
        let mut config = quick_config();
        let dir = tempfile::tempdir().unwrap();
        config.backend.pid_file = dir.path().join("backend.pid");
        let api = ScriptedApi::new();
        let probe = FakeProbe::default();

        let stopped = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap();
        assert_eq!(stopped.terminated_pid, None);
        assert!(probe.terminated().is_empty());
    }

    #[tokio::test]
    async fn stop_terminates_the_managed_listener() {
        let mut config = quick_config();
        let dir = tempfile::tempdir().unwrap();
        config.backend.pid_file = dir.path().join("backend.pid");
        let api = ScriptedApi::new();
        let probe = FakeProbe::with_owner(777, "python -m cli.main server");

        let stopped = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap();
        assert_eq!(stopped.terminated_pid, Some(777));
        assert_eq!(probe.terminated(), vec![777]);
    }

    #[tokio::test]
    async fn stop_refuses_a_foreign_listener() {
        let config = quick_config();
        let api = ScriptedApi::new();
        let probe = FakeProbe::with_owner(4321, "redis-server *:8420");

        let err = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::ForeignProcess { .. }));
        assert!(probe.terminated().is_empty());
    }

    #[tokio::test]
    async fn stop_falls_back_to_the_pid_file() {
        let mut config = quick_config();
        let dir = tempfile::tempdir().unwrap();
        config.backend.pid_file = dir.path().join("backend.pid");
        std::fs::write(&config.backend.pid_file, "888").unwrap();

        let api = ScriptedApi::new();
        let probe = FakeProbe::default();
        probe
            .cmdlines
            .lock()
            .unwrap()
            .insert(888, "python -m cli.main server".to_string());

        let stopped = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap();
        assert_eq!(stopped.terminated_pid, Some(888));
        assert!(!config.backend.pid_file.exists());
    }

    #[tokio::test]
    async fn stop_clears_a_stale_pid_file_without_failing() {
        let mut config = quick_config();
        let dir = tempfile::tempdir().unwrap();
        config.backend.pid_file = dir.path().join("backend.pid");
        std::fs::write(&config.backend.pid_file, "888").unwrap();

        let api = ScriptedApi::new();
        // No cmdline registered for 888: reads as an exited process,
        // the state a backend crash leaves behind.
        let probe = FakeProbe::default();

        let stopped = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap();
        assert_eq!(stopped.terminated_pid, None);
        assert!(probe.terminated().is_empty());
        assert!(!config.backend.pid_file.exists());
    }

    #[tokio::test]
    async fn stop_refuses_a_live_recycled_pid_file_entry() {
        let mut config = quick_config();
        let dir = tempfile::tempdir().unwrap();
        config.backend.pid_file = dir.path().join("backend.pid");
        std::fs::write(&config.backend.pid_file, "888").unwrap();

        let api = ScriptedApi::new();
        let probe = FakeProbe::default();
        probe
            .cmdlines
            .lock()
            .unwrap()
            .insert(888, "postgres: checkpointer".to_string());

        let err = Supervisor::new(&config, &api, &probe)
            .stop(false)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::ForeignProcess { .. }));
        assert!(probe.terminated().is_empty());
        assert!(config.backend.pid_file.exists());
    }

    #[tokio::test]
    async fn status_reports_owner_and_managed_flag() {
        let config = quick_config();
        let api = ScriptedApi::new();
        api.push_ok("/health", json!({"status": "healthy"}));
        let probe = FakeProbe::with_owner(777, "python -m cli.main server");

        let status = Supervisor::new(&config, &api, &probe)
            .status()
            .await
            .unwrap();
        assert!(status.healthy);
        assert_eq!(status.managed, Some(true));
        assert_eq!(status.owner.unwrap().pid, 777);
    }
}

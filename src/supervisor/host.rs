use crate::config::BackendCommand;
use crate::supervisor::probe::{PortOwner, SystemProbe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};
use tokio::process::Command;

/// Real-OS implementation of [`SystemProbe`]: socket tables via the
/// platform's listener tool, process details via sysinfo.
pub struct HostProbe;

#[cfg_attr(windows, allow(dead_code))]
fn parse_lsof_pids(stdout: &str) -> Vec<u32> {
    // `lsof -t` prints one pid per line and nothing else.
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat_listener(stdout: &str, port: u16) -> Option<u32> {
    let needle = format!(":{}", port);
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || !fields[0].eq_ignore_ascii_case("tcp") {
            continue;
        }
        if !fields[1].ends_with(&needle) {
            continue;
        }
        if !fields[fields.len() - 2].eq_ignore_ascii_case("listening") {
            continue;
        }
        if let Ok(pid) = fields[fields.len() - 1].parse() {
            return Some(pid);
        }
    }
    None
}

impl HostProbe {
    #[cfg(not(windows))]
    async fn listener_pid(&self, port: u16) -> Result<Option<u32>> {
        // lsof exits non-zero when nothing matches; only the stdout matters.
        let output = Command::new("lsof")
            .args(["-nP", "-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run lsof")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_lsof_pids(&stdout).into_iter().next())
    }

    #[cfg(windows)]
    async fn listener_pid(&self, port: u16) -> Result<Option<u32>> {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "tcp"])
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run netstat")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_netstat_listener(&stdout, port))
    }

    fn resolve_program(&self, program: &PathBuf) -> Result<PathBuf> {
        if program.is_file() {
            return Ok(program.clone());
        }
        which::which(program)
            .with_context(|| format!("Backend program not found: {}", program.display()))
    }
}

#[async_trait]
impl SystemProbe for HostProbe {
    async fn find_port_owner(&self, port: u16) -> Result<Option<PortOwner>> {
        let Some(pid) = self.listener_pid(port).await? else {
            return Ok(None);
        };
        let cmdline = self.command_line(pid).await;
        debug!("port {} owned by pid {} ({})", port, pid, cmdline);
        Ok(Some(PortOwner { pid, cmdline }))
    }

    async fn command_line(&self, pid: u32) -> String {
        let mut system = System::new();
        let target = Pid::from_u32(pid);
        let refresh = ProcessRefreshKind::new().with_cmd(UpdateKind::Always);
        if !system.refresh_process_specifics(target, refresh) {
            return String::new();
        }
        system
            .process(target)
            .map(|process| process.cmd().join(" "))
            .unwrap_or_default()
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        let mut system = System::new();
        let target = Pid::from_u32(pid);
        if !system.refresh_process(target) {
            // Already gone.
            return Ok(());
        }
        match system.process(target) {
            Some(process) => {
                if !process.kill() {
                    anyhow::bail!("failed to signal pid {}", pid);
                }
                info!("terminated pid {}", pid);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn spawn_backend(&self, command: &BackendCommand, host: &str, port: u16) -> Result<u32> {
        let program = self.resolve_program(&command.program)?;

        if let Some(parent) = command.log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&command.log_path)
            .with_context(|| format!("Failed to open {}", command.log_path.display()))?;
        let log_err = log.try_clone().context("Failed to clone log handle")?;

        let child = Command::new(&program)
            .args(&command.args)
            .arg("--host")
            .arg(host)
            .arg("--port")
            .arg(port.to_string())
            .current_dir(&command.workdir)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("Failed to launch {}", program.display()))?;

        let pid = child
            .id()
            .context("Spawned backend exited before reporting a pid")?;

        if let Some(parent) = command.pid_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&command.pid_file, pid.to_string())
            .with_context(|| format!("Failed to write {}", command.pid_file.display()))?;

        info!(
            "launched backend pid {} (log: {})",
            pid,
            command.log_path.display()
        );
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsof_output_yields_first_pid() {
        assert_eq!(parse_lsof_pids("12345\n"), vec![12345]);
        assert_eq!(parse_lsof_pids("12345\n67890\n"), vec![12345, 67890]);
        assert!(parse_lsof_pids("").is_empty());
        assert!(parse_lsof_pids("lsof: no matches\n").is_empty());
    }

    #[test]
    fn netstat_listener_matches_port_and_state() {
        let stdout = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1080
  TCP    127.0.0.1:8420         0.0.0.0:0              LISTENING       31337
  TCP    127.0.0.1:8420         127.0.0.1:54001        ESTABLISHED     31337
";
        assert_eq!(parse_netstat_listener(stdout, 8420), Some(31337));
        assert_eq!(parse_netstat_listener(stdout, 9000), None);
    }

    #[test]
    fn netstat_ignores_port_suffix_collisions() {
        let stdout = "  TCP    0.0.0.0:18420          0.0.0.0:0              LISTENING       77\n";
        assert_eq!(parse_netstat_listener(stdout, 8420), None);
    }
}

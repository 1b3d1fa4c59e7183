use crate::config::BackendCommand;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Process currently holding the backend port. Derived from the OS
/// process/socket tables on each lookup; never cached.
#[derive(Debug, Clone, Serialize)]
pub struct PortOwner {
    pub pid: u32,
    /// Full command line; empty when unreadable under restricted
    /// permissions (degraded, not an error).
    pub cmdline: String,
}

/// Platform capability interface the supervisor depends on: listener
/// lookup, command-line inspection, targeted terminate, detached spawn.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Owner of the TCP listener on `port`, if any.
    async fn find_port_owner(&self, port: u16) -> Result<Option<PortOwner>>;

    /// Best-effort command line for `pid`; empty when unreadable.
    async fn command_line(&self, pid: u32) -> String;

    /// Terminate `pid`. Idempotent: a pid that is already gone is Ok.
    async fn terminate(&self, pid: u32) -> Result<()>;

    /// Launch the backend detached, stdout/stderr appended to its log
    /// file. Returns the child pid.
    async fn spawn_backend(&self, command: &BackendCommand, host: &str, port: u16) -> Result<u32>;
}

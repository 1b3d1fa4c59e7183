use std::path::PathBuf;
use std::time::Duration;

/// How the supervisor decides whether a port owner may be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillPolicy {
    /// Terminate only processes whose command line matches every allowlist token.
    Safe,
    /// Terminate the port owner unconditionally (dev-mode takeover).
    Force,
}

/// Launch description for the managed backend process.
#[derive(Debug, Clone)]
pub struct BackendCommand {
    /// Backend interpreter/executable. Resolved via PATH if not an existing file.
    pub program: PathBuf,

    /// Base arguments; the supervisor appends `--host <host> --port <port>`.
    pub args: Vec<String>,

    /// Working directory for the spawned backend.
    pub workdir: PathBuf,

    /// Environment overrides applied to the child only.
    pub env: Vec<(String, String)>,

    /// File the backend's stdout/stderr is appended to.
    pub log_path: PathBuf,

    /// File the spawned pid is recorded to, used as a stop fallback.
    pub pid_file: PathBuf,
}

/// Full run configuration, passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    pub base_url: String,
    pub host: String,
    pub port: u16,

    /// Overall health wait deadline.
    pub health_timeout: Duration,

    /// Cadence between health probes.
    pub health_poll: Duration,

    /// Per-call timeout for a single health probe.
    pub health_call_timeout: Duration,

    /// Per-call timeout for ordinary GETs.
    pub request_timeout: Duration,

    /// Per-call timeout for the job enqueue POST.
    pub submit_timeout: Duration,

    /// Overall job poll deadline, independent of the health timeout.
    pub job_timeout: Duration,

    /// Cadence between job status polls.
    pub job_poll: Duration,

    /// Substrings a port owner's command line must all contain to be
    /// considered ours. Empty list means nothing is safe to kill.
    pub allowlist: Vec<String>,

    pub kill_policy: KillPolicy,
    pub backend: BackendCommand,
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8420;

fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".opsctl")
}

fn venv_python(ai_root: &std::path::Path) -> PathBuf {
    if cfg!(windows) {
        ai_root.join(".venv").join("Scripts").join("python.exe")
    } else {
        ai_root.join(".venv").join("bin").join("python")
    }
}

impl Default for BackendCommand {
    fn default() -> Self {
        let ai_root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dpolaris_ai");
        Self {
            program: venv_python(&ai_root),
            args: vec!["-m".into(), "cli.main".into(), "server".into()],
            workdir: ai_root,
            env: vec![("LLM_PROVIDER".into(), "none".into())],
            log_path: state_dir().join("backend_stdout.log"),
            pid_file: state_dir().join("backend.pid"),
        }
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        let backend = BackendCommand::default();
        let allowlist = vec![
            "cli.main".to_string(),
            backend.workdir.display().to_string(),
        ];
        Self {
            base_url: format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            health_timeout: Duration::from_secs(30),
            health_poll: Duration::from_millis(800),
            health_call_timeout: Duration::from_secs(4),
            request_timeout: Duration::from_secs(15),
            submit_timeout: Duration::from_secs(30),
            job_timeout: Duration::from_secs(600),
            job_poll: Duration::from_secs(2),
            allowlist,
            kill_policy: KillPolicy::Safe,
            backend,
        }
    }
}

impl OpsConfig {
    /// Re-point the backend at a different installation root. Keeps the
    /// interpreter, working directory and allowlist path token in sync.
    pub fn with_ai_root(mut self, ai_root: PathBuf) -> Self {
        self.backend.program = venv_python(&ai_root);
        self.allowlist = vec!["cli.main".to_string(), ai_root.display().to_string()];
        self.backend.workdir = ai_root;
        self
    }

    pub fn with_endpoint(mut self, url: Option<String>, host: String, port: u16) -> Self {
        self.base_url = url.unwrap_or_else(|| format!("http://{}:{}", host, port));
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self.host = host;
        self.port = port;
        self
    }
}

pub mod local;
pub mod ssh;

#[cfg(test)]
pub mod fake;

pub use local::LocalBackend;
pub use ssh::SshBackend;

use crate::config::BuildConfig;
use crate::error::Result;

/// Captured output from a single backend command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub(crate) fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    pub(crate) fn spawn_failure(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            success: false,
            exit_code: -1,
        }
    }

    /// Error text for reporting: stderr, falling back to stdout.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Uniform command execution over a local shell or a remote SSH session.
///
/// Implementations fold command failures into the returned output; only
/// session establishment and teardown surface as errors.
pub trait ExecutionBackend {
    fn execute(&mut self, command: &str) -> CommandOutput;

    /// Run a command scoped to a working directory. Accumulated environment
    /// state must remain visible.
    fn execute_at(&mut self, command: &str, dir: &str) -> CommandOutput;

    /// Set an environment variable for every later command in this session.
    fn set_env(&mut self, name: &str, value: &str);

    /// Release the underlying session or process resources.
    fn close(&mut self) -> Result<()>;
}

/// Select and initialize the execution backend for the configured build
/// host. Remote hosts establish their SSH session here, which fails fatally
/// when the host is unreachable.
pub fn connect(config: &BuildConfig) -> Result<Box<dyn ExecutionBackend>> {
    if is_local_host(&config.host) {
        Ok(Box::new(LocalBackend::new()))
    } else {
        Ok(Box::new(SshBackend::connect(&config.host, &config.user)?))
    }
}

/// Check if a host value refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "" | "localhost" | "127.0.0.1")
}

/// Split a `host[:port]` spec into host and port, defaulting to SSH port 22.
pub fn split_host_port(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((host, port)) if !port.is_empty() => (host, port),
        Some((host, _)) => (host, "22"),
        None => (spec, "22"),
    }
}

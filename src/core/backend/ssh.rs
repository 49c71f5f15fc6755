use std::path::PathBuf;
use std::process::Command;

use super::{split_host_port, CommandOutput, ExecutionBackend};
use crate::error::{Error, Result};
use crate::shell;

/// Executes commands over a single multiplexed SSH session.
///
/// One authenticated master connection is established up front; every later
/// command goes through its control socket, so the remote side sees one
/// stable session for the whole run. Environment variables accumulate as
/// export prefixes on each command instead of resetting between calls.
pub struct SshBackend {
    host: String,
    port: String,
    user: String,
    control_path: PathBuf,
    env: Vec<(String, String)>,
    connected: bool,
}

impl SshBackend {
    /// Establish the master session to `host[:port]`. Fails when the host
    /// is unreachable or authentication is refused.
    pub fn connect(host_spec: &str, user: &str) -> Result<Self> {
        let mut backend = Self::new(host_spec, user);

        let output = Command::new("ssh")
            .args(backend.master_args())
            .output()
            .map_err(|err| Error::Connection(format!("Failed to spawn ssh: {}", err)))?;

        if !output.status.success() {
            return Err(Error::Connection(format!(
                "Could not reach {}@{}:{}: {}",
                backend.user,
                backend.host,
                backend.port,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        backend.connected = true;
        log_status!(
            "ssh",
            "Session established to {}@{}:{}",
            backend.user,
            backend.host,
            backend.port
        );
        Ok(backend)
    }

    fn new(host_spec: &str, user: &str) -> Self {
        let (host, port) = split_host_port(host_spec);
        let control_path = std::env::temp_dir().join(format!(
            "skybuild-{}-{}.ctl",
            std::process::id(),
            host
        ));

        Self {
            host: host.to_string(),
            port: port.to_string(),
            user: user.to_string(),
            control_path,
            env: Vec::new(),
            connected: false,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn control_option(&self) -> String {
        format!("ControlPath={}", self.control_path.display())
    }

    /// Arguments that establish the detached master connection.
    fn master_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "ControlMaster=yes".to_string(),
            "-o".to_string(),
            self.control_option(),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
        ];

        if self.port != "22" {
            args.extend(["-p".to_string(), self.port.clone()]);
        }

        args.extend(["-f".to_string(), "-N".to_string(), self.destination()]);
        args
    }

    /// Arguments that route one command through the master's socket.
    fn session_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            self.control_option(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];

        if self.port != "22" {
            args.extend(["-p".to_string(), self.port.clone()]);
        }

        args.push(self.destination());
        args
    }

    /// Compose the remote command line: accumulated exports first, then the
    /// optional directory scope, then the command itself.
    fn remote_command(&self, command: &str, dir: Option<&str>) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(name, value)| format!("export {}={}", name, shell::quote_arg(value)))
            .collect();

        match dir {
            Some(dir) => parts.push(format!("cd {} && {}", shell::quote_path(dir), command)),
            None => parts.push(command.to_string()),
        }

        parts.join("; ")
    }

    fn run(&self, remote: &str) -> CommandOutput {
        let output = Command::new("ssh")
            .args(self.session_args())
            .arg(remote)
            .output();

        match output {
            Ok(output) => CommandOutput::from_output(output),
            Err(err) => CommandOutput::spawn_failure(format!("SSH error: {}", err)),
        }
    }
}

impl ExecutionBackend for SshBackend {
    fn execute(&mut self, command: &str) -> CommandOutput {
        let remote = self.remote_command(command, None);
        self.run(&remote)
    }

    fn execute_at(&mut self, command: &str, dir: &str) -> CommandOutput {
        let remote = self.remote_command(command, Some(dir));
        self.run(&remote)
    }

    fn set_env(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.env.iter_mut().find(|(existing, _)| existing == name) {
            entry.1 = value.to_string();
        } else {
            self.env.push((name.to_string(), value.to_string()));
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        // Ask the master to tear down. A session that already dropped is
        // not worth surfacing at shutdown.
        let control = self.control_option();
        let destination = self.destination();
        let _ = Command::new("ssh")
            .args(["-o", control.as_str(), "-O", "exit", destination.as_str()])
            .output();

        log_status!("ssh", "Session to {} closed", destination);
        Ok(())
    }
}

impl Drop for SshBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

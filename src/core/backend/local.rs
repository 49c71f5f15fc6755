use std::process::Command;

use super::{CommandOutput, ExecutionBackend};
use crate::error::Result;

/// Runs every command as a local subprocess. Environment variables and the
/// working directory are applied per invocation; there is no session to
/// establish or tear down.
#[derive(Default)]
pub struct LocalBackend {
    env: Vec<(String, String)>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        let cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        };

        #[cfg(not(windows))]
        let cmd = {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };

        cmd
    }

    fn run(&self, command: &str, dir: Option<&str>) -> CommandOutput {
        let mut cmd = Self::shell_command(command);

        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(name, value)| (name.as_str(), value.as_str())));

        match cmd.output() {
            Ok(output) => CommandOutput::from_output(output),
            Err(err) => CommandOutput::spawn_failure(format!("Command error: {}", err)),
        }
    }
}

impl ExecutionBackend for LocalBackend {
    fn execute(&mut self, command: &str) -> CommandOutput {
        self.run(command, None)
    }

    fn execute_at(&mut self, command: &str, dir: &str) -> CommandOutput {
        self.run(command, Some(dir))
    }

    fn set_env(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.env.iter_mut().find(|(existing, _)| existing == name) {
            entry.1 = value.to_string();
        } else {
            self.env.push((name.to_string(), value.to_string()));
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use super::{CommandOutput, ExecutionBackend};
use crate::error::Result;

/// One recorded backend call: the command text, plus the working directory
/// when the call was scoped with `execute_at`. Environment assignments are
/// recorded inline as `set-env NAME=VALUE` so ordering can be asserted.
pub type RecordedCall = (String, Option<String>);

/// Scripted in-memory backend for pipeline tests. Records every call in
/// order; commands matching a registered failure substring return a failed
/// output, everything else succeeds with empty output.
pub struct ScriptedBackend {
    pub log: Rc<RefCell<Vec<RecordedCall>>>,
    pub closed: Rc<RefCell<bool>>,
    failures: Vec<String>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            closed: Rc::new(RefCell::new(false)),
            failures: Vec::new(),
        }
    }

    /// Make every command containing `needle` fail.
    pub fn fail_matching(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    fn respond(&self, command: &str) -> CommandOutput {
        if self.failures.iter().any(|needle| command.contains(needle)) {
            CommandOutput {
                stdout: String::new(),
                stderr: format!("scripted failure: {}", command),
                success: false,
                exit_code: 1,
            }
        } else {
            CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: true,
                exit_code: 0,
            }
        }
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn execute(&mut self, command: &str) -> CommandOutput {
        self.log.borrow_mut().push((command.to_string(), None));
        self.respond(command)
    }

    fn execute_at(&mut self, command: &str, dir: &str) -> CommandOutput {
        self.log
            .borrow_mut()
            .push((command.to_string(), Some(dir.to_string())));
        self.respond(command)
    }

    fn set_env(&mut self, name: &str, value: &str) {
        self.log
            .borrow_mut()
            .push((format!("set-env {}={}", name, value), None));
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.borrow_mut() = true;
        Ok(())
    }
}

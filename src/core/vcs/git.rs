use regex::Regex;

use super::VcsProvider;
use crate::backend::ExecutionBackend;
use crate::error::{Error, Result};
use crate::shell;

/// Git-backed provider. Checkouts go through the execution backend so they
/// land on whichever host runs the build.
#[derive(Debug)]
pub struct GitProvider;

impl VcsProvider for GitProvider {
    fn binary_name(&self) -> &str {
        "git"
    }

    /// `git://github.com/org/repo.git`, `https://...`, `ssh://git@host/...`
    /// and scp-style `git@host:org/repo` all map to `host/org/repo`.
    fn import_path(&self, repo_url: &str) -> Result<String> {
        let pattern = Regex::new(r"^(?:[a-z+]+://)?(?:[^@/]+@)?([^:/]+)[:/](.+?)(?:\.git)?/?$")
            .expect("Invalid regex pattern");

        let captures = pattern.captures(repo_url).ok_or_else(|| {
            Error::Checkout(format!("Could not derive import path from {}", repo_url))
        })?;

        Ok(format!("{}/{}", &captures[1], &captures[2]))
    }

    fn checkout(
        &self,
        backend: &mut dyn ExecutionBackend,
        repo_url: &str,
        branch: &str,
        dest: &str,
    ) -> Result<()> {
        let probe = backend.execute(&format!(
            "ls {}",
            shell::quote_path(&format!("{}/.git", dest))
        ));

        let command = if probe.success {
            // Existing checkout: update to the requested branch in place.
            log_status!("checkout", "Updating {} to {}", dest, branch);
            format!(
                "cd {} && git fetch origin && git checkout {} && git pull origin {}",
                shell::quote_path(dest),
                shell::quote_arg(branch),
                shell::quote_arg(branch)
            )
        } else {
            log_status!("checkout", "Cloning {} into {}", repo_url, dest);
            format!(
                "git clone --branch {} {} {}",
                shell::quote_arg(branch),
                shell::quote_arg(repo_url),
                shell::quote_path(dest)
            )
        };

        let output = backend.execute(&command);
        if !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        if !output.success {
            return Err(Error::Checkout(format!(
                "{}: {}",
                command,
                output.error_text()
            )));
        }

        Ok(())
    }
}

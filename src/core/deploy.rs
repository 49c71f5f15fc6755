use std::path::Path;
use std::process::Command;

use crate::backend::{is_local_host, split_host_port, CommandOutput};
use crate::config::{BuildConfig, DeployConfig};
use crate::error::{Error, Result};

/// A planned artifact transfer for one destination host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// Build artifact and destination are both on this machine.
    LocalCopy { source: String, target: String },
    /// Build artifact sits on a remote build host; pull it down over scp.
    RemotePull {
        source: String,
        port: String,
        target: String,
    },
}

/// Copies the built binary to each destination host, strictly in order.
pub struct Deployer<'a> {
    build: &'a BuildConfig,
    deploy: &'a DeployConfig,
}

impl<'a> Deployer<'a> {
    pub fn new(build: &'a BuildConfig, deploy: &'a DeployConfig) -> Self {
        Self { build, deploy }
    }

    /// Transfer the artifact to every host in list order. The first failure
    /// aborts the rest; hosts already processed stay deployed.
    pub fn deploy(&self, hosts: &[&str]) -> Result<()> {
        for host in hosts {
            let transfer = self.plan(host)?;
            self.transfer(&transfer)?;
        }
        Ok(())
    }

    /// Decide how the artifact reaches `host`. Only pulls onto the local
    /// machine are supported; every other combination is rejected outright
    /// rather than silently skipped.
    pub fn plan(&self, host: &str) -> Result<Transfer> {
        if !is_local_host(host) {
            return Err(Error::Transfer(format!(
                "Deploying to remote host {} is not supported; only local destinations are",
                host
            )));
        }

        let source = self.artifact_path()?;
        let target = format!(
            "{}/{}",
            self.deploy.deploy_path.trim_end_matches('/'),
            self.deploy.binary_name
        );

        if is_local_host(&self.build.host) {
            Ok(Transfer::LocalCopy { source, target })
        } else {
            let (build_host, port) = split_host_port(&self.build.host);
            Ok(Transfer::RemotePull {
                source: format!("{}@{}:{}", self.build.user, build_host, source),
                port: port.to_string(),
                target,
            })
        }
    }

    /// `{jail}/bin/{basename(AppPath)}`: where the toolchain leaves the
    /// built binary.
    fn artifact_path(&self) -> Result<String> {
        let base = Path::new(&self.build.app_path)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::Transfer(format!("AppPath {} has no base name", self.build.app_path))
            })?;

        Ok(format!(
            "{}/bin/{}",
            self.build.jail.trim_end_matches('/'),
            base
        ))
    }

    fn transfer(&self, transfer: &Transfer) -> Result<()> {
        let output = match transfer {
            Transfer::LocalCopy { source, target } => {
                log_status!("deploy", "Copying local binary {} -> {}", source, target);
                run_local("cp", &[source.as_str(), target.as_str()])
            }
            Transfer::RemotePull {
                source,
                port,
                target,
            } => {
                log_status!("deploy", "Copying binary from build host {} -> {}", source, target);
                run_local("scp", &["-P", port.as_str(), source.as_str(), target.as_str()])
            }
        };

        if !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        if !output.success {
            return Err(Error::Transfer(output.error_text()));
        }
        Ok(())
    }
}

fn run_local(program: &str, args: &[&str]) -> CommandOutput {
    match Command::new(program).args(args).output() {
        Ok(output) => CommandOutput::from_output(output),
        Err(err) => CommandOutput::spawn_failure(format!("{} error: {}", program, err)),
    }
}

use crate::backend::{self, CommandOutput, ExecutionBackend};
use crate::config::{self, BuilderConfig};
use crate::deploy::Deployer;
use crate::error::{Error, Result};
use crate::gopkg::{self, GoContext};
use crate::shell;
use crate::vcs::{VcsProvider, VcsRegistry};

/// Fixed framework checkout exercised by the optional self-test stage,
/// relative to `{jail}/src`.
const FRAMEWORK_IMPORT_PATH: &str = "github.com/skynetservices/skynet2";

/// Run the full build pipeline against the configuration at `config_path`.
/// The execution backend is closed on every exit path.
pub fn build(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    let backend = backend::connect(&config.build)?;

    let mut builder = Builder::new(config, backend);
    let outcome = builder.perform_build(&GoContext::current());
    let closed = builder.close();
    outcome.and(closed)
}

/// Deploy the already-built binary to the local machine, without rebuilding.
pub fn deploy(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    let backend = backend::connect(&config.build)?;

    let mut builder = Builder::new(config, backend);
    let outcome = builder.perform_deploy(&["localhost"]);
    let closed = builder.close();
    outcome.and(closed)
}

/// Drives the build pipeline: validation, checkout, environment setup,
/// dependency resolution, compilation, tests, and the pre/post command
/// hooks, in that order, failing fast on the first error.
pub struct Builder {
    config: BuilderConfig,
    backend: Box<dyn ExecutionBackend>,
    registry: VcsRegistry,
}

impl Builder {
    pub fn new(config: BuilderConfig, backend: Box<dyn ExecutionBackend>) -> Self {
        Self {
            config,
            backend,
            registry: VcsRegistry::new(),
        }
    }

    /// Release the execution backend. Called exactly once at run end.
    pub fn close(&mut self) -> Result<()> {
        self.backend.close()
    }

    pub fn perform_build(&mut self, ctx: &GoContext) -> Result<()> {
        gopkg::validate_command(ctx)?;

        let vcs = self.registry.create(&self.config.build.repo_type)?;
        self.validate_build_environment(vcs.as_ref())?;

        let project_path = self.update_code(vcs.as_ref())?;

        self.configure_environment();

        let pre = self.config.build.pre_build_commands.clone();
        self.run_commands(&pre)?;

        self.fetch_dependencies(&project_path)?;
        self.build_project(&project_path)?;

        if self.config.build.run_tests {
            self.run_tests(&project_path)?;
        }

        let post = self.config.build.post_build_commands.clone();
        self.run_commands(&post)?;

        Ok(())
    }

    pub fn perform_deploy(&mut self, hosts: &[&str]) -> Result<()> {
        Deployer::new(&self.config.build, &self.config.deploy).deploy(hosts)
    }

    /// Probe the four build-host preconditions. Every probe runs even after
    /// an earlier one fails, and every failure is reported.
    fn validate_build_environment(&mut self, vcs: &dyn VcsProvider) -> Result<()> {
        let probes: Vec<(String, String)> = {
            let build = &self.config.build;
            vec![
                (
                    format!("ls {}", shell::quote_path(&build.jail)),
                    format!("Could not find jail directory {}", build.jail),
                ),
                (
                    format!("ls {}", shell::quote_path(&build.go_root)),
                    format!("Could not find GOROOT directory {}", build.go_root),
                ),
                (
                    format!("ls {}", shell::quote_path(&format!("{}/bin/go", build.go_root))),
                    format!("Could not find go binary under {}", build.go_root),
                ),
                (
                    format!("which {}", shell::quote_arg(vcs.binary_name())),
                    format!("Could not find {} binary", vcs.binary_name()),
                ),
            ]
        };

        let mut failures = Vec::new();
        for (command, description) in &probes {
            let output = self.backend.execute(command);
            if !output.success {
                log_status!("validate", "{}: {}", description, output.error_text());
                failures.push(format!("{}: {}", description, output.error_text()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(failures.join("; ")))
        }
    }

    /// Derive the import path, compute the project path once, and check the
    /// source tree out on the build host.
    fn update_code(&mut self, vcs: &dyn VcsProvider) -> Result<String> {
        let build = self.config.build.clone();

        let import_path = vcs.import_path(&build.app_repo)?;
        let project_path = format!("{}/src/{}", build.jail.trim_end_matches('/'), import_path);

        let listing = self
            .backend
            .execute(&format!("ls {}", shell::quote_path(&project_path)));
        if !listing.success {
            log_status!("checkout", "Creating project directories under {}", project_path);
            let mkdir = self
                .backend
                .execute(&format!("mkdir -p {}", shell::quote_path(&project_path)));
            if !mkdir.success {
                return Err(Error::Checkout(format!(
                    "Could not create {}: {}",
                    project_path,
                    mkdir.error_text()
                )));
            }
        }

        vcs.checkout(
            self.backend.as_mut(),
            &build.app_repo,
            &build.repo_branch,
            &project_path,
        )?;

        Ok(project_path)
    }

    /// Export the toolchain environment for every later command in the
    /// session.
    fn configure_environment(&mut self) {
        let build = self.config.build.clone();
        self.backend.set_env("GOPATH", &build.go_path_env());
        self.backend.set_env("GOROOT", &build.go_root);
        self.backend.set_env("CGO_CFLAGS", &build.cgo_cflags);
        self.backend.set_env("CGO_LDFLAGS", &build.cgo_ldflags);
    }

    fn run_commands(&mut self, commands: &[String]) -> Result<()> {
        for command in commands {
            let output = self.backend.execute(command);
            print_stdout(&output);
            if !output.success {
                return Err(Error::command(command, output.error_text()));
            }
        }
        Ok(())
    }

    fn fetch_dependencies(&mut self, project_path: &str) -> Result<()> {
        let path = self.app_path(project_path);
        self.get_package_dependencies(&path)
    }

    /// `go get -d [-u] ./...` at `path`.
    fn get_package_dependencies(&mut self, path: &str) -> Result<()> {
        let mut command = String::from("go get -d");
        if self.config.build.update_packages {
            command.push_str(" -u");
        }
        command.push_str(" ./...");

        log_status!("build", "Fetching dependencies for {}", path);
        self.run_at(&command, path)
    }

    fn build_project(&mut self, project_path: &str) -> Result<()> {
        let path = self.app_path(project_path);

        let mut command = String::from("go install -v");
        if self.config.build.build_all_packages {
            command.push_str(" -a");
        }

        log_status!("build", "Building packages in {}", path);
        self.run_at(&command, &path)
    }

    fn run_tests(&mut self, project_path: &str) -> Result<()> {
        let path = self.app_path(project_path);
        log_status!("build", "Testing packages in {}", path);
        self.run_at("go test", &path)?;

        if self.config.build.test_skynet {
            self.test_framework()?;
        }

        Ok(())
    }

    /// Re-fetch the framework checkout's dependencies and run its full
    /// recursive suite.
    fn test_framework(&mut self) -> Result<()> {
        let path = format!(
            "{}/src/{}",
            self.config.build.jail.trim_end_matches('/'),
            FRAMEWORK_IMPORT_PATH
        );

        log_status!("build", "Testing framework in {}", path);
        self.get_package_dependencies(&path)?;
        self.run_at("go test ./...", &path)
    }

    fn app_path(&self, project_path: &str) -> String {
        format!("{}/{}", project_path, self.config.build.app_path)
    }

    /// Run one command scoped to a directory, print its output, and fail
    /// fast on a non-zero exit.
    fn run_at(&mut self, command: &str, dir: &str) -> Result<()> {
        let output = self.backend.execute_at(command, dir);
        print_stdout(&output);
        if !output.success {
            return Err(Error::command(
                format!("{} (in {})", command, dir),
                output.error_text(),
            ));
        }
        Ok(())
    }
}

fn print_stdout(output: &CommandOutput) {
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{RecordedCall, ScriptedBackend};
    use crate::config::{BuildConfig, BuilderConfig, DeployConfig};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn command_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
        dir
    }

    fn test_config() -> BuilderConfig {
        BuilderConfig {
            build: BuildConfig {
                user: "builder".to_string(),
                jail: "/jail".to_string(),
                go_root: "/usr/local/go".to_string(),
                app_repo: "git://github.com/acme/widget.git".to_string(),
                app_path: "widget".to_string(),
                repo_type: "git".to_string(),
                repo_branch: "master".to_string(),
                ..Default::default()
            },
            deploy: DeployConfig::default(),
        }
    }

    fn run_build(
        config: BuilderConfig,
        backend: ScriptedBackend,
        ctx: &GoContext,
    ) -> (Result<()>, Rc<RefCell<Vec<RecordedCall>>>, Rc<RefCell<bool>>) {
        let log = backend.log.clone();
        let closed = backend.closed.clone();
        let mut builder = Builder::new(config, Box::new(backend));
        let outcome = builder.perform_build(ctx);
        builder.close().unwrap();
        (outcome, log, closed)
    }

    fn flatten(log: &Rc<RefCell<Vec<RecordedCall>>>) -> Vec<String> {
        log.borrow()
            .iter()
            .map(|(command, dir)| match dir {
                Some(dir) => format!("{} @ {}", command, dir),
                None => command.clone(),
            })
            .collect()
    }

    #[test]
    fn pipeline_runs_stages_in_order() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.pre_build_commands = vec!["make generate".to_string()];
        config.build.post_build_commands = vec!["make package".to_string()];
        config.build.run_tests = true;

        let (outcome, log, closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        outcome.unwrap();
        assert!(*closed.borrow());

        let commands = flatten(&log);
        let position = |needle: &str| {
            commands
                .iter()
                .position(|command| command.contains(needle))
                .unwrap_or_else(|| panic!("missing {:?} in {:#?}", needle, commands))
        };

        // checkout precedes dependency resolution, which precedes the build
        assert!(position("git pull origin master") < position("go get -d ./..."));
        assert!(position("go get -d ./...") < position("go install -v"));
        assert!(position("go install -v") < position("go test"));
        // environment is exported before the pre-build hooks run
        assert!(position("set-env GOPATH=/jail") < position("make generate"));
        assert!(position("set-env CGO_LDFLAGS=") < position("make generate"));
        // hooks bracket the toolchain stages
        assert!(position("make generate") < position("go get -d ./..."));
        assert!(position("go test") < position("make package"));
    }

    #[test]
    fn project_path_is_derived_once_and_reused() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.run_tests = true;

        let (outcome, log, _closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        outcome.unwrap();

        let expected = "/jail/src/github.com/acme/widget/widget";
        let scoped: Vec<_> = log
            .borrow()
            .iter()
            .filter_map(|(_, dir)| dir.clone())
            .collect();
        assert!(!scoped.is_empty());
        assert!(scoped.iter().all(|dir| dir == expected));
    }

    #[test]
    fn environment_probes_all_run_before_the_stage_fails() {
        let dir = command_dir();
        let backend = ScriptedBackend::new()
            .fail_matching("ls ")
            .fail_matching("which ");

        let (outcome, log, closed) = run_build(test_config(), backend, &GoContext::at(dir.path()));
        let err = outcome.unwrap_err();
        assert!(*closed.borrow());

        let commands = flatten(&log);
        assert_eq!(commands.len(), 4, "exactly the four probes ran: {:#?}", commands);

        let message = err.to_string();
        assert!(message.contains("jail directory /jail"));
        assert!(message.contains("GOROOT directory /usr/local/go"));
        assert!(message.contains("go binary under /usr/local/go"));
        assert!(message.contains("git binary"));
    }

    #[test]
    fn missing_project_directories_are_created_before_checkout() {
        let dir = command_dir();
        let backend = ScriptedBackend::new().fail_matching("ls '/jail/src/");

        let (outcome, log, _closed) = run_build(test_config(), backend, &GoContext::at(dir.path()));
        outcome.unwrap();

        let commands = flatten(&log);
        let mkdir = commands
            .iter()
            .position(|command| command.starts_with("mkdir -p"))
            .expect("mkdir ran");
        let clone = commands
            .iter()
            .position(|command| command.starts_with("git clone"))
            .expect("clone ran");
        assert!(mkdir < clone);
    }

    #[test]
    fn pre_build_failure_stops_the_pipeline() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.pre_build_commands = vec!["./prepare.sh".to_string()];
        config.build.run_tests = true;

        let backend = ScriptedBackend::new().fail_matching("prepare.sh");
        let (outcome, log, closed) = run_build(config, backend, &GoContext::at(dir.path()));

        let err = outcome.unwrap_err();
        assert_eq!(err.code(), "COMMAND_ERROR");
        assert!(err.to_string().contains("./prepare.sh"));
        assert!(*closed.borrow());

        let commands = flatten(&log);
        assert!(!commands.iter().any(|command| command.starts_with("go ")));
    }

    #[test]
    fn no_test_commands_without_run_tests() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.run_tests = false;
        config.build.test_skynet = true;

        let (outcome, log, _closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        outcome.unwrap();

        let commands = flatten(&log);
        assert!(!commands.iter().any(|command| command.contains("go test")));
    }

    #[test]
    fn framework_suite_runs_when_both_test_flags_are_set() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.run_tests = true;
        config.build.test_skynet = true;

        let (outcome, log, _closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        outcome.unwrap();

        let framework = "/jail/src/github.com/skynetservices/skynet2";
        let commands = flatten(&log);
        assert!(commands.contains(&format!("go get -d ./... @ {}", framework)));
        assert!(commands.contains(&format!("go test ./... @ {}", framework)));
        // the app suite still ran first
        let app_tests = commands
            .iter()
            .position(|command| command == "go test @ /jail/src/github.com/acme/widget/widget")
            .expect("app tests ran");
        let framework_tests = commands
            .iter()
            .position(|command| command == &format!("go test ./... @ {}", framework))
            .unwrap();
        assert!(app_tests < framework_tests);
    }

    #[test]
    fn update_flags_extend_the_toolchain_commands() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.update_packages = true;
        config.build.build_all_packages = true;
        config.build.go_path = "/home/builder/go".to_string();

        let (outcome, log, _closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        outcome.unwrap();

        let commands = flatten(&log);
        assert!(commands.iter().any(|command| command.starts_with("go get -d -u ./...")));
        assert!(commands.iter().any(|command| command.starts_with("go install -v -a")));
        assert!(commands.contains(&"set-env GOPATH=/jail:/home/builder/go".to_string()));
    }

    #[test]
    fn unknown_repository_kinds_fail_before_any_command_runs() {
        let dir = command_dir();
        let mut config = test_config();
        config.build.repo_type = "svn".to_string();

        let (outcome, log, closed) = run_build(config, ScriptedBackend::new(), &GoContext::at(dir.path()));
        let err = outcome.unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("svn"));
        assert!(log.borrow().is_empty());
        assert!(*closed.borrow());
    }

    #[test]
    fn library_sources_fail_validation_before_any_command_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.go"), "package widget\n").unwrap();

        let (outcome, log, closed) = run_build(
            test_config(),
            ScriptedBackend::new(),
            &GoContext::at(dir.path()),
        );
        let err = outcome.unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(log.borrow().is_empty());
        assert!(*closed.borrow());
    }
}

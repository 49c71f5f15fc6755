use serde::Deserialize;

use crate::error::{Error, Result};

/// Configuration path used when the caller supplies none.
const DEFAULT_CONFIG_PATH: &str = "./build.cfg";

/// Immutable snapshot of all pipeline parameters. Loaded once at startup;
/// never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    #[serde(rename = "Build")]
    pub build: BuildConfig,
    #[serde(rename = "Deploy", default)]
    pub deploy: DeployConfig,
}

/// The `Build` section. The serde names are the external file contract;
/// existing build.cfg files load unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BuildConfig {
    pub host: String,
    pub user: String,
    pub jail: String,
    #[serde(rename = "CGO_CFLAGS")]
    pub cgo_cflags: String,
    #[serde(rename = "CGO_LDFLAGS")]
    pub cgo_ldflags: String,
    pub go_root: String,
    pub go_path: String,

    pub app_repo: String,
    pub app_path: String,
    pub repo_type: String,
    pub repo_branch: String,

    pub update_packages: bool,
    pub build_all_packages: bool,
    pub run_tests: bool,
    pub test_skynet: bool,

    pub pre_build_commands: Vec<String>,
    pub post_build_commands: Vec<String>,
}

/// The `Deploy` section: where the built binary lands and what it is called.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeployConfig {
    pub deploy_path: String,
    pub binary_name: String,
}

impl BuildConfig {
    /// GOPATH for the build: the jail, extended with the configured GoPath
    /// when one is set.
    pub fn go_path_env(&self) -> String {
        if self.go_path.is_empty() {
            self.jail.clone()
        } else {
            format!("{}:{}", self.jail, self.go_path)
        }
    }
}

/// Read and parse the configuration file. An empty path falls back to
/// `./build.cfg`; `~` expands to the user's home directory.
pub fn load(path: &str) -> Result<BuilderConfig> {
    let path = if path.is_empty() { DEFAULT_CONFIG_PATH } else { path };
    let expanded = shellexpand::tilde(path).to_string();

    let contents = std::fs::read_to_string(&expanded)
        .map_err(|err| Error::Config(format!("Failed to read {}: {}", expanded, err)))?;

    serde_json::from_str(&contents)
        .map_err(|err| Error::Config(format!("Failed to parse {}: {}", expanded, err)))
}

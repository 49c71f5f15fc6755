pub mod git;

pub use git::GitProvider;

use std::collections::HashMap;

use crate::backend::ExecutionBackend;
use crate::error::{Error, Result};

/// Checkout and import-path operations for one repository kind.
pub trait VcsProvider: std::fmt::Debug {
    /// Binary probed during environment validation (`which <binary>`).
    fn binary_name(&self) -> &str;

    /// Map a repository URL to the toolchain package-path convention.
    fn import_path(&self, repo_url: &str) -> Result<String>;

    /// Clone `repo_url` at `branch` into `dest`, or update an existing
    /// checkout in place. Must be idempotent.
    fn checkout(
        &self,
        backend: &mut dyn ExecutionBackend,
        repo_url: &str,
        branch: &str,
        dest: &str,
    ) -> Result<()>;
}

type ProviderFactory = fn() -> Box<dyn VcsProvider>;

/// Creates providers by repository kind. `git` ships built in; further
/// kinds register a factory instead of growing a conditional somewhere.
pub struct VcsRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl VcsRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("git", || Box::new(GitProvider));
        registry
    }

    pub fn register(&mut self, kind: &str, factory: ProviderFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn create(&self, kind: &str) -> Result<Box<dyn VcsProvider>> {
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| Error::Validation(format!("Unknown repository kind: {}", kind)))
    }
}

impl Default for VcsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source directory whose package kind is validated before a build.
///
/// Passed explicitly into the validation stage rather than held as process
/// state; defaults to the working directory, matching the convention that
/// the tool runs from the application's source checkout.
pub struct GoContext {
    pub dir: PathBuf,
}

impl GoContext {
    pub fn current() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Confirm the context directory holds a command (`package main`), not a
/// library. The artifact convention (`{jail}/bin/...`) only holds for
/// commands.
pub fn validate_command(ctx: &GoContext) -> Result<()> {
    let package = package_clause(&ctx.dir)?;
    if package != "main" {
        return Err(Error::Validation(format!(
            "{} is package {}, not a command (package main)",
            ctx.dir.display(),
            package
        )));
    }
    Ok(())
}

/// Read the package clause from the first non-test Go source file in `dir`.
fn package_clause(dir: &Path) -> Result<String> {
    let entries = std::fs::read_dir(dir).map_err(|err| {
        Error::Validation(format!(
            "Could not read source directory {}: {}",
            dir.display(),
            err
        ))
    })?;

    let mut sources: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "go")
                && !path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().ends_with("_test.go"))
        })
        .collect();
    sources.sort();

    for path in sources {
        let contents = std::fs::read_to_string(&path).map_err(|err| {
            Error::Validation(format!("Could not read {}: {}", path.display(), err))
        })?;
        if let Some(package) = parse_package_clause(&contents) {
            return Ok(package);
        }
    }

    Err(Error::Validation(format!(
        "No Go source files with a package clause in {}",
        dir.display()
    )))
}

/// Find the package clause, skipping leading comments and blank lines.
fn parse_package_clause(contents: &str) -> Option<String> {
    let mut in_comment = false;

    for raw in contents.lines() {
        let line = raw.trim();

        if in_comment {
            if line.contains("*/") {
                in_comment = false;
            }
            continue;
        }
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with("/*") {
            if !line.contains("*/") {
                in_comment = true;
            }
            continue;
        }

        return line
            .strip_prefix("package ")
            .map(|rest| rest.split_whitespace().next().unwrap_or("").to_string());
    }

    None
}

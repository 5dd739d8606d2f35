//! renv.lock parsing.
//!
//! The lock file is owned by renv and only ever read here. Two strategies
//! share the [`ParseOutcome`] result shape: a structured serde decode of the
//! lock schema, and a line-oriented scan that still recovers package names
//! from a truncated or hand-edited file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::manifest::ParseOutcome;
use crate::core::package::is_base_package;

/// Canonical lock file name.
pub const LOCKFILE_NAME: &str = "renv.lock";

/// One pinned package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEntry {
    pub name: String,
    pub version: String,
    /// Source repository (`CRAN`, `Bioconductor`, `GitHub`, ...)
    pub registry: String,
}

/// Parsed lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    /// R version recorded by renv
    pub r_version: Option<String>,

    /// Repository name -> URL
    pub repositories: BTreeMap<String, String>,

    /// Pinned packages by name (base packages excluded)
    pub entries: BTreeMap<String, LockEntry>,
}

impl Lockfile {
    /// Names of all pinned packages.
    pub fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawLockfile {
    #[serde(rename = "R", default)]
    r: Option<RawR>,
    #[serde(rename = "Packages", default)]
    packages: BTreeMap<String, RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawR {
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "Repositories", default)]
    repositories: Vec<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "URL")]
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(rename = "Package", default)]
    package: Option<String>,
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "Source", default)]
    source: Option<String>,
    #[serde(rename = "Repository", default)]
    repository: Option<String>,
}

/// A lock parsing strategy.
pub type LockStrategy = fn(&str) -> Result<Lockfile, String>;

/// Strategies in the order they are tried.
pub const LOCK_STRATEGIES: &[(&str, LockStrategy)] =
    &[("json", parse_structured), ("lines", parse_lines)];

/// Structured strategy: decode the JSON lock schema.
pub fn parse_structured(content: &str) -> Result<Lockfile, String> {
    let raw: RawLockfile = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let mut lock = Lockfile::default();
    if let Some(r) = raw.r {
        lock.r_version = r.version;
        lock.repositories = r
            .repositories
            .into_iter()
            .map(|repo| (repo.name, repo.url))
            .collect();
    }

    for (key, pkg) in raw.packages {
        let name = pkg.package.unwrap_or(key);
        if is_base_package(&name) {
            continue;
        }
        let registry = pkg
            .repository
            .or(pkg.source)
            .unwrap_or_else(|| "unknown".to_string());
        lock.entries.insert(
            name.clone(),
            LockEntry {
                name,
                version: pkg.version.unwrap_or_default(),
                registry,
            },
        );
    }
    Ok(lock)
}

static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""Package"\s*:\s*"([^"]+)""#).expect("valid regex"));
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""Version"\s*:\s*"([^"]+)""#).expect("valid regex"));
static REPOSITORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""Repository"\s*:\s*"([^"]+)""#).expect("valid regex"));
static SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""Source"\s*:\s*"([^"]+)""#).expect("valid regex"));

/// Line strategy: pair each `"Package"` line with the `"Version"` and
/// repository lines that follow it.
pub fn parse_lines(content: &str) -> Result<Lockfile, String> {
    let mut lock = Lockfile::default();
    let mut current: Option<LockEntry> = None;
    let mut seen_package = false;

    let flush = |lock: &mut Lockfile, entry: Option<LockEntry>| {
        if let Some(entry) = entry {
            if !is_base_package(&entry.name) {
                lock.entries.insert(entry.name.clone(), entry);
            }
        }
    };

    for line in content.lines() {
        if let Some(caps) = PACKAGE_RE.captures(line) {
            seen_package = true;
            flush(&mut lock, current.take());
            current = Some(LockEntry {
                name: caps[1].to_string(),
                version: String::new(),
                registry: "unknown".to_string(),
            });
            continue;
        }
        if let Some(caps) = VERSION_RE.captures(line) {
            match current.as_mut() {
                Some(entry) if entry.version.is_empty() => entry.version = caps[1].to_string(),
                // The R block's version comes before any package
                None if lock.r_version.is_none() => lock.r_version = Some(caps[1].to_string()),
                _ => {}
            }
            continue;
        }
        if let Some(entry) = current.as_mut() {
            if let Some(caps) = REPOSITORY_RE.captures(line) {
                entry.registry = caps[1].to_string();
            } else if let Some(caps) = SOURCE_RE.captures(line) {
                if entry.registry == "unknown" {
                    entry.registry = caps[1].to_string();
                }
            }
        }
    }
    flush(&mut lock, current.take());

    if !seen_package && !content.contains("\"Packages\"") {
        return Err("no package records found".to_string());
    }
    Ok(lock)
}

/// Result of loading a lock file through the strategy list.
#[derive(Debug, Clone)]
pub struct LockLoad {
    pub lockfile: Option<Lockfile>,
    pub outcome: ParseOutcome,
    pub strategy: Option<&'static str>,
}

/// Load the lock file at `path`, trying each strategy in order.
pub fn load_lockfile(path: &Path) -> LockLoad {
    if !path.exists() {
        return LockLoad {
            lockfile: None,
            outcome: ParseOutcome::failed(format!("no {} found at `{}`", LOCKFILE_NAME, path.display())),
            strategy: None,
        };
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return LockLoad {
                lockfile: None,
                outcome: ParseOutcome::failed(format!("failed to read `{}`: {}", path.display(), e)),
                strategy: None,
            }
        }
    };

    let mut failures = Vec::new();
    for (name, strategy) in LOCK_STRATEGIES {
        match strategy(&content) {
            Ok(lock) => {
                if !failures.is_empty() {
                    tracing::warn!(
                        "{} is not valid JSON; recovered {} packages line by line",
                        path.display(),
                        lock.entries.len()
                    );
                }
                let outcome = ParseOutcome::ok(
                    lock.names(),
                    format!("{} pins {} packages", LOCKFILE_NAME, lock.entries.len()),
                );
                return LockLoad {
                    lockfile: Some(lock),
                    outcome,
                    strategy: Some(*name),
                };
            }
            Err(message) => failures.push(format!("{}: {}", name, message)),
        }
    }

    LockLoad {
        lockfile: None,
        outcome: ParseOutcome::failed(format!(
            "failed to parse `{}`: {}",
            path.display(),
            failures.join("; ")
        )),
        strategy: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOCK: &str = r#"{
  "R": {
    "Version": "4.4.1",
    "Repositories": [
      {
        "Name": "CRAN",
        "URL": "https://cloud.r-project.org"
      }
    ]
  },
  "Packages": {
    "dplyr": {
      "Package": "dplyr",
      "Version": "1.1.4",
      "Source": "Repository",
      "Repository": "CRAN",
      "Requirements": ["R", "rlang", "utils"]
    },
    "rlang": {
      "Package": "rlang",
      "Version": "1.1.3",
      "Source": "Repository",
      "Repository": "CRAN"
    },
    "utils": {
      "Package": "utils",
      "Version": "4.4.1",
      "Source": "Repository"
    }
  }
}
"#;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_structured() {
        let lock = parse_structured(LOCK).unwrap();
        assert_eq!(lock.r_version.as_deref(), Some("4.4.1"));
        assert_eq!(lock.repositories["CRAN"], "https://cloud.r-project.org");
        assert_eq!(lock.names(), set(&["dplyr", "rlang"]));
        assert_eq!(lock.entries["dplyr"].version, "1.1.4");
        assert_eq!(lock.entries["dplyr"].registry, "CRAN");
    }

    #[test]
    fn test_lines_agree_with_structured() {
        let structured = parse_structured(LOCK).unwrap();
        let lines = parse_lines(LOCK).unwrap();
        assert_eq!(structured.names(), lines.names());
        assert_eq!(lines.r_version.as_deref(), Some("4.4.1"));
        assert_eq!(lines.entries["rlang"].version, "1.1.3");
        assert_eq!(lines.entries["dplyr"].registry, "CRAN");
    }

    #[test]
    fn test_lines_recover_truncated_file() {
        let truncated = &LOCK[..LOCK.find("\"rlang\": {").unwrap() + 40];
        assert!(parse_structured(truncated).is_err());

        let lock = parse_lines(truncated).unwrap();
        assert!(lock.names().contains("dplyr"));
        assert!(lock.names().contains("rlang"));
    }

    #[test]
    fn test_lines_reject_unrelated_text() {
        assert!(parse_lines("hello world").is_err());
    }

    #[test]
    fn test_empty_packages_is_valid() {
        let lock = parse_structured(r#"{"R": {"Version": "4.3.0"}, "Packages": {}}"#).unwrap();
        assert!(lock.entries.is_empty());
    }

    #[test]
    fn test_load_missing() {
        let tmp = TempDir::new().unwrap();
        let load = load_lockfile(&tmp.path().join(LOCKFILE_NAME));
        assert!(load.outcome.error);
        assert!(load.outcome.message.contains("no renv.lock found"));
    }

    #[test]
    fn test_load_uses_fallback() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCKFILE_NAME);
        std::fs::write(&path, &LOCK[..LOCK.len() - 10]).unwrap();

        let load = load_lockfile(&path);
        assert_eq!(load.strategy, Some("lines"));
        assert!(!load.outcome.error);
        assert_eq!(load.outcome.packages, set(&["dplyr", "rlang"]));
    }
}

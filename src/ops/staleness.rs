//! Staleness detection for generated artifacts.
//!
//! Reads the stamp of every tracked artifact in a project and compares it
//! with the generator's version. Batch mode discovers project roots below a
//! directory first and checks each in path order.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use semver::Version;
use serde::Serialize;
use walkdir::WalkDir;

use crate::core::manifest::MANIFEST_NAME;
use crate::core::stamp::{VersionStamp, OWNER_TOOL, STAMP_SCAN_LINES, TRACKED_ARTIFACTS};
use crate::util::fs::{read_head_lines, relative_path};

/// Default depth of the batch scan.
pub const DEFAULT_SCAN_DEPTH: usize = 3;

/// Directories the batch scan never enters.
const SKIPPED_DIRS: &[&str] = &["renv", "packrat", "node_modules", "target"];

/// Staleness of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessStatus {
    /// Stamped with the generator's version
    Current,
    /// Stamped with an older version
    Outdated,
    /// No stamp (written before stamping existed)
    Unstamped,
    /// Stamped with a newer version than this generator
    Ahead,
}

impl StalenessStatus {
    pub fn compare(stamped: Option<&Version>, current: &Version) -> Self {
        match stamped.map(|v| v.cmp(current)) {
            None => StalenessStatus::Unstamped,
            Some(Ordering::Equal) => StalenessStatus::Current,
            Some(Ordering::Less) => StalenessStatus::Outdated,
            Some(Ordering::Greater) => StalenessStatus::Ahead,
        }
    }
}

impl fmt::Display for StalenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalenessStatus::Current => write!(f, "current"),
            StalenessStatus::Outdated => write!(f, "outdated"),
            StalenessStatus::Unstamped => write!(f, "unstamped"),
            StalenessStatus::Ahead => write!(f, "ahead"),
        }
    }
}

/// Status of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub artifact: String,
    /// Path relative to the project root
    pub path: PathBuf,
    pub status: StalenessStatus,
    pub stamped: Option<Version>,
}

/// Status of every present artifact in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStaleness {
    pub root: PathBuf,
    pub artifacts: Vec<ArtifactStatus>,
    /// Set when the root could not be checked in a batch scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectStaleness {
    pub fn outdated(&self) -> impl Iterator<Item = &ArtifactStatus> {
        self.artifacts
            .iter()
            .filter(|a| a.status == StalenessStatus::Outdated)
    }
}

/// Check every tracked artifact under `root`. Missing files are skipped.
pub fn check_root(root: &Path, current: &Version) -> Result<ProjectStaleness> {
    let mut artifacts = Vec::new();
    for artifact in TRACKED_ARTIFACTS {
        let path = root.join(artifact.path);
        if !path.is_file() {
            continue;
        }
        let lines = read_head_lines(&path, STAMP_SCAN_LINES)?;
        let stamped = VersionStamp::read(&lines, artifact.id).map(|s| s.version);
        let status = StalenessStatus::compare(stamped.as_ref(), current);
        tracing::debug!("{}: {}", path.display(), status);
        artifacts.push(ArtifactStatus {
            artifact: artifact.id.to_string(),
            path: PathBuf::from(artifact.path),
            status,
            stamped,
        });
    }
    Ok(ProjectStaleness {
        root: root.to_path_buf(),
        artifacts,
        error: None,
    })
}

/// Whether `dir` looks like a project root: it holds a DESCRIPTION, or a
/// tracked artifact whose head mentions this tool.
pub fn is_project_root(dir: &Path) -> bool {
    if dir.join(MANIFEST_NAME).is_file() {
        return true;
    }
    TRACKED_ARTIFACTS.iter().any(|artifact| {
        let path = dir.join(artifact.path);
        path.is_file()
            && read_head_lines(&path, STAMP_SCAN_LINES)
                .map(|lines| lines.iter().any(|l| l.contains(OWNER_TOOL)))
                .unwrap_or(false)
    })
}

/// Project roots at most `max_depth` levels below `dir`, sorted.
pub fn discover_roots(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
        });

    let mut roots: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && is_project_root(e.path()))
        .map(|e| e.into_path())
        .collect();
    roots.sort();
    roots
}

/// Discover roots below `dir` and check each, in path order.
///
/// A root that cannot be checked is reported with its error and the scan
/// moves on.
pub fn scan(dir: &Path, max_depth: usize, current: &Version) -> Vec<ProjectStaleness> {
    discover_roots(dir, max_depth)
        .into_iter()
        .map(|root| {
            let rel = relative_path(dir, &root);
            match check_root(&root, current) {
                Ok(result) => ProjectStaleness { root: rel, ..result },
                Err(e) => {
                    tracing::debug!("skipping {}: {:#}", root.display(), e);
                    ProjectStaleness {
                        root: rel,
                        artifacts: Vec::new(),
                        error: Some(format!("{:#}", e)),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_compare() {
        let current = Version::new(1, 2, 0);
        assert_eq!(StalenessStatus::compare(None, &current), StalenessStatus::Unstamped);
        assert_eq!(
            StalenessStatus::compare(Some(&Version::new(1, 2, 0)), &current),
            StalenessStatus::Current
        );
        assert_eq!(
            StalenessStatus::compare(Some(&Version::new(1, 1, 9)), &current),
            StalenessStatus::Outdated
        );
        assert_eq!(
            StalenessStatus::compare(Some(&Version::new(2, 0, 0)), &current),
            StalenessStatus::Ahead
        );
    }

    #[test]
    fn test_stamp_round_trip_against_increments() {
        let tmp = TempDir::new().unwrap();
        let x = Version::new(1, 4, 2);
        let stamp = VersionStamp::new("Makefile", x.clone());
        write(tmp.path(), "Makefile", &stamp.apply("all:\n"));

        let current = check_root(tmp.path(), &x).unwrap();
        assert_eq!(current.artifacts[0].status, StalenessStatus::Current);

        for next in [Version::new(1, 4, 3), Version::new(1, 5, 0), Version::new(2, 0, 0)] {
            let result = check_root(tmp.path(), &next).unwrap();
            assert_eq!(result.artifacts[0].status, StalenessStatus::Outdated);
        }
    }

    #[test]
    fn test_legacy_compares_as_patch() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Dockerfile", "# compendium Dockerfile v3\nFROM scratch\n");

        let result = check_root(tmp.path(), &Version::new(0, 0, 3)).unwrap();
        assert_eq!(result.artifacts[0].status, StalenessStatus::Current);
        assert_eq!(result.artifacts[0].stamped, Some(Version::new(0, 0, 3)));

        let result = check_root(tmp.path(), &Version::new(0, 0, 4)).unwrap();
        assert_eq!(result.artifacts[0].status, StalenessStatus::Outdated);
    }

    #[test]
    fn test_unstamped_and_missing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), ".Rprofile", "options(repos = 'https://cloud.r-project.org')\n");
        write(tmp.path(), "Makefile", "# compendium Dockerfile v1.0.0\nall:\n");

        let result = check_root(tmp.path(), &Version::new(1, 0, 0)).unwrap();
        // Dockerfile, docker-compose.yml and the workflow are absent
        assert_eq!(result.artifacts.len(), 2);
        assert!(result
            .artifacts
            .iter()
            .all(|a| a.status == StalenessStatus::Unstamped));
        assert_eq!(result.outdated().count(), 0);
    }

    #[test]
    fn test_workflow_artifact_path() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            ".github/workflows/r-package.yml",
            "# compendium workflow v0.1.0\nname: R\n",
        );
        let result = check_root(tmp.path(), &Version::new(0, 2, 0)).unwrap();
        assert_eq!(result.artifacts[0].artifact, "workflow");
        assert_eq!(result.artifacts[0].status, StalenessStatus::Outdated);
    }

    #[test]
    fn test_batch_scan_is_lexicographic() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "zeta/DESCRIPTION", "Package: zeta\n");
        write(root, "alpha/Dockerfile", "# compendium Dockerfile v0.0.1\nFROM scratch\n");
        write(root, "mid/inner/DESCRIPTION", "Package: inner\n");
        write(root, "other/Dockerfile", "FROM scratch\n"); // not ours
        write(root, "too/deep/for/scan/DESCRIPTION", "Package: deep\n");
        write(root, ".hidden/DESCRIPTION", "Package: hidden\n");

        let results = scan(root, DEFAULT_SCAN_DEPTH, &Version::new(0, 0, 1));
        let roots: Vec<PathBuf> = results.iter().map(|r| r.root.clone()).collect();
        assert_eq!(
            roots,
            vec![
                PathBuf::from("alpha"),
                PathBuf::from("mid/inner"),
                PathBuf::from("zeta"),
            ]
        );
        assert_eq!(results[0].artifacts[0].status, StalenessStatus::Current);
    }

    #[cfg(unix)]
    #[test]
    fn test_batch_scan_continues_past_unreadable_root() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "a/DESCRIPTION", "Package: a\n");
        write(root, "a/Dockerfile", "# compendium Dockerfile v0.0.1\nFROM scratch\n");
        write(root, "b/DESCRIPTION", "Package: b\n");
        write(root, "b/Dockerfile", "# compendium Dockerfile v0.0.1\nFROM scratch\n");
        write(root, "c/DESCRIPTION", "Package: c\n");
        write(root, "c/Makefile", "# compendium Makefile v0.0.1\nall:\n");

        let locked = root.join("b/Dockerfile");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read(&locked).is_ok() {
            // root ignores permission bits
            return;
        }

        let results = scan(root, DEFAULT_SCAN_DEPTH, &Version::new(0, 0, 1));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();

        let roots: Vec<PathBuf> = results.iter().map(|r| r.root.clone()).collect();
        assert_eq!(roots, vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]);
        assert!(results[0].error.is_none());
        assert!(results[1].error.is_some());
        assert!(results[1].artifacts.is_empty());
        assert_eq!(results[2].artifacts[0].status, StalenessStatus::Current);
    }
}

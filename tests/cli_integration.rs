//! CLI integration tests for compendium.
//!
//! These tests run the binary against throwaway projects. The registry is a
//! `file://` mirror and renv is replaced by a shell command, so nothing here
//! touches the network or needs R installed.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Lock file written by the stand-in restore command.
const RESTORED_LOCK: &str = r#"{"R":{"Version":"4.4.1"},"Packages":{}}"#;

const PROJECT_CONFIG: &str = r#"[lock]
restore_command = ["sh", "-c", "echo '{\"R\":{\"Version\":\"4.4.1\"},\"Packages\":{}}' > renv.lock"]
"#;

/// Get the compendium binary command, isolated from the user's config.
fn compendium(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("compendium").unwrap();
    cmd.env("HOME", home).env_remove("COMPENDIUM_REGISTRY_URL");
    cmd
}

struct Project {
    tmp: TempDir,
}

impl Project {
    /// A project whose registry publishes `registry`.
    fn new(description: &str, registry: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let project = Project { tmp };
        project.write("project/DESCRIPTION", description);
        project.write("project/renv.lock", RESTORED_LOCK);
        project.write("project/.compendium/config.toml", PROJECT_CONFIG);

        let index: String = registry
            .iter()
            .map(|name| format!("Package: {}\nVersion: 1.0.0\n\n", name))
            .collect();
        project.write("mirror/src/contrib/PACKAGES", &index);
        project
    }

    fn root(&self) -> std::path::PathBuf {
        self.tmp.path().join("project")
    }

    fn write(&self, rel: &str, text: &str) {
        let path = self.tmp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).unwrap()
    }

    fn cmd(&self) -> Command {
        let mirror = url::Url::from_directory_path(self.tmp.path().join("mirror")).unwrap();
        let mut cmd = compendium(self.tmp.path());
        cmd.current_dir(self.root())
            .env("COMPENDIUM_REGISTRY_URL", mirror.as_str());
        cmd
    }
}

// ============================================================================
// compendium check
// ============================================================================

#[test]
fn test_check_clean_project_is_ready() {
    let project = Project::new("Package: demo\nVersion: 0.1.0\nImports: alpha\n", &["alpha"]);
    project.write("project/R/main.R", "library(alpha)\n");

    project
        .cmd()
        .arg("check")
        .assert()
        .success()
        .stdout("READY\n");
}

#[cfg(unix)]
#[test]
fn test_check_missing_dependency_then_fix() {
    let project = Project::new("Package: demo\nVersion: 0.1.0\nImports: alpha\n", &["alpha", "beta"]);
    project.write("project/R/main.R", "library(alpha)\nbeta::run()\n");

    project
        .cmd()
        .arg("check")
        .assert()
        .code(1)
        .stdout("NOT READY\n")
        .stderr(predicate::str::contains("`beta` is used in code"))
        .stderr(predicate::str::contains("R/main.R"));

    project
        .cmd()
        .args(["check", "--fix"])
        .assert()
        .success()
        .stdout("READY\n")
        .stderr(predicate::str::contains("beta to Imports"));

    let description = project.read("DESCRIPTION");
    assert!(description.contains("beta"));
    assert!(description.contains("Version: 0.1.0"));
}

#[cfg(unix)]
#[test]
fn test_check_fix_removes_unpublished_package() {
    let project = Project::new("Package: demo\nVersion: 0.1.0\nImports: gamma\n", &["alpha"]);

    project
        .cmd()
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("registry does not publish"));

    project
        .cmd()
        .args(["check", "--yes"])
        .assert()
        .success()
        .stdout("READY\n");

    assert!(!project.read("DESCRIPTION").contains("gamma"));
    assert_eq!(project.read("renv.lock").trim(), RESTORED_LOCK);
}

#[test]
fn test_check_fail_on_issues_reports_without_fixing() {
    let project = Project::new("Package: demo\nImports: alpha\n", &["alpha", "beta"]);
    project.write("project/R/main.R", "library(alpha)\nlibrary(beta)\n");

    project
        .cmd()
        .args(["check", "--fail-on-issues"])
        .assert()
        .code(1)
        .stdout("NOT READY\n")
        .stderr(predicate::str::contains("`beta` is used in code"));

    assert!(!project.read("DESCRIPTION").contains("beta"));
}

#[test]
fn test_check_without_description_is_not_ready() {
    let tmp = TempDir::new().unwrap();

    compendium(tmp.path())
        .args(["--offline", "check"])
        .current_dir(tmp.path())
        .assert()
        .code(1)
        .stdout("NOT READY\n")
        .stderr(predicate::str::contains("DESCRIPTION"));
}

#[test]
fn test_check_unreachable_registry_is_advisory() {
    let project = Project::new("Package: demo\nImports: alpha\n", &["alpha"]);
    project.write("project/R/main.R", "library(alpha)\n");

    project
        .cmd()
        .arg("check")
        .env("COMPENDIUM_REGISTRY_URL", "http://127.0.0.1:1/")
        .assert()
        .success()
        .stdout("READY\n")
        .stderr(predicate::str::contains("registry unavailable"));
}

#[test]
fn test_check_quiet_prints_only_verdict() {
    let project = Project::new("Package: demo\nImports: alpha\n", &["alpha"]);
    project.write("project/R/main.R", "library(alpha)\n");

    project
        .cmd()
        .args(["--quiet", "check"])
        .assert()
        .success()
        .stdout("READY\n")
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_check_offline_json_report() {
    let project = Project::new("Package: demo\nImports: alpha\n", &[]);
    project.write("project/R/main.R", "library(alpha)\nlibrary(beta)\n");

    project
        .cmd()
        .args(["--offline", "--message-format", "json", "check"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""reason":"check-report""#))
        .stdout(predicate::str::contains(r#""missing":["beta"]"#))
        .stdout(predicate::str::contains(r#""ready":false"#))
        .stdout(predicate::str::contains("READY").not());
}

#[test]
fn test_check_ignores_commented_library_calls() {
    let project = Project::new("Package: demo\nImports: alpha\n", &["alpha", "fakepkg"]);
    project.write(
        "project/analysis.Rmd",
        "Some prose about library(fakepkg).\n\n```{r}\nlibrary(alpha) # library(fakepkg)\n```\n",
    );

    project
        .cmd()
        .arg("check")
        .assert()
        .success()
        .stdout("READY\n");
}

// ============================================================================
// compendium dockerfile / sysdeps
// ============================================================================

#[test]
fn test_dockerfile_stdout() {
    let project = Project::new("Package: demo\nImports: xml2, alpha\n", &[]);

    project
        .cmd()
        .args(["dockerfile", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!(
            "# compendium Dockerfile v{}\nFROM rocker/r-ver:4.4.1",
            env!("CARGO_PKG_VERSION")
        )))
        .stdout(predicate::str::contains("libxml2-dev"))
        .stdout(predicate::str::contains("renv::restore()"));

    assert!(!project.root().join("Dockerfile").exists());
}

#[test]
fn test_dockerfile_written_and_current() {
    let project = Project::new("Package: demo\nImports: alpha\n", &[]);

    project
        .cmd()
        .args(["dockerfile", "--base-image", "rocker/verse:4.4.1"])
        .assert()
        .success();

    let dockerfile = project.read("Dockerfile");
    assert!(dockerfile.contains("FROM rocker/verse:4.4.1"));
    assert!(dockerfile.contains("# No system dependencies required"));

    project
        .cmd()
        .arg("staleness")
        .assert()
        .success()
        .stderr(predicate::str::contains("Current"))
        .stderr(predicate::str::contains("Dockerfile"));
}

#[test]
fn test_sysdeps_lists_sorted_packages() {
    let project = Project::new("Package: demo\nImports: xml2, curl\n", &[]);

    project
        .cmd()
        .arg("sysdeps")
        .assert()
        .success()
        .stdout("libcurl4-openssl-dev\nlibxml2-dev\n");
}

// ============================================================================
// compendium stamp / staleness
// ============================================================================

#[test]
fn test_stamp_then_staleness_outdated() {
    let project = Project::new("Package: demo\n", &[]);
    project.write("project/Makefile", "all:\n\techo hi\n");

    project
        .cmd()
        .args(["stamp", "Makefile", "--artifact", "Makefile", "--version", "0.0.1"])
        .assert()
        .success();

    assert!(project
        .read("Makefile")
        .starts_with("# compendium Makefile v0.0.1\nall:"));

    project
        .cmd()
        .args(["staleness", "--current", "0.0.2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Outdated"))
        .stderr(predicate::str::contains("Makefile v0.0.1"));

    project
        .cmd()
        .args(["staleness", "--current", "0.0.1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Current"));
}

#[test]
fn test_stamp_unknown_artifact_fails() {
    let project = Project::new("Package: demo\n", &[]);
    project.write("project/notes.txt", "hello\n");

    project
        .cmd()
        .args(["stamp", "notes.txt", "--artifact", "notes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown artifact"));
}

#[test]
fn test_staleness_batch_scan() {
    let tmp = TempDir::new().unwrap();
    let write = |rel: &str, text: &str| {
        let path = tmp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    };
    write("b-project/DESCRIPTION", "Package: b\n");
    write("b-project/Dockerfile", "# compendium Dockerfile v2\nFROM scratch\n");
    write("a-project/DESCRIPTION", "Package: a\n");
    write("a-project/.Rprofile", "options(warn = 1)\n");

    let output = compendium(tmp.path())
        .args(["staleness", "--scan", ".", "--current", "0.0.3"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let a = stderr.find("a-project/.Rprofile (unstamped)").unwrap();
    let b = stderr.find("b-project/Dockerfile v0.0.2").unwrap();
    assert!(a < b);
}

// ============================================================================
// compendium completions
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();

    compendium(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compendium"));
}

//! Auto-fix: bring DESCRIPTION and renv.lock in line with the code.
//!
//! The manifest step is a two-phase commit with a file backup as the undo
//! log:
//!
//! 1. copy DESCRIPTION to `DESCRIPTION.backup.<timestamp>`
//! 2. drop invalid names, add missing names to `Imports`
//! 3. serialize and write atomically
//! 4. delete the backup on success, restore it on any error
//!
//! The lock step runs only after the manifest step succeeded and is
//! delegated to a [`LockRestorer`]. Its failure is reported on its own and
//! never touches DESCRIPTION.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use thiserror::Error;

use crate::core::lockfile::LOCKFILE_NAME;
use crate::core::manifest::MANIFEST_NAME;
use crate::core::serializer::{ManifestEdit, ManifestSerializer};
use crate::ops::reconcile::ReconciliationReport;
use crate::util::fs;
use crate::util::process::{find_executable, find_rscript, ProcessBuilder};
use crate::util::Config;

/// Errors from the manifest step.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to back up {}: {reason}", path.display())]
    Backup { path: PathBuf, reason: String },

    #[error("failed to rewrite {}; original restored: {reason}", path.display())]
    Restored { path: PathBuf, reason: String },

    #[error("failed to rewrite {} and could not restore it; backup kept at {}: {reason}", path.display(), backup.display())]
    RestoreFailed {
        path: PathBuf,
        backup: PathBuf,
        reason: String,
    },
}

/// What the fix will change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixPlan {
    pub edit: ManifestEdit,
    /// Remove renv.lock and regenerate it rather than refreshing in place
    pub regenerate_lock: bool,
}

impl FixPlan {
    pub fn from_report(report: &ReconciliationReport) -> Self {
        FixPlan {
            edit: ManifestEdit {
                remove: report.invalid_in_manifest.clone(),
                add_primary: report.missing.clone(),
            },
            regenerate_lock: !report.extra_in_lock.is_empty(),
        }
    }

    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.edit.is_empty() && !self.regenerate_lock
    }
}

/// Result of the manifest step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestChange {
    /// DESCRIPTION was rewritten
    pub written: bool,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

/// Rewrites DESCRIPTION through a [`ManifestSerializer`] with backup and
/// rollback.
pub struct ManifestEditor<'a> {
    serializer: &'a dyn ManifestSerializer,
}

impl<'a> ManifestEditor<'a> {
    pub fn new(serializer: &'a dyn ManifestSerializer) -> Self {
        ManifestEditor { serializer }
    }

    /// Apply `edit` to the manifest at `path`.
    ///
    /// On error the file on disk is byte-identical to what it was before the
    /// call, unless restoring the backup itself failed.
    pub fn apply(&self, path: &Path, edit: &ManifestEdit) -> Result<ManifestChange, FixError> {
        if edit.is_empty() {
            return Ok(ManifestChange::default());
        }

        let original = fs::read_to_string(path).map_err(|e| FixError::Read {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        let backup = fs::backup_file(path).map_err(|e| FixError::Backup {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        let result = self
            .serializer
            .rewrite(&original, edit)
            .and_then(|updated| {
                if updated != original {
                    fs::atomic_write(path, &updated)?;
                }
                Ok(updated != original)
            });

        match result {
            Ok(written) => {
                if let Err(e) = fs::remove_file_if_exists(&backup) {
                    tracing::warn!("could not remove backup {}: {:#}", backup.display(), e);
                }
                tracing::debug!(
                    "{} {} via `{}` serializer",
                    if written { "rewrote" } else { "left unchanged" },
                    path.display(),
                    self.serializer.name()
                );
                Ok(ManifestChange {
                    written,
                    removed: edit.remove.iter().cloned().collect(),
                    added: edit.add_primary.iter().cloned().collect(),
                })
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                match fs::restore_backup(&backup, path) {
                    Ok(()) => Err(FixError::Restored {
                        path: path.to_path_buf(),
                        reason,
                    }),
                    Err(restore) => Err(FixError::RestoreFailed {
                        path: path.to_path_buf(),
                        backup,
                        reason: format!("{}; restore: {:#}", reason, restore),
                    }),
                }
            }
        }
    }
}

/// Collaborator that produces renv.lock from the current manifest and
/// installed library.
pub trait LockRestorer {
    fn describe(&self) -> String;

    /// Write the lock file for the project at `project_root`, returning its
    /// path.
    fn restore(&self, project_root: &Path, manifest: &Path) -> Result<PathBuf>;
}

/// Runs renv through `Rscript` (or any configured command).
#[derive(Debug, Clone)]
pub struct RenvRestorer {
    command: Vec<String>,
}

impl RenvRestorer {
    pub fn new(command: Vec<String>) -> Self {
        RenvRestorer { command }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.restore_command())
    }

    fn program(&self) -> Result<PathBuf> {
        let Some(name) = self.command.first() else {
            bail!("lock restore command is empty");
        };
        let found = if name == "Rscript" {
            find_rscript()
        } else {
            find_executable(name)
        };
        match found {
            Some(path) => Ok(path),
            None => bail!("`{}` not found on PATH; install R or set `lock.restore_command`", name),
        }
    }
}

impl LockRestorer for RenvRestorer {
    fn describe(&self) -> String {
        self.command.join(" ")
    }

    fn restore(&self, project_root: &Path, manifest: &Path) -> Result<PathBuf> {
        let program = self.program()?;
        tracing::debug!("regenerating lock for {}", manifest.display());

        ProcessBuilder::new(program)
            .args(&self.command[1..])
            .cwd(project_root)
            .exec_and_check()
            .context("lock file regeneration failed")?;

        let lock = project_root.join(LOCKFILE_NAME);
        if !lock.is_file() {
            bail!("`{}` finished without writing {}", self.describe(), LOCKFILE_NAME);
        }
        Ok(lock)
    }
}

/// Result of the lock step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum LockStep {
    /// Not attempted (manifest step failed, or nothing to do)
    Skipped(String),
    Refreshed(PathBuf),
    Regenerated(PathBuf),
    Failed(String),
}

/// Run the lock step. An existing lock is backed up first and restored if
/// the restorer fails; `regenerate` removes it before the restorer runs.
pub fn update_lock(project_root: &Path, restorer: &dyn LockRestorer, regenerate: bool) -> LockStep {
    let lock = project_root.join(LOCKFILE_NAME);
    let manifest = project_root.join(MANIFEST_NAME);

    let backup = if lock.exists() {
        match fs::backup_file(&lock) {
            Ok(b) => Some(b),
            Err(e) => return LockStep::Failed(format!("{:#}", e)),
        }
    } else {
        None
    };

    if regenerate {
        if let Err(e) = fs::remove_file_if_exists(&lock) {
            return LockStep::Failed(format!("{:#}", e));
        }
    }

    match restorer.restore(project_root, &manifest) {
        Ok(path) => {
            if let Some(backup) = backup {
                if let Err(e) = fs::remove_file_if_exists(&backup) {
                    tracing::warn!("could not remove backup {}: {:#}", backup.display(), e);
                }
            }
            if regenerate {
                LockStep::Regenerated(path)
            } else {
                LockStep::Refreshed(path)
            }
        }
        Err(e) => {
            let mut reason = format!("{:#}", e);
            if let Some(backup) = backup {
                if let Err(restore) = fs::restore_backup(&backup, &lock) {
                    reason = format!("{}; backup kept at {}: {:#}", reason, backup.display(), restore);
                }
            }
            LockStep::Failed(reason)
        }
    }
}

/// Combined result of both steps.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub manifest: ManifestChange,
    /// Manifest step error, if any
    pub manifest_error: Option<String>,
    pub lock: LockStep,
}

impl FixOutcome {
    pub fn succeeded(&self) -> bool {
        self.manifest_error.is_none() && !matches!(self.lock, LockStep::Failed(_))
    }
}

/// Apply `plan` to the project at `project_root`.
pub fn apply_fix(
    project_root: &Path,
    plan: &FixPlan,
    serializer: &dyn ManifestSerializer,
    restorer: &dyn LockRestorer,
) -> FixOutcome {
    if plan.is_empty() {
        return FixOutcome {
            manifest: ManifestChange::default(),
            manifest_error: None,
            lock: LockStep::Skipped("nothing to fix".to_string()),
        };
    }

    let manifest_path = project_root.join(MANIFEST_NAME);
    let manifest = match ManifestEditor::new(serializer).apply(&manifest_path, &plan.edit) {
        Ok(change) => change,
        Err(e) => {
            tracing::debug!("{}", e);
            return FixOutcome {
                manifest: ManifestChange::default(),
                manifest_error: Some(e.to_string()),
                lock: LockStep::Skipped("manifest update failed".to_string()),
            };
        }
    };

    let lock = update_lock(project_root, restorer, plan.regenerate_lock);
    if let LockStep::Failed(reason) = &lock {
        tracing::debug!("lock step failed: {}", reason);
    }

    FixOutcome {
        manifest,
        manifest_error: None,
        lock,
    }
}

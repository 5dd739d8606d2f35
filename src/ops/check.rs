//! The `check` pipeline.
//!
//! extract + parse + validate + reconcile, then optionally fix and re-run
//! the same inspection to confirm the result. The verdict always comes from
//! the last inspection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::core::lockfile::{load_lockfile, LOCKFILE_NAME};
use crate::core::manifest::{load_manifest, ParseOutcome, MANIFEST_NAME};
use crate::core::serializer::{serializer_for, ManifestSerializer};
use crate::ops::extract::{extract, DependencyReference, ExtractOptions, Extraction};
use crate::ops::fix::{apply_fix, FixOutcome, FixPlan, LockRestorer, LockStep, RenvRestorer};
use crate::ops::reconcile::{reconcile, ReconcileInput, ReconciliationReport};
use crate::ops::validate::{RegistryValidator, ValidationOutcome};
use crate::sources::HttpIndex;
use crate::util::Config;

/// Options for one check run.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub project_root: PathBuf,
    /// Scan the wider directory set
    pub strict: bool,
    /// Apply fixes without asking
    pub fix: bool,
}

/// State of the project at one point in time.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub manifest: ParseOutcome,
    pub lock: ParseOutcome,
    pub extraction: Extraction,
    pub validation: ValidationOutcome,
    pub report: ReconciliationReport,
    pub warnings: Vec<String>,
    /// Registry was skipped on purpose
    pub offline: bool,
}

impl Inspection {
    /// Critical findings block READY; the registry being unavailable never does.
    pub fn has_critical(&self) -> bool {
        self.manifest.error || self.lock.error || self.report.has_critical()
    }

    /// The fix this inspection calls for.
    pub fn fix_plan(&self) -> FixPlan {
        let mut plan = FixPlan::from_report(&self.report);
        // A missing or unreadable lock is rebuilt by the restorer
        plan.regenerate_lock |= self.lock.error;
        plan
    }

    /// Whether `--fix` can do anything for this project.
    pub fn is_fixable(&self) -> bool {
        !self.manifest.error && !self.fix_plan().is_empty()
    }
}

/// Extraction summary carried in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub files_scanned: usize,
    pub unreadable: Vec<PathBuf>,
    pub packages: BTreeSet<String>,
    pub references: Vec<DependencyReference>,
}

/// Everything `check` found, serializable for `--message-format json`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub project_root: PathBuf,
    pub manifest: ParseOutcome,
    pub lock: ParseOutcome,
    pub extraction: ExtractionSummary,
    pub validation: ValidationOutcome,
    pub reconciliation: ReconciliationReport,
    /// Report before `--fix`, when a fix ran
    pub before_fix: Option<ReconciliationReport>,
    pub fix: Option<FixOutcome>,
    pub warnings: Vec<String>,
    pub ready: bool,
}

impl CheckReport {
    pub fn new(root: &Path, inspection: Inspection) -> Self {
        let ready = !inspection.has_critical();
        CheckReport {
            project_root: root.to_path_buf(),
            manifest: inspection.manifest,
            lock: inspection.lock,
            extraction: ExtractionSummary {
                files_scanned: inspection.extraction.files_scanned,
                unreadable: inspection.extraction.unreadable,
                packages: inspection.extraction.names,
                references: inspection.extraction.references,
            },
            validation: inspection.validation,
            reconciliation: inspection.report,
            before_fix: None,
            fix: None,
            warnings: inspection.warnings,
            ready,
        }
    }

    /// Source files referencing `name`.
    pub fn files_for(&self, name: &str) -> Vec<&Path> {
        self.extraction
            .references
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.source_file.as_path())
            .collect()
    }
}

/// Runs the pipeline with its collaborators.
pub struct Checker<'a> {
    config: &'a Config,
    validator: RegistryValidator,
    serializer: Box<dyn ManifestSerializer>,
    restorer: Box<dyn LockRestorer>,
    offline: bool,
}

impl<'a> Checker<'a> {
    pub fn new(
        config: &'a Config,
        validator: RegistryValidator,
        serializer: Box<dyn ManifestSerializer>,
        restorer: Box<dyn LockRestorer>,
        offline: bool,
    ) -> Self {
        Checker {
            config,
            validator: validator.offline(offline),
            serializer,
            restorer,
            offline,
        }
    }

    /// Collaborators chosen by configuration.
    pub fn from_config(config: &'a Config, offline: bool) -> Result<Self> {
        let index = HttpIndex::from_config(config)?;
        Ok(Self::new(
            config,
            RegistryValidator::new(Box::new(index)),
            serializer_for(config.serializer()),
            Box::new(RenvRestorer::from_config(config)),
            offline || config.registry.offline,
        ))
    }

    /// Read and reconcile the project without changing anything.
    pub fn inspect(&mut self, options: &CheckOptions) -> Inspection {
        let root = &options.project_root;
        let mut warnings = Vec::new();

        let manifest_load = load_manifest(&root.join(MANIFEST_NAME));
        if let Some(manifest) = &manifest_load.manifest {
            warnings.extend(manifest.warnings.iter().cloned());
        }
        if manifest_load.strategy == Some("text") {
            warnings.push(format!(
                "{} is not valid DCF; dependencies were recovered line by line",
                MANIFEST_NAME
            ));
        }

        let lock_load = load_lockfile(&root.join(LOCKFILE_NAME));
        if lock_load.strategy == Some("lines") {
            warnings.push(format!(
                "{} is not valid JSON; packages were recovered line by line",
                LOCKFILE_NAME
            ));
        }

        let own_name = manifest_load.manifest.as_ref().and_then(|m| m.package.as_deref());
        let extract_options =
            ExtractOptions::for_project(root, self.config, options.strict).excluding(own_name);
        let extraction = extract(&extract_options);
        if !extraction.unreadable.is_empty() {
            warnings.push(format!(
                "{} source files could not be read",
                extraction.unreadable.len()
            ));
        }

        let manifest_names = &manifest_load.outcome.packages;
        let candidates: BTreeSet<String> = extraction.names.union(manifest_names).cloned().collect();
        let validation = self.validator.validate(&candidates);
        if validation.error && !self.offline {
            warnings.push(validation.message.clone());
        }

        let report = reconcile(ReconcileInput {
            extracted: &extraction.names,
            manifest: manifest_names,
            lock: &lock_load.outcome.packages,
            invalid: &validation.invalid,
        });

        for warning in &warnings {
            tracing::debug!("{}", warning);
        }

        Inspection {
            manifest: manifest_load.outcome,
            lock: lock_load.outcome,
            extraction,
            validation,
            report,
            warnings,
            offline: self.offline,
        }
    }

    /// Apply the fix `inspection` calls for, then inspect again.
    pub fn fix(&mut self, options: &CheckOptions, inspection: Inspection) -> CheckReport {
        if !inspection.is_fixable() {
            return CheckReport::new(&options.project_root, inspection);
        }

        let plan = inspection.fix_plan();
        let before = inspection.report.clone();
        let outcome = apply_fix(
            &options.project_root,
            &plan,
            self.serializer.as_ref(),
            self.restorer.as_ref(),
        );

        let mut after = self.inspect(options);
        if let Some(error) = &outcome.manifest_error {
            after.warnings.push(error.clone());
        }
        if let LockStep::Failed(reason) = &outcome.lock {
            after.warnings.push(format!("lock regeneration failed: {}", reason));
        }

        let mut report = CheckReport::new(&options.project_root, after);
        report.before_fix = Some(before);
        report.fix = Some(outcome);
        report
    }

    /// Inspect, fix when requested, and report.
    pub fn run(&mut self, options: &CheckOptions) -> CheckReport {
        let inspection = self.inspect(options);
        if options.fix {
            self.fix(options, inspection)
        } else {
            CheckReport::new(&options.project_root, inspection)
        }
    }
}

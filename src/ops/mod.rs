//! High-level operations.
//!
//! This module contains the implementation of compendium commands.

pub mod check;
pub mod dockerfile;
pub mod extract;
pub mod fix;
pub mod reconcile;
pub mod staleness;
pub mod validate;

pub use check::{CheckOptions, CheckReport, Checker, Inspection};
pub use dockerfile::{generate_dockerfile, BaseImage, BuildDescription, DockerfileOptions, DockerfileResult};
pub use extract::{extract, ExtractOptions, Extraction};
pub use fix::{apply_fix, FixOutcome, FixPlan, LockRestorer, LockStep, RenvRestorer};
pub use reconcile::{reconcile, ReconcileInput, ReconciliationReport};
pub use staleness::{check_root, scan, ProjectStaleness, StalenessStatus};
pub use validate::{RegistryValidator, ValidationOutcome};

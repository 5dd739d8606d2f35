//! Three-way reconciliation of code, DESCRIPTION and renv.lock.
//!
//! Pure set algebra over already-extracted, already-validated name sets:
//!
//! ```text
//! valid_manifest      = manifest \ invalid
//! missing             = (extracted \ invalid) \ valid_manifest
//! invalid_in_manifest = manifest ∩ invalid
//! unused_in_manifest  = valid_manifest \ extracted
//! extra_in_lock       = lock \ manifest
//! ```

use std::collections::BTreeSet;

use serde::Serialize;

/// Inputs to [`reconcile`].
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub extracted: &'a BTreeSet<String>,
    pub manifest: &'a BTreeSet<String>,
    pub lock: &'a BTreeSet<String>,
    /// Names the registry reported as not existing
    pub invalid: &'a BTreeSet<String>,
}

/// Differences between the three sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Used in code, not declared
    pub missing: BTreeSet<String>,
    /// Declared, not used in code (advisory)
    pub unused_in_manifest: BTreeSet<String>,
    /// Declared, not published by the registry
    pub invalid_in_manifest: BTreeSet<String>,
    /// Pinned, not declared (advisory)
    pub extra_in_lock: BTreeSet<String>,
}

impl ReconciliationReport {
    /// Issues that block a READY verdict.
    pub fn has_critical(&self) -> bool {
        !self.missing.is_empty() || !self.invalid_in_manifest.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.unused_in_manifest.is_empty()
            && self.invalid_in_manifest.is_empty()
            && self.extra_in_lock.is_empty()
    }
}

/// Compute the reconciliation report.
pub fn reconcile(input: ReconcileInput<'_>) -> ReconciliationReport {
    let valid_manifest: BTreeSet<String> = input.manifest.difference(input.invalid).cloned().collect();
    let valid_extracted: BTreeSet<String> = input.extracted.difference(input.invalid).cloned().collect();

    ReconciliationReport {
        missing: valid_extracted.difference(&valid_manifest).cloned().collect(),
        unused_in_manifest: valid_manifest.difference(input.extracted).cloned().collect(),
        invalid_in_manifest: input.manifest.intersection(input.invalid).cloned().collect(),
        extra_in_lock: input.lock.difference(input.manifest).cloned().collect(),
    }
}

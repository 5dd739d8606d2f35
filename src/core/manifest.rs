//! DESCRIPTION manifest parsing.
//!
//! The manifest declares a package's direct dependencies in three sections:
//! - Primary: `Imports` and `Depends`
//! - Optional: `Suggests`
//! - BuildTime: `LinkingTo`
//!
//! Parsing goes through an ordered list of strategies sharing one result
//! shape. The structured DCF strategy is tried first; the line-oriented text
//! strategy recovers declarations from files the DCF codec rejects.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::core::dcf::{entry_name, split_entries, DcfDocument};
use crate::core::package::is_base_package;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "DESCRIPTION";

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no DESCRIPTION found in `{}`", dir.display())]
    NotFound { dir: PathBuf },

    #[error("failed to parse `{}`: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Declaration section of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Primary,
    Optional,
    BuildTime,
}

impl Section {
    /// Sections in precedence order: when a name appears in several fields
    /// the earliest section here wins.
    pub const PRECEDENCE: [Section; 3] = [Section::Primary, Section::BuildTime, Section::Optional];

    /// DESCRIPTION fields that make up this section.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Section::Primary => &["Depends", "Imports"],
            Section::Optional => &["Suggests"],
            Section::BuildTime => &["LinkingTo"],
        }
    }

    /// Field new declarations in this section are written to.
    pub fn target_field(&self) -> &'static str {
        match self {
            Section::Primary => "Imports",
            Section::Optional => "Suggests",
            Section::BuildTime => "LinkingTo",
        }
    }

    /// Section owning a DESCRIPTION field, if it is a dependency field.
    pub fn for_field(field: &str) -> Option<Section> {
        Section::PRECEDENCE
            .into_iter()
            .find(|s| s.fields().contains(&field))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Primary => write!(f, "primary"),
            Section::Optional => write!(f, "optional"),
            Section::BuildTime => write!(f, "build-time"),
        }
    }
}

/// All DESCRIPTION fields that declare dependencies.
pub const DEPENDENCY_FIELDS: &[&str] = &["Depends", "Imports", "LinkingTo", "Suggests"];

/// A single declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestDeclaration {
    pub name: String,
    pub section: Section,
}

/// Dependency view of a DESCRIPTION file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// `Package:` field, if present
    pub package: Option<String>,

    /// Declared name -> section
    declarations: BTreeMap<String, Section>,

    /// Non-fatal findings (duplicate declarations)
    pub warnings: Vec<String>,
}

impl Manifest {
    /// Build a manifest from `(field, value)` pairs of dependency fields.
    ///
    /// Version annotations are stripped, base packages dropped, and a name
    /// declared in more than one section is kept in the higher-precedence
    /// one.
    pub fn from_fields<'a>(
        package: Option<String>,
        fields: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Self {
        let mut by_section: BTreeMap<Section, Vec<String>> = BTreeMap::new();
        for (field, value) in fields {
            if let Some(section) = Section::for_field(field) {
                let names = split_entries(&value)
                    .iter()
                    .filter_map(|e| entry_name(e).map(str::to_string))
                    .filter(|n| !is_base_package(n))
                    .collect::<Vec<_>>();
                by_section.entry(section).or_default().extend(names);
            }
        }

        let mut declarations = BTreeMap::new();
        let mut warnings = Vec::new();
        for section in Section::PRECEDENCE {
            for name in by_section.remove(&section).unwrap_or_default() {
                match declarations.get(&name) {
                    None => {
                        declarations.insert(name, section);
                    }
                    Some(existing) if *existing != section => {
                        warnings.push(format!(
                            "`{}` is declared as both {} and {}; treating it as {}",
                            name, existing, section, existing
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        Manifest {
            package,
            declarations,
            warnings,
        }
    }

    /// All declared names.
    pub fn names(&self) -> BTreeSet<String> {
        self.declarations.keys().cloned().collect()
    }

    /// Names declared in one section.
    pub fn names_in(&self, section: Section) -> BTreeSet<String> {
        self.declarations
            .iter()
            .filter(|(_, s)| **s == section)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Section a name is declared in.
    pub fn section_of(&self, name: &str) -> Option<Section> {
        self.declarations.get(name).copied()
    }

    /// Declarations in name order.
    pub fn declarations(&self) -> Vec<ManifestDeclaration> {
        self.declarations
            .iter()
            .map(|(name, section)| ManifestDeclaration {
                name: name.clone(),
                section: *section,
            })
            .collect()
    }
}

/// Uniform result shape shared by every manifest and lock parsing strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
    pub packages: BTreeSet<String>,
    pub error: bool,
    pub message: String,
}

impl ParseOutcome {
    /// Successful parse.
    pub fn ok(packages: BTreeSet<String>, message: impl Into<String>) -> Self {
        ParseOutcome {
            packages,
            error: false,
            message: message.into(),
        }
    }

    /// Failed parse.
    pub fn failed(message: impl Into<String>) -> Self {
        ParseOutcome {
            packages: BTreeSet::new(),
            error: true,
            message: message.into(),
        }
    }
}

/// A manifest parsing strategy.
pub type ManifestStrategy = fn(&str) -> Result<Manifest, String>;

/// Strategies in the order they are tried.
pub const MANIFEST_STRATEGIES: &[(&str, ManifestStrategy)] =
    &[("dcf", parse_structured), ("text", parse_text)];

/// Structured strategy: full DCF parse.
pub fn parse_structured(content: &str) -> Result<Manifest, String> {
    let doc = DcfDocument::parse(content).map_err(|e| e.to_string())?;
    let fields = DEPENDENCY_FIELDS
        .iter()
        .filter_map(|f| doc.get(f).map(|v| (*f, v)));
    Ok(Manifest::from_fields(doc.get("Package"), fields))
}

static FIELD_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9/@._-]*)\s*:(.*)$").expect("valid regex"));

static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]+(\S.*)$").expect("valid regex"));

/// Text strategy: scan for dependency field headers and collect their
/// values, skipping any line that is not understood.
pub fn parse_text(content: &str) -> Result<Manifest, String> {
    let mut package = None;
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in content.lines() {
        if let Some(caps) = FIELD_START_RE.captures(line) {
            current = None;
            let name = &caps[1];
            let value = caps[2].trim().to_string();
            if name == "Package" {
                package = Some(value);
            } else if let Some(field) = DEPENDENCY_FIELDS.iter().find(|f| **f == name) {
                fields.push((*field, value));
                current = Some(fields.len() - 1);
            }
        } else if let Some(caps) = CONTINUATION_RE.captures(line) {
            if let Some(idx) = current {
                let value = &mut fields[idx].1;
                value.push('\n');
                value.push_str(caps[1].trim());
            }
        } else {
            current = None;
        }
    }

    if package.is_none() && fields.is_empty() {
        return Err("no `Package` or dependency fields found".to_string());
    }
    Ok(Manifest::from_fields(package, fields))
}

/// Result of loading a manifest through the strategy list.
#[derive(Debug, Clone)]
pub struct ManifestLoad {
    pub manifest: Option<Manifest>,
    pub outcome: ParseOutcome,
    /// Name of the strategy that succeeded
    pub strategy: Option<&'static str>,
}

/// Load the manifest at `path`, trying each strategy in order.
///
/// Never fails: a missing or unparseable file is reported through
/// `outcome.error`.
pub fn load_manifest(path: &Path) -> ManifestLoad {
    load_manifest_with(path, MANIFEST_STRATEGIES)
}

/// Load with an explicit strategy list.
pub fn load_manifest_with(path: &Path, strategies: &[(&'static str, ManifestStrategy)]) -> ManifestLoad {
    if !path.exists() {
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        return ManifestLoad {
            manifest: None,
            outcome: ParseOutcome::failed(ManifestError::NotFound { dir }.to_string()),
            strategy: None,
        };
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return ManifestLoad {
                manifest: None,
                outcome: ParseOutcome::failed(format!("failed to read `{}`: {}", path.display(), e)),
                strategy: None,
            }
        }
    };

    let mut failures = Vec::new();
    for (name, strategy) in strategies {
        match strategy(&content) {
            Ok(manifest) => {
                if !failures.is_empty() {
                    tracing::debug!(
                        "{} parsed with `{}` strategy after: {}",
                        path.display(),
                        name,
                        failures.join("; ")
                    );
                }
                let outcome = ParseOutcome::ok(
                    manifest.names(),
                    format!("{} declares {} packages", MANIFEST_NAME, manifest.names().len()),
                );
                return ManifestLoad {
                    manifest: Some(manifest),
                    outcome,
                    strategy: Some(*name),
                };
            }
            Err(message) => {
                tracing::debug!("`{}` strategy rejected {}: {}", name, path.display(), message);
                failures.push(format!("{}: {}", name, message));
            }
        }
    }

    let err = ManifestError::Parse {
        path: path.to_path_buf(),
        message: failures.join("; "),
    };
    ManifestLoad {
        manifest: None,
        outcome: ParseOutcome::failed(err.to_string()),
        strategy: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DESCRIPTION: &str = "Package: demo
Title: Demo Compendium
Version: 0.1.0
Depends: R (>= 4.1.0)
Imports:
    dplyr (>= 1.1.0),
    ggplot2,
    stats
Suggests:
    testthat (>= 3.0.0),
    knitr
LinkingTo: Rcpp
";

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_structured_sections() {
        let manifest = parse_structured(DESCRIPTION).unwrap();
        assert_eq!(manifest.package.as_deref(), Some("demo"));
        assert_eq!(manifest.names_in(Section::Primary), set(&["dplyr", "ggplot2"]));
        assert_eq!(manifest.names_in(Section::Optional), set(&["knitr", "testthat"]));
        assert_eq!(manifest.names_in(Section::BuildTime), set(&["Rcpp"]));
        // R and base packages are never declarations
        assert!(manifest.section_of("R").is_none());
        assert!(manifest.section_of("stats").is_none());
    }

    #[test]
    fn test_text_matches_structured() {
        let structured = parse_structured(DESCRIPTION).unwrap();
        let text = parse_text(DESCRIPTION).unwrap();
        assert_eq!(structured.names(), text.names());
        assert_eq!(structured.declarations(), text.declarations());
    }

    #[test]
    fn test_text_recovers_from_malformed_file() {
        let broken = "Package: demo\nthis line breaks DCF\nImports: dplyr, tidyr\n";
        assert!(parse_structured(broken).is_err());
        let manifest = parse_text(broken).unwrap();
        assert_eq!(manifest.names(), set(&["dplyr", "tidyr"]));
    }

    #[test]
    fn test_duplicate_declaration_keeps_primary() {
        let manifest = parse_structured("Package: demo\nImports: dplyr\nSuggests: dplyr, knitr\n").unwrap();
        assert_eq!(manifest.section_of("dplyr"), Some(Section::Primary));
        assert_eq!(manifest.section_of("knitr"), Some(Section::Optional));
        assert_eq!(manifest.warnings.len(), 1);
    }

    #[test]
    fn test_load_missing_manifest_is_reported() {
        let tmp = TempDir::new().unwrap();
        let load = load_manifest(&tmp.path().join(MANIFEST_NAME));
        assert!(load.manifest.is_none());
        assert!(load.outcome.error);
        assert!(load.outcome.message.contains("no DESCRIPTION found"));
    }

    #[test]
    fn test_load_falls_back_to_text_strategy() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MANIFEST_NAME);
        std::fs::write(&path, "Package: demo\n!! stray\nImports: sf\n").unwrap();

        let load = load_manifest(&path);
        assert_eq!(load.strategy, Some("text"));
        assert!(!load.outcome.error);
        assert_eq!(load.outcome.packages, set(&["sf"]));
    }

    #[test]
    fn test_load_reports_when_every_strategy_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MANIFEST_NAME);
        std::fs::write(&path, "just some prose\nwith nothing in it\n").unwrap();

        let load = load_manifest(&path);
        assert!(load.outcome.error);
        assert!(load.outcome.message.contains("failed to parse"));
    }

    #[test]
    fn test_section_fields() {
        assert_eq!(Section::for_field("Imports"), Some(Section::Primary));
        assert_eq!(Section::for_field("Depends"), Some(Section::Primary));
        assert_eq!(Section::for_field("Suggests"), Some(Section::Optional));
        assert_eq!(Section::for_field("LinkingTo"), Some(Section::BuildTime));
        assert_eq!(Section::for_field("License"), None);
    }
}

//! Version stamps embedded in generated artifacts.
//!
//! A stamp is a single comment line near the top of a file:
//!
//! ```text
//! # compendium Dockerfile v0.3.1
//! ```
//!
//! It is the only contract other tools rely on to tell whether a file they
//! do not own was produced by an older generator. Early releases wrote a bare
//! integer (`v3`), which reads as `0.0.3`.

use std::path::Path;

use anyhow::Result;
use regex::Regex;
use semver::Version;
use thiserror::Error;

use crate::util::fs;

/// Tool name written into every stamp.
pub const OWNER_TOOL: &str = "compendium";

/// How many leading lines are searched for a stamp.
pub const STAMP_SCAN_LINES: usize = 20;

/// Errors in stamp handling.
#[derive(Debug, Error)]
pub enum StampError {
    #[error("invalid stamp version `{0}`: expected MAJOR.MINOR.PATCH or a legacy integer")]
    InvalidVersion(String),

    #[error("unknown artifact `{0}`")]
    UnknownArtifact(String),
}

/// A generated file tracked by the staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    /// Name written in the stamp
    pub id: &'static str,
    /// Path relative to the project root
    pub path: &'static str,
}

/// Every artifact the staleness check looks at.
pub const TRACKED_ARTIFACTS: &[Artifact] = &[
    Artifact { id: "Dockerfile", path: "Dockerfile" },
    Artifact { id: "Makefile", path: "Makefile" },
    Artifact { id: ".Rprofile", path: ".Rprofile" },
    Artifact { id: "docker-compose.yml", path: "docker-compose.yml" },
    Artifact { id: "workflow", path: ".github/workflows/r-package.yml" },
];

/// Look up a tracked artifact by stamp id or relative path.
pub fn artifact(name: &str) -> Result<Artifact, StampError> {
    TRACKED_ARTIFACTS
        .iter()
        .find(|a| a.id == name || a.path == name)
        .copied()
        .ok_or_else(|| StampError::UnknownArtifact(name.to_string()))
}

/// Version of this generator.
pub fn generator_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Parse a user-supplied stamp version (`1.2.3`, `v1.2.3`, or legacy `3`).
pub fn parse_version(text: &str) -> Result<Version, StampError> {
    let trimmed = text.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(trimmed) {
        return Ok(v);
    }
    trimmed
        .parse::<u64>()
        .map(|n| Version::new(0, 0, n))
        .map_err(|_| StampError::InvalidVersion(text.to_string()))
}

/// A stamp for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStamp {
    pub artifact_id: String,
    pub owner_tool: String,
    pub version: Version,
}

impl VersionStamp {
    /// Stamp owned by this tool.
    pub fn new(artifact_id: impl Into<String>, version: Version) -> Self {
        VersionStamp {
            artifact_id: artifact_id.into(),
            owner_tool: OWNER_TOOL.to_string(),
            version,
        }
    }

    /// The marker line.
    pub fn marker(&self) -> String {
        format!("# {} {} v{}", self.owner_tool, self.artifact_id, self.version)
    }

    fn pattern(owner_tool: &str, artifact_id: &str) -> Regex {
        let source = format!(
            r"^#\s*{}\s+{}\s+v(?:(\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.+-]+)?)|(\d+))\s*$",
            regex::escape(owner_tool),
            regex::escape(artifact_id)
        );
        Regex::new(&source).expect("escaped stamp pattern is valid")
    }

    /// Find the stamp for `artifact_id` in the first lines of a file.
    pub fn read(lines: &[String], artifact_id: &str) -> Option<Self> {
        let re = Self::pattern(OWNER_TOOL, artifact_id);
        lines.iter().take(STAMP_SCAN_LINES).find_map(|line| {
            let caps = re.captures(line.trim_end())?;
            let version = match (caps.get(1), caps.get(2)) {
                (Some(full), _) => Version::parse(full.as_str()).ok()?,
                (None, Some(legacy)) => Version::new(0, 0, legacy.as_str().parse().ok()?),
                (None, None) => return None,
            };
            Some(VersionStamp::new(artifact_id, version))
        })
    }

    /// Insert this stamp into `content`, replacing an existing stamp for the
    /// same artifact. A shebang or Docker parser directive stays on line 1.
    pub fn apply(&self, content: &str) -> String {
        let re = Self::pattern(&self.owner_tool, &self.artifact_id);
        let mut lines: Vec<&str> = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if idx < STAMP_SCAN_LINES && re.is_match(line.trim_end()) {
                continue;
            }
            lines.push(line);
        }

        let keep_first = lines.first().is_some_and(|first| {
            first.starts_with("#!") || first.to_lowercase().starts_with("# syntax=")
        });
        let marker = self.marker();
        let at = if keep_first { 1 } else { 0 };
        lines.insert(at, &marker);

        let mut out = lines.join("\n");
        if content.ends_with('\n') || content.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Stamp a file on disk in place.
pub fn stamp_file(path: &Path, stamp: &VersionStamp) -> Result<()> {
    let content = fs::read_to_string(path)?;
    fs::atomic_write(path, &stamp.apply(&content))?;
    tracing::debug!("stamped {} with `{}`", path.display(), stamp.marker());
    Ok(())
}

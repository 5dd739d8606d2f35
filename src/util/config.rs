//! Configuration file support for compendium.
//!
//! Two configuration file locations are read:
//! - Global: `~/.compendium/config.toml` - User-wide defaults
//! - Project: `.compendium/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Once loaded the
//! [`Config`] is never mutated; every operation receives it by reference.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default CRAN mirror used for registry validation.
pub const DEFAULT_REGISTRY_URL: &str = "https://cloud.r-project.org";

/// Default registry timeout in seconds.
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding `registry.url`.
pub const REGISTRY_URL_ENV: &str = "COMPENDIUM_REGISTRY_URL";

const DEFAULT_SCAN_DIRS: &[&str] = &["R", "scripts", "analysis"];
const DEFAULT_STRICT_DIRS: &[&str] = &["tests", "vignettes", "inst", "data-raw"];
const DEFAULT_EXTENSIONS: &[&str] = &["R", "r", "Rmd", "rmd", "qmd", "Rnw"];
const DEFAULT_RESTORE_COMMAND: &[&str] = &["Rscript", "-e", "renv::snapshot(prompt = FALSE)"];

/// compendium configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source scanning settings
    pub scan: ScanConfig,

    /// Package repository settings
    pub registry: RegistryConfig,

    /// DESCRIPTION handling
    pub manifest: ManifestConfig,

    /// renv.lock handling
    pub lock: LockConfig,

    /// Dockerfile generation
    pub docker: DockerConfig,

    /// Extra R package -> apt package mappings
    pub sysdeps: BTreeMap<String, Vec<String>>,
}

/// Which directories and file types the reference extractor reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories scanned by default
    pub dirs: Option<Vec<String>>,

    /// Additional directories scanned in strict mode
    pub strict_dirs: Option<Vec<String>>,

    /// File extensions treated as R sources
    pub extensions: Option<Vec<String>>,
}

/// Package repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Repository base URL (CRAN layout)
    pub url: Option<String>,

    /// Additional repositories whose indexes are unioned in
    #[serde(default)]
    pub extra_urls: Vec<String>,

    /// Index download timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Never touch the network
    #[serde(default)]
    pub offline: bool,
}

/// Strategy used when rewriting DESCRIPTION.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Structured DCF re-serialization
    #[default]
    Dcf,
    /// Line-span replacement
    Line,
}

impl FromStr for SerializerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dcf" => Ok(SerializerKind::Dcf),
            "line" => Ok(SerializerKind::Line),
            _ => Err(format!(
                "invalid manifest serializer '{}'; expected 'dcf' or 'line'",
                s
            )),
        }
    }
}

/// DESCRIPTION handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Serializer used by the auto-fix path
    pub serializer: Option<SerializerKind>,
}

/// renv.lock handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Command that (re)writes renv.lock, run from the project root
    pub restore_command: Option<Vec<String>>,
}

/// Dockerfile generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Base image, e.g. `rocker/verse:4.4.1`
    pub base_image: Option<String>,

    /// Install a LaTeX distribution when the base image lacks one
    pub latex: bool,

    /// Working directory inside the image
    pub workdir: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            base_image: None,
            latex: true,
            workdir: None,
        }
    }
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.scan.dirs.is_some() {
            self.scan.dirs = other.scan.dirs;
        }
        if other.scan.strict_dirs.is_some() {
            self.scan.strict_dirs = other.scan.strict_dirs;
        }
        if other.scan.extensions.is_some() {
            self.scan.extensions = other.scan.extensions;
        }

        if other.registry.url.is_some() {
            self.registry.url = other.registry.url;
        }
        if !other.registry.extra_urls.is_empty() {
            self.registry.extra_urls = other.registry.extra_urls;
        }
        if other.registry.timeout_secs.is_some() {
            self.registry.timeout_secs = other.registry.timeout_secs;
        }
        if other.registry.offline {
            self.registry.offline = true;
        }

        if other.manifest.serializer.is_some() {
            self.manifest.serializer = other.manifest.serializer;
        }

        if other.lock.restore_command.is_some() {
            self.lock.restore_command = other.lock.restore_command;
        }

        if other.docker.base_image.is_some() {
            self.docker.base_image = other.docker.base_image;
        }
        if !other.docker.latex {
            self.docker.latex = false;
        }
        if other.docker.workdir.is_some() {
            self.docker.workdir = other.docker.workdir;
        }

        // Per-package mappings merge key by key
        self.sysdeps.extend(other.sysdeps);
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(REGISTRY_URL_ENV) {
            if !url.trim().is_empty() {
                self.registry.url = Some(url);
            }
        }
        self
    }

    /// Check values that cannot be checked by deserialization alone.
    pub fn validate(&self) -> Result<()> {
        for url in std::iter::once(self.registry_url()).chain(self.registry.extra_urls.iter().cloned()) {
            let parsed = Url::parse(&url)
                .with_context(|| format!("invalid registry url `{}`", url))?;
            if !matches!(parsed.scheme(), "http" | "https" | "file") {
                bail!("unsupported registry url scheme `{}` in `{}`", parsed.scheme(), url);
            }
        }
        if self.registry.timeout_secs == Some(0) {
            bail!("registry.timeout_secs must be greater than zero");
        }
        if let Some(cmd) = &self.lock.restore_command {
            if cmd.is_empty() {
                bail!("lock.restore_command must not be empty");
            }
        }
        Ok(())
    }

    /// Directories scanned by default.
    pub fn scan_dirs(&self) -> Vec<String> {
        self.scan
            .dirs
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_SCAN_DIRS))
    }

    /// Directories added by strict mode.
    pub fn strict_dirs(&self) -> Vec<String> {
        self.scan
            .strict_dirs
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_STRICT_DIRS))
    }

    /// File extensions treated as R sources.
    pub fn extensions(&self) -> Vec<String> {
        self.scan
            .extensions
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_EXTENSIONS))
    }

    /// Primary repository URL.
    pub fn registry_url(&self) -> String {
        self.registry
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
    }

    /// Index download timeout.
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(
            self.registry
                .timeout_secs
                .unwrap_or(DEFAULT_REGISTRY_TIMEOUT_SECS),
        )
    }

    /// Serializer used for DESCRIPTION rewrites.
    pub fn serializer(&self) -> SerializerKind {
        self.manifest.serializer.unwrap_or_default()
    }

    /// Command that regenerates renv.lock.
    pub fn restore_command(&self) -> Vec<String> {
        self.lock
            .restore_command
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_RESTORE_COMMAND))
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Environment (`COMPENDIUM_REGISTRY_URL`)
/// 2. Project config (.compendium/config.toml)
/// 3. Global config (~/.compendium/config.toml)
/// 4. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config.with_env_overrides()
}

/// Get the global compendium config directory (~/.compendium).
pub fn global_config_dir() -> Option<std::path::PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".compendium"))
}

/// Get the project config path (.compendium/config.toml).
pub fn project_config_path(project_root: &Path) -> std::path::PathBuf {
    project_root.join(".compendium").join("config.toml")
}

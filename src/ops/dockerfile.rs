//! Dockerfile generation.
//!
//! The Dockerfile is derived entirely from the project's current state and
//! always overwritten in full:
//!
//! ```text
//! # compendium Dockerfile v0.1.0
//! FROM rocker/r-ver:4.4.1
//! RUN apt-get update && apt-get install -y --no-install-recommends \
//!     libxml2-dev \
//!     && rm -rf /var/lib/apt/lists/*
//! ...
//! ```
//!
//! Auxiliary tools (pandoc, LaTeX) are installed only when the chosen rocker
//! image does not already ship them.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use semver::Version;
use serde::Serialize;

use crate::core::lockfile::{load_lockfile, Lockfile, LOCKFILE_NAME};
use crate::core::manifest::{load_manifest, MANIFEST_NAME};
use crate::core::stamp::VersionStamp;
use crate::core::sysdeps::SystemDependencyMapping;
use crate::util::{fs, Config};

/// Stamp id and default file name.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Working directory used when none is configured.
pub const DEFAULT_WORKDIR: &str = "/project";

/// What a base image already provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub pandoc: bool,
    pub latex: bool,
    /// OS packages preinstalled in the image
    pub os_packages: &'static [&'static str],
}

const TIDYVERSE_LIBS: &[&str] = &[
    "libcurl4-openssl-dev",
    "libfontconfig1-dev",
    "libfreetype6-dev",
    "libfribidi-dev",
    "libharfbuzz-dev",
    "libpng-dev",
    "libssl-dev",
    "libtiff5-dev",
    "libxml2-dev",
];

const GEOSPATIAL_LIBS: &[&str] = &[
    "libcurl4-openssl-dev",
    "libfontconfig1-dev",
    "libfreetype6-dev",
    "libfribidi-dev",
    "libgdal-dev",
    "libgeos-dev",
    "libharfbuzz-dev",
    "libpng-dev",
    "libproj-dev",
    "libssl-dev",
    "libtiff5-dev",
    "libudunits2-dev",
    "libxml2-dev",
];

/// Capability table of the rocker image family.
const ROCKER_CAPABILITIES: &[(&str, Capabilities)] = &[
    ("r-ver", Capabilities { pandoc: false, latex: false, os_packages: &[] }),
    ("rstudio", Capabilities { pandoc: true, latex: false, os_packages: &[] }),
    ("tidyverse", Capabilities { pandoc: true, latex: false, os_packages: TIDYVERSE_LIBS }),
    ("verse", Capabilities { pandoc: true, latex: true, os_packages: TIDYVERSE_LIBS }),
    ("geospatial", Capabilities { pandoc: true, latex: true, os_packages: GEOSPATIAL_LIBS }),
];

/// A container base image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseImage {
    /// Full reference, e.g. `rocker/verse:4.4.1`
    pub reference: String,
}

impl BaseImage {
    pub fn new(reference: impl Into<String>) -> Self {
        BaseImage {
            reference: reference.into(),
        }
    }

    /// `rocker/r-ver:<r_version>`, or `:latest` when the version is unknown.
    pub fn r_ver(r_version: Option<&str>) -> Self {
        Self::new(format!("rocker/r-ver:{}", r_version.unwrap_or("latest")))
    }

    /// Pick the image: explicit choice, else the lock's R version, else latest.
    pub fn select(explicit: Option<&str>, lock: Option<&Lockfile>) -> Self {
        match explicit {
            Some(image) => Self::new(image),
            None => Self::r_ver(lock.and_then(|l| l.r_version.as_deref())),
        }
    }

    /// Rocker flavor (`verse` in `docker.io/rocker/verse:4.4`), if this is a
    /// rocker image.
    pub fn rocker_flavor(&self) -> Option<&str> {
        let without_tag = match self.reference.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => name,
            _ => self.reference.as_str(),
        };
        let without_digest = without_tag.split('@').next().unwrap_or(without_tag);
        let mut parts = without_digest.rsplit('/');
        let flavor = parts.next()?;
        (parts.next()? == "rocker").then_some(flavor)
    }

    /// What this image provides. Unknown images provide nothing.
    pub fn capabilities(&self) -> Capabilities {
        self.rocker_flavor()
            .and_then(|flavor| {
                ROCKER_CAPABILITIES
                    .iter()
                    .find(|(name, _)| *name == flavor)
                    .map(|(_, caps)| *caps)
            })
            .unwrap_or_default()
    }
}

/// Everything needed to render a Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildDescription {
    pub base_image: BaseImage,
    /// OS packages to install, already filtered against the image
    pub os_deps: BTreeSet<String>,
    pub install_pandoc: bool,
    pub install_latex: bool,
    /// Repository renv is installed from
    pub repository: String,
    pub workdir: String,
}

impl BuildDescription {
    /// Assemble the description for an image and a set of R packages.
    pub fn assemble(
        base_image: BaseImage,
        packages: &BTreeSet<String>,
        mapping: &SystemDependencyMapping,
        config: &Config,
    ) -> Self {
        let caps = base_image.capabilities();
        let os_deps = mapping
            .resolve(packages)
            .into_iter()
            .filter(|p| !caps.os_packages.contains(&p.as_str()))
            .collect();

        BuildDescription {
            os_deps,
            install_pandoc: !caps.pandoc,
            install_latex: !caps.latex && config.docker.latex,
            repository: config.registry_url(),
            workdir: config
                .docker
                .workdir
                .clone()
                .unwrap_or_else(|| DEFAULT_WORKDIR.to_string()),
            base_image,
        }
    }

    /// Render the Dockerfile text, stamped with `version`.
    pub fn render(&self, version: &Version) -> String {
        let mut out = String::new();
        let stamp = VersionStamp::new(DOCKERFILE_NAME, version.clone());
        let _ = writeln!(out, "{}", stamp.marker());
        let _ = writeln!(out, "FROM {}", self.base_image.reference);
        out.push('\n');

        if self.os_deps.is_empty() {
            out.push_str("# No system dependencies required\n");
        } else {
            out.push_str("RUN apt-get update && apt-get install -y --no-install-recommends \\\n");
            for dep in &self.os_deps {
                let _ = writeln!(out, "    {} \\", dep);
            }
            out.push_str("    && rm -rf /var/lib/apt/lists/*\n");
        }

        if self.install_pandoc {
            out.push('\n');
            out.push_str(
                "RUN apt-get update && apt-get install -y --no-install-recommends pandoc \\\n    && rm -rf /var/lib/apt/lists/*\n",
            );
        }

        if self.install_latex {
            out.push('\n');
            let _ = writeln!(
                out,
                "RUN R -e \"install.packages('tinytex', repos = '{}')\" \\\n    && R -e \"tinytex::install_tinytex()\"",
                self.repository
            );
        }

        out.push('\n');
        let _ = writeln!(
            out,
            "RUN R -e \"install.packages('renv', repos = '{}')\"",
            self.repository
        );

        // renv treats the working directory as the project, so restore inside it
        out.push('\n');
        let _ = writeln!(out, "WORKDIR {}", self.workdir);
        let _ = writeln!(out, "COPY {} {}", LOCKFILE_NAME, LOCKFILE_NAME);
        out.push_str("RUN R -e \"renv::restore()\"\n");
        out.push_str("COPY . .\n");
        out
    }
}

/// Options for [`generate_dockerfile`].
#[derive(Debug, Clone)]
pub struct DockerfileOptions {
    pub project_root: PathBuf,
    /// Overrides `docker.base_image`
    pub base_image: Option<String>,
    /// Output path; `None` means `<root>/Dockerfile`
    pub output: Option<PathBuf>,
    /// Render only, do not write
    pub dry_run: bool,
    pub version: Version,
}

/// Result of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct DockerfileResult {
    pub description: BuildDescription,
    pub content: String,
    /// Where the file was written, if it was
    pub path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// R packages the image must provide: declared and pinned names.
pub fn project_packages(project_root: &Path) -> (BTreeSet<String>, Option<Lockfile>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut packages = BTreeSet::new();

    let manifest = load_manifest(&project_root.join(MANIFEST_NAME));
    if manifest.outcome.error {
        warnings.push(manifest.outcome.message.clone());
    }
    packages.extend(manifest.outcome.packages);

    let lock = load_lockfile(&project_root.join(LOCKFILE_NAME));
    if lock.outcome.error {
        warnings.push(lock.outcome.message.clone());
    }
    packages.extend(lock.outcome.packages);

    (packages, lock.lockfile, warnings)
}

/// Build the description for a project and write the Dockerfile.
pub fn generate_dockerfile(options: &DockerfileOptions, config: &Config) -> Result<DockerfileResult> {
    let (packages, lock, warnings) = project_packages(&options.project_root);
    for warning in &warnings {
        tracing::debug!("{}", warning);
    }

    let explicit = options
        .base_image
        .as_deref()
        .or(config.docker.base_image.as_deref());
    let base_image = BaseImage::select(explicit, lock.as_ref());
    let mapping = SystemDependencyMapping::from_config(config);
    let description = BuildDescription::assemble(base_image, &packages, &mapping, config);
    let content = description.render(&options.version);

    let path = if options.dry_run {
        None
    } else {
        let path = options
            .output
            .clone()
            .unwrap_or_else(|| options.project_root.join(DOCKERFILE_NAME));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::ensure_dir(parent)?;
        }
        fs::atomic_write(&path, &content)?;
        tracing::debug!("wrote {}", path.display());
        Some(path)
    };

    Ok(DockerfileResult {
        description,
        content,
        path,
        warnings,
    })
}

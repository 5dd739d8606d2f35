//! Repository package indexes.
//!
//! A CRAN-like repository publishes its package list as a DCF file at
//! `<url>/src/contrib/PACKAGES`, one record per package. Only the `Package`
//! field is read.
//!
//! ```text
//! Package: dplyr
//! Version: 1.1.4
//! Depends: R (>= 3.5.0)
//!
//! Package: ggplot2
//! Version: 3.5.1
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use url::Url;

use crate::core::dcf::DcfDocument;
use crate::util::Config;

/// Path of the package index below a repository URL.
pub const INDEX_PATH: &str = "src/contrib/PACKAGES";

/// A source of published package names.
pub trait RegistryIndex {
    /// Human-readable description for messages.
    fn describe(&self) -> String;

    /// Download (or otherwise produce) the full set of published names.
    fn fetch_names(&self) -> Result<BTreeSet<String>>;
}

/// Index served over HTTP(S) or read from a `file://` mirror.
#[derive(Debug, Clone)]
pub struct HttpIndex {
    urls: Vec<Url>,
    timeout: Duration,
}

impl HttpIndex {
    /// Index for a list of repository base URLs. The published set is the
    /// union over all of them.
    pub fn new(urls: Vec<Url>, timeout: Duration) -> Self {
        HttpIndex { urls, timeout }
    }

    /// Index for the primary and extra repositories in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let urls = std::iter::once(config.registry_url())
            .chain(config.registry.extra_urls.iter().cloned())
            .map(|u| Url::parse(&u).with_context(|| format!("invalid registry url `{}`", u)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(urls, config.registry_timeout()))
    }

    /// URL of the package index for one repository.
    pub fn index_url(base: &Url) -> Result<Url> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(INDEX_PATH)
            .with_context(|| format!("cannot build index url from `{}`", base))
    }

    fn fetch_one(&self, client: &reqwest::blocking::Client, base: &Url) -> Result<String> {
        let index = Self::index_url(base)?;

        if index.scheme() == "file" {
            let path = index
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("invalid file url `{}`", index))?;
            return std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read package index {}", path.display()));
        }

        tracing::debug!("fetching package index from {}", index);
        let response = client
            .get(index.as_str())
            .send()
            .with_context(|| format!("failed to download package index from {}", index))?;

        if !response.status().is_success() {
            bail!(
                "failed to download package index from {}: HTTP {}",
                index,
                response.status()
            );
        }

        response
            .text()
            .with_context(|| format!("failed to read package index from {}", index))
    }
}

impl RegistryIndex for HttpIndex {
    fn describe(&self) -> String {
        self.urls
            .iter()
            .map(Url::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn fetch_names(&self) -> Result<BTreeSet<String>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("compendium/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let mut names = BTreeSet::new();
        for base in &self.urls {
            let body = self.fetch_one(&client, base)?;
            let found = parse_index(&body);
            tracing::debug!("{} publishes {} packages", base, found.len());
            names.extend(found);
        }
        Ok(names)
    }
}

/// Fixed in-memory index.
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    names: BTreeSet<String>,
}

impl StaticIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticIndex {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl RegistryIndex for StaticIndex {
    fn describe(&self) -> String {
        format!("static index ({} packages)", self.names.len())
    }

    fn fetch_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.names.clone())
    }
}

static PACKAGE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Package:\s*([A-Za-z0-9._]+)\s*$").expect("valid regex"));

/// Names published in a PACKAGES document.
///
/// Mirrors occasionally serve records the DCF codec rejects; those fall
/// back to a plain `Package:` line scan.
pub fn parse_index(body: &str) -> BTreeSet<String> {
    match DcfDocument::parse(body) {
        Ok(doc) => doc.get_all("Package").collect(),
        Err(e) => {
            tracing::debug!("package index is not clean DCF ({}); scanning lines", e);
            PACKAGE_LINE_RE
                .captures_iter(body)
                .map(|c| c[1].to_string())
                .collect()
        }
    }
}

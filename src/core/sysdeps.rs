//! R package -> system (apt) build dependency table.
//!
//! The table is configuration, not state: it is built once from the
//! built-in entries plus the `[sysdeps]` config section and read-only after.

use std::collections::{BTreeMap, BTreeSet};

use crate::util::Config;

/// Built-in mapping for CRAN packages with native build requirements.
const BUILTIN: &[(&str, &[&str])] = &[
    ("Cairo", &["libcairo2-dev", "libxt-dev"]),
    ("RMariaDB", &["libmariadb-dev"]),
    ("RPostgres", &["libpq-dev"]),
    ("Rmpfr", &["libmpfr-dev"]),
    ("V8", &["libnode-dev"]),
    ("curl", &["libcurl4-openssl-dev"]),
    ("fftw", &["libfftw3-dev"]),
    ("gert", &["libgit2-dev"]),
    ("git2r", &["libgit2-dev"]),
    ("gmp", &["libgmp-dev"]),
    ("gsl", &["libgsl-dev"]),
    ("httr", &["libcurl4-openssl-dev", "libssl-dev"]),
    ("httr2", &["libcurl4-openssl-dev", "libssl-dev"]),
    ("igraph", &["libglpk-dev", "libxml2-dev"]),
    ("jpeg", &["libjpeg-dev"]),
    ("magick", &["libmagick++-dev"]),
    ("odbc", &["unixodbc-dev"]),
    ("openssl", &["libssl-dev"]),
    ("pdftools", &["libpoppler-cpp-dev"]),
    ("png", &["libpng-dev"]),
    ("protolite", &["libprotobuf-dev", "protobuf-compiler"]),
    ("rJava", &["default-jdk"]),
    ("ragg", &["libfreetype6-dev", "libpng-dev", "libtiff5-dev"]),
    ("redux", &["libhiredis-dev"]),
    ("rgdal", &["libgdal-dev", "libproj-dev"]),
    ("rsvg", &["librsvg2-dev"]),
    ("sf", &["libgdal-dev", "libgeos-dev", "libproj-dev", "libudunits2-dev"]),
    ("sodium", &["libsodium-dev"]),
    ("systemfonts", &["libfontconfig1-dev", "libfreetype6-dev"]),
    ("terra", &["libgdal-dev", "libgeos-dev", "libproj-dev"]),
    ("tesseract", &["libtesseract-dev", "libleptonica-dev"]),
    ("textshaping", &["libfribidi-dev", "libharfbuzz-dev"]),
    ("units", &["libudunits2-dev"]),
    ("xml2", &["libxml2-dev"]),
];

/// Lookup table from R package name to OS package names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemDependencyMapping {
    table: BTreeMap<String, Vec<String>>,
}

impl SystemDependencyMapping {
    /// Empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN
                .iter()
                .map(|(name, pkgs)| (name.to_string(), pkgs.iter().map(|p| p.to_string()).collect())),
        )
    }

    /// Table from explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        SystemDependencyMapping {
            table: entries.into_iter().collect(),
        }
    }

    /// Built-in table with the `[sysdeps]` config section layered on top.
    /// A configured entry replaces the built-in one for the same package.
    pub fn from_config(config: &Config) -> Self {
        let mut mapping = Self::builtin();
        mapping
            .table
            .extend(config.sysdeps.iter().map(|(k, v)| (k.clone(), v.clone())));
        mapping
    }

    /// OS packages for one R package.
    pub fn get(&self, name: &str) -> &[String] {
        self.table.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of R packages in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Union of OS packages for `names`, deduplicated and sorted.
    pub fn resolve<I, S>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .flat_map(|n| self.get(n.as_ref()).to_vec())
            .collect()
    }
}

//! R package names and the packages that ship with R itself.

use std::sync::LazyLock;

use regex::Regex;

/// Packages distributed with every R installation.
///
/// These are never declared in DESCRIPTION and never recorded as
/// dependencies in renv.lock.
pub const BASE_PACKAGES: &[&str] = &[
    "R",
    "base",
    "compiler",
    "datasets",
    "grDevices",
    "graphics",
    "grid",
    "methods",
    "parallel",
    "splines",
    "stats",
    "stats4",
    "tcltk",
    "tools",
    "translations",
    "utils",
];

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._]*$").expect("valid regex"));

/// Check whether `name` ships with R.
pub fn is_base_package(name: &str) -> bool {
    BASE_PACKAGES.contains(&name)
}

/// Check whether `name` follows the package name grammar:
/// a letter followed by letters, digits, `.` or `_`.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

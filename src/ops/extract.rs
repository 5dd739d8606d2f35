//! Reference extraction from R sources.
//!
//! Finds package names a project's code refers to, either by loading them
//! (`library(x)`, `require(x)`, `requireNamespace("x")`, `loadNamespace("x")`,
//! `pacman::p_load(x, y)`) or by namespace access (`x::f`, `x:::f`).
//!
//! Extraction is textual. Comments are stripped first; in literate formats
//! (R Markdown, Quarto, Sweave) only code chunks and inline code are read.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::core::package::{is_base_package, is_valid_name};
use crate::util::fs::relative_path;
use crate::util::Config;

/// Tokens that show up in documentation and templates, never real packages.
pub const PLACEHOLDER_NAMES: &[&str] = &[
    "package",
    "pkg",
    "example",
    "foo",
    "bar",
    "mypackage",
    "yourpackage",
    "name",
    "something",
    "xxx",
];

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["renv", "packrat", "node_modules"];

/// A name found in one source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DependencyReference {
    pub name: String,
    /// Path relative to the project root
    pub source_file: PathBuf,
}

/// Options for [`extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Project root, used for relative paths
    pub root: PathBuf,

    /// Directories (walked recursively) and files to scan
    pub targets: Vec<PathBuf>,

    /// File extensions treated as R sources
    pub extensions: Vec<String>,

    /// Names never reported (the project's own package)
    pub exclude: BTreeSet<String>,
}

impl ExtractOptions {
    /// Scan targets for a project: the configured directories that exist plus
    /// R sources at the top level of the root. `strict` adds the wider set.
    pub fn for_project(root: &Path, config: &Config, strict: bool) -> Self {
        let extensions = config.extensions();

        let mut dirs = config.scan_dirs();
        if strict {
            dirs.extend(config.strict_dirs());
        }

        let mut targets: Vec<PathBuf> = dirs
            .iter()
            .map(|d| root.join(d))
            .filter(|p| p.is_dir())
            .collect();

        if let Ok(read_dir) = std::fs::read_dir(root) {
            let mut top_level: Vec<PathBuf> = read_dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_extension(p, &extensions))
                .collect();
            top_level.sort();
            targets.extend(top_level);
        }

        ExtractOptions {
            root: root.to_path_buf(),
            targets,
            extensions,
            exclude: BTreeSet::new(),
        }
    }

    /// Exclude the project's own package name.
    pub fn excluding(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.exclude.insert(name.to_string());
        }
        self
    }
}

/// Result of an extraction run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// Accepted names, sorted and deduplicated
    pub names: BTreeSet<String>,

    /// Every (name, file) pair
    pub references: Vec<DependencyReference>,

    /// Number of files read
    pub files_scanned: usize,

    /// Files that could not be read
    pub unreadable: Vec<PathBuf>,
}

impl Extraction {
    /// Files referencing `name`.
    pub fn files_for(&self, name: &str) -> Vec<&Path> {
        self.references
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.source_file.as_path())
            .collect()
    }
}

/// Scan every target and collect referenced package names.
///
/// Never fails; unreadable files are counted in [`Extraction::unreadable`].
pub fn extract(options: &ExtractOptions) -> Extraction {
    let mut extraction = Extraction::default();
    let mut seen = BTreeSet::new();

    for file in source_files(&options.targets, &options.extensions) {
        // Latin-1 scripts are common; decode lossily rather than skip them
        let content = match std::fs::read(&file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!("could not read {}: {}", file.display(), e);
                extraction
                    .unreadable
                    .push(relative_path(&options.root, &file));
                continue;
            }
        };
        extraction.files_scanned += 1;

        let rel = relative_path(&options.root, &file);
        for name in names_in_source(&content, SourceKind::of(&file)) {
            if !accept(&name, &options.exclude) {
                continue;
            }
            if seen.insert((name.clone(), rel.clone())) {
                extraction.references.push(DependencyReference {
                    name: name.clone(),
                    source_file: rel.clone(),
                });
            }
            extraction.names.insert(name);
        }
    }

    extraction.references.sort();
    tracing::debug!(
        "scanned {} files, found {} packages",
        extraction.files_scanned,
        extraction.names.len()
    );
    extraction
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x == ext))
}

/// All source files under the targets, sorted, each listed once.
fn source_files(targets: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut files = BTreeSet::new();
    for target in targets {
        if target.is_file() {
            files.insert(target.clone());
            continue;
        }
        let walker = WalkDir::new(target)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));
        for entry in walker {
            match entry {
                Ok(e) if e.file_type().is_file() && has_extension(e.path(), extensions) => {
                    files.insert(e.into_path());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping unreadable path: {}", e),
            }
        }
    }
    files.into_iter().collect()
}

fn accept(name: &str, exclude: &BTreeSet<String>) -> bool {
    name.len() >= 3
        && is_valid_name(name)
        && !is_base_package(name)
        && !PLACEHOLDER_NAMES.contains(&name)
        && !exclude.contains(name)
}

/// How a file's code is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain R script
    Script,
    /// R Markdown or Quarto: ```` ```{r} ```` chunks and `` `r expr` ``
    Markdown,
    /// Sweave: `<<>>=` ... `@` chunks and `\Sexpr{}`
    Sweave,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("rmd") | Some("qmd") => SourceKind::Markdown,
            Some("rnw") => SourceKind::Sweave,
            _ => SourceKind::Script,
        }
    }
}

static DIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:library|require|requireNamespace|loadNamespace)\s*\(\s*(?:package\s*=\s*)?["']?([A-Za-z][A-Za-z0-9._]*)"#,
    )
    .expect("valid regex")
});

static P_LOAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bp_load\s*\(([^)]*)\)").expect("valid regex"));

static QUALIFIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9._])([A-Za-z][A-Za-z0-9._]*):::?[A-Za-z._`]").expect("valid regex")
});

static MD_CHUNK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```+\s*\{\s*[rR]\b").expect("valid regex"));

static MD_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*```").expect("valid regex"));

static MD_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`r[ \t]+([^`]+)`").expect("valid regex"));

static RNW_CHUNK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<<.*>>=\s*$").expect("valid regex"));

static RNW_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\Sexpr\{([^}]*)\}").expect("valid regex"));

/// Candidate names in one file's text, before filtering.
pub fn names_in_source(content: &str, kind: SourceKind) -> BTreeSet<String> {
    let code = match kind {
        SourceKind::Script => content.to_string(),
        SourceKind::Markdown => markdown_code(content),
        SourceKind::Sweave => sweave_code(content),
    };

    let mut names = BTreeSet::new();
    for line in code.lines() {
        let line = strip_comment(line);
        names_in_line(line, &mut names);
    }
    names
}

fn names_in_line(line: &str, names: &mut BTreeSet<String>) {
    for caps in DIRECT_RE.captures_iter(line) {
        names.insert(caps[1].to_string());
    }
    for caps in P_LOAD_RE.captures_iter(line) {
        for arg in caps[1].split(',') {
            let arg = arg.trim();
            if arg.contains('=') {
                continue;
            }
            let arg = arg.trim_matches(|c| c == '"' || c == '\'');
            if !arg.is_empty() {
                names.insert(arg.to_string());
            }
        }
    }
    for caps in QUALIFIED_RE.captures_iter(line) {
        names.insert(caps[1].to_string());
    }
}

/// Drop a `#` comment, ignoring `#` inside string literals.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"') | (None, '\'') | (None, '`') => quote = Some(c),
            (None, '#') => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn markdown_code(content: &str) -> String {
    let mut code = String::new();
    let mut in_chunk = false;
    for line in content.lines() {
        if in_chunk {
            if MD_FENCE_RE.is_match(line) {
                in_chunk = false;
            } else {
                code.push_str(line);
                code.push('\n');
            }
        } else if MD_CHUNK_START_RE.is_match(line) {
            in_chunk = true;
        } else {
            for caps in MD_INLINE_RE.captures_iter(line) {
                code.push_str(&caps[1]);
                code.push('\n');
            }
        }
    }
    code
}

fn sweave_code(content: &str) -> String {
    let mut code = String::new();
    let mut in_chunk = false;
    for line in content.lines() {
        if in_chunk {
            if line.starts_with('@') {
                in_chunk = false;
            } else {
                code.push_str(line);
                code.push('\n');
            }
        } else if RNW_CHUNK_START_RE.is_match(line) {
            in_chunk = true;
        } else {
            for caps in RNW_INLINE_RE.captures_iter(line) {
                code.push_str(&caps[1]);
                code.push('\n');
            }
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(text: &str) -> Vec<String> {
        names_in_source(text, SourceKind::Script).into_iter().collect()
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_direct_invocations() {
        let names = script(
            r#"library(dplyr)
require("tidyr")
if (!requireNamespace('sf', quietly = TRUE)) stop()
loadNamespace(package = "jsonlite")
"#,
        );
        assert_eq!(names, vec!["dplyr", "jsonlite", "sf", "tidyr"]);
    }

    #[test]
    fn test_qualified_access() {
        let names = script("x <- readr::read_csv(f)\ny <- data.table:::setDT(x)\nz <- a$b::c\n");
        assert!(names.contains(&"readr".to_string()));
        assert!(names.contains(&"data.table".to_string()));
    }

    #[test]
    fn test_p_load_arguments() {
        let names = script("pacman::p_load(here, \"glue\", install = FALSE)\n");
        assert_eq!(names, vec!["glue", "here", "pacman"]);
    }

    #[test]
    fn test_comments_are_stripped() {
        let names = script("# library(fake)\nx <- 1 # stringr::str_c\nmsg <- \"# not a comment\"; library(purrr)\n");
        assert_eq!(names, vec!["purrr"]);
    }

    #[test]
    fn test_strip_comment_respects_strings() {
        assert_eq!(strip_comment(r##"paste("#", x) # tail"##), r##"paste("#", x) "##);
        assert_eq!(strip_comment(r#"x <- 'it\'s # fine'"#), r#"x <- 'it\'s # fine'"#);
        assert_eq!(strip_comment("no comment"), "no comment");
    }

    #[test]
    fn test_markdown_prose_is_ignored() {
        let rmd = "---
title: demo
---

We could call library(prose) here but this is text.

```{r setup, include=FALSE}
library(knitr)
```

```python
import pandas
```

The mean is `r scales::percent(0.5)`.
";
        let names: Vec<_> = names_in_source(rmd, SourceKind::Markdown).into_iter().collect();
        assert_eq!(names, vec!["knitr", "scales"]);
    }

    #[test]
    fn test_sweave_chunks() {
        let rnw = "\\section{Intro}\nlibrary(prose)\n<<setup, echo=FALSE>>=\nlibrary(xtable)\n@\nValue: \\Sexpr{round(zoo::na.approx(x), 2)}\n";
        let names: Vec<_> = names_in_source(rnw, SourceKind::Sweave).into_iter().collect();
        assert_eq!(names, vec!["xtable", "zoo"]);
    }

    #[test]
    fn test_acceptance_filter() {
        let exclude: BTreeSet<String> = ["demo".to_string()].into();
        assert!(accept("dplyr", &exclude));
        assert!(!accept("sf", &exclude)); // too short
        assert!(!accept("stats", &exclude)); // base
        assert!(!accept("package", &exclude)); // placeholder
        assert!(!accept("demo", &exclude)); // own package
        assert!(!accept("1abc", &exclude));
    }

    #[test]
    fn test_extract_project() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "R/load.R", "library(dplyr)\ndemo::helper()\n");
        write(root, "analysis/report.Rmd", "```{r}\nggplot2::ggplot()\n```\n");
        write(root, "analysis/.hidden/skip.R", "library(hiddenpkg)\n");
        write(root, "renv/library/skip.R", "library(renvpkg)\n");
        write(root, "tests/testthat/test-a.R", "library(testthat)\n");
        write(root, "run.R", "source('R/load.R'); library(targets)\n");
        write(root, "notes.txt", "library(textpkg)\n");

        let config = Config::default();
        let options = ExtractOptions::for_project(root, &config, false).excluding(Some("demo"));
        let extraction = extract(&options);

        assert_eq!(
            extraction.names.iter().cloned().collect::<Vec<_>>(),
            vec!["dplyr", "ggplot2", "targets"]
        );
        assert_eq!(extraction.files_scanned, 3);
        assert_eq!(extraction.files_for("dplyr"), vec![Path::new("R/load.R")]);

        let strict = ExtractOptions::for_project(root, &config, true).excluding(Some("demo"));
        assert!(extract(&strict).names.contains("testthat"));
    }

    #[test]
    fn test_missing_target_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let options = ExtractOptions {
            root: tmp.path().to_path_buf(),
            targets: vec![tmp.path().join("nope")],
            extensions: vec!["R".to_string()],
            exclude: BTreeSet::new(),
        };
        let extraction = extract(&options);
        assert!(extraction.names.is_empty());
        assert!(extraction.unreadable.is_empty());
    }

    #[test]
    fn test_non_utf8_source_is_scanned() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("R")).unwrap();
        std::fs::write(
            tmp.path().join("R/a.R"),
            b"# Caf\xe9 analysis\nlibrary(dplyr)\nx <- readr::read_csv(f)\n",
        )
        .unwrap();

        let options = ExtractOptions {
            root: tmp.path().to_path_buf(),
            targets: vec![tmp.path().join("R")],
            extensions: vec!["R".to_string()],
            exclude: BTreeSet::new(),
        };
        let extraction = extract(&options);

        assert!(extraction.unreadable.is_empty());
        assert_eq!(extraction.files_scanned, 1);
        assert_eq!(
            extraction.names.iter().cloned().collect::<Vec<_>>(),
            vec!["dplyr", "readr"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_counted_and_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "R/ok.R", "library(dplyr)\n");
        write(tmp.path(), "R/locked.R", "library(readr)\n");
        let locked = tmp.path().join("R/locked.R");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read(&locked).is_ok() {
            // root ignores permission bits
            return;
        }

        let options = ExtractOptions {
            root: tmp.path().to_path_buf(),
            targets: vec![tmp.path().join("R")],
            extensions: vec!["R".to_string()],
            exclude: BTreeSet::new(),
        };
        let extraction = extract(&options);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(extraction.unreadable, vec![PathBuf::from("R/locked.R")]);
        assert_eq!(extraction.files_scanned, 1);
        assert_eq!(
            extraction.names.iter().cloned().collect::<Vec<_>>(),
            vec!["dplyr"]
        );
    }
}

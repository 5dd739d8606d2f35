//! DESCRIPTION rewriting.
//!
//! [`ManifestSerializer`] is the capability the auto-fix path writes through.
//! Two implementations exist and one is chosen once at startup:
//! - [`DcfSerializer`] rewrites changed dependency fields through the DCF
//!   document model in the canonical multi-line layout.
//! - [`LineSerializer`] replaces only the line spans of changed fields with
//!   single-line values.
//!
//! Both leave every field they do not change byte-identical, and both
//! return the input unchanged when the edit is a no-op.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::core::dcf::{entry_name, split_entries, split_field, DcfDocument};
use crate::core::manifest::{Section, DEPENDENCY_FIELDS};
use crate::util::config::SerializerKind;

/// Changes to apply to a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestEdit {
    /// Names removed from every dependency field
    pub remove: BTreeSet<String>,
    /// Names added to the primary section
    pub add_primary: BTreeSet<String>,
}

impl ManifestEdit {
    /// Check if the edit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add_primary.is_empty()
    }
}

/// Capability to rewrite manifest text.
pub trait ManifestSerializer {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Apply `edit` to `original`, returning the new file content.
    fn rewrite(&self, original: &str, edit: &ManifestEdit) -> Result<String>;
}

/// Select the serializer configured for this run.
pub fn serializer_for(kind: SerializerKind) -> Box<dyn ManifestSerializer> {
    match kind {
        SerializerKind::Dcf => Box::new(DcfSerializer),
        SerializerKind::Line => Box::new(LineSerializer),
    }
}

/// Computes the new entry list of one field, or `None` if unchanged.
fn plan_field(field: &str, entries: &[String], edit: &ManifestEdit) -> Option<Vec<String>> {
    let mut next: Vec<String> = entries
        .iter()
        .filter(|e| entry_name(e).map_or(true, |n| !edit.remove.contains(n)))
        .cloned()
        .collect();

    if field == Section::Primary.target_field() {
        let present: BTreeSet<&str> = entries.iter().filter_map(|e| entry_name(e)).collect();
        for name in &edit.add_primary {
            if !present.contains(name.as_str()) {
                next.push(name.clone());
            }
        }
    }

    if next.as_slice() == entries {
        None
    } else {
        Some(next)
    }
}

/// Names from `add_primary` already declared in some other primary field.
fn declared_elsewhere(values: &[(String, Vec<String>)], edit: &ManifestEdit) -> BTreeSet<String> {
    values
        .iter()
        .filter(|(field, _)| Section::for_field(field) == Some(Section::Primary))
        .flat_map(|(_, entries)| entries.iter().filter_map(|e| entry_name(e)))
        .filter(|n| edit.add_primary.contains(*n) && !edit.remove.contains(*n))
        .map(str::to_string)
        .collect()
}

/// Structured serializer built on [`DcfDocument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DcfSerializer;

impl DcfSerializer {
    fn render(field: &str, entries: &[String]) -> Vec<String> {
        let mut lines = vec![format!("{}:", field)];
        let last = entries.len().saturating_sub(1);
        for (i, entry) in entries.iter().enumerate() {
            let sep = if i == last { "" } else { "," };
            lines.push(format!("    {}{}", entry, sep));
        }
        lines
    }
}

impl ManifestSerializer for DcfSerializer {
    fn name(&self) -> &'static str {
        "dcf"
    }

    fn rewrite(&self, original: &str, edit: &ManifestEdit) -> Result<String> {
        if edit.is_empty() {
            return Ok(original.to_string());
        }

        let mut doc = match DcfDocument::parse(original) {
            Ok(doc) => doc,
            Err(e) => bail!("DESCRIPTION is not valid DCF: {}", e),
        };

        let values: Vec<(String, Vec<String>)> = DEPENDENCY_FIELDS
            .iter()
            .map(|f| (f.to_string(), doc.get(f).map(|v| split_entries(&v)).unwrap_or_default()))
            .collect();

        let mut effective = edit.clone();
        for name in declared_elsewhere(&values, edit) {
            effective.add_primary.remove(&name);
        }

        let mut changed = false;
        for (field, entries) in &values {
            if let Some(next) = plan_field(field, entries, &effective) {
                changed = true;
                if next.is_empty() {
                    doc.remove(field);
                } else {
                    doc.set_lines(field, Self::render(field, &next), &["Depends", "Description", "License"]);
                }
            }
        }

        if !changed {
            return Ok(original.to_string());
        }
        Ok(doc.to_string())
    }
}

/// Manual serializer that edits line spans in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSerializer;

/// Line span `[start, end)` and value of a dependency field.
struct FieldSpan {
    start: usize,
    end: usize,
    value: String,
}

impl LineSerializer {
    fn find_span(lines: &[&str], field: &str) -> Option<FieldSpan> {
        let start = lines.iter().position(|l| {
            !l.starts_with(char::is_whitespace)
                && split_field(l).map_or(false, |(name, _)| name == field)
        })?;

        let mut value = split_field(lines[start])
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        let mut end = start + 1;
        while end < lines.len() && lines[end].starts_with([' ', '\t']) && !lines[end].trim().is_empty() {
            value.push('\n');
            value.push_str(lines[end].trim());
            end += 1;
        }
        Some(FieldSpan { start, end, value })
    }
}

impl ManifestSerializer for LineSerializer {
    fn name(&self) -> &'static str {
        "line"
    }

    fn rewrite(&self, original: &str, edit: &ManifestEdit) -> Result<String> {
        if edit.is_empty() {
            return Ok(original.to_string());
        }

        let lines: Vec<&str> = original.lines().collect();
        let spans: Vec<(&str, Option<FieldSpan>)> = DEPENDENCY_FIELDS
            .iter()
            .map(|f| (*f, Self::find_span(&lines, f)))
            .collect();

        let values: Vec<(String, Vec<String>)> = spans
            .iter()
            .map(|(f, span)| {
                (
                    f.to_string(),
                    span.as_ref().map(|s| split_entries(&s.value)).unwrap_or_default(),
                )
            })
            .collect();

        let mut effective = edit.clone();
        for name in declared_elsewhere(&values, edit) {
            effective.add_primary.remove(&name);
        }

        // Replacement per starting line; `None` deletes the span.
        let mut replacements: Vec<(usize, usize, Option<String>)> = Vec::new();
        let mut appended: Option<String> = None;
        for ((field, span), (_, entries)) in spans.iter().zip(&values) {
            let Some(next) = plan_field(field, entries, &effective) else {
                continue;
            };
            let rendered = (!next.is_empty()).then(|| format!("{}: {}", field, next.join(", ")));
            match span {
                Some(span) => replacements.push((span.start, span.end, rendered)),
                None => appended = rendered,
            }
        }

        if replacements.is_empty() && appended.is_none() {
            return Ok(original.to_string());
        }

        let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
        let mut idx = 0;
        while idx < lines.len() {
            if let Some((_, end, rendered)) = replacements.iter().find(|(start, _, _)| *start == idx) {
                if let Some(line) = rendered {
                    out.push(line.clone());
                }
                idx = *end;
            } else {
                out.push(lines[idx].to_string());
                idx += 1;
            }
        }

        if let Some(line) = appended {
            // Keep trailing blank lines after the new field
            let insert_at = out
                .iter()
                .rposition(|l| !l.trim().is_empty())
                .map(|i| i + 1)
                .unwrap_or(out.len());
            out.insert(insert_at, line);
        }

        let mut text = out.join("\n");
        if original.ends_with('\n') || original.is_empty() {
            text.push('\n');
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::parse_structured;

    const DESCRIPTION: &str = "Package: demo
Title: Demo Compendium
Version: 0.1.0
Authors@R:
    person(\"Ada\", \"Lovelace\", role = c(\"aut\", \"cre\"))
Description: Analysis code
    for the demo paper.
License: MIT
Imports:
    dplyr (>= 1.1.0),
    fakepkg,
    ggplot2
Suggests: testthat, fakepkg
";

    fn edit(remove: &[&str], add: &[&str]) -> ManifestEdit {
        ManifestEdit {
            remove: remove.iter().map(|s| s.to_string()).collect(),
            add_primary: add.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn serializers() -> Vec<Box<dyn ManifestSerializer>> {
        vec![Box::new(DcfSerializer), Box::new(LineSerializer)]
    }

    #[test]
    fn test_remove_and_add() {
        for ser in serializers() {
            let out = ser.rewrite(DESCRIPTION, &edit(&["fakepkg"], &["tidyr"])).unwrap();
            let manifest = parse_structured(&out).unwrap();

            assert!(manifest.section_of("fakepkg").is_none(), "{}", ser.name());
            assert_eq!(manifest.section_of("tidyr"), Some(Section::Primary), "{}", ser.name());
            assert_eq!(manifest.section_of("dplyr"), Some(Section::Primary), "{}", ser.name());
            assert_eq!(manifest.section_of("testthat"), Some(Section::Optional), "{}", ser.name());
            // Version annotations of kept entries survive
            assert!(out.contains("dplyr (>= 1.1.0)"), "{}", ser.name());
        }
    }

    #[test]
    fn test_untouched_fields_are_byte_identical() {
        for ser in serializers() {
            let out = ser.rewrite(DESCRIPTION, &edit(&["fakepkg"], &[])).unwrap();
            assert!(out.starts_with(
                "Package: demo\nTitle: Demo Compendium\nVersion: 0.1.0\nAuthors@R:\n    person(\"Ada\", \"Lovelace\", role = c(\"aut\", \"cre\"))\nDescription: Analysis code\n    for the demo paper.\nLicense: MIT\n"
            ), "{}", ser.name());
            assert!(out.ends_with('\n'));
        }
    }

    #[test]
    fn test_dcf_layout() {
        let out = DcfSerializer
            .rewrite(DESCRIPTION, &edit(&["fakepkg"], &["tidyr"]))
            .unwrap();
        assert!(out.contains("Imports:\n    dplyr (>= 1.1.0),\n    ggplot2,\n    tidyr\n"));
        assert!(out.contains("Suggests:\n    testthat\n"));
    }

    #[test]
    fn test_line_layout() {
        let out = LineSerializer
            .rewrite(DESCRIPTION, &edit(&["fakepkg"], &["tidyr"]))
            .unwrap();
        assert!(out.contains("Imports: dplyr (>= 1.1.0), ggplot2, tidyr\n"));
        assert!(out.contains("Suggests: testthat\n"));
    }

    #[test]
    fn test_creates_imports_when_absent() {
        let original = "Package: demo\nVersion: 0.1.0\nDepends: R (>= 4.1)\nLicense: MIT\n";
        for ser in serializers() {
            let out = ser.rewrite(original, &edit(&[], &["beta"])).unwrap();
            let manifest = parse_structured(&out).unwrap();
            assert_eq!(manifest.section_of("beta"), Some(Section::Primary), "{}", ser.name());
            assert!(out.contains("Depends: R (>= 4.1)"));
        }
    }

    #[test]
    fn test_removing_last_entry_drops_field() {
        let original = "Package: demo\nImports: gamma\nLicense: MIT\n";
        for ser in serializers() {
            let out = ser.rewrite(original, &edit(&["gamma"], &[])).unwrap();
            assert_eq!(out, "Package: demo\nLicense: MIT\n", "{}", ser.name());
        }
    }

    #[test]
    fn test_no_op_edit_returns_input() {
        for ser in serializers() {
            let out = ser.rewrite(DESCRIPTION, &edit(&["notthere"], &["dplyr"])).unwrap();
            assert_eq!(out, DESCRIPTION, "{}", ser.name());
        }
    }

    #[test]
    fn test_add_skips_names_already_in_depends() {
        let original = "Package: demo\nDepends: sf\n";
        for ser in serializers() {
            let out = ser.rewrite(original, &edit(&[], &["sf"])).unwrap();
            assert_eq!(out, original, "{}", ser.name());
        }
    }

    #[test]
    fn test_dcf_rejects_invalid_document() {
        let err = DcfSerializer
            .rewrite("Package: demo\nnot dcf\n", &edit(&[], &["x"]))
            .unwrap_err();
        assert!(err.to_string().contains("not valid DCF"));
    }

    #[test]
    fn test_serializer_for() {
        assert_eq!(serializer_for(SerializerKind::Dcf).name(), "dcf");
        assert_eq!(serializer_for(SerializerKind::Line).name(), "line");
    }
}

//! Debian Control File (DCF) codec.
//!
//! DESCRIPTION and the repository `PACKAGES` index are both DCF: `Field: value`
//! records where lines starting with whitespace continue the previous field.
//! The document keeps every source line so that fields nobody touched are
//! written back byte for byte.

use std::fmt;

use thiserror::Error;

/// Error while reading DCF text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DcfError {
    #[error("line {line}: continuation line before any field")]
    OrphanContinuation { line: usize },

    #[error("line {line}: expected `Field: value`, found `{text}`")]
    MalformedLine { line: usize, text: String },
}

/// One piece of a DCF document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcfEntry {
    /// A field with its original lines (first line holds `Name:`)
    Field { name: String, lines: Vec<String> },
    /// A blank line between records
    Blank(String),
}

/// A parsed DCF document that preserves formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcfDocument {
    entries: Vec<DcfEntry>,
    trailing_newline: bool,
}

impl DcfDocument {
    /// Parse DCF text.
    pub fn parse(text: &str) -> Result<Self, DcfError> {
        let mut entries: Vec<DcfEntry> = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;

            if line.trim().is_empty() {
                entries.push(DcfEntry::Blank(line.to_string()));
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                match entries.last_mut() {
                    Some(DcfEntry::Field { lines, .. }) => {
                        lines.push(line.to_string());
                        continue;
                    }
                    _ => return Err(DcfError::OrphanContinuation { line: line_no }),
                }
            }

            match split_field(line) {
                Some((name, _)) => entries.push(DcfEntry::Field {
                    name: name.to_string(),
                    lines: vec![line.to_string()],
                }),
                None => {
                    return Err(DcfError::MalformedLine {
                        line: line_no,
                        text: line.to_string(),
                    })
                }
            }
        }

        Ok(DcfDocument {
            entries,
            trailing_newline: text.ends_with('\n'),
        })
    }

    /// All entries in source order.
    pub fn entries(&self) -> &[DcfEntry] {
        &self.entries
    }

    /// Field names in source order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            DcfEntry::Field { name, .. } => Some(name.as_str()),
            DcfEntry::Blank(_) => None,
        })
    }

    /// Check whether a field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.field_names().any(|n| n == field)
    }

    /// Value of the first field called `field`, continuation lines joined
    /// with `\n` and each line trimmed.
    pub fn get(&self, field: &str) -> Option<String> {
        self.entries.iter().find_map(|e| match e {
            DcfEntry::Field { name, lines } if name == field => Some(field_value(lines)),
            _ => None,
        })
    }

    /// Every value of `field` across all records (the PACKAGES index holds
    /// one record per package).
    pub fn get_all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = String> + 'a {
        self.entries.iter().filter_map(move |e| match e {
            DcfEntry::Field { name, lines } if name == field => Some(field_value(lines)),
            _ => None,
        })
    }

    /// Replace the lines of an existing field, or insert it after the field
    /// named `after` (or at the end of the first record when `after` is
    /// absent).
    pub fn set_lines(&mut self, field: &str, new_lines: Vec<String>, after: &[&str]) {
        for entry in &mut self.entries {
            if let DcfEntry::Field { name, lines } = entry {
                if name == field {
                    *lines = new_lines;
                    return;
                }
            }
        }

        let new_entry = DcfEntry::Field {
            name: field.to_string(),
            lines: new_lines,
        };

        let anchor = after.iter().find_map(|wanted| {
            self.entries.iter().position(
                |e| matches!(e, DcfEntry::Field { name, .. } if name == wanted),
            )
        });

        let position = match anchor {
            Some(idx) => idx + 1,
            None => self
                .entries
                .iter()
                .rposition(|e| matches!(e, DcfEntry::Field { .. }))
                .map(|idx| idx + 1)
                .unwrap_or(self.entries.len()),
        };
        self.entries.insert(position, new_entry);
    }

    /// Remove every field called `field`.
    pub fn remove(&mut self, field: &str) {
        self.entries
            .retain(|e| !matches!(e, DcfEntry::Field { name, .. } if name == field));
    }
}

impl fmt::Display for DcfDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in &self.entries {
            let lines: &[String] = match entry {
                DcfEntry::Field { lines, .. } => lines,
                DcfEntry::Blank(line) => std::slice::from_ref(line),
            };
            for line in lines {
                if !first {
                    f.write_str("\n")?;
                }
                f.write_str(line)?;
                first = false;
            }
        }
        if self.trailing_newline && !first {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Split `Name: value` into its parts. Field names contain no whitespace.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once(':')?;
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }
    Some((name, rest.trim()))
}

fn field_value(lines: &[String]) -> String {
    let mut parts = Vec::with_capacity(lines.len());
    if let Some(first) = lines.first() {
        if let Some((_, value)) = split_field(first) {
            if !value.is_empty() {
                parts.push(value.to_string());
            }
        }
    }
    for line in lines.iter().skip(1) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join("\n")
}

/// Split a dependency field value into its raw entries
/// (`"dplyr (>= 1.0.0)"`, `"tidyr"`), dropping empties.
pub fn split_entries(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|e| e.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|e| !e.is_empty())
        .collect()
}

/// Package name of a dependency entry with its version annotation removed.
pub fn entry_name(entry: &str) -> Option<&str> {
    let name = entry.split('(').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

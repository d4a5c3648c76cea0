//! Section merge into an existing daily note.
//!
//! A document is handled as a sequence of lines. The data section starts at
//! the first line whose trimmed text begins with the heading prefix and runs
//! up to (not including) the next level-1 or level-2 heading, or to the end
//! of the document. Nothing outside that range is touched.

use std::ops::Range;

use crate::formatter::FormattedSection;

/// How a merge changed the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Replaced,
    Appended,
}

/// A document split on `\n`. Joining the lines back with `\n` reproduces the
/// original text exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentLines {
    lines: Vec<String>,
}

impl DocumentLines {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Line range of the section introduced by `heading_prefix`, if present.
    pub fn find_section(&self, heading_prefix: &str) -> Option<Range<usize>> {
        let start = self
            .lines
            .iter()
            .position(|l| l.trim().starts_with(heading_prefix))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| is_section_boundary(l))
            .map_or(self.lines.len(), |offset| start + 1 + offset);
        Some(start..end)
    }

    pub fn splice(&mut self, range: Range<usize>, replacement: &[String]) {
        self.lines.splice(range, replacement.iter().cloned());
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

fn is_section_boundary(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("# ") || trimmed.starts_with("## ")
}

/// Combine `section` with the existing document, if any.
pub fn merge(
    existing: Option<&str>,
    section: &FormattedSection,
    heading_prefix: &str,
    creation_header: &str,
) -> String {
    merge_with_outcome(existing, section, heading_prefix, creation_header).0
}

pub fn merge_with_outcome(
    existing: Option<&str>,
    section: &FormattedSection,
    heading_prefix: &str,
    creation_header: &str,
) -> (String, MergeOutcome) {
    let Some(existing) = existing else {
        let text = format!("{creation_header}\n\n{}", section.to_text());
        return (text, MergeOutcome::Created);
    };

    let mut doc = DocumentLines::parse(existing);
    match doc.find_section(heading_prefix) {
        Some(range) => {
            tracing::debug!(line = range.start + 1, "replacing existing data section");
            // the section's own trailing blank line doubles as the separator
            doc.splice(range, section.lines());
            (doc.to_text(), MergeOutcome::Replaced)
        }
        None => {
            tracing::debug!("no data section found; appending");
            let separator = if existing.is_empty() || existing.ends_with('\n') {
                "\n"
            } else {
                "\n\n"
            };
            let text = format!("{existing}{separator}{}", section.to_text());
            (text, MergeOutcome::Appended)
        }
    }
}

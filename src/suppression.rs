//! Inline suppression directives.
//!
//! Rules are expected to be precise, but authors still need an escape hatch
//! at the source level. A comment containing `lint:allow(code, ...)`
//! suppresses the named rules on the directive's own line and the line
//! directly below it (so the directive can sit beside or above the finding);
//! `lint:allow-file(code, ...)` anywhere in the file suppresses them for the
//! whole file. The name `all` matches every rule.
//!
//! The reporter consults this as a backstop after severity resolution; the
//! source is scanned once per run.

use crate::tree::Span;
use std::collections::HashSet;

const LINE_MARKER: &str = "lint:allow(";
const FILE_MARKER: &str = "lint:allow-file(";

/// Pre-scanned suppression directives for one source file.
#[derive(Debug, Default)]
pub struct SuppressionIndex {
    file_wide: HashSet<String>,
    /// Byte range each line directive covers (its line plus the next one).
    line_scoped: Vec<(Span, Vec<String>)>,
}

impl SuppressionIndex {
    /// Scan `source` for directives.
    #[must_use]
    pub fn scan(source: &str) -> Self {
        let mut index = SuppressionIndex::default();

        // Offsets of every line start, plus a trailing sentinel, so a
        // directive's covered range is start(i)..start(i + 2).
        let mut starts: Vec<usize> = vec![0];
        for (pos, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(pos + 1);
            }
        }
        starts.push(source.len());

        for i in 0..starts.len().saturating_sub(1) {
            let line = &source[starts[i]..starts[i + 1]];
            if let Some(codes) = parse_directive(line, FILE_MARKER) {
                index.file_wide.extend(codes);
            } else if let Some(codes) = parse_directive(line, LINE_MARKER) {
                let end = starts.get(i + 2).copied().unwrap_or(source.len());
                index.line_scoped.push((Span::new(starts[i], end), codes));
            }
        }

        index
    }

    /// Whether a finding of `code` starting inside `span` is suppressed.
    #[must_use]
    pub fn is_suppressed(&self, span: Span, code: &str) -> bool {
        if self.file_wide.contains(code) || self.file_wide.contains("all") {
            return true;
        }
        self.line_scoped.iter().any(|(covered, codes)| {
            covered.contains(span.start) && codes.iter().any(|c| c == code || c == "all")
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_wide.is_empty() && self.line_scoped.is_empty()
    }
}

fn parse_directive(line: &str, marker: &str) -> Option<Vec<String>> {
    let at = line.find(marker)?;
    let rest = &line[at + marker.len()..];
    let close = rest.find(')')?;
    let codes: Vec<String> = rest[..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if codes.is_empty() { None } else { Some(codes) }
}

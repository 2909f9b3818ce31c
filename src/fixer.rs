//! Fix engine: computes, validates, and materializes fixes.
//!
//! Findings and fixes are decoupled: a diagnostic whose fix generator
//! misbehaves keeps the diagnostic and loses only the fix. Computing a fix
//! never mutates the tree; application is a pure string transformation the
//! caller triggers explicitly.

use crate::diagnostics::Diagnostic;
use crate::fix::{Edit, FixError, apply_edits, validate_edits};
use crate::rule::{FixSafety, RuleDescriptor, RuleRegistry};
use crate::tree::{Node, Span, SyntaxTree};
use itertools::Itertools;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

/// A validated fix: the edits resolving exactly one diagnostic.
#[derive(Debug, Clone)]
pub struct Fix {
    pub rule: &'static RuleDescriptor,
    /// Location of the diagnostic this fix resolves.
    pub diagnostic: Span,
    /// Non-overlapping edits, validated against the analyzed source.
    pub edits: Vec<Edit>,
}

impl Serialize for Fix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Fix", 3)?;
        s.serialize_field("rule_code", self.rule.code)?;
        s.serialize_field("diagnostic", &self.diagnostic)?;
        s.serialize_field("edits", &self.edits)?;
        s.end()
    }
}

/// Outcome of computing fixes for a diagnostic list.
#[derive(Debug, Default)]
pub struct FixBatch {
    pub fixes: Vec<Fix>,
    /// Generators that produced invalid (overlapping or out-of-bounds) edits.
    pub rejected: usize,
    /// Fixes withheld because they are classified unsafe and unsafe fixes
    /// were not requested.
    pub skipped_unsafe: usize,
}

/// Compute fixes for every diagnostic whose rule advertises one.
///
/// Each candidate is validated before it is exposed; a generator yielding
/// overlapping or out-of-bounds edits is a rule bug, so the fix is dropped
/// with a logged warning while the diagnostic itself survives.
pub fn compute_fixes(
    registry: &RuleRegistry,
    diagnostics: &[Diagnostic],
    tree: &SyntaxTree,
    source: &str,
    allow_unsafe: bool,
) -> FixBatch {
    let mut batch = FixBatch::default();

    for diag in diagnostics {
        let descriptor = diag.rule;
        if !descriptor.fix.available {
            continue;
        }
        if descriptor.fix.safety == FixSafety::Unsafe && !allow_unsafe {
            batch.skipped_unsafe += 1;
            continue;
        }
        let Some(rule) = registry.find_rule(descriptor.code) else {
            continue;
        };
        let Some(edits) = rule.fix(diag, tree, source) else {
            continue;
        };

        match validate_edits(&edits, source.len()) {
            Ok(()) => batch.fixes.push(Fix {
                rule: descriptor,
                diagnostic: diag.span,
                edits,
            }),
            Err(err) => {
                crate::trace_warn!(
                    rule = descriptor.code,
                    error = %err,
                    "rejecting fix with invalid edits"
                );
                batch.rejected += 1;
            }
        }
    }

    batch
}

/// Whether several fixes can be applied together without their edits
/// colliding. Cross-fix validation is the caller's call to make; this is the
/// helper for it.
#[must_use]
pub fn non_overlapping(fixes: &[Fix]) -> bool {
    fixes
        .iter()
        .flat_map(|f| &f.edits)
        .sorted_by_key(|e| (e.start_byte, e.end_byte))
        .tuple_windows()
        .all(|(a, b)| a.end_byte <= b.start_byte)
}

/// Apply several fixes at once, validating cross-fix overlap first.
pub fn apply_all(source: &str, fixes: &[Fix]) -> Result<String, FixError> {
    let edits: Vec<Edit> = fixes.iter().flat_map(|f| f.edits.clone()).collect();
    apply_edits(source, &edits)
}

// ----------------------------------------------------------------------
// Anchor helpers
// ----------------------------------------------------------------------

/// Byte offset just before the closing delimiter of a block-like node —
/// the insertion point for "append a statement at the end of this block".
///
/// Returns `None` if the node's text does not end in a closing delimiter.
#[must_use]
pub fn before_closing_delimiter(source: &str, node: Node<'_>) -> Option<usize> {
    let span = node.span();
    let text = source.get(span.range())?;
    let trimmed = text.trim_end();
    let last = *trimmed.as_bytes().last()?;
    matches!(last, b')' | b']' | b'}').then(|| span.start + trimmed.len() - 1)
}

/// Byte offset immediately after the node's last child — the insertion point
/// for "append after the final argument".
#[must_use]
pub fn after_last_child(node: Node<'_>) -> Option<usize> {
    node.children().next_back().map(|c| c.span().end)
}

// ----------------------------------------------------------------------
// Diff rendering
// ----------------------------------------------------------------------

/// Render a unified diff between original and fixed source, with three
/// context lines per hunk. Returns the empty string when nothing changed.
#[must_use]
pub fn format_diff(original: &str, fixed: &str, path: &Path) -> String {
    const CONTEXT: usize = 3;

    let orig: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = fixed.lines().collect();
    let max_len = orig.len().max(new.len());

    let changed: Vec<usize> = (0..max_len).filter(|&i| orig.get(i) != new.get(i)).collect();
    if changed.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let shown = path.display();
    let _ = writeln!(out, "--- a/{shown}");
    let _ = writeln!(out, "+++ b/{shown}");

    // Merge per-line context windows into hunks.
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &i in &changed {
        let start = i.saturating_sub(CONTEXT);
        let end = (i + CONTEXT + 1).min(max_len);
        match hunks.last_mut() {
            Some((_, prev_end)) if start <= *prev_end => *prev_end = end,
            _ => hunks.push((start, end)),
        }
    }

    let changed_set: HashSet<usize> = changed.into_iter().collect();
    for (start, end) in hunks {
        let old_count = end.min(orig.len()).saturating_sub(start);
        let new_count = end.min(new.len()).saturating_sub(start);
        let _ = writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            start + 1,
            old_count,
            start + 1,
            new_count
        );
        for i in start..end {
            if changed_set.contains(&i) {
                if let Some(line) = orig.get(i) {
                    let _ = writeln!(out, "-{line}");
                }
                if let Some(line) = new.get(i) {
                    let _ = writeln!(out, "+{line}");
                }
            } else if let Some(line) = orig.get(i) {
                let _ = writeln!(out, " {line}");
            }
        }
    }

    out
}

//! Text-edit primitives for auto-fixes.
//!
//! Everything here is pure: edits are byte-offset descriptions of changes,
//! validation and application work on strings, and no file I/O happens.
//! Edits are applied in descending offset order so earlier offsets stay
//! valid while later ones are rewritten.

use serde::Serialize;
use thiserror::Error;

/// Error type for edit validation and application.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("overlapping edits detected at byte {0}")]
    OverlappingEdits(usize),

    #[error("edit range [{start}..{end}) exceeds source length {source_len}")]
    InvalidRange {
        start: usize,
        end: usize,
        source_len: usize,
    },

    #[error("edit start {start} is after edit end {end}")]
    InvalidEditOrder { start: usize, end: usize },
}

/// A single text edit: replace the bytes in `[start_byte..end_byte)` with
/// `replacement`. Insertions have an empty range, deletions an empty
/// replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edit {
    /// Starting byte offset (inclusive).
    pub start_byte: usize,
    /// Ending byte offset (exclusive).
    pub end_byte: usize,
    /// Text inserted in place of the range.
    pub replacement: String,
}

impl Edit {
    pub fn new(start_byte: usize, end_byte: usize, replacement: impl Into<String>) -> Self {
        Self {
            start_byte,
            end_byte,
            replacement: replacement.into(),
        }
    }

    /// Delete a range.
    pub fn delete(start_byte: usize, end_byte: usize) -> Self {
        Self::new(start_byte, end_byte, String::new())
    }

    /// Insert text at a position.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, offset, text)
    }

    /// Replace a range with new text.
    pub fn replace(start_byte: usize, end_byte: usize, replacement: impl Into<String>) -> Self {
        Self::new(start_byte, end_byte, replacement)
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_byte..self.end_byte
    }

    /// Whether two edits touch the same bytes.
    pub fn overlaps_with(&self, other: &Edit) -> bool {
        self.start_byte < other.end_byte && other.start_byte < self.end_byte
    }

    fn validate(&self, source_len: usize) -> Result<(), FixError> {
        if self.start_byte > self.end_byte {
            return Err(FixError::InvalidEditOrder {
                start: self.start_byte,
                end: self.end_byte,
            });
        }
        if self.end_byte > source_len {
            return Err(FixError::InvalidRange {
                start: self.start_byte,
                end: self.end_byte,
                source_len,
            });
        }
        Ok(())
    }
}

/// Validate that a list of edits is within bounds and non-overlapping.
pub fn validate_edits(edits: &[Edit], source_len: usize) -> Result<(), FixError> {
    for edit in edits {
        edit.validate(source_len)?;
    }

    for i in 0..edits.len() {
        for j in (i + 1)..edits.len() {
            if edits[i].overlaps_with(&edits[j]) {
                return Err(FixError::OverlappingEdits(edits[i].start_byte));
            }
        }
    }

    Ok(())
}

/// Apply a list of non-overlapping edits to `source`, returning the new text.
///
/// # Errors
///
/// Returns an error if any edit is out of bounds, inverted, or overlaps
/// another.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, FixError> {
    if edits.is_empty() {
        return Ok(source.to_string());
    }

    validate_edits(edits, source.len())?;

    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.start_byte.cmp(&a.start_byte));

    let mut result = source.to_string();
    for edit in sorted {
        result.replace_range(edit.range(), &edit.replacement);
    }

    Ok(result)
}

/// Apply a single edit (convenience wrapper).
pub fn apply_edit(source: &str, edit: &Edit) -> Result<String, FixError> {
    apply_edits(source, std::slice::from_ref(edit))
}

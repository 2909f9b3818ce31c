//! Cross-file accumulation for project-wide rules.
//!
//! A rule that reasons over a whole batch (e.g. "was this process-wide
//! singleton ever reset anywhere in the project") records observations into a
//! [`BatchContext`] the caller threads through every per-file run, and
//! registers one finalization task against the batch. The caller decides when
//! the batch is complete and calls [`BatchContext::finish`], which drains the
//! tasks — in registration order, with the same failure isolation per-file
//! callbacks get.
//!
//! The batch context is deliberately not synchronized: callers running files
//! in parallel must serialize access to it (or run the batch single-threaded).

use crate::context::FactStore;
use crate::diagnostics::{Diagnostic, RULE_CRASHED};
use crate::error::panic_message;
use crate::rule::{RuleDescriptor, RuleSettings};
use crate::tree::Span;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

type BatchTask = Box<dyn FnOnce(&FactStore, &mut BatchSink) + Send>;

/// Reporting sink handed to batch finalization tasks.
///
/// Unlike the per-run reporter there is no location validation here: spans
/// were captured against per-file sources the batch no longer holds, so each
/// observation is trusted to carry the span its own run validated.
pub struct BatchSink<'a> {
    settings: &'a RuleSettings,
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(&'static str, Option<String>, Span)>,
}

impl BatchSink<'_> {
    /// Record a batch-level diagnostic, keyed for de-duplication by
    /// `(rule, file, span)`.
    pub fn report(
        &mut self,
        rule: &'static RuleDescriptor,
        file: Option<&str>,
        span: Span,
        message: impl Into<String>,
    ) {
        let severity = self
            .settings
            .severity_for(rule.code)
            .unwrap_or(rule.severity);
        if severity == crate::level::Severity::Allow {
            return;
        }

        let key = (rule.code, file.map(str::to_owned), span);
        if !self.seen.insert(key) {
            return;
        }

        self.diagnostics.push(Diagnostic {
            rule,
            severity,
            file: file.map(str::to_owned),
            span,
            message: message.into(),
            help: None,
        });
    }
}

/// Shared scratch space for one batch of per-file runs.
#[derive(Default)]
pub struct BatchContext {
    facts: FactStore,
    deferred: Vec<(&'static RuleDescriptor, BatchTask)>,
    once: HashSet<&'static str>,
    files: usize,
}

impl BatchContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch-scoped fact store, shared across all runs in the batch.
    pub fn facts(&mut self) -> &mut FactStore {
        &mut self.facts
    }

    /// Number of per-file runs that touched this batch so far.
    #[must_use]
    pub fn files_seen(&self) -> usize {
        self.files
    }

    pub(crate) fn note_file(&mut self) {
        self.files += 1;
    }

    /// Register a finalization task, run once when the batch finishes.
    pub fn defer(
        &mut self,
        rule: &'static RuleDescriptor,
        task: impl FnOnce(&FactStore, &mut BatchSink) + Send + 'static,
    ) {
        self.deferred.push((rule, Box::new(task)));
    }

    /// Like [`BatchContext::defer`], but a no-op after the first call for the
    /// same rule: observations accumulate per file, one task reads them all.
    pub fn defer_once(
        &mut self,
        rule: &'static RuleDescriptor,
        task: impl FnOnce(&FactStore, &mut BatchSink) + Send + 'static,
    ) {
        if self.once.insert(rule.code) {
            self.defer(rule, task);
        }
    }

    /// Drain the finalization tasks and return the batch-level diagnostics.
    ///
    /// Tasks run in registration order; a panicking task is surfaced as a
    /// reserved `rule_crashed` diagnostic and does not stop the others.
    #[must_use]
    pub fn finish(self, settings: &RuleSettings) -> Vec<Diagnostic> {
        let BatchContext {
            facts, deferred, ..
        } = self;

        let mut sink = BatchSink {
            settings,
            diagnostics: Vec::new(),
            seen: HashSet::new(),
        };

        for (rule, task) in deferred {
            let outcome = catch_unwind(AssertUnwindSafe(|| task(&facts, &mut sink)));
            if let Err(payload) = outcome {
                sink.diagnostics.push(Diagnostic {
                    rule: &RULE_CRASHED,
                    severity: RULE_CRASHED.severity,
                    file: None,
                    span: Span::new(0, 0),
                    message: format!(
                        "rule `{}` panicked during batch finalization: {}",
                        rule.code,
                        panic_message(payload.as_ref())
                    ),
                    help: None,
                });
            }
        }

        sink.diagnostics
    }
}

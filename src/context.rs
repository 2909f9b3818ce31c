//! Per-run mutable state shared by all rule callbacks.
//!
//! One [`RunContext`] exists per analysis run. It owns the typed fact store,
//! the deferred-task queue, and the diagnostics sink, and exposes the run
//! metadata (source text, path, optional type oracle) callbacks read.

use crate::batch::BatchContext;
use crate::diagnostics::Diagnostic;
use crate::error::{EngineError, EngineResult};
use crate::level::Severity;
use crate::rule::{RuleDescriptor, RuleSettings};
use crate::suppression::SuppressionIndex;
use crate::tree::{Node, NodeId, Span, SyntaxTree, TypeDescriptor, TypeOracle};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Where the run currently is; gates sealed fact reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Dedicated fact-collection traversal (two-phase rules, pass 1).
    Collect,
    /// Decision traversal; the fact store is sealed.
    Main,
    /// Draining the deferred queue after the final traversal.
    Deferred,
}

/// Generic key→value store for facts rules accumulate during traversal.
///
/// Buckets are keyed by `(name, type)`, so two rules using the same name with
/// different bucket types do not collide. The store itself is never iterated
/// by the engine; rules that iterate their own buckets must use
/// insertion-ordered or sorted collections inside them to keep reporting
/// deterministic.
#[derive(Default)]
pub struct FactStore {
    entries: HashMap<(&'static str, TypeId), Box<dyn Any + Send>>,
}

impl FactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the bucket stored under `key`.
    pub fn entry<T: Any + Send + Default>(&mut self, key: &'static str) -> &mut T {
        self.entries
            .entry((key, TypeId::of::<T>()))
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("fact bucket is keyed by its TypeId")
    }

    pub fn get<T: Any + Send>(&self, key: &'static str) -> Option<&T> {
        self.entries
            .get(&(key, TypeId::of::<T>()))
            .and_then(|b| b.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A post-run closure enqueued during traversal.
pub(crate) struct DeferredTask {
    pub(crate) rule: &'static RuleDescriptor,
    pub(crate) run: Box<dyn for<'s> FnOnce(&mut RunContext<'s>) -> EngineResult<()> + Send>,
}

/// Mutable context passed to rule callbacks while analyzing one tree.
pub struct RunContext<'s> {
    tree: &'s SyntaxTree,
    source: &'s str,
    path: Option<&'s str>,
    types: Option<&'s dyn TypeOracle>,
    settings: &'s RuleSettings,
    suppression: SuppressionIndex,
    facts: FactStore,
    deferred: VecDeque<DeferredTask>,
    deferred_once: HashSet<&'static str>,
    phase: Phase,
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(&'static str, Span)>,
    batch: Option<&'s mut BatchContext>,
}

impl<'s> RunContext<'s> {
    pub(crate) fn new(
        tree: &'s SyntaxTree,
        source: &'s str,
        settings: &'s RuleSettings,
        path: Option<&'s str>,
        types: Option<&'s dyn TypeOracle>,
        batch: Option<&'s mut BatchContext>,
    ) -> Self {
        Self {
            tree,
            source,
            path,
            types,
            settings,
            suppression: SuppressionIndex::scan(source),
            facts: FactStore::new(),
            deferred: VecDeque::new(),
            deferred_once: HashSet::new(),
            phase: Phase::Main,
            diagnostics: Vec::new(),
            seen: HashSet::new(),
            batch,
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn path(&self) -> Option<&'s str> {
        self.path
    }

    pub fn settings(&self) -> &RuleSettings {
        self.settings
    }

    /// Resolve a node id captured earlier in this run.
    pub fn node(&self, id: NodeId) -> Node<'s> {
        let tree: &'s SyntaxTree = self.tree;
        tree.node(id)
    }

    /// Raw source covered by `node`.
    pub fn text(&self, node: Node<'_>) -> &'s str {
        self.slice(node.span())
    }

    /// Raw source covered by `span`; empty if the span does not index the
    /// source cleanly.
    pub fn slice(&self, span: Span) -> &'s str {
        let source: &'s str = self.source;
        source.get(span.range()).unwrap_or("")
    }

    /// Static type of an expression node, if a type oracle was supplied.
    pub fn static_type(&self, node: Node<'_>) -> Option<TypeDescriptor> {
        self.types.and_then(|oracle| oracle.static_type(node.id()))
    }

    /// Batch-scoped fact store, when this run is part of a cross-file batch.
    pub fn batch(&mut self) -> Option<&mut BatchContext> {
        self.batch.as_deref_mut()
    }

    // ------------------------------------------------------------------
    // Fact accumulation
    // ------------------------------------------------------------------

    /// Get-or-create a typed fact bucket. Writable in every phase.
    pub fn fact<T: Any + Send + Default>(&mut self, key: &'static str) -> &mut T {
        self.facts.entry::<T>(key)
    }

    /// Read a fact bucket that must be complete before use.
    ///
    /// Rejected while the collection traversal is still running: a fact read
    /// there would see only the prefix of the file visited so far, which is
    /// exactly the bug the two-phase protocol exists to rule out. The engine
    /// disables a rule that trips this for the rest of the run.
    pub fn collected<T: Any + Send>(&self, key: &'static str) -> EngineResult<Option<&T>> {
        if self.phase == Phase::Collect {
            return Err(EngineError::ProtocolViolation { fact: key });
        }
        Ok(self.facts.get::<T>(key))
    }

    /// Enqueue a closure to run after the final traversal returns.
    ///
    /// Tasks run in enqueue order, exactly once. A task may enqueue follow-up
    /// work; it is drained in the same FIFO sweep.
    pub fn defer(
        &mut self,
        rule: &'static RuleDescriptor,
        task: impl for<'a> FnOnce(&mut RunContext<'a>) -> EngineResult<()> + Send + 'static,
    ) {
        self.deferred.push_back(DeferredTask {
            rule,
            run: Box::new(task),
        });
    }

    /// Like [`RunContext::defer`], but a no-op after the first call for the
    /// same rule — the intended shape for post-run rules: observations go in
    /// the fact store, one task reads them all.
    pub fn defer_once(
        &mut self,
        rule: &'static RuleDescriptor,
        task: impl for<'a> FnOnce(&mut RunContext<'a>) -> EngineResult<()> + Send + 'static,
    ) {
        if self.deferred_once.insert(rule.code) {
            self.defer(rule, task);
        }
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Record a diagnostic for `rule` at `span`.
    ///
    /// Applies severity settings (`Allow` reports nothing), the suppression
    /// backstop, location validation, and `(rule, span)` de-duplication.
    pub fn report(&mut self, rule: &'static RuleDescriptor, span: Span, message: impl Into<String>) {
        self.report_inner(rule, span, message.into(), None);
    }

    /// Record a diagnostic anchored at a node.
    pub fn report_node(
        &mut self,
        rule: &'static RuleDescriptor,
        node: Node<'_>,
        message: impl Into<String>,
    ) {
        self.report_inner(rule, node.span(), message.into(), None);
    }

    /// Record a diagnostic with an attached help text.
    pub fn report_with_help(
        &mut self,
        rule: &'static RuleDescriptor,
        span: Span,
        message: impl Into<String>,
        help: impl Into<String>,
    ) {
        self.report_inner(rule, span, message.into(), Some(help.into()));
    }

    fn report_inner(
        &mut self,
        rule: &'static RuleDescriptor,
        span: Span,
        message: String,
        help: Option<String>,
    ) {
        let severity = self
            .settings
            .severity_for(rule.code)
            .unwrap_or(rule.severity);
        if severity == Severity::Allow {
            return;
        }

        if span.start > span.end || span.end > self.source.len() {
            crate::trace_warn!(
                rule = rule.code,
                span = %span,
                "dropping diagnostic anchored outside the analyzed source"
            );
            return;
        }

        if self.suppression.is_suppressed(span, rule.code) {
            return;
        }

        if !self.seen.insert((rule.code, span)) {
            return;
        }

        self.diagnostics.push(Diagnostic {
            rule,
            severity,
            file: self.path.map(str::to_owned),
            span,
            message,
            help,
        });
    }

    /// Engine-level diagnostic (crash, protocol violation). Bypasses
    /// settings, suppression and de-duplication so failures always surface.
    pub(crate) fn report_engine(
        &mut self,
        rule: &'static RuleDescriptor,
        span: Span,
        message: String,
    ) {
        self.diagnostics.push(Diagnostic {
            rule,
            severity: rule.severity,
            file: self.path.map(str::to_owned),
            span,
            message,
            help: None,
        });
    }

    // ------------------------------------------------------------------
    // Engine plumbing
    // ------------------------------------------------------------------

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn take_deferred(&mut self) -> Option<DeferredTask> {
        self.deferred.pop_front()
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

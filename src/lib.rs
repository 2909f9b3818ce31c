//! Core lint rule engine over frontend-supplied syntax trees.
//!
//! The crate exposes a [`RuleEngine`] that runs a registry of rules over one
//! [`tree::SyntaxTree`] per call: a single shared traversal dispatches node
//! callbacks by kind, two-phase rules get a dedicated fact-collection
//! traversal first, and post-run rules compare their observations in deferred
//! tasks drained after the final traversal. Diagnostics come back as an
//! ordered, de-duplicated list; fixes are computed separately by
//! [`fixer::compute_fixes`] and applied by the caller.
//!
//! Parsing is not this crate's job: a frontend lowers its parse result into
//! the tree model of [`tree`] and optionally supplies a [`tree::TypeOracle`]
//! for the minority of rules that ask about static types.

// Callback and deferred-task signatures are spelled out once and boxed.
#![allow(clippy::type_complexity)]

pub mod batch;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod fix;
pub mod fixer;
pub mod level;
pub mod rule;
pub mod suppression;
pub mod telemetry;
pub mod tree;

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::batch::BatchContext;
use crate::context::{Phase, RunContext};
use crate::diagnostics::{Diagnostic, RULE_CRASHED, RULE_PROTOCOL_VIOLATION};
use crate::dispatch::{Dispatcher, Hook, HookSet, Pass};
use crate::error::{EngineError, EngineResult, panic_message};
use crate::fixer::FixBatch;
use crate::rule::{RuleDescriptor, RuleRegistry, RuleSettings};
use crate::tree::{Node, Span, SyntaxTree, TypeOracle};

/// Per-run inputs beyond the tree and its source text.
pub struct RunOptions<'a> {
    /// Path recorded on diagnostics, if the caller has one.
    pub path: Option<&'a str>,
    /// Static-type oracle, if the frontend resolved types.
    pub types: Option<&'a dyn TypeOracle>,
    /// Batch context when this run is part of a cross-file batch.
    pub batch: Option<&'a mut BatchContext>,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            path: None,
            types: None,
            batch: None,
        }
    }
}

/// Engine orchestrating rule traversals over one tree at a time.
///
/// One engine is built per rule set and reused across files; each `run` call
/// is independent (see the concurrency note on [`batch::BatchContext`] for
/// the one shared structure).
pub struct RuleEngine {
    registry: RuleRegistry,
    settings: RuleSettings,
}

impl RuleEngine {
    /// Create a new engine with default rule settings.
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            settings: RuleSettings::default(),
        }
    }

    /// Create a new engine with explicit settings (e.g. from config).
    pub fn new_with_settings(registry: RuleRegistry, settings: RuleSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// Analyze one tree and return its diagnostics.
    pub fn run(&self, tree: &SyntaxTree, source: &str) -> EngineResult<Vec<Diagnostic>> {
        self.run_with(tree, source, RunOptions::default())
    }

    /// Analyze one tree with explicit run options.
    ///
    /// The returned list is best-effort and deterministic: a crashing rule
    /// degrades the output (its findings are missing and the crash surfaces
    /// as a reserved diagnostic) instead of aborting the run. Only hook
    /// registration problems abort.
    pub fn run_with(
        &self,
        tree: &SyntaxTree,
        source: &str,
        opts: RunOptions<'_>,
    ) -> EngineResult<Vec<Diagnostic>> {
        let mut dispatcher = Dispatcher::new();
        for rule in self.registry.rules() {
            let mut hooks = HookSet::for_rule(rule.descriptor());
            rule.hooks(&mut hooks);
            dispatcher.absorb(hooks)?;
        }

        let RunOptions {
            path,
            types,
            mut batch,
        } = opts;
        if let Some(b) = batch.as_deref_mut() {
            b.note_file();
        }
        let mut ctx = RunContext::new(tree, source, &self.settings, path, types, batch);
        let mut disabled: HashSet<&'static str> = HashSet::new();

        if dispatcher.needs_collect_pass() {
            crate::instrument_block!("collect", {
                ctx.set_phase(Phase::Collect);
                dispatcher.traverse(tree, Pass::Collect, |hook, node| {
                    invoke(hook, node, &mut ctx, &mut disabled);
                });
            });
        }

        crate::instrument_block!("evaluate", {
            ctx.set_phase(Phase::Main);
            dispatcher.traverse(tree, Pass::Main, |hook, node| {
                invoke(hook, node, &mut ctx, &mut disabled);
            });
        });

        crate::instrument_block!("deferred", {
            ctx.set_phase(Phase::Deferred);
            while let Some(task) = ctx.take_deferred() {
                let rule = task.rule;
                if disabled.contains(rule.code) {
                    continue;
                }
                let run = task.run;
                let outcome = catch_unwind(AssertUnwindSafe(|| run(&mut ctx)));
                settle(rule, None, outcome, &mut ctx, &mut disabled);
            }
        });

        Ok(ctx.into_diagnostics())
    }

    /// Compute fixes for diagnostics produced by this engine's rules.
    pub fn compute_fixes(
        &self,
        diagnostics: &[Diagnostic],
        tree: &SyntaxTree,
        source: &str,
        allow_unsafe: bool,
    ) -> FixBatch {
        fixer::compute_fixes(&self.registry, diagnostics, tree, source, allow_unsafe)
    }
}

/// Invoke one callback with failure isolation.
fn invoke(
    hook: &Hook,
    node: Node<'_>,
    ctx: &mut RunContext<'_>,
    disabled: &mut HashSet<&'static str>,
) {
    if disabled.contains(hook.rule.code) {
        return;
    }
    let outcome = catch_unwind(AssertUnwindSafe(|| hook.call(node, ctx)));
    settle(hook.rule, Some(node.span()), outcome, ctx, disabled);
}

/// Translate a callback outcome into engine diagnostics / rule disabling.
fn settle(
    rule: &'static RuleDescriptor,
    at: Option<Span>,
    outcome: Result<EngineResult<()>, Box<dyn std::any::Any + Send>>,
    ctx: &mut RunContext<'_>,
    disabled: &mut HashSet<&'static str>,
) {
    let span = at.unwrap_or(Span::new(0, 0));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(EngineError::ProtocolViolation { fact })) => {
            disabled.insert(rule.code);
            crate::trace_warn!(
                rule = rule.code,
                fact,
                "disabling rule after premature fact read"
            );
            ctx.report_engine(
                &RULE_PROTOCOL_VIOLATION,
                span,
                format!(
                    "rule `{}` read fact bucket `{fact}` before collection finished; \
                     its remaining callbacks are disabled for this run",
                    rule.code
                ),
            );
        }
        Ok(Err(err)) => {
            ctx.report_engine(
                &RULE_CRASHED,
                span,
                format!("rule `{}` failed at {span}: {err}", rule.code),
            );
        }
        Err(payload) => {
            ctx.report_engine(
                &RULE_CRASHED,
                span,
                format!(
                    "rule `{}` panicked at {span}: {}",
                    rule.code,
                    panic_message(payload.as_ref())
                ),
            );
        }
    }
}

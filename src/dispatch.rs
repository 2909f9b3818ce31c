//! Node-kind callback dispatch.
//!
//! Callbacks are bucketed by [`NodeKind`], so a traversal visiting N nodes
//! with R interested rules per node costs O(N·R) — a kind nobody registered
//! for costs one bucket-lookup miss. The dispatcher has no error policy of
//! its own: the engine wraps every invocation (see `RuleEngine::run_with`).

use crate::context::RunContext;
use crate::error::EngineResult;
use crate::rule::{Protocol, RuleDescriptor};
use crate::tree::{Node, NodeKind, SyntaxTree};
use std::collections::HashMap;

/// Which traversal a callback runs in.
///
/// Phase-1 callbacks of two-phase rules run in `Collect`; everything else —
/// single-pass, post-run, and phase-2 callbacks — runs in `Main`, where the
/// fact store is already sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Pass {
    Collect,
    Main,
}

/// Callback invoked once per node of the registered kind.
pub type RuleCallback =
    Box<dyn Fn(Node<'_>, &mut RunContext<'_>) -> EngineResult<()> + Send + Sync>;

enum HookEntry {
    /// Two-phase pass 1 (fact collection).
    Collect(NodeKind, RuleCallback),
    /// Two-phase pass 2 (decision).
    Evaluate(NodeKind, RuleCallback),
    /// Single-pass / post-run observation.
    Node(NodeKind, RuleCallback),
}

/// Registrar handed to [`crate::rule::Rule::hooks`].
///
/// Single-pass and post-run rules use [`HookSet::on`]; two-phase rules use
/// [`HookSet::on_collect`] and [`HookSet::on_evaluate`]. Mixing the two
/// styles is rejected when the rule is absorbed into the dispatcher.
pub struct HookSet {
    rule: &'static RuleDescriptor,
    entries: Vec<HookEntry>,
}

impl HookSet {
    pub(crate) fn for_rule(rule: &'static RuleDescriptor) -> Self {
        Self {
            rule,
            entries: Vec::new(),
        }
    }

    /// Register a callback for every node of `kind`.
    pub fn on(
        &mut self,
        kind: NodeKind,
        callback: impl Fn(Node<'_>, &mut RunContext<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) {
        self.entries.push(HookEntry::Node(kind, Box::new(callback)));
    }

    /// Register a fact-collection callback (two-phase rules, pass 1).
    pub fn on_collect(
        &mut self,
        kind: NodeKind,
        callback: impl Fn(Node<'_>, &mut RunContext<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) {
        self.entries
            .push(HookEntry::Collect(kind, Box::new(callback)));
    }

    /// Register a decision callback (two-phase rules, pass 2).
    pub fn on_evaluate(
        &mut self,
        kind: NodeKind,
        callback: impl Fn(Node<'_>, &mut RunContext<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) {
        self.entries
            .push(HookEntry::Evaluate(kind, Box::new(callback)));
    }
}

/// A registered callback together with its owning rule.
pub(crate) struct Hook {
    pub(crate) rule: &'static RuleDescriptor,
    callback: RuleCallback,
}

impl Hook {
    pub(crate) fn call(&self, node: Node<'_>, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        (self.callback)(node, ctx)
    }
}

/// Kind-bucketed callback table driving the shared traversals.
pub(crate) struct Dispatcher {
    hooks: Vec<Hook>,
    collect: HashMap<NodeKind, Vec<usize>>,
    main: HashMap<NodeKind, Vec<usize>>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            hooks: Vec::new(),
            collect: HashMap::new(),
            main: HashMap::new(),
        }
    }

    /// Absorb one rule's hooks, validating them against its protocol.
    pub(crate) fn absorb(&mut self, set: HookSet) -> EngineResult<()> {
        use crate::error::EngineError;

        let rule = set.rule;
        for entry in set.entries {
            let (pass, kind, callback, phased_style) = match entry {
                HookEntry::Collect(kind, cb) => (Pass::Collect, kind, cb, true),
                HookEntry::Evaluate(kind, cb) => (Pass::Main, kind, cb, true),
                HookEntry::Node(kind, cb) => (Pass::Main, kind, cb, false),
            };

            if (rule.protocol == Protocol::TwoPhase) != phased_style {
                let reason = if phased_style {
                    format!(
                        "{} rules cannot register collection or evaluation callbacks",
                        rule.protocol.as_str()
                    )
                } else {
                    "two-phase rules must register collection/evaluation callbacks".to_string()
                };
                return Err(EngineError::Registration {
                    rule: rule.code,
                    reason,
                });
            }

            let index = self.hooks.len();
            self.hooks.push(Hook { rule, callback });
            let buckets = match pass {
                Pass::Collect => &mut self.collect,
                Pass::Main => &mut self.main,
            };
            buckets.entry(kind).or_default().push(index);
        }

        Ok(())
    }

    /// Whether any rule registered a collection callback, i.e. whether the
    /// engine must run a dedicated first traversal.
    pub(crate) fn needs_collect_pass(&self) -> bool {
        !self.collect.is_empty()
    }

    /// Visit every node exactly once, pre-order (parent before children,
    /// siblings in source order), invoking `visit` for each callback
    /// registered for the node's kind, in registration order.
    pub(crate) fn traverse(
        &self,
        tree: &SyntaxTree,
        pass: Pass,
        mut visit: impl FnMut(&Hook, Node<'_>),
    ) {
        let buckets = match pass {
            Pass::Collect => &self.collect,
            Pass::Main => &self.main,
        };
        if buckets.is_empty() {
            return;
        }

        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            if let Some(indices) = buckets.get(&node.kind()) {
                for &i in indices {
                    visit(&self.hooks[i], node);
                }
            }
            for child in node.children().rev() {
                stack.push(child);
            }
        }
    }
}

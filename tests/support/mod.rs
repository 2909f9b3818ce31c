//! Shared helpers for the integration tests: a tiny tree "frontend" that
//! lowers literal source strings into syntax trees by substring search, plus
//! a handful of sample rules standing in for an external rule catalog.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use treelint::context::RunContext;
use treelint::diagnostics::Diagnostic;
use treelint::dispatch::HookSet;
use treelint::fix::Edit;
use treelint::fixer;
use treelint::rule::{FixAvailability, Rule, RuleCategory, RuleDescriptor};
use treelint::tree::{
    Node, NodeId, NodeKind, Span, SyntaxTree, TreeBuilder, TypeDescriptor, TypeOracle,
};

// ----------------------------------------------------------------------
// Tree construction helpers
// ----------------------------------------------------------------------

/// Span of the `nth` occurrence of `needle` in `source` (0-based).
pub fn sp(source: &str, needle: &str, nth: usize) -> Span {
    let mut from = 0usize;
    let mut remaining = nth;
    loop {
        let at = source[from..]
            .find(needle)
            .unwrap_or_else(|| panic!("needle `{needle}` occurrence {nth} not found"));
        let abs = from + at;
        if remaining == 0 {
            return Span::new(abs, abs + needle.len());
        }
        remaining -= 1;
        from = abs + 1;
    }
}

/// Builds trees over a literal source string, locating node spans by
/// substring occurrence so tests never hard-code byte offsets.
pub struct TreeMaker<'s> {
    pub source: &'s str,
    builder: TreeBuilder,
}

impl<'s> TreeMaker<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            builder: TreeBuilder::new(Span::new(0, source.len())),
        }
    }

    pub fn root(&self) -> NodeId {
        self.builder.root()
    }

    pub fn node(&mut self, parent: NodeId, kind: NodeKind, needle: &str, nth: usize) -> NodeId {
        let span = sp(self.source, needle, nth);
        self.builder.add(parent, kind, span).expect("valid test node")
    }

    /// Lower a call expression: callee identifier plus comma-separated
    /// arguments classified as string / number literals or identifiers.
    pub fn call(&mut self, parent: NodeId, text: &str, nth: usize) -> NodeId {
        let span = sp(self.source, text, nth);
        let call = self
            .builder
            .add(parent, NodeKind::Call, span)
            .expect("valid call node");

        let open = text.find('(').expect("call text has an argument list");
        let callee = Span::new(span.start, span.start + open);
        self.builder
            .add(call, NodeKind::Identifier, callee)
            .expect("valid callee node");

        let close = text.rfind(')').expect("call text has a closing paren");
        let inner = &text[open + 1..close];
        let inner_base = span.start + open + 1;
        let mut cursor = 0usize;
        for raw in inner.split(',') {
            let arg = raw.trim();
            if arg.is_empty() {
                continue;
            }
            let at = inner[cursor..]
                .find(arg)
                .expect("argument text within call text")
                + cursor;
            let arg_span = Span::new(inner_base + at, inner_base + at + arg.len());
            self.builder
                .add(call, classify_arg(arg), arg_span)
                .expect("valid argument node");
            cursor = at + arg.len();
        }

        call
    }

    pub fn finish(self) -> SyntaxTree {
        self.builder.finish()
    }
}

fn classify_arg(arg: &str) -> NodeKind {
    if arg.starts_with('"') {
        NodeKind::StringLiteral
    } else if arg.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        NodeKind::NumberLiteral
    } else {
        NodeKind::Identifier
    }
}

/// Lower the common `fn name(...) { calls... }` shape: a function
/// declaration with its name identifier, body block, and the given call
/// texts (each with its occurrence index in the whole source).
pub fn lower_fn(
    t: &mut TreeMaker<'_>,
    decl: &str,
    name: &str,
    name_nth: usize,
    calls: &[(&str, usize)],
) -> (NodeId, NodeId) {
    let root = t.root();
    let f = t.node(root, NodeKind::FunctionDecl, decl, 0);
    t.node(f, NodeKind::Identifier, name, name_nth);
    let brace = decl.find('{').expect("function decl has a body");
    let block = t.node(f, NodeKind::Block, &decl[brace..], 0);
    for (call, nth) in calls {
        t.call(block, call, *nth);
    }
    (f, block)
}

/// Type oracle backed by an explicit node → type map.
#[derive(Default)]
pub struct MapOracle {
    types: HashMap<NodeId, TypeDescriptor>,
}

impl MapOracle {
    #[must_use]
    pub fn with(mut self, node: NodeId, ty: TypeDescriptor) -> Self {
        self.types.insert(node, ty);
        self
    }
}

impl TypeOracle for MapOracle {
    fn static_type(&self, node: NodeId) -> Option<TypeDescriptor> {
        self.types.get(&node).cloned()
    }
}

// ----------------------------------------------------------------------
// Shared rule helpers
// ----------------------------------------------------------------------

pub fn function_name<'s>(node: Node<'_>, ctx: &RunContext<'s>) -> Option<&'s str> {
    node.first_child_of_kind(NodeKind::Identifier)
        .map(|id| ctx.text(id))
}

pub fn callee_name<'s>(call: Node<'_>, ctx: &RunContext<'s>) -> Option<&'s str> {
    call.first_child_of_kind(NodeKind::Identifier)
        .map(|id| ctx.text(id))
}

fn calls_within<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    node.descendants().filter(|n| n.kind() == NodeKind::Call)
}

// ----------------------------------------------------------------------
// missing_assertion (two-phase)
// ----------------------------------------------------------------------

const ASSERTING_FUNCTIONS: &str = "asserting_functions";

pub static MISSING_ASSERTION: RuleDescriptor = RuleDescriptor::two_phase(
    "missing_assertion",
    RuleCategory::TestQuality,
    "test body performs no assertion, directly or through a local helper",
);

/// Flags `test_*` functions whose body neither asserts directly nor calls a
/// locally declared helper that asserts. Needs two phases so a helper
/// declared after its caller still counts.
pub struct MissingAssertionRule;

impl Rule for MissingAssertionRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &MISSING_ASSERTION
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on_collect(NodeKind::FunctionDecl, |node, ctx| {
            let Some(name) = function_name(node, ctx) else {
                return Ok(());
            };
            let asserts = calls_within(node)
                .any(|call| callee_name(call, ctx).is_some_and(|c| c.starts_with("assert")));
            if asserts {
                ctx.fact::<HashSet<String>>(ASSERTING_FUNCTIONS)
                    .insert(name.to_owned());
            }
            Ok(())
        });

        hooks.on_evaluate(NodeKind::FunctionDecl, |node, ctx| {
            let Some(name) = function_name(node, ctx) else {
                return Ok(());
            };
            if !name.starts_with("test_") {
                return Ok(());
            }
            let helpers: HashSet<String> = ctx
                .collected::<HashSet<String>>(ASSERTING_FUNCTIONS)?
                .cloned()
                .unwrap_or_default();
            let asserted = calls_within(node)
                .filter_map(|call| callee_name(call, ctx))
                .any(|c| c.starts_with("assert") || helpers.contains(c));
            if !asserted {
                ctx.report_node(
                    &MISSING_ASSERTION,
                    node,
                    format!("test `{name}` performs no assertion"),
                );
            }
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------
// duplicate_handler (single-pass, fact-assisted)
// ----------------------------------------------------------------------

const HANDLER_REGISTRATIONS: &str = "handler_registrations";

pub static DUPLICATE_HANDLER: RuleDescriptor = RuleDescriptor::single_pass(
    "duplicate_handler",
    RuleCategory::Suspicious,
    "the same event type is registered more than once",
);

/// Reports every registration of an event type after the first, at the
/// repeated call site.
pub struct DuplicateHandlerRule;

impl Rule for DuplicateHandlerRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &DUPLICATE_HANDLER
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |node, ctx| {
            if callee_name(node, ctx) != Some("register_handler") {
                return Ok(());
            }
            let Some(event) = node
                .first_child_of_kind(NodeKind::StringLiteral)
                .map(|lit| ctx.text(lit).to_owned())
            else {
                return Ok(());
            };

            let registrations = ctx.fact::<HashMap<String, usize>>(HANDLER_REGISTRATIONS);
            let count = registrations.entry(event.clone()).or_insert(0);
            *count += 1;
            let duplicate = *count > 1;

            if duplicate {
                ctx.report_node(
                    &DUPLICATE_HANDLER,
                    node,
                    format!("handler for {event} already registered"),
                );
            }
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------
// fixed_screen_size (post-run)
// ----------------------------------------------------------------------

const SCREEN_SIZE_SITES: &str = "screen_size_sites";

pub static FIXED_SCREEN_SIZE: RuleDescriptor = RuleDescriptor::post_run(
    "fixed_screen_size",
    RuleCategory::TestQuality,
    "several call sites hard-code the same kind of fixed screen size",
);

/// Individually innocuous `set_screen_size(w, h)` calls suggest duplicated
/// test variants once a file has two or more; only the deferred task can see
/// the whole file, so all reporting happens there.
pub struct FixedScreenSizeRule;

impl Rule for FixedScreenSizeRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &FIXED_SCREEN_SIZE
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |node, ctx| {
            if callee_name(node, ctx) != Some("set_screen_size") {
                return Ok(());
            }
            if node.children_of_kind(NodeKind::NumberLiteral).count() < 2 {
                return Ok(());
            }
            let span = node.span();
            ctx.fact::<Vec<Span>>(SCREEN_SIZE_SITES).push(span);

            ctx.defer_once(&FIXED_SCREEN_SIZE, |ctx| {
                let sites: Vec<Span> = ctx
                    .collected::<Vec<Span>>(SCREEN_SIZE_SITES)?
                    .cloned()
                    .unwrap_or_default();
                if sites.len() >= 2 {
                    for site in sites {
                        ctx.report(
                            &FIXED_SCREEN_SIZE,
                            site,
                            "call site hard-codes a fixed screen size duplicated elsewhere in this file",
                        );
                    }
                }
                Ok(())
            });
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------
// unreleased_resource (post-run, with fix)
// ----------------------------------------------------------------------

const ACQUIRED_RESOURCES: &str = "acquired_resources";
const RELEASED_IN_FINALLY: &str = "released_in_finally";

pub static UNRELEASED_RESOURCE: RuleDescriptor = RuleDescriptor::post_run(
    "unreleased_resource",
    RuleCategory::Correctness,
    "acquired resource is not released in a finally block",
)
.with_fix(FixAvailability::safe(
    "insert a release call at the end of the enclosing block",
));

/// Pairs `acquire()` declarations with `release(name)` calls observed inside
/// `finally` blocks; anything unpaired is reported after traversal. The fix
/// appends a release call just before the enclosing block's closing brace.
pub struct ResourceCloseRule;

impl Rule for ResourceCloseRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &UNRELEASED_RESOURCE
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::VariableDecl, |node, ctx| {
            let acquires =
                calls_within(node).any(|call| callee_name(call, ctx) == Some("acquire"));
            if !acquires {
                return Ok(());
            }
            let Some(name) = node
                .first_child_of_kind(NodeKind::Identifier)
                .map(|id| ctx.text(id).to_owned())
            else {
                return Ok(());
            };
            let span = node.span();
            ctx.fact::<Vec<(String, Span)>>(ACQUIRED_RESOURCES)
                .push((name, span));

            ctx.defer_once(&UNRELEASED_RESOURCE, |ctx| {
                let acquired: Vec<(String, Span)> = ctx
                    .collected::<Vec<(String, Span)>>(ACQUIRED_RESOURCES)?
                    .cloned()
                    .unwrap_or_default();
                let released: HashSet<String> = ctx
                    .collected::<HashSet<String>>(RELEASED_IN_FINALLY)?
                    .cloned()
                    .unwrap_or_default();
                for (name, span) in acquired {
                    if !released.contains(&name) {
                        ctx.report(
                            &UNRELEASED_RESOURCE,
                            span,
                            format!("resource `{name}` is acquired but never released in a finally block"),
                        );
                    }
                }
                Ok(())
            });
            Ok(())
        });

        hooks.on(NodeKind::Call, |node, ctx| {
            if callee_name(node, ctx) != Some("release") {
                return Ok(());
            }
            if node.ancestor_of_kind(NodeKind::Finally).is_none() {
                return Ok(());
            }
            let Some(arg) = node
                .children_of_kind(NodeKind::Identifier)
                .nth(1)
                .map(|a| ctx.text(a).to_owned())
            else {
                return Ok(());
            };
            ctx.fact::<HashSet<String>>(RELEASED_IN_FINALLY).insert(arg);
            Ok(())
        });
    }

    fn fix(&self, diagnostic: &Diagnostic, tree: &SyntaxTree, source: &str) -> Option<Vec<Edit>> {
        let decl = tree
            .root()
            .descendants()
            .find(|n| n.kind() == NodeKind::VariableDecl && n.span() == diagnostic.span)?;
        let name = decl.first_child_of_kind(NodeKind::Identifier)?.text(source);
        let block = decl.ancestor_of_kind(NodeKind::Block)?;
        let anchor = fixer::before_closing_delimiter(source, block)?;
        Some(vec![Edit::insert(anchor, format!("release({name}); "))])
    }
}

// ----------------------------------------------------------------------
// unawaited_future (single-pass, type-oracle backed)
// ----------------------------------------------------------------------

pub static UNAWAITED_FUTURE: RuleDescriptor = RuleDescriptor::single_pass(
    "unawaited_future",
    RuleCategory::Correctness,
    "future-typed value is neither awaited nor returned",
);

pub struct UnawaitedFutureRule;

impl Rule for UnawaitedFutureRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &UNAWAITED_FUTURE
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |node, ctx| {
            let Some(ty) = ctx.static_type(node) else {
                return Ok(());
            };
            if !ty.is("Future") {
                return Ok(());
            }
            if node.ancestors().all(|a| a.kind() != NodeKind::Return) {
                ctx.report_node(
                    &UNAWAITED_FUTURE,
                    node,
                    "future is neither awaited nor returned",
                );
            }
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------
// stray_todo (single-pass, raw-text fallback)
// ----------------------------------------------------------------------

pub static STRAY_TODO: RuleDescriptor = RuleDescriptor::single_pass(
    "stray_todo",
    RuleCategory::Style,
    "source block contains a TODO marker",
);

/// The tree has no comment nodes, so this one falls back to scanning the raw
/// text slice of each block.
pub struct StrayTodoRule;

impl Rule for StrayTodoRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &STRAY_TODO
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Block, |node, ctx| {
            let text = ctx.text(node);
            if let Some(pos) = text.find("TODO") {
                let start = node.span().start + pos;
                ctx.report(
                    &STRAY_TODO,
                    Span::new(start, start + 4),
                    "stray TODO marker in committed code",
                );
            }
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------
// Deliberately misbehaving rules
// ----------------------------------------------------------------------

pub static ALWAYS_PANICS: RuleDescriptor = RuleDescriptor::single_pass(
    "always_panics",
    RuleCategory::Suspicious,
    "test rule whose callback always panics",
);

pub struct CrashingRule;

impl Rule for CrashingRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &ALWAYS_PANICS
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |_, _| panic!("boom"));
    }
}

pub static EAGER_READ: RuleDescriptor = RuleDescriptor::two_phase(
    "eager_read",
    RuleCategory::Suspicious,
    "test rule that reads a fact bucket during collection",
);

pub struct EagerReadRule;

impl Rule for EagerReadRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &EAGER_READ
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on_collect(NodeKind::Call, |_, ctx| {
            let _ = ctx.collected::<Vec<String>>("anything")?;
            Ok(())
        });
    }
}

pub static CLUMSY_FIX: RuleDescriptor = RuleDescriptor::single_pass(
    "clumsy_fix",
    RuleCategory::Style,
    "test rule whose fix generator yields overlapping edits",
)
.with_fix(FixAvailability::safe("rewrite the call"));

pub struct ClumsyFixRule;

impl Rule for ClumsyFixRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &CLUMSY_FIX
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |node, ctx| {
            ctx.report_node(&CLUMSY_FIX, node, "call should be rewritten");
            Ok(())
        });
    }

    fn fix(&self, diagnostic: &Diagnostic, _tree: &SyntaxTree, _source: &str) -> Option<Vec<Edit>> {
        let start = diagnostic.span.start;
        Some(vec![
            Edit::replace(start, start + 4, "x"),
            Edit::replace(start + 2, start + 6, "y"),
        ])
    }
}

pub static UPPERCASE_CALLEE: RuleDescriptor = RuleDescriptor::single_pass(
    "uppercase_callee",
    RuleCategory::Style,
    "callee names should be upper-case in this dialect",
)
.with_fix(FixAvailability::unsafe_fix("upper-case the callee"));

pub struct UppercaseCalleeRule;

impl Rule for UppercaseCalleeRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &UPPERCASE_CALLEE
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Call, |node, ctx| {
            let Some(callee) = callee_name(node, ctx) else {
                return Ok(());
            };
            if callee.chars().any(|c| c.is_ascii_lowercase()) {
                ctx.report_node(
                    &UPPERCASE_CALLEE,
                    node,
                    format!("callee `{callee}` should be upper-case"),
                );
            }
            Ok(())
        });
    }

    fn fix(&self, diagnostic: &Diagnostic, tree: &SyntaxTree, source: &str) -> Option<Vec<Edit>> {
        let call = tree
            .root()
            .descendants()
            .find(|n| n.kind() == NodeKind::Call && n.span() == diagnostic.span)?;
        let callee = call.first_child_of_kind(NodeKind::Identifier)?;
        let span = callee.span();
        Some(vec![Edit::replace(
            span.start,
            span.end,
            callee.text(source).to_uppercase(),
        )])
    }
}

// ----------------------------------------------------------------------
// singleton_never_reset (batch-scoped)
// ----------------------------------------------------------------------

const SINGLETON_RESET: &str = "singleton_reset";

pub static SINGLETON_NEVER_RESET: RuleDescriptor = RuleDescriptor::post_run(
    "singleton_never_reset",
    RuleCategory::TestQuality,
    "no file in the batch resets the shared singleton",
);

/// Cross-file rule: per-file runs record whether anything called
/// `reset_singleton()`; one batch finalization task checks the whole batch.
pub struct SingletonResetRule;

impl Rule for SingletonResetRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &SINGLETON_NEVER_RESET
    }

    fn hooks(&self, hooks: &mut HookSet) {
        hooks.on(NodeKind::Root, |_, ctx| {
            if let Some(batch) = ctx.batch() {
                batch.defer_once(&SINGLETON_NEVER_RESET, |facts, sink| {
                    let reset = facts.get::<bool>(SINGLETON_RESET).copied().unwrap_or(false);
                    if !reset {
                        sink.report(
                            &SINGLETON_NEVER_RESET,
                            None,
                            Span::new(0, 0),
                            "no file in this batch resets the shared singleton",
                        );
                    }
                });
            }
            Ok(())
        });

        hooks.on(NodeKind::Call, |node, ctx| {
            let is_reset = callee_name(node, ctx) == Some("reset_singleton");
            if is_reset && let Some(batch) = ctx.batch() {
                *batch.facts().entry::<bool>(SINGLETON_RESET) = true;
            }
            Ok(())
        });
    }
}

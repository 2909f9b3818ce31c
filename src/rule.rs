use crate::diagnostics::Diagnostic;
use crate::dispatch::HookSet;
use crate::fix::Edit;
use crate::level::Severity;
use crate::tree::SyntaxTree;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};

// ============================================================================
// Execution Protocols
// ============================================================================

/// How a rule's callbacks are scheduled across traversals.
///
/// - `SinglePass` rules decide per node, in one traversal.
/// - `TwoPhase` rules collect facts in a first traversal and evaluate in a
///   second; their evaluation callbacks see the complete fact set regardless
///   of declaration order in the file.
/// - `PostRun` rules observe nodes during the traversal and compare
///   observations in a deferred task after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    SinglePass,
    TwoPhase,
    PostRun,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::SinglePass => "single-pass",
            Protocol::TwoPhase => "two-phase",
            Protocol::PostRun => "post-run",
        }
    }
}

// ============================================================================
// Fix Availability Classification
// ============================================================================

/// Safety classification for auto-fixes.
///
/// - `Safe` fixes preserve runtime behavior exactly
/// - `Unsafe` fixes may change runtime behavior and require explicit opt-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixSafety {
    #[default]
    Safe,
    Unsafe,
}

impl FixSafety {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixSafety::Safe => "safe",
            FixSafety::Unsafe => "unsafe",
        }
    }
}

/// Descriptor for an auto-fix associated with a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixAvailability {
    /// Whether the rule implements a fix generator.
    pub available: bool,
    /// Safety classification of the fix.
    pub safety: FixSafety,
    /// Human-readable description of what the fix does.
    pub description: &'static str,
}

impl FixAvailability {
    /// Create a safe fix descriptor.
    pub const fn safe(description: &'static str) -> Self {
        Self {
            available: true,
            safety: FixSafety::Safe,
            description,
        }
    }

    /// Create an unsafe fix descriptor.
    pub const fn unsafe_fix(description: &'static str) -> Self {
        Self {
            available: true,
            safety: FixSafety::Unsafe,
            description,
        }
    }

    /// Indicate no fix is available.
    pub const fn none() -> Self {
        Self {
            available: false,
            safety: FixSafety::Safe,
            description: "",
        }
    }
}

// ============================================================================
// Rule Categories
// ============================================================================

/// High-level categories used to group rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleCategory {
    Style,
    Correctness,
    Suspicious,
    TestQuality,
    /// Reserved for diagnostics the engine emits about rules themselves.
    Internal,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Style => "style",
            RuleCategory::Correctness => "correctness",
            RuleCategory::Suspicious => "suspicious",
            RuleCategory::TestQuality => "test_quality",
            RuleCategory::Internal => "internal",
        }
    }
}

/// Static metadata describing a rule.
///
/// The engine threads the descriptor through to every diagnostic the rule
/// emits but never interprets category or description; only `code`,
/// `protocol`, `severity` and `fix` drive engine behavior.
#[derive(Debug)]
pub struct RuleDescriptor {
    pub code: &'static str,
    pub category: RuleCategory,
    pub description: &'static str,
    /// Default severity; per-run settings may override it.
    pub severity: Severity,
    /// Scheduling protocol for this rule's callbacks.
    pub protocol: Protocol,
    /// Auto-fix availability and safety classification.
    pub fix: FixAvailability,
}

impl RuleDescriptor {
    /// Helper to create a single-pass rule descriptor with no fix.
    pub const fn single_pass(
        code: &'static str,
        category: RuleCategory,
        description: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            description,
            severity: Severity::Warn,
            protocol: Protocol::SinglePass,
            fix: FixAvailability::none(),
        }
    }

    /// Helper to create a two-phase rule descriptor with no fix.
    pub const fn two_phase(
        code: &'static str,
        category: RuleCategory,
        description: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            description,
            severity: Severity::Warn,
            protocol: Protocol::TwoPhase,
            fix: FixAvailability::none(),
        }
    }

    /// Helper to create a post-run rule descriptor with no fix.
    pub const fn post_run(
        code: &'static str,
        category: RuleCategory,
        description: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            description,
            severity: Severity::Warn,
            protocol: Protocol::PostRun,
            fix: FixAvailability::none(),
        }
    }

    /// Override the default severity.
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a fix descriptor.
    pub const fn with_fix(mut self, fix: FixAvailability) -> Self {
        self.fix = fix;
        self
    }
}

/// A single rule that can inspect a syntax tree.
///
/// Rules are stateless; anything they need to remember between callbacks
/// lives in the run context's fact store.
pub trait Rule: Send + Sync {
    fn descriptor(&self) -> &'static RuleDescriptor;

    /// Register node callbacks according to this rule's protocol.
    fn hooks(&self, hooks: &mut HookSet);

    /// Generate the edits resolving `diagnostic`, if this rule carries a fix.
    ///
    /// Called by the fix engine after the run, only for diagnostics whose
    /// descriptor advertises an available fix. Must not mutate anything;
    /// returning edits that overlap or fall outside the source gets the fix
    /// rejected, not applied.
    fn fix(
        &self,
        _diagnostic: &Diagnostic,
        _tree: &SyntaxTree,
        _source: &str,
    ) -> Option<Vec<Edit>> {
        None
    }
}

/// Per-rule severity overrides derived from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSettings {
    severities: HashMap<String, Severity>,
}

impl RuleSettings {
    #[must_use]
    pub fn with_severities(mut self, severities: HashMap<String, Severity>) -> Self {
        self.severities.extend(severities);
        self
    }

    #[must_use]
    pub fn disable(mut self, disabled: impl IntoIterator<Item = String>) -> Self {
        for code in disabled {
            self.severities.insert(code, Severity::Allow);
        }
        self
    }

    /// Configured override for `code`, if any; callers fall back to the
    /// descriptor's default severity.
    pub fn severity_for(&self, code: &str) -> Option<Severity> {
        self.severities.get(code).copied()
    }
}

/// Ordered registry of the rules participating in a run.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.descriptor().code).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static RuleDescriptor> + '_ {
        self.rules.iter().map(|r| r.descriptor())
    }

    pub fn find_descriptor(&self, code: &str) -> Option<&'static RuleDescriptor> {
        self.descriptors().find(|d| d.code == code)
    }

    pub fn find_rule(&self, code: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.descriptor().code == code)
            .map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Narrow the registry by rule code.
    ///
    /// `only` keeps just the named rules (empty means all); `skip` and
    /// `disabled` drop the named ones.
    ///
    /// # Errors
    ///
    /// Returns an error if any name in `only`, `skip`, or `disabled` does not
    /// match a registered rule.
    pub fn filtered(self, only: &[String], skip: &[String], disabled: &[String]) -> Result<Self> {
        let known: HashSet<&'static str> = self.descriptors().map(|d| d.code).collect();
        for n in only.iter().chain(skip.iter()).chain(disabled.iter()) {
            if !known.contains(n.as_str()) {
                return Err(anyhow!("unknown rule: {n}"));
            }
        }

        let only_set: Option<HashSet<&str>> = if only.is_empty() {
            None
        } else {
            Some(only.iter().map(String::as_str).collect())
        };
        let skip_set: HashSet<&str> = skip
            .iter()
            .chain(disabled.iter())
            .map(String::as_str)
            .collect();

        let mut reg = Self::new();
        for rule in self.rules {
            let code = rule.descriptor().code;
            if let Some(ref only) = only_set
                && !only.contains(code)
            {
                continue;
            }
            if skip_set.contains(code) {
                continue;
            }
            reg.rules.push(rule);
        }

        Ok(reg)
    }
}

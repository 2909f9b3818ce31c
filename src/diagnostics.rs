use crate::level::Severity;
use crate::rule::{FixAvailability, Protocol, RuleCategory, RuleDescriptor};
use crate::tree::Span;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// A single finding produced by a run.
///
/// Immutable once emitted; outlives the run context that produced it.
#[derive(Debug, Clone)]
#[must_use]
pub struct Diagnostic {
    pub rule: &'static RuleDescriptor,
    pub severity: Severity,
    pub file: Option<String>,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn code(&self) -> &'static str {
        self.rule.code
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] ", self.severity.as_str(), self.rule.code)?;
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        write!(f, "{}: {}", self.span, self.message)
    }
}

// The descriptor serializes as its code; the rest of the descriptor is static
// catalog metadata consumers look up out of band.
impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Diagnostic", 6)?;
        s.serialize_field("rule_code", self.rule.code)?;
        s.serialize_field("severity", &self.severity)?;
        s.serialize_field("file", &self.file)?;
        s.serialize_field("location", &self.span)?;
        s.serialize_field("message", &self.message)?;
        s.serialize_field("help", &self.help)?;
        s.end()
    }
}

/// Reserved descriptor for a rule callback that panicked or returned an
/// internal error. Emitted by the engine itself so a crash degrades the
/// output instead of silently losing the rule's findings.
pub static RULE_CRASHED: RuleDescriptor = RuleDescriptor {
    code: "rule_crashed",
    category: RuleCategory::Internal,
    description: "A rule callback panicked or returned an internal error",
    severity: Severity::Error,
    protocol: Protocol::SinglePass,
    fix: FixAvailability::none(),
};

/// Reserved descriptor for a rule that read a fact bucket before collection
/// finished. The offending rule is disabled for the rest of the run.
pub static RULE_PROTOCOL_VIOLATION: RuleDescriptor = RuleDescriptor {
    code: "rule_protocol_violation",
    category: RuleCategory::Internal,
    description: "A rule read a fact bucket before collection finished",
    severity: Severity::Error,
    protocol: Protocol::SinglePass,
    fix: FixAvailability::none(),
};

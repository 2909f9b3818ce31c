use crate::tree::Span;
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Result alias for errors emitted by engine internals.
pub type EngineResult<T> = Result<T, EngineError>;

/// Structured error type for the engine subsystems.
///
/// Most variants are recovered inside a run (a crashing rule becomes a
/// reserved diagnostic, an invalid location is logged and dropped); only
/// registration problems abort `run` itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rule `{rule}` failed at {span}: {detail}")]
    RuleExecution {
        rule: &'static str,
        span: Span,
        detail: String,
    },

    #[error("location {span} is outside the analyzed source (len {source_len})")]
    InvalidLocation { span: Span, source_len: usize },

    #[error("fix contains overlapping edits at byte {offset}")]
    OverlappingEdits { offset: usize },

    #[error("fact bucket `{fact}` read before collection finished")]
    ProtocolViolation { fact: &'static str },

    #[error("rule `{rule}` registered invalid hooks: {reason}")]
    Registration { rule: &'static str, reason: String },

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Convert to anyhow::Error for interop with anyhow-based code.
    pub fn into_anyhow(self) -> AnyhowError {
        AnyhowError::new(self)
    }
}

impl From<AnyhowError> for EngineError {
    fn from(err: AnyhowError) -> Self {
        EngineError::other(err.to_string())
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

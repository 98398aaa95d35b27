//! Diagnostic error types for the interpreter.
//!
//! Each subsystem has its own error enum with miette `#[diagnostic]` derives so
//! a failure carries an error code and a hint about what to do next. The
//! top-level [`InterpError`] wraps them transparently and sorts every failure
//! into one of four [`ErrorCategory`] buckets, which decide whether the failure
//! becomes a chat notice or propagates as a bug.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::llm::LlmError;

/// Top-level error type for the interpreter.
#[derive(Debug, Error, Diagnostic)]
pub enum InterpError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error("classification failed: {message}")]
    #[diagnostic(
        code(interp::classify::malformed),
        help(
            "The generation service must answer with a single-field JSON object whose \
             value is one of the configured illocutionary forces. The message is dropped; \
             send it again or rephrase it."
        )
    )]
    Classification { response: String, message: String },

    #[error("no valid receiver among: {}", .names.join(", "))]
    #[diagnostic(
        code(interp::receivers::none_resolved),
        help("Every @mention named an agent the interpreter does not know. Check the agent names.")
    )]
    NoReceivers { names: Vec<String> },
}

/// Convenience alias for interpreter operations.
pub type InterpResult<T> = std::result::Result<T, InterpError>;

/// The failure taxonomy the interpreter boundary acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The embedding/generation backend could not be reached or timed out.
    Connectivity,
    /// The backend answered with something that does not fit the requested shape.
    MalformedResponse,
    /// A caller broke a precondition; this is a bug, not an external condition.
    InvariantViolation,
    /// A mentioned agent does not exist, or the addressed agents know
    /// nothing in the searched subspace.
    UnresolvedReceiver,
}

impl InterpError {
    /// Classify this error for the boundary policy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Vector(_) | Self::Schema(_) => ErrorCategory::InvariantViolation,
            Self::Term(_) | Self::Record(_) | Self::Classification { .. } => {
                ErrorCategory::MalformedResponse
            }
            Self::Space(SpaceError::Llm(e)) | Self::Llm(e) => e.category(),
            Self::Space(SpaceError::NoCandidates { .. }) | Self::NoReceivers { .. } => {
                ErrorCategory::UnresolvedReceiver
            }
            Self::Space(_) => ErrorCategory::InvariantViolation,
        }
    }

    /// Whether the boundary should report this as a chat-level notice
    /// instead of propagating it.
    pub fn is_reportable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::InvariantViolation)
    }
}

// ---------------------------------------------------------------------------
// Vector errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic, PartialEq)]
pub enum VectorError {
    #[error("vector length mismatch: {left} vs {right}")]
    #[diagnostic(
        code(interp::vector::length_mismatch),
        help(
            "Both vectors must come from the same embedding model. \
             Mixing models in one index is not supported; rebuild the index."
        )
    )]
    LengthMismatch { left: usize, right: usize },

    #[error("{side} vector has zero norm")]
    #[diagnostic(
        code(interp::vector::zero_norm),
        help("Cosine distance is undefined for the zero vector. The embedding backend returned an empty or all-zero vector.")
    )]
    ZeroNorm { side: &'static str },
}

/// Convenience alias for vector operations.
pub type VectorResult<T> = std::result::Result<T, VectorError>;

// ---------------------------------------------------------------------------
// Term errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TermError {
    #[error("syntax error: {message}")]
    #[diagnostic(
        code(interp::term::syntax),
        help("Terms use AgentSpeak syntax: `functor(arg, ...)`, atoms lower-case, variables upper-case, `_` for unbound.")
    )]
    Syntax {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },
}

impl TermError {
    pub(crate) fn syntax(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(src.len());
        let len = usize::from(offset < src.len());
        Self::Syntax {
            message: message.into(),
            src: src.to_string(),
            span: (offset, len).into(),
        }
    }
}

/// Convenience alias for term parsing.
pub type TermResult<T> = std::result::Result<T, TermError>;

// ---------------------------------------------------------------------------
// Record errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RecordError {
    #[error("response is not valid JSON: {message}")]
    #[diagnostic(
        code(interp::record::json),
        help("The generation service was asked for a JSON object matching a schema but answered with something else.")
    )]
    Json { message: String },

    #[error("expected a JSON object, found {found}")]
    #[diagnostic(
        code(interp::record::not_an_object),
        help("A term record is a flat object: {{\"functor\": ..., \"arg0\": ..., ...}}.")
    )]
    NotAnObject { found: String },

    #[error("record has no \"functor\" string")]
    #[diagnostic(
        code(interp::record::missing_functor),
        help("Every term record needs a \"functor\" key holding the predicate name.")
    )]
    MissingFunctor,

    #[error("invalid functor {value:?}")]
    #[diagnostic(
        code(interp::record::invalid_functor),
        help("Functors must be atoms: a lower-case letter followed by letters, digits or underscores.")
    )]
    InvalidFunctor { value: String },

    #[error("record is missing key \"{key}\"")]
    #[diagnostic(
        code(interp::record::missing_argument),
        help("Argument keys must be contiguous: arg0, arg1, ... up to the arity of the term.")
    )]
    MissingArgument { key: String },

    #[error("unexpected key \"{key}\" in record")]
    #[diagnostic(
        code(interp::record::unexpected_key),
        help("Only \"functor\" and \"argN\" keys are allowed.")
    )]
    UnexpectedKey { key: String },

    #[error("value of \"{key}\" cannot be converted to an argument: {message}")]
    #[diagnostic(
        code(interp::record::invalid_value),
        help("Argument values are strings, numbers, null, arrays, or nested term records.")
    )]
    InvalidValue { key: String, message: String },

    #[error("generated {found} does not fit {expected}: {reason}")]
    #[diagnostic(
        code(interp::record::schema_mismatch),
        help("The generated term must keep the functor and arity of the requested shape, and fill each argument with a kind the examples use.")
    )]
    SchemaMismatch {
        expected: String,
        found: String,
        reason: String,
    },
}

/// Convenience alias for term/record conversion.
pub type RecordResult<T> = std::result::Result<T, RecordError>;

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("cannot infer a schema from zero examples")]
    #[diagnostic(
        code(interp::schema::empty),
        help("Pass at least the nearest term itself as an example.")
    )]
    EmptyExamples,

    #[error("example {found} does not share the shape {expected}")]
    #[diagnostic(
        code(interp::schema::shape_mismatch),
        help("All examples must have the same functor and arity. Collect them with `EmbeddingSpace::examples`.")
    )]
    ShapeMismatch { expected: String, found: String },
}

/// Convenience alias for schema inference.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

// ---------------------------------------------------------------------------
// Embedding space errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SpaceError {
    #[error("unknown subspace \"{name}\"")]
    #[diagnostic(
        code(interp::space::unknown_subspace),
        help("The embedding space has exactly two subspaces: \"terms\" and \"plans\".")
    )]
    UnknownSubspace { name: String },

    #[error("no candidate in subspace {subspace} for agents [{}]", .agents.join(", "))]
    #[diagnostic(
        code(interp::space::no_candidates),
        help(
            "The addressed agents know nothing in this subspace. \
             Filter unknown agents before retrieval and make sure ingestion ran."
        )
    )]
    NoCandidates { subspace: String, agents: Vec<String> },

    #[error("embedding of {term} is zero or not finite")]
    #[diagnostic(
        code(interp::space::invalid_embedding),
        help("The embedding backend returned a vector that cannot be compared by cosine distance. Check the embedding model.")
    )]
    InvalidEmbedding { term: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),
}

/// Convenience alias for embedding space operations.
pub type SpaceResult<T> = std::result::Result<T, SpaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        let e: InterpError = VectorError::ZeroNorm { side: "left" }.into();
        assert_eq!(e.category(), ErrorCategory::InvariantViolation);
        assert!(!e.is_reportable());

        let e: InterpError = RecordError::MissingFunctor.into();
        assert_eq!(e.category(), ErrorCategory::MalformedResponse);

        let e: InterpError = LlmError::Unavailable {
            url: "http://127.0.0.1:1".into(),
        }
        .into();
        assert_eq!(e.category(), ErrorCategory::Connectivity);
        assert!(e.is_reportable());

        let e: InterpError = SpaceError::Llm(LlmError::ParseError {
            message: "bad".into(),
        })
        .into();
        assert_eq!(e.category(), ErrorCategory::MalformedResponse);

        let e = InterpError::NoReceivers {
            names: vec!["carol".into()],
        };
        assert_eq!(e.category(), ErrorCategory::UnresolvedReceiver);
        assert_eq!(e.to_string(), "no valid receiver among: carol");
    }

    #[test]
    fn syntax_error_span_is_clamped() {
        let e = TermError::syntax("p(", 10, "unexpected end of input");
        match e {
            TermError::Syntax { span, .. } => {
                assert_eq!(span.offset(), 2);
                assert_eq!(span.len(), 0);
            }
            _ => panic!("expected syntax error"),
        }
    }
}

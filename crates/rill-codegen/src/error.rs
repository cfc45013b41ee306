//! Code generation error types.

use rill_types::{ScopeError, Span, Type};
use thiserror::Error;

/// Errors that can occur during WASM code generation.
///
/// Compilation stops at the first error; no partial module is produced.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A construct the backend cannot lower.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// An identifier that resolves to nothing, or to the wrong kind of symbol.
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// A binary or logical node with no operands.
    #[error("cannot compile an empty {0} expression")]
    EmptyExpression(&'static str),

    #[error("unknown operator `{op}` for type {ty}")]
    UnknownOperator { op: &'static str, ty: Type },

    #[error("remainder is not defined for floating-point type {0}")]
    FloatRemainder(Type),

    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: Type, to: Type },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: Type,
        found: Type,
    },

    /// `break` or `continue` with no enclosing loop.
    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// A broken invariant inside the backend itself.
    #[error("internal codegen error: {0}")]
    Internal(String),

    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("{span}: {source}")]
    At {
        span: Span,
        #[source]
        source: Box<CodegenError>,
    },

    #[error("in `{name}`: {source}")]
    InFunction {
        name: String,
        #[source]
        source: Box<CodegenError>,
    },
}

impl CodegenError {
    /// Attach a source location, keeping the innermost one.
    pub fn at(self, span: Span) -> Self {
        match self {
            CodegenError::At { .. } | CodegenError::InFunction { .. } => self,
            _ if span.is_synthetic() => self,
            other => CodegenError::At {
                span,
                source: Box::new(other),
            },
        }
    }

    pub fn in_function(self, name: &str) -> Self {
        CodegenError::InFunction {
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// The error with location and function wrappers stripped.
    pub fn root_cause(&self) -> &CodegenError {
        match self {
            CodegenError::At { source, .. } | CodegenError::InFunction { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// Convenience alias for codegen results.
pub type CodegenResult<T> = Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_errors_name_the_position() {
        let err = CodegenError::OutsideLoop("break").at(Span::point(4, 9));
        assert_eq!(err.to_string(), "4:9: `break` outside of a loop");
    }

    #[test]
    fn innermost_location_wins() {
        let err = CodegenError::FloatRemainder(Type::F32)
            .at(Span::point(2, 1))
            .at(Span::point(1, 1));
        assert!(err.to_string().starts_with("2:1"));
    }

    #[test]
    fn root_cause_unwraps() {
        let err = CodegenError::UnknownOperator {
            op: "%",
            ty: Type::Str,
        }
        .at(Span::point(3, 3))
        .in_function("main");
        assert!(matches!(
            err.root_cause(),
            CodegenError::UnknownOperator { op: "%", .. }
        ));
        assert_eq!(
            err.to_string(),
            "in `main`: 3:3: unknown operator `%` for type str"
        );
    }
}

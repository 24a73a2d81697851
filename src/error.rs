//! Internal compiler errors. These are not user diagnostics: each one means
//! the type checker accepted something the middle end cannot handle, or that
//! a pass produced malformed LIR. Either way compilation of the module stops.
//!
//! User facing problems (unreachable code, uninitialized fields, ...) are
//! collected as [`crate::diagnostics::Diagnostic`]s instead.

use thiserror::Error;

use crate::span::Span;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A construct passed type checking but has no lowering yet
    #[error("lowering {construct} is not supported (at {span})")]
    Unsupported { construct: &'static str, span: Span },

    /// A pass observed LIR which breaks one of its structural invariants
    #[error("internal invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("while compiling {method}: {source}")]
    InMethod {
        method: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub fn unsupported(construct: &'static str, span: Span) -> Self {
        Self::Unsupported { construct, span }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Attaches the name of the method being compiled
    pub fn in_method(self, method: impl Into<String>) -> Self {
        match self {
            // only keep the innermost method name
            e @ Self::InMethod { .. } => e,
            e => Self::InMethod {
                method: method.into(),
                source: Box::new(e),
            },
        }
    }

    /// Strips any method context and returns the underlying error
    pub fn root(&self) -> &CompileError {
        match self {
            Self::InMethod { source, .. } => source.root(),
            e => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_context_is_not_nested() {
        let err = CompileError::invariant("dangling branch")
            .in_method("Foo.bar()")
            .in_method("Foo.baz()");

        assert_eq!(
            err.to_string(),
            "while compiling Foo.bar(): internal invariant violated: dangling branch"
        );
        assert!(matches!(err.root(), CompileError::InvariantViolation { .. }));
    }
}

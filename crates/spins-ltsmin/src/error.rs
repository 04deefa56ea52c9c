//! Fatal model construction errors.

use spins_ast::Span;
use thiserror::Error;

/// Errors that abort model construction. No partial model is produced.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{span}: {process}: run {proctype}() expects {expected} arguments, got {found}")]
    ArgumentCount {
        process: String,
        proctype: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("{span}: {process}: rendezvous on {channel} sends {sent} fields, receive expects {received}")]
    RendezvousArity {
        process: String,
        channel: String,
        sent: usize,
        received: usize,
        span: Span,
    },

    #[error("{span}: {process}: channel {channel} carries {expected} fields, operation has {found}")]
    MessageArity {
        process: String,
        channel: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("{span}: {process}: cannot resolve the buffer size of channel {channel}")]
    UnresolvedBufferSize {
        process: String,
        channel: String,
        span: Span,
    },

    #[error("{span}: {process}: channel parameter {param} is bound dynamically by several run expressions")]
    AmbiguousChannelBinding {
        process: String,
        param: String,
        span: Span,
    },

    #[error("{span}: {process}: unknown proctype {proctype}")]
    UnknownProctype {
        process: String,
        proctype: String,
        span: Span,
    },

    #[error("{span}: unknown variable #{var}")]
    UnknownVariable { var: usize, span: Span },

    #[error("{process}: unknown state #{state}")]
    UnknownState { process: String, state: usize },

    #[error("{span}: index {index} out of bounds for {variable}[{size}]")]
    IndexOutOfBounds {
        variable: String,
        index: i32,
        size: usize,
        span: Span,
    },

    #[error("{span}: {process}: {what} is not supported")]
    Unsupported {
        process: String,
        what: String,
        span: Span,
    },

    #[error("{span}: internal error: {message}")]
    Internal { message: String, span: Span },
}

impl BuildError {
    /// Source position of the offending construct.
    pub fn span(&self) -> Span {
        match self {
            BuildError::ArgumentCount { span, .. }
            | BuildError::RendezvousArity { span, .. }
            | BuildError::MessageArity { span, .. }
            | BuildError::UnresolvedBufferSize { span, .. }
            | BuildError::AmbiguousChannelBinding { span, .. }
            | BuildError::UnknownProctype { span, .. }
            | BuildError::UnknownVariable { span, .. }
            | BuildError::IndexOutOfBounds { span, .. }
            | BuildError::Unsupported { span, .. }
            | BuildError::Internal { span, .. } => *span,
            BuildError::UnknownState { .. } => Span::dummy(),
        }
    }

    /// The process the error was found in, where there is one.
    pub fn process(&self) -> Option<&str> {
        match self {
            BuildError::ArgumentCount { process, .. }
            | BuildError::RendezvousArity { process, .. }
            | BuildError::MessageArity { process, .. }
            | BuildError::UnresolvedBufferSize { process, .. }
            | BuildError::AmbiguousChannelBinding { process, .. }
            | BuildError::UnknownProctype { process, .. }
            | BuildError::UnknownState { process, .. }
            | BuildError::Unsupported { process, .. } => Some(process),
            _ => None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        BuildError::Internal {
            message: message.into(),
            span: Span::dummy(),
        }
    }

    pub(crate) fn unsupported(process: &str, what: impl Into<String>, span: Span) -> Self {
        BuildError::Unsupported {
            process: process.to_string(),
            what: what.into(),
            span,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_carries_position_and_process() {
        let e = BuildError::ArgumentCount {
            process: "main".into(),
            proctype: "worker".into(),
            expected: 2,
            found: 1,
            span: Span::new(7, 3),
        };
        assert_eq!(
            e.to_string(),
            "line 7, column 3: main: run worker() expects 2 arguments, got 1"
        );
        assert_eq!(e.span(), Span::new(7, 3));
        assert_eq!(e.process(), Some("main"));
    }

    #[test]
    fn test_internal_has_no_process() {
        let e = BuildError::internal("write to non-leaf");
        assert_eq!(e.process(), None);
        assert!(e.span().is_dummy());
    }
}

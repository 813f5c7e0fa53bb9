//! Error types for synth-core.

use thiserror::Error;

/// Result type alias using synth-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting synthetic lemmas.
///
/// Per-step outcomes (a rejected sentence, a degraded or discarded lemma) are
/// not errors; they are reported through `CommandOutcome` and `CommitOutcome`.
#[derive(Error, Debug)]
pub enum Error {
    /// Subprocess communication error
    #[error("Subprocess communication error: {0}")]
    SubprocessComm(String),

    /// The backend answered, but not in a way the caller can continue from
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Timeout during a backend round-trip
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A scope-close sentence with no open scope frame
    #[error("Malformed scope: `{command}` closes a scope that was never opened")]
    MalformedScope { command: String },

    /// S-expression parse failure
    #[error("S-expression parse error at byte {offset}: {message}")]
    SexpParse { message: String, offset: usize },

    /// Kernel term with a shape the term walker does not know
    #[error("Unhandled term shape: {0}")]
    UnhandledTerm(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error on input or output artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a malformed-scope error for the offending sentence.
    pub fn malformed_scope(command: impl Into<String>) -> Self {
        Self::MalformedScope {
            command: command.into(),
        }
    }

    /// Create an S-expression parse error.
    pub fn sexp_parse(message: impl Into<String>, offset: usize) -> Self {
        Self::SexpParse {
            message: message.into(),
            offset,
        }
    }

    /// Whether this error aborts the current file rather than a single step.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::MalformedScope { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_scope_message_names_command() {
        let err = Error::malformed_scope("End Foo.");
        assert!(err.to_string().contains("End Foo."));
        assert!(err.is_structural());
    }

    #[test]
    fn test_backend_error_is_not_structural() {
        assert!(!Error::backend("boom").is_structural());
        assert!(!Error::timeout(10).is_structural());
    }
}

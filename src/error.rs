//! Error types for kyromodel.
//!
//! All errors are strongly typed using thiserror. Declaration text failures
//! ([`SyntaxError`]) are kept apart from formula failures ([`FormulaError`])
//! and from semantic failures (references, cycles, bounds) so callers can tell
//! "fix the text" from "fix the model".

use thiserror::Error;

/// Lexing and parsing failures in declaration text.
///
/// Offsets are byte offsets into the declaration string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("Unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        offset: usize,
    },

    #[error("Unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("Invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("Unknown declaration kind '{kind}' at offset {offset}")]
    UnknownKind { kind: String, offset: usize },

    #[error("{kind} expects {expected} argument(s), got {found}")]
    InvalidArity {
        kind: String,
        expected: String,
        found: usize,
    },

    #[error("Malformed declaration at offset {offset}: {reason}")]
    Malformed { reason: String, offset: usize },
}

/// Failures compiling or evaluating a derived-parameter formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Malformed formula '{formula}' at offset {offset}: {reason}")]
    Syntax {
        formula: String,
        offset: usize,
        reason: String,
    },

    #[error("Formula '{formula}' references '{name}' which is not in its dependency list")]
    UnknownIdentifier { formula: String, name: String },

    #[error("Formula '{formula}' uses @{index} but only {available} dependencies are declared")]
    PositionalOutOfRange {
        formula: String,
        index: usize,
        available: usize,
    },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{name}' expects {expected} argument(s), got {found}")]
    FunctionArity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Formula '{formula}' evaluated to a non-finite value")]
    NonFinite { formula: String },

    #[error("Formula dependency '{name}' is not declared")]
    UndeclaredDependency { name: String },
}

/// Top-level error type for kyromodel.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Name '{name}' is already declared")]
    DuplicateName { name: String },

    #[error("Unknown {expected} '{name}'")]
    UnknownReference { name: String, expected: &'static str },

    #[error("Declaring '{name}' would create a dependency cycle")]
    Cycle { name: String },

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Composition error: {reason}")]
    Composition { reason: String },

    #[error("Invalid sample count {count}: must be positive")]
    InvalidSampleCount { count: usize },

    #[error("Sampler error: {reason}")]
    Sampler { reason: String },

    #[error("Unknown snapshot '{name}'")]
    UnknownSnapshot { name: String },

    #[error("Value {value} of '{name}' is outside its bounds [{lower}, {upper}]")]
    BoundsViolation {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Invalid range [{lower}, {upper}] for '{name}': lower bound exceeds upper bound")]
    InvalidRange { name: String, lower: f64, upper: f64 },

    #[error("Parameter '{name}' is derived and cannot be set directly")]
    ReadOnlyParameter { name: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt artifact: {reason}")]
    CorruptArtifact { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ModelError {
    /// Creates an unknown-reference error.
    #[must_use]
    pub fn unknown(name: impl Into<String>, expected: &'static str) -> Self {
        Self::UnknownReference {
            name: name.into(),
            expected,
        }
    }

    /// Creates a composition error.
    #[must_use]
    pub fn composition(reason: impl Into<String>) -> Self {
        Self::Composition {
            reason: reason.into(),
        }
    }

    /// Creates a sampler error.
    #[must_use]
    pub fn sampler(reason: impl Into<String>) -> Self {
        Self::Sampler {
            reason: reason.into(),
        }
    }

    /// Creates a corrupt-artifact error.
    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            reason: reason.into(),
        }
    }

    /// Wraps an IO error with context.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if the declaration text itself was malformed.
    #[must_use]
    pub const fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_))
    }

    /// Returns true if this error is about a name that does not resolve,
    /// or resolves twice.
    #[must_use]
    pub const fn is_referential(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. }
                | Self::UnknownReference { .. }
                | Self::UnknownSnapshot { .. }
                | Self::Cycle { .. }
        )
    }

    /// Returns true for bound and range failures.
    #[must_use]
    pub const fn is_bounds_violation(&self) -> bool {
        matches!(self, Self::BoundsViolation { .. } | Self::InvalidRange { .. })
    }

    /// Returns true for persistence failures.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::CorruptArtifact { .. })
    }
}

/// Result type alias for kyromodel operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_message_carries_offset() {
        let err = SyntaxError::UnexpectedChar { ch: '$', offset: 7 };
        let msg = format!("{err}");
        assert!(msg.contains('$'));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_formula_error_positional() {
        let err = FormulaError::PositionalOutOfRange {
            formula: "@3*2".to_string(),
            index: 3,
            available: 1,
        };
        let msg = format!("{err}");
        assert!(msg.contains("@3"));
        assert!(msg.contains('1'));
    }

    #[test]
    fn test_model_error_from_syntax() {
        let err: ModelError = SyntaxError::UnexpectedEnd {
            expected: "')'".to_string(),
        }
        .into();
        assert!(err.is_syntax());
        assert!(!err.is_referential());
    }

    #[test]
    fn test_model_error_from_formula() {
        let err: ModelError = FormulaError::Empty.into();
        assert!(matches!(err, ModelError::Formula(FormulaError::Empty)));
    }

    #[test]
    fn test_referential_predicates() {
        assert!(ModelError::unknown("x", "parameter").is_referential());
        assert!(ModelError::DuplicateName { name: "x".into() }.is_referential());
        assert!(ModelError::Cycle { name: "x".into() }.is_referential());
        assert!(!ModelError::composition("nope").is_referential());
    }

    #[test]
    fn test_bounds_violation_message() {
        let err = ModelError::BoundsViolation {
            name: "m1".to_string(),
            value: 5.0,
            lower: -3.0,
            upper: 3.0,
        };
        assert!(err.is_bounds_violation());
        let msg = format!("{err}");
        assert!(msg.contains("m1"));
        assert!(msg.contains("[-3, 3]"));
    }

    #[test]
    fn test_io_error_is_persistence() {
        let err = ModelError::io(
            "opening artifact",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_persistence());
        assert!(format!("{err}").contains("opening artifact"));
    }
}

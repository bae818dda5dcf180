//! Error values surfaced by the front end.
//!
//! Every fallible compilation step returns [`ParseResult`]; the first error
//! terminates compilation of the whole unit. An [`Exception`] carries the
//! same observable surface a thrown JS error object would: the error class,
//! the message, `fileName`/`lineNumber` when a source position is known, and
//! a rendered `stack` string.

use std::fmt::{self, Display, Write};

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// Result type alias for front-end operations.
pub type ParseResult<T> = Result<T, Exception>;

/// Error classes surfaced by the front end.
///
/// Uses strum derives so the class name renders exactly as the matching JS
/// constructor name (e.g. `SyntaxError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
pub enum ExcKind {
    /// Lexical and grammatical errors, including resource limits that the
    /// language specification maps onto syntax errors ("stack overflow").
    SyntaxError,
    /// Engine-level resource exhaustion ("too many atoms") and host
    /// interruption ("interrupted").
    InternalError,
    /// Out-of-range values the front end enforces at parse time.
    RangeError,
    /// Unresolvable references detected during resolution.
    ReferenceError,
    /// Type rule violations detected at parse time.
    TypeError,
}

/// A thrown front-end error.
///
/// Exceptions are created through the helpers on this type (or through
/// `Parser::parse_error`, which fills in the source position and stack).
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    kind: ExcKind,
    message: String,
    file_name: Option<String>,
    line_number: Option<u32>,
    stack: String,
}

impl Exception {
    /// Creates an exception with no source position attached.
    #[must_use]
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_name: None,
            line_number: None,
            stack: String::new(),
        }
    }

    /// Creates a `SyntaxError`.
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ExcKind::SyntaxError, message)
    }

    /// Creates an `InternalError`, used for resource limits and interruption.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExcKind::InternalError, message)
    }

    /// Creates a `RangeError`.
    #[must_use]
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ExcKind::RangeError, message)
    }

    /// Attaches `fileName`/`lineNumber` and a single backtrace frame.
    ///
    /// The frame format matches what `build_backtrace` produces for a parse
    /// error: `    at <file>:<line>`.
    #[must_use]
    pub fn with_location(mut self, file_name: &str, line_number: u32) -> Self {
        self.file_name = Some(file_name.to_owned());
        self.line_number = Some(line_number);
        let mut stack = String::new();
        let _ = write!(stack, "    at {file_name}:{line_number}\n");
        self.stack = stack;
        self
    }

    /// Replaces the rendered stack string.
    pub fn set_stack(&mut self, stack: String) {
        self.stack = stack;
    }

    /// The error class.
    #[must_use]
    pub fn kind(&self) -> ExcKind {
        self.kind
    }

    /// The human-readable message naming the violated rule.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `fileName` the error was raised in, if a filename was provided.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The 1-based `lineNumber` of the first erroneous token.
    #[must_use]
    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// The rendered `stack` string (may be empty).
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if !self.stack.is_empty() {
            write!(f, "\n{}", self.stack.trim_end_matches('\n'))?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_stack() {
        let exc = Exception::syntax("unexpected token").with_location("a.js", 3);
        assert_eq!(exc.kind(), ExcKind::SyntaxError);
        assert_eq!(exc.line_number(), Some(3));
        assert_eq!(exc.file_name(), Some("a.js"));
        assert_eq!(exc.to_string(), "SyntaxError: unexpected token\n    at a.js:3");
    }

    #[test]
    fn kind_renders_constructor_name() {
        assert_eq!(ExcKind::InternalError.to_string(), "InternalError");
        assert_eq!(ExcKind::RangeError.to_string(), "RangeError");
    }
}

//! Event kinds and the facets derived from them.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a recorded event represents.
///
/// The set is closed: every consumer matches on it exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventKind {
    /// A constant was pushed (literal, `null`, class constant).
    Constant,
    /// A value was computed from operands (arithmetic, field or array read, cast).
    Value,
    /// An argument was bound to a parameter at method entry.
    Argument,
    /// A method was invoked.
    Invocation,
    /// A conditional branch was evaluated.
    Branch,
    /// A method body was entered.
    StartMethod,
    /// A method returned normally.
    Return,
    /// An exception was thrown.
    ExceptionThrown,
    /// An exception was caught by a handler.
    ExceptionCaught,
    /// An object or array was allocated.
    Instantiation,
    /// An object field was written.
    FieldDefinition,
    /// An array element was written.
    ArrayDefinition,
    /// A local variable was written.
    LocalDefinition,
    /// A static field was written.
    StaticDefinition,
}

impl EventKind {
    /// Returns a short name for the kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Value => "value",
            Self::Argument => "argument",
            Self::Invocation => "invocation",
            Self::Branch => "branch",
            Self::StartMethod => "start-method",
            Self::Return => "return",
            Self::ExceptionThrown => "exception-thrown",
            Self::ExceptionCaught => "exception-caught",
            Self::Instantiation => "instantiation",
            Self::FieldDefinition => "field-definition",
            Self::ArrayDefinition => "array-definition",
            Self::LocalDefinition => "local-definition",
            Self::StaticDefinition => "static-definition",
        }
    }

    /// Returns true for writes to fields, array elements, locals, and statics.
    #[must_use]
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            Self::FieldDefinition
                | Self::ArrayDefinition
                | Self::LocalDefinition
                | Self::StaticDefinition
        )
    }

    /// Returns true for argument bindings.
    #[must_use]
    pub fn is_argument(self) -> bool {
        matches!(self, Self::Argument)
    }

    /// Returns true for invocations.
    #[must_use]
    pub fn is_invocation(self) -> bool {
        matches!(self, Self::Invocation)
    }

    /// Returns true for conditional branches.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Branch)
    }

    /// Returns true for events with no literal source occurrence.
    #[must_use]
    pub fn is_artificial(self) -> bool {
        matches!(self, Self::Argument | Self::StartMethod)
    }

    /// Returns true for computed values.
    ///
    /// Constants are not computed values: they never have causes and
    /// never count as a terminal dependency.
    #[must_use]
    pub fn is_value_produced(self) -> bool {
        matches!(self, Self::Value)
    }

    /// Returns true for the non-value kinds a reader should stop at when
    /// unwinding data dependencies.
    #[must_use]
    pub fn is_terminal_kind(self) -> bool {
        self.is_definition()
            || matches!(
                self,
                Self::Argument | Self::Invocation | Self::Return | Self::Instantiation
            )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

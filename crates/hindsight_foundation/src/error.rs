//! Error types for Hindsight.
//!
//! A cause that cannot be found is a result, not an error. Errors are kept for
//! the one genuine fault class (trace data that was never captured) and for
//! lookups and batch operations that can fail.

use thiserror::Error;

use crate::id::{EventId, InstructionId};

/// Result type used across Hindsight crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Hindsight operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a "no value available" error for the given event.
    #[must_use]
    pub fn no_value(event: EventId) -> Self {
        Self::new(ErrorKind::NoValue(event))
    }

    /// Creates an unknown event error.
    #[must_use]
    pub fn unknown_event(event: EventId) -> Self {
        Self::new(ErrorKind::UnknownEvent(event))
    }

    /// Creates an unknown instruction error.
    #[must_use]
    pub fn unknown_instruction(instruction: InstructionId) -> Self {
        Self::new(ErrorKind::UnknownInstruction(instruction))
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled)
    }

    /// Returns true if this error means the trace holds no value for an event.
    #[must_use]
    pub fn is_no_value(&self) -> bool {
        matches!(self.kind, ErrorKind::NoValue(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The trace has no recorded value for the event (it was never captured).
    #[error("no value available for event {0}")]
    NoValue(EventId),

    /// The event id is outside the recorded trace.
    #[error("unknown event: {0}")]
    UnknownEvent(EventId),

    /// The instruction id is not part of the recorded program.
    #[error("unknown instruction: {0}")]
    UnknownInstruction(InstructionId),

    /// A batch operation was canceled by its caller.
    #[error("operation canceled")]
    Canceled,
}

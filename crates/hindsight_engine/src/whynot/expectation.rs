//! Constraints on which object an unexecuted instruction should have run for.

use std::collections::BTreeSet;

use hindsight_foundation::{EventId, InstructionId, ObjectId};
use hindsight_trace::{Program, TraceQuery};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which object the question is about.
///
/// `Object { argument: Some(p), .. }` pins operand `p` of the instruction
/// itself, and `Parameter` pins a parameter of the method containing it. The
/// other constrained forms apply to that method's receiver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Expectation {
    /// Any execution will do.
    #[default]
    Unconstrained,
    /// A specific object.
    Object {
        /// The expected object.
        object: ObjectId,
        /// Operand position the object must occupy, or `None` for the receiver.
        argument: Option<usize>,
    },
    /// A specific object passed as a parameter of the enclosing method.
    Parameter {
        /// The expected object.
        object: ObjectId,
        /// Parameter index, counting the receiver of instance methods as 0.
        index: usize,
    },
    /// Any one of a set of receivers.
    AnyOf(BTreeSet<ObjectId>),
}

/// Outcome of matching an invocation against an expectation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// The invocation ran for the expected object.
    Yes,
    /// The invocation ran for some other object.
    No,
    /// The relevant argument was never captured.
    Unknown,
}

impl Expectation {
    /// Creates a receiver expectation.
    #[must_use]
    pub fn receiver(object: ObjectId) -> Self {
        Self::Object {
            object,
            argument: None,
        }
    }

    /// Creates an expectation on one operand of the instruction.
    #[must_use]
    pub fn operand(object: ObjectId, position: usize) -> Self {
        Self::Object {
            object,
            argument: Some(position),
        }
    }

    /// Returns true if any execution satisfies this expectation.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained)
    }

    /// Translates an operand constraint to a parameter of the enclosing method.
    ///
    /// The result constrains invocations of that method and is a fixed point:
    /// every instruction of the method translates it to itself. Operands with
    /// no traceable parameter origin lose their constraint. Receiver
    /// constraints are vacuous for static methods.
    #[must_use]
    pub fn for_method_search(
        &self,
        program: &Program,
        instruction: InstructionId,
        is_static: bool,
    ) -> Self {
        match self {
            Self::Object {
                object,
                argument: Some(position),
            } => match program.parameter_source(instruction, *position) {
                Some(index) => Self::Parameter {
                    object: *object,
                    index,
                },
                None => Self::Unconstrained,
            },
            Self::Object { argument: None, .. } | Self::AnyOf(_) if is_static => {
                Self::Unconstrained
            }
            _ => self.clone(),
        }
    }

    /// Translates this expectation for the call sites of the enclosing method.
    ///
    /// A parameter index maps onto the same operand position of a call
    /// site. Receiver constraints pass through unchanged.
    #[must_use]
    pub fn for_callers(&self, program: &Program, instruction: InstructionId) -> Self {
        match self {
            Self::Object {
                object,
                argument: Some(position),
            } => match program.parameter_source(instruction, *position) {
                Some(index) => Self::operand(*object, index),
                None => Self::Unconstrained,
            },
            Self::Parameter { object, index } => Self::operand(*object, *index),
            _ => self.clone(),
        }
    }

    /// Returns the objects whose runtime class must dispatch to the method,
    /// if this method-search expectation pins the receiver.
    #[must_use]
    pub fn receivers(&self, is_static: bool) -> Vec<ObjectId> {
        if is_static {
            return Vec::new();
        }
        match self {
            Self::Object {
                object,
                argument: None,
            }
            | Self::Parameter { object, index: 0 } => vec![*object],
            Self::AnyOf(objects) => objects.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Matches the invocation started at `start` against this method-search
    /// expectation.
    #[must_use]
    pub fn matches(&self, trace: &dyn TraceQuery, start: EventId) -> Match {
        match self {
            Self::Unconstrained => Match::Yes,
            Self::Object { object, argument } => {
                match_argument(trace, start, argument.unwrap_or(0), |o| o == *object)
            }
            Self::Parameter { object, index } => {
                match_argument(trace, start, *index, |o| o == *object)
            }
            Self::AnyOf(objects) => match_argument(trace, start, 0, |o| objects.contains(&o)),
        }
    }
}

fn match_argument(
    trace: &dyn TraceQuery,
    start: EventId,
    position: usize,
    accept: impl Fn(ObjectId) -> bool,
) -> Match {
    match trace.argument(start, position) {
        Ok(object) if accept(object) => Match::Yes,
        Ok(_) => Match::No,
        Err(err) => {
            if !err.is_no_value() {
                tracing::warn!(%start, position, error = %err, "argument lookup failed");
            }
            Match::Unknown
        }
    }
}

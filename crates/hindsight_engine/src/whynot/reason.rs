//! Why an instruction did not execute.

use std::collections::BTreeSet;
use std::fmt;

use hindsight_foundation::{EventId, InstructionId, MethodId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The verdict on one unexecuted instruction, with the events or
/// instructions that support it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Reason {
    /// Not analysed yet. Never observed after explanation.
    #[default]
    Unexplained,
    /// The method has no feasible caller and is not an entry point.
    Unreachable {
        /// The unreachable method.
        method: MethodId,
    },
    /// The enclosing method never ran for the expected object.
    MethodDidNotExecute {
        /// The method.
        method: MethodId,
        /// Feasible call sites, each of which also did not execute.
        callers: BTreeSet<InstructionId>,
    },
    /// A guarding branch executed and went the other way.
    WrongWay {
        /// The branch execution.
        branch: EventId,
        /// Events that produced the values the branch tested.
        dependencies: Vec<EventId>,
    },
    /// None of the guarding branches executed.
    InstructionsBranchDidNotExecute {
        /// The guarding branch instructions.
        branches: BTreeSet<InstructionId>,
    },
    /// The instruction, or the call that should lead to it, did execute.
    DidExecute {
        /// The execution.
        event: EventId,
    },
    /// An exception cut the invocation short.
    ExceptionCaught {
        /// The catch or escaping exception event.
        event: EventId,
    },
    /// No reason could be established.
    UnknownReason,
}

/// The tag of a [`Reason`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReasonKind {
    /// See [`Reason::Unexplained`].
    Unexplained,
    /// See [`Reason::Unreachable`].
    Unreachable,
    /// See [`Reason::MethodDidNotExecute`].
    MethodDidNotExecute,
    /// See [`Reason::WrongWay`].
    WrongWay,
    /// See [`Reason::InstructionsBranchDidNotExecute`].
    InstructionsBranchDidNotExecute,
    /// See [`Reason::DidExecute`].
    DidExecute,
    /// See [`Reason::ExceptionCaught`].
    ExceptionCaught,
    /// See [`Reason::UnknownReason`].
    UnknownReason,
}

impl ReasonKind {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unexplained => "UNEXPLAINED",
            Self::Unreachable => "UNREACHABLE",
            Self::MethodDidNotExecute => "METHOD_DID_NOT_EXECUTE",
            Self::WrongWay => "WRONG_WAY",
            Self::InstructionsBranchDidNotExecute => "INSTRUCTIONS_BRANCH_DID_NOT_EXECUTE",
            Self::DidExecute => "DID_EXECUTE",
            Self::ExceptionCaught => "EXCEPTION_CAUGHT",
            Self::UnknownReason => "UNKNOWN_REASON",
        }
    }
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Reason {
    /// Returns the tag.
    #[must_use]
    pub fn kind(&self) -> ReasonKind {
        match self {
            Self::Unexplained => ReasonKind::Unexplained,
            Self::Unreachable { .. } => ReasonKind::Unreachable,
            Self::MethodDidNotExecute { .. } => ReasonKind::MethodDidNotExecute,
            Self::WrongWay { .. } => ReasonKind::WrongWay,
            Self::InstructionsBranchDidNotExecute { .. } => {
                ReasonKind::InstructionsBranchDidNotExecute
            }
            Self::DidExecute { .. } => ReasonKind::DidExecute,
            Self::ExceptionCaught { .. } => ReasonKind::ExceptionCaught,
            Self::UnknownReason => ReasonKind::UnknownReason,
        }
    }

    /// Returns true once the analysis assigned a verdict.
    #[must_use]
    pub fn is_explained(&self) -> bool {
        !matches!(self, Self::Unexplained)
    }

    /// Returns the recorded events this verdict rests on.
    #[must_use]
    pub fn deciding_events(&self) -> Vec<EventId> {
        match self {
            Self::WrongWay {
                branch,
                dependencies,
            } => std::iter::once(*branch)
                .chain(dependencies.iter().copied())
                .collect(),
            Self::DidExecute { event } | Self::ExceptionCaught { event } => vec![*event],
            _ => Vec::new(),
        }
    }

    /// Returns a sentence describing the verdict.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Unexplained => "not yet explained".to_string(),
            Self::Unreachable { method } => {
                format!("{method} has no feasible caller and is not an entry point")
            }
            Self::MethodDidNotExecute { method, callers } if callers.is_empty() => {
                format!("{method} was never invoked from outside the recorded code")
            }
            Self::MethodDidNotExecute { method, callers } => format!(
                "{method} did not execute because none of its {} callers did",
                callers.len()
            ),
            Self::WrongWay {
                branch,
                dependencies,
            } => format!(
                "branch {branch} went the other way, deciding on {}",
                join(dependencies)
            ),
            Self::InstructionsBranchDidNotExecute { branches } => format!(
                "no guarding branch executed ({})",
                branches
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::DidExecute { event } => format!("it executed at {event}"),
            Self::ExceptionCaught { event } => {
                format!("an exception interrupted the invocation at {event}")
            }
            Self::UnknownReason => "no reason found".to_string(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

fn join(events: &[EventId]) -> String {
    if events.is_empty() {
        return "constants".to_string();
    }
    events
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

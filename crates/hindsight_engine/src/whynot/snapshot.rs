//! Owned, deterministic snapshots of a question's graph.

use hindsight_foundation::{EventId, InstructionId};

use super::expectation::Expectation;
use super::question::{Question, UnexecutedId};
use super::reason::Reason;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The whole unexecuted-instruction graph of a question, in creation order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuestionSnapshot {
    /// The question's exclusive boundary.
    pub boundary: EventId,
    /// Every node.
    pub nodes: Vec<NodeSnapshot>,
}

/// One node of a [`QuestionSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeSnapshot {
    /// Node id.
    pub id: UnexecutedId,
    /// The instruction.
    pub instruction: InstructionId,
    /// The expectation.
    pub expectation: Expectation,
    /// The verdict.
    pub reason: Reason,
    /// Incoming neighbours, ascending.
    pub incoming: Vec<UnexecutedId>,
    /// Outgoing neighbours, ascending.
    pub outgoing: Vec<UnexecutedId>,
    /// Invocations of the method that ran for other objects.
    pub executions_on_other_objects: Vec<EventId>,
    /// The searched invocation, if the method ran.
    pub method_execution: Option<EventId>,
}

impl Question<'_> {
    /// Captures the graph as plain data.
    #[must_use]
    pub fn snapshot(&self) -> QuestionSnapshot {
        QuestionSnapshot {
            boundary: self.boundary(),
            nodes: self
                .nodes()
                .map(|node| NodeSnapshot {
                    id: node.id(),
                    instruction: node.instruction(),
                    expectation: node.expectation().clone(),
                    reason: node.reason().clone(),
                    incoming: node.incoming().collect(),
                    outgoing: node.outgoing().collect(),
                    executions_on_other_objects: node.executions_on_other_objects().to_vec(),
                    method_execution: node.method_execution(),
                })
                .collect(),
        }
    }
}

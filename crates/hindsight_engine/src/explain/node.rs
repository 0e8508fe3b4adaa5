//! Explanation nodes and their block variants.

use std::fmt;

use hindsight_foundation::{EventId, EventKind, InstructionId, LoopPathId, ThreadId};
use im::OrdMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of an explanation node inside its [`Answer`](super::Answer).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw index of this node.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    pub(crate) fn from_len(len: usize) -> Self {
        Self(u32::try_from(len).unwrap_or_else(|_| panic!("explanation arena overflow")))
    }

    pub(crate) const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Progress of a depth-first computation over a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Status {
    /// Not yet reached.
    #[default]
    Unvisited,
    /// Being computed; reentrant requests are no-ops.
    InProgress,
    /// Finished; the result is frozen.
    Done,
}

// =============================================================================
// Causes
// =============================================================================

/// How a cause was consumed by the event it explains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CauseSource {
    /// Produced the value of an operand.
    Operand {
        /// Operand position.
        position: usize,
        /// Instruction that produced the value.
        producer: InstructionId,
    },
    /// Last wrote the heap location the event read.
    Heap,
    /// Fed an argument to an uninstrumented call inside the invocation.
    Opaque,
}

/// One causal predecessor of an explained event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cause {
    /// Node explaining the cause.
    pub node: NodeId,
    /// The causing event.
    pub event: EventId,
    /// How the cause was consumed.
    pub source: CauseSource,
}

// =============================================================================
// Node Kinds
// =============================================================================

/// A maximal run of loop iterations that followed the same loop path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopRun {
    /// The shared path.
    pub path: LoopPathId,
    /// Branch blocks of the run, in event order.
    pub members: Vec<NodeId>,
}

/// The concrete variant of an explanation node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain event.
    Event,
    /// An invocation, grouping what happened because of the call.
    Invocation {
        /// True if the next event on the thread entered the callee.
        callee_instrumented: bool,
    },
    /// A branch execution.
    Branch {
        /// Memoized loop path: `None` until resolved.
        loop_path: Option<Option<LoopPathId>>,
    },
    /// An exception throw.
    Exception,
    /// A method entry.
    StartMethod,
    /// All iterations of one loop in one thread, keyed by the first
    /// execution of the loop's branch.
    Loop {
        /// Runs of same-path branch blocks among the members.
        runs: Vec<LoopRun>,
    },
    /// Root block of a thread.
    Thread {
        /// The thread.
        thread: ThreadId,
        /// Deepest block nesting seen beneath this block.
        max_depth: usize,
        /// Block at that depth.
        deepest: Option<NodeId>,
    },
}

impl NodeKind {
    /// Chooses the variant for an event of the given kind.
    #[must_use]
    pub fn for_event(kind: EventKind, callee_instrumented: bool) -> Self {
        match kind {
            EventKind::Invocation => Self::Invocation {
                callee_instrumented,
            },
            EventKind::Branch => Self::Branch { loop_path: None },
            EventKind::ExceptionThrown => Self::Exception,
            EventKind::StartMethod => Self::StartMethod,
            EventKind::Constant
            | EventKind::Value
            | EventKind::Argument
            | EventKind::Return
            | EventKind::ExceptionCaught
            | EventKind::Instantiation
            | EventKind::FieldDefinition
            | EventKind::ArrayDefinition
            | EventKind::LocalDefinition
            | EventKind::StaticDefinition => Self::Event,
        }
    }

    /// Returns true for every variant that groups members.
    #[must_use]
    pub fn is_block(&self) -> bool {
        !matches!(self, Self::Event)
    }

    /// Returns a short name for the variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Invocation { .. } => "invocation-block",
            Self::Branch { .. } => "branch-block",
            Self::Exception => "exception-block",
            Self::StartMethod => "start-method-block",
            Self::Loop { .. } => "loop-block",
            Self::Thread { .. } => "thread-block",
        }
    }
}

// =============================================================================
// Explanation
// =============================================================================

/// A lazily explained node wrapping one event.
///
/// Blocks are explanations too; their members are the explanations whose
/// control dependency they represent, ordered by event id.
#[derive(Clone, Debug)]
pub struct Explanation {
    pub(crate) id: NodeId,
    pub(crate) event: EventId,
    pub(crate) owner: Option<NodeId>,
    pub(crate) status: Status,
    pub(crate) causes: Option<Box<[Cause]>>,
    pub(crate) kind: NodeKind,
    pub(crate) members: OrdMap<EventId, NodeId>,
    pub(crate) depth: usize,
}

impl Explanation {
    pub(crate) fn new(id: NodeId, event: EventId, kind: NodeKind) -> Self {
        Self {
            id,
            event,
            owner: None,
            status: Status::Unvisited,
            causes: None,
            kind,
            members: OrdMap::new(),
            depth: 0,
        }
    }

    /// Creates a structural block, which has no causes of its own.
    pub(crate) fn structural(id: NodeId, event: EventId, kind: NodeKind) -> Self {
        Self {
            status: Status::Done,
            causes: Some(Vec::new().into_boxed_slice()),
            ..Self::new(id, event, kind)
        }
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the event this node explains (the anchor, for blocks).
    #[must_use]
    pub fn event(&self) -> EventId {
        self.event
    }

    /// Returns the block this node belongs to; only thread blocks have none.
    #[must_use]
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Returns the explanation status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns true once the causes are frozen.
    #[must_use]
    pub fn is_explained(&self) -> bool {
        self.status == Status::Done
    }

    /// Returns the causes, or `None` if the node has not been explained.
    ///
    /// An empty slice means the event has no causes, which is different from
    /// not being explained yet.
    #[must_use]
    pub fn try_causes(&self) -> Option<&[Cause]> {
        self.causes.as_deref()
    }

    /// Returns the causes.
    ///
    /// # Panics
    ///
    /// Panics if the node has not been explained yet.
    #[must_use]
    pub fn causes(&self) -> &[Cause] {
        match self.causes.as_deref() {
            Some(causes) => causes,
            None => panic!(
                "causes of {} requested while {:?}",
                self.event, self.status
            ),
        }
    }

    /// Returns the variant.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns true if this node groups members.
    #[must_use]
    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    /// Returns the members, ordered by event id (empty for plain events).
    #[must_use]
    pub fn members(&self) -> &OrdMap<EventId, NodeId> {
        &self.members
    }

    /// Returns the nesting depth of a block below its thread block.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true if this invocation entered instrumented code.
    #[must_use]
    pub fn callee_instrumented(&self) -> Option<bool> {
        match self.kind {
            NodeKind::Invocation {
                callee_instrumented,
            } => Some(callee_instrumented),
            _ => None,
        }
    }
}

//! The unexecuted-instruction graph of one "why didn't" question.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use hindsight_foundation::{Error, EventId, EventKind, InstructionId, MethodId, ObjectId, Result};
use hindsight_trace::{Instruction, Method, TraceQuery};

use crate::config::AnalysisConfig;
use crate::explain::Status;

use super::cancel::CancellationFlag;
use super::expectation::{Expectation, Match};
use super::reason::Reason;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of an [`UnexecutedInstruction`] inside its [`Question`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnexecutedId(pub(crate) u32);

impl UnexecutedId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    fn from_len(len: usize) -> Self {
        Self(u32::try_from(len).unwrap_or_else(|_| panic!("question arena overflow")))
    }

    const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for UnexecutedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnexecutedId({})", self.0)
    }
}

// =============================================================================
// Unexecuted Instruction
// =============================================================================

/// An instruction that did not execute for the expected object, and why.
#[derive(Clone, Debug)]
pub struct UnexecutedInstruction {
    id: UnexecutedId,
    instruction: InstructionId,
    expectation: Expectation,
    reason: Reason,
    status: Status,
    incoming: BTreeSet<UnexecutedId>,
    outgoing: BTreeSet<UnexecutedId>,
    executions_on_other_objects: Vec<EventId>,
    method_execution: Option<EventId>,
}

impl UnexecutedInstruction {
    fn new(id: UnexecutedId, instruction: InstructionId, expectation: Expectation) -> Self {
        Self {
            id,
            instruction,
            expectation,
            reason: Reason::Unexplained,
            status: Status::Unvisited,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            executions_on_other_objects: Vec::new(),
            method_execution: None,
        }
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> UnexecutedId {
        self.id
    }

    /// Returns the instruction.
    #[must_use]
    pub fn instruction(&self) -> InstructionId {
        self.instruction
    }

    /// Returns the expectation the question carries for this instruction.
    #[must_use]
    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    /// Returns the verdict; `Unexplained` until explained.
    #[must_use]
    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    /// Returns the analysis status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the nodes that could have caused this one, had they executed.
    pub fn incoming(&self) -> impl Iterator<Item = UnexecutedId> + '_ {
        self.incoming.iter().copied()
    }

    /// Returns the nodes this one could have caused.
    pub fn outgoing(&self) -> impl Iterator<Item = UnexecutedId> + '_ {
        self.outgoing.iter().copied()
    }

    /// Returns invocations of the enclosing method that ran for other objects.
    #[must_use]
    pub fn executions_on_other_objects(&self) -> &[EventId] {
        &self.executions_on_other_objects
    }

    /// Returns the invocation of the enclosing method that was searched.
    #[must_use]
    pub fn method_execution(&self) -> Option<EventId> {
        self.method_execution
    }
}

// =============================================================================
// Analysis plan
// =============================================================================

enum Analysis {
    Final(Reason),
    Callers {
        method: MethodId,
        callers: BTreeSet<InstructionId>,
        children: Vec<UnexecutedId>,
    },
    Guards {
        branches: BTreeSet<InstructionId>,
        children: Vec<UnexecutedId>,
    },
}

enum Pending {
    Callers {
        method: MethodId,
        callers: BTreeSet<InstructionId>,
    },
    Guards {
        branches: BTreeSet<InstructionId>,
    },
}

struct Frame {
    node: UnexecutedId,
    pending: Pending,
    children: Vec<UnexecutedId>,
    next: usize,
}

enum Execution {
    Found(EventId),
    Unknown,
    Missing,
}

// =============================================================================
// Question
// =============================================================================

/// A "why didn't this execute?" question over a trace.
///
/// Nodes are memoized by instruction and expectation, so each pair is
/// analysed once. Only events before the boundary are considered.
pub struct Question<'a> {
    trace: &'a dyn TraceQuery,
    config: AnalysisConfig,
    boundary: EventId,
    nodes: Vec<UnexecutedInstruction>,
    index: HashMap<(InstructionId, Expectation), UnexecutedId>,
}

impl<'a> Question<'a> {
    /// Creates a question considering events strictly before `boundary`.
    #[must_use]
    pub fn new(trace: &'a dyn TraceQuery, config: AnalysisConfig, boundary: EventId) -> Self {
        Self {
            trace,
            config,
            boundary,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the exclusive temporal boundary.
    #[must_use]
    pub fn boundary(&self) -> EventId {
        self.boundary
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a node.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this question.
    #[must_use]
    pub fn node(&self, id: UnexecutedId) -> &UnexecutedInstruction {
        &self.nodes[id.slot()]
    }

    /// Returns every node in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &UnexecutedInstruction> + '_ {
        self.nodes.iter()
    }

    /// Returns the node for an instruction and expectation, if created.
    #[must_use]
    pub fn lookup(
        &self,
        instruction: InstructionId,
        expectation: &Expectation,
    ) -> Option<UnexecutedId> {
        self.index.get(&(instruction, expectation.clone())).copied()
    }

    /// Returns the verdict of a node.
    #[must_use]
    pub fn reason(&self, id: UnexecutedId) -> &Reason {
        &self.node(id).reason
    }

    /// Returns the incoming neighbours of a node.
    pub fn incoming(&self, id: UnexecutedId) -> impl Iterator<Item = UnexecutedId> + '_ {
        self.node(id).incoming()
    }

    /// Returns the outgoing neighbours of a node.
    pub fn outgoing(&self, id: UnexecutedId) -> impl Iterator<Item = UnexecutedId> + '_ {
        self.node(id).outgoing()
    }

    /// Returns invocations of the node's method that ran for other objects.
    #[must_use]
    pub fn executions_on_other_objects(&self, id: UnexecutedId) -> &[EventId] {
        self.node(id).executions_on_other_objects()
    }

    /// Returns the node for an instruction and expectation, creating it unexplained.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownInstruction` error if the instruction is not part
    /// of the traced program.
    pub fn unexecuted(
        &mut self,
        instruction: InstructionId,
        expectation: Expectation,
    ) -> Result<UnexecutedId> {
        if self.trace.program().instruction(instruction).is_none() {
            return Err(Error::unknown_instruction(instruction));
        }
        Ok(self.get_or_create(instruction, expectation))
    }

    fn get_or_create(
        &mut self,
        instruction: InstructionId,
        expectation: Expectation,
    ) -> UnexecutedId {
        let key = (instruction, expectation);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = UnexecutedId::from_len(self.nodes.len());
        self.nodes
            .push(UnexecutedInstruction::new(id, instruction, key.1.clone()));
        self.index.insert(key, id);
        id
    }

    /// Explains a node, and every node its verdict depends on.
    ///
    /// Explaining an explained node returns its verdict unchanged.
    pub fn explain(&mut self, id: UnexecutedId) -> &Reason {
        let mut stack: Vec<Frame> = Vec::new();
        if self.nodes[id.slot()].status == Status::Unvisited {
            stack.extend(self.start(id));
        }

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if let Some(&child) = frame.children.get(frame.next) {
                frame.next += 1;
                match self.nodes[child.slot()].status {
                    Status::Unvisited => stack.extend(self.start(child)),
                    Status::InProgress => {
                        tracing::trace!(?child, "skipped node already on the analysis stack");
                    }
                    Status::Done => {}
                }
            } else if let Some(frame) = stack.pop() {
                self.finish(frame);
            }
        }

        &self.nodes[id.slot()].reason
    }

    /// Explains several nodes, stopping between nodes once `cancel` is set.
    ///
    /// # Errors
    ///
    /// Returns a `Canceled` error if cancellation was requested before every
    /// node was explained. Nodes explained so far keep their verdicts.
    pub fn explain_batch(
        &mut self,
        targets: &[UnexecutedId],
        cancel: &CancellationFlag,
    ) -> Result<()> {
        for &target in targets {
            if cancel.is_canceled() {
                tracing::debug!(remaining = targets.len(), "why-not batch canceled");
                return Err(Error::canceled());
            }
            self.explain(target);
        }
        Ok(())
    }

    /// Returns the recorded events that decided the node's non-execution,
    /// gathered over everything reachable through incoming edges.
    #[must_use]
    pub fn deciding_events(&self, id: UnexecutedId) -> BTreeSet<EventId> {
        let mut events = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(node) = pending.pop() {
            if !visited.insert(node) {
                continue;
            }
            let node = self.node(node);
            events.extend(node.reason.deciding_events());
            pending.extend(node.incoming());
        }
        events
    }

    // -------------------------------------------------------------------------
    // Analysis
    // -------------------------------------------------------------------------

    fn start(&mut self, id: UnexecutedId) -> Option<Frame> {
        self.nodes[id.slot()].status = Status::InProgress;
        match self.analyse(id) {
            Analysis::Final(reason) => {
                self.conclude(id, reason);
                None
            }
            Analysis::Callers {
                method,
                callers,
                children,
            } => Some(Frame {
                node: id,
                pending: Pending::Callers { method, callers },
                children,
                next: 0,
            }),
            Analysis::Guards { branches, children } => Some(Frame {
                node: id,
                pending: Pending::Guards { branches },
                children,
                next: 0,
            }),
        }
    }

    fn finish(&mut self, frame: Frame) {
        let node = frame.node;
        for &child in &frame.children {
            if self.nodes[child.slot()].status == Status::Done {
                self.link(child, node);
            }
        }

        let reason = match frame.pending {
            Pending::Callers { method, callers } => Reason::MethodDidNotExecute { method, callers },
            Pending::Guards { branches } => {
                let executed = frame.children.iter().find_map(|&child| {
                    match self.nodes[child.slot()].reason {
                        Reason::DidExecute { event }
                            if self.nodes[child.slot()].status == Status::Done =>
                        {
                            Some(event)
                        }
                        _ => None,
                    }
                });
                match executed {
                    Some(branch) => Reason::WrongWay {
                        branch,
                        dependencies: self.trace.operand_stack_dependencies(branch),
                    },
                    None => Reason::InstructionsBranchDidNotExecute { branches },
                }
            }
        };
        self.conclude(node, reason);
    }

    fn conclude(&mut self, id: UnexecutedId, reason: Reason) {
        let node = &mut self.nodes[id.slot()];
        tracing::debug!(
            instruction = %node.instruction,
            reason = %reason.kind(),
            "explained unexecuted instruction"
        );
        node.reason = reason;
        node.status = Status::Done;
    }

    fn link(&mut self, cause: UnexecutedId, effect: UnexecutedId) {
        self.nodes[effect.slot()].incoming.insert(cause);
        self.nodes[cause.slot()].outgoing.insert(effect);
    }

    fn analyse(&mut self, id: UnexecutedId) -> Analysis {
        let trace = self.trace;
        let program = trace.program();
        let target = self.nodes[id.slot()].instruction;
        let expectation = self.nodes[id.slot()].expectation.clone();

        let Some(instruction) = program.instruction(target) else {
            return Analysis::Final(Reason::UnknownReason);
        };
        let Some(method) = program.method(instruction.method) else {
            tracing::warn!(instruction = %target, "instruction has no enclosing method");
            return Analysis::Final(Reason::UnknownReason);
        };

        let search = expectation.for_method_search(program, target, method.is_static);
        match self.latest_execution(id, method.id, &search) {
            Execution::Found(start) => {
                self.nodes[id.slot()].method_execution = Some(start);
                self.within_invocation(instruction, &search, start)
            }
            Execution::Unknown => Analysis::Final(Reason::UnknownReason),
            Execution::Missing => self.without_invocation(method, &expectation, target, &search),
        }
    }

    /// Finds the latest invocation of `method` matching `search`, recording
    /// the ones that ran for other objects.
    fn latest_execution(
        &mut self,
        id: UnexecutedId,
        method: MethodId,
        search: &Expectation,
    ) -> Execution {
        let mut found = None;
        let mut unknown = false;
        let mut others = Vec::new();
        for start in self.trace.invocations_of(method, self.boundary) {
            match search.matches(self.trace, start) {
                Match::Yes => found = Some(start),
                Match::No => others.push(start),
                Match::Unknown => unknown = true,
            }
        }
        self.nodes[id.slot()].executions_on_other_objects = others;
        match (found, unknown) {
            (Some(start), _) => Execution::Found(start),
            (None, true) => Execution::Unknown,
            (None, false) => Execution::Missing,
        }
    }

    /// Looks for the instruction inside the invocation started at `start`.
    ///
    /// Guards are asked with `search`, the method-level constraint, so they
    /// resolve to this same invocation.
    fn within_invocation(
        &mut self,
        instruction: &Instruction,
        search: &Expectation,
        start: EventId,
    ) -> Analysis {
        let trace = self.trace;
        let target = instruction.id;
        let end = trace
            .return_or_catch_id(start)
            .filter(|&end| end < self.boundary);
        let limit = match (end, self.boundary.previous()) {
            (Some(end), _) => end,
            (None, Some(last)) => last,
            (None, None) => start,
        };

        let executed = trace.find_event_between(start, limit, &|e| {
            trace.instruction(e) == target
                && trace.start_id(e) == Some(start)
                && !trace.kind(e).is_artificial()
        });
        if let Some(event) = executed {
            return Analysis::Final(Reason::DidExecute { event });
        }

        if instruction.is_protected() {
            let caught = trace
                .exceptions_caught_between(start, limit)
                .into_iter()
                .rev()
                .find(|&c| instruction.handlers.contains(&trace.instruction(c)));
            if let Some(event) = caught {
                return Analysis::Final(Reason::ExceptionCaught { event });
            }
        }

        let escaped = end.filter(|&end| {
            matches!(
                trace.kind(end),
                EventKind::ExceptionThrown | EventKind::ExceptionCaught
            )
        });
        if let Some(event) = escaped {
            return Analysis::Final(Reason::ExceptionCaught { event });
        }

        if instruction.guards.is_empty() {
            return Analysis::Final(Reason::UnknownReason);
        }
        let branches: BTreeSet<InstructionId> = instruction.guards.iter().copied().collect();
        let children = instruction
            .guards
            .iter()
            .map(|&guard| self.get_or_create(guard, search.clone()))
            .collect();
        Analysis::Guards { branches, children }
    }

    fn without_invocation(
        &mut self,
        method: &Method,
        expectation: &Expectation,
        target: InstructionId,
        search: &Expectation,
    ) -> Analysis {
        let trace = self.trace;
        let receivers = search.receivers(method.is_static);
        let callers: BTreeSet<InstructionId> = trace
            .possible_callers(method.id)
            .into_iter()
            .filter(|&call_site| self.is_feasible(call_site, method, &receivers))
            .collect();

        if callers.is_empty() {
            let reason = if method.is_entry_point {
                Reason::MethodDidNotExecute {
                    method: method.id,
                    callers,
                }
            } else {
                Reason::Unreachable { method: method.id }
            };
            return Analysis::Final(reason);
        }

        if let Some(last) = self.boundary.previous() {
            let call = trace.find_last_event_between(EventId::FIRST, last, &|e| {
                trace.kind(e) == EventKind::Invocation && callers.contains(&trace.instruction(e))
            });
            if let Some(event) = call {
                return Analysis::Final(Reason::DidExecute { event });
            }
        }

        let translated = expectation.for_callers(trace.program(), target);
        let children = callers
            .iter()
            .map(|&call_site| self.get_or_create(call_site, translated.clone()))
            .collect();
        Analysis::Callers {
            method: method.id,
            callers,
            children,
        }
    }

    fn is_feasible(&self, call_site: InstructionId, method: &Method, receivers: &[ObjectId]) -> bool {
        let trace = self.trace;
        let program = trace.program();

        if self.config.prune_by_receiver_type && !receivers.is_empty() {
            let classes: Vec<_> = receivers
                .iter()
                .filter_map(|&object| trace.object_class(object))
                .collect();
            if classes.len() == receivers.len()
                && !classes
                    .iter()
                    .any(|&class| program.dispatches_to(call_site, class, method.id))
            {
                tracing::trace!(%call_site, method = %method.id, "pruned caller by receiver type");
                return false;
            }
        }

        let uninstantiated = program.method_of(call_site).is_some_and(|caller| {
            !caller.is_static
                && !program.classes().iter().any(|class| {
                    program.is_subclass_of(class.id, caller.class)
                        && trace.class_is_instantiated(class.id)
                })
        });
        if self.config.prune_uninstantiated_callers && uninstantiated {
            tracing::trace!(%call_site, "pruned caller in uninstantiated class");
            return false;
        }

        true
    }
}

impl fmt::Debug for Question<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Question")
            .field("boundary", &self.boundary)
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

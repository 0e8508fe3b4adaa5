//! Answers to "why did this event occur?".
//!
//! An [`Answer`] owns an arena of [`Explanation`] nodes and the indices that
//! group them into blocks. Nodes are created on first request, explained at
//! most once, and live as long as the answer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use hindsight_foundation::{EventId, EventKind, ThreadId};
use hindsight_trace::TraceQuery;

use crate::config::AnalysisConfig;

use super::node::{Cause, CauseSource, Explanation, NodeId, NodeKind, Status};

// =============================================================================
// Answer Sequence
// =============================================================================

/// Creation-order counter for answers.
///
/// Hand one counter to every answer of a session; answers with equal
/// priority are then ordered first-created first.
#[derive(Clone, Debug, Default)]
pub struct AnswerSequence {
    next: u64,
}

impl AnswerSequence {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next;
        self.next += 1;
        sequence
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Receives batched notifications about block changes.
///
/// Notifications are delivered once per explanation pass, after the pass
/// completes, because a single request can pull many ancestor events into
/// their blocks.
pub trait AnswerListener {
    /// Called for every block created during the pass.
    fn block_created(&mut self, _block: NodeId, _anchor: EventId) {}

    /// Called once with every block that gained members during the pass.
    fn blocks_changed(&mut self, _blocks: &[NodeId]) {}
}

// =============================================================================
// Answer
// =============================================================================

/// Explanation graph for one question about a trace.
///
/// Answers never share nodes: two questions about the same trace get
/// independent caches.
pub struct Answer<'a> {
    pub(super) trace: &'a dyn TraceQuery,
    pub(super) config: AnalysisConfig,
    sequence: u64,
    priority: i32,
    pub(super) nodes: Vec<Explanation>,
    cache: HashMap<EventId, NodeId>,
    control_blocks: HashMap<EventId, NodeId>,
    unexplained_controls: Vec<NodeId>,
    loop_blocks: BTreeMap<EventId, NodeId>,
    pub(super) thread_blocks: BTreeMap<ThreadId, NodeId>,
    changed: BTreeSet<NodeId>,
    unread: BTreeSet<NodeId>,
    created: Vec<NodeId>,
    listeners: Vec<Box<dyn AnswerListener + 'a>>,
}

impl<'a> Answer<'a> {
    /// Creates an empty answer over `trace`.
    #[must_use]
    pub fn new(
        trace: &'a dyn TraceQuery,
        config: AnalysisConfig,
        sequence: &mut AnswerSequence,
    ) -> Self {
        Self {
            trace,
            config,
            sequence: sequence.next_sequence(),
            priority: 0,
            nodes: Vec::new(),
            cache: HashMap::new(),
            control_blocks: HashMap::new(),
            unexplained_controls: Vec::new(),
            loop_blocks: BTreeMap::new(),
            thread_blocks: BTreeMap::new(),
            changed: BTreeSet::new(),
            unread: BTreeSet::new(),
            created: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Returns the trace this answer explains.
    #[must_use]
    pub fn trace(&self) -> &'a dyn TraceQuery {
        self.trace
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Registers a listener for block notifications.
    pub fn add_listener(&mut self, listener: Box<dyn AnswerListener + 'a>) {
        self.listeners.push(listener);
    }

    // -------------------------------------------------------------------------
    // Ranking
    // -------------------------------------------------------------------------

    /// Returns the priority; lower is preferred.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Sets the priority.
    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Returns the creation sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the sort key: priority, then creation order.
    #[must_use]
    pub fn rank(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }

    // -------------------------------------------------------------------------
    // Node access
    // -------------------------------------------------------------------------

    /// Returns a node.
    ///
    /// # Panics
    ///
    /// Panics if the node does not belong to this answer.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Explanation {
        &self.nodes[id.slot()]
    }

    /// Returns the number of nodes, blocks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing has been explained or requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the cached explanation of an event without creating one.
    #[must_use]
    pub fn cached(&self, event: EventId) -> Option<NodeId> {
        self.cache.get(&event).copied()
    }

    /// Returns the causes of an explained node.
    ///
    /// # Panics
    ///
    /// Panics if the node is unexplained or still being explained.
    #[must_use]
    pub fn causes(&self, id: NodeId) -> &[Cause] {
        self.node(id).causes()
    }

    /// Returns the block a node belongs to.
    #[must_use]
    pub fn block_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).owner
    }

    /// Returns every block node in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.is_block()).map(|n| n.id)
    }

    /// Returns the thread blocks by thread.
    pub fn thread_blocks(&self) -> impl Iterator<Item = (ThreadId, NodeId)> + '_ {
        self.thread_blocks.iter().map(|(&t, &b)| (t, b))
    }

    /// Returns the loop blocks keyed by the first execution of their loop branch.
    pub fn loop_blocks(&self) -> impl Iterator<Item = (EventId, NodeId)> + '_ {
        self.loop_blocks.iter().map(|(&e, &b)| (e, b))
    }

    /// Returns the thread block of a thread, if one was created.
    #[must_use]
    pub fn thread_block(&self, thread: ThreadId) -> Option<NodeId> {
        self.thread_blocks.get(&thread).copied()
    }

    /// Returns the loop block keyed by a first loop-branch execution.
    #[must_use]
    pub fn loop_block(&self, first_branch: EventId) -> Option<NodeId> {
        self.loop_blocks.get(&first_branch).copied()
    }

    /// Drains the blocks that gained members since the previous call.
    ///
    /// Polling alternative to [`AnswerListener::blocks_changed`].
    pub fn take_changed_blocks(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.unread).into_iter().collect()
    }

    /// Returns the block representing a control event, if resolved already.
    #[must_use]
    pub fn block_for_control(&self, control: EventId) -> Option<NodeId> {
        self.control_blocks.get(&control).copied()
    }

    // -------------------------------------------------------------------------
    // Explanation
    // -------------------------------------------------------------------------

    /// Returns the explanation of an event, creating it and registering it
    /// with its block on first request.
    ///
    /// # Panics
    ///
    /// Panics if `event` is not part of the trace. Check it against
    /// [`TraceQuery::event_count`] when it comes from outside.
    pub fn explanation_for(&mut self, event: EventId) -> NodeId {
        let node = self.get_or_create(event);
        while let Some(control) = self.unexplained_controls.pop() {
            self.explain_node(control);
        }
        self.flush();
        node
    }

    /// Explains an event and, transitively, all of its causes.
    ///
    /// Explaining an explained node does nothing; its causes stay identical.
    ///
    /// # Panics
    ///
    /// Panics if `event` is not part of the trace. Check it against
    /// [`TraceQuery::event_count`] when it comes from outside.
    pub fn explain(&mut self, event: EventId) -> NodeId {
        let node = self.get_or_create(event);
        self.explain_node(node);
        self.flush();
        node
    }

    /// Returns the node of an event, creating it and every earlier node
    /// that decides its block.
    ///
    /// Control chains grow with the trace, so they are resolved oldest
    /// first from an explicit stack.
    pub(super) fn get_or_create(&mut self, event: EventId) -> NodeId {
        if let Some(&node) = self.cache.get(&event) {
            return node;
        }

        let mut pending = vec![event];
        while let Some(current) = pending.pop() {
            if self.cache.contains_key(&current) {
                continue;
            }
            match self.unresolved_block_dependency(current) {
                Some(earlier) => pending.extend([current, earlier]),
                None => self.create(current),
            }
        }
        self.cache[&event]
    }

    /// Returns the uncreated earlier event whose node `event` needs before
    /// its block can be resolved.
    fn unresolved_block_dependency(&self, event: EventId) -> Option<EventId> {
        let control = self.trace.control_id(event)?;
        let needed = match self.loop_iteration_of(event, control) {
            Some(first) if self.loop_blocks.contains_key(&first) => return None,
            Some(first) => first,
            None if self.control_blocks.contains_key(&control) => return None,
            None => control,
        };
        (needed < event && !self.cache.contains_key(&needed)).then_some(needed)
    }

    fn create(&mut self, event: EventId) {
        let kind = self.trace.kind(event);
        let callee_instrumented = kind.is_invocation()
            && self
                .trace
                .next_event_in_thread(event)
                .is_some_and(|next| self.trace.kind(next) == EventKind::StartMethod);
        let id = NodeId::from_len(self.nodes.len());
        self.nodes.push(Explanation::new(
            id,
            event,
            NodeKind::for_event(kind, callee_instrumented),
        ));
        self.cache.insert(event, id);

        let block = self.block_representing_control_dependency_of(id);
        self.attach(id, block);
    }

    /// Explains a node and everything it transitively depends on.
    ///
    /// Control events pulled in by block resolution are explained as well.
    pub(super) fn explain_node(&mut self, root: NodeId) {
        let mut pending = vec![root];
        loop {
            pending.append(&mut self.unexplained_controls);
            let Some(node) = pending.pop() else {
                break;
            };
            if self.nodes[node.slot()].status != Status::Unvisited {
                continue;
            }
            self.nodes[node.slot()].status = Status::InProgress;
            let causes = self.compute_causes(node);
            pending.extend(
                causes
                    .iter()
                    .map(|c| c.node)
                    .filter(|c| self.nodes[c.slot()].status == Status::Unvisited),
            );

            let explained = &mut self.nodes[node.slot()];
            explained.causes = Some(causes.into_boxed_slice());
            explained.status = Status::Done;
        }
    }

    fn compute_causes(&mut self, node: NodeId) -> Vec<Cause> {
        let event = self.nodes[node.slot()].event;
        let mut causes: Vec<Cause> = Vec::new();

        for (position, dependency) in self
            .trace
            .operand_stack_dependencies(event)
            .into_iter()
            .enumerate()
        {
            // An allocation's own stack slot can be reported as its operand.
            if dependency == event {
                tracing::trace!(%event, position, "skipped self-referencing operand");
                continue;
            }
            let producer = self.trace.instruction(dependency);
            causes.push(Cause {
                node: self.get_or_create(dependency),
                event: dependency,
                source: CauseSource::Operand { position, producer },
            });
        }

        if let Some(write) = self.trace.heap_dependency(event).filter(|&w| w != event) {
            causes.push(Cause {
                node: self.get_or_create(write),
                event: write,
                source: CauseSource::Heap,
            });
        }

        if self.config.opaque_call_arguments && self.trace.kind(event).is_invocation() {
            for dependency in self.trace.opaque_argument_dependencies(event) {
                if dependency == event || causes.iter().any(|c| c.event == dependency) {
                    continue;
                }
                causes.push(Cause {
                    node: self.get_or_create(dependency),
                    event: dependency,
                    source: CauseSource::Opaque,
                });
            }
        }

        causes
    }

    // -------------------------------------------------------------------------
    // Block attachment
    // -------------------------------------------------------------------------

    /// Determines the block representing the control dependency of a node.
    fn block_representing_control_dependency_of(&mut self, node: NodeId) -> NodeId {
        let event = self.nodes[node.slot()].event;
        let thread = self.trace.thread(event);

        let Some(control) = self.trace.control_id(event) else {
            return self.thread_block_for(thread, event);
        };

        let block = match self.loop_iteration_of(event, control) {
            Some(first) => self.loop_block_for(first),
            None => self.block_for_control_event(control),
        };

        // Control dependencies never cross threads in the graph.
        if self.thread_of_block(block) == thread {
            block
        } else {
            tracing::debug!(%event, %control, "control dependency crosses threads");
            self.thread_block_for(thread, event)
        }
    }

    /// If `control` is the branch of a loop enclosing `event`, returns the
    /// first execution of that branch in the event's thread.
    fn loop_iteration_of(&self, event: EventId, control: EventId) -> Option<EventId> {
        if !self.config.collapse_loops || !self.trace.kind(control).is_branch() {
            return None;
        }
        let thread = self.trace.thread(event);
        if self.trace.thread(control) != thread {
            return None;
        }
        let program = self.trace.program();
        let branch = program.instruction(self.trace.instruction(control))?;
        let instruction = program.instruction(self.trace.instruction(event))?;
        let backward = branch.method == instruction.method
            && (branch.position > instruction.position || branch.id == instruction.id);
        if !backward {
            return None;
        }
        Some(
            self.trace
                .first_execution_in_thread(branch.id, thread, control)
                .unwrap_or(control),
        )
    }

    fn block_for_control_event(&mut self, control: EventId) -> NodeId {
        if let Some(&block) = self.control_blocks.get(&control) {
            return block;
        }
        let node = self.get_or_create(control);
        self.unexplained_controls.push(node);
        let block = if self.nodes[node.slot()].is_block() {
            node
        } else {
            match self.nodes[node.slot()].owner {
                Some(owner) => owner,
                None => self.thread_block_for(self.trace.thread(control), control),
            }
        };
        self.control_blocks.insert(control, block);
        block
    }

    fn loop_block_for(&mut self, first: EventId) -> NodeId {
        if let Some(&block) = self.loop_blocks.get(&first) {
            return block;
        }
        let anchor = self.get_or_create(first);
        let owner = self.nodes[anchor.slot()].owner;

        let id = NodeId::from_len(self.nodes.len());
        self.nodes.push(Explanation::structural(
            id,
            first,
            NodeKind::Loop { runs: Vec::new() },
        ));
        self.loop_blocks.insert(first, id);
        self.created.push(id);
        tracing::debug!(anchor = %first, "created loop block");

        if let Some(owner) = owner {
            self.attach(id, owner);
            self.rehome(anchor, id);
        }
        id
    }

    /// Moves an attached node into another block, refreshing the depth of
    /// every block nested beneath it.
    fn rehome(&mut self, node: NodeId, block: NodeId) {
        let event = self.nodes[node.slot()].event;
        if let Some(previous) = self.nodes[node.slot()].owner {
            self.nodes[previous.slot()].members.remove(&event);
            self.changed.insert(previous);
        }
        self.attach(node, block);

        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let depth = self.nodes[current.slot()].depth + 1;
            let nested: Vec<NodeId> = self.nodes[current.slot()]
                .members
                .values()
                .copied()
                .filter(|m| self.nodes[m.slot()].is_block())
                .collect();
            for member in nested {
                self.nodes[member.slot()].depth = depth;
                self.record_depth(member, depth);
                pending.push(member);
            }
        }
    }

    pub(super) fn thread_block_for(&mut self, thread: ThreadId, fallback: EventId) -> NodeId {
        if let Some(&block) = self.thread_blocks.get(&thread) {
            return block;
        }
        let anchor = self
            .trace
            .first_event_in_thread(thread)
            .unwrap_or(fallback)
            .min(fallback);
        let id = NodeId::from_len(self.nodes.len());
        self.nodes.push(Explanation::structural(
            id,
            anchor,
            NodeKind::Thread {
                thread,
                max_depth: 0,
                deepest: None,
            },
        ));
        self.thread_blocks.insert(thread, id);
        self.created.push(id);
        tracing::debug!(%thread, %anchor, "created thread block");
        id
    }

    fn thread_of_block(&self, block: NodeId) -> ThreadId {
        match self.nodes[block.slot()].kind {
            NodeKind::Thread { thread, .. } => thread,
            _ => self.trace.thread(self.nodes[block.slot()].event),
        }
    }

    /// Adds a node to a block.
    ///
    /// # Panics
    ///
    /// Panics if the node's event precedes the block's anchor event.
    fn attach(&mut self, node: NodeId, block: NodeId) {
        let event = self.nodes[node.slot()].event;
        let anchor = self.nodes[block.slot()].event;
        assert!(
            event >= anchor,
            "{event} cannot belong to a block anchored at the later event {anchor}"
        );

        self.nodes[node.slot()].owner = Some(block);
        self.nodes[block.slot()].members.insert(event, node);
        self.changed.insert(block);

        if self.nodes[node.slot()].is_block() {
            let depth = self.nodes[block.slot()].depth + 1;
            self.nodes[node.slot()].depth = depth;
            self.record_depth(node, depth);
        }
        if matches!(self.nodes[block.slot()].kind, NodeKind::Loop { .. })
            && matches!(self.nodes[node.slot()].kind, NodeKind::Branch { .. })
        {
            self.recompute_runs(block);
        }
    }

    /// Delivers pending notifications to listeners.
    fn flush(&mut self) {
        if self.created.is_empty() && self.changed.is_empty() {
            return;
        }
        let created = std::mem::take(&mut self.created);
        let changed: Vec<NodeId> = std::mem::take(&mut self.changed).into_iter().collect();
        self.unread.extend(changed.iter().copied());
        for listener in &mut self.listeners {
            for &block in &created {
                listener.block_created(block, self.nodes[block.slot()].event);
            }
            if !changed.is_empty() {
                listener.blocks_changed(&changed);
            }
        }
    }
}

impl PartialEq for Answer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Answer<'_> {}

impl PartialOrd for Answer<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Answer<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Debug for Answer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answer")
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .field("nodes", &self.nodes.len())
            .field("thread_blocks", &self.thread_blocks.len())
            .field("loop_blocks", &self.loop_blocks.len())
            .finish_non_exhaustive()
    }
}

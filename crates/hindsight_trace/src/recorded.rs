//! In-memory recorded trace.
//!
//! [`RecordedTrace`] holds every event of a run in id order and answers the
//! [`TraceQuery`] interface from derived indices built once at construction.
//! [`TraceBuilder`] appends events in temporal order, tracking the open
//! invocation of each thread so that method-relative queries work.

use std::collections::{BTreeMap, HashMap, HashSet};

use hindsight_foundation::{
    ClassId, Error, EventId, EventKind, InstructionId, MethodId, ObjectId, Result, ThreadId,
};

use crate::program::{InstructionKind, Program};
use crate::query::TraceQuery;

// =============================================================================
// Event Record
// =============================================================================

/// Everything recorded about one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// What the event represents.
    pub kind: EventKind,
    /// Instruction whose execution produced the event.
    pub instruction: InstructionId,
    /// Thread the event occurred on.
    pub thread: ThreadId,
    /// Producers of the consumed operands, in operand order.
    pub operands: Vec<EventId>,
    /// Most recent write to the heap location read.
    pub heap: Option<EventId>,
    /// Argument producers of opaque calls made inside an invocation.
    pub opaque_arguments: Vec<EventId>,
    /// Event that decided whether this one would execute.
    pub control: Option<EventId>,
    /// Start-of-method event of the enclosing invocation.
    pub start: Option<EventId>,
    /// Objects bound to the parameters (start-of-method events only).
    pub arguments: Vec<Option<ObjectId>>,
    /// Object allocated (instantiation events only).
    pub object: Option<ObjectId>,
}

impl EventRecord {
    /// Creates a record on thread 0 with no dependencies.
    #[must_use]
    pub fn new(kind: EventKind, instruction: InstructionId) -> Self {
        Self {
            kind,
            instruction,
            thread: ThreadId::new(0),
            operands: Vec::new(),
            heap: None,
            opaque_arguments: Vec::new(),
            control: None,
            start: None,
            arguments: Vec::new(),
            object: None,
        }
    }

    /// Sets the thread.
    #[must_use]
    pub fn on_thread(mut self, thread: ThreadId) -> Self {
        self.thread = thread;
        self
    }

    /// Sets the operand producers.
    #[must_use]
    pub fn operands(mut self, operands: &[EventId]) -> Self {
        self.operands = operands.to_vec();
        self
    }

    /// Sets the heap dependency.
    #[must_use]
    pub fn heap(mut self, write: EventId) -> Self {
        self.heap = Some(write);
        self
    }

    /// Sets the argument producers of opaque inner calls.
    #[must_use]
    pub fn opaque_arguments(mut self, producers: &[EventId]) -> Self {
        self.opaque_arguments = producers.to_vec();
        self
    }

    /// Sets the control dependency.
    #[must_use]
    pub fn control(mut self, control: EventId) -> Self {
        self.control = Some(control);
        self
    }

    /// Sets the allocated object.
    #[must_use]
    pub fn allocating(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }
}

// =============================================================================
// Recorded Trace
// =============================================================================

/// A complete recorded execution held in memory.
#[derive(Clone, Debug)]
pub struct RecordedTrace {
    program: Program,
    events: Vec<EventRecord>,
    next_in_thread: Vec<Option<EventId>>,
    first_in_thread: BTreeMap<ThreadId, EventId>,
    invocations: HashMap<MethodId, Vec<EventId>>,
    ends: HashMap<EventId, EventId>,
    object_classes: HashMap<ObjectId, ClassId>,
    instantiated: HashSet<ClassId>,
}

impl RecordedTrace {
    fn from_parts(program: Program, events: Vec<EventRecord>, ends: HashMap<EventId, EventId>) -> Self {
        let mut next_in_thread = vec![None; events.len()];
        let mut first_in_thread = BTreeMap::new();
        let mut last_in_thread: HashMap<ThreadId, usize> = HashMap::new();
        let mut invocations: HashMap<MethodId, Vec<EventId>> = HashMap::new();
        let mut object_classes = HashMap::new();
        let mut instantiated = HashSet::new();

        for (index, record) in events.iter().enumerate() {
            let id = EventId::new(index as u64);
            first_in_thread.entry(record.thread).or_insert(id);
            if let Some(previous) = last_in_thread.insert(record.thread, index) {
                next_in_thread[previous] = Some(id);
            }

            match record.kind {
                EventKind::StartMethod => {
                    if let Some(method) = program.instruction(record.instruction).map(|i| i.method) {
                        invocations.entry(method).or_default().push(id);
                    }
                }
                EventKind::Instantiation => {
                    if let Some(InstructionKind::New { class }) =
                        program.instruction(record.instruction).map(|i| i.kind)
                    {
                        instantiated.insert(class);
                        if let Some(object) = record.object {
                            object_classes.insert(object, class);
                        }
                    }
                }
                _ => {}
            }
        }

        Self {
            program,
            events,
            next_in_thread,
            first_in_thread,
            invocations,
            ends,
            object_classes,
            instantiated,
        }
    }

    /// Returns the record of an event.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownEvent` error if the id is outside the trace.
    pub fn get(&self, event: EventId) -> Result<&EventRecord> {
        usize::try_from(event.index())
            .ok()
            .and_then(|index| self.events.get(index))
            .ok_or_else(|| Error::unknown_event(event))
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the id one past the last event, usable as an exclusive boundary.
    #[must_use]
    pub fn end(&self) -> EventId {
        EventId::new(self.events.len() as u64)
    }

    fn record(&self, event: EventId) -> &EventRecord {
        match self.get(event) {
            Ok(record) => record,
            Err(err) => panic!("{err}"),
        }
    }

    fn last_index(&self) -> Option<EventId> {
        self.events.len().checked_sub(1).map(|i| EventId::new(i as u64))
    }

    fn clamp(&self, start: EventId, end: EventId) -> Option<(u64, u64)> {
        let last = self.last_index()?;
        let end = end.min(last);
        (start <= end).then_some((start.index(), end.index()))
    }
}

impl TraceQuery for RecordedTrace {
    fn program(&self) -> &Program {
        &self.program
    }

    fn event_count(&self) -> u64 {
        self.events.len() as u64
    }

    fn kind(&self, event: EventId) -> EventKind {
        self.record(event).kind
    }

    fn instruction(&self, event: EventId) -> InstructionId {
        self.record(event).instruction
    }

    fn thread(&self, event: EventId) -> ThreadId {
        self.record(event).thread
    }

    fn operand_stack_dependencies(&self, event: EventId) -> Vec<EventId> {
        self.record(event).operands.clone()
    }

    fn heap_dependency(&self, event: EventId) -> Option<EventId> {
        self.record(event).heap
    }

    fn opaque_argument_dependencies(&self, event: EventId) -> Vec<EventId> {
        self.record(event).opaque_arguments.clone()
    }

    fn control_id(&self, event: EventId) -> Option<EventId> {
        self.record(event).control
    }

    fn start_id(&self, event: EventId) -> Option<EventId> {
        self.record(event).start
    }

    fn return_or_catch_id(&self, start: EventId) -> Option<EventId> {
        self.ends.get(&start).copied()
    }

    fn next_event_in_thread(&self, event: EventId) -> Option<EventId> {
        usize::try_from(event.index())
            .ok()
            .and_then(|index| self.next_in_thread.get(index).copied().flatten())
    }

    fn first_event_in_thread(&self, thread: ThreadId) -> Option<EventId> {
        self.first_in_thread.get(&thread).copied()
    }

    fn find_event_between(
        &self,
        start: EventId,
        end: EventId,
        predicate: &dyn Fn(EventId) -> bool,
    ) -> Option<EventId> {
        let (start, end) = self.clamp(start, end)?;
        (start..=end).map(EventId::new).find(|&e| predicate(e))
    }

    fn find_last_event_between(
        &self,
        start: EventId,
        end: EventId,
        predicate: &dyn Fn(EventId) -> bool,
    ) -> Option<EventId> {
        let (start, end) = self.clamp(start, end)?;
        (start..=end).rev().map(EventId::new).find(|&e| predicate(e))
    }

    fn exceptions_caught_between(&self, start: EventId, end: EventId) -> Vec<EventId> {
        let Some((start, end)) = self.clamp(start, end) else {
            return Vec::new();
        };
        (start..=end)
            .map(EventId::new)
            .filter(|&e| self.record(e).kind == EventKind::ExceptionCaught)
            .collect()
    }

    fn invocations_of(&self, method: MethodId, before: EventId) -> Vec<EventId> {
        self.invocations
            .get(&method)
            .map(|starts| starts.iter().copied().filter(|&s| s < before).collect())
            .unwrap_or_default()
    }

    fn argument(&self, start: EventId, position: usize) -> Result<ObjectId> {
        self.get(start)?
            .arguments
            .get(position)
            .copied()
            .flatten()
            .ok_or_else(|| Error::no_value(start))
    }

    fn object_class(&self, object: ObjectId) -> Option<ClassId> {
        self.object_classes.get(&object).copied()
    }

    fn class_is_instantiated(&self, class: ClassId) -> bool {
        self.instantiated.contains(&class)
    }

    fn possible_callers(&self, method: MethodId) -> Vec<InstructionId> {
        self.program.call_sites_of(method)
    }
}

// =============================================================================
// Trace Builder
// =============================================================================

/// Appends events in temporal order and produces a [`RecordedTrace`].
///
/// The builder keeps a stack of open invocations per thread; every pushed
/// event is attributed to the innermost open invocation of its thread.
#[derive(Debug)]
pub struct TraceBuilder {
    program: Program,
    events: Vec<EventRecord>,
    frames: HashMap<ThreadId, Vec<EventId>>,
    ends: HashMap<EventId, EventId>,
}

impl TraceBuilder {
    /// Creates a builder for a trace of `program`.
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self {
            program,
            events: Vec::new(),
            frames: HashMap::new(),
            ends: HashMap::new(),
        }
    }

    /// Returns the id the next pushed event will get.
    #[must_use]
    pub fn next_id(&self) -> EventId {
        EventId::new(self.events.len() as u64)
    }

    /// Returns the innermost open invocation of a thread.
    #[must_use]
    pub fn current_frame(&self, thread: ThreadId) -> Option<EventId> {
        self.frames.get(&thread).and_then(|f| f.last().copied())
    }

    /// Appends an event in the innermost open invocation of its thread.
    pub fn push(&mut self, mut record: EventRecord) -> EventId {
        let id = self.next_id();
        if record.start.is_none() {
            record.start = self.current_frame(record.thread);
        }
        self.events.push(record);
        id
    }

    /// Opens an invocation of `method` on `thread`.
    ///
    /// The start-of-method event is attributed to the new invocation itself.
    ///
    /// # Panics
    ///
    /// Panics if the method is unknown or has no instructions.
    pub fn enter(
        &mut self,
        thread: ThreadId,
        method: MethodId,
        arguments: &[Option<ObjectId>],
        control: Option<EventId>,
    ) -> EventId {
        let first = self
            .program
            .method(method)
            .and_then(|m| m.instructions.first().copied())
            .unwrap_or_else(|| panic!("method {method} has no instructions"));
        let id = self.next_id();
        let mut record = EventRecord::new(EventKind::StartMethod, first).on_thread(thread);
        record.start = Some(id);
        record.control = control;
        record.arguments = arguments.to_vec();
        self.events.push(record);
        self.frames.entry(thread).or_default().push(id);
        id
    }

    /// Closes the innermost invocation of the record's thread with `record`,
    /// which is a return or an escaping exception.
    ///
    /// # Panics
    ///
    /// Panics if the thread has no open invocation.
    pub fn exit(&mut self, record: EventRecord) -> EventId {
        let thread = record.thread;
        let frame = self
            .current_frame(thread)
            .unwrap_or_else(|| panic!("{thread} has no open invocation"));
        let id = self.push(record);
        self.ends.insert(frame, id);
        if let Some(frames) = self.frames.get_mut(&thread) {
            frames.pop();
        }
        id
    }

    /// Finishes construction.
    #[must_use]
    pub fn build(self) -> RecordedTrace {
        RecordedTrace::from_parts(self.program, self.events, self.ends)
    }
}

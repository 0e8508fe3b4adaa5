//! The read-only query interface over a recorded execution.
//!
//! Every analysis in Hindsight is expressed in terms of [`TraceQuery`]. The
//! interface is synchronous: implementations backed by lazily loaded trace
//! segments block inside these calls, invisibly to the engine.

use hindsight_foundation::{
    ClassId, EventId, EventKind, InstructionId, MethodId, ObjectId, Result, ThreadId,
};

use crate::program::Program;

/// Random-access, read-only view of a recorded execution.
///
/// Implementations are shared between any number of concurrently active
/// analyses and must support concurrent readers.
pub trait TraceQuery: Send + Sync {
    /// Returns the static program the trace was recorded from.
    fn program(&self) -> &Program;

    /// Returns the number of recorded events; ids run from 0 to `event_count - 1`.
    fn event_count(&self) -> u64;

    /// Returns the kind of an event.
    fn kind(&self, event: EventId) -> EventKind;

    /// Returns the instruction whose execution produced an event.
    ///
    /// Artificial events (arguments, method entry) report the first
    /// instruction of the entered method.
    fn instruction(&self, event: EventId) -> InstructionId;

    /// Returns the thread an event occurred on.
    fn thread(&self, event: EventId) -> ThreadId;

    /// Returns the events that produced each operand the event consumed, in operand order.
    fn operand_stack_dependencies(&self, event: EventId) -> Vec<EventId>;

    /// Returns the most recent write to the heap location an event reads, if any.
    fn heap_dependency(&self, event: EventId) -> Option<EventId>;

    /// For an invocation of partly uninstrumented code, returns the events
    /// that produced the arguments of the opaque calls made inside it.
    fn opaque_argument_dependencies(&self, event: EventId) -> Vec<EventId>;

    /// Returns the event that decided whether an event would execute.
    fn control_id(&self, event: EventId) -> Option<EventId>;

    /// Returns the start-of-method event of the invocation containing an event.
    fn start_id(&self, event: EventId) -> Option<EventId>;

    /// Returns the event that ended the invocation started at `start`: its
    /// return, or the exception that escaped it.
    fn return_or_catch_id(&self, start: EventId) -> Option<EventId>;

    /// Returns the next event on the same thread.
    fn next_event_in_thread(&self, event: EventId) -> Option<EventId>;

    /// Returns the first event recorded on a thread.
    fn first_event_in_thread(&self, thread: ThreadId) -> Option<EventId>;

    /// Returns the first event in `[start, end]` satisfying `predicate`.
    fn find_event_between(
        &self,
        start: EventId,
        end: EventId,
        predicate: &dyn Fn(EventId) -> bool,
    ) -> Option<EventId>;

    /// Returns the last event in `[start, end]` satisfying `predicate`.
    fn find_last_event_between(
        &self,
        start: EventId,
        end: EventId,
        predicate: &dyn Fn(EventId) -> bool,
    ) -> Option<EventId>;

    /// Returns the exception-caught events in `[start, end]`, in order.
    fn exceptions_caught_between(&self, start: EventId, end: EventId) -> Vec<EventId>;

    /// Returns the start-of-method events of `method` earlier than `before`, in order.
    fn invocations_of(&self, method: MethodId, before: EventId) -> Vec<EventId>;

    /// Returns the object bound to argument `position` of the invocation
    /// started at `start`. Position 0 is the receiver of instance methods.
    ///
    /// # Errors
    ///
    /// Returns a `NoValue` error when the argument was never captured.
    fn argument(&self, start: EventId, position: usize) -> Result<ObjectId>;

    /// Returns the runtime class of an object, if it was observed.
    fn object_class(&self, object: ObjectId) -> Option<ClassId>;

    /// Returns true if any instance of `class` was allocated during the run.
    fn class_is_instantiated(&self, class: ClassId) -> bool;

    /// Returns the call sites that could statically invoke `method`.
    fn possible_callers(&self, method: MethodId) -> Vec<InstructionId>;

    // -------------------------------------------------------------------------
    // Derived queries
    // -------------------------------------------------------------------------

    /// Returns the first execution of `instruction` on `thread` no later than `until`.
    fn first_execution_in_thread(
        &self,
        instruction: InstructionId,
        thread: ThreadId,
        until: EventId,
    ) -> Option<EventId> {
        let first = self.first_event_in_thread(thread)?;
        self.find_event_between(first, until, &|e| {
            self.thread(e) == thread && self.instruction(e) == instruction
        })
    }

    /// Returns the next event after `event` in the same invocation, skipping
    /// events of nested calls and stopping at the end of the invocation.
    fn next_event_in_frame(&self, event: EventId) -> Option<EventId> {
        let frame = self.start_id(event);
        let end = frame.and_then(|s| self.return_or_catch_id(s));
        let mut cursor = self.next_event_in_thread(event);
        while let Some(next) = cursor {
            if end.is_some_and(|end| next > end) {
                return None;
            }
            if self.start_id(next) == frame {
                return Some(next);
            }
            cursor = self.next_event_in_thread(next);
        }
        None
    }
}

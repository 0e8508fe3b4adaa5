//! Integration tests for explanations of concrete recorded scenarios

use std::collections::BTreeMap;

use hindsight_engine::explain::{CauseSource, NodeKind};
use hindsight_engine::{AnalysisConfig, Answer, AnswerSequence};
use hindsight_foundation::{EventId, EventKind, ObjectId, ThreadId};
use hindsight_trace::{
    EventRecord, InstructionKind, ProgramBuilder, RecordedTrace, TraceBuilder, TraceQuery,
};

fn e(index: u64) -> EventId {
    EventId::new(index)
}

fn answer(trace: &RecordedTrace) -> Answer<'_> {
    Answer::new(trace, AnalysisConfig::default(), &mut AnswerSequence::new())
}

/// `f` pushes a constant at event 3 and passes it to `g`, which reads it
/// at event 10.
fn call_with_constant() -> RecordedTrace {
    let mut b = ProgramBuilder::new();
    let class = b.class("App", None);
    let f = b.static_method(class, "f");
    let g = b.static_method(class, "g");
    b.entry_point(f);
    let pad = b.instruction(f, InstructionKind::Other);
    let push = b.instruction(f, InstructionKind::Other);
    let call = b.invoke(f, g, &[push]);
    let f_ret = b.instruction(f, InstructionKind::Return);
    let param = b.load_parameter(g, 0);
    let read = b.instruction(g, InstructionKind::Other);
    b.operands(read, &[param]);
    let g_ret = b.instruction(g, InstructionKind::Return);

    let t0 = ThreadId::new(0);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(t0, f, &[], None);
    t.push(EventRecord::new(EventKind::Value, pad).control(start));
    t.push(EventRecord::new(EventKind::Value, pad).control(start));
    let constant = t.push(EventRecord::new(EventKind::Constant, push).control(start));
    for _ in 0..4 {
        t.push(EventRecord::new(EventKind::Value, pad).control(start));
    }
    let invoke = t.push(
        EventRecord::new(EventKind::Invocation, call)
            .operands(&[constant])
            .control(start),
    );
    t.enter(t0, g, &[None], Some(invoke));
    t.push(
        EventRecord::new(EventKind::Value, read)
            .operands(&[constant])
            .control(invoke),
    );
    t.exit(EventRecord::new(EventKind::Return, g_ret).control(invoke));
    t.exit(EventRecord::new(EventKind::Return, f_ret).control(start));
    t.build()
}

// =============================================================================
// Causes
// =============================================================================

#[test]
fn callee_read_is_caused_by_caller_constant() {
    let trace = call_with_constant();
    assert_eq!(trace.kind(e(3)), EventKind::Constant);
    assert_eq!(trace.kind(e(10)), EventKind::Value);

    let mut a = answer(&trace);
    let read = a.explain(e(10));
    let causes: Vec<EventId> = a.causes(read).iter().map(|c| c.event).collect();
    assert_eq!(causes, vec![e(3)]);
    assert!(matches!(
        a.causes(read)[0].source,
        CauseSource::Operand { position: 0, .. }
    ));

    let invocation = a.cached(e(8)).unwrap();
    assert_eq!(a.block_of(read), Some(invocation));
    assert_eq!(a.node(invocation).callee_instrumented(), Some(true));
    assert!(matches!(a.node(invocation).kind(), NodeKind::Invocation { .. }));
}

#[test]
fn pushed_constant_is_noise() {
    let trace = call_with_constant();
    let mut a = answer(&trace);
    let constant = a.explain(e(3));
    assert_eq!(a.node(constant).try_causes(), Some(&[][..]));
    assert!(a.terminal_data_dependencies(e(10)).is_empty());
}

#[test]
fn explanation_identity_is_stable() {
    let trace = call_with_constant();
    let mut a = answer(&trace);
    let first = a.explanation_for(e(10));
    assert!(!a.node(first).is_explained());
    assert_eq!(a.explain(e(10)), first);
    assert_eq!(a.explanation_for(e(10)), first);
    assert!(a.node(first).is_explained());
}

#[test]
#[should_panic(expected = "requested while")]
fn causes_of_unexplained_node_panic() {
    let trace = call_with_constant();
    let mut a = answer(&trace);
    let node = a.explanation_for(e(10));
    let _ = a.causes(node);
}

// =============================================================================
// Terminal dependencies
// =============================================================================

/// ```text
/// 1 argument
/// 2 value <- 1
/// 3 value
/// 4 value <- 2, 3
/// 5 field definition <- 4
/// ```
fn definition_chain() -> RecordedTrace {
    let mut b = ProgramBuilder::new();
    let class = b.class("Counter", None);
    let method = b.static_method(class, "bump");
    b.entry_point(method);
    let op = b.instruction(method, InstructionKind::Other);

    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), method, &[], None);
    let argument = t.push(EventRecord::new(EventKind::Argument, op).control(start));
    let widened = t.push(
        EventRecord::new(EventKind::Value, op)
            .operands(&[argument])
            .control(start),
    );
    let loaded = t.push(EventRecord::new(EventKind::Value, op).control(start));
    let sum = t.push(
        EventRecord::new(EventKind::Value, op)
            .operands(&[widened, loaded])
            .control(start),
    );
    t.push(
        EventRecord::new(EventKind::FieldDefinition, op)
            .operands(&[sum])
            .control(start),
    );
    t.build()
}

#[test]
fn terminal_dependencies_skip_plumbing() {
    let trace = definition_chain();
    let mut a = answer(&trace);
    let terminals = a.terminal_data_dependencies(e(5));
    let expected: BTreeMap<EventId, EventId> = [(e(1), e(2)), (e(3), e(4))].into_iter().collect();
    assert_eq!(terminals, expected);
    assert_eq!(a.terminal_data_dependencies(e(5)), terminals);
}

#[test]
fn heap_write_is_a_cause() {
    let mut b = ProgramBuilder::new();
    let class = b.class("Cell", None);
    let method = b.static_method(class, "main");
    let new = b.instruction(method, InstructionKind::New { class });
    let op = b.instruction(method, InstructionKind::Other);

    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), method, &[], None);
    let alloc = t.push(
        EventRecord::new(EventKind::Instantiation, new)
            .allocating(ObjectId::new(1))
            .control(start),
    );
    let write = t.push(
        EventRecord::new(EventKind::FieldDefinition, op)
            .operands(&[alloc])
            .control(start),
    );
    let read = t.push(
        EventRecord::new(EventKind::Value, op)
            .operands(&[alloc])
            .heap(write)
            .control(start),
    );
    let trace = t.build();

    let mut a = answer(&trace);
    let node = a.explain(read);
    let sources: Vec<_> = a.causes(node).iter().map(|c| (c.event, c.source)).collect();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1], (write, CauseSource::Heap));
    let terminals = a.terminal_data_dependencies(read);
    assert_eq!(terminals.get(&write), Some(&read));
    assert_eq!(terminals.get(&alloc), Some(&read));
}

#[test]
fn opaque_call_arguments_follow_config() {
    let mut b = ProgramBuilder::new();
    let class = b.class("App", None);
    let main = b.static_method(class, "main");
    let library = b.static_method(class, "library");
    let op = b.instruction(main, InstructionKind::Other);
    let call = b.invoke(main, library, &[]);
    b.instruction(library, InstructionKind::Other);

    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    let hidden = t.push(EventRecord::new(EventKind::Value, op).control(start));
    let invoke = t.push(
        EventRecord::new(EventKind::Invocation, call)
            .opaque_arguments(&[hidden])
            .control(start),
    );
    let trace = t.build();

    let mut a = answer(&trace);
    let node = a.explain(invoke);
    assert_eq!(a.causes(node).len(), 1);
    assert_eq!(a.causes(node)[0].source, CauseSource::Opaque);
    assert_eq!(a.node(node).callee_instrumented(), Some(false));

    let mut literal = Answer::new(&trace, AnalysisConfig::literal(), &mut AnswerSequence::new());
    let node = literal.explain(invoke);
    assert!(literal.causes(node).is_empty());
}

// =============================================================================
// Threads
// =============================================================================

#[test]
fn control_does_not_cross_threads() {
    let mut b = ProgramBuilder::new();
    let class = b.class("App", None);
    let main = b.static_method(class, "main");
    let worker = b.method(class, "run");
    let spawn = b.invoke(main, worker, &[]);
    let main_ret = b.instruction(main, InstructionKind::Return);
    let work = b.instruction(worker, InstructionKind::Other);
    let worker_ret = b.instruction(worker, InstructionKind::Return);

    let t0 = ThreadId::new(0);
    let t1 = ThreadId::new(1);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(t0, main, &[], None);
    let invoke = t.push(EventRecord::new(EventKind::Invocation, spawn).control(start));
    let entered = t.enter(t1, worker, &[None], Some(invoke));
    let value = t.push(
        EventRecord::new(EventKind::Value, work)
            .on_thread(t1)
            .control(entered),
    );
    t.exit(
        EventRecord::new(EventKind::Return, worker_ret)
            .on_thread(t1)
            .control(entered),
    );
    t.exit(EventRecord::new(EventKind::Return, main_ret).control(start));
    let trace = t.build();

    let mut a = answer(&trace);
    let node = a.explain(value);
    let entry = a.cached(entered).unwrap();
    assert_eq!(a.block_of(node), Some(entry));

    let worker_block = a.thread_block(t1).unwrap();
    assert_eq!(a.block_of(entry), Some(worker_block));
    assert_eq!(a.node(worker_block).event(), entered);
    assert_eq!(a.thread_blocks().count(), 2);
}

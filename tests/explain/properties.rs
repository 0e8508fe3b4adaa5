//! Property tests over generated traces

use hindsight_engine::explain::NodeKind;
use hindsight_engine::{AnalysisConfig, Answer, AnswerSequence, NodeId};
use hindsight_foundation::{EventId, EventKind, InstructionId, ThreadId};
use hindsight_trace::{
    EventRecord, InstructionKind, ProgramBuilder, RecordedTrace, TraceBuilder, TraceQuery,
};
use proptest::prelude::*;

/// One generated event: instruction choice, event-kind choice, control
/// choice, and operand choices.
type EventPlan = (u8, u8, u8, Vec<u16>);

/// Builds a single-method trace from generated choices.
///
/// Every event's control dependency and operands refer to earlier events.
/// Instructions are drawn from a small pool, so branches repeat and loop
/// routing kicks in.
fn generated_trace(plans: &[EventPlan]) -> RecordedTrace {
    let mut b = ProgramBuilder::new();
    let class = b.class("Gen", None);
    let main = b.static_method(class, "main");
    b.entry_point(main);
    let kinds = [
        InstructionKind::Other,
        InstructionKind::Branch,
        InstructionKind::Other,
        InstructionKind::Branch,
        InstructionKind::Other,
        InstructionKind::Other,
    ];
    let pool: Vec<InstructionId> = kinds.iter().map(|&k| b.instruction(main, k)).collect();
    b.loop_path(pool[3], vec![pool[3]]);
    b.loop_path(pool[1], vec![pool[1], pool[3]]);

    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    let mut controls = vec![start];
    let mut produced: Vec<EventId> = Vec::new();

    for (instruction, kind, control, operands) in plans {
        let slot = usize::from(*instruction) % pool.len();
        let instruction = pool[slot];
        let kind = if kinds[slot] == InstructionKind::Branch {
            EventKind::Branch
        } else {
            [
                EventKind::Value,
                EventKind::Constant,
                EventKind::Invocation,
                EventKind::LocalDefinition,
                EventKind::Value,
            ][usize::from(*kind) % 5]
        };
        let control = controls[usize::from(*control) % controls.len()];
        let mut record = EventRecord::new(kind, instruction).control(control);
        if kind != EventKind::Constant && !produced.is_empty() {
            let picks: Vec<EventId> = operands
                .iter()
                .map(|&o| produced[usize::from(o) % produced.len()])
                .collect();
            record = record.operands(&picks);
        }
        let id = t.push(record);
        if matches!(kind, EventKind::Branch | EventKind::Invocation) {
            controls.push(id);
        }
        produced.push(id);
    }
    t.build()
}

fn event_plan() -> impl Strategy<Value = EventPlan> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        prop::collection::vec(any::<u16>(), 0..3),
    )
}

fn loop_trace(iterations: usize) -> RecordedTrace {
    let mut b = ProgramBuilder::new();
    let class = b.class("Loop", None);
    let main = b.static_method(class, "main");
    let body = b.instruction(main, InstructionKind::Other);
    let cond = b.instruction(main, InstructionKind::Branch);
    let ret = b.instruction(main, InstructionKind::Return);
    b.loop_path(cond, vec![cond]);

    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    let mut control = start;
    for _ in 0..iterations {
        t.push(EventRecord::new(EventKind::Value, body).control(control));
        control = t.push(EventRecord::new(EventKind::Branch, cond).control(control));
    }
    t.exit(EventRecord::new(EventKind::Return, ret).control(control));
    t.build()
}

proptest! {
    #[test]
    fn blocks_contain_only_later_events(plans in prop::collection::vec(event_plan(), 1..40)) {
        let trace = generated_trace(&plans);
        let mut a = Answer::new(&trace, AnalysisConfig::default(), &mut AnswerSequence::new());
        for index in 0..trace.event_count() {
            a.explain(EventId::new(index));
        }

        let mut nodes: Vec<NodeId> = a.blocks().collect();
        nodes.extend((0..trace.event_count()).filter_map(|i| a.cached(EventId::new(i))));
        for id in nodes {
            let node = a.node(id);
            for (&member, _) in node.members() {
                prop_assert!(member >= node.event());
            }
            if let Some(owner) = node.owner() {
                prop_assert!(node.event() >= a.node(owner).event());
            } else {
                let is_thread = matches!(node.kind(), NodeKind::Thread { .. });
                prop_assert!(is_thread);
            }
        }
    }

    #[test]
    fn nothing_causes_itself(plans in prop::collection::vec(event_plan(), 1..40)) {
        let trace = generated_trace(&plans);
        let mut a = Answer::new(&trace, AnalysisConfig::default(), &mut AnswerSequence::new());
        for index in 0..trace.event_count() {
            let event = EventId::new(index);
            let node = a.explain(event);
            let causes = a.causes(node).to_vec();
            prop_assert!(causes.iter().all(|c| c.event != event && c.event < event));
            prop_assert_eq!(a.explain(event), node);
            prop_assert_eq!(a.causes(node), causes.as_slice());
        }
    }

    #[test]
    fn terminal_dependencies_are_stable_and_terminal(
        plans in prop::collection::vec(event_plan(), 1..40)
    ) {
        let trace = generated_trace(&plans);
        let mut a = Answer::new(&trace, AnalysisConfig::default(), &mut AnswerSequence::new());
        let last = EventId::new(trace.event_count() - 1);
        let first = a.terminal_data_dependencies(last);
        let second = a.terminal_data_dependencies(last);
        prop_assert_eq!(&first, &second);

        for (&cause, &effect) in &first {
            prop_assert!(cause < effect);
            let kind = trace.kind(cause);
            let node = a.cached(cause).unwrap();
            let leaf = kind == EventKind::Value && a.causes(node).is_empty();
            prop_assert!(kind.is_terminal_kind() || leaf);
        }
    }

    #[test]
    fn loop_iterations_collapse(iterations in 1usize..30) {
        let trace = loop_trace(iterations);
        let mut a = Answer::new(&trace, AnalysisConfig::default(), &mut AnswerSequence::new());
        for index in 0..trace.event_count() {
            a.explain(EventId::new(index));
        }

        let branches: Vec<_> = (0..trace.event_count())
            .map(EventId::new)
            .filter(|&e| trace.kind(e) == EventKind::Branch)
            .map(|e| a.cached(e).unwrap())
            .collect();
        prop_assert_eq!(branches.len(), iterations);

        let expected_loops = usize::from(iterations > 1);
        prop_assert_eq!(a.loop_blocks().count(), expected_loops);
        if let Some((_, block)) = a.loop_blocks().next() {
            prop_assert!(branches.iter().all(|&b| a.block_of(b) == Some(block)));
        }
        let redundant = branches.iter().filter(|&&b| a.is_redundant(b)).count();
        prop_assert_eq!(redundant, iterations - 1);
    }
}

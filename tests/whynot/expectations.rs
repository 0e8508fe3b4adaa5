//! Expectations carried across calls, and caller pruning

use std::collections::BTreeSet;

use hindsight_engine::whynot::Match;
use hindsight_engine::{AnalysisConfig, Expectation, Question, Reason, ReasonKind};
use hindsight_foundation::{
    ClassId, EventId, EventKind, InstructionId, MethodId, ObjectId, ThreadId,
};
use hindsight_trace::{
    EventRecord, InstructionKind, ProgramBuilder, RecordedTrace, TraceBuilder, TraceQuery,
};

// =============================================================================
// Operand constraints
// =============================================================================

struct Widget {
    program: ProgramBuilder,
    class: ClassId,
    helper: MethodId,
    helper_ret: InstructionId,
    outer: MethodId,
    uses_param: InstructionId,
    uses_local: InstructionId,
    call: InstructionId,
    outer_ret: InstructionId,
}

/// `Widget.helper(p)` uses `p` and a local; static `outer(w, q)` calls
/// `w.helper(q)`.
fn widget() -> Widget {
    let mut b = ProgramBuilder::new();
    let class = b.class("Widget", None);
    let helper = b.method(class, "helper");
    let outer = b.static_method(class, "outer");

    let param = b.load_parameter(helper, 1);
    let local = b.instruction(helper, InstructionKind::Other);
    let uses_param = b.instruction(helper, InstructionKind::Other);
    b.operands(uses_param, &[param]);
    let uses_local = b.instruction(helper, InstructionKind::Other);
    b.operands(uses_local, &[local]);
    let helper_ret = b.instruction(helper, InstructionKind::Return);

    let receiver = b.load_parameter(outer, 0);
    let forwarded = b.load_parameter(outer, 1);
    let call = b.invoke(outer, helper, &[receiver, forwarded]);
    let outer_ret = b.instruction(outer, InstructionKind::Return);

    Widget {
        program: b,
        class,
        helper,
        helper_ret,
        outer,
        uses_param,
        uses_local,
        call,
        outer_ret,
    }
}

/// Records `main` calling `outer`, which calls `helper` with `arguments`.
fn widget_run(w: Widget, arguments: &[Option<ObjectId>]) -> (RecordedTrace, Widget) {
    let mut b = w.program;
    let class = b.class("Main", None);
    let main = b.static_method(class, "main");
    b.entry_point(main);
    let call_outer = b.invoke(main, w.outer, &[]);
    let new = b.instruction(main, InstructionKind::New { class: w.class });
    let main_ret = b.instruction(main, InstructionKind::Return);
    let program = b.build();

    let t0 = ThreadId::new(0);
    let mut t = TraceBuilder::new(program);
    let start = t.enter(t0, main, &[], None);
    t.push(
        EventRecord::new(EventKind::Instantiation, new)
            .allocating(ObjectId::new(1))
            .control(start),
    );
    let to_outer = t.push(EventRecord::new(EventKind::Invocation, call_outer).control(start));
    let outer = t.enter(t0, w.outer, &[], Some(to_outer));
    let to_helper = t.push(EventRecord::new(EventKind::Invocation, w.call).control(outer));
    let inner = t.enter(t0, w.helper, arguments, Some(to_helper));
    t.exit(EventRecord::new(EventKind::Return, w.helper_ret).control(inner));
    t.exit(EventRecord::new(EventKind::Return, w.outer_ret).control(outer));
    t.exit(EventRecord::new(EventKind::Return, main_ret).control(start));

    (
        t.build(),
        Widget {
            program: ProgramBuilder::new(),
            ..w
        },
    )
}

#[test]
fn operand_constraint_becomes_call_site_operand() {
    let w = widget();
    let mut b = w.program;
    let class = b.class("Main", None);
    let main = b.static_method(class, "main");
    b.entry_point(main);
    let ret = b.instruction(main, InstructionKind::Return);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    t.exit(EventRecord::new(EventKind::Return, ret).control(start));
    let trace = t.build();

    let object = ObjectId::new(9);
    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = q
        .unexecuted(w.uses_param, Expectation::operand(object, 0))
        .unwrap();
    assert_eq!(
        q.explain(target),
        &Reason::MethodDidNotExecute {
            method: w.helper,
            callers: BTreeSet::from([w.call]),
        }
    );

    let caller = q
        .lookup(w.call, &Expectation::operand(object, 1))
        .unwrap();
    assert_eq!(q.incoming(target).collect::<Vec<_>>(), vec![caller]);
    assert_eq!(q.reason(caller), &Reason::Unreachable { method: w.outer });
}

#[test]
fn untraceable_operand_loses_its_constraint() {
    let w = widget();
    let mut b = w.program;
    let class = b.class("Main", None);
    let main = b.static_method(class, "main");
    b.entry_point(main);
    let ret = b.instruction(main, InstructionKind::Return);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    t.exit(EventRecord::new(EventKind::Return, ret).control(start));
    let trace = t.build();

    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = q
        .unexecuted(w.uses_local, Expectation::operand(ObjectId::new(9), 0))
        .unwrap();
    assert_eq!(q.explain(target).kind(), ReasonKind::MethodDidNotExecute);
    assert!(q.lookup(w.call, &Expectation::Unconstrained).is_some());
}

#[test]
fn uncaptured_argument_gives_no_reason() {
    let (trace, w) = widget_run(widget(), &[None, None]);
    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = q
        .unexecuted(w.uses_param, Expectation::operand(ObjectId::new(9), 0))
        .unwrap();
    assert_eq!(q.explain(target), &Reason::UnknownReason);
    assert!(q.executions_on_other_objects(target).is_empty());
    assert_eq!(q.incoming(target).count(), 0);
}

#[test]
fn invocation_for_another_object_is_recorded() {
    let expected = ObjectId::new(9);
    let other = ObjectId::new(2);
    let (trace, w) = widget_run(widget(), &[Some(ObjectId::new(1)), Some(other)]);

    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = q
        .unexecuted(w.uses_param, Expectation::operand(expected, 0))
        .unwrap();
    let reason = q.explain(target).clone();
    let helper_start = q.executions_on_other_objects(target)[0];
    assert_eq!(q.executions_on_other_objects(target).len(), 1);

    // The call site itself ran, just not for the expected object.
    match reason {
        Reason::DidExecute { event } => assert!(event < helper_start),
        other => panic!("expected the call site to have run, found {other:?}"),
    }

    let mut matching = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = matching
        .unexecuted(w.uses_param, Expectation::operand(other, 0))
        .unwrap();
    assert_eq!(matching.explain(target), &Reason::UnknownReason);
    assert_eq!(matching.node(target).method_execution(), Some(helper_start));
}

#[test]
fn any_of_accepts_each_member_as_receiver() {
    let (trace, w) = widget_run(widget(), &[Some(ObjectId::new(1)), Some(ObjectId::new(2))]);
    let helper_start = EventId::new(5);
    assert_eq!(trace.kind(helper_start), EventKind::StartMethod);

    let hit = Expectation::AnyOf(BTreeSet::from([ObjectId::new(1), ObjectId::new(3)]));
    let miss = Expectation::AnyOf(BTreeSet::from([ObjectId::new(3), ObjectId::new(4)]));
    assert_eq!(hit.matches(&trace, helper_start), Match::Yes);
    assert_eq!(miss.matches(&trace, helper_start), Match::No);

    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let target = q.unexecuted(w.uses_param, hit).unwrap();
    assert_eq!(q.explain(target), &Reason::UnknownReason);
    assert_eq!(q.node(target).method_execution(), Some(helper_start));
    assert!(q.executions_on_other_objects(target).is_empty());

    let target = q.unexecuted(w.uses_param, miss).unwrap();
    let reason = q.explain(target).clone();
    assert_eq!(q.executions_on_other_objects(target), [helper_start]);
    assert_eq!(q.node(target).method_execution(), None);
    match reason {
        Reason::DidExecute { event } => {
            assert_eq!(trace.kind(event), EventKind::Invocation);
            assert!(event < helper_start);
        }
        other => panic!("expected the call site to have run, found {other:?}"),
    }
}

// =============================================================================
// Guards under a parameter constraint
// =============================================================================

struct Twice {
    trace: RecordedTrace,
    target: InstructionId,
    cond: InstructionId,
    first: ObjectId,
    second: ObjectId,
}

/// Static `check(p)` branches on `p` around `target`; `main` calls it for
/// object 5, then for object 6.
///
/// ```text
/// 0  enter main
/// 1  call check
/// 2  enter check(@5)
/// 3  load p
/// 4  if (3)
/// 5  return from check
/// 6  call check
/// 7  enter check(@6)
/// 8  load p
/// 9  if (8)
/// 10 return from check
/// 11 return from main
/// ```
fn twice() -> Twice {
    let mut b = ProgramBuilder::new();
    let class = b.class("App", None);
    let main = b.static_method(class, "main");
    let check = b.static_method(class, "check");
    b.entry_point(main);

    let param = b.load_parameter(check, 0);
    let cond = b.instruction(check, InstructionKind::Branch);
    b.operands(cond, &[param]);
    let target = b.instruction(check, InstructionKind::Other);
    b.operands(target, &[param]);
    b.guard(target, cond);
    let check_ret = b.instruction(check, InstructionKind::Return);

    let call_first = b.invoke(main, check, &[]);
    let call_second = b.invoke(main, check, &[]);
    let main_ret = b.instruction(main, InstructionKind::Return);

    let first = ObjectId::new(5);
    let second = ObjectId::new(6);
    let t0 = ThreadId::new(0);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(t0, main, &[], None);
    for (call, object) in [(call_first, first), (call_second, second)] {
        let invoke = t.push(EventRecord::new(EventKind::Invocation, call).control(start));
        let inner = t.enter(t0, check, &[Some(object)], Some(invoke));
        let loaded = t.push(EventRecord::new(EventKind::Argument, param).control(inner));
        t.push(
            EventRecord::new(EventKind::Branch, cond)
                .operands(&[loaded])
                .control(inner),
        );
        t.exit(EventRecord::new(EventKind::Return, check_ret).control(inner));
    }
    t.exit(EventRecord::new(EventKind::Return, main_ret).control(start));

    Twice {
        trace: t.build(),
        target,
        cond,
        first,
        second,
    }
}

#[test]
fn guard_is_read_from_the_matching_invocation() {
    let f = twice();
    let e = EventId::new;
    assert_eq!(f.trace.kind(e(4)), EventKind::Branch);
    assert_eq!(f.trace.kind(e(9)), EventKind::Branch);

    let mut q = Question::new(&f.trace, AnalysisConfig::default(), f.trace.end());
    let node = q
        .unexecuted(f.target, Expectation::operand(f.first, 0))
        .unwrap();
    assert_eq!(
        q.explain(node),
        &Reason::WrongWay {
            branch: e(4),
            dependencies: vec![e(3)],
        }
    );
    assert_eq!(q.node(node).method_execution(), Some(e(2)));
    assert_eq!(q.executions_on_other_objects(node), [e(7)]);

    let search = Expectation::Parameter {
        object: f.first,
        index: 0,
    };
    let guard = q.lookup(f.cond, &search).unwrap();
    assert_eq!(q.incoming(node).collect::<Vec<_>>(), vec![guard]);
    assert_eq!(q.node(guard).method_execution(), Some(e(2)));

    let mut later = Question::new(&f.trace, AnalysisConfig::default(), f.trace.end());
    let node = later
        .unexecuted(f.target, Expectation::operand(f.second, 0))
        .unwrap();
    assert_eq!(
        later.explain(node),
        &Reason::WrongWay {
            branch: e(9),
            dependencies: vec![e(8)],
        }
    );
    assert_eq!(later.node(node).method_execution(), Some(e(7)));
}

#[test]
fn guard_without_a_constraint_uses_the_latest_invocation() {
    let f = twice();
    let mut q = Question::new(&f.trace, AnalysisConfig::default(), f.trace.end());
    let node = q.unexecuted(f.target, Expectation::Unconstrained).unwrap();
    assert_eq!(
        q.explain(node),
        &Reason::WrongWay {
            branch: EventId::new(9),
            dependencies: vec![EventId::new(8)],
        }
    );
}

// =============================================================================
// Caller pruning
// =============================================================================

struct Shapes {
    trace: RecordedTrace,
    derived_draw: MethodId,
    target: InstructionId,
    object: ObjectId,
}

/// `main` allocates a `Base` and calls `draw` on it through `Base.draw`.
/// `Derived.draw` overrides it but never runs.
fn shapes() -> Shapes {
    let mut b = ProgramBuilder::new();
    let base = b.class("Base", None);
    let derived = b.class("Derived", Some(base));
    let main_class = b.class("Main", None);
    let base_draw = b.method(base, "draw");
    let derived_draw = b.method(derived, "draw");
    let main = b.static_method(main_class, "main");
    b.entry_point(main);

    let base_body = b.instruction(base_draw, InstructionKind::Other);
    let base_ret = b.instruction(base_draw, InstructionKind::Return);
    let target = b.instruction(derived_draw, InstructionKind::Other);
    let new = b.instruction(main, InstructionKind::New { class: base });
    let call = b.invoke(main, base_draw, &[new]);
    let main_ret = b.instruction(main, InstructionKind::Return);

    let object = ObjectId::new(5);
    let t0 = ThreadId::new(0);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(t0, main, &[], None);
    let alloc = t.push(
        EventRecord::new(EventKind::Instantiation, new)
            .allocating(object)
            .control(start),
    );
    let invoke = t.push(
        EventRecord::new(EventKind::Invocation, call)
            .operands(&[alloc])
            .control(start),
    );
    let inner = t.enter(t0, base_draw, &[Some(object)], Some(invoke));
    t.push(EventRecord::new(EventKind::Value, base_body).control(inner));
    t.exit(EventRecord::new(EventKind::Return, base_ret).control(inner));
    t.exit(EventRecord::new(EventKind::Return, main_ret).control(start));

    Shapes {
        trace: t.build(),
        derived_draw,
        target,
        object,
    }
}

#[test]
fn receiver_type_prunes_impossible_callers() {
    let s = shapes();
    let mut q = Question::new(&s.trace, AnalysisConfig::default(), s.trace.end());
    let target = q
        .unexecuted(s.target, Expectation::receiver(s.object))
        .unwrap();
    assert_eq!(
        q.explain(target),
        &Reason::Unreachable {
            method: s.derived_draw
        }
    );
}

#[test]
fn any_of_receivers_prune_like_a_single_receiver() {
    let s = shapes();
    let mut q = Question::new(&s.trace, AnalysisConfig::default(), s.trace.end());
    let target = q
        .unexecuted(s.target, Expectation::AnyOf(BTreeSet::from([s.object])))
        .unwrap();
    assert_eq!(
        q.explain(target),
        &Reason::Unreachable {
            method: s.derived_draw
        }
    );

    // An object of unknown class could be a `Derived`.
    let unknown = ObjectId::new(77);
    let target = q
        .unexecuted(s.target, Expectation::AnyOf(BTreeSet::from([s.object, unknown])))
        .unwrap();
    assert_eq!(q.explain(target).kind(), ReasonKind::DidExecute);
}

#[test]
fn without_type_pruning_the_call_site_ran() {
    let s = shapes();
    let config = AnalysisConfig::default().with_prune_by_receiver_type(false);
    let mut q = Question::new(&s.trace, config, s.trace.end());
    let target = q
        .unexecuted(s.target, Expectation::receiver(s.object))
        .unwrap();
    assert_eq!(q.explain(target).kind(), ReasonKind::DidExecute);

    let mut literal = Question::new(&s.trace, AnalysisConfig::literal(), s.trace.end());
    let target = literal
        .unexecuted(s.target, Expectation::receiver(s.object))
        .unwrap();
    assert_eq!(literal.explain(target).kind(), ReasonKind::DidExecute);
}

#[test]
fn callers_in_uninstantiated_classes_are_pruned() {
    let mut b = ProgramBuilder::new();
    let ghost = b.class("Ghost", None);
    let util = b.class("Util", None);
    let haunt = b.method(ghost, "haunt");
    let spook = b.static_method(util, "spook");
    let call = b.invoke(haunt, spook, &[]);
    let target = b.instruction(spook, InstructionKind::Other);
    let main = b.static_method(util, "main");
    b.entry_point(main);
    let ret = b.instruction(main, InstructionKind::Return);
    let mut t = TraceBuilder::new(b.build());
    let start = t.enter(ThreadId::new(0), main, &[], None);
    t.exit(EventRecord::new(EventKind::Return, ret).control(start));
    let trace = t.build();

    let mut q = Question::new(&trace, AnalysisConfig::default(), trace.end());
    let node = q.unexecuted(target, Expectation::Unconstrained).unwrap();
    assert_eq!(q.explain(node), &Reason::Unreachable { method: spook });

    let mut literal = Question::new(&trace, AnalysisConfig::literal(), trace.end());
    let node = literal.unexecuted(target, Expectation::Unconstrained).unwrap();
    assert_eq!(
        literal.explain(node),
        &Reason::MethodDidNotExecute {
            method: spook,
            callers: BTreeSet::from([call]),
        }
    );
    let caller = literal.lookup(call, &Expectation::Unconstrained).unwrap();
    assert_eq!(literal.reason(caller), &Reason::Unreachable { method: haunt });
}
